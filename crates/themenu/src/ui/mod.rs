pub mod theme;

use std::io::{self, Stdout};
use std::panic::{self, AssertUnwindSafe, catch_unwind};
use std::sync::Arc;
use std::time::{Duration, Instant};

use crossterm::cursor::{Hide, Show};
use crossterm::event::{
    self, Event, KeyCode, KeyEvent, KeyEventKind, KeyModifiers, KeyboardEnhancementFlags,
    PopKeyboardEnhancementFlags, PushKeyboardEnhancementFlags,
};
use crossterm::execute;
use crossterm::terminal::{
    EnterAlternateScreen, LeaveAlternateScreen, disable_raw_mode, enable_raw_mode,
    supports_keyboard_enhancement,
};
use ratatui::Terminal;
use ratatui::backend::CrosstermBackend;
use ratatui::layout::{Constraint, Direction, Layout, Rect};
use ratatui::style::{Modifier, Style};
use ratatui::text::{Line, Span, Text};
use ratatui::widgets::{Block, BorderType, Borders, Paragraph};
use tracing::{error, info, warn};

use crate::entity::MenuEntity;
use crate::error::{Error, Result};
use crate::sanitize::sanitize_label;
use crate::tree::{InputSignal, MenuTree};

pub use theme::{Theme, ThemeName};

const BUSY_MARK: &str = " [busy]";

/// Everything the renderer needs besides the tree itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RenderContext {
    pub theme: Theme,
    /// Maximum width of the menu in columns.
    pub width: u16,
    /// Border thickness; 0 draws no border.
    pub border: u16,
    pub fps: u32,
    /// Blank rows between items and blank columns on either side.
    pub padding: u16,
}

impl Default for RenderContext {
    fn default() -> Self {
        Self {
            theme: Theme::default(),
            width: 60,
            border: 0,
            fps: 60,
            padding: 1,
        }
    }
}

impl RenderContext {
    pub fn frame_interval(&self) -> Duration {
        Duration::from_secs(1) / self.fps.max(1)
    }
}

/// A snapshot of what one entity shows this frame, with the label already
/// reduced to a single printable line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ItemView {
    pub key: String,
    pub label: String,
    pub busy: bool,
    pub active: bool,
}

impl ItemView {
    pub fn of(entity: &MenuEntity) -> Self {
        Self {
            key: entity.action_key().to_string(),
            label: sanitize_label(&entity.label()),
            busy: entity.busy(),
            active: entity.active(),
        }
    }
}

pub fn item_line(item: &ItemView, theme: &Theme) -> Line<'static> {
    let key = if item.key.is_empty() { " " } else { item.key.as_str() };
    let key_style = Style::default()
        .fg(theme.item_background)
        .bg(theme.item_text)
        .add_modifier(Modifier::BOLD);
    let label_style = if item.active {
        Style::default().fg(theme.item_background).bg(theme.item_text)
    } else if item.busy {
        Style::default().fg(theme.text_busy).bg(theme.item_background)
    } else {
        Style::default().fg(theme.item_text).bg(theme.item_background)
    };

    let mut spans = vec![
        Span::styled(format!(" {key} "), key_style),
        Span::styled(format!(" {}", item.label), label_style),
    ];
    if item.busy {
        spans.push(Span::styled(
            BUSY_MARK,
            Style::default().fg(theme.text_busy).bg(theme.item_background),
        ));
    }
    Line::from(spans)
}

fn crumb(tree: &MenuTree) -> String {
    match tree.scope() {
        Some(entity) => format!("root > {}", sanitize_label(&entity.label())),
        None => "root".to_string(),
    }
}

/// Render the current scope of `tree` into `f`.
pub fn draw_menu(f: &mut ratatui::Frame, tree: &MenuTree, ctx: &RenderContext) {
    let full = f.area();
    let area = Rect {
        width: ctx.width.min(full.width),
        ..full
    };
    let theme = &ctx.theme;
    f.render_widget(
        Block::default().style(Style::default().bg(theme.background)),
        area,
    );

    let inner = if ctx.border > 0 {
        let border_type = if ctx.border > 1 {
            BorderType::Thick
        } else {
            BorderType::Plain
        };
        let block = Block::default()
            .borders(Borders::ALL)
            .border_type(border_type)
            .border_style(Style::default().fg(theme.item_background))
            .style(Style::default().bg(theme.background));
        let inner = block.inner(area);
        f.render_widget(block, area);
        inner
    } else {
        area
    };

    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(2),
            Constraint::Min(1),
            Constraint::Length(2),
        ])
        .split(inner);

    let header = Paragraph::new(Text::from(Line::from(vec![
        Span::styled("themenu", Style::default().fg(theme.text_busy)),
        Span::raw("  "),
        Span::styled(crumb(tree), Style::default().fg(theme.item_text)),
    ])))
    .block(
        Block::default()
            .borders(Borders::BOTTOM)
            .border_style(Style::default().fg(theme.item_background)),
    );
    f.render_widget(header, chunks[0]);

    draw_items(f, tree.current_items(), chunks[1], ctx);

    let hint = if tree.scope().is_some() {
        "[key] Select  [Esc] Back  [Ctrl-C] Quit"
    } else {
        "[key] Select  [Esc/Ctrl-C] Quit"
    };
    let footer = Paragraph::new(hint)
        .style(Style::default().fg(theme.item_text))
        .block(
            Block::default()
                .borders(Borders::TOP)
                .border_style(Style::default().fg(theme.item_background)),
        );
    f.render_widget(footer, chunks[2]);
}

fn draw_items(f: &mut ratatui::Frame, items: &[Arc<MenuEntity>], area: Rect, ctx: &RenderContext) {
    let pad = ctx.padding;
    let width = area.width.saturating_sub(pad.saturating_mul(2));
    if width == 0 {
        return;
    }
    let bottom = area.y.saturating_add(area.height);
    let mut y = area.y.saturating_add(pad);
    for entity in items {
        if y >= bottom {
            break;
        }
        let row = Rect {
            x: area.x + pad,
            y,
            width,
            height: 1,
        };
        let line = item_line(&ItemView::of(entity), &ctx.theme);
        let p = Paragraph::new(line).style(Style::default().bg(ctx.theme.item_background));
        f.render_widget(p, row);
        y = y.saturating_add(1 + pad);
    }
}

/// What a single terminal key event means for the menu.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KeyAction {
    Signal(InputSignal),
    Quit,
    Ignore,
}

pub fn translate_key(key: &KeyEvent, at_root: bool) -> KeyAction {
    if key.kind == KeyEventKind::Repeat {
        return KeyAction::Ignore;
    }
    let pressed = key.kind == KeyEventKind::Press;
    match key.code {
        KeyCode::Char('c') if key.modifiers.contains(KeyModifiers::CONTROL) => {
            if pressed {
                KeyAction::Quit
            } else {
                KeyAction::Ignore
            }
        }
        KeyCode::Esc if pressed => {
            if at_root {
                KeyAction::Quit
            } else {
                KeyAction::Signal(InputSignal::Escape)
            }
        }
        KeyCode::Char(c) if pressed => KeyAction::Signal(InputSignal::Press(c.to_string())),
        KeyCode::Char(c) => KeyAction::Signal(InputSignal::Release(c.to_string())),
        _ => KeyAction::Ignore,
    }
}

/// Feed one signal to the tree. Terminals that cannot report key releases
/// get a synthetic release right after each press.
fn apply_signal(tree: &mut MenuTree, signal: InputSignal, reports_release: bool) {
    let release = match &signal {
        InputSignal::Press(key) if !reports_release => Some(InputSignal::Release(key.clone())),
        _ => None,
    };
    // Trigger threads are detached; their outcome is logged by the tree.
    tree.handle(signal);
    if let Some(release) = release {
        tree.handle(release);
    }
}

pub fn run_tui(tree: &mut MenuTree, ctx: &RenderContext) -> Result<()> {
    let mut stdout = io::stdout();
    enable_raw_mode().map_err(|e| Error::msg(e.to_string()))?;
    execute!(stdout, EnterAlternateScreen, Hide).map_err(|e| Error::msg(e.to_string()))?;
    let reports_release = matches!(supports_keyboard_enhancement(), Ok(true))
        && execute!(
            stdout,
            PushKeyboardEnhancementFlags(
                KeyboardEnhancementFlags::DISAMBIGUATE_ESCAPE_CODES
                    | KeyboardEnhancementFlags::REPORT_EVENT_TYPES
            )
        )
        .is_ok();
    if !reports_release {
        info!("terminal does not report key releases; releasing on press");
    }
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend).map_err(|e| Error::msg(e.to_string()))?;
    terminal
        .clear()
        .map_err(|e| Error::msg(format!("tui clear failed: {e}")))?;

    // The default hook writes to stderr, which would land on the menu.
    let previous_hook = panic::take_hook();
    panic::set_hook(Box::new(|info| error!(panic = %info, "panic")));

    let result = run_loop(&mut terminal, tree, ctx, reports_release);

    panic::set_hook(previous_hook);
    if reports_release {
        execute!(terminal.backend_mut(), PopKeyboardEnhancementFlags).ok();
    }
    disable_raw_mode().ok();
    execute!(terminal.backend_mut(), LeaveAlternateScreen, Show).ok();
    result
}

fn run_loop(
    terminal: &mut Terminal<CrosstermBackend<Stdout>>,
    tree: &mut MenuTree,
    ctx: &RenderContext,
    reports_release: bool,
) -> Result<()> {
    let frame = ctx.frame_interval();
    loop {
        let deadline = Instant::now() + frame;

        let mut draw_panicked = false;
        let draw_result = terminal.draw(|f| {
            if catch_unwind(AssertUnwindSafe(|| draw_menu(f, tree, ctx))).is_err() {
                draw_panicked = true;
            }
        });
        if draw_panicked {
            warn!("draw panicked; clearing terminal");
            let _ = terminal.clear();
        } else if let Err(e) = draw_result {
            warn!(error = %e, "draw failed");
            let _ = terminal.clear();
        }

        // Drain input until the next frame is due.
        loop {
            let wait = deadline.saturating_duration_since(Instant::now());
            if !event::poll(wait).map_err(|e| Error::msg(e.to_string()))? {
                break;
            }
            if let Event::Key(k) = event::read().map_err(|e| Error::msg(e.to_string()))? {
                match translate_key(&k, tree.scope().is_none()) {
                    KeyAction::Quit => {
                        info!("quit requested");
                        return Ok(());
                    }
                    KeyAction::Signal(signal) => apply_signal(tree, signal, reports_release),
                    KeyAction::Ignore => {}
                }
            }
        }
    }
}
