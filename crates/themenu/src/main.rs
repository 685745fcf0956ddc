use clap::{Args as ClapArgs, Parser, Subcommand};
use std::fs::OpenOptions;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::Duration;

use themenu::entity::MenuEntity;
use themenu::sanitize::sanitize_label;
use themenu::tree::MenuTree;
use themenu::ui::{RenderContext, ThemeName};
use themenu::{Error, Result};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(author, version, about, args_conflicts_with_subcommands = true)]
struct Args {
    /// Log file (the terminal belongs to the menu). Defaults to $TMPDIR/themenu.log
    #[arg(long, global = true)]
    log_file: Option<PathBuf>,
    #[command(subcommand)]
    cmd: Option<Command>,
    #[command(flatten)]
    run: RunArgs,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Show the menu (the default)
    Run(RunArgs),
    /// Load and validate a menu file, then print its item tree
    Check {
        /// Path to a menu file (.json or .toml)
        config: PathBuf,
    },
    /// Start the menu's commands, wait, and print the resolved root labels
    Print {
        /// Path to a menu file (.json or .toml)
        config: PathBuf,
        /// How long to let commands settle before reading labels
        #[arg(long, default_value = "500ms", value_parser = themenu::duration::parse_duration)]
        settle: Duration,
    },
}

#[derive(Debug, Clone, ClapArgs)]
struct RunArgs {
    /// Path to a menu file (.json or .toml)
    #[arg(long, default_value = "config.json")]
    config: PathBuf,
    /// Menu width in columns
    #[arg(long, default_value_t = 60)]
    width: u16,
    /// Border thickness (0 = none)
    #[arg(long, default_value_t = 0)]
    border: u16,
    /// Frame rate limit
    #[arg(long, default_value_t = 60)]
    fps: u32,
    /// Color theme: dracula, grayscale or blue-on-black
    #[arg(long, default_value = "dracula")]
    theme: ThemeName,
}

fn init_tracing(log_file: Option<&Path>) -> Result<()> {
    let path = log_file
        .map(Path::to_path_buf)
        .unwrap_or_else(|| std::env::temp_dir().join("themenu.log"));
    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(&path)
        .map_err(|e| Error::msg(format!("failed to open log file {}: {e}", path.display())))?;
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new("info"))
        .unwrap_or_else(|_| EnvFilter::new("info"));
    let is_json = matches!(
        std::env::var("THEMENU_LOG_FORMAT").ok().as_deref(),
        Some("json") | Some("JSON")
    );
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(Mutex::new(file))
        .with_ansi(false);
    if is_json {
        builder.json().init();
    } else {
        builder.init();
    }
    Ok(())
}

fn main() -> Result<()> {
    let args = Args::parse();
    init_tracing(args.log_file.as_deref())?;
    let result = match args.cmd {
        Some(Command::Run(run)) => cmd_run(&run),
        Some(Command::Check { config }) => cmd_check(&config),
        Some(Command::Print { config, settle }) => cmd_print(&config, settle),
        None => cmd_run(&args.run),
    };
    if let Err(e) = &result {
        error!(error = %e, "themenu error");
    }
    result
}

fn cmd_run(args: &RunArgs) -> Result<()> {
    info!(config = %args.config.display(), "loading config");
    let cfg = themenu::config::load(&args.config)?;
    let mut tree = MenuTree::new(&cfg);
    tree.start();
    let ctx = RenderContext {
        theme: args.theme.theme(),
        width: args.width,
        border: args.border,
        fps: args.fps,
        ..RenderContext::default()
    };
    themenu::ui::run_tui(&mut tree, &ctx)?;
    info!("shutting down");
    Ok(())
}

fn cmd_check(path: &Path) -> Result<()> {
    let cfg = themenu::config::load(path)?;
    let tree = MenuTree::new(&cfg);
    println!("{}: ok", path.display());
    for entity in tree.root() {
        print_entity(entity, 1);
    }
    Ok(())
}

fn print_entity(entity: &MenuEntity, depth: usize) {
    let indent = "  ".repeat(depth);
    let key = if entity.action_key().is_empty() {
        "-"
    } else {
        entity.action_key()
    };
    let mut line = format!("{indent}[{key}] {} ({})", entity.id(), entity.kind().as_str());
    if let Some(p) = entity.label_command() {
        line.push_str(&format!(" label_command={:?}", p.spec().shell_command));
    }
    if let Some(t) = entity.toggle() {
        line.push_str(&format!(
            " state_command={:?}",
            t.state_command().spec().shell_command
        ));
    }
    if let Some(c) = entity.condition() {
        line.push_str(&format!(" if={:?}", c.evaluator().command()));
    }
    if let Some(p) = entity.action_command() {
        line.push_str(&format!(" command={:?}", p.spec().shell_command));
    }
    println!("{line}");
    for sub in entity.sub_items() {
        print_entity(sub, depth + 1);
    }
}

fn cmd_print(path: &Path, settle: Duration) -> Result<()> {
    let cfg = themenu::config::load(path)?;
    let tree = MenuTree::new(&cfg);
    tree.start();
    std::thread::sleep(settle);
    for entity in tree.root() {
        let key = if entity.action_key().is_empty() {
            " "
        } else {
            entity.action_key()
        };
        let busy = if entity.busy() { " [busy]" } else { "" };
        println!("[{key}] {}{busy}", sanitize_label(&entity.label()));
    }
    Ok(())
}
