//! Command output is drawn straight into the terminal, so anything a
//! command prints has to be reduced to plain single-line text first.

const MAX_LABEL_CHARS: usize = 256;

enum EscapeMode {
    Esc,
    Csi,
    Osc,
    OscEsc,
    StTerminated,
    StEsc,
}

/// Strip escape sequences and control characters, fold line breaks and tabs
/// into single spaces, and cap the result at [`MAX_LABEL_CHARS`].
pub fn sanitize_label(input: &str) -> String {
    let mut out = String::with_capacity(input.len().min(MAX_LABEL_CHARS));
    let mut esc_mode: Option<EscapeMode> = None;
    let mut char_count = 0usize;
    let mut pending_space = false;

    for c in input.chars() {
        if let Some(mode) = esc_mode.as_ref() {
            esc_mode = match mode {
                EscapeMode::Esc => match c {
                    '[' => Some(EscapeMode::Csi),
                    ']' => Some(EscapeMode::Osc),
                    'P' | 'X' | '^' | '_' => Some(EscapeMode::StTerminated),
                    _ => None,
                },
                EscapeMode::Csi if ('@'..='~').contains(&c) => None,
                EscapeMode::Csi => Some(EscapeMode::Csi),
                EscapeMode::Osc => match c {
                    '\x07' => None,
                    '\x1b' => Some(EscapeMode::OscEsc),
                    _ => Some(EscapeMode::Osc),
                },
                EscapeMode::OscEsc => match c {
                    '\\' => None,
                    '\x1b' => Some(EscapeMode::OscEsc),
                    _ => Some(EscapeMode::Osc),
                },
                EscapeMode::StTerminated if c == '\x1b' => Some(EscapeMode::StEsc),
                EscapeMode::StTerminated => Some(EscapeMode::StTerminated),
                EscapeMode::StEsc => match c {
                    '\\' => None,
                    '\x1b' => Some(EscapeMode::StEsc),
                    _ => Some(EscapeMode::StTerminated),
                },
            };
            continue;
        }

        match c {
            '\x1b' => esc_mode = Some(EscapeMode::Esc),
            '\r' | '\n' | '\t' | ' ' => pending_space = !out.is_empty(),
            c if c.is_control() || is_format_control(c) => {}
            c => {
                if pending_space {
                    out.push(' ');
                    char_count += 1;
                    pending_space = false;
                }
                if char_count >= MAX_LABEL_CHARS {
                    out.push('…');
                    break;
                }
                out.push(c);
                char_count += 1;
            }
        }
    }

    out
}

fn is_format_control(c: char) -> bool {
    c == '\u{061C}'
        || c == '\u{200E}'
        || c == '\u{200F}'
        || ('\u{202A}'..='\u{202E}').contains(&c)
        || ('\u{2066}'..='\u{2069}').contains(&c)
}
