//! Go-style duration strings as used by the menu config (`"250ms"`, `"5s"`, `"1m30s"`).

use std::time::Duration;

use crate::error::{Error, Result};

pub fn parse_duration(raw: &str) -> Result<Duration> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(Error::msg("empty duration"));
    }
    if trimmed.starts_with('-') {
        return Err(Error::msg(format!(
            "invalid duration '{raw}': must be non-negative"
        )));
    }
    let mut rest = trimmed.strip_prefix('+').unwrap_or(trimmed);
    if rest == "0" {
        return Ok(Duration::ZERO);
    }

    let mut total_nanos = 0.0f64;
    while !rest.is_empty() {
        let num_len = number_prefix_len(rest);
        if num_len == 0 {
            return Err(Error::msg(format!("invalid duration '{raw}'")));
        }
        let value = rest[..num_len]
            .parse::<f64>()
            .map_err(|_| Error::msg(format!("invalid duration '{raw}'")))?;

        rest = &rest[num_len..];
        let Some((unit, scale)) = duration_unit(rest) else {
            return Err(Error::msg(format!(
                "invalid duration '{raw}': missing unit (ns, us, ms, s, m, h)"
            )));
        };
        total_nanos += value * scale;
        rest = &rest[unit.len()..];
    }

    if !total_nanos.is_finite() || total_nanos >= u64::MAX as f64 {
        return Err(Error::msg(format!("duration '{raw}' out of range")));
    }
    Ok(Duration::from_nanos(total_nanos.round() as u64))
}

fn number_prefix_len(input: &str) -> usize {
    let mut len = 0usize;
    let mut saw_digit = false;
    let mut saw_dot = false;
    for ch in input.chars() {
        if ch.is_ascii_digit() {
            saw_digit = true;
        } else if ch == '.' && !saw_dot {
            saw_dot = true;
        } else {
            break;
        }
        len += ch.len_utf8();
    }
    if saw_digit { len } else { 0 }
}

fn duration_unit(input: &str) -> Option<(&'static str, f64)> {
    // Longest prefixes first: "ms" must win over "m".
    const UNITS: &[(&str, f64)] = &[
        ("ns", 1.0),
        ("us", 1e3),
        ("µs", 1e3),
        ("μs", 1e3),
        ("ms", 1e6),
        ("s", 1e9),
        ("m", 60e9),
        ("h", 3600e9),
    ];
    UNITS
        .iter()
        .find(|(unit, _)| input.starts_with(unit))
        .copied()
}
