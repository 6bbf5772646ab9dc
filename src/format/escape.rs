use chrono::{DateTime, FixedOffset, Local, NaiveDateTime, Utc};

use super::EscapeStyle;

use super::DATETIME_FORMAT;

pub(super) fn quote_str(s: &str, style: EscapeStyle) -> String {
    let mut out = String::with_capacity(s.len() + 2);
    out.push('\'');
    match style {
        EscapeStyle::MySql => {
            for c in s.chars() {
                match c {
                    '\0' => out.push_str("\\0"),
                    '\u{8}' => out.push_str("\\b"),
                    '\t' => out.push_str("\\t"),
                    '\n' => out.push_str("\\n"),
                    '\r' => out.push_str("\\r"),
                    '\u{1a}' => out.push_str("\\Z"),
                    '"' => out.push_str("\\\""),
                    '\'' => out.push_str("\\'"),
                    '\\' => out.push_str("\\\\"),
                    other => out.push(other),
                }
            }
        }
        EscapeStyle::Standard => {
            for c in s.chars() {
                if c == '\'' {
                    out.push('\'');
                }
                out.push(c);
            }
        }
    }
    out.push('\'');
    out
}

/// Quote an identifier, treating `.` as a qualifier separator.
pub(super) fn quote_identifier(name: &str, style: EscapeStyle) -> String {
    let quote = match style {
        EscapeStyle::MySql => '`',
        EscapeStyle::Standard => '"',
    };
    name.split('.')
        .map(|part| {
            let mut out = String::with_capacity(part.len() + 2);
            out.push(quote);
            for c in part.chars() {
                if c == quote {
                    out.push(quote);
                }
                out.push(c);
            }
            out.push(quote);
            out
        })
        .collect::<Vec<_>>()
        .join(".")
}

pub(super) fn hex_literal(bytes: &[u8]) -> String {
    use std::fmt::Write;

    let mut out = String::with_capacity(bytes.len() * 2 + 3);
    out.push_str("X'");
    for b in bytes {
        let _ = write!(out, "{b:02x}");
    }
    out.push('\'');
    out
}

pub(super) fn float_literal(value: f64) -> String {
    if value.is_finite() {
        value.to_string()
    } else {
        "NULL".to_string()
    }
}

pub(super) fn naive_text(value: &NaiveDateTime) -> String {
    value.format(DATETIME_FORMAT).to_string()
}

pub(super) fn naive_literal(value: &NaiveDateTime, style: EscapeStyle) -> String {
    quote_str(&naive_text(value), style)
}

/// Wall-clock text of a UTC instant in `timezone`.
pub(super) fn instant_text(value: &DateTime<Utc>, timezone: Option<&str>) -> String {
    let wall = match timezone.map(str::trim) {
        None | Some("Z" | "z" | "UTC" | "utc" | "") => value.naive_utc(),
        Some("local") => value.with_timezone(&Local).naive_local(),
        Some(offset) => match parse_offset(offset) {
            Some(fixed) => value.with_timezone(&fixed).naive_local(),
            None => {
                tracing::debug!(timezone = offset, "unrecognised timezone, rendering as UTC");
                value.naive_utc()
            }
        },
    };
    naive_text(&wall)
}

pub(super) fn instant_literal(
    value: &DateTime<Utc>,
    timezone: Option<&str>,
    style: EscapeStyle,
) -> String {
    quote_str(&instant_text(value, timezone), style)
}

/// Parse `+HH:MM`, `-HH:MM` or `+HHMM`.
pub(super) fn parse_offset(text: &str) -> Option<FixedOffset> {
    let (sign, rest) = match text.as_bytes().first()? {
        b'+' => (1, &text[1..]),
        b'-' => (-1, &text[1..]),
        _ => return None,
    };
    let digits: String = rest.chars().filter(|c| *c != ':').collect();
    if digits.len() != 4 || !digits.chars().all(|c| c.is_ascii_digit()) {
        return None;
    }
    let hours: i32 = digits[..2].parse().ok()?;
    let minutes: i32 = digits[2..].parse().ok()?;
    FixedOffset::east_opt(sign * (hours * 3600 + minutes * 60))
}
