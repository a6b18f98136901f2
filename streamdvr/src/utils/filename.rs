//! Recording filename construction.
//!
//! Streamer names come from remote sites and end up as path components, so
//! they are sanitized for every platform before use.

use chrono::{DateTime, Local};

/// Extension recorders write with.
pub const RECORDING_EXTENSION: &str = "ts";

/// Characters that are invalid in Windows filenames, plus both separators.
const INVALID_CHARS: &[char] = &['<', '>', ':', '"', '/', '\\', '|', '?', '*'];

/// Windows reserved filenames (case-insensitive)
const RESERVED_NAMES: &[&str] = &[
    "CON", "PRN", "AUX", "NUL", "COM1", "COM2", "COM3", "COM4", "COM5", "COM6", "COM7", "COM8",
    "COM9", "LPT1", "LPT2", "LPT3", "LPT4", "LPT5", "LPT6", "LPT7", "LPT8", "LPT9",
];

/// Make `input` safe to use as a single path component.
///
/// Invalid and control characters collapse into one `_`, leading and
/// trailing spaces/dots are dropped, reserved Windows names get a `_`
/// prefix and an empty result becomes `unnamed`.
pub fn sanitize_component(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    let mut replaced = false;

    for c in input.chars() {
        if c.is_control() || INVALID_CHARS.contains(&c) {
            if !replaced {
                out.push('_');
                replaced = true;
            }
        } else {
            out.push(c);
            replaced = false;
        }
    }

    let trimmed = out.trim_matches(|c| c == ' ' || c == '.');
    if trimmed.is_empty() {
        return "unnamed".to_string();
    }

    let stem = trimmed.split('.').next().unwrap_or(trimmed);
    if RESERVED_NAMES.iter().any(|r| r.eq_ignore_ascii_case(stem)) {
        return format!("_{}", trimmed);
    }

    trimmed.to_string()
}

/// Build the recording filename (without extension) for a capture.
///
/// Format: `<name>_[<site>_]<timestamp>`.
pub fn recording_filename(
    name: &str,
    site: Option<&str>,
    date_format: &str,
    now: DateTime<Local>,
) -> String {
    let name = sanitize_component(name);
    let stamp = now.format(date_format).to_string();
    match site {
        Some(site) => format!("{}_{}_{}", name, sanitize_component(site), stamp),
        None => format!("{}_{}", name, stamp),
    }
}

/// Append the recording extension to a filename stem.
pub fn with_extension(stem: &str) -> String {
    format!("{}.{}", stem, RECORDING_EXTENSION)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_sanitize_component() {
        assert_eq!(sanitize_component(""), "unnamed");
        assert_eq!(sanitize_component("hello?world"), "hello_world");
        assert_eq!(sanitize_component("a/../b"), "a_.._b");
        assert_eq!(sanitize_component("a<>:\"b"), "a_b");
        assert_eq!(sanitize_component(" . name . "), "name");
        assert_eq!(sanitize_component("观看一只青蛙?"), "观看一只青蛙_");
    }

    #[test]
    fn test_reserved_names_prefixed() {
        assert_eq!(sanitize_component("con"), "_con");
        assert_eq!(sanitize_component("LPT1.ts"), "_LPT1.ts");
        assert_eq!(sanitize_component("console"), "console");
    }

    #[test]
    fn test_recording_filename() {
        let now = Local.with_ymd_and_hms(2024, 3, 9, 21, 5, 7).unwrap();

        assert_eq!(
            recording_filename("alice", None, "%Y%m%d-%H%M%S", now),
            "alice_20240309-210507"
        );
        assert_eq!(
            recording_filename("alice", Some("twitch"), "%Y%m%d", now),
            "alice_twitch_20240309"
        );
        assert_eq!(with_extension("alice_20240309"), "alice_20240309.ts");
    }
}
