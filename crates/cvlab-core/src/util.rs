use std::fs::{create_dir_all, OpenOptions};
use std::io::Write;
use std::path::Path;

use chrono::{DateTime, Local};

/// Minute-resolution stamp used by action documents, team log and brain state.
pub const MINUTE_FORMAT: &str = "%Y-%m-%d %H:%M";
/// Second-resolution stamp used by journal events.
pub const SECOND_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

pub fn minute_stamp(at: DateTime<Local>) -> String {
    at.format(MINUTE_FORMAT).to_string()
}

pub fn second_stamp(at: DateTime<Local>) -> String {
    at.format(SECOND_FORMAT).to_string()
}

/// Parse a boolean-like environment flag.
/// Accepts common values such as 1/0, true/false, yes/no, on/off (case-insensitive).
pub fn parse_bool_flag(raw: &str) -> Option<bool> {
    let normalized = raw.trim().to_ascii_lowercase();
    match normalized.as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

/// Read an environment variable and parse it as a boolean flag using [`parse_bool_flag`].
pub fn env_bool(key: &str) -> Option<bool> {
    std::env::var(key)
        .ok()
        .and_then(|raw| parse_bool_flag(&raw))
}

/// Read a non-empty environment variable.
pub fn env_string(key: &str) -> Option<String> {
    std::env::var(key)
        .ok()
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

/// Append text to a log file, creating parent directories on first use.
pub fn append_text(path: &Path, stamp: Option<&str>, text: &str) -> std::io::Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            create_dir_all(parent)?;
        }
    }
    let mut file = OpenOptions::new().create(true).append(true).open(path)?;
    if let Some(stamp_value) = stamp {
        writeln!(file, "=== {} ===", stamp_value)?;
    }
    writeln!(file, "{}", text.trim_end())?;
    Ok(())
}
