use chrono::{DateTime, Utc};
use itertools::Itertools;

use crate::api::Status;

/// `none`/`off` disables the unpaginated listing; anything else must name a
/// status.
pub fn parse_full_fetch_status(value: &str) -> Result<Option<Status>, String> {
    let raw = value.trim();
    if raw.is_empty() {
        return Err("value is empty".to_string());
    }
    match raw.to_lowercase().as_str() {
        "none" | "off" | "false" => Ok(None),
        _ => Status::parse(raw)
            .map(Some)
            .ok_or_else(|| format!("unknown status '{raw}'")),
    }
}

/// Collapses runs of whitespace, newlines included, into single spaces.
pub fn single_line(text: &str) -> String {
    text.split_whitespace().join(" ")
}

pub fn clip(text: &str, max_chars: usize) -> String {
    let text = single_line(text);
    if text.chars().count() <= max_chars {
        return text;
    }
    if max_chars <= 3 {
        return text.chars().take(max_chars).collect();
    }
    let head: String = text.chars().take(max_chars - 3).collect();
    format!("{}...", head.trim_end())
}

pub fn format_timestamp(value: &DateTime<Utc>) -> String {
    value.format("%Y-%m-%d %H:%M").to_string()
}

pub fn format_percent(value: f64) -> String {
    format!("{value:.1}%")
}
