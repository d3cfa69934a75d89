//! Value formatting shared by the renderers.

use std::time::SystemTime;

use chrono::{DateTime, Local};

const SIZE_UNITS: [&str; 6] = ["b", "kb", "mb", "gb", "tb", "pb"];

/// `lastModified` in local time, `YYYY-MM-DD HH:MM`.
pub fn format_timestamp(time: SystemTime) -> String {
    DateTime::<Local>::from(time).format("%Y-%m-%d %H:%M").to_string()
}

/// Human-readable size used by the raw renderer: `512b`, `1.5kb`, `12mb`.
pub fn format_file_size(bytes: u64) -> String {
    if bytes < 1024 {
        return format!("{bytes}b");
    }
    let mut value = bytes as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < SIZE_UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    if value < 10.0 {
        let formatted = format!("{value:.1}");
        let trimmed = formatted.strip_suffix(".0").unwrap_or(&formatted);
        format!("{trimmed}{}", SIZE_UNITS[unit])
    } else {
        format!("{value:.0}{}", SIZE_UNITS[unit])
    }
}
