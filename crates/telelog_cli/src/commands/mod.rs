//! CLI command implementations.

pub mod dump;
pub mod filter;
pub mod info;
pub mod list;
pub mod record;

use chrono::{DateTime, Local};
use serde::Serialize;
use std::path::Path;
use telelog_core::{catalog, CoreResult, Message, PackageReader};

/// Opens `name` under `root`, or the latest clean package.
pub fn open_package(
    root: &Path,
    name: Option<&str>,
) -> Result<PackageReader, Box<dyn std::error::Error>> {
    let reader = match name {
        Some(name) => catalog::open(root, name)?
            .ok_or_else(|| format!("No package named {name} under {}", root.display()))?,
        None => catalog::open_latest(root)?
            .ok_or_else(|| format!("No cleanly closed package under {}", root.display()))?,
    };
    Ok(reader)
}

/// One message as printed by `dump` and `filter`.
#[derive(Debug, Serialize)]
pub struct MessageRow {
    /// Position in the package.
    pub position: u64,
    /// Timestamp in nanoseconds.
    pub timestamp: i64,
    /// Channel tag.
    pub tag: String,
    /// Sender address.
    pub source: String,
    /// Payload size in bytes.
    pub size: usize,
    /// Payload as text when printable, hex otherwise.
    pub payload: String,
}

impl MessageRow {
    fn new(position: u64, message: &Message) -> Self {
        Self {
            position,
            timestamp: message.timestamp(),
            tag: message.tag().to_string(),
            source: message.source().to_string(),
            size: message.payload().len(),
            payload: preview(message.payload()),
        }
    }
}

/// Reads `positions` and prints them in `format`.
pub fn print_messages(
    reader: &PackageReader,
    positions: impl Iterator<Item = u64>,
    format: &str,
) -> Result<(), Box<dyn std::error::Error>> {
    let rows = positions
        .map(|p| reader.message(p).map(|m| MessageRow::new(p, &m)))
        .collect::<CoreResult<Vec<_>>>()?;

    match format {
        "json" => {
            println!("{}", serde_json::to_string_pretty(&rows)?);
        }
        _ => {
            for row in &rows {
                println!(
                    "{:>8}  {}  {:<12} {:<22} {:>6}  {}",
                    row.position,
                    format_timestamp(row.timestamp),
                    row.tag,
                    row.source,
                    row.size,
                    row.payload
                );
            }
            println!("{} message(s)", rows.len());
        }
    }
    Ok(())
}

const PREVIEW_BYTES: usize = 48;

fn preview(payload: &[u8]) -> String {
    let head = &payload[..payload.len().min(PREVIEW_BYTES)];
    let more = if payload.len() > PREVIEW_BYTES { "…" } else { "" };
    match std::str::from_utf8(head) {
        Ok(text) if text.chars().all(|c| !c.is_control()) => format!("{text}{more}"),
        _ => {
            let hex: String = head.iter().map(|b| format!("{b:02x}")).collect();
            format!("0x{hex}{more}")
        }
    }
}

/// Local wall-clock rendering of a nanosecond timestamp.
pub fn format_timestamp(nanos: i64) -> String {
    let time = DateTime::from_timestamp_nanos(nanos).with_timezone(&Local);
    time.format("%Y-%m-%d %H:%M:%S%.6f").to_string()
}

/// Size in MB, as the catalog listing prints it.
pub fn format_size(bytes: u64) -> String {
    format!("{:.2} MB", bytes as f64 / (1024.0 * 1024.0))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn preview_text_and_binary() {
        assert_eq!(preview(b"hello"), "hello");
        assert_eq!(preview(&[0u8, 255]), "0x00ff");
        assert!(preview(&[b'a'; 100]).ends_with('…'));
    }

    #[test]
    fn sizes_in_megabytes() {
        assert_eq!(format_size(0), "0.00 MB");
        assert_eq!(format_size(5 * 1024 * 1024), "5.00 MB");
    }
}
