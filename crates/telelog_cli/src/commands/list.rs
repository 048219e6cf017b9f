//! List command implementation.

use super::{format_size, format_timestamp};
use serde::Serialize;
use std::path::Path;
use telelog_core::catalog;

/// One catalog row.
#[derive(Debug, Serialize)]
pub struct PackageRow {
    /// Package name.
    pub name: String,
    /// `clean` or `partial`.
    pub status: String,
    /// Creation time in nanoseconds.
    pub created_at: i64,
    /// Combined file size in bytes.
    pub size_bytes: u64,
    /// Message count, known for clean packages only.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message_count: Option<u64>,
}

/// Runs the list command.
pub fn run(root: &Path, format: &str) -> Result<(), Box<dyn std::error::Error>> {
    let rows: Vec<PackageRow> = catalog::list_packages(root)?
        .into_iter()
        .map(|entry| PackageRow {
            name: entry.name,
            status: entry.status.to_string(),
            created_at: entry.created_at,
            size_bytes: entry.size_bytes,
            message_count: entry.message_count,
        })
        .collect();

    match format {
        "json" => {
            println!("{}", serde_json::to_string_pretty(&rows)?);
        }
        _ => print_text_output(root, &rows),
    }
    Ok(())
}

fn print_text_output(root: &Path, rows: &[PackageRow]) {
    if rows.is_empty() {
        println!("No packages under {}", root.display());
        return;
    }
    println!("Packages under {}", root.display());
    println!();
    for row in rows {
        let count = row
            .message_count
            .map_or_else(|| "?".to_string(), |c| c.to_string());
        println!(
            "  {:<36} {:<8} {}  {:>10}  {:>8} msgs",
            row.name,
            row.status,
            format_timestamp(row.created_at),
            format_size(row.size_bytes),
            count
        );
    }
}
