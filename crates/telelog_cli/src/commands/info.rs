//! Info and tags command implementations.

use super::{format_timestamp, open_package};
use serde::Serialize;
use std::path::Path;

/// Package metadata as printed by `info`.
#[derive(Debug, Serialize)]
pub struct InfoResult {
    /// Package name.
    pub name: String,
    /// Package directory.
    pub path: Option<String>,
    /// `clean` or `partial`.
    pub status: String,
    /// Number of messages.
    pub message_count: u64,
    /// First timestamp, if any.
    pub start_timestamp: Option<i64>,
    /// Last timestamp, if any.
    pub end_timestamp: Option<i64>,
    /// Per-tag statistics.
    pub tags: Vec<TagRow>,
}

/// Per-tag statistics.
#[derive(Debug, Serialize)]
pub struct TagRow {
    /// Tag name.
    pub tag: String,
    /// Number of messages.
    pub count: u64,
    /// First timestamp.
    pub start_timestamp: Option<i64>,
    /// Last timestamp.
    pub end_timestamp: Option<i64>,
}

/// Runs the info command.
pub fn run(
    root: &Path,
    name: Option<&str>,
    format: &str,
) -> Result<(), Box<dyn std::error::Error>> {
    let reader = open_package(root, name)?;
    let info = reader.get_log_info();
    let result = InfoResult {
        name: info.name,
        path: reader.path().map(|p| p.display().to_string()),
        status: info.status.to_string(),
        message_count: info.message_count,
        start_timestamp: info.start_timestamp,
        end_timestamp: info.end_timestamp,
        tags: reader
            .tag_summary()
            .into_iter()
            .map(|s| TagRow {
                tag: s.tag,
                count: s.count,
                start_timestamp: s.start_timestamp,
                end_timestamp: s.end_timestamp,
            })
            .collect(),
    };

    match format {
        "json" => {
            println!("{}", serde_json::to_string_pretty(&result)?);
        }
        _ => print_text_output(&result),
    }
    Ok(())
}

/// Runs the tags command.
pub fn run_tags(root: &Path, name: Option<&str>) -> Result<(), Box<dyn std::error::Error>> {
    let reader = open_package(root, name)?;
    for tag in reader.tags() {
        println!("{tag}");
    }
    Ok(())
}

fn print_text_output(result: &InfoResult) {
    println!("Telelog Package");
    println!("===============");
    println!();
    println!("Name:     {}", result.name);
    if let Some(path) = &result.path {
        println!("Path:     {path}");
    }
    println!("Status:   {}", result.status);
    println!("Messages: {}", result.message_count);
    println!("Start:    {}", time_or_dash(result.start_timestamp));
    println!("End:      {}", time_or_dash(result.end_timestamp));

    if !result.tags.is_empty() {
        println!();
        println!("Tags:");
        for row in &result.tags {
            println!(
                "  {:<16} {:>8} msgs  {} .. {}",
                row.tag,
                row.count,
                time_or_dash(row.start_timestamp),
                time_or_dash(row.end_timestamp)
            );
        }
    }
}

fn time_or_dash(timestamp: Option<i64>) -> String {
    timestamp.map_or_else(|| "-".to_string(), format_timestamp)
}
