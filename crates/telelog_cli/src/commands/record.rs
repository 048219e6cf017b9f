//! Record command implementation.

use std::collections::BTreeMap;
use std::fs;
use std::io::{self, BufRead};
use std::net::IpAddr;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};
use telelog_core::{ChannelMap, Endpoint, RecorderConfig, RecorderSession};
use tracing::info;

use super::format_size;

const WAIT_STEP: Duration = Duration::from_millis(200);

/// Parses a channel file: a JSON object mapping tags to `[group, port]`.
///
/// ```json
/// { "vision": ["233.233.233.233", 41001], "ctrl": ["233.233.233.233", 41002] }
/// ```
pub fn parse_channels(text: &str) -> Result<ChannelMap, Box<dyn std::error::Error>> {
    let raw: BTreeMap<String, (String, u16)> = serde_json::from_str(text)?;
    raw.into_iter()
        .map(|(tag, (group, port))| -> Result<_, Box<dyn std::error::Error>> {
            let group: IpAddr = group
                .parse()
                .map_err(|e| format!("channel '{tag}': bad group '{group}': {e}"))?;
            Ok((tag, Endpoint::new(group, port)))
        })
        .collect()
}

/// Runs the record command.
pub fn run(
    root: &Path,
    channels_file: &Path,
    duration: Option<u64>,
    max_package_mb: Option<u64>,
) -> Result<(), Box<dyn std::error::Error>> {
    let channels = parse_channels(&fs::read_to_string(channels_file)?)?;
    let config =
        RecorderConfig::new().max_package_size(max_package_mb.map(|mb| mb * 1024 * 1024));

    let session = RecorderSession::create(root, config)?;
    let summary = session.start(&channels)?;
    for err in &summary.failed {
        eprintln!("warning: {err}");
    }
    println!(
        "Recording {} channel(s) into {}",
        summary.started.len(),
        root.display()
    );

    let deadline = duration.map(|secs| Instant::now() + Duration::from_secs(secs));
    let quit = Arc::new(AtomicBool::new(false));
    if deadline.is_none() {
        println!("Press Enter to stop.");
        let quit = Arc::clone(&quit);
        thread::spawn(move || {
            let mut line = String::new();
            let _ = io::stdin().lock().read_line(&mut line);
            quit.store(true, Ordering::Release);
        });
    }

    while session.is_running()
        && !quit.load(Ordering::Acquire)
        && deadline.map_or(true, |d| Instant::now() < d)
    {
        thread::sleep(WAIT_STEP);
    }

    let stopped = session.stop();
    for stats in session.channel_stats() {
        println!(
            "  {:<16} {:<22} received {:>8}  appended {:>8}  malformed {:>6}  dropped {:>6}",
            stats.tag,
            stats.endpoint.to_string(),
            stats.received,
            stats.appended,
            stats.malformed,
            stats.dropped
        );
    }
    for path in session.packages() {
        let size = fs::read_dir(&path)
            .map(|dir| {
                dir.filter_map(Result::ok)
                    .filter_map(|e| e.metadata().ok())
                    .map(|m| m.len())
                    .sum::<u64>()
            })
            .unwrap_or(0);
        println!("  {}  {}", path.display(), format_size(size));
    }
    info!(clamped = session.clamped(), "recording finished");
    stopped?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_group_port_pairs() {
        let channels = parse_channels(
            r#"{"vision": ["233.233.233.233", 41001], "ctrl": ["127.0.0.1", 41002]}"#,
        )
        .unwrap();
        assert_eq!(channels.len(), 2);
        assert_eq!(channels["vision"].to_string(), "233.233.233.233:41001");
        assert!(!channels["ctrl"].is_multicast());
    }

    #[test]
    fn rejects_bad_groups() {
        assert!(parse_channels(r#"{"vision": ["not-an-ip", 1]}"#).is_err());
        assert!(parse_channels(r#"{"vision": "233.0.0.1:1"}"#).is_err());
    }
}
