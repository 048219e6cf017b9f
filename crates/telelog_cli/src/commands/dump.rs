//! Dump command implementation.

use super::{open_package, print_messages};
use std::path::Path;

/// Runs the dump command.
pub fn run(
    root: &Path,
    name: Option<&str>,
    limit: Option<usize>,
    format: &str,
) -> Result<(), Box<dyn std::error::Error>> {
    let reader = open_package(root, name)?;
    let count = reader.get_msg_count();
    let shown = limit.map_or(count, |l| count.min(l as u64));
    print_messages(&reader, 0..shown, format)
}
