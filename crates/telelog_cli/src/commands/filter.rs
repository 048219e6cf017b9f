//! Filter command implementation.

use super::{open_package, print_messages};
use std::path::Path;
use telelog_core::Filter;

/// Filter options from the command line.
#[derive(Debug, Default)]
pub struct FilterArgs {
    /// Tags to include; all tags when empty.
    pub tags: Vec<String>,
    /// Earliest timestamp.
    pub from: Option<i64>,
    /// Latest timestamp.
    pub to: Option<i64>,
    /// Timestamp anchor.
    pub at: Option<i64>,
    /// First position.
    pub start: Option<u64>,
    /// Last position.
    pub end: Option<u64>,
    /// Result cap.
    pub count: Option<usize>,
}

impl FilterArgs {
    /// Builds the core filter. An open-ended range is bounded by the
    /// extreme value on its missing side.
    pub fn to_filter(&self) -> Filter {
        let mut filter = Filter::new();
        if !self.tags.is_empty() {
            filter = filter.tags(self.tags.iter().cloned());
        }
        if let Some(at) = self.at {
            filter = filter.timestamp_at(at);
        } else if self.from.is_some() || self.to.is_some() {
            filter = filter.timestamp_range(
                self.from.unwrap_or(i64::MIN),
                self.to.unwrap_or(i64::MAX),
            );
        }
        match (self.start, self.end) {
            (Some(start), None) => filter = filter.index_at(start),
            (start, Some(end)) => filter = filter.index_range(start.unwrap_or(0), end),
            (None, None) => {}
        }
        if let Some(count) = self.count {
            filter = filter.count(count);
        }
        filter
    }
}

/// Runs the filter command.
pub fn run(
    root: &Path,
    name: Option<&str>,
    args: &FilterArgs,
    format: &str,
) -> Result<(), Box<dyn std::error::Error>> {
    let reader = open_package(root, name)?;
    let positions = reader.filter_positions(&args.to_filter());
    print_messages(&reader, positions.into_iter(), format)
}

#[cfg(test)]
mod tests {
    use super::*;
    use telelog_core::Bound;

    #[test]
    fn open_ranges_use_extremes() {
        let args = FilterArgs {
            from: Some(10),
            end: Some(5),
            ..FilterArgs::default()
        };
        let filter = args.to_filter();
        assert_eq!(filter.timestamp, Some(Bound::Range(10, i64::MAX)));
        assert_eq!(filter.index, Some(Bound::Range(0, 5)));
        assert!(filter.message_tag.is_none());
    }

    #[test]
    fn anchor_wins_over_range() {
        let args = FilterArgs {
            tags: vec!["vision".into()],
            at: Some(7),
            start: Some(2),
            count: Some(3),
            ..FilterArgs::default()
        };
        let filter = args.to_filter();
        assert_eq!(filter.timestamp, Some(Bound::At(7)));
        assert_eq!(filter.index, Some(Bound::At(2)));
        assert_eq!(filter.count, Some(3));
        assert_eq!(filter.message_tag, Some(vec!["vision".to_string()]));
    }
}
