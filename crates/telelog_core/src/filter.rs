//! Message filtering.
//!
//! A [`Filter`] combines up to four constraints, all ANDed:
//!
//! - `message_tag`: any of the listed tags
//! - `timestamp`: a point (anchor) or an inclusive range
//! - `index`: a start position or an inclusive position range
//! - `count`: cap on the number of results
//!
//! Resolution never scans the package. Index and timestamp ranges become a
//! position window by binary search; tag constraints cut each tag's position
//! list to that window and merge the lists lazily. Results are always
//! ascending by position.

use crate::index::{closest_at_or_before, partition_point, OrderedIndex, TagId};
use crate::message::Timestamp;
use std::cmp::Reverse;
use std::collections::BinaryHeap;

/// A point or an inclusive range.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Bound<T> {
    /// A single value.
    At(T),
    /// Inclusive `start..=end`. Empty when `start > end`.
    Range(T, T),
}

/// Filter criteria for [`crate::PackageReader::filter`].
///
/// # Example
///
/// ```rust,ignore
/// let filter = Filter::new()
///     .tag("vision")
///     .tag("debug")
///     .timestamp_range(start, end)
///     .count(100);
/// for msg in reader.filter(&filter) {
///     let msg = msg?;
/// }
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Filter {
    /// Tags to include. An empty list matches nothing.
    pub message_tag: Option<Vec<String>>,
    /// Timestamp anchor or inclusive range.
    pub timestamp: Option<Bound<Timestamp>>,
    /// Start position or inclusive position range.
    pub index: Option<Bound<u64>>,
    /// Maximum number of results. Defaults to 1 for a timestamp anchor and
    /// to unlimited otherwise.
    pub count: Option<usize>,
}

impl Filter {
    /// A filter with no constraints.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds one tag to the tag list.
    #[must_use]
    pub fn tag(mut self, tag: impl Into<String>) -> Self {
        self.message_tag.get_or_insert_with(Vec::new).push(tag.into());
        self
    }

    /// Adds several tags to the tag list.
    #[must_use]
    pub fn tags<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.message_tag
            .get_or_insert_with(Vec::new)
            .extend(tags.into_iter().map(Into::into));
        self
    }

    /// Anchors the result at the message closest at or before `timestamp`.
    #[must_use]
    pub const fn timestamp_at(mut self, timestamp: Timestamp) -> Self {
        self.timestamp = Some(Bound::At(timestamp));
        self
    }

    /// Restricts to timestamps in `start..=end`.
    #[must_use]
    pub const fn timestamp_range(mut self, start: Timestamp, end: Timestamp) -> Self {
        self.timestamp = Some(Bound::Range(start, end));
        self
    }

    /// Starts at position `index`.
    #[must_use]
    pub const fn index_at(mut self, index: u64) -> Self {
        self.index = Some(Bound::At(index));
        self
    }

    /// Restricts to positions in `start..=end`.
    #[must_use]
    pub const fn index_range(mut self, start: u64, end: u64) -> Self {
        self.index = Some(Bound::Range(start, end));
        self
    }

    /// Caps the number of results.
    #[must_use]
    pub const fn count(mut self, count: usize) -> Self {
        self.count = Some(count);
        self
    }
}

/// One tag's slice of the position window, as indices into that tag's
/// position list.
#[derive(Debug, Clone, Copy)]
struct Run {
    tag_id: TagId,
    next: usize,
    end: usize,
}

#[derive(Debug)]
enum Plan {
    Empty,
    Window {
        next: usize,
        end: usize,
    },
    Merge {
        runs: Vec<Run>,
        heap: BinaryHeap<Reverse<(usize, usize)>>,
    },
}

/// A resolved filter: yields matching positions on demand.
///
/// Holds no reference to the index so it can live next to a shared view.
#[derive(Debug)]
pub(crate) struct Selection {
    plan: Plan,
    remaining: Option<usize>,
}

impl Selection {
    /// Resolves `filter` against `index`.
    pub(crate) fn plan(index: &OrderedIndex, filter: &Filter) -> Self {
        let anchor = match filter.timestamp {
            Some(Bound::At(t)) => Some(t),
            _ => None,
        };
        let remaining = filter.count.or(anchor.map(|_| 1));
        let empty = Self {
            plan: Plan::Empty,
            remaining,
        };
        if remaining == Some(0) {
            return empty;
        }

        let Some((lo, hi)) = window(index, filter) else {
            return empty;
        };

        let plan = match &filter.message_tag {
            None => {
                let next = match anchor {
                    Some(t) => {
                        lo + closest_at_or_before(hi - lo, |i| timestamp_of(index, lo + i), t)
                            .unwrap_or(0)
                    }
                    None => lo,
                };
                Plan::Window { next, end: hi }
            }
            Some(tags) => {
                let mut runs = tag_runs(index, tags, lo, hi);
                if let Some(t) = anchor {
                    match anchor_position(index, &runs, t) {
                        Some(start) => cut_runs_before(index, &mut runs, start),
                        None => runs.clear(),
                    }
                }
                merge_plan(index, runs)
            }
        };

        Self { plan, remaining }
    }

    /// Next matching position, ascending.
    pub(crate) fn next_position(&mut self, index: &OrderedIndex) -> Option<usize> {
        if self.remaining == Some(0) {
            return None;
        }
        let position = match &mut self.plan {
            Plan::Empty => None,
            Plan::Window { next, end } => {
                if *next < *end {
                    *next += 1;
                    Some(*next - 1)
                } else {
                    None
                }
            }
            Plan::Merge { runs, heap } => {
                let Reverse((position, run_idx)) = heap.pop()?;
                let run = &mut runs[run_idx];
                run.next += 1;
                if run.next < run.end {
                    let positions = index.positions_for_tag_id(run.tag_id);
                    heap.push(Reverse((positions[run.next], run_idx)));
                }
                Some(position)
            }
        };
        if position.is_some() {
            if let Some(remaining) = self.remaining.as_mut() {
                *remaining -= 1;
            }
        }
        position
    }
}

fn timestamp_of(index: &OrderedIndex, position: usize) -> Timestamp {
    index.entries()[position].timestamp
}

/// Position window `[lo, hi)` after index and timestamp-range narrowing.
fn window(index: &OrderedIndex, filter: &Filter) -> Option<(usize, usize)> {
    let len = index.len();
    let to_usize = |v: u64| usize::try_from(v).unwrap_or(usize::MAX);

    let (mut lo, mut hi) = match filter.index {
        None => (0, len),
        Some(Bound::At(start)) => (to_usize(start), len),
        Some(Bound::Range(start, end)) if start <= end => {
            (to_usize(start), to_usize(end).saturating_add(1).min(len))
        }
        Some(Bound::Range(..)) => return None,
    };

    match filter.timestamp {
        Some(Bound::Range(start, end)) if start <= end => {
            lo = lo.max(index.lower_bound(start));
            hi = hi.min(index.upper_bound(end));
        }
        Some(Bound::Range(..)) => return None,
        _ => {}
    }

    (lo < hi).then_some((lo, hi))
}

/// Cuts each requested tag's position list to `[lo, hi)`. Unknown and
/// duplicate tags are ignored.
fn tag_runs(index: &OrderedIndex, tags: &[String], lo: usize, hi: usize) -> Vec<Run> {
    let mut ids: Vec<TagId> = tags.iter().filter_map(|t| index.tag_id(t)).collect();
    ids.sort_unstable();
    ids.dedup();

    ids.into_iter()
        .filter_map(|tag_id| {
            let positions = index.positions_for_tag_id(tag_id);
            let next = positions.partition_point(|&p| p < lo);
            let end = positions.partition_point(|&p| p < hi);
            (next < end).then_some(Run { tag_id, next, end })
        })
        .collect()
}

/// The candidate with the greatest timestamp `<= t` across all runs, first
/// in write order on ties; the first candidate if `t` precedes all of them
/// and the last candidate if `t` follows all of them.
fn anchor_position(index: &OrderedIndex, runs: &[Run], t: Timestamp) -> Option<usize> {
    let slices: Vec<&[usize]> = runs
        .iter()
        .map(|r| &index.positions_for_tag_id(r.tag_id)[r.next..r.end])
        .collect();
    let first = slices.iter().filter_map(|s| s.first()).min().copied()?;
    let last = slices.iter().filter_map(|s| s.last()).max().copied()?;

    if timestamp_of(index, last) < t {
        return Some(last);
    }

    let best = slices
        .iter()
        .filter_map(|s| {
            let upper = partition_point(s.len(), |i| timestamp_of(index, s[i]) <= t);
            (upper > 0).then(|| timestamp_of(index, s[upper - 1]))
        })
        .max();
    let Some(best) = best else {
        return Some(first);
    };

    slices
        .iter()
        .filter_map(|s| {
            let at = partition_point(s.len(), |i| timestamp_of(index, s[i]) < best);
            s.get(at)
                .copied()
                .filter(|&p| timestamp_of(index, p) == best)
        })
        .min()
}

fn cut_runs_before(index: &OrderedIndex, runs: &mut Vec<Run>, start: usize) {
    for run in runs.iter_mut() {
        let positions = &index.positions_for_tag_id(run.tag_id)[..run.end];
        run.next = run.next.max(positions.partition_point(|&p| p < start));
    }
    runs.retain(|r| r.next < r.end);
}

fn merge_plan(index: &OrderedIndex, runs: Vec<Run>) -> Plan {
    if runs.is_empty() {
        return Plan::Empty;
    }
    let heap = runs
        .iter()
        .enumerate()
        .map(|(i, r)| Reverse((index.positions_for_tag_id(r.tag_id)[r.next], i)))
        .collect();
    Plan::Merge { runs, heap }
}
