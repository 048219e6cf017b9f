//! In-memory ordered index of a package.
//!
//! The index holds one entry per message in write order, which is also
//! timestamp order because the writer never lets timestamps go backwards.
//! A secondary grouping maps every tag to the ascending positions of its
//! messages, so tag-filtered reads never visit entries of other tags.

use crate::error::{CoreError, CoreResult};
use crate::message::Timestamp;
use std::collections::HashMap;

/// Numeric id of a tag within one package.
pub type TagId = u16;

/// Location of one message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IndexEntry {
    /// Message timestamp.
    pub timestamp: Timestamp,
    /// Offset of the message record in the message file.
    pub offset: u64,
    /// Tag of the message.
    pub tag_id: TagId,
}

/// Ordered index with tag grouping.
#[derive(Debug, Clone, Default)]
pub struct OrderedIndex {
    entries: Vec<IndexEntry>,
    tags: Vec<String>,
    tag_ids: HashMap<String, TagId>,
    by_tag: Vec<Vec<usize>>,
}

impl OrderedIndex {
    /// Creates an empty index.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns true if the index has no entries.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Entry at `position`.
    #[must_use]
    pub fn get(&self, position: usize) -> Option<&IndexEntry> {
        self.entries.get(position)
    }

    /// All entries in write order.
    #[must_use]
    pub fn entries(&self) -> &[IndexEntry] {
        &self.entries
    }

    /// Timestamp of the first entry.
    #[must_use]
    pub fn start_timestamp(&self) -> Option<Timestamp> {
        self.entries.first().map(|e| e.timestamp)
    }

    /// Timestamp of the last entry.
    #[must_use]
    pub fn end_timestamp(&self) -> Option<Timestamp> {
        self.entries.last().map(|e| e.timestamp)
    }

    /// Known tags, indexed by id (first-appearance order).
    #[must_use]
    pub fn tags(&self) -> &[String] {
        &self.tags
    }

    /// Name of a tag id.
    #[must_use]
    pub fn tag_name(&self, id: TagId) -> Option<&str> {
        self.tags.get(usize::from(id)).map(String::as_str)
    }

    /// Id of a tag name.
    #[must_use]
    pub fn tag_id(&self, name: &str) -> Option<TagId> {
        self.tag_ids.get(name).copied()
    }

    /// Ascending positions of every message with the given tag.
    #[must_use]
    pub fn positions_for_tag(&self, name: &str) -> &[usize] {
        self.tag_id(name)
            .and_then(|id| self.by_tag.get(usize::from(id)))
            .map_or(&[][..], Vec::as_slice)
    }

    /// Ascending positions of every message with the given tag id.
    #[must_use]
    pub fn positions_for_tag_id(&self, id: TagId) -> &[usize] {
        self.by_tag
            .get(usize::from(id))
            .map_or(&[][..], Vec::as_slice)
    }

    /// Id the next new tag will receive.
    ///
    /// # Errors
    ///
    /// Returns `InvalidArgument` once 65536 distinct tags exist.
    pub fn next_tag_id(&self) -> CoreResult<TagId> {
        TagId::try_from(self.tags.len())
            .map_err(|_| CoreError::invalid_argument("too many distinct tags in one package"))
    }

    /// Returns the id of `name`, registering it if it is new.
    ///
    /// The flag is true when the tag was just registered.
    ///
    /// # Errors
    ///
    /// Returns `InvalidArgument` once 65536 distinct tags exist.
    pub fn intern_tag(&mut self, name: &str) -> CoreResult<(TagId, bool)> {
        if let Some(id) = self.tag_id(name) {
            return Ok((id, false));
        }
        let id = self.next_tag_id()?;
        self.define_tag(id, name.to_string())?;
        Ok((id, true))
    }

    /// Registers a tag under an explicit id, as read back from disk.
    ///
    /// # Errors
    ///
    /// Returns a corruption error if ids are not dense or a name repeats.
    pub fn define_tag(&mut self, id: TagId, name: String) -> CoreResult<()> {
        if usize::from(id) != self.tags.len() {
            return Err(CoreError::package_corruption(format!(
                "tag id {id} out of sequence, expected {}",
                self.tags.len()
            )));
        }
        if self.tag_ids.contains_key(&name) {
            return Err(CoreError::package_corruption(format!(
                "tag '{name}' defined twice"
            )));
        }
        self.tag_ids.insert(name.clone(), id);
        self.tags.push(name);
        self.by_tag.push(Vec::new());
        Ok(())
    }

    /// Appends an entry.
    ///
    /// # Errors
    ///
    /// Returns a corruption error if the tag is unknown or the timestamp goes
    /// backwards.
    pub fn push(&mut self, entry: IndexEntry) -> CoreResult<usize> {
        let Some(positions) = self.by_tag.get_mut(usize::from(entry.tag_id)) else {
            return Err(CoreError::package_corruption(format!(
                "entry references undefined tag id {}",
                entry.tag_id
            )));
        };
        if let Some(last) = self.entries.last() {
            if entry.timestamp < last.timestamp {
                return Err(CoreError::package_corruption(format!(
                    "timestamp {} precedes previous entry {}",
                    entry.timestamp, last.timestamp
                )));
            }
        }

        let position = self.entries.len();
        positions.push(position);
        self.entries.push(entry);
        Ok(position)
    }

    /// Position of the entry with the greatest timestamp `<= timestamp`.
    ///
    /// When several entries share that timestamp the first in write order is
    /// chosen. A timestamp before the first entry selects position 0; one
    /// after the last entry selects the last position. `None` only when the
    /// index is empty.
    #[must_use]
    pub fn select(&self, timestamp: Timestamp) -> Option<usize> {
        closest_at_or_before(self.entries.len(), |i| self.entries[i].timestamp, timestamp)
    }

    /// First position whose timestamp is `>= timestamp`.
    #[must_use]
    pub fn lower_bound(&self, timestamp: Timestamp) -> usize {
        self.entries.partition_point(|e| e.timestamp < timestamp)
    }

    /// First position whose timestamp is `> timestamp`.
    #[must_use]
    pub fn upper_bound(&self, timestamp: Timestamp) -> usize {
        self.entries.partition_point(|e| e.timestamp <= timestamp)
    }
}

/// Binary search over a virtual sorted sequence of length `len`.
///
/// Returns the first index for which `pred` is false, assuming `pred` is
/// true for a prefix of the sequence.
pub(crate) fn partition_point(len: usize, mut pred: impl FnMut(usize) -> bool) -> usize {
    let (mut lo, mut hi) = (0, len);
    while lo < hi {
        let mid = lo + (hi - lo) / 2;
        if pred(mid) {
            lo = mid + 1;
        } else {
            hi = mid;
        }
    }
    lo
}

/// Closest-at-or-before lookup over a virtual sequence of non-decreasing
/// timestamps, with first-in-order tie break and clamping at both ends.
///
/// A timestamp strictly after the last entry selects the last position even
/// when the final timestamp is shared by several entries.
pub(crate) fn closest_at_or_before(
    len: usize,
    timestamp_at: impl Fn(usize) -> Timestamp,
    timestamp: Timestamp,
) -> Option<usize> {
    if len == 0 {
        return None;
    }
    if timestamp_at(len - 1) < timestamp {
        return Some(len - 1);
    }
    let upper = partition_point(len, |i| timestamp_at(i) <= timestamp);
    if upper == 0 {
        return Some(0);
    }
    let best = timestamp_at(upper - 1);
    Some(partition_point(upper, |i| timestamp_at(i) < best))
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn index_of(entries: &[(Timestamp, &str)]) -> OrderedIndex {
        let mut index = OrderedIndex::new();
        for (i, (ts, tag)) in entries.iter().enumerate() {
            let (tag_id, _) = index.intern_tag(tag).unwrap();
            index
                .push(IndexEntry {
                    timestamp: *ts,
                    offset: 6 + i as u64 * 32,
                    tag_id,
                })
                .unwrap();
        }
        index
    }

    #[test]
    fn select_picks_closest_at_or_before() {
        let index = index_of(&[(100, "event"), (200, "vision"), (300, "event")]);
        assert_eq!(index.select(250), Some(1));
        assert_eq!(index.select(200), Some(1));
        assert_eq!(index.select(300), Some(2));
    }

    #[test]
    fn select_clamps_at_both_ends() {
        let index = index_of(&[(100, "a"), (200, "a")]);
        assert_eq!(index.select(5), Some(0));
        assert_eq!(index.select(9_999), Some(1));
        assert_eq!(OrderedIndex::new().select(5), None);
    }

    #[test]
    fn select_ties_pick_first_in_write_order() {
        let index = index_of(&[(100, "a"), (200, "a"), (200, "b"), (200, "a"), (300, "b")]);
        assert_eq!(index.select(200), Some(1));
        assert_eq!(index.select(250), Some(1));
    }

    #[test]
    fn tag_grouping() {
        let index = index_of(&[(1, "event"), (2, "vision"), (3, "event"), (4, "debug")]);
        assert_eq!(index.positions_for_tag("event"), &[0, 2]);
        assert_eq!(index.positions_for_tag("vision"), &[1]);
        assert!(index.positions_for_tag("missing").is_empty());
        assert_eq!(index.tags(), &["event", "vision", "debug"]);
        assert_eq!(index.tag_name(2), Some("debug"));
    }

    #[test]
    fn bounds() {
        let index = index_of(&[(10, "a"), (20, "a"), (20, "a"), (30, "a")]);
        assert_eq!(index.lower_bound(20), 1);
        assert_eq!(index.upper_bound(20), 3);
        assert_eq!(index.lower_bound(0), 0);
        assert_eq!(index.upper_bound(99), 4);
    }

    #[test]
    fn push_rejects_backwards_timestamp_and_unknown_tag() {
        let mut index = index_of(&[(10, "a")]);
        assert!(index
            .push(IndexEntry {
                timestamp: 5,
                offset: 0,
                tag_id: 0
            })
            .is_err());
        assert!(index
            .push(IndexEntry {
                timestamp: 50,
                offset: 0,
                tag_id: 7
            })
            .is_err());
        assert_eq!(index.len(), 1);
    }

    #[test]
    fn define_tag_requires_dense_ids() {
        let mut index = OrderedIndex::new();
        assert!(index.define_tag(1, "x".into()).is_err());
        index.define_tag(0, "x".into()).unwrap();
        assert!(index.define_tag(1, "x".into()).is_err());
    }

    #[test]
    fn after_end_selects_last_even_on_tie() {
        let index = index_of(&[(100, "a"), (300, "a"), (300, "b")]);
        assert_eq!(index.select(300), Some(1));
        assert_eq!(index.select(301), Some(2));
    }

    #[test]
    fn next_tag_id_tracks_registrations() {
        let mut index = OrderedIndex::new();
        assert_eq!(index.next_tag_id().unwrap(), 0);
        index.intern_tag("event").unwrap();
        assert_eq!(index.next_tag_id().unwrap(), 1);
        assert_eq!(index.intern_tag("event").unwrap(), (0, false));
        assert_eq!(index.positions_for_tag_id(0), &[] as &[usize]);
    }

    proptest! {
        #[test]
        fn select_matches_linear_scan(
            mut stamps in prop::collection::vec(0i64..1_000, 1..200),
            query in 0i64..1_100,
        ) {
            stamps.sort_unstable();
            let entries: Vec<_> = stamps.iter().map(|t| (*t, "t")).collect();
            let index = index_of(&entries);

            let expected = if query > stamps[stamps.len() - 1] {
                stamps.len() - 1
            } else {
                match stamps.iter().rposition(|t| *t <= query) {
                    None => 0,
                    Some(last) => stamps.iter().position(|t| *t == stamps[last]).unwrap(),
                }
            };
            prop_assert_eq!(index.select(query), Some(expected));
        }
    }
}
