//! Property-based test generators using proptest.
//!
//! Message sequences are generated with non-decreasing timestamps, the
//! order a package stores them in.

use proptest::prelude::*;
use telelog_core::{Filter, Message, Timestamp};

/// Tags used by the generators; small enough that tags repeat.
pub const TAGS: [&str; 4] = ["vision", "event", "ctrl", "debug"];

/// Strategy for one of [`TAGS`].
pub fn tag_strategy() -> impl Strategy<Value = String> {
    prop::sample::select(TAGS.to_vec()).prop_map(str::to_string)
}

/// Strategy for non-empty opaque payloads.
pub fn payload_strategy() -> impl Strategy<Value = Vec<u8>> {
    prop::collection::vec(any::<u8>(), 1..256)
}

/// Strategy for message sequences with non-decreasing timestamps, ties
/// included.
pub fn message_sequence_strategy(max_len: usize) -> impl Strategy<Value = Vec<Message>> {
    prop::collection::vec((tag_strategy(), 0i64..1_000, payload_strategy()), 0..max_len).prop_map(
        |items| {
            let mut timestamp: Timestamp = 1_700_000_000_000_000_000;
            items
                .into_iter()
                .map(|(tag, delta, payload)| {
                    timestamp += delta;
                    Message::new(tag, "10.0.0.1:41001", timestamp, payload)
                })
                .collect()
        },
    )
}

/// Strategy for filters mixing every constraint kind.
pub fn filter_strategy() -> impl Strategy<Value = Filter> {
    (
        prop::option::of(prop::collection::vec(tag_strategy(), 0..3)),
        prop::option::of((0u64..40, 0u64..40)),
        prop::option::of(1usize..20),
    )
        .prop_map(|(tags, index, count)| {
            let mut filter = Filter::new();
            if let Some(tags) = tags {
                filter = filter.tags(tags);
            }
            if let Some((start, end)) = index {
                filter = filter.index_range(start, end);
            }
            if let Some(count) = count {
                filter = filter.count(count);
            }
            filter
        })
}
