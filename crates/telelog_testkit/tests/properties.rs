//! Reader properties checked against a plain scan of the written messages.

use proptest::prelude::*;
use telelog_core::{Bound, Filter, Message};
use telelog_testkit::{
    filter_strategy, message_sequence_strategy, ClosedPackage, TestPackage,
};

fn write(messages: &[Message]) -> ClosedPackage {
    let mut package = TestPackage::new();
    for message in messages {
        package.writer().append(message.clone()).unwrap();
    }
    package.close()
}

/// Positions a filter without a timestamp anchor must select.
fn scan(messages: &[Message], filter: &Filter) -> Vec<u64> {
    let selected = messages.iter().enumerate().filter(|(position, m)| {
        let position = *position as u64;
        let tag_ok = filter
            .message_tag
            .as_ref()
            .map_or(true, |tags| tags.iter().any(|t| t == m.tag()));
        let index_ok = match filter.index {
            None => true,
            Some(Bound::At(start)) => position >= start,
            Some(Bound::Range(start, end)) => (start..=end).contains(&position),
        };
        let timestamp_ok = match filter.timestamp {
            Some(Bound::Range(start, end)) => (start..=end).contains(&m.timestamp()),
            _ => true,
        };
        tag_ok && index_ok && timestamp_ok
    });
    selected
        .map(|(position, _)| position as u64)
        .take(filter.count.unwrap_or(usize::MAX))
        .collect()
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    #[test]
    fn filter_matches_scan(
        messages in message_sequence_strategy(40),
        filter in filter_strategy(),
    ) {
        let package = write(&messages);
        let positions = package.filter_positions(&filter);
        prop_assert_eq!(&positions, &scan(&messages, &filter));

        let read: Vec<_> = package.filter(&filter).map(|m| m.unwrap()).collect();
        prop_assert_eq!(read.len(), positions.len());
        for (message, position) in read.iter().zip(&positions) {
            prop_assert_eq!(message, &messages[*position as usize]);
        }
    }

    #[test]
    fn timestamp_range_matches_scan(
        messages in message_sequence_strategy(40),
        a in 0i64..20_000,
        b in 0i64..20_000,
    ) {
        let base = messages.first().map_or(0, Message::timestamp);
        let filter = Filter::new().timestamp_range(base + a.min(b), base + a.max(b));
        let package = write(&messages);
        prop_assert_eq!(package.filter_positions(&filter), scan(&messages, &filter));
    }

    #[test]
    fn next_then_prev_returns_home(
        messages in message_sequence_strategy(30),
        start in 0usize..30,
        step in 0u64..30,
    ) {
        prop_assume!(!messages.is_empty());
        let package = write(&messages);
        let start = start % messages.len();
        let mut cursor = package.cursor();
        cursor.seek(messages[start].timestamp());
        let home = cursor.position().unwrap();
        let original = cursor.msg().unwrap().unwrap();

        let len = messages.len() as u64;
        if home + step < len {
            cursor.next(step).unwrap();
            prop_assert_eq!(cursor.prev(step).unwrap(), original);
        } else {
            prop_assert!(cursor.next(step).is_err());
        }
        prop_assert_eq!(cursor.position(), Some(home));
    }

    #[test]
    fn tag_filter_is_ascending_and_exclusive(messages in message_sequence_strategy(60)) {
        let package = write(&messages);
        let positions = package.filter_positions(&Filter::new().tags(["vision", "debug"]));
        prop_assert!(positions.windows(2).all(|w| w[0] < w[1]));
        for position in &positions {
            let tag = messages[*position as usize].tag();
            prop_assert!(tag == "vision" || tag == "debug");
        }
        let expected = messages
            .iter()
            .filter(|m| m.tag() == "vision" || m.tag() == "debug")
            .count();
        prop_assert_eq!(positions.len(), expected);
    }
}
