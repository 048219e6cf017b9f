//! End-to-end tests over packages written to disk.

use proptest::prelude::*;
use std::fs;
use std::path::Path;
use telelog_core::format::MESSAGES_FILE;
use telelog_core::{
    catalog, CoreError, Filter, Message, PackageReader, PackageStatus, PackageWriter, Timestamp,
    WriterConfig,
};
use tempfile::tempdir;

fn write_package(root: &Path, messages: &[(&str, Timestamp, &str)]) -> PackageReader {
    let mut writer = PackageWriter::create(root, WriterConfig::default()).unwrap();
    for (tag, ts, payload) in messages {
        writer
            .append(Message::new(*tag, "10.0.0.1:4000", *ts, payload.as_bytes()))
            .unwrap();
    }
    let path = writer.path().unwrap().to_path_buf();
    writer.close().unwrap();
    PackageReader::open(&path).unwrap()
}

fn timestamps(reader: &PackageReader, filter: &Filter) -> Vec<Timestamp> {
    reader
        .filter(filter)
        .map(|m| m.unwrap().timestamp())
        .collect()
}

#[test]
fn event_vision_event_scenario() {
    let temp = tempdir().unwrap();
    let reader = write_package(
        temp.path(),
        &[("event", 100, "a"), ("vision", 200, "b"), ("event", 300, "c")],
    );

    assert_eq!(reader.get_msg_count(), 3);
    assert_eq!(reader.status(), PackageStatus::Clean);

    let cursor = reader.select_msg(250);
    let msg = cursor.msg().unwrap().unwrap();
    assert_eq!(msg.timestamp(), 200);
    assert_eq!(msg.tag(), "vision");
    assert_eq!(msg.payload(), b"b");

    assert_eq!(
        timestamps(&reader, &Filter::new().tag("event")),
        vec![100, 300]
    );
}

#[test]
fn reopened_package_matches_written_one() {
    let temp = tempdir().unwrap();
    let reader = write_package(
        temp.path(),
        &[("a", 10, "one"), ("b", 20, "two"), ("a", 20, "three")],
    );
    let info = reader.get_log_info();
    assert_eq!(info.message_count, 3);
    assert_eq!(info.start_timestamp, Some(10));
    assert_eq!(info.end_timestamp, Some(20));
    assert_eq!(reader.tags(), ["a".to_string(), "b".to_string()]);

    let all: Vec<_> = reader.read_logs().map(|m| m.unwrap()).collect();
    assert_eq!(all.len(), 3);
    assert_eq!(all[2].payload(), b"three");
    assert_eq!(all[0].source(), "10.0.0.1:4000");

    // ties resolve to the first message in write order
    assert_eq!(reader.select_msg(20).position(), Some(1));
}

#[test]
fn empty_package_yields_empty_results() {
    let temp = tempdir().unwrap();
    let reader = write_package(temp.path(), &[]);

    assert_eq!(reader.get_msg_count(), 0);
    let cursor = reader.select_msg(1_000);
    assert!(cursor.is_empty());
    assert!(cursor.msg().unwrap().is_none());
    assert_eq!(reader.filter(&Filter::new()).count(), 0);
    assert_eq!(reader.filter(&Filter::new().timestamp_at(5)).count(), 0);
    assert_eq!(reader.get_log_info().start_timestamp, None);
}

#[test]
fn index_window_returns_first_ten() {
    let temp = tempdir().unwrap();
    let messages: Vec<_> = (0..25).map(|i| ("t", i as Timestamp, "x")).collect();
    let reader = write_package(temp.path(), &messages);

    let positions = reader.filter_positions(&Filter::new().index_range(0, 9));
    assert_eq!(positions, (0..10).collect::<Vec<u64>>());

    let short = write_package(temp.path(), &messages[..4]);
    assert_eq!(short.filter_positions(&Filter::new().index_range(0, 9)).len(), 4);
}

#[test]
fn cursor_bounds_leave_position_unchanged() {
    let temp = tempdir().unwrap();
    let reader = write_package(temp.path(), &[("a", 1, "x"), ("a", 2, "y"), ("a", 3, "z")]);
    let mut cursor = reader.select_msg(2);

    let err = cursor.next(2).unwrap_err();
    assert!(matches!(err, CoreError::OutOfRange { position: 1, .. }));
    assert_eq!(cursor.position(), Some(1));
    assert!(cursor.prev(2).is_err());
    assert_eq!(cursor.next(1).unwrap().timestamp(), 3);
    assert_eq!(cursor.prev(2).unwrap().timestamp(), 1);
}

#[test]
fn corrupted_message_is_reported_on_read() {
    let temp = tempdir().unwrap();
    let reader = write_package(temp.path(), &[("a", 1, "payload")]);
    let path = reader.path().unwrap().to_path_buf();
    drop(reader);

    let messages = path.join(MESSAGES_FILE);
    let mut bytes = fs::read(&messages).unwrap();
    let last = bytes.len() - 6;
    bytes[last] ^= 0xFF;
    fs::write(&messages, bytes).unwrap();

    let reader = PackageReader::open(&path).unwrap();
    assert!(reader.message(0).is_err());
}

#[test]
fn crashed_package_is_partial_and_readable() {
    let temp = tempdir().unwrap();
    let mut writer = PackageWriter::create(temp.path(), WriterConfig::default()).unwrap();
    for i in 0..5 {
        writer
            .append(Message::new("vision", "", i, b"frame".to_vec()))
            .unwrap();
    }
    let path = writer.path().unwrap().to_path_buf();
    std::mem::forget(writer);

    let reader = PackageReader::open(&path).unwrap();
    assert_eq!(reader.status(), PackageStatus::Partial);
    assert_eq!(reader.get_msg_count(), 5);
    assert!(catalog::open_latest(temp.path()).unwrap().is_none());
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(24))]

    #[test]
    fn count_and_bounds_track_appends(deltas in prop::collection::vec(0i64..50, 0..60)) {
        let temp = tempdir().unwrap();
        let mut ts = 1_000;
        let messages: Vec<_> = deltas
            .iter()
            .map(|d| {
                ts += d;
                ("t", ts, "p")
            })
            .collect();
        let reader = write_package(temp.path(), &messages);

        prop_assert_eq!(reader.get_msg_count(), messages.len() as u64);
        prop_assert_eq!(reader.info().start_timestamp, messages.first().map(|m| m.1));
        prop_assert_eq!(reader.info().end_timestamp, messages.last().map(|m| m.1));

        if let (Some(first), Some(last)) = (messages.first(), messages.last()) {
            for t in first.1..=last.1 {
                let expected = messages.iter().filter(|m| m.1 <= t).map(|m| m.1).max();
                let got = reader.select_msg(t).msg().unwrap().map(|m| m.timestamp());
                prop_assert_eq!(got, expected);
            }
        }
    }
}
