//! Recorder sessions driven through the in-memory transport.

use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};
use telelog_core::{
    catalog, BackpressurePolicy, ChannelMap, ChannelStats, CoreError, Endpoint, Filter,
    PackageStatus, RecorderConfig, RecorderSession,
};
use telelog_testkit::{ChannelTransportFactory, FaultSwitch, FaultyPackageFactory};
use tempfile::tempdir;

fn config() -> RecorderConfig {
    RecorderConfig::new()
        .poll_interval(Duration::from_millis(5))
        .drain_timeout(Duration::from_secs(5))
}

fn endpoint(port: u16) -> Endpoint {
    format!("239.7.7.7:{port}").parse().unwrap()
}

fn channels(tags: &[(&str, u16)]) -> ChannelMap {
    tags.iter()
        .map(|(tag, port)| ((*tag).to_string(), endpoint(*port)))
        .collect()
}

fn wait_until(session: &RecorderSession, done: impl Fn(&[ChannelStats]) -> bool) {
    let deadline = Instant::now() + Duration::from_secs(10);
    while !done(&session.channel_stats()) && Instant::now() < deadline {
        thread::sleep(Duration::from_millis(5));
    }
}

#[test]
fn channels_and_direct_records_share_one_package() {
    let temp = tempdir().unwrap();
    let transports = Arc::new(ChannelTransportFactory::new());
    let session =
        RecorderSession::with_transport_factory(temp.path(), config(), transports.clone()).unwrap();

    let tags = [("vision", 41001), ("ctrl", 41002), ("gps", 41003), ("imu", 41004)];
    session.start(&channels(&tags)).unwrap();

    let feeders: Vec<_> = tags
        .iter()
        .map(|(tag, port)| {
            let sender = transports.sender(&endpoint(*port));
            let tag = tag.to_string();
            thread::spawn(move || {
                for i in 0..200 {
                    sender.send(format!("{tag}:{i}"), "10.1.1.7:5000");
                }
            })
        })
        .collect();
    for i in 0..100 {
        session
            .record(format!("event:{i}"), "event", "operator")
            .unwrap();
    }
    for feeder in feeders {
        feeder.join().unwrap();
    }

    wait_until(&session, |stats| stats.iter().all(|s| s.appended == 200));
    session.stop().unwrap();

    let reader = catalog::open_latest(temp.path()).unwrap().unwrap();
    assert_eq!(reader.get_msg_count(), 900);

    let all: Vec<_> = reader.read_logs().map(|m| m.unwrap()).collect();
    assert!(all.windows(2).all(|w| w[0].timestamp() <= w[1].timestamp()));

    // each channel keeps its arrival order
    for (tag, _) in tags.iter().copied().chain([("event", 0)]) {
        let sequence: Vec<usize> = reader
            .filter(&Filter::new().tag(tag))
            .map(|m| {
                let payload = String::from_utf8(m.unwrap().into_payload()).unwrap();
                payload.rsplit(':').next().unwrap().parse().unwrap()
            })
            .collect();
        let expected: Vec<usize> = (0..sequence.len()).collect();
        assert_eq!(sequence, expected, "order of {tag}");
    }
}

#[test]
fn malformed_datagrams_are_counted_not_recorded() {
    let temp = tempdir().unwrap();
    let transports = Arc::new(ChannelTransportFactory::new());
    let session = RecorderSession::with_transport_factory(
        temp.path(),
        config().max_datagram_size(16),
        transports.clone(),
    )
    .unwrap();
    session.start(&channels(&[("vision", 41001)])).unwrap();

    let sender = transports.sender(&endpoint(41001));
    sender.send(b"".to_vec(), "10.1.1.7:5000");
    sender.send(vec![7u8; 17], "10.1.1.7:5000");
    sender.send_invalid();
    sender.send(b"frame-1".to_vec(), "10.1.1.7:5000");
    sender.send(b"frame-2".to_vec(), "10.1.1.7:5000");

    wait_until(&session, |stats| stats[0].appended == 2 && stats[0].malformed == 3);
    let stats = &session.channel_stats()[0];
    assert_eq!(stats.received, 5);
    assert_eq!(stats.malformed, 3);
    assert_eq!(stats.appended, 2);

    let snapshot = session.snapshot().unwrap();
    assert_eq!(snapshot.get_msg_count(), 2);
    assert_eq!(snapshot.status(), PackageStatus::Partial);
    assert_eq!(snapshot.message(0).unwrap().source(), "10.1.1.7:5000");
    session.stop().unwrap();
}

#[test]
fn every_received_message_is_accounted_for_after_stop() {
    for policy in [BackpressurePolicy::Block, BackpressurePolicy::DropNewest] {
        let temp = tempdir().unwrap();
        let transports = Arc::new(ChannelTransportFactory::new());
        let session = RecorderSession::with_transport_factory(
            temp.path(),
            config().queue_capacity(2).backpressure(policy),
            transports.clone(),
        )
        .unwrap();
        session
            .start(&channels(&[("a", 5001), ("b", 5002)]))
            .unwrap();

        for port in [5001, 5002] {
            let sender = transports.sender(&endpoint(port));
            for i in 0..300 {
                sender.send(format!("{i}"), "10.0.0.2:1");
            }
        }
        thread::sleep(Duration::from_millis(20));
        session.stop().unwrap();

        let stats = session.channel_stats();
        assert!(stats.iter().all(|s| s.in_flight() == 0), "{policy:?}: {stats:?}");
        let appended: u64 = stats.iter().map(|s| s.appended).sum();
        let reader = catalog::open_latest(temp.path()).unwrap().unwrap();
        assert_eq!(reader.get_msg_count(), appended, "{policy:?}");
    }
}

#[test]
fn messages_in_hand_at_stop_are_still_appended() {
    let temp = tempdir().unwrap();
    let switch = FaultSwitch::new();
    let packages = Arc::new(FaultyPackageFactory::new(switch.clone()));
    let transports = Arc::new(ChannelTransportFactory::new());
    let session = RecorderSession::with_factories(
        temp.path(),
        config()
            .queue_capacity(1)
            .backpressure(BackpressurePolicy::Block)
            .drain_timeout(Duration::from_secs(10)),
        transports.clone(),
        packages.clone(),
    )
    .unwrap();
    session.start(&channels(&[("vision", 8001)])).unwrap();
    switch.set_append_delay(Duration::from_millis(30));

    let sender = transports.sender(&endpoint(8001));
    for i in 0..5 {
        sender.send(format!("frame-{i}"), "10.0.0.3:1");
    }
    // one in the appender, one queued, one held by the receiver
    wait_until(&session, |stats| stats[0].received >= 3);
    session.stop().unwrap();

    let stats = &session.channel_stats()[0];
    assert_eq!(stats.dropped, 0, "{stats:?}");
    assert_eq!(stats.appended, stats.received, "{stats:?}");

    switch.reset();
    let reader = packages.packages()[0].reader().unwrap();
    assert_eq!(reader.get_msg_count(), stats.appended);
    assert_eq!(reader.status(), PackageStatus::Clean);
}

#[test]
fn shared_endpoint_starts_nothing() {
    let temp = tempdir().unwrap();
    let transports = Arc::new(ChannelTransportFactory::new());
    let session =
        RecorderSession::with_transport_factory(temp.path(), config(), transports).unwrap();

    let err = session
        .start(&channels(&[("a", 6000), ("b", 6000)]))
        .unwrap_err();
    assert!(matches!(err, CoreError::Configuration { .. }));
    assert!(session.channel_stats().is_empty());
}

#[test]
fn refused_channel_does_not_stop_the_others() {
    let temp = tempdir().unwrap();
    let transports = Arc::new(ChannelTransportFactory::new());
    transports.refuse(&endpoint(6001));
    let session =
        RecorderSession::with_transport_factory(temp.path(), config(), transports.clone())
            .unwrap();

    let summary = session
        .start(&channels(&[("broken", 6001), ("vision", 6002)]))
        .unwrap();
    assert_eq!(summary.started, ["vision".to_string()]);
    assert_eq!(summary.failed.len(), 1);

    transports.sender(&endpoint(6002)).send(b"ok".to_vec(), "h:1");
    wait_until(&session, |stats| stats[0].appended == 1);
    session.stop().unwrap();
    assert_eq!(
        catalog::list_packages(temp.path()).unwrap()[0].message_count,
        Some(1)
    );
}

#[test]
fn storage_exhaustion_fails_the_session() {
    let temp = tempdir().unwrap();
    let switch = FaultSwitch::new();
    let packages = Arc::new(FaultyPackageFactory::new(switch.clone()));
    let transports = Arc::new(ChannelTransportFactory::new());
    let session =
        RecorderSession::with_factories(temp.path(), config(), transports, packages.clone())
            .unwrap();
    session.start(&channels(&[("vision", 7001)])).unwrap();

    session.record(b"before".to_vec(), "event", "").unwrap();
    switch.exhaust_after(0);

    let err = session.record(b"after".to_vec(), "event", "").unwrap_err();
    assert!(matches!(err, CoreError::StorageExhausted { .. }));
    assert!(session.failure().is_some());
    assert!(matches!(
        session.record(b"later".to_vec(), "event", ""),
        Err(CoreError::SessionFailed { .. })
    ));

    let deadline = Instant::now() + Duration::from_secs(10);
    while session.is_running() && Instant::now() < deadline {
        thread::sleep(Duration::from_millis(5));
    }
    assert!(!session.is_running());
    assert!(matches!(session.stop(), Err(CoreError::SessionFailed { .. })));
    assert!(session.stop().is_ok());

    switch.reset();
    let reader = packages.packages()[0].reader().unwrap();
    assert_eq!(reader.get_msg_count(), 1);
    assert_eq!(reader.message(0).unwrap().payload(), b"before");
}

#[test]
fn rotation_closes_every_package_cleanly() {
    let temp = tempdir().unwrap();
    let transports = Arc::new(ChannelTransportFactory::new());
    let session = RecorderSession::with_transport_factory(
        temp.path(),
        config().max_package_size(Some(1_024)),
        transports.clone(),
    )
    .unwrap();
    session.start(&channels(&[("vision", 8001)])).unwrap();

    let sender = transports.sender(&endpoint(8001));
    for _ in 0..50 {
        sender.send(vec![1u8; 100], "10.0.0.3:1");
    }
    wait_until(&session, |stats| stats[0].appended == 50);
    session.stop().unwrap();

    let entries = catalog::list_packages(temp.path()).unwrap();
    assert!(entries.len() > 1);
    assert_eq!(entries.len(), session.packages().len());
    assert!(entries.iter().all(|e| e.status == PackageStatus::Clean));
    let total: u64 = entries.iter().filter_map(|e| e.message_count).sum();
    assert_eq!(total, 50);
}
