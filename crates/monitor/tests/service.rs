mod common;

use common::*;
use monitor::service;
use monitor::{
    MemoryStore, MonitorError, SessionController, SessionState, SinkBus, SinkMessage,
    StatsCollector,
};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, mpsc};

async fn next_record(rx: &mut broadcast::Receiver<SinkMessage>) -> SinkMessage {
    loop {
        let message = tokio::time::timeout(Duration::from_secs(2), rx.recv())
            .await
            .expect("sink message in time")
            .expect("bus open");
        if matches!(message, SinkMessage::Data(_) | SinkMessage::Failed(_)) {
            return message;
        }
    }
}

#[tokio::test]
async fn service_routes_events_for_the_active_session() {
    let debugger = Arc::new(FakeDebugger::new().with_page("T1", "https://www.example.com/"));
    let bus = SinkBus::new(64);
    let mut rx = bus.subscribe();
    let controller = SessionController::new(debugger.clone(), Arc::new(MemoryStore::new()), bus);

    let (events_tx, events_rx) = mpsc::unbounded_channel();
    let (handle, task) = service::spawn(controller, events_rx);

    let status = handle.start("T1", "Example").await.unwrap();
    assert_eq!(status.state, SessionState::Active);

    let s = FakeDebugger::session_id("T1", 1);
    events_tx
        .send(started("T1", &s, "1", "https://example.com/a", 5.0))
        .unwrap();
    events_tx
        .send(started("T9", "other", "2", "https://elsewhere.test/", 5.0))
        .unwrap();
    events_tx.send(finished("T1", &s, "1", 5.5)).unwrap();

    match next_record(&mut rx).await {
        SinkMessage::Data(record) => {
            assert_eq!(record.domain, "example.com");
            assert!(record.first_party);
            assert_eq!(record.duration_ms, 500);
        }
        other => panic!("expected DATA, got {:?}", other),
    }

    let status = handle.stop().await.unwrap();
    assert_eq!(status.state, SessionState::Inactive);

    drop(handle);
    let controller = task.await.unwrap();
    assert_eq!(controller.state(), SessionState::Inactive);
}

#[tokio::test]
async fn start_failure_is_reported_to_the_caller() {
    let debugger = Arc::new(FakeDebugger::new().failing_attach("T1"));
    let controller =
        SessionController::new(debugger, Arc::new(MemoryStore::new()), SinkBus::new(8));
    let (_events_tx, events_rx) = mpsc::unbounded_channel();
    let (handle, _task) = service::spawn(controller, events_rx);

    let err = handle.start("T1", "tab").await.unwrap_err();
    assert!(matches!(err, MonitorError::Attach { .. }));
    assert_eq!(handle.status().await.unwrap().state, SessionState::Inactive);
}

#[tokio::test]
async fn dropping_every_handle_stops_the_session() {
    let debugger = Arc::new(FakeDebugger::new().with_page("T1", "https://example.com/"));
    let controller = SessionController::new(
        debugger.clone(),
        Arc::new(MemoryStore::new()),
        SinkBus::new(8),
    );
    let (_events_tx, events_rx) = mpsc::unbounded_channel();
    let (handle, task) = service::spawn(controller, events_rx);

    handle.start("T1", "tab").await.unwrap();
    drop(handle);

    let controller = task.await.unwrap();
    assert_eq!(controller.state(), SessionState::Inactive);
    assert_eq!(debugger.calls().last().map(String::as_str), Some("detach T1"));
}

#[tokio::test]
async fn stats_collector_sees_a_whole_session() {
    let debugger = Arc::new(FakeDebugger::new().with_page("T1", "https://example.com/"));
    let bus = SinkBus::new(64);
    let collector = StatsCollector::spawn(&bus, 150);
    let mut rx = bus.subscribe();
    let controller = SessionController::new(debugger, Arc::new(MemoryStore::new()), bus);

    let (events_tx, events_rx) = mpsc::unbounded_channel();
    let (handle, _task) = service::spawn(controller, events_rx);
    handle.start("T1", "tab").await.unwrap();

    let s = FakeDebugger::session_id("T1", 1);
    for event in [
        started("T1", &s, "1", "https://example.com/", 1.0),
        started("T1", &s, "2", "https://i.ytimg.com/vi/x.jpg", 1.0),
        started("T1", &s, "3", "https://ads.tracker.net/px.gif", 1.0),
        finished("T1", &s, "1", 1.1),
        finished("T1", &s, "2", 1.3),
        failed("T1", &s, "3"),
    ] {
        events_tx.send(event).unwrap();
    }

    for _ in 0..3 {
        next_record(&mut rx).await;
    }
    // The collector subscribed first, so by now it has folded the same messages
    tokio::time::sleep(Duration::from_millis(50)).await;

    let stats = collector.snapshot().await;
    assert_eq!(stats.first_party_count(), 1);
    assert_eq!(stats.third_party_count(), 2);
    assert_eq!(stats.failed_count(), 1);
    assert_eq!(stats.active_requests(), 0);
    assert_eq!(stats.top_domains(12).len(), 2);
    assert_eq!(stats.recent().count(), 3);
}
