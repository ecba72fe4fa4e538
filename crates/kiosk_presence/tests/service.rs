//! Tracker service under paused runtime time.

use chrono::Utc;
use kiosk_presence::{spawn_tracker, Catalog, NoCatalog, TrackerConfig};
use kiosk_protocol::{TagId, TagSeenEvent};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::sleep;

fn config() -> TrackerConfig {
    TrackerConfig::new(Duration::from_secs(2), 2, Duration::from_secs(1))
}

#[tokio::test(start_paused = true)]
async fn test_unseen_tag_removed_by_sweeps() {
    let handle = spawn_tracker(config(), Arc::new(NoCatalog));
    handle.ingest(TagSeenEvent::new("A", 1, Utc::now()));

    sleep(Duration::from_millis(2500)).await;
    let snapshot = handle.observe().await.unwrap();
    assert!(snapshot.is_active(&TagId::from("A")));
    assert_eq!(snapshot.active[0].miss_count, 1);
    assert!(snapshot.removed.is_empty());

    sleep(Duration::from_millis(1000)).await;
    let snapshot = handle.observe().await.unwrap();
    assert!(snapshot.active.is_empty());
    assert_eq!(snapshot.removed_ids(), vec![TagId::from("A")]);

    handle.shutdown().await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_steady_reads_keep_tag_present() {
    let handle = spawn_tracker(config(), Arc::new(NoCatalog));

    for _ in 0..20 {
        handle.ingest(TagSeenEvent::new("A", 1, Utc::now()));
        handle.read_cycle_complete();
        sleep(Duration::from_millis(700)).await;
    }

    let snapshot = handle.observe().await.unwrap();
    assert!(snapshot.is_active(&TagId::from("A")));
    assert!(snapshot.removed.is_empty());
    handle.shutdown().await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_events_sender_feeds_tracker() {
    let handle = spawn_tracker(config(), Arc::new(NoCatalog));
    let events = handle.events();

    events
        .send(kiosk_protocol::ReaderEvent::TagSeen(TagSeenEvent::new("B", 2, Utc::now())))
        .await
        .unwrap();
    events
        .send(kiosk_protocol::ReaderEvent::TagSeen(
            TagSeenEvent::new("C", 2, Utc::now()).with_result_code(3),
        ))
        .await
        .unwrap();

    let snapshot = handle.shutdown().await.unwrap();
    assert_eq!(snapshot.active_ids(), vec![TagId::from("B")]);
}

#[tokio::test(start_paused = true)]
async fn test_display_names_come_from_catalog() {
    let catalog = Catalog::from_json_str(
        r#"[{ "id": 1, "tagCode": "A", "product": { "id": 1, "name": "Sandwich" } }]"#,
    )
    .unwrap();
    let handle = spawn_tracker(config(), Arc::new(catalog));
    handle.ingest(TagSeenEvent::new("A", 1, Utc::now()));

    let snapshot = handle.shutdown().await.unwrap();
    assert_eq!(snapshot.active[0].label(), "Sandwich");
}

#[tokio::test(start_paused = true)]
async fn test_events_refused_after_shutdown() {
    let handle = spawn_tracker(config(), Arc::new(NoCatalog));
    let events = handle.events();
    handle.shutdown().await.unwrap();

    assert!(events
        .send(kiosk_protocol::ReaderEvent::TagSeen(TagSeenEvent::new("A", 1, Utc::now())))
        .await
        .is_err());
}

#[tokio::test(start_paused = true)]
async fn test_dropped_handle_stops_task() {
    let handle = spawn_tracker(config(), Arc::new(NoCatalog));
    let events = handle.events();
    drop(handle);

    // The task exits once it notices the shutdown channel closed.
    sleep(Duration::from_millis(10)).await;
    assert!(events.is_closed());
}
