//! End-to-end runs against the simulated reader under paused time.

use kiosk::present::Presenter;
use kiosk::run::{run_with_driver, RunOptions};
use kiosk_presence::{Catalog, NoCatalog};
use kiosk_protocol::{KioskConfig, TagId};
use kiosk_reader::{SimulatedReader, SimulatedTag};
use std::sync::Arc;
use std::time::Duration;

fn config() -> KioskConfig {
    let mut config = KioskConfig::default();
    config.tracker.max_miss_count = 2;
    config
}

fn options(seconds: u64) -> RunOptions {
    RunOptions {
        refresh: Duration::from_millis(500),
        duration: Some(Duration::from_secs(seconds)),
        ..RunOptions::default()
    }
}

fn output(presenter: Presenter<Vec<u8>>) -> String {
    String::from_utf8(presenter.into_inner()).unwrap()
}

#[tokio::test(start_paused = true)]
async fn test_tag_taken_from_shelf_is_reported() {
    let driver = SimulatedReader::new()
        .with_cycle(Duration::from_millis(250))
        .with_tag(SimulatedTag::new("A"))
        .with_tag(SimulatedTag::new("B").departing_at(Duration::from_secs(2)));
    let catalog = Catalog::from_json_str(
        r#"[{ "id": 1, "tagCode": "B", "product": { "id": 1, "name": "Cola 0.5l" } }]"#,
    )
    .unwrap();
    let mut presenter = Presenter::new(Vec::new());

    let summary = run_with_driver(
        &config(),
        driver,
        Arc::new(catalog),
        &options(10),
        &mut presenter,
        std::future::pending::<()>(),
    )
    .await
    .unwrap();

    assert_eq!(summary.final_snapshot.active_ids(), vec![TagId::from("A")]);
    assert_eq!(summary.final_snapshot.removed_ids(), vec![TagId::from("B")]);
    assert!(summary.advisories.is_empty());

    let text = output(presenter);
    assert!(text.contains("+ A\n"));
    assert!(text.contains("+ Cola 0.5l [B]\n"));
    assert!(text.contains("- Cola 0.5l [B]\n"));
    assert!(text.contains("Taken (1):\n  Cola 0.5l [B]\n"));
}

#[tokio::test(start_paused = true)]
async fn test_unreachable_reader_fails_run() {
    let driver = SimulatedReader::new().failing_opens(u32::MAX);
    let probe = driver.probe();
    let mut presenter = Presenter::new(Vec::new());

    let err = run_with_driver(
        &config(),
        driver,
        Arc::new(NoCatalog),
        &options(10),
        &mut presenter,
        std::future::pending::<()>(),
    )
    .await
    .unwrap_err();

    assert!(format!("{:#}", err).contains("Could not connect after 3 attempts"));
    assert_eq!(probe.open_times().len(), 3);
    assert!(output(presenter).starts_with("! Could not connect to the reader after 3 attempts"));
}

#[tokio::test(start_paused = true)]
async fn test_failed_start_inventory_is_shown_and_run_continues() {
    let driver = SimulatedReader::new()
        .with_tag(SimulatedTag::new("A"))
        .with_command_code("start_inventory", 7);
    let mut presenter = Presenter::new(Vec::new());

    let summary = run_with_driver(
        &config(),
        driver,
        Arc::new(NoCatalog),
        &options(3),
        &mut presenter,
        std::future::pending::<()>(),
    )
    .await
    .unwrap();

    // No inventory running, so nothing was ever read.
    assert_eq!(summary.advisories.len(), 1);
    assert!(summary.final_snapshot.active.is_empty());
    assert!(output(presenter)
        .starts_with("! Reader command failed: Command start_inventory failed with code 7\n"));
}

#[tokio::test(start_paused = true)]
async fn test_shutdown_signal_stops_run() {
    let driver = SimulatedReader::new().with_tag(SimulatedTag::new("A"));
    let mut presenter = Presenter::new(Vec::new());
    let shutdown = tokio::time::sleep(Duration::from_secs(2));

    let summary = run_with_driver(
        &config(),
        driver,
        Arc::new(NoCatalog),
        &RunOptions::default(),
        &mut presenter,
        shutdown,
    )
    .await
    .unwrap();

    assert_eq!(summary.final_snapshot.active_ids(), vec![TagId::from("A")]);
}
