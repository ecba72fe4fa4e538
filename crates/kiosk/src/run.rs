//! The `run` command: reader session feeding the tracker, changes on stdout.
//!
//! Shutdown order: close the reader session (unsubscribe, stop, release), then
//! stop the tracker, which applies reads already queued and returns the final
//! state.

use crate::present::Presenter;
use anyhow::{Context, Result};
use kiosk_presence::{spawn_tracker, Catalog, NameResolver, PresenceSnapshot, TrackerConfig};
use kiosk_protocol::{KioskConfig, TagId};
use kiosk_reader::{CommandError, ReaderDriver, ReaderSession, SessionConfig, SimulatedReader};
use std::future::Future;
use std::io::Write;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::MissedTickBehavior;
use tracing::{error, info, warn};

pub const DEFAULT_REFRESH: Duration = Duration::from_millis(500);

/// Which reader driver to run against.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, clap::ValueEnum)]
pub enum DriverKind {
    /// Scripted shelf, no hardware
    #[default]
    Simulated,
}

#[derive(Debug, Clone)]
pub struct RunOptions {
    pub driver: DriverKind,
    /// How often the presentation polls the tracker
    pub refresh: Duration,
    /// Stop on its own after this long
    pub duration: Option<Duration>,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            driver: DriverKind::default(),
            refresh: DEFAULT_REFRESH,
            duration: None,
        }
    }
}

#[derive(Debug)]
pub struct RunSummary {
    pub final_snapshot: PresenceSnapshot,
    pub advisories: Vec<CommandError>,
}

/// Load the catalog named in the config, or an empty one.
pub fn load_catalog(config: &KioskConfig) -> Catalog {
    match &config.catalog.path {
        Some(path) => Catalog::load_or_empty(path),
        None => {
            info!("No catalog configured, tags will show raw ids");
            Catalog::default()
        }
    }
}

pub async fn run<W, F>(
    config: &KioskConfig,
    options: &RunOptions,
    presenter: &mut Presenter<W>,
    shutdown: F,
) -> Result<RunSummary>
where
    W: Write,
    F: Future<Output = ()>,
{
    let catalog = load_catalog(config);
    let mut ids: Vec<TagId> = catalog.tag_ids().cloned().collect();
    ids.sort();

    match options.driver {
        DriverKind::Simulated => {
            let driver = SimulatedReader::demo(&ids);
            run_with_driver(config, driver, Arc::new(catalog), options, presenter, shutdown).await
        }
    }
}

pub async fn run_with_driver<D, W, F>(
    config: &KioskConfig,
    driver: D,
    resolver: Arc<dyn NameResolver>,
    options: &RunOptions,
    presenter: &mut Presenter<W>,
    shutdown: F,
) -> Result<RunSummary>
where
    D: ReaderDriver,
    W: Write,
    F: Future<Output = ()>,
{
    let tracker_config =
        TrackerConfig::from_section(&config.tracker).context("Invalid tracker configuration")?;
    let session_config =
        SessionConfig::from_section(&config.reader).context("Invalid reader configuration")?;

    let tracker = spawn_tracker(tracker_config, resolver);
    let mut session = ReaderSession::new(driver, tracker.events(), session_config.inventory);

    if let Err(err) = session
        .open_with_retry(
            &session_config.port,
            session_config.open_timeout,
            session_config.retry,
        )
        .await
    {
        error!("Reader unavailable: {}", err);
        presenter.connect_failed(&err)?;
        if let Err(e) = tracker.shutdown().await {
            warn!("Tracker shutdown failed: {}", e);
        }
        let port = session_config.port;
        return Err(anyhow::Error::new(err).context(format!("Reader on {} unavailable", port)));
    }

    let mut advisories = session.take_advisories();
    for advisory in &advisories {
        presenter.advisory(advisory)?;
    }

    let mut refresh = tokio::time::interval(options.refresh.max(Duration::from_millis(10)));
    refresh.set_missed_tick_behavior(MissedTickBehavior::Delay);

    let duration = options.duration;
    let deadline = async move {
        match duration {
            Some(duration) => tokio::time::sleep(duration).await,
            None => std::future::pending::<()>().await,
        }
    };
    tokio::pin!(shutdown);
    tokio::pin!(deadline);

    let outcome: Result<()> = loop {
        tokio::select! {
            biased;

            _ = &mut shutdown => {
                info!("Shutdown requested");
                break Ok(());
            }

            _ = &mut deadline => {
                info!("Run duration elapsed");
                break Ok(());
            }

            _ = refresh.tick() => {
                let snapshot = match tracker.observe().await {
                    Ok(snapshot) => snapshot,
                    Err(e) => break Err(e).context("Tracker stopped unexpectedly"),
                };
                if let Err(e) = presenter.update(snapshot) {
                    break Err(e).context("Failed to write presence update");
                }
            }
        }
    };

    session.close().await;
    advisories.extend(session.take_advisories());
    let final_snapshot = tracker.shutdown().await.context("Tracker task failed")?;
    outcome?;

    presenter.update(final_snapshot.clone())?;
    presenter.summary(&final_snapshot)?;
    log_metrics();

    Ok(RunSummary {
        final_snapshot,
        advisories,
    })
}

fn log_metrics() {
    let presence = kiosk_presence::METRICS.snapshot();
    let reader = kiosk_reader::METRICS.snapshot();
    match (serde_json::to_string(&presence), serde_json::to_string(&reader)) {
        (Ok(presence), Ok(reader)) => info!("Metrics: presence={} reader={}", presence, reader),
        _ => warn!("Failed to serialize metrics"),
    }
}
