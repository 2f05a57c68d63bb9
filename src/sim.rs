//! Terminal driver: mounts one tracker against the configured aggregator and
//! scrolls a synthetic document from top to bottom.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use tokio::sync::watch;
use tokio::time::{self, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use crate::db::Database;
use crate::host::{AlwaysVisible, HostBindings};
use crate::recovery::SessionRecoveryStore;
use crate::sensing::ScrollMetrics;
use crate::settings::TrackerConfig;
use crate::sync::{BeaconDelivery, HttpReadLogClient};
use crate::tracker::{TrackerInstance, TrackerServices, ViewContext};

const DOCUMENT_HEIGHT: f64 = 8000.0;
const VIEWPORT_HEIGHT: f64 = 900.0;
const STEP: Duration = Duration::from_millis(250);

#[derive(Debug, Clone, PartialEq)]
pub struct SimArgs {
    pub content_id: u64,
    pub viewer_id: u64,
    pub duration: Duration,
}

impl SimArgs {
    pub fn parse(args: &[String]) -> Result<Self> {
        let (content, viewer, seconds) = match args {
            [content, viewer] => (content, viewer, None),
            [content, viewer, seconds] => (content, viewer, Some(seconds)),
            _ => bail!("usage: readtrack-sim <content_id> <viewer_id> [seconds]"),
        };

        let content_id = content
            .parse()
            .with_context(|| format!("invalid content id {content:?}"))?;
        let viewer_id = viewer
            .parse()
            .with_context(|| format!("invalid viewer id {viewer:?}"))?;
        let seconds = match seconds {
            Some(raw) => raw
                .parse()
                .with_context(|| format!("invalid duration {raw:?}"))?,
            None => 60,
        };

        Ok(Self {
            content_id,
            viewer_id,
            duration: Duration::from_secs(seconds),
        })
    }
}

/// Scroll position after `elapsed` of a run lasting `total`.
fn metrics_at(elapsed: Duration, total: Duration) -> ScrollMetrics {
    let fraction = if total.is_zero() {
        1.0
    } else {
        (elapsed.as_secs_f64() / total.as_secs_f64()).min(1.0)
    };
    ScrollMetrics::new(
        fraction * (DOCUMENT_HEIGHT - VIEWPORT_HEIGHT),
        DOCUMENT_HEIGHT,
        VIEWPORT_HEIGHT,
    )
}

pub async fn simulate(args: SimArgs) -> Result<()> {
    let data_dir = std::env::var("READTRACK_DATA_DIR")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("."));
    std::fs::create_dir_all(&data_dir)
        .with_context(|| format!("Failed to create data dir {}", data_dir.display()))?;

    let config = TrackerConfig::load(&data_dir.join("readtrack.json"))?.with_env_overrides();
    log::info!("Reporting to {}", config.log_read_url());

    let database = Database::new(data_dir.join("readtrack.sqlite3"))?;
    let delivery = Arc::new(BeaconDelivery::new(&config)?);
    let services = TrackerServices {
        client: Arc::new(HttpReadLogClient::new(&config)?),
        delivery: delivery.clone(),
        recovery: SessionRecoveryStore::from_config(Arc::new(database), &config),
    };

    let (scroll, scroll_rx) = watch::channel(metrics_at(Duration::ZERO, args.duration));
    let teardown = CancellationToken::new();
    let host = HostBindings::new(scroll_rx, Arc::new(AlwaysVisible::new()), teardown.clone());

    let view = ViewContext {
        content_id: args.content_id,
        viewer_id: Some(args.viewer_id),
    };
    let Some(tracker) = TrackerInstance::mount(view, host, services, &config).await else {
        return Ok(());
    };

    let started = Instant::now();
    let mut ticker = time::interval(STEP);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    let mut progress = tracker.progress();
    let interrupted = tokio::signal::ctrl_c();
    tokio::pin!(interrupted);

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                let elapsed = started.elapsed();
                scroll.send_replace(metrics_at(elapsed, args.duration));
                if elapsed >= args.duration {
                    break;
                }
            }
            changed = progress.changed() => {
                if changed.is_err() {
                    break;
                }
                let snapshot = *progress.borrow_and_update();
                log::debug!(
                    "{} {:.2}% {}s",
                    snapshot.status.as_str(),
                    snapshot.scroll_depth_pct,
                    snapshot.active_time_seconds
                );
            }
            _ = &mut interrupted => {
                log::info!("Interrupted; tearing down");
                teardown.cancel();
                break;
            }
        }
    }

    tracker.page_hide().await;
    let snapshot = tracker.snapshot();
    tracker.unmount().await;

    let pending = delivery.flush(config.final_flush_timeout()).await;
    if pending > 0 {
        log::warn!("{pending} final report(s) still in flight at exit");
    }

    log::info!(
        "Article {} finished {} at {:.2}% after {}s",
        args.content_id,
        snapshot.status.as_str(),
        snapshot.scroll_depth_pct,
        snapshot.active_time_seconds
    );
    Ok(())
}
