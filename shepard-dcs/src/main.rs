use anyhow::Result;
use std::time::Duration;
use tokio::signal::unix::{self, SignalKind};
use tokio::sync::mpsc;
use tokio_util::{sync::CancellationToken, task::TaskTracker};

use shepard_dcs::collector;
use shepard_dcs::config::Config;
use shepard_dcs::tracing::{self, prelude::*};

/// Samples buffered between the decoder and the reporter.
const SAMPLE_QUEUE_DEPTH: usize = 100;

#[tokio::main]
async fn main() -> Result<()> {
    let config = Config::load()?;
    tracing::init_journald_or_stdout(&config.daemon.log_level);

    let running = CancellationToken::new();
    let tracker = TaskTracker::new();
    let (sample_tx, sample_rx) = mpsc::channel(SAMPLE_QUEUE_DEPTH);

    tracker.spawn(collector::report_task(
        sample_rx,
        config.calibration.clone(),
        Duration::from_secs(config.daemon.rate_report_secs.max(1)),
    ));
    tracker.spawn(collector::task(config, sample_tx, running.clone()));
    tracker.close();
    info!("Started.");

    let mut sigint = unix::signal(SignalKind::interrupt())?;
    let mut sigterm = unix::signal(SignalKind::terminate())?;
    tokio::select! {
        _ = sigint.recv() => {},
        _ = sigterm.recv() => {},
        _ = running.cancelled() => {},
    }

    trace!("Shutting down.");
    running.cancel();

    tracker.wait().await;
    info!("Exiting.");
    Ok(())
}
