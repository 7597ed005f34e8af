//! Collection session: find the device, stream from it, report.
//!
//! [`task`] is one pass of enumerate → handshake → stream. It does not retry;
//! a failed session is reported and the caller decides whether to run
//! discovery again. [`report_task`] sits on the other end of the sample
//! channel, assembling data points and logging throughput.

use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time;
use tokio_util::sync::CancellationToken;

use crate::config::Config;
use crate::datapoint::{Calibration, DataPointAssembler};
use crate::device::{DeviceTransportProbe, SerialProbe};
use crate::error::{Error, Result};
use crate::protocol::Sample;
use crate::stream::{SampleSink, StreamConfig, StreamStats};
use crate::tracing::prelude::*;
use crate::transport::{
    enumerate_candidates, CandidateAddress, DeviceFilePattern, NativePortLister, Platform,
    PortLister, SerialTransport,
};
use crate::types::RateMeter;

/// Addresses to probe: the configured list if any, else enumeration.
pub fn candidates(config: &Config) -> Result<Vec<CandidateAddress>> {
    candidates_from(config, Platform::current(), &NativePortLister)
}

fn candidates_from(
    config: &Config,
    platform: Platform,
    lister: &impl PortLister,
) -> Result<Vec<CandidateAddress>> {
    if !config.serial.ports.is_empty() {
        return Ok(config
            .serial
            .ports
            .iter()
            .map(|p| CandidateAddress::from(p.as_str()))
            .collect());
    }

    let fallback = DeviceFilePattern::new(&config.serial.scan_dir, &config.serial.scan_pattern)?;
    Ok(enumerate_candidates(platform, lister, &fallback))
}

/// Run one discovery and streaming session against `probe`.
pub async fn session<P, S>(
    probe: &P,
    candidates: &[CandidateAddress],
    sink: &mut S,
    running: &CancellationToken,
) -> Result<StreamStats>
where
    P: DeviceTransportProbe,
    S: SampleSink + ?Sized,
{
    let connection = probe.discover(candidates, running).await?;
    probe.stream(connection, sink, running).await
}

/// Serial collection task for the daemon.
///
/// Cancels `running` on the way out so the rest of the process stops too.
pub async fn task(config: Config, mut sink: mpsc::Sender<Sample>, running: CancellationToken) {
    trace!("Task started.");

    let outcome = async {
        let candidates = candidates(&config)?;
        let probe = SerialProbe::new(
            SerialTransport::new(config.serial.baud_rate),
            config.serial.handshake(),
            StreamConfig {
                read_timeout: config.serial.read_timeout(),
                ..Default::default()
            },
        );
        info!(
            baud = probe.transport().baud_rate(),
            candidates = candidates.len(),
            "Starting session."
        );
        session(&probe, &candidates, &mut sink, &running).await
    }
    .await;

    match outcome {
        Ok(stats) => info!(
            samples = stats.samples,
            unrecognized = stats.unrecognized,
            "Session ended."
        ),
        Err(Error::Cancelled) => debug!("Discovery cancelled."),
        Err(Error::NoCandidatesFound) => error!("No serial ports to probe."),
        Err(e) => error!(error = %e, "Session failed."),
    }

    running.cancel();
    trace!("Task stopped.");
}

/// Consume samples, log each complete data point and the sample rate.
pub async fn report_task(
    mut samples: mpsc::Receiver<Sample>,
    calibration: Calibration,
    every: Duration,
) {
    let mut assembler = DataPointAssembler::new(calibration);
    let mut meter = RateMeter::new();
    let mut report = time::interval(every);
    report.set_missed_tick_behavior(time::MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            sample = samples.recv() => {
                let Some(sample) = sample else { break };
                meter.record();
                if let Some(point) = assembler.push(sample) {
                    info!(%point, "Data point.");
                }
            }
            _ = report.tick() => {
                if let Some(rate) = meter.rate() {
                    info!(samples = meter.count(), %rate, "Sample rate.");
                }
            }
        }
    }

    debug!(samples = meter.count(), "Sample channel closed.");
}
