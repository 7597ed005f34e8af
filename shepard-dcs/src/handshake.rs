//! Device discovery handshake.
//!
//! Each candidate is opened, given time for the microcontroller's serial
//! interface to come up, then sent `D`. A genuine device echoes `D`. The
//! first candidate to do so wins and the rest are never touched.
//!
//! Every step is bounded by [`HandshakeConfig::io_timeout`], so a wedged
//! port costs at most a few seconds. Any failure closes the candidate's
//! connection (by dropping it) before the next one is opened.

use std::future::Future;
use std::io;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::time;
use tokio_util::sync::CancellationToken;

use crate::error::{Error, Result};
use crate::protocol::HostCommand;
use crate::tracing::prelude::*;
use crate::transport::{CandidateAddress, Transport};

/// Timing for the per-candidate handshake.
#[derive(Debug, Clone)]
pub struct HandshakeConfig {
    /// Pause between opening the port and sending the identification byte.
    pub settle_delay: Duration,
    /// Bound on each of open, write and read.
    pub io_timeout: Duration,
}

impl Default for HandshakeConfig {
    fn default() -> Self {
        Self {
            settle_delay: Duration::from_millis(2_500),
            io_timeout: Duration::from_secs(2),
        }
    }
}

/// An open connection to a confirmed device.
///
/// Owning one of these is the only way to talk to the device; it is handed
/// to the frame decoder by value and closed when dropped.
#[derive(Debug)]
pub struct DeviceConnection<C> {
    address: CandidateAddress,
    io: C,
}

impl<C> DeviceConnection<C> {
    pub(crate) fn new(address: CandidateAddress, io: C) -> Self {
        Self { address, io }
    }

    /// The address the device was confirmed on.
    pub fn address(&self) -> &CandidateAddress {
        &self.address
    }

    pub fn into_parts(self) -> (CandidateAddress, C) {
        (self.address, self.io)
    }
}

/// `Ok(Connected)` or `Err(reason)`.
pub type HandshakeResult<C> = Result<DeviceConnection<C>>;

async fn bounded<T>(limit: Duration, op: impl Future<Output = io::Result<T>>) -> Result<T> {
    match time::timeout(limit, op).await {
        Ok(result) => Ok(result?),
        Err(_) => Err(Error::HandshakeTimeout),
    }
}

/// Run the handshake against a single candidate.
///
/// On failure the partially opened connection has already been dropped.
pub async fn probe_candidate<T: Transport>(
    transport: &T,
    address: &CandidateAddress,
    config: &HandshakeConfig,
) -> Result<T::Connection> {
    let mut io = bounded(config.io_timeout, transport.open(address)).await?;

    time::sleep(config.settle_delay).await;

    bounded(config.io_timeout, async {
        io.write_all(&[HostCommand::Identify.byte()]).await?;
        io.flush().await
    })
    .await?;

    let mut reply = [0u8; 1];
    bounded(config.io_timeout, io.read_exact(&mut reply)).await?;

    if reply[0] != HostCommand::Identify.byte() {
        return Err(Error::HandshakeMismatch { got: reply[0] });
    }

    Ok(io)
}

/// Try candidates in order until one confirms.
///
/// Per-candidate failures are logged and skipped. An empty candidate list
/// is reported as [`Error::NoCandidatesFound`], exhaustion as
/// [`Error::NoDeviceFound`].
pub async fn discover<T: Transport>(
    transport: &T,
    candidates: &[CandidateAddress],
    config: &HandshakeConfig,
    cancel: &CancellationToken,
) -> HandshakeResult<T::Connection> {
    if candidates.is_empty() {
        return Err(Error::NoCandidatesFound);
    }

    info!(count = candidates.len(), "Looking for Shepard device.");

    for address in candidates {
        debug!(port = %address, "Trying.");

        let attempt = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(Error::Cancelled),
            attempt = probe_candidate(transport, address, config) => attempt,
        };

        match attempt {
            Ok(io) => {
                info!(port = %address, "Device found.");
                return Ok(DeviceConnection::new(address.clone(), io));
            }
            Err(e) if e.is_per_candidate() => {
                debug!(port = %address, error = %e, "Not a Shepard device.")
            }
            Err(e) => return Err(e),
        }
    }

    warn!(probed = candidates.len(), "No Shepard device found.");
    Err(Error::NoDeviceFound {
        probed: candidates.len(),
    })
}
