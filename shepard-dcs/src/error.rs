//! Common error types for shepard-dcs.
//!
//! Discovery, streaming and configuration all report through the one
//! [`Error`] enum. Per-candidate handshake failures are variants too, but
//! discovery recovers from them locally and only surfaces the terminal ones.

use std::io;
use thiserror::Error;

/// Main error type for shepard-dcs operations.
#[derive(Error, Debug)]
pub enum Error {
    /// Enumeration produced no addresses to probe.
    #[error("no candidate ports found")]
    NoCandidatesFound,

    /// A candidate did not answer within the handshake timeout.
    #[error("handshake timed out")]
    HandshakeTimeout,

    /// A candidate answered the identification byte with something else.
    #[error("handshake mismatch: expected 0x44, got 0x{got:02x}")]
    HandshakeMismatch { got: u8 },

    /// Every candidate was probed and none confirmed.
    #[error("no device found after probing {probed} candidate(s)")]
    NoDeviceFound { probed: usize },

    /// I/O failure on the transport
    #[error("transport failure: {0}")]
    TransportFailure(#[from] io::Error),

    /// Serial port errors
    #[error("serial port error: {0}")]
    Serial(#[from] tokio_serial::Error),

    /// Configuration errors
    #[error("configuration error: {0}")]
    Config(String),

    /// A data point text record could not be parsed.
    #[error("invalid data point: {0}")]
    InvalidDataPoint(String),

    /// The operation was stopped by its cancellation token.
    #[error("cancelled")]
    Cancelled,
}

impl Error {
    /// True for failures that only disqualify a single candidate during
    /// discovery.
    pub fn is_per_candidate(&self) -> bool {
        matches!(
            self,
            Error::HandshakeTimeout
                | Error::HandshakeMismatch { .. }
                | Error::TransportFailure(_)
                | Error::Serial(_)
        )
    }
}

/// Convenience type alias for Results using our Error type.
pub type Result<T> = std::result::Result<T, Error>;
