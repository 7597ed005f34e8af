//! Physical transport layer for device connections.
//!
//! This module produces the list of endpoints worth probing and opens raw
//! byte streams to them. It has no knowledge of the Shepard protocol; that
//! lives in [`crate::handshake`] and [`crate::stream`].

pub mod enumerate;
pub mod serial;

use async_trait::async_trait;
use std::fmt;
use std::io;
use tokio::io::{AsyncRead, AsyncWrite};

pub use enumerate::{enumerate_candidates, DeviceFilePattern, Platform, PortLister};
pub use serial::{NativePortLister, SerialTransport};

/// A platform locator for one transport endpoint, e.g. `/dev/ttyACM0`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CandidateAddress(String);

impl CandidateAddress {
    pub fn new(address: impl Into<String>) -> Self {
        Self(address.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CandidateAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for CandidateAddress {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl From<String> for CandidateAddress {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// Opens byte streams to candidate addresses.
///
/// The returned stream is closed when dropped.
#[async_trait]
pub trait Transport: Send + Sync {
    type Connection: AsyncRead + AsyncWrite + Unpin + Send + 'static;

    async fn open(&self, address: &CandidateAddress) -> io::Result<Self::Connection>;
}
