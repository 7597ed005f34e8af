//! Device transport probes.
//!
//! [`DeviceTransportProbe`] is the capability a transport must provide to
//! host a Shepard device: find one, then stream from it. [`Probe`] is the
//! implementation for any byte-stream [`Transport`]; [`SerialProbe`] is the
//! one the daemon uses. A new transport is a new `Transport` (or a new probe
//! implementation), never a variation on an existing one.

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::error::Result;
use crate::handshake::{self, DeviceConnection, HandshakeConfig, HandshakeResult};
use crate::stream::{FrameDecoder, SampleSink, StreamConfig, StreamStats};
use crate::transport::{CandidateAddress, SerialTransport, Transport};

#[async_trait]
pub trait DeviceTransportProbe: Send + Sync {
    type Connection: Send;

    /// Probe candidates in order and return the first confirmed device.
    async fn discover(
        &self,
        candidates: &[CandidateAddress],
        cancel: &CancellationToken,
    ) -> HandshakeResult<Self::Connection>;

    /// Run a streaming session on a confirmed connection until
    /// cancellation or transport failure. The connection is closed on
    /// return.
    async fn stream<S>(
        &self,
        connection: DeviceConnection<Self::Connection>,
        sink: &mut S,
        cancel: &CancellationToken,
    ) -> Result<StreamStats>
    where
        S: SampleSink + ?Sized;
}

/// Probe over a byte-stream transport.
#[derive(Debug, Clone)]
pub struct Probe<T> {
    transport: T,
    handshake: HandshakeConfig,
    stream: StreamConfig,
}

/// The serial port probe.
pub type SerialProbe = Probe<SerialTransport>;

impl<T: Transport> Probe<T> {
    pub fn new(transport: T, handshake: HandshakeConfig, stream: StreamConfig) -> Self {
        Self {
            transport,
            handshake,
            stream,
        }
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }
}

#[async_trait]
impl<T: Transport> DeviceTransportProbe for Probe<T> {
    type Connection = T::Connection;

    async fn discover(
        &self,
        candidates: &[CandidateAddress],
        cancel: &CancellationToken,
    ) -> HandshakeResult<T::Connection> {
        handshake::discover(&self.transport, candidates, &self.handshake, cancel).await
    }

    async fn stream<S>(
        &self,
        connection: DeviceConnection<T::Connection>,
        sink: &mut S,
        cancel: &CancellationToken,
    ) -> Result<StreamStats>
    where
        S: SampleSink + ?Sized,
    {
        let decoder = FrameDecoder::start(connection, self.stream.clone()).await?;
        decoder.run(sink, cancel).await
    }
}
