//! Streaming frame decoder.
//!
//! After the handshake, the host sends `R` and the device pushes 3-byte
//! frames until told to stop. [`FrameDecoder`] owns the connection for the
//! whole session: it decodes frames in arrival order, hands recognized
//! samples to a [`SampleSink`], and on the way out sends `E` (best effort)
//! before dropping the connection.
//!
//! Frames with an unknown control byte are dropped but counted in
//! [`StreamStats`]. There is no resynchronisation; a lost byte misaligns the
//! rest of the session.

use async_trait::async_trait;
use futures::{SinkExt, Stream};
use std::io;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncWrite, ReadHalf, WriteHalf};
use tokio::sync::mpsc;
use tokio::time;
use tokio_stream::StreamExt;
use tokio_util::codec::{FramedRead, FramedWrite};
use tokio_util::sync::CancellationToken;

use crate::error::Result;
use crate::handshake::DeviceConnection;
use crate::protocol::{Frame, FrameCodec, HostCommand, Sample};
use crate::tracing::prelude::*;
use crate::transport::CandidateAddress;

/// Streaming session settings.
#[derive(Debug, Clone)]
pub struct StreamConfig {
    /// Longest wait for a single frame. `None` waits indefinitely.
    pub read_timeout: Option<Duration>,
    /// Bound on sending the close byte.
    pub close_timeout: Duration,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            read_timeout: None,
            close_timeout: Duration::from_secs(1),
        }
    }
}

/// Counters for one streaming session.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StreamStats {
    /// Samples handed to the caller
    pub samples: u64,
    /// Frames dropped for an unrecognized control byte
    pub unrecognized: u64,
    pub last_unrecognized: Option<u8>,
}

/// Consumer of decoded samples.
#[async_trait]
pub trait SampleSink: Send {
    /// Deliver one sample. Returns `false` once the consumer has gone away,
    /// which ends the session the same way cancellation does.
    async fn accept(&mut self, sample: Sample) -> bool;
}

#[async_trait]
impl SampleSink for mpsc::Sender<Sample> {
    async fn accept(&mut self, sample: Sample) -> bool {
        self.send(sample).await.is_ok()
    }
}

#[async_trait]
impl SampleSink for Vec<Sample> {
    async fn accept(&mut self, sample: Sample) -> bool {
        self.push(sample);
        true
    }
}

/// Owns a confirmed connection and decodes its frame stream.
///
/// [`run`](Self::run) closes the session itself. A decoder driven through
/// [`next_sample`](Self::next_sample) or [`samples`](Self::samples) must be
/// finished with [`close`](Self::close); dropping it releases the port
/// without telling the device to stop.
pub struct FrameDecoder<C> {
    address: CandidateAddress,
    reader: FramedRead<ReadHalf<C>, FrameCodec>,
    writer: FramedWrite<WriteHalf<C>, FrameCodec>,
    config: StreamConfig,
    stats: StreamStats,
}

impl<C> FrameDecoder<C>
where
    C: AsyncRead + AsyncWrite + Unpin + Send,
{
    /// Take ownership of the connection and tell the device to start
    /// streaming.
    pub async fn start(connection: DeviceConnection<C>, config: StreamConfig) -> Result<Self> {
        let (address, io) = connection.into_parts();
        let (reader, writer) = tokio::io::split(io);
        let mut decoder = Self {
            address,
            reader: FramedRead::new(reader, FrameCodec),
            writer: FramedWrite::new(writer, FrameCodec),
            config,
            stats: StreamStats::default(),
        };

        if let Err(e) = decoder.writer.send(HostCommand::StartStreaming).await {
            decoder.close().await;
            return Err(e.into());
        }

        info!(port = %decoder.address, "Streaming started.");
        Ok(decoder)
    }

    pub fn stats(&self) -> StreamStats {
        self.stats
    }

    /// Wait for the next recognized sample.
    ///
    /// Cancel safe: dropping the future mid-read loses no bytes.
    pub async fn next_sample(&mut self) -> Result<Sample> {
        loop {
            let frame = match self.config.read_timeout {
                Some(limit) => time::timeout(limit, self.reader.next())
                    .await
                    .map_err(|_| io::Error::new(io::ErrorKind::TimedOut, "device stalled"))?,
                None => self.reader.next().await,
            };

            match frame {
                Some(Ok(Frame::Sample(sample))) => {
                    self.stats.samples += 1;
                    return Ok(sample);
                }
                Some(Ok(Frame::Unrecognized { control, raw })) => {
                    self.stats.unrecognized += 1;
                    self.stats.last_unrecognized = Some(control);
                    debug!(
                        port = %self.address,
                        control = %format!("0x{control:02x}"),
                        data = %format!("{:02x} {:02x}", raw[0], raw[1]),
                        "Dropped frame with unknown control byte."
                    );
                }
                Some(Err(e)) => return Err(e.into()),
                None => {
                    return Err(
                        io::Error::new(io::ErrorKind::UnexpectedEof, "device closed the stream")
                            .into(),
                    )
                }
            }
        }
    }

    /// The session as a lazy sequence of samples. It ends after yielding
    /// the first error. The decoder stays open; call [`close`](Self::close)
    /// once done with it.
    pub fn samples(&mut self) -> impl Stream<Item = Result<Sample>> + '_ {
        futures::stream::unfold(Some(self), |state| async move {
            let decoder = state?;
            match decoder.next_sample().await {
                Ok(sample) => Some((Ok(sample), Some(decoder))),
                Err(e) => Some((Err(e), None)),
            }
        })
    }

    /// Feed samples to `sink` until cancelled, the sink goes away, or the
    /// transport fails. The close sequence runs in every case.
    pub async fn run<S>(mut self, sink: &mut S, cancel: &CancellationToken) -> Result<StreamStats>
    where
        S: SampleSink + ?Sized,
    {
        let outcome = loop {
            let sample = tokio::select! {
                biased;
                _ = cancel.cancelled() => break Ok(()),
                sample = self.next_sample() => sample,
            };

            let sample = match sample {
                Ok(sample) => sample,
                Err(e) => {
                    warn!(port = %self.address, error = %e, "Stream failed.");
                    break Err(e);
                }
            };

            trace!(%sample, "Decoded.");
            let delivered = tokio::select! {
                biased;
                _ = cancel.cancelled() => break Ok(()),
                delivered = sink.accept(sample) => delivered,
            };
            if !delivered {
                debug!("Sample consumer went away.");
                break Ok(());
            }
        };

        let stats = self.close().await;
        outcome.map(|()| stats)
    }

    /// Send the close byte and release the connection. Failure to send is
    /// logged, never returned.
    pub async fn close(mut self) -> StreamStats {
        match time::timeout(self.config.close_timeout, self.writer.send(HostCommand::Close)).await {
            Ok(Ok(())) => trace!(port = %self.address, "Sent close."),
            Ok(Err(e)) => debug!(port = %self.address, error = %e, "Close byte not sent."),
            Err(_) => debug!(port = %self.address, "Close byte timed out."),
        }

        info!(
            port = %self.address,
            samples = self.stats.samples,
            unrecognized = self.stats.unrecognized,
            "Streaming stopped."
        );
        self.stats
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use crate::protocol::Channel;
    use tokio::io::{AsyncReadExt, AsyncWriteExt, DuplexStream};

    fn connected() -> (DeviceConnection<DuplexStream>, DuplexStream) {
        let (host, device) = tokio::io::duplex(256);
        (DeviceConnection::new("/dev/ttyACM0".into(), host), device)
    }

    async fn expect_byte(device: &mut DuplexStream, expect: u8) {
        let mut byte = [0u8; 1];
        device.read_exact(&mut byte).await.unwrap();
        assert_eq!(byte[0], expect);
    }

    #[tokio::test]
    async fn start_sends_r() {
        let (conn, mut device) = connected();
        let _decoder = FrameDecoder::start(conn, StreamConfig::default()).await.unwrap();
        expect_byte(&mut device, b'R').await;
    }

    #[tokio::test]
    async fn decodes_in_wire_order_and_skips_unknown() {
        let (conn, mut device) = connected();
        let mut decoder = FrameDecoder::start(conn, StreamConfig::default()).await.unwrap();
        expect_byte(&mut device, b'R').await;

        device
            .write_all(&[
                0xff, 0x00, 0x2a, // thrust 42
                0x01, 0xaa, 0xbb, // unknown
                0xfe, 0xff, 0xd6, // temperature -42
                0xfd, 0x00, 0x00, // timestamp 0
            ])
            .await
            .unwrap();

        assert_eq!(decoder.next_sample().await.unwrap(), Sample::new(Channel::Thrust, 42));
        assert_eq!(
            decoder.next_sample().await.unwrap(),
            Sample::new(Channel::Temperature, -42)
        );
        assert_eq!(decoder.next_sample().await.unwrap(), Sample::new(Channel::Timestamp, 0));

        let stats = decoder.stats();
        assert_eq!(stats.samples, 3);
        assert_eq!(stats.unrecognized, 1);
        assert_eq!(stats.last_unrecognized, Some(0x01));
    }

    #[tokio::test]
    async fn run_stops_on_device_hangup_and_reports_failure() {
        let (conn, mut device) = connected();
        let decoder = FrameDecoder::start(conn, StreamConfig::default()).await.unwrap();
        expect_byte(&mut device, b'R').await;

        device.write_all(&[0xff, 0x00, 0x01, 0xfd, 0x00]).await.unwrap();
        drop(device);

        let mut sink = Vec::new();
        let err = decoder.run(&mut sink, &CancellationToken::new()).await.unwrap_err();

        assert!(matches!(err, Error::TransportFailure(_)));
        assert_eq!(sink, vec![Sample::new(Channel::Thrust, 1)]);
    }

    #[tokio::test]
    async fn cancellation_during_blocked_read_closes() {
        let (conn, mut device) = connected();
        let decoder = FrameDecoder::start(conn, StreamConfig::default()).await.unwrap();
        expect_byte(&mut device, b'R').await;

        let cancel = CancellationToken::new();
        let canceller = cancel.clone();
        let session = tokio::spawn(async move {
            let mut sink = Vec::new();
            decoder.run(&mut sink, &cancel).await
        });

        device.write_all(&[0xfe, 0x09, 0xc4]).await.unwrap();
        tokio::task::yield_now().await;
        canceller.cancel();

        let stats = session.await.unwrap().unwrap();
        assert!(stats.samples <= 1);

        expect_byte(&mut device, b'E').await;
        let mut rest = Vec::new();
        device.read_to_end(&mut rest).await.unwrap();
        assert!(rest.is_empty(), "connection released after close");
    }

    #[tokio::test]
    async fn closed_sink_ends_session_cleanly() {
        let (conn, mut device) = connected();
        let decoder = FrameDecoder::start(conn, StreamConfig::default()).await.unwrap();
        expect_byte(&mut device, b'R').await;

        let (mut tx, rx) = mpsc::channel(1);
        drop(rx);
        device.write_all(&[0xff, 0x00, 0x05]).await.unwrap();

        let stats = decoder.run(&mut tx, &CancellationToken::new()).await.unwrap();
        assert_eq!(stats.samples, 1);
        expect_byte(&mut device, b'E').await;
    }

    #[tokio::test(start_paused = true)]
    async fn stalled_device_hits_read_timeout() {
        let (conn, mut device) = connected();
        let config = StreamConfig {
            read_timeout: Some(Duration::from_secs(3)),
            ..Default::default()
        };
        let decoder = FrameDecoder::start(conn, config).await.unwrap();
        expect_byte(&mut device, b'R').await;

        let mut sink = Vec::new();
        let err = decoder.run(&mut sink, &CancellationToken::new()).await.unwrap_err();

        match err {
            Error::TransportFailure(e) => assert_eq!(e.kind(), io::ErrorKind::TimedOut),
            other => panic!("unexpected error: {other}"),
        }
        expect_byte(&mut device, b'E').await;
    }

    #[tokio::test]
    async fn sample_stream_ends_after_error() {
        let (conn, mut device) = connected();
        let mut decoder = FrameDecoder::start(conn, StreamConfig::default()).await.unwrap();
        expect_byte(&mut device, b'R').await;

        device.write_all(&[0xfd, 0x01, 0x00]).await.unwrap();
        drop(device);

        let items: Vec<_> = decoder.samples().collect().await;
        assert_eq!(items.len(), 2);
        assert_eq!(items[0].as_ref().unwrap(), &Sample::new(Channel::Timestamp, 256));
        assert!(items[1].is_err());
    }

    #[tokio::test]
    async fn close_after_sample_stream_sends_e() {
        let (conn, mut device) = connected();
        let mut decoder = FrameDecoder::start(conn, StreamConfig::default()).await.unwrap();
        expect_byte(&mut device, b'R').await;

        device.write_all(&[0xff, 0x00, 0x07, 0xfe, 0x00, 0x08]).await.unwrap();
        let taken: Vec<_> = decoder.samples().take(2).collect().await;
        assert_eq!(taken.len(), 2);

        let stats = decoder.close().await;
        assert_eq!(stats.samples, 2);

        expect_byte(&mut device, b'E').await;
        let mut rest = Vec::new();
        device.read_to_end(&mut rest).await.unwrap();
        assert!(rest.is_empty());
    }
}
