//! Shepard serial wire protocol.
//!
//! Host to device traffic is single ASCII command bytes. Device to host
//! traffic, once streaming has started, is a sequence of 3-byte frames:
//!
//! ```text
//! +---------+-----------------------------+
//! | control | value (i16, big-endian)     |
//! +---------+-----------------------------+
//! ```
//!
//! The control byte selects the measurement channel. There is no sync
//! marker; a lost byte misaligns every following frame.

use bytes::{Buf, BufMut, BytesMut};
use std::fmt;
use std::io;
use strum::{Display, EnumIter};
use tokio_util::codec::{Decoder, Encoder};

/// Identification request, echoed back by genuine devices.
pub const IDENTIFY: u8 = b'D';
/// Start pushing frames.
pub const START_STREAMING: u8 = b'R';
/// Stop streaming; no response expected.
pub const CLOSE: u8 = b'E';

/// Length of a streaming frame on the wire.
pub const FRAME_LEN: usize = 3;

/// Measurement channel carried by a frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumIter)]
#[repr(u8)]
pub enum Channel {
    Thrust = 0xff,
    Temperature = 0xfe,
    Timestamp = 0xfd,
}

impl Channel {
    pub fn control_byte(self) -> u8 {
        self as u8
    }
}

impl TryFrom<u8> for Channel {
    type Error = u8;

    fn try_from(control: u8) -> Result<Self, Self::Error> {
        match control {
            0xff => Ok(Channel::Thrust),
            0xfe => Ok(Channel::Temperature),
            0xfd => Ok(Channel::Timestamp),
            other => Err(other),
        }
    }
}

/// One decoded measurement.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Sample {
    pub channel: Channel,
    pub value: i16,
}

impl Sample {
    pub fn new(channel: Channel, value: i16) -> Self {
        Self { channel, value }
    }
}

impl fmt::Display for Sample {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.channel, self.value)
    }
}

/// A frame as read off the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Frame {
    Sample(Sample),
    /// Control byte outside the channel table. The value bytes are still
    /// consumed so the next frame starts on the following triplet.
    Unrecognized { control: u8, raw: [u8; 2] },
}

/// Commands the host sends to the device.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HostCommand {
    Identify,
    StartStreaming,
    Close,
}

impl HostCommand {
    pub fn byte(self) -> u8 {
        match self {
            HostCommand::Identify => IDENTIFY,
            HostCommand::StartStreaming => START_STREAMING,
            HostCommand::Close => CLOSE,
        }
    }
}

#[derive(Debug, Default)]
pub struct FrameCodec;

impl Encoder<HostCommand> for FrameCodec {
    type Error = io::Error;

    fn encode(&mut self, command: HostCommand, dst: &mut BytesMut) -> Result<(), Self::Error> {
        dst.put_u8(command.byte());
        Ok(())
    }
}

impl Decoder for FrameCodec {
    type Item = Frame;
    type Error = io::Error;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        if src.len() < FRAME_LEN {
            src.reserve(FRAME_LEN - src.len());
            return Ok(None);
        }

        let control = src.get_u8();
        let raw = [src.get_u8(), src.get_u8()];

        Ok(Some(match Channel::try_from(control) {
            Ok(channel) => Frame::Sample(Sample::new(channel, i16::from_be_bytes(raw))),
            Err(control) => Frame::Unrecognized { control, raw },
        }))
    }
}
