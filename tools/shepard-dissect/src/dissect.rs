//! Capture dissection engine.
//!
//! A capture is the device-to-host side of a streaming session, written as
//! hex. Frames are cut from it with the same codec the daemon uses, so a
//! misaligned capture shows up here exactly as the daemon would see it.

use anyhow::{Context, Result};
use bytes::BytesMut;
use colored::Colorize;
use shepard_dcs::protocol::{Channel, Frame, FrameCodec, Sample, FRAME_LEN};
use std::fmt;
use tokio_util::codec::Decoder;

/// Dissected frame with decoded content
#[derive(Debug, PartialEq)]
pub struct DissectedFrame {
    /// Byte offset of the frame within the capture
    pub offset: usize,
    pub raw_data: Vec<u8>,
    pub content: FrameContent,
}

/// Decoded frame content
#[derive(Debug, PartialEq)]
pub enum FrameContent {
    Sample(Sample),
    Unrecognized { control: u8 },
    /// Capture ended partway through a frame.
    Truncated,
}

impl fmt::Display for DissectedFrame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let raw = hex::encode(&self.raw_data);
        write!(f, "{:>8}  {:<6}  ", self.offset, raw)?;
        match &self.content {
            FrameContent::Sample(sample) => {
                let channel = match sample.channel {
                    Channel::Thrust => sample.channel.to_string().cyan(),
                    Channel::Temperature => sample.channel.to_string().yellow(),
                    Channel::Timestamp => sample.channel.to_string().blue(),
                };
                write!(f, "{:<11} {}", channel, sample.value)
            }
            FrameContent::Unrecognized { control } => {
                write!(f, "{}", format!("unknown control 0x{control:02x}").red())
            }
            FrameContent::Truncated => write!(f, "{}", "truncated".dimmed()),
        }
    }
}

/// Parse a hex dump. Whitespace, commas and `0x` prefixes are ignored.
pub fn parse_hex_dump(text: &str) -> Result<Vec<u8>> {
    let digits: String = text
        .split(|c: char| c.is_whitespace() || c == ',')
        .filter(|tok| !tok.is_empty())
        .map(|tok| tok.trim_start_matches("0x").trim_start_matches("0X"))
        .collect();
    hex::decode(&digits).context("capture is not valid hex")
}

/// Split a capture into frames.
pub fn dissect_capture(capture: &[u8]) -> Vec<DissectedFrame> {
    let mut codec = FrameCodec;
    let mut buf = BytesMut::from(capture);
    let mut frames = Vec::with_capacity(capture.len() / FRAME_LEN + 1);
    let mut offset = 0;

    // Decoding from memory cannot fail.
    while let Ok(Some(frame)) = codec.decode(&mut buf) {
        let raw_data = capture[offset..offset + FRAME_LEN].to_vec();
        let content = match frame {
            Frame::Sample(sample) => FrameContent::Sample(sample),
            Frame::Unrecognized { control, .. } => FrameContent::Unrecognized { control },
        };
        frames.push(DissectedFrame {
            offset,
            raw_data,
            content,
        });
        offset += FRAME_LEN;
    }

    if !buf.is_empty() {
        frames.push(DissectedFrame {
            offset,
            raw_data: buf.to_vec(),
            content: FrameContent::Truncated,
        });
    }

    frames
}
