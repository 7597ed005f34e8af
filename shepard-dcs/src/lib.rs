//! Host-side data collection for Shepard thrust stand telemetry devices.
//!
//! The device is found by probing serial ports with a one-byte handshake,
//! then streams thrust, temperature and timestamp readings as 3-byte frames.
//! See [`handshake`] for discovery and [`stream`] for the frame decoder.

pub mod collector;
pub mod config;
pub mod datapoint;
pub mod device;
pub mod error;
pub mod handshake;
pub mod protocol;
pub mod stream;
pub mod tracing;
pub mod transport;
pub mod types;
