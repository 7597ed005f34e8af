//! Small value types shared across the crate.

pub mod sample_rate;

pub use sample_rate::{RateMeter, SampleRate};
