//! Calibrated data points.
//!
//! The device reports each channel separately as raw counts. A data point
//! is one reading of all three, converted to physical units: thrust in
//! newtons, temperature in degrees Celsius, and the device's own timestamp.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::{Error, Result};
use crate::protocol::{Channel, Sample};

/// Raw count to physical unit conversion.
///
/// The thrust defaults are the load cell fit in pounds-force, scaled to
/// newtons.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct Calibration {
    /// Pounds-force per raw count
    pub thrust_scale: f32,
    /// Pounds-force at zero counts
    pub thrust_offset: f32,
    pub newtons_per_pound: f32,
    /// Raw temperature counts per degree Celsius
    pub temperature_divisor: f32,
}

impl Default for Calibration {
    fn default() -> Self {
        Self {
            thrust_scale: 0.009_556_674_4,
            thrust_offset: -0.065_273_944_7,
            newtons_per_pound: 4.448,
            temperature_divisor: 100.0,
        }
    }
}

impl Calibration {
    pub fn thrust_newtons(&self, raw: i16) -> f32 {
        (self.thrust_scale * f32::from(raw) + self.thrust_offset) * self.newtons_per_pound
    }

    pub fn temperature_celsius(&self, raw: i16) -> f32 {
        f32::from(raw) / self.temperature_divisor
    }
}

/// One complete reading.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DataPoint {
    pub time: i64,
    /// Newtons
    pub thrust: f32,
    /// Degrees Celsius
    pub temperature: f32,
}

/// `time,thrust,temperature`
impl fmt::Display for DataPoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{},{},{}", self.time, self.thrust, self.temperature)
    }
}

impl FromStr for DataPoint {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let parts: Vec<&str> = s.trim().split(',').map(str::trim).collect();
        let (time, thrust, temperature) = match parts.as_slice() {
            [time, thrust, temperature] => (*time, *thrust, *temperature),
            _ => {
                return Err(Error::InvalidDataPoint(format!(
                    "expected 3 fields, got {}",
                    parts.len()
                )))
            }
        };

        let bad = |field: &str, value: &str| {
            Error::InvalidDataPoint(format!("{field} is not a number: {value:?}"))
        };
        Ok(Self {
            time: time.parse().map_err(|_| bad("time", time))?,
            thrust: thrust.parse().map_err(|_| bad("thrust", thrust))?,
            temperature: temperature
                .parse()
                .map_err(|_| bad("temperature", temperature))?,
        })
    }
}

/// Collects samples until every channel has been seen, then emits a data
/// point and starts over. A repeated channel overwrites the earlier value.
#[derive(Debug, Default)]
pub struct DataPointAssembler {
    calibration: Calibration,
    thrust: Option<f32>,
    temperature: Option<f32>,
    time: Option<i64>,
}

impl DataPointAssembler {
    pub fn new(calibration: Calibration) -> Self {
        Self {
            calibration,
            ..Default::default()
        }
    }

    pub fn push(&mut self, sample: Sample) -> Option<DataPoint> {
        match sample.channel {
            Channel::Thrust => self.thrust = Some(self.calibration.thrust_newtons(sample.value)),
            Channel::Temperature => {
                self.temperature = Some(self.calibration.temperature_celsius(sample.value))
            }
            Channel::Timestamp => self.time = Some(i64::from(sample.value)),
        }

        let point = DataPoint {
            time: self.time?,
            thrust: self.thrust?,
            temperature: self.temperature?,
        };
        self.clear();
        Some(point)
    }

    pub fn clear(&mut self) {
        self.thrust = None;
        self.temperature = None;
        self.time = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn close(a: f32, b: f32) -> bool {
        (a - b).abs() < 1e-3
    }

    #[test]
    fn thrust_conversion() {
        let cal = Calibration::default();
        assert!(close(cal.thrust_newtons(0), -0.290_338_6));
        assert!(close(cal.thrust_newtons(1000), 42.217_75));
    }

    #[test]
    fn temperature_conversion() {
        let cal = Calibration::default();
        assert!(close(cal.temperature_celsius(2150), 21.5));
        assert!(close(cal.temperature_celsius(-42), -0.42));
    }

    #[test]
    fn emits_once_all_channels_seen() {
        let mut asm = DataPointAssembler::new(Calibration::default());

        assert_eq!(asm.push(Sample::new(Channel::Timestamp, 7)), None);
        assert_eq!(asm.push(Sample::new(Channel::Thrust, 0)), None);
        let point = asm.push(Sample::new(Channel::Temperature, 2500)).unwrap();

        assert_eq!(point.time, 7);
        assert!(close(point.temperature, 25.0));

        // Starts over after emitting.
        assert_eq!(asm.push(Sample::new(Channel::Timestamp, 8)), None);
    }

    #[test]
    fn repeated_channel_overwrites() {
        let mut asm = DataPointAssembler::new(Calibration::default());
        asm.push(Sample::new(Channel::Timestamp, 1));
        asm.push(Sample::new(Channel::Timestamp, 2));
        asm.push(Sample::new(Channel::Temperature, 100));
        let point = asm.push(Sample::new(Channel::Thrust, 10)).unwrap();
        assert_eq!(point.time, 2);
    }

    #[test]
    fn text_form() {
        let point = DataPoint {
            time: 1200,
            thrust: 12.5,
            temperature: 21.25,
        };
        assert_eq!(point.to_string(), "1200,12.5,21.25");
        assert_eq!("1200, 12.5 ,21.25\n".parse::<DataPoint>().unwrap(), point);
    }

    #[test]
    fn text_form_rejects_garbage() {
        assert!(matches!(
            "1,2".parse::<DataPoint>(),
            Err(Error::InvalidDataPoint(_))
        ));
        assert!(matches!(
            "1,2,3,4".parse::<DataPoint>(),
            Err(Error::InvalidDataPoint(_))
        ));
        assert!(matches!(
            "x,2,3".parse::<DataPoint>(),
            Err(Error::InvalidDataPoint(_))
        ));
    }
}
