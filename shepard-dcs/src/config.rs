//! Configuration management for shepard-dcs.
//!
//! Configuration comes from a TOML file, with every field optional and a
//! small number of environment overrides applied on top. A missing default
//! config file is not an error; the built-in defaults describe the stock
//! Shepard firmware.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::datapoint::Calibration;
use crate::error::{Error, Result};
use crate::handshake::HandshakeConfig;
use crate::tracing::prelude::*;

/// Default config file location, used when `SHEPARD_CONFIG` is unset.
pub const DEFAULT_CONFIG_PATH: &str = "/etc/shepard/shepard.toml";

/// Main configuration structure for the collector.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct Config {
    /// Daemon configuration
    pub daemon: DaemonConfig,

    /// Serial transport and protocol timing
    pub serial: SerialConfig,

    /// Raw count to physical unit conversion
    pub calibration: Calibration,
}

/// Daemon process configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct DaemonConfig {
    /// Log level used when RUST_LOG is unset
    pub log_level: String,

    /// How often the sample rate is logged, in seconds
    pub rate_report_secs: u64,
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            log_level: "info".into(),
            rate_report_secs: 5,
        }
    }
}

/// Serial transport configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct SerialConfig {
    pub baud_rate: u32,

    /// Explicit ports to probe. When non-empty, enumeration is skipped.
    pub ports: Vec<String>,

    /// Directory scanned when the native port listing comes back empty
    pub scan_dir: PathBuf,

    /// Glob-style file name pattern for the fallback scan (`*` and `?`)
    pub scan_pattern: String,

    pub settle_delay_ms: u64,
    pub handshake_timeout_ms: u64,

    /// Bound on a single streaming read. Unset means wait forever.
    pub read_timeout_ms: Option<u64>,
}

impl Default for SerialConfig {
    fn default() -> Self {
        Self {
            baud_rate: 115_200,
            ports: Vec::new(),
            scan_dir: PathBuf::from("/dev"),
            scan_pattern: "tty*".into(),
            settle_delay_ms: 2_500,
            handshake_timeout_ms: 2_000,
            read_timeout_ms: None,
        }
    }
}

impl SerialConfig {
    pub fn handshake(&self) -> HandshakeConfig {
        HandshakeConfig {
            settle_delay: Duration::from_millis(self.settle_delay_ms),
            io_timeout: Duration::from_millis(self.handshake_timeout_ms),
        }
    }

    pub fn read_timeout(&self) -> Option<Duration> {
        self.read_timeout_ms.map(Duration::from_millis)
    }
}

impl Config {
    /// Load configuration from `$SHEPARD_CONFIG` or the default location.
    ///
    /// An explicitly named file must exist; the default one may be absent.
    pub fn load() -> Result<Self> {
        let mut config = match std::env::var_os("SHEPARD_CONFIG") {
            Some(path) => Self::load_from(Path::new(&path))?,
            None if Path::new(DEFAULT_CONFIG_PATH).exists() => {
                Self::load_from(Path::new(DEFAULT_CONFIG_PATH))?
            }
            None => {
                debug!("No config file at {DEFAULT_CONFIG_PATH}, using defaults.");
                Self::default()
            }
        };
        config.apply_env_overrides();
        Ok(config)
    }

    /// Load configuration from a specific file.
    pub fn load_from(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("reading {}: {e}", path.display())))?;
        Self::from_toml_str(&text)
            .map_err(|e| Error::Config(format!("{}: {e}", path.display())))
    }

    /// Parse configuration from TOML text.
    pub fn from_toml_str(text: &str) -> Result<Self> {
        let config: Self = toml::from_str(text).map_err(|e| Error::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if self.serial.baud_rate == 0 {
            return Err(Error::Config("serial.baud_rate must be non-zero".into()));
        }
        if self.serial.handshake_timeout_ms == 0 {
            return Err(Error::Config(
                "serial.handshake_timeout_ms must be non-zero".into(),
            ));
        }
        if self.serial.read_timeout_ms == Some(0) {
            return Err(Error::Config("serial.read_timeout_ms must be non-zero".into()));
        }
        let divisor = self.calibration.temperature_divisor;
        if divisor == 0.0 || !divisor.is_finite() {
            return Err(Error::Config(
                "calibration.temperature_divisor must be finite and non-zero".into(),
            ));
        }
        Ok(())
    }

    fn apply_env_overrides(&mut self) {
        if let Some(secs) = std::env::var("SHEPARD_READ_TIMEOUT_SECS")
            .ok()
            .and_then(|s| s.parse::<u64>().ok())
            .filter(|&s| s > 0)
        {
            self.serial.read_timeout_ms = Some(secs.saturating_mul(1_000));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_file_gives_defaults() {
        let config = Config::from_toml_str("").unwrap();
        assert_eq!(config.serial.baud_rate, 115_200);
        assert_eq!(config.serial.scan_pattern, "tty*");
        assert_eq!(config.serial.read_timeout(), None);
        assert_eq!(
            config.serial.handshake().settle_delay,
            Duration::from_millis(2_500)
        );
        assert_eq!(config.daemon.log_level, "info");
    }

    #[test]
    fn partial_sections_merge_with_defaults() {
        let config = Config::from_toml_str(
            r#"
            [serial]
            ports = ["/dev/ttyACM0", "/dev/ttyUSB1"]
            read_timeout_ms = 1500

            [calibration]
            temperature_divisor = 10.0
            "#,
        )
        .unwrap();

        assert_eq!(config.serial.ports, vec!["/dev/ttyACM0", "/dev/ttyUSB1"]);
        assert_eq!(config.serial.read_timeout(), Some(Duration::from_millis(1_500)));
        assert_eq!(config.serial.settle_delay_ms, 2_500);
        assert_eq!(config.calibration.temperature_divisor, 10.0);
        assert_eq!(config.calibration.newtons_per_pound, 4.448);
    }

    #[test]
    fn rejects_zero_baud() {
        let err = Config::from_toml_str("[serial]\nbaud_rate = 0\n").unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn rejects_zero_temperature_divisor() {
        let err = Config::from_toml_str("[calibration]\ntemperature_divisor = 0.0\n").unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn rejects_malformed_toml() {
        assert!(matches!(
            Config::from_toml_str("[serial\n"),
            Err(Error::Config(_))
        ));
    }

    #[test]
    fn missing_explicit_file_is_an_error() {
        let path = Path::new("/nonexistent/shepard/config.toml");
        assert!(matches!(Config::load_from(path), Err(Error::Config(_))));
    }

    // The only test that touches the process environment.
    #[test]
    fn load_honours_environment() {
        let path = std::env::temp_dir().join(format!("shepard-config-{}.toml", std::process::id()));
        let text = "[serial]\nports = [\"/dev/ttyACM3\"]\nread_timeout_ms = 250\n";
        std::fs::write(&path, text).unwrap();
        std::env::set_var("SHEPARD_CONFIG", &path);

        std::env::remove_var("SHEPARD_READ_TIMEOUT_SECS");
        let config = Config::load().unwrap();
        assert_eq!(config.serial.ports, ["/dev/ttyACM3"]);
        assert_eq!(config.serial.read_timeout(), Some(Duration::from_millis(250)));

        std::env::set_var("SHEPARD_READ_TIMEOUT_SECS", "7");
        let config = Config::load().unwrap();
        assert_eq!(config.serial.read_timeout(), Some(Duration::from_secs(7)));

        std::env::set_var("SHEPARD_READ_TIMEOUT_SECS", "18446744073709552");
        let config = Config::load().unwrap();
        assert_eq!(config.serial.read_timeout_ms, Some(u64::MAX));

        // Unparseable and zero values leave the file setting alone.
        for ignored in ["soon", "0"] {
            std::env::set_var("SHEPARD_READ_TIMEOUT_SECS", ignored);
            let config = Config::load().unwrap();
            assert_eq!(config.serial.read_timeout_ms, Some(250));
        }

        std::env::set_var("SHEPARD_CONFIG", "/nonexistent/shepard/config.toml");
        assert!(matches!(Config::load(), Err(Error::Config(_))));

        std::env::remove_var("SHEPARD_READ_TIMEOUT_SECS");
        std::env::remove_var("SHEPARD_CONFIG");
        std::fs::remove_file(&path).unwrap();
    }
}
