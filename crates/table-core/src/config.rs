//! Configuration types for the table control system.
//!
//! The core takes a fully-resolved [`TableConfig`]; it performs no port
//! discovery or prompting itself. Files are TOML, loaded through the
//! `config` crate, then semantically validated: values that parse but are
//! logically wrong (a baud rate the controller cannot negotiate, a word
//! size outside 7/8) are rejected with `TableError::Configuration` before
//! any hardware is touched.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{AppResult, TableError};

/// Baud rates the motion controller can negotiate.
pub const SUPPORTED_BAUD_RATES: [u32; 8] = [1200, 2400, 4800, 9600, 19200, 38400, 57600, 115200];

/// Serial parity setting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Parity {
    /// Even parity.
    Even,
    /// Odd parity.
    Odd,
    /// No parity bit.
    None,
}

/// Serial link settings, immutable for the lifetime of an open link.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SerialLinkConfig {
    /// Serial port path (e.g. "/dev/ttyUSB0", "COM3").
    pub port: String,
    /// Baud rate; must be one of [`SUPPORTED_BAUD_RATES`].
    pub baud: u32,
    /// Parity bit setting.
    pub parity: Parity,
    /// Data bits per word (7 or 8).
    pub word_size: u8,
    /// Budget for reading one terminated reply line, in milliseconds.
    #[serde(default = "default_read_timeout_ms")]
    pub read_timeout_ms: u64,
}

fn default_read_timeout_ms() -> u64 {
    500
}

impl SerialLinkConfig {
    /// Read budget as a [`Duration`].
    pub fn read_timeout(&self) -> Duration {
        Duration::from_millis(self.read_timeout_ms)
    }
}

impl Default for SerialLinkConfig {
    // Controller factory settings: 9600 baud, odd parity, 7 data bits.
    fn default() -> Self {
        Self {
            port: "/dev/ttyUSB0".to_string(),
            baud: 9600,
            parity: Parity::Odd,
            word_size: 7,
            read_timeout_ms: default_read_timeout_ms(),
        }
    }
}

/// Numeric arguments for the parameter-configuration stage of a datum
/// search, in controller units (steps and steps/s).
#[derive(Debug, Clone, Copy, Deserialize, Serialize)]
pub struct MotionParams {
    /// Acceleration ramp (`sa`).
    pub acceleration: u32,
    /// Deceleration ramp (`sd`).
    pub deceleration: u32,
    /// Slew velocity (`sv`).
    pub velocity: u32,
    /// Creep velocity for the final approach (`sc`).
    pub creep: u32,
}

impl Default for MotionParams {
    fn default() -> Self {
        Self {
            acceleration: 500,
            deceleration: 1000,
            velocity: 1200,
            creep: 300,
        }
    }
}

/// One configured axis of the positioning table.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AxisConfig {
    /// Axis digit as addressed on the wire (1..=9).
    pub id: u8,
    /// Operator-facing display name, also used as a telemetry tag.
    pub name: String,
}

/// Telemetry sink endpoint and credentials.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct TelemetryConfig {
    /// Base URL of the write endpoint (e.g. "https://influx.example:8086").
    pub url: String,
    /// Target database name.
    pub database: String,
    /// Basic-auth username.
    pub username: String,
    /// Basic-auth password.
    pub password: String,
    /// Verify the server certificate. Defaults to on; disabling is an
    /// explicit opt-out for self-signed lab deployments.
    #[serde(default = "default_verify_tls")]
    pub verify_tls: bool,
}

fn default_verify_tls() -> bool {
    true
}

/// Fully-resolved configuration handed to the core at startup.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct TableConfig {
    /// Serial link settings.
    pub link: SerialLinkConfig,
    /// Motion parameters for datum searches.
    #[serde(default)]
    pub motion: MotionParams,
    /// Configured axes; the key set of the axis state store.
    pub axes: Vec<AxisConfig>,
    /// Optional telemetry sink; absent means no position history is kept.
    #[serde(default)]
    pub telemetry: Option<TelemetryConfig>,
}

impl TableConfig {
    /// Load and validate a configuration from a TOML file.
    pub fn load(path: &Path) -> AppResult<Self> {
        let raw = config::Config::builder()
            .add_source(config::File::from(path))
            .build()?;
        let parsed: TableConfig = raw.try_deserialize()?;
        parsed.validate()?;
        Ok(parsed)
    }

    /// Semantic validation of values that parse but may be logically wrong.
    pub fn validate(&self) -> AppResult<()> {
        if !SUPPORTED_BAUD_RATES.contains(&self.link.baud) {
            return Err(TableError::Configuration(format!(
                "unsupported baud rate {} (supported: {:?})",
                self.link.baud, SUPPORTED_BAUD_RATES
            )));
        }
        if !matches!(self.link.word_size, 7 | 8) {
            return Err(TableError::Configuration(format!(
                "word size must be 7 or 8, got {}",
                self.link.word_size
            )));
        }
        if self.link.read_timeout_ms == 0 {
            return Err(TableError::Configuration(
                "read_timeout_ms must be non-zero".into(),
            ));
        }
        if self.axes.is_empty() {
            return Err(TableError::Configuration(
                "at least one axis must be configured".into(),
            ));
        }
        let mut seen = std::collections::BTreeSet::new();
        for axis in &self.axes {
            if !(1..=9).contains(&axis.id) {
                return Err(TableError::Configuration(format!(
                    "axis id {} outside 1..=9 (single wire digit)",
                    axis.id
                )));
            }
            if !seen.insert(axis.id) {
                return Err(TableError::Configuration(format!(
                    "duplicate axis id {}",
                    axis.id
                )));
            }
            if axis.name.is_empty() {
                return Err(TableError::Configuration(format!(
                    "axis {} has an empty name",
                    axis.id
                )));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const SAMPLE: &str = r#"
        [link]
        port = "/dev/ttyUSB0"
        baud = 9600
        parity = "odd"
        word_size = 7

        [[axes]]
        id = 1
        name = "table_x"

        [[axes]]
        id = 3
        name = "table_y"
    "#;

    fn parse(toml: &str) -> TableConfig {
        let raw = config::Config::builder()
            .add_source(config::File::from_str(toml, config::FileFormat::Toml))
            .build()
            .unwrap();
        raw.try_deserialize().unwrap()
    }

    #[test]
    fn test_sample_parses_and_validates() {
        let cfg = parse(SAMPLE);
        assert!(cfg.validate().is_ok());
        assert_eq!(cfg.link.read_timeout_ms, 500);
        assert_eq!(cfg.axes.len(), 2);
        assert!(cfg.telemetry.is_none());
        // Motion defaults applied when the table is absent.
        assert_eq!(cfg.motion.acceleration, 500);
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::with_suffix(".toml").unwrap();
        file.write_all(SAMPLE.as_bytes()).unwrap();
        let cfg = TableConfig::load(file.path()).unwrap();
        assert_eq!(cfg.link.port, "/dev/ttyUSB0");
    }

    #[test]
    fn test_unsupported_baud_rejected() {
        let mut cfg = parse(SAMPLE);
        cfg.link.baud = 9601;
        let err = cfg.validate().unwrap_err();
        assert!(matches!(err, TableError::Configuration(_)));
    }

    #[test]
    fn test_word_size_rejected() {
        let mut cfg = parse(SAMPLE);
        cfg.link.word_size = 6;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn test_duplicate_axis_rejected() {
        let mut cfg = parse(SAMPLE);
        cfg.axes.push(AxisConfig {
            id: 1,
            name: "dup".into(),
        });
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn test_empty_axis_table_rejected() {
        let mut cfg = parse(SAMPLE);
        cfg.axes.clear();
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn test_telemetry_defaults_verify_tls_on() {
        let toml = format!(
            "{SAMPLE}\n[telemetry]\nurl = \"https://influx:8086\"\ndatabase = \"table\"\nusername = \"w\"\npassword = \"p\"\n"
        );
        let cfg = parse(&toml);
        let telemetry = cfg.telemetry.unwrap();
        assert!(telemetry.verify_tls);
    }
}
