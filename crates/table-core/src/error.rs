//! Error types for the table control system.
//!
//! `TableError` consolidates every failure the control path can see, using
//! the `thiserror` crate for consistent messages. The propagation policy is
//! deliberately asymmetric:
//!
//! - **Link-level failures** (`Connect`, `Io`, `UnexpectedEof`) are fatal to
//!   the in-flight procedure and ascend past the sequencer. The link must be
//!   reopened before anything else is attempted.
//! - **Per-exchange failures** (`Timeout`, and replies that fail to decode —
//!   which are *not* errors at all, see `protocol::decode_line`) are
//!   recovered locally: the step is logged and the sequencer proceeds with
//!   stale axis state retained.
//! - **Telemetry failures** (`Sink`) never reach the motion-control path;
//!   the forwarder task logs and drops them.

use thiserror::Error;

/// Convenience alias for results using the shared error type.
pub type AppResult<T> = std::result::Result<T, TableError>;

/// Primary error type for the table control system.
#[derive(Error, Debug)]
pub enum TableError {
    /// Serial link could not be opened or negotiated.
    ///
    /// Fatal to any pending operation; surfaced immediately at connect time.
    #[error("Failed to open serial link '{port}': {message}")]
    Connect {
        /// Port path that was requested (e.g. "/dev/ttyUSB0").
        port: String,
        /// Underlying failure reported by the serial layer.
        message: String,
    },

    /// Serial I/O failed mid-sequence (broken pipe, device unplugged).
    ///
    /// Aborts the current procedure and surfaces to the caller; the link
    /// must be explicitly reopened.
    #[error("Serial I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Serial port reached end-of-file unexpectedly.
    ///
    /// The device disconnected or powered off mid-communication. Treated
    /// like `Io`: fatal to the in-flight procedure.
    #[error("Unexpected EOF from serial port")]
    UnexpectedEof,

    /// No terminated reply arrived within the read budget.
    ///
    /// Recovered locally by the sequencer: logged, stale state retained,
    /// next step proceeds.
    #[error("No terminated reply within {budget_ms} ms")]
    Timeout {
        /// Read budget that elapsed, in milliseconds.
        budget_ms: u64,
    },

    /// Configuration file parsing failed.
    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    /// Configuration parsed correctly but failed semantic validation
    /// (unsupported baud rate, word size outside 7/8, duplicate axis ids).
    #[error("Configuration validation error: {0}")]
    Configuration(String),

    /// Telemetry delivery failed (network or non-2xx response).
    ///
    /// Best-effort by contract: never propagated to the control path.
    #[error("Telemetry sink error: {0}")]
    Sink(String),
}

impl TableError {
    /// Whether this error must abort the whole in-progress procedure.
    ///
    /// Everything else is absorbed by the sequencer as "no update this
    /// cycle".
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            TableError::Connect { .. } | TableError::Io(_) | TableError::UnexpectedEof
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = TableError::Connect {
            port: "/dev/ttyUSB0".into(),
            message: "permission denied".into(),
        };
        assert_eq!(
            err.to_string(),
            "Failed to open serial link '/dev/ttyUSB0': permission denied"
        );
    }

    #[test]
    fn test_fatal_classification() {
        assert!(TableError::UnexpectedEof.is_fatal());
        assert!(TableError::Io(std::io::Error::other("broken pipe")).is_fatal());
        assert!(!TableError::Timeout { budget_ms: 500 }.is_fatal());
        assert!(!TableError::Sink("503".into()).is_fatal());
    }
}
