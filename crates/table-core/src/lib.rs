//! Core types and utilities for the detector table control system.
//!
//! This crate provides the foundation shared by the driver and telemetry
//! crates:
//!
//! - [`error`]: the `TableError` taxonomy (connect / I/O / timeout /
//!   configuration / sink) with the propagation policy the sequencer relies
//!   on: only link-level failures are fatal, everything else recovers locally.
//! - [`serial`]: type-erased async serial port abstractions, link opening
//!   from a validated configuration, and budgeted line reads that hand back
//!   partial buffers instead of silently dropping them.
//! - [`config`]: serde/`config`-crate configuration types for the serial
//!   link, motion parameters, the axis table and the telemetry sink.
//! - [`pacing`]: the injectable settle-delay / read-budget policy so tests
//!   run with zero real-world delay.
//! - [`event`]: the `(axis, position)` event passed from the control loop to
//!   the telemetry forwarder.

pub mod config;
pub mod error;
pub mod event;
pub mod pacing;
pub mod serial;

pub use config::{AxisConfig, MotionParams, Parity, SerialLinkConfig, TableConfig, TelemetryConfig};
pub use error::{AppResult, TableError};
pub use event::PositionEvent;
pub use pacing::Pacing;
pub use serial::{
    drain_stale, open_link, read_line_budgeted, wrap_shared, DynSerial, LineRead, SharedPort,
};
