//! Mclennan intelligent-stepper driver for the detector positioning table.
//!
//! This crate implements the serial command/response protocol driver:
//!
//! - [`protocol`]: command encoding and tolerant reply decoding.
//! - [`state`]: the per-axis last-known-position store.
//! - [`sequencer`]: the ordered multi-command procedures (parameter
//!   configuration, datum search, position polling, manual dispatch).
//!
//! # Usage
//!
//! ```rust,ignore
//! use table_core::{open_link, wrap_shared, Pacing, TableConfig};
//! use table_driver_mclennan::{AxisStateStore, TableDriver};
//!
//! let config = TableConfig::load(path)?;
//! let port = wrap_shared(Box::new(open_link(&config.link).await?));
//! let store = Arc::new(AxisStateStore::new(&config.axes));
//! let driver = TableDriver::new(port, store.clone(), config.motion, Pacing::from_link(&config.link));
//!
//! driver.datum_search(1).await?;
//! ```

pub mod protocol;
pub mod sequencer;
pub mod state;

pub use protocol::{decode_line, Command, ParsedResponse, DATUM_MODE_MASK};
pub use sequencer::TableDriver;
pub use state::{AxisState, AxisStateStore};
