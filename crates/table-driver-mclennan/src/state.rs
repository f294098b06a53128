//! Per-axis last-known state for the positioning table.
//!
//! The store is the single point of mutation for axis state: only the
//! sequencer's decode step writes, anything else (telemetry, UI, CLI) reads
//! snapshots. The key set is fixed at configuration time; axes are never
//! created or destroyed at runtime.

use std::collections::BTreeMap;
use std::time::Instant;

use parking_lot::RwLock;
use table_core::AxisConfig;

/// Last-known state of one axis.
#[derive(Debug, Clone)]
pub struct AxisState {
    /// Axis digit as addressed on the wire.
    pub axis: u8,
    /// Operator-facing display name.
    pub name: String,
    /// Last successfully decoded encoder position; `None` until the first
    /// decode succeeds. May be stale if later decodes failed.
    pub position: Option<i64>,
    /// When `position` was last written.
    pub updated_at: Option<Instant>,
}

/// Mapping axis id → [`AxisState`] with a fixed key set.
///
/// Updates are last-write-wins with no sequence check; the wire protocol
/// offers no correlation token, so ordering relies on the sequencer's
/// one-outstanding-command discipline.
pub struct AxisStateStore {
    inner: RwLock<BTreeMap<u8, AxisState>>,
}

impl AxisStateStore {
    /// Build the store from the configured axis table.
    pub fn new(axes: &[AxisConfig]) -> Self {
        let inner = axes
            .iter()
            .map(|a| {
                (
                    a.id,
                    AxisState {
                        axis: a.id,
                        name: a.name.clone(),
                        position: None,
                        updated_at: None,
                    },
                )
            })
            .collect();
        Self {
            inner: RwLock::new(inner),
        }
    }

    /// The configured axis ids, ascending.
    pub fn configured(&self) -> Vec<u8> {
        self.inner.read().keys().copied().collect()
    }

    /// Overwrite the position for `axis`.
    ///
    /// Returns `false` (and leaves everything untouched) if the axis is not
    /// in the configured set — a decode of echo garbage must not conjure up
    /// state for an axis that does not exist.
    pub fn update(&self, axis: u8, position: i64) -> bool {
        let mut guard = self.inner.write();
        match guard.get_mut(&axis) {
            Some(state) => {
                state.position = Some(position);
                state.updated_at = Some(Instant::now());
                true
            }
            None => {
                tracing::debug!(axis, position, "ignoring update for unconfigured axis");
                false
            }
        }
    }

    /// Current state of `axis`. Never fails for a configured axis.
    pub fn get(&self, axis: u8) -> Option<AxisState> {
        self.inner.read().get(&axis).cloned()
    }

    /// Snapshot of all axes, ascending by id.
    pub fn snapshot(&self) -> Vec<AxisState> {
        self.inner.read().values().cloned().collect()
    }
}
