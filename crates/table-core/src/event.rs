//! Position events flowing from the control loop to the telemetry sink.

/// One successfully decoded axis position, ready for telemetry delivery.
///
/// Emitted by the sequencer after the axis state store accepts an update;
/// consumed by the telemetry forwarder task. Carrying the display name here
/// keeps the sink free of any axis-table lookup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PositionEvent {
    /// Axis digit as addressed on the wire.
    pub axis: u8,
    /// Encoder position in controller steps.
    pub position: i64,
    /// Operator-facing axis name, used as a telemetry tag.
    pub name: String,
}
