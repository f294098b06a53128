//! Ordered multi-command procedures against the motion controller.
//!
//! The link is half-duplex in practice: the device will not usefully
//! interleave replies, so exactly one command is outstanding at a time and
//! the port lock is held across each write/read pair. Every step follows
//! the same shape:
//!
//! encode → write → settle → bounded read → attempt decode → store update
//! and telemetry event on success → settle again before the next step.
//!
//! Failure semantics: a read timeout or an undecodable reply is logged and
//! the sequencer proceeds to the next step — the device may simply have
//! produced noise for one exchange, and stale-but-valid state is preferred
//! over corrupt state. There is no resend of the same command. Only
//! link-level I/O failures abort the whole procedure.
//!
//! All suspension points are cancel-safe awaits, so callers can bound a
//! stuck procedure with `tokio::time::timeout` without leaving the port in
//! a locked state.

use std::sync::Arc;

use tokio::io::AsyncWriteExt;
use tokio::sync::mpsc;
use tokio::time::sleep;
use tracing::{debug, instrument, warn};

use table_core::{
    drain_stale, read_line_budgeted, AppResult, LineRead, MotionParams, Pacing, PositionEvent,
    SharedPort, TableError,
};

use crate::protocol::{decode_line, Command, ParsedResponse};
use crate::state::AxisStateStore;

/// The command sequencer: one driver instance per serial link.
pub struct TableDriver {
    /// Serial port; the mutex enforces one outstanding command.
    port: SharedPort,
    /// Per-axis last-known state. Written only by [`TableDriver::step`].
    store: Arc<AxisStateStore>,
    /// Arguments for the parameter-configuration stage.
    motion: MotionParams,
    /// Settle-delay / read-budget policy.
    pacing: Pacing,
    /// Outbound telemetry events; delivery is fire-and-forget.
    events: Option<mpsc::Sender<PositionEvent>>,
}

impl TableDriver {
    /// Create a driver over an open port.
    pub fn new(
        port: SharedPort,
        store: Arc<AxisStateStore>,
        motion: MotionParams,
        pacing: Pacing,
    ) -> Self {
        Self {
            port,
            store,
            motion,
            pacing,
            events: None,
        }
    }

    /// Attach a telemetry event channel. Events are dropped, not awaited,
    /// when the channel is full or closed.
    pub fn with_events(mut self, events: mpsc::Sender<PositionEvent>) -> Self {
        self.events = Some(events);
        self
    }

    /// The axis state store this driver writes to.
    pub fn store(&self) -> &Arc<AxisStateStore> {
        &self.store
    }

    /// Send the parameter-configuration stage for `axis`: acceleration,
    /// deceleration, velocity, creep and datum mode, in that fixed order.
    #[instrument(skip(self), err)]
    pub async fn configure(&self, axis: u8) -> AppResult<()> {
        let m = self.motion;
        for cmd in [
            Command::SetAcceleration(m.acceleration),
            Command::SetDeceleration(m.deceleration),
            Command::SetVelocity(m.velocity),
            Command::SetCreep(m.creep),
            Command::SetDatumMode,
        ] {
            self.step(axis, &cmd).await?;
        }
        Ok(())
    }

    /// Run a full datum search on `axis`:
    /// configure → home-to-datum → position poll → current-operation query
    /// → final position poll.
    #[instrument(skip(self), err)]
    pub async fn datum_search(&self, axis: u8) -> AppResult<()> {
        {
            let mut guard = self.port.lock().await;
            drain_stale(&mut *guard, self.pacing.settle).await;
        }

        self.configure(axis).await?;
        self.step(axis, &Command::HomeToDatum).await?;
        self.step(axis, &Command::QueryPosition).await?;
        self.step(axis, &Command::CurrentOperation).await?;
        self.step(axis, &Command::QueryPosition).await?;
        Ok(())
    }

    /// Query the encoder position of every configured axis, independently.
    ///
    /// A timeout or garbled reply on one axis never blocks polling of the
    /// others; only a broken link aborts.
    #[instrument(skip(self), err)]
    pub async fn poll_positions(&self) -> AppResult<()> {
        for axis in self.store.configured() {
            self.step(axis, &Command::QueryPosition).await?;
        }
        Ok(())
    }

    /// Dispatch an operator-entered raw command.
    ///
    /// The string is sent as-is plus the CR terminator (an empty string is
    /// still framed). On a successful decode the reply is returned and a
    /// full position poll of all configured axes follows, mirroring the
    /// device's habit of reporting status that is stale until re-queried.
    #[instrument(skip(self, raw), fields(raw = %raw), err)]
    pub async fn manual(&self, axis: u8, raw: &str) -> AppResult<Option<ParsedResponse>> {
        let response = self.step(axis, &Command::Raw(raw.to_string())).await?;
        if response.is_some() {
            self.poll_positions().await?;
        }
        Ok(response)
    }

    /// One send/receive exchange.
    ///
    /// Returns the decoded reply, or `None` when the device timed out or
    /// produced an undecodable line — both recovered locally. Only I/O
    /// failures propagate.
    async fn step(&self, axis: u8, cmd: &Command) -> AppResult<Option<ParsedResponse>> {
        let frame = cmd.encode(axis);

        let mut guard = self.port.lock().await;
        let writer = guard.get_mut();
        writer.write_all(frame.as_bytes()).await?;
        writer.flush().await?;

        // Device turnaround allowance before the reply is attempted.
        sleep(self.pacing.settle).await;

        let outcome = match read_line_budgeted(&mut *guard, self.pacing.read_budget).await? {
            LineRead::Line(line) => match decode_line(&line) {
                Some(response) => {
                    debug!(
                        cmd = cmd.label(),
                        axis,
                        payload = %response.payload,
                        "decoded reply"
                    );
                    if let (Some(reply_axis), Some(position)) = (response.axis, response.position) {
                        self.record(reply_axis, position);
                    }
                    Some(response)
                }
                None => {
                    debug!(
                        cmd = cmd.label(),
                        axis,
                        line = %line.trim_end(),
                        "reply did not match expected shape; state retained"
                    );
                    None
                }
            },
            LineRead::Partial(partial) => {
                let timeout = TableError::Timeout {
                    budget_ms: u64::try_from(self.pacing.read_budget.as_millis())
                        .unwrap_or(u64::MAX),
                };
                warn!(
                    cmd = cmd.label(),
                    axis,
                    partial_len = partial.len(),
                    error = %timeout,
                    "no terminated reply within budget; moving on"
                );
                None
            }
        };

        // Second settle before the next transition.
        sleep(self.pacing.settle).await;
        Ok(outcome)
    }

    /// Record a decoded position and emit the telemetry event.
    ///
    /// The store enforces that only configured axes are written; telemetry
    /// delivery is best-effort and never blocks the control path.
    fn record(&self, axis: u8, position: i64) {
        if !self.store.update(axis, position) {
            return;
        }
        if let Some(events) = &self.events {
            let name = self
                .store
                .get(axis)
                .map(|s| s.name)
                .unwrap_or_default();
            if events
                .try_send(PositionEvent {
                    axis,
                    position,
                    name,
                })
                .is_err()
            {
                debug!(axis, "telemetry channel full or closed; dropping event");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::AxisStateStore;
    use table_core::{wrap_shared, AxisConfig};
    use tokio::io::AsyncReadExt;

    fn test_driver(device: tokio::io::DuplexStream) -> TableDriver {
        let port = wrap_shared(Box::new(device));
        let store = Arc::new(AxisStateStore::new(&[AxisConfig {
            id: 2,
            name: "table_x".into(),
        }]));
        TableDriver::new(port, store, MotionParams::default(), Pacing::instant())
    }

    #[tokio::test]
    async fn test_step_writes_wire_frame() {
        let (mut host, device) = tokio::io::duplex(64);
        let driver = test_driver(device);

        let echo = tokio::spawn(async move {
            let mut buf = vec![0u8; 64];
            let n = host.read(&mut buf).await.unwrap();
            let sent = String::from_utf8_lossy(&buf[..n]).into_owned();
            host.write_all(b"2sa500\r02:\r\n").await.unwrap();
            (host, sent)
        });

        let response = driver
            .step(2, &Command::SetAcceleration(500))
            .await
            .unwrap();
        let (_host, sent) = echo.await.unwrap();

        assert_eq!(sent, "2sa500\r");
        // Empty value field: attributable but positionless.
        assert_eq!(response.unwrap().position, None);
        assert_eq!(driver.store().get(2).unwrap().position, None);
    }

    #[tokio::test]
    async fn test_step_updates_state_on_position_reply() {
        let (mut host, device) = tokio::io::duplex(64);
        let driver = test_driver(device);

        let echo = tokio::spawn(async move {
            let mut buf = vec![0u8; 64];
            let _ = host.read(&mut buf).await.unwrap();
            host.write_all(b"2oa\r02:-45\r\n").await.unwrap();
            host
        });

        driver.step(2, &Command::QueryPosition).await.unwrap();
        let _host = echo.await.unwrap();

        assert_eq!(driver.store().get(2).unwrap().position, Some(-45));
    }

    #[tokio::test]
    async fn test_silent_device_times_out_without_aborting() {
        let (mut host, device) = tokio::io::duplex(64);
        let driver = test_driver(device);

        // Accept the frame but never reply; the read budget expires.
        let sink = tokio::spawn(async move {
            let mut buf = vec![0u8; 64];
            let _ = host.read(&mut buf).await.unwrap();
            host
        });

        let response = driver.step(2, &Command::QueryPosition).await.unwrap();
        assert!(response.is_none());
        assert_eq!(driver.store().get(2).unwrap().position, None);
        let _host = sink.await.unwrap();
    }

    #[tokio::test]
    async fn test_broken_link_is_fatal() {
        let (host, device) = tokio::io::duplex(64);
        let driver = test_driver(device);
        drop(host);

        let err = driver
            .step(2, &Command::QueryPosition)
            .await
            .unwrap_err();
        assert!(err.is_fatal());
    }
}
