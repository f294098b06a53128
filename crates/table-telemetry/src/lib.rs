//! Best-effort position telemetry for the table control system.
//!
//! The sequencer emits a [`PositionEvent`] for every decoded axis position;
//! a forwarder task consumes the channel and performs the network call, so
//! sink latency and failures are fully decoupled from the motion-control
//! loop. A failed delivery is logged and dropped — by contract telemetry is
//! fire-and-forget and must never alter the outcome of a procedure.
//!
//! The concrete sink speaks the InfluxDB v1 line protocol:
//!
//! ```text
//! POST {url}/write?db={database}
//! position,axis=3,name=table_y value=-120i
//! ```
//!
//! with basic-auth credentials. Certificate verification is configurable
//! rather than disabled outright; self-signed lab deployments opt out via
//! `verify_tls = false`.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::mpsc;
use tracing::{debug, warn};

use table_core::{AppResult, PositionEvent, TableError, TelemetryConfig};

/// Destination for decoded axis positions.
///
/// Implementations must be cheap to call repeatedly and safe to fail:
/// callers treat every error as non-fatal.
#[async_trait]
pub trait TelemetrySink: Send + Sync {
    /// Deliver one position sample.
    ///
    /// # Errors
    ///
    /// [`TableError::Sink`] on network, auth or non-2xx failure.
    async fn report(&self, event: &PositionEvent) -> AppResult<()>;
}

/// InfluxDB v1 write-endpoint sink.
pub struct InfluxSink {
    client: reqwest::Client,
    write_url: String,
    username: String,
    password: String,
}

/// Sink-side request timeout. Kept well under the sequencer's per-procedure
/// budget so a slow remote endpoint cannot stall anything that accidentally
/// awaits a report inline.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(2);

impl InfluxSink {
    /// Build a sink from the resolved telemetry configuration.
    ///
    /// # Errors
    ///
    /// [`TableError::Sink`] if the HTTP client cannot be constructed.
    pub fn from_config(config: &TelemetryConfig) -> AppResult<Self> {
        let client = reqwest::Client::builder()
            .danger_accept_invalid_certs(!config.verify_tls)
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| TableError::Sink(e.to_string()))?;

        Ok(Self {
            client,
            write_url: format!(
                "{}/write?db={}",
                config.url.trim_end_matches('/'),
                config.database
            ),
            username: config.username.clone(),
            password: config.password.clone(),
        })
    }

    /// Render one event as an InfluxDB line-protocol record.
    fn line(event: &PositionEvent) -> String {
        format!(
            "position,axis={},name={} value={}i",
            event.axis,
            escape_tag(&event.name),
            event.position
        )
    }
}

/// Escape the characters the line protocol reserves in tag values.
fn escape_tag(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());
    for c in value.chars() {
        if matches!(c, ',' | '=' | ' ') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

#[async_trait]
impl TelemetrySink for InfluxSink {
    async fn report(&self, event: &PositionEvent) -> AppResult<()> {
        let response = self
            .client
            .post(&self.write_url)
            .basic_auth(&self.username, Some(&self.password))
            .body(Self::line(event))
            .send()
            .await
            .map_err(|e| TableError::Sink(e.to_string()))?;

        if !response.status().is_success() {
            return Err(TableError::Sink(format!(
                "write endpoint returned {}",
                response.status()
            )));
        }
        Ok(())
    }
}

/// Spawn the forwarder task: consume position events and deliver them to
/// `sink`, logging failures without ever propagating them.
///
/// The task ends when every sender is dropped; the returned handle is only
/// useful for shutdown sequencing.
pub fn spawn_forwarder(
    mut events: mpsc::Receiver<PositionEvent>,
    sink: Arc<dyn TelemetrySink>,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(event) = events.recv().await {
            if let Err(error) = sink.report(&event).await {
                warn!(axis = event.axis, %error, "telemetry delivery failed; dropping sample");
            }
        }
        debug!("telemetry channel closed; forwarder exiting");
    })
}
