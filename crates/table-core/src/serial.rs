//! Serial port abstractions for the table control system.
//!
//! The motion controller speaks a half-duplex, line-oriented ASCII protocol
//! over RS-232. This module provides:
//!
//! - [`SerialPortIO`] / [`DynSerial`] / [`SharedPort`]: type-erased async
//!   port handles, so drivers and tests share one code path
//!   (`tokio_serial::SerialStream` on hardware, `tokio::io::DuplexStream`
//!   under test).
//! - [`open_link`]: open and configure a port from a validated
//!   [`SerialLinkConfig`], off the async runtime via `spawn_blocking`.
//! - [`read_line_budgeted`]: a bounded line read that never silently drops
//!   partial input — a timeout hands back whatever accumulated, distinct
//!   from a terminated line, so callers can tell "no reply yet" from
//!   "garbled reply".

use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncRead, AsyncReadExt, AsyncWrite, BufReader};
use tokio::sync::Mutex;
use tokio::time::{timeout, Instant};

use crate::config::{Parity, SerialLinkConfig};
use crate::error::{AppResult, TableError};

/// Trait alias for async serial port I/O.
///
/// Any `AsyncRead + AsyncWrite + Unpin + Send` type qualifies, including
/// `tokio_serial::SerialStream` (hardware) and `tokio::io::DuplexStream`
/// (testing).
pub trait SerialPortIO: AsyncRead + AsyncWrite + Unpin + Send {}

impl<T: AsyncRead + AsyncWrite + Unpin + Send> SerialPortIO for T {}

/// Type-erased boxed serial port.
pub type DynSerial = Box<dyn SerialPortIO>;

/// Thread-safe shared serial port with buffered reading.
///
/// The `BufReader` wrapper enables line-by-line reads for the controller's
/// CR/LF-delimited replies; the `Mutex` enforces the one-outstanding-command
/// discipline the half-duplex link requires.
pub type SharedPort = Arc<Mutex<BufReader<DynSerial>>>;

/// Create a [`SharedPort`] from a type-erased serial port.
pub fn wrap_shared(port: DynSerial) -> SharedPort {
    Arc::new(Mutex::new(BufReader::new(port)))
}

/// Result of one budgeted line read.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LineRead {
    /// A terminator-delimited reply line, terminator included.
    Line(String),
    /// Whatever bytes accumulated before the budget expired (possibly
    /// empty). The device has not completed a reply.
    Partial(String),
}

/// Open the serial link described by `config`.
///
/// Port opening and negotiation happen on a blocking thread so the async
/// runtime is not stalled. Stop bits are fixed at one and flow control off,
/// matching the controller.
///
/// # Errors
///
/// Returns [`TableError::Connect`] if the device path cannot be opened or
/// the settings cannot be negotiated.
pub async fn open_link(config: &SerialLinkConfig) -> AppResult<tokio_serial::SerialStream> {
    use tokio_serial::SerialPortBuilderExt;

    let data_bits = match config.word_size {
        7 => tokio_serial::DataBits::Seven,
        _ => tokio_serial::DataBits::Eight,
    };
    let parity = match config.parity {
        Parity::Even => tokio_serial::Parity::Even,
        Parity::Odd => tokio_serial::Parity::Odd,
        Parity::None => tokio_serial::Parity::None,
    };

    let port = config.port.clone();
    let builder = tokio_serial::new(&config.port, config.baud)
        .data_bits(data_bits)
        .parity(parity)
        .stop_bits(tokio_serial::StopBits::One)
        .flow_control(tokio_serial::FlowControl::None);

    tokio::task::spawn_blocking(move || builder.open_native_async())
        .await
        .map_err(|e| TableError::Connect {
            port: port.clone(),
            message: format!("spawn_blocking failed: {e}"),
        })?
        .map_err(|e| TableError::Connect {
            port,
            message: e.to_string(),
        })
}

/// Read one reply line within `budget`.
///
/// Scans for the `\n` terminator, accumulating bytes as they arrive. When
/// the budget expires the accumulated partial buffer is returned as
/// [`LineRead::Partial`] rather than discarded.
///
/// # Errors
///
/// [`TableError::Io`] on a broken link, [`TableError::UnexpectedEof`] if the
/// device disconnects mid-read. Both are fatal to the in-flight procedure.
pub async fn read_line_budgeted<R: AsyncBufRead + Unpin>(
    reader: &mut R,
    budget: Duration,
) -> AppResult<LineRead> {
    let deadline = Instant::now() + budget;
    let mut acc: Vec<u8> = Vec::new();

    loop {
        let remaining = deadline.saturating_duration_since(Instant::now());
        if remaining.is_zero() {
            return Ok(LineRead::Partial(lossy(acc)));
        }

        let chunk = match timeout(remaining, reader.fill_buf()).await {
            Err(_elapsed) => return Ok(LineRead::Partial(lossy(acc))),
            Ok(result) => result?,
        };

        if chunk.is_empty() {
            // EOF: device went away. Partial data is reported in the error
            // path by the caller's trace of what it last saw.
            return Err(TableError::UnexpectedEof);
        }

        if let Some(pos) = chunk.iter().position(|&b| b == b'\n') {
            acc.extend_from_slice(&chunk[..=pos]);
            reader.consume(pos + 1);
            return Ok(LineRead::Line(lossy(acc)));
        }

        let len = chunk.len();
        acc.extend_from_slice(chunk);
        reader.consume(len);
    }
}

/// Drain stale data from the port before starting a procedure.
///
/// Reads and discards whatever arrives within `window`. Clears replies left
/// over from an interrupted exchange so the next decode does not pair a
/// fresh command with an old answer. The whole drain is bounded by `window`:
/// a device (or bus neighbor) that chatters continuously cannot hold the
/// sequencer here past the deadline.
pub async fn drain_stale<R: AsyncRead + Unpin>(reader: &mut R, window: Duration) -> usize {
    let deadline = Instant::now() + window;
    let mut discarded = 0usize;
    let mut buf = [0u8; 256];

    loop {
        let remaining = deadline.saturating_duration_since(Instant::now());
        if remaining.is_zero() {
            break;
        }
        match timeout(remaining, reader.read(&mut buf)).await {
            Ok(Ok(0)) | Err(_) => break,
            Ok(Ok(n)) => discarded += n,
            Ok(Err(_)) => break,
        }
    }

    if discarded > 0 {
        tracing::debug!(discarded, "discarded stale serial data");
    }
    discarded
}

fn lossy(bytes: Vec<u8>) -> String {
    String::from_utf8_lossy(&bytes).into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::AsyncWriteExt;

    #[tokio::test]
    async fn test_terminated_line_is_returned_whole() {
        let (mut host, device) = tokio::io::duplex(64);
        let mut reader = BufReader::new(device);

        host.write_all(b"3oa\r03:-120\r\n").await.unwrap();

        let read = read_line_budgeted(&mut reader, Duration::from_millis(200))
            .await
            .unwrap();
        assert_eq!(read, LineRead::Line("3oa\r03:-120\r\n".to_string()));
    }

    #[tokio::test]
    async fn test_timeout_returns_partial_buffer() {
        let (mut host, device) = tokio::io::duplex(64);
        let mut reader = BufReader::new(device);

        // No terminator: the budget expires with bytes in hand.
        host.write_all(b"03:-1").await.unwrap();

        let read = read_line_budgeted(&mut reader, Duration::from_millis(50))
            .await
            .unwrap();
        assert_eq!(read, LineRead::Partial("03:-1".to_string()));
    }

    #[tokio::test]
    async fn test_timeout_with_no_data_is_empty_partial() {
        let (_host, device) = tokio::io::duplex(64);
        let mut reader = BufReader::new(device);

        let read = read_line_budgeted(&mut reader, Duration::from_millis(20))
            .await
            .unwrap();
        assert_eq!(read, LineRead::Partial(String::new()));
    }

    #[tokio::test]
    async fn test_eof_is_fatal() {
        let (host, device) = tokio::io::duplex(64);
        let mut reader = BufReader::new(device);
        drop(host);

        let err = read_line_budgeted(&mut reader, Duration::from_millis(50))
            .await
            .unwrap_err();
        assert!(matches!(err, TableError::UnexpectedEof));
    }

    #[tokio::test]
    async fn test_line_split_across_chunks() {
        let (mut host, device) = tokio::io::duplex(8);
        let mut reader = BufReader::new(device);

        let writer = tokio::spawn(async move {
            host.write_all(b"1oa\r01:").await.unwrap();
            tokio::time::sleep(Duration::from_millis(10)).await;
            host.write_all(b"42\r\n").await.unwrap();
            host
        });

        let read = read_line_budgeted(&mut reader, Duration::from_millis(500))
            .await
            .unwrap();
        assert_eq!(read, LineRead::Line("1oa\r01:42\r\n".to_string()));
        writer.await.unwrap();
    }

    #[tokio::test]
    async fn test_drain_discards_stale_bytes() {
        let (mut host, device) = tokio::io::duplex(64);
        let mut reader = BufReader::new(device);

        host.write_all(b"old noise\r\n").await.unwrap();
        let discarded = drain_stale(&mut reader, Duration::from_millis(20)).await;
        assert_eq!(discarded, 11);

        // Subsequent reads see only fresh data.
        host.write_all(b"2oa\r02:7\r\n").await.unwrap();
        let read = read_line_budgeted(&mut reader, Duration::from_millis(200))
            .await
            .unwrap();
        assert_eq!(read, LineRead::Line("2oa\r02:7\r\n".to_string()));
    }

    #[tokio::test]
    async fn test_drain_bounded_against_chattering_device() {
        let (mut host, device) = tokio::io::duplex(64);
        let mut reader = BufReader::new(device);

        // A neighbor emitting bytes faster than any idle gap: the drain
        // must still return once its window elapses.
        let chatter = tokio::spawn(async move {
            for _ in 0..60 {
                if host.write_all(b"x").await.is_err() {
                    break;
                }
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        });

        let discarded = timeout(
            Duration::from_millis(800),
            drain_stale(&mut reader, Duration::from_millis(100)),
        )
        .await
        .unwrap();
        assert!(discarded >= 1);
        chatter.abort();
    }
}
