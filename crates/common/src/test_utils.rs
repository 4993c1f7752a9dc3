//! Test utilities for hub telemetry
//!
//! Provides in-memory transports, record fixtures and helper functions for
//! testing across crates.
//!
//! # Example
//!
//! ```
//! use common::test_utils::{RecordingTransport, data_record};
//! use protocol::{CompositeMessage, FrameWriter, Port};
//!
//! let motor = data_record(Port::A, 48, &[("a", "450°"), ("r", "1R"), ("ra", "90°")]);
//! let message: CompositeMessage = [motor].into_iter().collect();
//! let mut transport = RecordingTransport::new(19);
//! FrameWriter::default().send(&message, &mut transport);
//! assert_eq!(transport.bytes(), message.to_bytes().to_vec());
//! ```

use protocol::{Field, Port, ProtocolError, Record, Transport, TypeId};
use std::future::Future;
use std::time::Duration;

/// Default test timeout (5 seconds)
pub const DEFAULT_TEST_TIMEOUT: Duration = Duration::from_secs(5);

/// Transport that keeps every accepted chunk in order
#[derive(Debug, Default)]
pub struct RecordingTransport {
    capacity: usize,
    chunks: Vec<Vec<u8>>,
}

impl RecordingTransport {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            chunks: Vec::new(),
        }
    }

    /// Chunks in write order
    pub fn chunks(&self) -> &[Vec<u8>] {
        &self.chunks
    }

    /// Concatenation of every accepted chunk
    pub fn bytes(&self) -> Vec<u8> {
        self.chunks.concat()
    }

    /// Accepted bytes as text, one entry per `\r\n`-terminated line
    pub fn lines(&self) -> Vec<String> {
        String::from_utf8_lossy(&self.bytes())
            .split_terminator("\r\n")
            .map(str::to_string)
            .collect()
    }

    pub fn clear(&mut self) {
        self.chunks.clear();
    }
}

impl Transport for RecordingTransport {
    fn capacity(&self) -> usize {
        self.capacity
    }

    fn write(&mut self, chunk: &[u8]) -> protocol::Result<()> {
        if chunk.len() > self.capacity {
            return Err(ProtocolError::TransportOverflow {
                size: chunk.len(),
                capacity: self.capacity,
            });
        }
        self.chunks.push(chunk.to_vec());
        Ok(())
    }
}

/// Transport that refuses selected writes (1-based write numbers)
#[derive(Debug)]
pub struct RejectingTransport {
    inner: RecordingTransport,
    reject: Vec<usize>,
    attempts: usize,
}

impl RejectingTransport {
    pub fn new(capacity: usize, reject: impl IntoIterator<Item = usize>) -> Self {
        Self {
            inner: RecordingTransport::new(capacity),
            reject: reject.into_iter().collect(),
            attempts: 0,
        }
    }

    /// Write attempts seen so far, accepted or not
    pub fn attempts(&self) -> usize {
        self.attempts
    }

    /// The chunks that made it through
    pub fn accepted(&self) -> &RecordingTransport {
        &self.inner
    }
}

impl Transport for RejectingTransport {
    fn capacity(&self) -> usize {
        self.inner.capacity()
    }

    fn write(&mut self, chunk: &[u8]) -> protocol::Result<()> {
        self.attempts += 1;
        if self.reject.contains(&self.attempts) {
            return Err(ProtocolError::Backpressure { size: chunk.len() });
        }
        self.inner.write(chunk)
    }
}

/// Data record with arbitrary fields
pub fn data_record(port: Port, type_id: TypeId, fields: &[(&str, &str)]) -> Record {
    Record::Data {
        port,
        type_id,
        fields: fields.iter().map(|(k, v)| Field::new(*k, *v)).collect(),
    }
}

/// Battery record for a given voltage, status 0
pub fn battery_record(pct: i64, millivolts: u32) -> Record {
    Record::Battery {
        fields: vec![
            Field::new("pct", format!("{}%", pct)),
            Field::new("v", format!("{}mV", millivolts)),
            Field::new("s", "0"),
        ],
    }
}

/// Timeout wrapper for async tests
///
/// Wraps an async operation with a timeout to prevent tests from hanging.
///
/// # Example
/// ```ignore
/// use common::test_utils::{with_timeout, DEFAULT_TEST_TIMEOUT};
///
/// #[tokio::test]
/// async fn test_with_timeout() {
///     let result = with_timeout(DEFAULT_TEST_TIMEOUT, async { 42 }).await.unwrap();
///     assert_eq!(result, 42);
/// }
/// ```
pub async fn with_timeout<T, F>(duration: Duration, future: F) -> Result<T, TimeoutError>
where
    F: Future<Output = T>,
{
    tokio::time::timeout(duration, future)
        .await
        .map_err(|_| TimeoutError { duration })
}

/// Error returned when a test times out
#[derive(Debug)]
pub struct TimeoutError {
    /// The timeout duration that was exceeded
    pub duration: Duration,
}

impl std::fmt::Display for TimeoutError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Test timed out after {:?}", self.duration)
    }
}

impl std::error::Error for TimeoutError {}
