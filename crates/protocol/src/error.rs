//! Protocol error types

use thiserror::Error;

/// Wire format and transport errors
#[derive(Debug, Error)]
pub enum ProtocolError {
    /// The transport rejected a write larger than its per-write capacity
    #[error("Transport overflow: {size} byte write exceeds capacity of {capacity}")]
    TransportOverflow { size: usize, capacity: usize },

    /// The transport is momentarily full and refused the write
    #[error("Transport back-pressure: {size} byte write refused")]
    Backpressure { size: usize },

    /// The receiving end of the transport is gone
    #[error("Transport closed")]
    TransportClosed,

    /// Chunk size must be at least one byte
    #[error("Invalid chunk size: {0}")]
    InvalidChunkSize(usize),

    /// A wire line could not be parsed into a record
    #[error("Malformed record: {0:?}")]
    MalformedRecord(String),

    /// A port label outside A-F
    #[error("Unknown port: {0:?}")]
    UnknownPort(String),

    /// I/O error from a byte-stream transport
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Type alias for protocol results
pub type Result<T> = std::result::Result<T, ProtocolError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_overflow_display() {
        let err = ProtocolError::TransportOverflow {
            size: 20,
            capacity: 19,
        };
        let msg = format!("{}", err);
        assert!(msg.contains("Transport overflow"));
        assert!(msg.contains("20"));
        assert!(msg.contains("19"));
    }

    #[test]
    fn test_malformed_record_display() {
        let err = ProtocolError::MalformedRecord("Port.A\tx".to_string());
        assert!(format!("{}", err).contains("Malformed record"));
    }
}
