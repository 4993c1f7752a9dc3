//! Composite messages and chunked transmission
//!
//! Every tick produces one [`CompositeMessage`]. The [`FrameWriter`] turns it
//! into bytes and pushes them through a [`Transport`] that only accepts small
//! fixed-size writes.
//!
//! # Frame Format
//!
//! ```text
//! <record>\r\n<record>\r\n ... <record>\r\n
//! ```
//!
//! The frame is split into `chunk_size` byte slices (19 in the reference
//! transport), written in order. Chunk boundaries carry no meaning: a chunk
//! may end mid-record or between `\r` and `\n`. An empty message produces no
//! writes at all.

use crate::error::{ProtocolError, Result};
use crate::record::Record;
use bytes::{Bytes, BytesMut};
use std::io::Write;

/// Terminator appended after every record
pub const RECORD_TERMINATOR: &[u8] = b"\r\n";

/// Per-write capacity of the reference transport
pub const DEFAULT_CHUNK_SIZE: usize = 19;

/// All records produced in one tick, in scheduler order
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CompositeMessage {
    records: Vec<Record>,
}

impl CompositeMessage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, record: Record) {
        self.records.push(record);
    }

    pub fn extend(&mut self, records: impl IntoIterator<Item = Record>) {
        self.records.extend(records);
    }

    pub fn records(&self) -> &[Record] {
        &self.records
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Serialize to the wire frame (each record followed by `\r\n`)
    pub fn to_bytes(&self) -> Bytes {
        let mut buf = BytesMut::new();
        for record in &self.records {
            buf.extend_from_slice(record.to_string().as_bytes());
            buf.extend_from_slice(RECORD_TERMINATOR);
        }
        buf.freeze()
    }
}

impl FromIterator<Record> for CompositeMessage {
    fn from_iter<I: IntoIterator<Item = Record>>(iter: I) -> Self {
        Self {
            records: iter.into_iter().collect(),
        }
    }
}

/// Output channel accepting writes of bounded size
///
/// The transport neither buffers nor reassembles; each successful `write`
/// is one unit on the link.
pub trait Transport {
    /// Largest single write the transport accepts
    fn capacity(&self) -> usize;

    /// Write one chunk
    ///
    /// Must reject chunks larger than [`capacity`](Transport::capacity) with
    /// [`ProtocolError::TransportOverflow`].
    fn write(&mut self, chunk: &[u8]) -> Result<()>;
}

impl<T: Transport + ?Sized> Transport for Box<T> {
    fn capacity(&self) -> usize {
        (**self).capacity()
    }

    fn write(&mut self, chunk: &[u8]) -> Result<()> {
        (**self).write(chunk)
    }
}

/// Transport over any byte stream, e.g. stdout or a serial port
pub struct IoTransport<W: Write> {
    inner: W,
    capacity: usize,
}

impl<W: Write> IoTransport<W> {
    pub fn new(inner: W, capacity: usize) -> Self {
        Self { inner, capacity }
    }

    pub fn into_inner(self) -> W {
        self.inner
    }
}

impl<W: Write> Transport for IoTransport<W> {
    fn capacity(&self) -> usize {
        self.capacity
    }

    fn write(&mut self, chunk: &[u8]) -> Result<()> {
        if chunk.len() > self.capacity {
            return Err(ProtocolError::TransportOverflow {
                size: chunk.len(),
                capacity: self.capacity,
            });
        }
        self.inner.write_all(chunk)?;
        self.inner.flush()?;
        Ok(())
    }
}

/// Outcome of sending one frame
#[derive(Debug, Default)]
pub struct SendReport {
    /// Frame length before chunking
    pub frame_len: usize,
    /// Chunks accepted by the transport
    pub chunks_written: usize,
    /// Chunks rejected and dropped
    pub chunks_dropped: usize,
    /// Bytes lost with the dropped chunks
    pub bytes_dropped: usize,
    /// Last rejection, if any
    pub last_error: Option<ProtocolError>,
}

impl SendReport {
    pub fn is_complete(&self) -> bool {
        self.chunks_dropped == 0
    }
}

/// Serializes composite messages and writes them in fixed-size chunks
#[derive(Debug, Clone, Copy)]
pub struct FrameWriter {
    chunk_size: usize,
}

impl FrameWriter {
    /// Create a writer for the given per-write capacity
    pub fn new(chunk_size: usize) -> Result<Self> {
        if chunk_size == 0 {
            return Err(ProtocolError::InvalidChunkSize(chunk_size));
        }
        Ok(Self { chunk_size })
    }

    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    /// Split a frame into transport-sized slices without copying
    pub fn chunks(&self, frame: &Bytes) -> Vec<Bytes> {
        (0..frame.len())
            .step_by(self.chunk_size)
            .map(|start| frame.slice(start..(start + self.chunk_size).min(frame.len())))
            .collect()
    }

    /// Serialize and transmit one tick's message
    pub fn send<T: Transport + ?Sized>(
        &self,
        message: &CompositeMessage,
        transport: &mut T,
    ) -> SendReport {
        self.send_frame(&message.to_bytes(), transport)
    }

    /// Transmit an already serialized frame
    ///
    /// A rejected write drops that chunk only; the remaining chunks are
    /// still written. Nothing is retried or queued for the next tick.
    pub fn send_frame<T: Transport + ?Sized>(&self, frame: &Bytes, transport: &mut T) -> SendReport {
        let mut report = SendReport {
            frame_len: frame.len(),
            ..SendReport::default()
        };

        for chunk in self.chunks(frame) {
            match transport.write(&chunk) {
                Ok(()) => report.chunks_written += 1,
                Err(e) => {
                    report.chunks_dropped += 1;
                    report.bytes_dropped += chunk.len();
                    report.last_error = Some(e);
                }
            }
        }

        report
    }
}

impl Default for FrameWriter {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Port;

    struct VecTransport {
        writes: Vec<Vec<u8>>,
        capacity: usize,
    }

    impl Transport for VecTransport {
        fn capacity(&self) -> usize {
            self.capacity
        }

        fn write(&mut self, chunk: &[u8]) -> Result<()> {
            if chunk.len() > self.capacity {
                return Err(ProtocolError::TransportOverflow {
                    size: chunk.len(),
                    capacity: self.capacity,
                });
            }
            self.writes.push(chunk.to_vec());
            Ok(())
        }
    }

    #[test]
    fn test_message_bytes() {
        let message: CompositeMessage = [
            Record::PortEmpty { port: Port::A },
            Record::PortEmpty { port: Port::B },
        ]
        .into_iter()
        .collect();

        assert_eq!(&message.to_bytes()[..], b"Port.A\t--\r\nPort.B\t--\r\n");
    }

    #[test]
    fn test_empty_message_no_writes() {
        let writer = FrameWriter::default();
        let mut transport = VecTransport {
            writes: vec![],
            capacity: 19,
        };

        let report = writer.send(&CompositeMessage::new(), &mut transport);
        assert_eq!(report.frame_len, 0);
        assert_eq!(report.chunks_written, 0);
        assert!(transport.writes.is_empty());
    }

    #[test]
    fn test_chunk_sizes() {
        let writer = FrameWriter::new(19).unwrap();
        let frame = Bytes::from(vec![b'x'; 40]);
        let sizes: Vec<usize> = writer.chunks(&frame).iter().map(|c| c.len()).collect();
        assert_eq!(sizes, vec![19, 19, 2]);
    }

    #[test]
    fn test_zero_chunk_size_rejected() {
        assert!(matches!(
            FrameWriter::new(0),
            Err(ProtocolError::InvalidChunkSize(0))
        ));
    }

    #[test]
    fn test_oversized_chunks_dropped() {
        // Writer chunking larger than the transport accepts
        let writer = FrameWriter::new(10).unwrap();
        let mut transport = VecTransport {
            writes: vec![],
            capacity: 8,
        };

        let frame = Bytes::from(vec![b'y'; 25]);
        let report = writer.send_frame(&frame, &mut transport);

        assert_eq!(report.chunks_written, 1); // only the 5 byte tail fits
        assert_eq!(report.chunks_dropped, 2);
        assert_eq!(report.bytes_dropped, 20);
        assert!(!report.is_complete());
        assert!(matches!(
            report.last_error,
            Some(ProtocolError::TransportOverflow {
                size: 10,
                capacity: 8
            })
        ));
    }

    #[test]
    fn test_io_transport() {
        let mut transport = IoTransport::new(Vec::new(), 4);
        transport.write(b"abcd").unwrap();
        assert!(transport.write(b"abcde").is_err());
        assert_eq!(transport.into_inner(), b"abcd");
    }
}
