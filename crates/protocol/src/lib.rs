//! Wire protocol for hub telemetry
//!
//! This crate defines the line-oriented text format the hub streams to a
//! connected host: typed records, the per-tick composite message, the chunked
//! frame writer, and the host-side reassembly helpers.
//!
//! # Example
//!
//! ```
//! use protocol::{CompositeMessage, Field, FrameWriter, IoTransport, Port, Record};
//!
//! let mut message = CompositeMessage::new();
//! message.push(Record::PortEmpty { port: Port::A });
//! message.push(Record::Data {
//!     port: Port::B,
//!     type_id: 49,
//!     fields: vec![Field::new("a", "90°")],
//! });
//!
//! let mut transport = IoTransport::new(Vec::new(), 19);
//! let report = FrameWriter::new(19).unwrap().send(&message, &mut transport);
//! assert!(report.is_complete());
//! assert_eq!(transport.into_inner(), b"Port.A\t--\r\nPort.B\t49\ta=90\xc2\xb0\r\n");
//! ```
//!
//! # Reassembly
//!
//! ```
//! use protocol::{LineAssembler, Port, Record};
//!
//! let mut assembler = LineAssembler::new();
//! assembler.push(b"Port.A\t-");
//! assembler.push(b"-\r\n");
//! let record = assembler.next_record().unwrap().unwrap();
//! assert_eq!(record, Record::PortEmpty { port: Port::A });
//! ```

pub mod error;
pub mod frame;
pub mod host;
pub mod record;
pub mod types;

pub use error::{ProtocolError, Result};
pub use frame::{
    CompositeMessage, DEFAULT_CHUNK_SIZE, FrameWriter, IoTransport, RECORD_TERMINATOR, SendReport,
    Transport,
};
pub use host::{HubView, LineAssembler, PortView};
pub use record::{Field, Record};
pub use types::{Port, TypeId, device_name};
