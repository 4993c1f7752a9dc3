//! Host-side stream handling
//!
//! The host receives the telemetry stream as transport-sized chunks that may
//! split records anywhere. [`LineAssembler`] stitches them back into lines and
//! [`HubView`] folds parsed records into the latest known state per port, the
//! way an IDE panel would display it.

use crate::error::Result;
use crate::record::{Field, Record};
use crate::types::{Port, TypeId};
use bytes::BytesMut;
use std::collections::BTreeMap;
use tracing::warn;

/// Unterminated bytes kept before the assembler gives up on the line
pub const MAX_PENDING: usize = 4096;

/// Reassembles `\r\n`-terminated lines from arbitrary chunks
#[derive(Debug, Default)]
pub struct LineAssembler {
    buffer: BytesMut,
    /// Prefix of `buffer` already known to hold no terminator
    scanned: usize,
    discarded: usize,
}

impl LineAssembler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append received bytes
    pub fn push(&mut self, chunk: &[u8]) {
        self.buffer.extend_from_slice(chunk);
    }

    /// Bytes received but not yet terminated
    pub fn pending(&self) -> usize {
        self.buffer.len()
    }

    /// Bytes thrown away because no terminator arrived within [`MAX_PENDING`]
    pub fn discarded(&self) -> usize {
        self.discarded
    }

    /// Take the next complete line, without its terminator
    ///
    /// Invalid UTF-8 is replaced rather than rejected so one corrupted
    /// line cannot stall the stream. When more than [`MAX_PENDING`] bytes
    /// are waiting without a terminator they are dropped.
    pub fn next_line(&mut self) -> Option<String> {
        // Back up one byte in case a '\r' ended the last scan
        let from = self.scanned.saturating_sub(1);
        let Some(offset) = self.buffer[from..].windows(2).position(|w| w == b"\r\n") else {
            if self.buffer.len() > MAX_PENDING {
                warn!(
                    "Discarding {} bytes received without a line terminator",
                    self.buffer.len()
                );
                self.discarded += self.buffer.len();
                self.buffer.clear();
                self.scanned = 0;
            } else {
                self.scanned = self.buffer.len();
            }
            return None;
        };

        let end = from + offset;
        let line = self.buffer.split_to(end + 2);
        self.scanned = 0;
        Some(String::from_utf8_lossy(&line[..end]).into_owned())
    }

    /// Take and parse the next complete line
    pub fn next_record(&mut self) -> Option<Result<Record>> {
        self.next_line().map(|line| line.parse())
    }
}

/// Latest known state of one port
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PortView {
    /// Attached device type, `None` while empty
    pub type_id: Option<TypeId>,
    /// Latest fields by key
    pub data: BTreeMap<String, String>,
    /// Latest data rendered as a display string
    pub data_str: String,
    /// Selectable modes announced by the device
    pub modes: Vec<String>,
    /// Mode index the host last selected
    pub mode: u8,
    /// Number of records applied to this port
    pub updates: u64,
}

impl PortView {
    fn clear(&mut self) {
        self.type_id = None;
        self.data.clear();
        self.data_str.clear();
        self.modes.clear();
        self.mode = 0;
    }

    fn set_device(&mut self, type_id: TypeId) {
        if self.type_id != Some(type_id) {
            self.clear();
            self.type_id = Some(type_id);
        }
    }

    fn set_fields(&mut self, fields: &[Field]) {
        self.data = fields
            .iter()
            .map(|f| (f.key.clone(), f.value.clone()))
            .collect();
        self.data_str = fields
            .iter()
            .map(|f| f.to_string())
            .collect::<Vec<_>>()
            .join(" ");
    }
}

/// Host-side view of the whole hub
#[derive(Debug, Clone, Default)]
pub struct HubView {
    ports: BTreeMap<Port, PortView>,
    battery: BTreeMap<String, String>,
    imu: BTreeMap<String, String>,
}

impl HubView {
    /// Create a view for the given ports
    pub fn new(ports: &[Port]) -> Self {
        Self {
            ports: ports.iter().map(|p| (*p, PortView::default())).collect(),
            ..Self::default()
        }
    }

    pub fn port(&self, port: Port) -> Option<&PortView> {
        self.ports.get(&port)
    }

    pub fn ports(&self) -> impl Iterator<Item = (&Port, &PortView)> {
        self.ports.iter()
    }

    pub fn battery(&self) -> &BTreeMap<String, String> {
        &self.battery
    }

    pub fn imu(&self) -> &BTreeMap<String, String> {
        &self.imu
    }

    /// Fold one record into the view
    pub fn apply(&mut self, record: &Record) {
        match record {
            Record::PortEmpty { port } => {
                let view = self.ports.entry(*port).or_default();
                view.clear();
                view.updates += 1;
            }
            Record::ModeList {
                port,
                type_id,
                modes,
            } => {
                let view = self.ports.entry(*port).or_default();
                view.set_device(*type_id);
                view.modes = modes.clone();
                if usize::from(view.mode) >= view.modes.len() {
                    view.mode = 0;
                }
                view.updates += 1;
            }
            Record::Data {
                port,
                type_id,
                fields,
            } => {
                let view = self.ports.entry(*port).or_default();
                view.set_device(*type_id);
                view.set_fields(fields);
                view.updates += 1;
            }
            Record::Unknown { port, type_id } => {
                let view = self.ports.entry(*port).or_default();
                view.set_device(*type_id);
                view.data.clear();
                view.data_str = crate::record::UNKNOWN_MARKER.to_string();
                view.updates += 1;
            }
            Record::Battery { fields } => {
                self.battery = fields
                    .iter()
                    .map(|f| (f.key.clone(), f.value.clone()))
                    .collect();
            }
            Record::Imu { fields } => {
                self.imu = fields
                    .iter()
                    .map(|f| (f.key.clone(), f.value.clone()))
                    .collect();
            }
        }
    }

    /// Advance a port to its next mode
    ///
    /// Returns the selector byte to write to the mode channel, or `None` if
    /// the attached device has fewer than two modes.
    pub fn next_mode(&mut self, port: Port) -> Option<u8> {
        let view = self.ports.get_mut(&port)?;
        let count = view.modes.len();
        if count < 2 {
            return None;
        }
        let next = (usize::from(view.mode) + 1) % count;
        view.mode = u8::try_from(next).ok()?;
        Some(view.mode)
    }
}
