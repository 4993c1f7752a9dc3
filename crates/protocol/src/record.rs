//! Telemetry records
//!
//! A record is one line of the wire stream: tab-separated fields with no
//! terminator of its own. The terminator is added when records are
//! assembled into a [`CompositeMessage`](crate::CompositeMessage).
//!
//! # Line shapes
//!
//! ```text
//! Port.A\t--                                  port empty
//! Port.A\t61\tmodes\t<mode0>\t<mode1>         mode list (multi-mode devices)
//! Port.A\t49\ta=450°\tr=1R\tra=90°            device data
//! Port.A\t1                                   device without sensors
//! Port.A\t8\tunknown                          unrecognized device
//! battery\tpct=78%\tv=7800mV\ts=0
//! imu\tup=TOP\ty=0°\tp=0°\tr=0°\ts=1
//! ```

use crate::error::{ProtocolError, Result};
use crate::types::{Port, TypeId};
use std::fmt;
use std::str::FromStr;

/// Marker for an empty port
pub const PORT_EMPTY_MARKER: &str = "--";

/// Keyword introducing a mode list
pub const MODES_KEYWORD: &str = "modes";

/// Marker for a device with no decoder
pub const UNKNOWN_MARKER: &str = "unknown";

/// Source tag of the battery record
pub const BATTERY_TAG: &str = "battery";

/// Source tag of the orientation record
pub const IMU_TAG: &str = "imu";

/// One `key=value` pair of a record
///
/// Values carry their unit suffix (`90°`, `45%`, `1.25N`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Field {
    pub key: String,
    pub value: String,
}

impl Field {
    pub fn new(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
        }
    }
}

impl fmt::Display for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}={}", self.key, self.value)
    }
}

impl FromStr for Field {
    type Err = ProtocolError;

    fn from_str(s: &str) -> Result<Self> {
        let (key, value) = s
            .split_once('=')
            .ok_or_else(|| ProtocolError::MalformedRecord(s.to_string()))?;
        if key.is_empty() {
            return Err(ProtocolError::MalformedRecord(s.to_string()));
        }
        Ok(Field::new(key, value))
    }
}

/// One line of telemetry
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Record {
    /// Nothing is attached to the port
    PortEmpty { port: Port },
    /// Selectable modes of a multi-mode device, sent once per attach
    ModeList {
        port: Port,
        type_id: TypeId,
        modes: Vec<String>,
    },
    /// Readings from a decoded device (empty for sensorless actuators)
    Data {
        port: Port,
        type_id: TypeId,
        fields: Vec<Field>,
    },
    /// A device with no decoder
    Unknown { port: Port, type_id: TypeId },
    /// Hub battery report
    Battery { fields: Vec<Field> },
    /// Hub orientation report
    Imu { fields: Vec<Field> },
}

impl Record {
    /// Port this record describes, if any
    pub fn port(&self) -> Option<Port> {
        match self {
            Record::PortEmpty { port }
            | Record::ModeList { port, .. }
            | Record::Data { port, .. }
            | Record::Unknown { port, .. } => Some(*port),
            Record::Battery { .. } | Record::Imu { .. } => None,
        }
    }

    /// Device type identifier carried by this record, if any
    pub fn type_id(&self) -> Option<TypeId> {
        match self {
            Record::ModeList { type_id, .. }
            | Record::Data { type_id, .. }
            | Record::Unknown { type_id, .. } => Some(*type_id),
            _ => None,
        }
    }

    /// Value of a named field, for records that carry fields
    pub fn field(&self, key: &str) -> Option<&str> {
        let fields = match self {
            Record::Data { fields, .. } | Record::Battery { fields } | Record::Imu { fields } => {
                fields
            }
            _ => return None,
        };
        fields
            .iter()
            .find(|f| f.key == key)
            .map(|f| f.value.as_str())
    }
}

fn write_fields(f: &mut fmt::Formatter<'_>, fields: &[Field]) -> fmt::Result {
    for field in fields {
        write!(f, "\t{}", field)?;
    }
    Ok(())
}

impl fmt::Display for Record {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Record::PortEmpty { port } => write!(f, "{}\t{}", port, PORT_EMPTY_MARKER),
            Record::ModeList {
                port,
                type_id,
                modes,
            } => {
                write!(f, "{}\t{}\t{}", port, type_id, MODES_KEYWORD)?;
                for mode in modes {
                    write!(f, "\t{}", mode)?;
                }
                Ok(())
            }
            Record::Data {
                port,
                type_id,
                fields,
            } => {
                write!(f, "{}\t{}", port, type_id)?;
                write_fields(f, fields)
            }
            Record::Unknown { port, type_id } => {
                write!(f, "{}\t{}\t{}", port, type_id, UNKNOWN_MARKER)
            }
            Record::Battery { fields } => {
                f.write_str(BATTERY_TAG)?;
                write_fields(f, fields)
            }
            Record::Imu { fields } => {
                f.write_str(IMU_TAG)?;
                write_fields(f, fields)
            }
        }
    }
}

fn parse_fields<'a>(parts: impl Iterator<Item = &'a str>) -> Result<Vec<Field>> {
    parts.map(str::parse).collect()
}

impl FromStr for Record {
    type Err = ProtocolError;

    /// Parse one wire line (without its terminator)
    fn from_str(line: &str) -> Result<Self> {
        let malformed = || ProtocolError::MalformedRecord(line.to_string());
        let mut parts = line.split('\t');
        let source = parts.next().filter(|s| !s.is_empty()).ok_or_else(malformed)?;

        match source {
            BATTERY_TAG => {
                return Ok(Record::Battery {
                    fields: parse_fields(parts)?,
                });
            }
            IMU_TAG => {
                return Ok(Record::Imu {
                    fields: parse_fields(parts)?,
                });
            }
            _ => {}
        }

        let port: Port = source.parse()?;
        let second = parts.next().ok_or_else(malformed)?;
        if second == PORT_EMPTY_MARKER {
            return match parts.next() {
                None => Ok(Record::PortEmpty { port }),
                Some(_) => Err(malformed()),
            };
        }

        let type_id: TypeId = second.parse().map_err(|_| malformed())?;
        let rest: Vec<&str> = parts.collect();

        match rest.as_slice() {
            [MODES_KEYWORD, modes @ ..] => Ok(Record::ModeList {
                port,
                type_id,
                modes: modes.iter().map(|m| m.to_string()).collect(),
            }),
            [UNKNOWN_MARKER] => Ok(Record::Unknown { port, type_id }),
            fields => Ok(Record::Data {
                port,
                type_id,
                fields: parse_fields(fields.iter().copied())?,
            }),
        }
    }
}
