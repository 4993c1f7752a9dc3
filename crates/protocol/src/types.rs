//! Port and device type definitions
//!
//! Ports are the physical expansion connectors of the hub. Device type
//! identifiers are the small integers a generic probe reports for whatever
//! is plugged into a port.

use crate::error::{ProtocolError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Device type identifier reported by the port probe
pub type TypeId = u8;

/// Physical expansion port
///
/// Rendered on the wire as `Port.A` .. `Port.F`. Serialized in configuration
/// files as the bare letter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum Port {
    A,
    B,
    C,
    D,
    E,
    F,
}

impl Port {
    /// All ports a hub can have, in declaration order
    pub const ALL: [Port; 6] = [Port::A, Port::B, Port::C, Port::D, Port::E, Port::F];

    /// Bare port letter
    pub fn letter(self) -> char {
        match self {
            Port::A => 'A',
            Port::B => 'B',
            Port::C => 'C',
            Port::D => 'D',
            Port::E => 'E',
            Port::F => 'F',
        }
    }
}

impl fmt::Display for Port {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Port.{}", self.letter())
    }
}

impl FromStr for Port {
    type Err = ProtocolError;

    /// Accepts both `A` and `Port.A`
    fn from_str(s: &str) -> Result<Self> {
        let letter = s.trim().strip_prefix("Port.").unwrap_or(s.trim());
        match letter {
            "A" | "a" => Ok(Port::A),
            "B" | "b" => Ok(Port::B),
            "C" | "c" => Ok(Port::C),
            "D" | "d" => Ok(Port::D),
            "E" | "e" => Ok(Port::E),
            "F" | "f" => Ok(Port::F),
            _ => Err(ProtocolError::UnknownPort(s.to_string())),
        }
    }
}

impl TryFrom<String> for Port {
    type Error = ProtocolError;

    fn try_from(value: String) -> Result<Self> {
        value.parse()
    }
}

impl From<Port> for String {
    fn from(port: Port) -> Self {
        port.letter().to_string()
    }
}

/// Product name for a known device type identifier
///
/// Used for log lines and host display only; decoding never depends on it.
pub fn device_name(type_id: TypeId) -> Option<&'static str> {
    let name = match type_id {
        1 => "WeDo 2.0 Medium Motor",
        2 => "Powered Up Train Motor",
        8 => "Powered Up Light",
        34 => "WeDo 2.0 Tilt Sensor",
        35 => "WeDo 2.0 Infrared Motion Sensor",
        37 => "BOOST Color Distance Sensor",
        38 => "BOOST Interactive Motor",
        46 => "Technic Large Motor",
        47 => "Technic Extra Large Motor",
        48 => "SPIKE Medium Angular Motor",
        49 => "SPIKE Large Angular Motor",
        61 => "SPIKE Color Sensor",
        62 => "SPIKE Ultrasonic Sensor",
        63 => "SPIKE Force Sensor",
        64 => "SPIKE 3x3 Color Light Matrix",
        65 => "SPIKE Small Angular Motor",
        75 => "Technic Medium Angular Motor",
        76 => "Technic Large Angular Motor",
        _ => return None,
    };
    Some(name)
}
