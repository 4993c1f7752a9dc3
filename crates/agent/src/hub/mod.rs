//! Hardware collaborator interface
//!
//! The telemetry core never talks to device drivers directly. Everything it
//! needs from the hub goes through two traits:
//! - [`PortIo`]: the generic port probe plus typed per-device readers
//! - [`HubIo`]: battery, charger and orientation sensor of the hub itself
//!
//! Every reader either returns a value or signals an error. On a port,
//! [`HardwareError::DeviceAbsent`] and [`HardwareError::ReadFailed`] both
//! mean "no usable device" and send the Port Session back to `Searching`;
//! only [`HardwareError::InvalidReading`] is reported as a fault. Readers
//! must not block.

pub mod sim;

pub use sim::{ImuState, LightReading, SimDevice, SimulatedHub};

use protocol::{Port, TypeId};
use std::fmt;
use thiserror::Error;

/// Hardware read failures
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum HardwareError {
    /// No device, or a different device, occupies the port
    #[error("No device on {port}")]
    DeviceAbsent { port: Port },

    /// I/O failure talking to the device (bus error, timeout)
    #[error("Read from {what} failed: {reason}")]
    ReadFailed { what: String, reason: String },

    /// The read completed but the value has an impossible shape
    #[error("Invalid reading from {what}: {reason}")]
    InvalidReading { what: String, reason: String },
}

pub type HwResult<T> = std::result::Result<T, HardwareError>;

/// Hue/saturation/value triple
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Hsv {
    /// Hue in degrees (0-359)
    pub h: u16,
    /// Saturation percent
    pub s: u8,
    /// Value percent
    pub v: u8,
}

impl Hsv {
    pub fn new(h: u16, s: u8, v: u8) -> Self {
        Self { h, s, v }
    }
}

/// Detected color
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ColorName {
    #[default]
    None,
    Black,
    Violet,
    Blue,
    Cyan,
    Green,
    Yellow,
    Orange,
    Red,
    Magenta,
    White,
}

impl ColorName {
    /// Nearest named color for a hue/saturation/value reading
    pub fn from_hsv(hsv: Hsv) -> Self {
        if hsv.v < 10 {
            return ColorName::Black;
        }
        if hsv.s < 20 {
            return if hsv.v > 80 {
                ColorName::White
            } else {
                ColorName::None
            };
        }
        match hsv.h % 360 {
            0..=14 | 345..=359 => ColorName::Red,
            15..=39 => ColorName::Orange,
            40..=69 => ColorName::Yellow,
            70..=164 => ColorName::Green,
            165..=194 => ColorName::Cyan,
            195..=254 => ColorName::Blue,
            255..=289 => ColorName::Violet,
            _ => ColorName::Magenta,
        }
    }
}

impl fmt::Display for ColorName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ColorName::None => "NONE",
            ColorName::Black => "BLACK",
            ColorName::Violet => "VIOLET",
            ColorName::Blue => "BLUE",
            ColorName::Cyan => "CYAN",
            ColorName::Green => "GREEN",
            ColorName::Yellow => "YELLOW",
            ColorName::Orange => "ORANGE",
            ColorName::Red => "RED",
            ColorName::Magenta => "MAGENTA",
            ColorName::White => "WHITE",
        };
        f.write_str(name)
    }
}

/// Hub face pointing up
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Side {
    #[default]
    Top,
    Bottom,
    Front,
    Back,
    Left,
    Right,
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Side::Top => "TOP",
            Side::Bottom => "BOTTOM",
            Side::Front => "FRONT",
            Side::Back => "BACK",
            Side::Left => "LEFT",
            Side::Right => "RIGHT",
        };
        f.write_str(name)
    }
}

/// Charger state, rendered on the wire as its numeric code
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ChargerStatus {
    #[default]
    Discharging,
    Charging,
    Complete,
    Fault,
}

impl ChargerStatus {
    pub fn code(self) -> u8 {
        match self {
            ChargerStatus::Discharging => 0,
            ChargerStatus::Charging => 1,
            ChargerStatus::Complete => 2,
            ChargerStatus::Fault => 3,
        }
    }
}

impl TryFrom<u8> for ChargerStatus {
    type Error = u8;

    fn try_from(code: u8) -> std::result::Result<Self, u8> {
        match code {
            0 => Ok(ChargerStatus::Discharging),
            1 => Ok(ChargerStatus::Charging),
            2 => Ok(ChargerStatus::Complete),
            3 => Ok(ChargerStatus::Fault),
            other => Err(other),
        }
    }
}

impl fmt::Display for ChargerStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code())
    }
}

/// Measurement basis of a color sensor
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LightBasis {
    /// Sensor light on, measuring a surface
    Reflected,
    /// Sensor light off, measuring the surroundings
    Ambient,
}

/// Per-port hardware access
pub trait PortIo {
    /// Generic probe: type identifier of whatever is attached
    fn probe(&mut self, port: Port) -> HwResult<TypeId>;

    fn hsv(&mut self, port: Port, basis: LightBasis) -> HwResult<Hsv>;

    fn color(&mut self, port: Port, basis: LightBasis) -> HwResult<ColorName>;

    /// Reflected light intensity, percent
    fn reflection(&mut self, port: Port) -> HwResult<u8>;

    /// Ambient light intensity, percent
    fn ambient(&mut self, port: Port) -> HwResult<u8>;

    /// Relative distance, percent
    fn distance_percent(&mut self, port: Port) -> HwResult<u8>;

    /// Absolute distance, millimeters
    fn distance_mm(&mut self, port: Port) -> HwResult<i32>;

    /// Pitch and roll, degrees
    fn tilt(&mut self, port: Port) -> HwResult<(i32, i32)>;

    /// Force on a plunger, newtons
    fn force(&mut self, port: Port) -> HwResult<f64>;

    /// Plunger travel, millimeters
    fn travel(&mut self, port: Port) -> HwResult<f64>;

    /// Accumulated motor angle, degrees
    fn angle(&mut self, port: Port) -> HwResult<i64>;
}

/// Hub-level hardware access
pub trait HubIo {
    /// Whether the hub variant has a battery gauge (checked once at startup)
    fn has_battery(&self) -> bool;

    /// Whether the hub variant has an orientation sensor (checked once at startup)
    fn has_imu(&self) -> bool;

    fn battery_voltage(&mut self) -> HwResult<u32>;

    fn charger_status(&mut self) -> HwResult<ChargerStatus>;

    /// Compass heading, degrees
    fn heading(&mut self) -> HwResult<f64>;

    /// Pitch and roll of the hub, degrees
    fn imu_tilt(&mut self) -> HwResult<(f64, f64)>;

    fn stationary(&mut self) -> HwResult<bool>;

    fn up(&mut self) -> HwResult<Side>;

    /// Called once at the start of every tick, before any session runs
    fn begin_tick(&mut self, _tick: u64) {}
}

/// Complete hardware collaborator
pub trait Hardware: PortIo + HubIo {}

impl<T: PortIo + HubIo + ?Sized> Hardware for T {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wire_names() {
        assert_eq!(ColorName::Red.to_string(), "RED");
        assert_eq!(ColorName::None.to_string(), "NONE");
        assert_eq!(Side::Front.to_string(), "FRONT");
        assert_eq!(ChargerStatus::Complete.to_string(), "2");
    }

    #[test]
    fn test_charger_codes() {
        for code in 0..=3u8 {
            assert_eq!(ChargerStatus::try_from(code).unwrap().code(), code);
        }
        assert_eq!(ChargerStatus::try_from(4), Err(4));
    }

    #[test]
    fn test_color_from_hsv() {
        assert_eq!(ColorName::from_hsv(Hsv::new(0, 90, 80)), ColorName::Red);
        assert_eq!(ColorName::from_hsv(Hsv::new(220, 90, 80)), ColorName::Blue);
        assert_eq!(ColorName::from_hsv(Hsv::new(120, 5, 95)), ColorName::White);
        assert_eq!(ColorName::from_hsv(Hsv::new(120, 90, 3)), ColorName::Black);
    }

    #[test]
    fn test_error_display() {
        let err = HardwareError::DeviceAbsent { port: Port::C };
        assert_eq!(err.to_string(), "No device on Port.C");
        let err = HardwareError::InvalidReading {
            what: "Port.A".to_string(),
            reason: "hue 400".to_string(),
        };
        assert_eq!(err.to_string(), "Invalid reading from Port.A: hue 400");
    }
}
