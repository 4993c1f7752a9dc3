//! Device Decoder Set
//!
//! One decoder per device category. A [`Decoder`] is created when a Port
//! Session binds to a device and lives for exactly one attach episode, so
//! per-episode state (the mode-list header flag) never survives a detach.
//!
//! Decoders never swallow hardware errors: every [`HardwareError`] propagates
//! to the Port Session, which owns the state transition.

use crate::hub::{ColorName, HardwareError, Hsv, HwResult, LightBasis, PortIo};
use protocol::{Field, Port, Record, TypeId};

const COLOR_AND_DISTANCE_MODES: &[&str] = &[
    "Reflected light intensity and color",
    "Ambient light intensity",
    "Distance",
];

const COLOR_MODES: &[&str] = &[
    "Reflected light intensity and color",
    "Ambient light intensity and color",
];

/// Decoder variant selected from the probed type identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceKind {
    Tilt,
    Infrared,
    ColorAndDistance,
    Color,
    Ultrasonic,
    Force,
    DcMotor,
    RotationMotor,
    Unknown,
}

impl DeviceKind {
    /// Dispatch table, first match wins
    pub fn from_type_id(type_id: TypeId) -> Self {
        match type_id {
            34 => DeviceKind::Tilt,
            35 => DeviceKind::Infrared,
            37 => DeviceKind::ColorAndDistance,
            61 => DeviceKind::Color,
            62 => DeviceKind::Ultrasonic,
            63 => DeviceKind::Force,
            1 | 2 => DeviceKind::DcMotor,
            38 | 46 | 47 | 48 | 49 | 65 | 75 | 76 => DeviceKind::RotationMotor,
            _ => DeviceKind::Unknown,
        }
    }

    /// Selectable mode names, in selector order (empty for single-mode devices)
    pub fn modes(self) -> &'static [&'static str] {
        match self {
            DeviceKind::ColorAndDistance => COLOR_AND_DISTANCE_MODES,
            DeviceKind::Color => COLOR_MODES,
            _ => &[],
        }
    }

    pub fn is_multi_mode(self) -> bool {
        self.modes().len() > 1
    }
}

/// Normalize an accumulated angle into [-180, 180)
pub fn normalize_angle(angle: i64) -> i64 {
    (angle + 180).rem_euclid(360) - 180
}

/// Motor fields: absolute angle, plus rotations and normalized angle once
/// the two differ
pub fn motor_fields(angle: i64) -> Vec<Field> {
    let mut fields = vec![Field::new("a", format!("{}°", angle))];
    let normalized = normalize_angle(angle);
    if normalized != angle {
        let rotations = (angle - normalized) / 360;
        fields.push(Field::new("r", format!("{}R", rotations)));
        fields.push(Field::new("ra", format!("{}°", normalized)));
    }
    fields
}

fn light_fields(color: ColorName, hsv: Hsv, intensity: u8) -> Vec<Field> {
    vec![
        Field::new("c", color.to_string()),
        Field::new("h", format!("{}°", hsv.h)),
        Field::new("s", format!("{}%", hsv.s)),
        Field::new("v", format!("{}%", hsv.v)),
        Field::new("i", format!("{}%", intensity)),
    ]
}

/// Per-attach-episode decoder state
#[derive(Debug, Clone)]
pub struct Decoder {
    kind: DeviceKind,
    type_id: TypeId,
    header_sent: bool,
}

impl Decoder {
    /// Fresh decoder for a newly attached device
    pub fn new(type_id: TypeId) -> Self {
        Self {
            kind: DeviceKind::from_type_id(type_id),
            type_id,
            header_sent: false,
        }
    }

    pub fn kind(&self) -> DeviceKind {
        self.kind
    }

    pub fn type_id(&self) -> TypeId {
        self.type_id
    }

    pub fn header_sent(&self) -> bool {
        self.header_sent
    }

    /// Produce this tick's records
    ///
    /// Returns the data record, preceded by the mode-list header on the
    /// first successful poll of a multi-mode device.
    pub fn poll<H: PortIo + ?Sized>(
        &mut self,
        port: Port,
        mode: u8,
        hw: &mut H,
    ) -> HwResult<Vec<Record>> {
        let record = self.read(port, mode, hw)?;

        let mut records = Vec::with_capacity(2);
        if self.kind.is_multi_mode() && !self.header_sent {
            records.push(Record::ModeList {
                port,
                type_id: self.type_id,
                modes: self.kind.modes().iter().map(|m| m.to_string()).collect(),
            });
            self.header_sent = true;
        }
        records.push(record);
        Ok(records)
    }

    fn read<H: PortIo + ?Sized>(&self, port: Port, mode: u8, hw: &mut H) -> HwResult<Record> {
        let fields = match self.kind {
            DeviceKind::ColorAndDistance => match mode {
                0 => {
                    let hsv = hw.hsv(port, LightBasis::Reflected)?;
                    let intensity = hw.reflection(port)?;
                    let color = hw.color(port, LightBasis::Reflected)?;
                    light_fields(color, hsv, intensity)
                }
                1 => vec![Field::new("i", format!("{}%", hw.ambient(port)?))],
                _ => vec![Field::new("d", format!("{}%", hw.distance_percent(port)?))],
            },
            DeviceKind::Color => {
                let basis = if mode == 0 {
                    LightBasis::Reflected
                } else {
                    LightBasis::Ambient
                };
                let hsv = hw.hsv(port, basis)?;
                let color = hw.color(port, basis)?;
                let intensity = match basis {
                    LightBasis::Reflected => hw.reflection(port)?,
                    LightBasis::Ambient => hw.ambient(port)?,
                };
                light_fields(color, hsv, intensity)
            }
            DeviceKind::Tilt => {
                let (pitch, roll) = hw.tilt(port)?;
                vec![
                    Field::new("p", format!("{}°", pitch)),
                    Field::new("r", format!("{}°", roll)),
                ]
            }
            DeviceKind::Infrared => {
                let distance = hw.distance_percent(port)?;
                let reflection = hw.reflection(port)?;
                vec![
                    Field::new("d", format!("{}%", distance)),
                    Field::new("i", format!("{}%", reflection)),
                ]
            }
            DeviceKind::Ultrasonic => {
                vec![Field::new("d", format!("{}mm", hw.distance_mm(port)?))]
            }
            DeviceKind::Force => {
                let force = hw.force(port)?;
                let travel = hw.travel(port)?;
                vec![
                    Field::new("f", format!("{:.2}N", force)),
                    Field::new("d", format!("{:.2}mm", travel)),
                ]
            }
            DeviceKind::RotationMotor => motor_fields(hw.angle(port)?),
            DeviceKind::DcMotor => {
                self.confirm_present(port, hw)?;
                Vec::new()
            }
            DeviceKind::Unknown => {
                self.confirm_present(port, hw)?;
                return Ok(Record::Unknown {
                    port,
                    type_id: self.type_id,
                });
            }
        };

        Ok(Record::Data {
            port,
            type_id: self.type_id,
            fields,
        })
    }

    /// Re-run the generic probe for decoders that have no typed reader
    fn confirm_present<H: PortIo + ?Sized>(&self, port: Port, hw: &mut H) -> HwResult<()> {
        match hw.probe(port)? {
            id if id == self.type_id => Ok(()),
            _ => Err(HardwareError::DeviceAbsent { port }),
        }
    }
}
