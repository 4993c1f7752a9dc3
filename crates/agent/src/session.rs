//! Port and hub sessions
//!
//! A session is a long-lived task the scheduler advances by exactly one
//! step per tick. Each step yields at most one logical record (a multi-mode
//! device's first record carries its mode-list header alongside).
//!
//! # Port Session states
//!
//! ```text
//!            probe ok                 DeviceAbsent | ReadFailed
//! Searching ─────────► Bound(Decoder) ─────────────────────────► Searching
//!     ▲  │ DeviceAbsent | ReadFailed: "Port.X\t--"
//!     └──┘
//! ```
//!
//! An `InvalidReading` leaves the state alone and is reported as a fault.

use crate::decoder::Decoder;
use crate::hub::{Hardware, HardwareError, HwResult, Side};
use common::ModeReader;
use protocol::{Field, Port, Record, device_name};
use std::fmt;
use tracing::{debug, info, warn};

/// Why a session produced no record this tick
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FaultKind {
    /// A hub-level read (battery, orientation) failed
    ReadFailed(String),
    /// The hardware returned a value that cannot be decoded
    InvalidReading(String),
    /// The step panicked; the payload message is kept
    Panicked(String),
}

impl fmt::Display for FaultKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FaultKind::ReadFailed(reason) => write!(f, "read failed: {}", reason),
            FaultKind::InvalidReading(reason) => write!(f, "invalid reading: {}", reason),
            FaultKind::Panicked(message) => write!(f, "panicked: {}", message),
        }
    }
}

impl From<HardwareError> for FaultKind {
    fn from(err: HardwareError) -> Self {
        match err {
            HardwareError::InvalidReading { .. } => FaultKind::InvalidReading(err.to_string()),
            _ => FaultKind::ReadFailed(err.to_string()),
        }
    }
}

/// Outcome of one session step
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StepResult {
    Record(Vec<Record>),
    NoRecord,
    Fault(FaultKind),
}

/// Everything a session may touch during one step
pub struct TickContext<'a> {
    pub hw: &'a mut dyn Hardware,
    pub modes: &'a ModeReader,
    pub tick: u64,
}

/// A resumable task driven by the scheduler
pub trait Session {
    /// Label used in logs and fault reports
    fn name(&self) -> String;

    /// Advance by one tick
    fn step(&mut self, ctx: &mut TickContext<'_>) -> StepResult;

    /// Return to a clean state after a step panicked
    fn recover(&mut self) {}
}

/// Port Session state
#[derive(Debug, Clone)]
pub enum PortState {
    Searching,
    Bound(Decoder),
}

/// Monitoring task for one expansion port
#[derive(Debug)]
pub struct PortSession {
    port: Port,
    /// Position of this port in the Mode Channel
    index: usize,
    state: PortState,
}

impl PortSession {
    pub fn new(port: Port, index: usize) -> Self {
        Self {
            port,
            index,
            state: PortState::Searching,
        }
    }

    pub fn port(&self) -> Port {
        self.port
    }

    pub fn state(&self) -> &PortState {
        &self.state
    }

    /// Drop back to `Searching` and report the port empty
    fn lost(&mut self, err: &HardwareError) -> StepResult {
        match (&self.state, err) {
            (PortState::Bound(decoder), HardwareError::DeviceAbsent { .. }) => {
                info!("{}: device {} detached", self.port, decoder.type_id());
            }
            (PortState::Bound(decoder), _) => {
                warn!("{}: device {} lost: {}", self.port, decoder.type_id(), err);
            }
            (PortState::Searching, HardwareError::DeviceAbsent { .. }) => {}
            (PortState::Searching, _) => debug!("{}: detection failed: {}", self.port, err),
        }
        self.state = PortState::Searching;
        self.empty()
    }

    fn empty(&self) -> StepResult {
        StepResult::Record(vec![Record::PortEmpty { port: self.port }])
    }
}

impl Session for PortSession {
    fn name(&self) -> String {
        self.port.to_string()
    }

    fn step(&mut self, ctx: &mut TickContext<'_>) -> StepResult {
        if let PortState::Searching = self.state {
            match ctx.hw.probe(self.port) {
                Ok(type_id) => {
                    info!(
                        "{}: device {} attached ({})",
                        self.port,
                        type_id,
                        device_name(type_id).unwrap_or("unrecognized device")
                    );
                    self.state = PortState::Bound(Decoder::new(type_id));
                }
                Err(e @ HardwareError::InvalidReading { .. }) => {
                    return StepResult::Fault(e.into());
                }
                Err(e) => return self.lost(&e),
            }
        }

        let PortState::Bound(decoder) = &mut self.state else {
            return StepResult::NoRecord;
        };
        let mode = ctx.modes.get(self.index);

        match decoder.poll(self.port, mode, &mut *ctx.hw) {
            Ok(records) => StepResult::Record(records),
            Err(e @ HardwareError::InvalidReading { .. }) => StepResult::Fault(e.into()),
            Err(e) => self.lost(&e),
        }
    }

    fn recover(&mut self) {
        if let PortState::Bound(decoder) = &self.state {
            warn!(
                "{}: dropping decoder for device {} after fault",
                self.port,
                decoder.type_id()
            );
        }
        self.state = PortState::Searching;
    }
}

/// Battery percentage for a pack voltage
///
/// Linear from 6000 mV (0%) to 8300 mV (100%), clamped at the top only,
/// rounded half to even.
pub fn battery_percentage(millivolts: u32) -> i64 {
    const EMPTY_MV: f64 = 6000.0;
    const FULL_MV: f64 = 8300.0;

    let pct = (f64::from(millivolts) - EMPTY_MV) / (FULL_MV - EMPTY_MV) * 100.0;
    pct.min(100.0).round_ties_even() as i64
}

/// Rate-limited battery report
#[derive(Debug)]
pub struct BatteryTask {
    interval: u64,
    /// Ticks left before the next report
    countdown: u64,
}

impl BatteryTask {
    /// Report on the first step, then once every `interval` steps
    pub fn new(interval: u64) -> Self {
        Self {
            interval: interval.max(1),
            countdown: 0,
        }
    }
}

impl Session for BatteryTask {
    fn name(&self) -> String {
        protocol::record::BATTERY_TAG.to_string()
    }

    fn step(&mut self, ctx: &mut TickContext<'_>) -> StepResult {
        if self.countdown > 0 {
            self.countdown -= 1;
            return StepResult::NoRecord;
        }

        let reading = ctx
            .hw
            .battery_voltage()
            .and_then(|mv| Ok((mv, ctx.hw.charger_status()?)));
        let (millivolts, status) = match reading {
            Ok(reading) => reading,
            Err(e) => return StepResult::Fault(e.into()),
        };

        self.countdown = self.interval - 1;
        debug!("Battery report at tick {}", ctx.tick);

        StepResult::Record(vec![Record::Battery {
            fields: vec![
                Field::new("pct", format!("{}%", battery_percentage(millivolts))),
                Field::new("v", format!("{}mV", millivolts)),
                Field::new("s", status.to_string()),
            ],
        }])
    }

    fn recover(&mut self) {
        self.countdown = 0;
    }
}

/// Orientation report, every tick
#[derive(Debug, Default)]
pub struct ImuTask;

impl ImuTask {
    pub fn new() -> Self {
        Self
    }
}

impl Session for ImuTask {
    fn name(&self) -> String {
        protocol::record::IMU_TAG.to_string()
    }

    fn step(&mut self, ctx: &mut TickContext<'_>) -> StepResult {
        match read_orientation(&mut *ctx.hw) {
            Ok(orientation) => StepResult::Record(vec![orientation.into_record()]),
            Err(e) => StepResult::Fault(e.into()),
        }
    }
}

struct Orientation {
    heading: f64,
    pitch: f64,
    roll: f64,
    stationary: bool,
    up: Side,
}

impl Orientation {
    fn into_record(self) -> Record {
        let degrees = |value: f64| format!("{}°", value.round_ties_even() as i64);
        Record::Imu {
            fields: vec![
                Field::new("up", self.up.to_string()),
                Field::new("y", degrees(self.heading)),
                Field::new("p", degrees(self.pitch)),
                Field::new("r", degrees(self.roll)),
                Field::new("s", if self.stationary { "1" } else { "0" }),
            ],
        }
    }
}

fn read_orientation(hw: &mut dyn Hardware) -> HwResult<Orientation> {
    let heading = hw.heading()?;
    let (pitch, roll) = hw.imu_tilt()?;
    Ok(Orientation {
        heading,
        pitch,
        roll,
        stationary: hw.stationary()?,
        up: hw.up()?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hub::{ChargerStatus, ImuState, Side, SimDevice, SimulatedHub};
    use common::mode_channel;

    fn step(session: &mut dyn Session, hub: &mut SimulatedHub, modes: &ModeReader) -> StepResult {
        let mut ctx = TickContext {
            hw: hub,
            modes,
            tick: 0,
        };
        session.step(&mut ctx)
    }

    fn lines(result: &StepResult) -> Vec<String> {
        match result {
            StepResult::Record(records) => records.iter().map(|r| r.to_string()).collect(),
            _ => Vec::new(),
        }
    }

    #[test]
    fn test_battery_percentage() {
        assert_eq!(battery_percentage(6000), 0);
        assert_eq!(battery_percentage(8300), 100);
        assert_eq!(battery_percentage(9000), 100);
        assert_eq!(battery_percentage(7150), 50);
        assert_eq!(battery_percentage(5770), -10);
        assert_eq!(battery_percentage(6172), 7);
    }

    #[test]
    fn test_empty_port() {
        let mut hub = SimulatedHub::new(0);
        let (_writer, modes) = mode_channel(1);
        let mut session = PortSession::new(Port::A, 0);

        for _ in 0..3 {
            assert_eq!(lines(&step(&mut session, &mut hub, &modes)), vec!["Port.A\t--"]);
        }
    }

    #[test]
    fn test_attach_polls_same_tick() {
        let mut hub = SimulatedHub::new(0);
        let (_writer, modes) = mode_channel(1);
        let mut session = PortSession::new(Port::A, 0);
        hub.attach(Port::A, SimDevice::new(48));

        assert_eq!(lines(&step(&mut session, &mut hub, &modes)), vec!["Port.A\t48\ta=0°"]);
        assert!(matches!(session.state(), PortState::Bound(_)));
    }

    #[test]
    fn test_detach_resets_state() {
        let mut hub = SimulatedHub::new(0);
        let (_writer, modes) = mode_channel(1);
        let mut session = PortSession::new(Port::A, 0);
        hub.attach(Port::A, SimDevice::new(61));
        step(&mut session, &mut hub, &modes);

        hub.detach(Port::A);
        assert_eq!(lines(&step(&mut session, &mut hub, &modes)), vec!["Port.A\t--"]);
        assert!(matches!(session.state(), PortState::Searching));
    }

    #[test]
    fn test_read_failure_reports_empty() {
        let mut hub = SimulatedHub::new(0);
        let (_writer, modes) = mode_channel(1);
        let mut session = PortSession::new(Port::A, 0);
        hub.attach(Port::A, SimDevice::new(48));
        step(&mut session, &mut hub, &modes);

        hub.fail_next_read(Port::A, "crc mismatch");
        assert_eq!(lines(&step(&mut session, &mut hub, &modes)), vec!["Port.A\t--"]);
        assert!(matches!(session.state(), PortState::Searching));

        // The device is still there, so the next tick binds it again
        assert_eq!(lines(&step(&mut session, &mut hub, &modes)), vec!["Port.A\t48\ta=0°"]);
    }

    #[test]
    fn test_failed_search_reports_empty() {
        let mut hub = SimulatedHub::new(0);
        let (_writer, modes) = mode_channel(1);
        let mut session = PortSession::new(Port::A, 0);

        hub.fail_next_read(Port::A, "timeout");
        assert_eq!(lines(&step(&mut session, &mut hub, &modes)), vec!["Port.A\t--"]);
        assert!(matches!(session.state(), PortState::Searching));
    }

    #[test]
    fn test_invalid_reading_keeps_binding() {
        let mut hub = SimulatedHub::new(0);
        let (_writer, modes) = mode_channel(1);
        let mut session = PortSession::new(Port::A, 0);
        hub.attach(Port::A, SimDevice::new(48));
        step(&mut session, &mut hub, &modes);

        hub.corrupt_next_read(Port::A, "angle out of range");
        assert_eq!(
            step(&mut session, &mut hub, &modes),
            StepResult::Fault(FaultKind::InvalidReading(
                "Invalid reading from Port.A: angle out of range".to_string()
            ))
        );
        assert!(matches!(session.state(), PortState::Bound(_)));

        session.recover();
        assert!(matches!(session.state(), PortState::Searching));
    }

    #[test]
    fn test_mode_read_fresh_each_tick() {
        let mut hub = SimulatedHub::new(0);
        let (writer, modes) = mode_channel(2);
        let mut session = PortSession::new(Port::B, 1);
        let mut device = SimDevice::new(37);
        device.distance_pct = 64;
        hub.attach(Port::B, device);
        step(&mut session, &mut hub, &modes);

        writer.set(1, 2);
        assert_eq!(lines(&step(&mut session, &mut hub, &modes)), vec!["Port.B\t37\td=64%"]);
    }

    #[test]
    fn test_battery_rate_limit() {
        let mut hub = SimulatedHub::new(0);
        hub.set_battery(7150, ChargerStatus::Charging);
        let (_writer, modes) = mode_channel(0);
        let mut task = BatteryTask::new(3);

        let emitted: Vec<bool> = (0..7)
            .map(|_| matches!(step(&mut task, &mut hub, &modes), StepResult::Record(_)))
            .collect();
        assert_eq!(emitted, vec![true, false, false, true, false, false, true]);
    }

    #[test]
    fn test_battery_line() {
        let mut hub = SimulatedHub::new(0);
        hub.set_battery(7800, ChargerStatus::Discharging);
        let (_writer, modes) = mode_channel(0);
        let mut task = BatteryTask::new(100);
        assert_eq!(
            lines(&step(&mut task, &mut hub, &modes)),
            vec!["battery\tpct=78%\tv=7800mV\ts=0"]
        );
    }

    #[test]
    fn test_battery_fault_retries_next_tick() {
        let mut hub = SimulatedHub::new(0);
        let (_writer, modes) = mode_channel(0);
        let mut task = BatteryTask::new(100);

        hub.fail_next_hub_read("gauge timeout");
        assert!(matches!(
            step(&mut task, &mut hub, &modes),
            StepResult::Fault(FaultKind::ReadFailed(_))
        ));
        assert!(matches!(
            step(&mut task, &mut hub, &modes),
            StepResult::Record(_)
        ));
    }

    #[test]
    fn test_imu_line() {
        let mut hub = SimulatedHub::new(0);
        hub.set_imu(ImuState {
            heading: 89.6,
            pitch: -2.5,
            roll: 3.5,
            stationary: false,
            up: Side::Front,
        });
        let (_writer, modes) = mode_channel(0);
        let mut task = ImuTask::new();
        assert_eq!(
            lines(&step(&mut task, &mut hub, &modes)),
            vec!["imu\tup=FRONT\ty=90°\tp=-2°\tr=4°\ts=0"]
        );
    }
}
