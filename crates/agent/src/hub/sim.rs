//! Simulated hub
//!
//! Scriptable stand-in for the hub's device drivers. Tests attach, detach
//! and edit devices directly and inject read failures; the binary drives it
//! from the `[simulation]` config section with animated readings and seeded
//! random hot-plug.

use super::{
    ChargerStatus, ColorName, HardwareError, Hsv, HubIo, HwResult, LightBasis, PortIo, Side,
};
use crate::config::AgentConfig;
use crate::decoder::DeviceKind;
use protocol::{Port, TypeId, device_name};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::collections::{BTreeMap, BTreeSet};
use tracing::{debug, info};

/// One light measurement of a color sensor
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LightReading {
    pub hsv: Hsv,
    pub color: ColorName,
    pub intensity: u8,
}

impl LightReading {
    pub fn new(hsv: Hsv, intensity: u8) -> Self {
        Self {
            hsv,
            color: ColorName::from_hsv(hsv),
            intensity,
        }
    }
}

/// Simulated device and its current readings
///
/// Every reading field exists on every device; which ones can actually be
/// read is decided by the device kind, as on real hardware.
#[derive(Debug, Clone, PartialEq)]
pub struct SimDevice {
    pub type_id: TypeId,
    pub angle: i64,
    pub reflected: LightReading,
    pub ambient: LightReading,
    pub distance_pct: u8,
    pub distance_mm: i32,
    pub tilt: (i32, i32),
    pub force: f64,
    pub travel: f64,
}

impl SimDevice {
    pub fn new(type_id: TypeId) -> Self {
        Self {
            type_id,
            angle: 0,
            reflected: LightReading::new(Hsv::new(0, 90, 80), 42),
            ambient: LightReading::new(Hsv::new(210, 40, 25), 12),
            distance_pct: 50,
            distance_mm: 200,
            tilt: (0, 0),
            force: 0.0,
            travel: 0.0,
        }
    }

    pub fn kind(&self) -> DeviceKind {
        DeviceKind::from_type_id(self.type_id)
    }

    /// Move readings along a deterministic sweep
    fn advance(&mut self, tick: u64, motor_step_deg: i64) {
        self.angle += motor_step_deg;

        let hue = (self.reflected.hsv.h + 3) % 360;
        self.reflected = LightReading::new(Hsv { h: hue, ..self.reflected.hsv }, (tick % 101) as u8);
        self.ambient.intensity = (tick / 4 % 101) as u8;
        self.distance_pct = (tick % 101) as u8;
        self.distance_mm = 40 + (tick * 10 % 1960) as i32;

        let swing = (tick % 90) as i32 - 45;
        self.tilt = (swing, -swing / 2);

        let press = (tick % 50) as f64;
        self.force = press / 5.0;
        self.travel = (press / 50.0 * 8.0).min(8.0);
    }
}

/// Orientation sensor state
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ImuState {
    pub heading: f64,
    pub pitch: f64,
    pub roll: f64,
    pub stationary: bool,
    pub up: Side,
}

impl Default for ImuState {
    fn default() -> Self {
        Self {
            heading: 0.0,
            pitch: 0.0,
            roll: 0.0,
            stationary: true,
            up: Side::Top,
        }
    }
}

/// Simulated hub implementing [`PortIo`] and [`HubIo`]
#[derive(Debug)]
pub struct SimulatedHub {
    devices: BTreeMap<Port, SimDevice>,
    /// Devices pulled by random hot-plug, waiting to be re-inserted
    parked: BTreeMap<Port, SimDevice>,
    failures: BTreeMap<Port, String>,
    corruptions: BTreeMap<Port, String>,
    panics: BTreeSet<Port>,
    hub_failure: Option<String>,
    battery_mv: Option<u32>,
    charger: ChargerStatus,
    imu: Option<ImuState>,
    rng: StdRng,
    detach_probability: f64,
    motor_step_deg: i64,
    animate: bool,
}

impl SimulatedHub {
    /// Static hub with battery and orientation sensor and no devices
    pub fn new(seed: u64) -> Self {
        Self {
            devices: BTreeMap::new(),
            parked: BTreeMap::new(),
            failures: BTreeMap::new(),
            corruptions: BTreeMap::new(),
            panics: BTreeSet::new(),
            hub_failure: None,
            battery_mv: Some(7800),
            charger: ChargerStatus::Discharging,
            imu: Some(ImuState::default()),
            rng: StdRng::seed_from_u64(seed),
            detach_probability: 0.0,
            motor_step_deg: 0,
            animate: false,
        }
    }

    /// Build the hub described by the `[hub]` and `[simulation]` sections
    pub fn from_config(config: &AgentConfig) -> Self {
        let sim = &config.simulation;
        let mut hub = Self::new(sim.seed);

        hub.battery_mv = config.hub.battery.then_some(sim.battery_mv);
        hub.charger = ChargerStatus::try_from(sim.charger_status).unwrap_or_default();
        if !config.hub.imu {
            hub.imu = None;
        }
        hub.detach_probability = sim.detach_probability;
        hub.motor_step_deg = sim.motor_step_deg;
        hub.animate = true;

        for device in &sim.devices {
            hub.attach(device.port, SimDevice::new(device.type_id));
        }
        hub
    }

    /// Remove the battery gauge, or install one at the given voltage
    pub fn with_battery(mut self, millivolts: Option<u32>) -> Self {
        self.battery_mv = millivolts;
        self
    }

    /// Remove the orientation sensor
    pub fn without_imu(mut self) -> Self {
        self.imu = None;
        self
    }

    /// Turn on reading animation with the given motor speed per tick
    pub fn with_motion(mut self, motor_step_deg: i64) -> Self {
        self.motor_step_deg = motor_step_deg;
        self.animate = true;
        self
    }

    /// Plug a device into a port, replacing whatever was there
    pub fn attach(&mut self, port: Port, device: SimDevice) {
        debug!(
            "Simulated attach on {}: {} ({})",
            port,
            device.type_id,
            device_name(device.type_id).unwrap_or("unrecognized device")
        );
        self.parked.remove(&port);
        self.devices.insert(port, device);
    }

    /// Unplug the device on a port
    pub fn detach(&mut self, port: Port) -> Option<SimDevice> {
        self.parked.remove(&port);
        self.devices.remove(&port)
    }

    pub fn device(&self, port: Port) -> Option<&SimDevice> {
        self.devices.get(&port)
    }

    pub fn device_mut(&mut self, port: Port) -> Option<&mut SimDevice> {
        self.devices.get_mut(&port)
    }

    /// Make the next read on `port` (type detection included) fail with `ReadFailed`
    pub fn fail_next_read(&mut self, port: Port, reason: impl Into<String>) {
        self.failures.insert(port, reason.into());
    }

    /// Make the next read on `port` (type detection included) return `InvalidReading`
    pub fn corrupt_next_read(&mut self, port: Port, reason: impl Into<String>) {
        self.corruptions.insert(port, reason.into());
    }

    /// Make the next read on `port` panic
    pub fn panic_next_read(&mut self, port: Port) {
        self.panics.insert(port);
    }

    /// Make the next battery or orientation read fail with `ReadFailed`
    pub fn fail_next_hub_read(&mut self, reason: impl Into<String>) {
        self.hub_failure = Some(reason.into());
    }

    pub fn set_battery(&mut self, millivolts: u32, status: ChargerStatus) {
        self.battery_mv = Some(millivolts);
        self.charger = status;
    }

    pub fn set_imu(&mut self, state: ImuState) {
        self.imu = Some(state);
    }

    /// Look up the device on `port` for a reader that only `accepts` some kinds
    fn read(&mut self, port: Port, accepts: fn(DeviceKind) -> bool) -> HwResult<&SimDevice> {
        if self.panics.remove(&port) {
            panic!("simulated driver fault on {}", port);
        }
        if let Some(reason) = self.failures.remove(&port) {
            return Err(HardwareError::ReadFailed {
                what: port.to_string(),
                reason,
            });
        }
        if let Some(reason) = self.corruptions.remove(&port) {
            return Err(HardwareError::InvalidReading {
                what: port.to_string(),
                reason,
            });
        }
        match self.devices.get(&port) {
            Some(device) if accepts(device.kind()) => Ok(device),
            _ => Err(HardwareError::DeviceAbsent { port }),
        }
    }

    fn hub_read(&mut self, what: &str) -> HwResult<()> {
        match self.hub_failure.take() {
            Some(reason) => Err(HardwareError::ReadFailed {
                what: what.to_string(),
                reason,
            }),
            None => Ok(()),
        }
    }

    fn imu_state(&mut self) -> HwResult<ImuState> {
        self.hub_read("imu")?;
        self.imu.ok_or_else(|| HardwareError::ReadFailed {
            what: "imu".to_string(),
            reason: "no orientation sensor".to_string(),
        })
    }

    fn hot_plug(&mut self) {
        let ports: BTreeSet<Port> = self
            .devices
            .keys()
            .chain(self.parked.keys())
            .copied()
            .collect();

        for port in ports {
            if !self.rng.random_bool(self.detach_probability) {
                continue;
            }
            if let Some(device) = self.devices.remove(&port) {
                info!("Simulated unplug on {}", port);
                self.parked.insert(port, device);
            } else if let Some(device) = self.parked.remove(&port) {
                info!("Simulated re-plug on {}", port);
                self.devices.insert(port, device);
            }
        }
    }
}

fn is_light_sensor(kind: DeviceKind) -> bool {
    matches!(kind, DeviceKind::ColorAndDistance | DeviceKind::Color)
}

impl PortIo for SimulatedHub {
    fn probe(&mut self, port: Port) -> HwResult<TypeId> {
        Ok(self.read(port, |_| true)?.type_id)
    }

    fn hsv(&mut self, port: Port, basis: LightBasis) -> HwResult<Hsv> {
        let device = self.read(port, is_light_sensor)?;
        Ok(match basis {
            LightBasis::Reflected => device.reflected.hsv,
            LightBasis::Ambient => device.ambient.hsv,
        })
    }

    fn color(&mut self, port: Port, basis: LightBasis) -> HwResult<ColorName> {
        let device = self.read(port, is_light_sensor)?;
        Ok(match basis {
            LightBasis::Reflected => device.reflected.color,
            LightBasis::Ambient => device.ambient.color,
        })
    }

    fn reflection(&mut self, port: Port) -> HwResult<u8> {
        let device = self.read(port, |kind| {
            is_light_sensor(kind) || kind == DeviceKind::Infrared
        })?;
        Ok(device.reflected.intensity)
    }

    fn ambient(&mut self, port: Port) -> HwResult<u8> {
        Ok(self.read(port, is_light_sensor)?.ambient.intensity)
    }

    fn distance_percent(&mut self, port: Port) -> HwResult<u8> {
        let device = self.read(port, |kind| {
            matches!(kind, DeviceKind::ColorAndDistance | DeviceKind::Infrared)
        })?;
        Ok(device.distance_pct)
    }

    fn distance_mm(&mut self, port: Port) -> HwResult<i32> {
        Ok(self
            .read(port, |kind| kind == DeviceKind::Ultrasonic)?
            .distance_mm)
    }

    fn tilt(&mut self, port: Port) -> HwResult<(i32, i32)> {
        Ok(self.read(port, |kind| kind == DeviceKind::Tilt)?.tilt)
    }

    fn force(&mut self, port: Port) -> HwResult<f64> {
        Ok(self.read(port, |kind| kind == DeviceKind::Force)?.force)
    }

    fn travel(&mut self, port: Port) -> HwResult<f64> {
        Ok(self.read(port, |kind| kind == DeviceKind::Force)?.travel)
    }

    fn angle(&mut self, port: Port) -> HwResult<i64> {
        Ok(self
            .read(port, |kind| kind == DeviceKind::RotationMotor)?
            .angle)
    }
}

impl HubIo for SimulatedHub {
    fn has_battery(&self) -> bool {
        self.battery_mv.is_some()
    }

    fn has_imu(&self) -> bool {
        self.imu.is_some()
    }

    fn battery_voltage(&mut self) -> HwResult<u32> {
        self.hub_read("battery")?;
        self.battery_mv.ok_or_else(|| HardwareError::ReadFailed {
            what: "battery".to_string(),
            reason: "no battery gauge".to_string(),
        })
    }

    fn charger_status(&mut self) -> HwResult<ChargerStatus> {
        Ok(self.charger)
    }

    fn heading(&mut self) -> HwResult<f64> {
        Ok(self.imu_state()?.heading)
    }

    fn imu_tilt(&mut self) -> HwResult<(f64, f64)> {
        let state = self.imu_state()?;
        Ok((state.pitch, state.roll))
    }

    fn stationary(&mut self) -> HwResult<bool> {
        Ok(self.imu_state()?.stationary)
    }

    fn up(&mut self) -> HwResult<Side> {
        Ok(self.imu_state()?.up)
    }

    fn begin_tick(&mut self, tick: u64) {
        if !self.animate {
            return;
        }
        if self.detach_probability > 0.0 {
            self.hot_plug();
        }
        for device in self.devices.values_mut() {
            device.advance(tick, self.motor_step_deg);
        }
        if let Some(imu) = self.imu.as_mut() {
            imu.heading = (imu.heading + 1.5) % 360.0;
            imu.stationary = self.motor_step_deg == 0;
        }
    }
}
