//! Hub telemetry agent
//!
//! Polls every port of a programmable hub on a fixed tick, decodes whatever
//! device is attached according to its host-selected mode, adds battery and
//! orientation reports, and streams the result as one composite text message
//! per tick over a transport that accepts small chunks.
//!
//! The pieces, bottom-up:
//! - [`hub`]: the hardware collaborator traits and a simulated hub
//! - [`decoder`]: type id dispatch and per-device decoding
//! - [`session`]: Port Sessions and the battery/orientation hub tasks
//! - [`scheduler`]: the cooperative tick loop over all sessions
//! - [`worker`]: the dedicated thread that ticks, frames and transmits
//! - [`config`]: TOML configuration

pub mod config;
pub mod decoder;
pub mod hub;
pub mod scheduler;
pub mod session;
pub mod worker;

pub use config::AgentConfig;
pub use decoder::{Decoder, DeviceKind};
pub use hub::{Hardware, HardwareError, HubIo, PortIo, SimDevice, SimulatedHub};
pub use scheduler::{Scheduler, SchedulerOptions, TickReport};
pub use session::{BatteryTask, FaultKind, ImuTask, PortSession, Session, StepResult};
pub use worker::{TelemetryWorker, WorkerOptions, spawn_telemetry_worker};
