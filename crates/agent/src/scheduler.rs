//! Cooperative polling scheduler
//!
//! Drives every session exactly once per tick in a fixed order: Port
//! Sessions in port declaration order, then the battery task, then the
//! orientation task. Nothing runs concurrently and nothing is preempted;
//! a session only gives up control by returning from `step`.
//!
//! A tick never fails. Each step runs under `catch_unwind`, so a panicking
//! decoder costs its own record for that tick and nothing else.

use crate::hub::Hardware;
use crate::session::{
    BatteryTask, FaultKind, ImuTask, PortSession, Session, StepResult, TickContext,
};
use common::ModeReader;
use protocol::{CompositeMessage, Port};
use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use tracing::{error, info, trace, warn};

/// Which hub tasks to run and how often the battery reports
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SchedulerOptions {
    pub battery: bool,
    pub imu: bool,
    pub battery_interval_ticks: u64,
}

impl Default for SchedulerOptions {
    fn default() -> Self {
        Self {
            battery: true,
            imu: true,
            battery_interval_ticks: 100,
        }
    }
}

/// Result of one tick
#[derive(Debug, Clone)]
pub struct TickReport {
    /// Tick number, starting at 0
    pub tick: u64,
    /// Records to transmit, in scheduler order
    pub message: CompositeMessage,
    /// Sessions that faulted this tick, with the reason
    pub faults: Vec<(String, FaultKind)>,
}

/// Round-robin driver of all sessions
pub struct Scheduler<H: Hardware> {
    hw: H,
    modes: ModeReader,
    sessions: Vec<Box<dyn Session + Send>>,
    tick: u64,
}

impl<H: Hardware> Scheduler<H> {
    /// Create one Port Session per port plus the hub tasks the hardware has
    ///
    /// Battery and orientation presence is checked here, once.
    pub fn new(hw: H, modes: ModeReader, ports: &[Port], options: SchedulerOptions) -> Self {
        if modes.len() != ports.len() {
            warn!(
                "Mode channel has {} slots for {} ports",
                modes.len(),
                ports.len()
            );
        }

        let mut sessions: Vec<Box<dyn Session + Send>> = ports
            .iter()
            .enumerate()
            .map(|(index, port)| Box::new(PortSession::new(*port, index)) as Box<dyn Session + Send>)
            .collect();

        if options.battery && hw.has_battery() {
            sessions.push(Box::new(BatteryTask::new(options.battery_interval_ticks)));
        } else if options.battery {
            info!("No battery gauge on this hub, battery task disabled");
        }

        if options.imu && hw.has_imu() {
            sessions.push(Box::new(ImuTask::new()));
        } else if options.imu {
            info!("No orientation sensor on this hub, imu task disabled");
        }

        info!("Scheduler ready with {} sessions", sessions.len());

        Self {
            hw,
            modes,
            sessions,
            tick: 0,
        }
    }

    /// Run one tick and return the composite message
    pub fn tick(&mut self) -> CompositeMessage {
        self.tick_with_report().message
    }

    /// Run one tick and return the message along with any faults
    pub fn tick_with_report(&mut self) -> TickReport {
        let tick = self.tick;
        self.hw.begin_tick(tick);

        let mut message = CompositeMessage::new();
        let mut faults = Vec::new();
        let mut ctx = TickContext {
            hw: &mut self.hw,
            modes: &self.modes,
            tick,
        };

        for session in self.sessions.iter_mut() {
            // Wrap in catch_unwind so one faulty session cannot stop the tick
            let result = panic::catch_unwind(AssertUnwindSafe(|| session.step(&mut ctx)));

            match result {
                Ok(StepResult::Record(records)) => message.extend(records),
                Ok(StepResult::NoRecord) => {}
                Ok(StepResult::Fault(kind)) => {
                    warn!("Tick {}: {} {}", tick, session.name(), kind);
                    faults.push((session.name(), kind));
                }
                Err(payload) => {
                    let kind = FaultKind::Panicked(panic_message(&*payload));
                    error!("Tick {}: {} {}", tick, session.name(), kind);
                    session.recover();
                    faults.push((session.name(), kind));
                }
            }
        }

        trace!("Tick {}: {} records", tick, message.len());
        self.tick += 1;

        TickReport {
            tick,
            message,
            faults,
        }
    }

    /// Ticks completed so far
    pub fn ticks(&self) -> u64 {
        self.tick
    }

    /// Session labels in drive order
    pub fn session_names(&self) -> Vec<String> {
        self.sessions.iter().map(|s| s.name()).collect()
    }

    pub fn hardware(&self) -> &H {
        &self.hw
    }

    pub fn hardware_mut(&mut self) -> &mut H {
        &mut self.hw
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    }
}
