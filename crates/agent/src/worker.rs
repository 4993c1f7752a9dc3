//! Telemetry worker thread
//!
//! Dedicated thread that owns the scheduler and the transport. Each loop
//! iteration drains pending commands from the Tokio runtime, runs one tick,
//! hands the composite message to the frame writer and then sleeps for the
//! tick period. Faults and dropped chunks are reported back as events;
//! neither ever stops the loop.

use crate::hub::Hardware;
use crate::scheduler::Scheduler;
use common::{AgentCommand, AgentEvent, AgentWorker, ModeWriter};
use protocol::{FrameWriter, Transport};
use std::time::Duration;
use tracing::{debug, info, warn};

/// Loop timing
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WorkerOptions {
    /// Delay between the end of one tick and the start of the next
    pub tick_period: Duration,
    /// Stop on its own after this many ticks
    pub max_ticks: Option<u64>,
}

impl Default for WorkerOptions {
    fn default() -> Self {
        Self {
            tick_period: Duration::from_millis(100),
            max_ticks: None,
        }
    }
}

/// Telemetry worker
///
/// Owns everything the tick loop touches so no locking is needed on the
/// hot path. The only shared state is the Mode Channel.
pub struct TelemetryWorker<H: Hardware, T: Transport> {
    scheduler: Scheduler<H>,
    writer: FrameWriter,
    transport: T,
    modes: ModeWriter,
    worker: AgentWorker,
    options: WorkerOptions,
}

impl<H: Hardware, T: Transport> TelemetryWorker<H, T> {
    pub fn new(
        scheduler: Scheduler<H>,
        writer: FrameWriter,
        transport: T,
        modes: ModeWriter,
        worker: AgentWorker,
        options: WorkerOptions,
    ) -> Self {
        Self {
            scheduler,
            writer,
            transport,
            modes,
            worker,
            options,
        }
    }

    /// Run the tick loop until shutdown or `max_ticks`
    ///
    /// Returns the number of ticks completed.
    pub fn run(mut self) -> u64 {
        info!(
            "Telemetry worker started (tick period {:?})",
            self.options.tick_period
        );

        'ticks: loop {
            // Drain every pending command before the tick starts
            while let Some(cmd) = self.worker.try_recv_command() {
                match cmd {
                    AgentCommand::Shutdown => {
                        info!("Telemetry worker shutting down");
                        break 'ticks;
                    }
                    AgentCommand::SetMode { index, value } => {
                        debug!("Mode selector {} set to {}", index, value);
                        self.modes.set(index, value);
                    }
                }
            }

            let report = self.scheduler.tick_with_report();

            for (session, kind) in report.faults {
                self.emit(AgentEvent::Fault {
                    session,
                    reason: kind.to_string(),
                });
            }

            let sent = self.writer.send(&report.message, &mut self.transport);
            if !sent.is_complete() {
                warn!(
                    "Tick {}: {} of {} chunks dropped ({} bytes), last error: {:?}",
                    report.tick,
                    sent.chunks_dropped,
                    sent.chunks_dropped + sent.chunks_written,
                    sent.bytes_dropped,
                    sent.last_error
                );
                self.emit(AgentEvent::ChunksDropped {
                    tick: report.tick,
                    chunks: sent.chunks_dropped,
                });
            }

            if let Some(max) = self.options.max_ticks
                && self.scheduler.ticks() >= max
            {
                info!("Reached {} ticks, stopping", max);
                break;
            }

            if !self.options.tick_period.is_zero() {
                std::thread::sleep(self.options.tick_period);
            }
        }

        let ticks = self.scheduler.ticks();
        self.emit(AgentEvent::Stopped { ticks });
        info!("Telemetry worker stopped after {} ticks", ticks);
        ticks
    }

    fn emit(&self, event: AgentEvent) {
        if let Err(e) = self.worker.try_send_event(event) {
            debug!("Event dropped: {}", e);
        }
    }
}

/// Spawn the telemetry worker on its own thread
pub fn spawn_telemetry_worker<H, T>(worker: TelemetryWorker<H, T>) -> std::thread::JoinHandle<u64>
where
    H: Hardware + Send + 'static,
    T: Transport + Send + 'static,
{
    std::thread::Builder::new()
        .name("telemetry-worker".to_string())
        .spawn(move || worker.run())
        .expect("Failed to spawn telemetry worker thread")
}
