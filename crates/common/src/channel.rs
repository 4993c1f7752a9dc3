//! Async channel bridge between the Tokio runtime and the telemetry thread
//!
//! Two independent links cross the thread boundary:
//! - the control bridge ([`AgentBridge`] / [`AgentWorker`]) carrying
//!   commands to the worker and events back
//! - the chunk link ([`ChannelTransport`]) carrying transport-sized slices
//!   of each composite message to the host side

use async_channel::{Receiver, Sender, TrySendError, bounded};
use bytes::Bytes;
use protocol::{ProtocolError, Transport};

/// Commands from the Tokio runtime to the telemetry thread
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AgentCommand {
    /// Store a Mode Selector byte for the port at `index`
    SetMode { index: usize, value: u8 },

    /// Stop after the current tick
    Shutdown,
}

/// Events from the telemetry thread
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AgentEvent {
    /// A session produced a fault instead of a record
    Fault {
        /// Session label (`Port.A`, `battery`, `imu`)
        session: String,
        /// Human-readable fault description
        reason: String,
    },

    /// Chunks were rejected by the transport during a tick
    ChunksDropped {
        /// Tick number
        tick: u64,
        /// Number of rejected chunks
        chunks: usize,
    },

    /// The worker loop exited
    Stopped {
        /// Ticks completed
        ticks: u64,
    },
}

/// Handle for Tokio runtime (async)
#[derive(Clone)]
pub struct AgentBridge {
    cmd_tx: Sender<AgentCommand>,
    event_rx: Receiver<AgentEvent>,
}

impl AgentBridge {
    /// Send a command to the telemetry thread
    pub async fn send_command(&self, cmd: AgentCommand) -> crate::Result<()> {
        self.cmd_tx
            .send(cmd)
            .await
            .map_err(|e| crate::Error::Channel(e.to_string()))
    }

    /// Receive an event from the telemetry thread
    pub async fn recv_event(&self) -> crate::Result<AgentEvent> {
        self.event_rx
            .recv()
            .await
            .map_err(|e| crate::Error::Channel(e.to_string()))
    }
}

/// Handle for the telemetry thread (non-blocking)
pub struct AgentWorker {
    cmd_rx: Receiver<AgentCommand>,
    event_tx: Sender<AgentEvent>,
}

impl AgentWorker {
    /// Try to receive a command without blocking
    pub fn try_recv_command(&self) -> Option<AgentCommand> {
        self.cmd_rx.try_recv().ok()
    }

    /// Send an event without blocking
    ///
    /// Events are advisory: if the runtime is not draining them the event is
    /// dropped rather than stalling the tick loop.
    pub fn try_send_event(&self, event: AgentEvent) -> crate::Result<()> {
        self.event_tx
            .try_send(event)
            .map_err(|e| crate::Error::Channel(e.to_string()))
    }
}

/// Create the control bridge between Tokio and the telemetry thread
///
/// Returns (AgentBridge for Tokio, AgentWorker for the telemetry thread)
pub fn create_agent_bridge() -> (AgentBridge, AgentWorker) {
    let (cmd_tx, cmd_rx) = bounded(16);
    let (event_tx, event_rx) = bounded(256);

    (
        AgentBridge { cmd_tx, event_rx },
        AgentWorker { cmd_rx, event_tx },
    )
}

/// Transport that hands chunks to a bounded channel
///
/// A full channel is back-pressure: the chunk is refused, never queued.
#[derive(Debug, Clone)]
pub struct ChannelTransport {
    tx: Sender<Bytes>,
    capacity: usize,
}

impl Transport for ChannelTransport {
    fn capacity(&self) -> usize {
        self.capacity
    }

    fn write(&mut self, chunk: &[u8]) -> protocol::Result<()> {
        if chunk.len() > self.capacity {
            return Err(ProtocolError::TransportOverflow {
                size: chunk.len(),
                capacity: self.capacity,
            });
        }
        self.tx
            .try_send(Bytes::copy_from_slice(chunk))
            .map_err(|e| match e {
                TrySendError::Full(_) => ProtocolError::Backpressure { size: chunk.len() },
                TrySendError::Closed(_) => ProtocolError::TransportClosed,
            })
    }
}

/// Create the chunk link
///
/// `depth` is how many chunks may be in flight; `chunk_capacity` is the
/// largest single write accepted.
pub fn create_chunk_channel(depth: usize, chunk_capacity: usize) -> (ChannelTransport, Receiver<Bytes>) {
    let (tx, rx) = bounded(depth.max(1));
    (
        ChannelTransport {
            tx,
            capacity: chunk_capacity,
        },
        rx,
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_channel_bridge() {
        let (bridge, worker) = create_agent_bridge();

        let handle = std::thread::spawn(move || {
            let cmd = loop {
                if let Some(cmd) = worker.try_recv_command() {
                    break cmd;
                }
                std::thread::sleep(std::time::Duration::from_millis(1));
            };
            worker
                .try_send_event(AgentEvent::Stopped { ticks: 3 })
                .unwrap();
            cmd
        });

        bridge.send_command(AgentCommand::Shutdown).await.unwrap();
        assert_eq!(
            bridge.recv_event().await.unwrap(),
            AgentEvent::Stopped { ticks: 3 }
        );
        assert_eq!(handle.join().unwrap(), AgentCommand::Shutdown);
    }

    #[test]
    fn test_channel_transport_backpressure() {
        let (mut transport, rx) = create_chunk_channel(1, 19);

        assert!(transport.write(b"first").is_ok());
        assert!(matches!(
            transport.write(b"second"),
            Err(ProtocolError::Backpressure { size: 6 })
        ));
        assert_eq!(&rx.try_recv().unwrap()[..], b"first");
    }

    #[test]
    fn test_channel_transport_overflow_and_close() {
        let (mut transport, rx) = create_chunk_channel(4, 4);
        assert!(matches!(
            transport.write(b"12345"),
            Err(ProtocolError::TransportOverflow {
                size: 5,
                capacity: 4
            })
        ));

        drop(rx);
        assert!(matches!(
            transport.write(b"1234"),
            Err(ProtocolError::TransportClosed)
        ));
    }
}
