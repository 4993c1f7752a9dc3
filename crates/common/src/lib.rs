//! Common utilities for hub telemetry
//!
//! This crate provides shared functionality between the telemetry agent and
//! host-side tooling, including error handling, logging setup, the Mode
//! Channel, and the async channel bridge for the telemetry thread.

pub mod channel;
pub mod error;
pub mod logging;
pub mod mode_channel;
pub mod test_utils;

pub use channel::{
    AgentBridge, AgentCommand, AgentEvent, AgentWorker, ChannelTransport, create_agent_bridge,
    create_chunk_channel,
};
pub use error::{Error, Result};
pub use logging::setup_logging;
pub use mode_channel::{ModeReader, ModeWriter, mode_channel};
