//! Hub telemetry agent
//!
//! Runs the telemetry core against the simulated hub and prints the stream
//! the host would receive, either as raw bytes or decoded per port.

use agent::config::AgentConfig;
use agent::hub::SimulatedHub;
use agent::scheduler::{Scheduler, SchedulerOptions};
use agent::worker::{TelemetryWorker, WorkerOptions, spawn_telemetry_worker};
use anyhow::{Context, Result, anyhow};
use async_channel::Receiver;
use bytes::Bytes;
use clap::Parser;
use common::{
    AgentBridge, AgentCommand, AgentEvent, create_agent_bridge, create_chunk_channel,
    mode_channel, setup_logging,
};
use protocol::{FrameWriter, HubView, LineAssembler, Port, Record, device_name};
use std::time::Duration;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::signal;
use tracing::{error, info, warn};

#[derive(Parser, Debug)]
#[command(name = "hub-telemetry")]
#[command(
    author,
    version,
    about = "Hub telemetry agent - stream port, battery and orientation readings"
)]
#[command(long_about = "
Polls every port of the hub on a fixed tick, decodes the attached devices and
streams one composite text record set per tick in 19-byte chunks.

EXAMPLES:
    # Run with default config, raw stream on stdout
    hub-telemetry

    # Decode the stream and print one line per port
    hub-telemetry --decode

    # Put the device on Port.B into its second mode, stop after 50 ticks
    hub-telemetry --mode B=1 --ticks 50

    # Step every multi-mode device to its next mode every 2 seconds
    hub-telemetry --decode --cycle-modes 2

CONFIGURATION:
    The agent looks for configuration files in the following order:
    1. Path specified with --config
    2. ~/.config/hub-telemetry/agent.toml
    3. /etc/hub-telemetry/agent.toml
    4. Built-in defaults
")]
struct Args {
    /// Path to configuration file
    #[arg(short, long, value_name = "PATH")]
    config: Option<std::path::PathBuf>,

    /// Save default configuration to default location and exit
    #[arg(long)]
    save_config: bool,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, value_name = "LEVEL")]
    log_level: Option<String>,

    /// Stop after this many ticks
    #[arg(long, value_name = "N")]
    ticks: Option<u64>,

    /// Initial mode selector, repeatable (e.g. B=1)
    #[arg(short, long, value_name = "PORT=VALUE")]
    mode: Vec<String>,

    /// Print decoded records instead of the raw stream
    #[arg(short, long)]
    decode: bool,

    /// Advance every multi-mode device to its next mode at this interval
    #[arg(long, value_name = "SECONDS")]
    cycle_modes: Option<u64>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Handle --save-config flag early (before loading config)
    if args.save_config {
        let config = AgentConfig::default();
        let path = AgentConfig::default_path();
        config.save(&path).context("Failed to save configuration")?;
        println!("Configuration saved to: {}", path.display());
        return Ok(());
    }

    let config = if let Some(ref path) = args.config {
        AgentConfig::load(Some(path.clone())).context("Failed to load configuration")?
    } else {
        AgentConfig::load_or_default()
    };

    let log_level = args
        .log_level
        .as_deref()
        .unwrap_or(&config.agent.log_level);

    setup_logging(log_level).context("Failed to setup logging")?;

    info!("Hub telemetry agent v{}", env!("CARGO_PKG_VERSION"));
    info!("Log level: {}", log_level);

    let ports = config.hub.ports.clone();
    let (mode_writer, mode_reader) = mode_channel(ports.len());
    for (index, value) in config.mode_presets() {
        mode_writer.set(index, value);
    }
    for arg in &args.mode {
        let (port, value) = parse_mode_arg(arg)?;
        let index = config
            .port_index(port)
            .ok_or_else(|| anyhow!("{} is not a port of this hub", port))?;
        mode_writer.set(index, value);
    }

    let hub = SimulatedHub::from_config(&config);
    let scheduler = Scheduler::new(
        hub,
        mode_reader,
        &ports,
        SchedulerOptions {
            battery: config.hub.battery,
            imu: config.hub.imu,
            battery_interval_ticks: config.scheduler.battery_interval_ticks,
        },
    );

    let (transport, chunks) =
        create_chunk_channel(config.transport.queue_depth, config.transport.chunk_size);
    let writer =
        FrameWriter::new(config.transport.chunk_size).context("Invalid transport chunk size")?;

    let (bridge, worker) = create_agent_bridge();
    let worker_handle = spawn_telemetry_worker(TelemetryWorker::new(
        scheduler,
        writer,
        transport,
        mode_writer,
        worker,
        WorkerOptions {
            tick_period: config.scheduler.tick_period(),
            max_ticks: args.ticks,
        },
    ));

    let host = tokio::spawn(host_link(
        chunks,
        bridge.clone(),
        ports,
        args.decode,
        args.cycle_modes.map(Duration::from_secs),
    ));

    tokio::select! {
        _ = signal::ctrl_c() => {
            info!("Received Ctrl+C, shutting down...");
            if let Err(e) = bridge.send_command(AgentCommand::Shutdown).await {
                error!("Error shutting down telemetry worker: {:#}", e);
            }
        }
        _ = watch_events(bridge.clone()) => {}
    }

    match worker_handle.join() {
        Ok(ticks) => info!("Telemetry worker finished after {} ticks", ticks),
        Err(e) => error!("Telemetry worker thread panicked: {:?}", e),
    }

    // The worker dropped its end of the chunk link, so the host side drains and exits
    if let Err(e) = host.await {
        error!("Host link task failed: {}", e);
    }

    info!("Agent stopped");
    Ok(())
}

/// Log worker events until the worker reports that it stopped
async fn watch_events(bridge: AgentBridge) {
    loop {
        match bridge.recv_event().await {
            Ok(AgentEvent::Fault { session, reason }) => {
                warn!("{}: {}", session, reason);
            }
            Ok(AgentEvent::ChunksDropped { tick, chunks }) => {
                warn!("Tick {}: host link dropped {} chunks", tick, chunks);
            }
            Ok(AgentEvent::Stopped { ticks }) => {
                info!("Telemetry worker stopped after {} ticks", ticks);
                return;
            }
            Err(e) => {
                error!("Event channel closed: {}", e);
                return;
            }
        }
    }
}

/// Stand-in for the connected host: consume chunks and print them
async fn host_link(
    chunks: Receiver<Bytes>,
    bridge: AgentBridge,
    ports: Vec<Port>,
    decode: bool,
    cycle: Option<Duration>,
) {
    let mut stdout = tokio::io::stdout();
    let mut assembler = LineAssembler::new();
    let mut view = HubView::new(&ports);

    // A disabled cycle still needs a timer to select on
    let mut cycle_timer = tokio::time::interval(cycle.unwrap_or(Duration::from_secs(3600)));
    cycle_timer.tick().await;

    loop {
        tokio::select! {
            chunk = chunks.recv() => {
                let Ok(chunk) = chunk else {
                    break;
                };
                if !decode {
                    if let Err(e) = forward_chunk(&mut stdout, &chunk).await {
                        error!("Failed to write to stdout: {}", e);
                        break;
                    }
                    continue;
                }

                assembler.push(&chunk);
                while let Some(parsed) = assembler.next_record() {
                    match parsed {
                        Ok(record) => {
                            view.apply(&record);
                            println!("{}", describe(&record));
                        }
                        Err(e) => warn!("Unparseable line from hub: {}", e),
                    }
                }
            }
            _ = cycle_timer.tick(), if cycle.is_some() => {
                for (index, port) in ports.iter().enumerate() {
                    if let Some(value) = view.next_mode(*port) {
                        info!("Switching {} to mode {}", port, value);
                        if let Err(e) = bridge
                            .send_command(AgentCommand::SetMode { index, value })
                            .await
                        {
                            warn!("Mode change for {} not delivered: {}", port, e);
                        }
                    }
                }
            }
        }
    }
}

/// Write one raw chunk and push it out immediately
async fn forward_chunk<W: AsyncWrite + Unpin>(out: &mut W, chunk: &[u8]) -> std::io::Result<()> {
    out.write_all(chunk).await?;
    out.flush().await
}

/// Human-readable rendering of one record
fn describe(record: &Record) -> String {
    let name = |type_id| device_name(type_id).unwrap_or("Unknown device");
    match record {
        Record::PortEmpty { port } => format!("{}  (empty)", port),
        Record::ModeList {
            port,
            type_id,
            modes,
        } => format!("{}  {} modes: {}", port, name(*type_id), modes.join(", ")),
        Record::Data {
            port,
            type_id,
            fields,
        } => {
            let data: Vec<String> = fields.iter().map(|f| f.to_string()).collect();
            format!("{}  {}  {}", port, name(*type_id), data.join(" "))
        }
        Record::Unknown { port, type_id } => format!("{}  unknown device {}", port, type_id),
        Record::Battery { .. } | Record::Imu { .. } => record.to_string(),
    }
}

/// Parse `PORT=VALUE`, where PORT is a letter or `Port.X`
fn parse_mode_arg(arg: &str) -> Result<(Port, u8)> {
    let (port, value) = arg
        .split_once('=')
        .ok_or_else(|| anyhow!("Invalid mode '{}', expected PORT=VALUE", arg))?;
    let port: Port = port
        .trim()
        .parse()
        .with_context(|| format!("Invalid port in mode '{}'", arg))?;
    let value: u8 = value
        .trim()
        .parse()
        .with_context(|| format!("Invalid mode value in '{}'", arg))?;
    Ok((port, value))
}
