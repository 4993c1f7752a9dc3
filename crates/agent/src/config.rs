//! Agent configuration management

use anyhow::{Context, Result, anyhow};
use protocol::{DEFAULT_CHUNK_SIZE, Port, TypeId};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentConfig {
    pub agent: AgentSettings,
    pub hub: HubSettings,
    #[serde(default)]
    pub scheduler: SchedulerSettings,
    #[serde(default)]
    pub transport: TransportSettings,
    /// Simulated hardware used when no real hub drivers are present
    #[serde(default)]
    pub simulation: SimulationSettings,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentSettings {
    pub log_level: String,
}

/// Hub variant description
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HubSettings {
    /// Ports in declaration order (also the Mode Channel order)
    pub ports: Vec<Port>,
    /// Run the battery task if the hub has a battery gauge
    #[serde(default = "default_true")]
    pub battery: bool,
    /// Run the orientation task if the hub has an IMU
    #[serde(default = "default_true")]
    pub imu: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerSettings {
    /// Tick period in milliseconds
    #[serde(default = "SchedulerSettings::default_tick_ms")]
    pub tick_ms: u64,
    /// Battery report interval, counted in ticks
    #[serde(default = "SchedulerSettings::default_battery_interval")]
    pub battery_interval_ticks: u64,
}

impl Default for SchedulerSettings {
    fn default() -> Self {
        Self {
            tick_ms: Self::default_tick_ms(),
            battery_interval_ticks: Self::default_battery_interval(),
        }
    }
}

impl SchedulerSettings {
    fn default_tick_ms() -> u64 {
        100
    }

    fn default_battery_interval() -> u64 {
        100 // 10 seconds at the default tick
    }

    pub fn tick_period(&self) -> Duration {
        Duration::from_millis(self.tick_ms)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransportSettings {
    /// Largest single write the host link accepts
    #[serde(default = "TransportSettings::default_chunk_size")]
    pub chunk_size: usize,
    /// Chunks that may be in flight to the host before writes are refused
    #[serde(default = "TransportSettings::default_queue_depth")]
    pub queue_depth: usize,
}

impl Default for TransportSettings {
    fn default() -> Self {
        Self {
            chunk_size: Self::default_chunk_size(),
            queue_depth: Self::default_queue_depth(),
        }
    }
}

impl TransportSettings {
    fn default_chunk_size() -> usize {
        DEFAULT_CHUNK_SIZE
    }

    fn default_queue_depth() -> usize {
        256
    }
}

/// A device plugged into the simulated hub at startup
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SimDeviceConfig {
    pub port: Port,
    pub type_id: TypeId,
    /// Initial Mode Selector for this port
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mode: Option<u8>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimulationSettings {
    #[serde(default)]
    pub seed: u64,
    /// Per-tick chance that a port is unplugged or re-plugged
    #[serde(default)]
    pub detach_probability: f64,
    /// Motor rotation per tick, degrees
    #[serde(default = "SimulationSettings::default_motor_step")]
    pub motor_step_deg: i64,
    #[serde(default = "SimulationSettings::default_battery_mv")]
    pub battery_mv: u32,
    /// Charger status code (0 discharging, 1 charging, 2 complete, 3 fault)
    #[serde(default)]
    pub charger_status: u8,
    #[serde(default)]
    pub devices: Vec<SimDeviceConfig>,
}

impl Default for SimulationSettings {
    fn default() -> Self {
        Self {
            seed: 0,
            detach_probability: 0.0,
            motor_step_deg: Self::default_motor_step(),
            battery_mv: Self::default_battery_mv(),
            charger_status: 0,
            devices: Vec::new(),
        }
    }
}

impl SimulationSettings {
    fn default_motor_step() -> i64 {
        15
    }

    fn default_battery_mv() -> u32 {
        7800
    }
}

fn default_true() -> bool {
    true
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            agent: AgentSettings {
                log_level: "info".to_string(),
            },
            hub: HubSettings {
                ports: Port::ALL.to_vec(),
                battery: true,
                imu: true,
            },
            scheduler: SchedulerSettings::default(),
            transport: TransportSettings::default(),
            simulation: SimulationSettings {
                devices: vec![
                    SimDeviceConfig {
                        port: Port::A,
                        type_id: 48,
                        mode: None,
                    },
                    SimDeviceConfig {
                        port: Port::B,
                        type_id: 61,
                        mode: None,
                    },
                    SimDeviceConfig {
                        port: Port::C,
                        type_id: 62,
                        mode: None,
                    },
                ],
                ..SimulationSettings::default()
            },
        }
    }
}

impl AgentConfig {
    /// Load configuration from the specified path
    pub fn load(path: Option<PathBuf>) -> Result<Self> {
        let config_path = if let Some(p) = path {
            expand_path(&p)
        } else {
            // Try standard locations in order
            let candidates = vec![
                Self::default_path(),
                PathBuf::from("/etc/hub-telemetry/agent.toml"),
            ];

            candidates
                .into_iter()
                .find(|p| p.exists())
                .ok_or_else(|| anyhow!("No configuration file found, using defaults"))?
        };

        let content = fs::read_to_string(&config_path)
            .with_context(|| format!("Failed to read config file: {}", config_path.display()))?;

        let config: AgentConfig = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", config_path.display()))?;

        config.validate()?;

        tracing::info!("Loaded configuration from: {}", config_path.display());
        Ok(config)
    }

    /// Load configuration or return defaults if not found
    pub fn load_or_default() -> Self {
        match Self::load(None) {
            Ok(config) => config,
            Err(e) => {
                tracing::warn!("Failed to load config: {}, using defaults", e);
                Self::default()
            }
        }
    }

    /// Save configuration to the specified path
    pub fn save(&self, path: &Path) -> Result<()> {
        let content = toml::to_string_pretty(self).context("Failed to serialize configuration")?;

        // Create parent directories if they don't exist
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).with_context(|| {
                format!("Failed to create config directory: {}", parent.display())
            })?;
        }

        fs::write(path, content)
            .with_context(|| format!("Failed to write config file: {}", path.display()))?;

        tracing::info!("Saved configuration to: {}", path.display());
        Ok(())
    }

    /// Get the default configuration file path
    pub fn default_path() -> PathBuf {
        if let Some(config_dir) = dirs::config_dir() {
            config_dir.join("hub-telemetry").join("agent.toml")
        } else {
            PathBuf::from(".config/hub-telemetry/agent.toml")
        }
    }

    /// Mode Channel index of a port
    pub fn port_index(&self, port: Port) -> Option<usize> {
        self.hub.ports.iter().position(|p| *p == port)
    }

    /// Initial Mode Selector values from the simulation section, as (index, value)
    pub fn mode_presets(&self) -> Vec<(usize, u8)> {
        self.simulation
            .devices
            .iter()
            .filter_map(|d| Some((self.port_index(d.port)?, d.mode?)))
            .collect()
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<()> {
        // Validate log level
        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.agent.log_level.as_str()) {
            return Err(anyhow!(
                "Invalid log level '{}', must be one of: {}",
                self.agent.log_level,
                valid_levels.join(", ")
            ));
        }

        // Hub variants have 2, 4 or 6 ports
        let ports = &self.hub.ports;
        if ![2, 4, 6].contains(&ports.len()) {
            return Err(anyhow!(
                "Invalid port count {}, hubs have 2, 4 or 6 ports",
                ports.len()
            ));
        }
        let unique: BTreeSet<Port> = ports.iter().copied().collect();
        if unique.len() != ports.len() {
            return Err(anyhow!("Duplicate port in hub.ports"));
        }

        if self.scheduler.tick_ms == 0 {
            return Err(anyhow!("scheduler.tick_ms must be greater than 0"));
        }
        if self.scheduler.battery_interval_ticks == 0 {
            return Err(anyhow!(
                "scheduler.battery_interval_ticks must be greater than 0"
            ));
        }
        if self.transport.chunk_size == 0 {
            return Err(anyhow!("transport.chunk_size must be greater than 0"));
        }
        if self.transport.queue_depth == 0 {
            return Err(anyhow!("transport.queue_depth must be greater than 0"));
        }

        self.validate_simulation()
    }

    fn validate_simulation(&self) -> Result<()> {
        let sim = &self.simulation;
        if !(0.0..=1.0).contains(&sim.detach_probability) {
            return Err(anyhow!(
                "Invalid detach_probability {}, must be between 0.0 and 1.0",
                sim.detach_probability
            ));
        }
        if sim.charger_status > 3 {
            return Err(anyhow!(
                "Invalid charger_status {}, must be 0-3",
                sim.charger_status
            ));
        }

        let mut seen = BTreeSet::new();
        for device in &sim.devices {
            if self.port_index(device.port).is_none() {
                return Err(anyhow!(
                    "Simulated device on {} but the hub has no such port",
                    device.port
                ));
            }
            if !seen.insert(device.port) {
                return Err(anyhow!("More than one simulated device on {}", device.port));
            }
        }

        Ok(())
    }
}

/// Expand `~` in a user-supplied path
pub fn expand_path(path: &Path) -> PathBuf {
    PathBuf::from(shellexpand::tilde(&path.to_string_lossy()).as_ref())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = AgentConfig::default();
        assert_eq!(config.agent.log_level, "info");
        assert_eq!(config.hub.ports.len(), 6);
        assert_eq!(config.scheduler.tick_ms, 100);
        assert_eq!(config.scheduler.battery_interval_ticks, 100);
        assert_eq!(config.transport.chunk_size, 19);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_serialization() {
        let config = AgentConfig::default();
        let toml_str = toml::to_string(&config).unwrap();
        let parsed: AgentConfig = toml::from_str(&toml_str).unwrap();

        assert_eq!(config.hub.ports, parsed.hub.ports);
        assert_eq!(config.simulation.devices, parsed.simulation.devices);
    }

    #[test]
    fn test_minimal_file_uses_defaults() {
        let parsed: AgentConfig = toml::from_str(
            r#"
            [agent]
            log_level = "debug"

            [hub]
            ports = ["A", "B"]
            "#,
        )
        .unwrap();

        assert!(parsed.hub.battery);
        assert!(parsed.hub.imu);
        assert_eq!(parsed.scheduler.tick_ms, 100);
        assert_eq!(parsed.transport.chunk_size, 19);
        assert!(parsed.simulation.devices.is_empty());
        assert!(parsed.validate().is_ok());
    }

    #[test]
    fn test_validate_log_level() {
        let mut config = AgentConfig::default();
        assert!(config.validate().is_ok());

        config.agent.log_level = "invalid".to_string();
        assert!(config.validate().is_err());

        config.agent.log_level = "debug".to_string();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_mode_presets() {
        let mut config = AgentConfig::default();
        config.simulation.devices[1].mode = Some(1);
        assert_eq!(config.mode_presets(), vec![(1, 1)]);
    }
}
