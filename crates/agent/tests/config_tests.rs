//! Agent Configuration Tests
//!
//! # Test Scenarios
//! - Save and reload through a real file
//! - Rejection of every invalid setting
//! - Mode presets resolved to Mode Channel indices
//!
//! Run with: `cargo test -p agent --test config_tests`

use agent::config::{AgentConfig, SimDeviceConfig, expand_path};
use protocol::Port;
use std::fs;
use std::path::PathBuf;
use tempfile::TempDir;

fn device(port: Port, type_id: u8, mode: Option<u8>) -> SimDeviceConfig {
    SimDeviceConfig {
        port,
        type_id,
        mode,
    }
}

// ============================================================================
// File Round Trip Tests
// ============================================================================

mod files {
    use super::*;

    #[test]
    fn test_save_then_load() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("agent.toml");

        let mut config = AgentConfig::default();
        config.agent.log_level = "debug".to_string();
        config.hub.ports = vec![Port::A, Port::B, Port::C, Port::D];
        config.scheduler.tick_ms = 50;
        config.simulation.seed = 9;
        config.simulation.devices[1].mode = Some(1);
        config.save(&path).unwrap();

        let loaded = AgentConfig::load(Some(path)).unwrap();
        assert_eq!(loaded.agent.log_level, "debug");
        assert_eq!(loaded.hub.ports, config.hub.ports);
        assert_eq!(loaded.scheduler.tick_ms, 50);
        assert_eq!(loaded.simulation.seed, 9);
        assert_eq!(loaded.simulation.devices, config.simulation.devices);
    }

    #[test]
    fn test_ports_written_as_letters() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("agent.toml");
        AgentConfig::default().save(&path).unwrap();

        let content = fs::read_to_string(&path).unwrap();
        assert!(content.contains(r#""F""#));
        assert!(!content.contains("Port.F"));
        assert!(content.contains("[[simulation.devices]]"));
    }

    #[test]
    fn test_load_missing_file() {
        let dir = TempDir::new().unwrap();
        assert!(AgentConfig::load(Some(dir.path().join("absent.toml"))).is_err());
    }

    #[test]
    fn test_load_rejects_invalid_values() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("agent.toml");
        fs::write(
            &path,
            r#"
            [agent]
            log_level = "info"

            [hub]
            ports = ["A", "B", "C"]
            "#,
        )
        .unwrap();

        let err = AgentConfig::load(Some(path)).unwrap_err();
        assert!(err.to_string().contains("port count"));
    }

    #[test]
    fn test_load_rejects_unknown_port() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("agent.toml");
        fs::write(
            &path,
            r#"
            [agent]
            log_level = "info"

            [hub]
            ports = ["A", "G"]
            "#,
        )
        .unwrap();

        assert!(AgentConfig::load(Some(path)).is_err());
    }

    #[test]
    fn test_expand_path_tilde() {
        let plain = PathBuf::from("/etc/hub-telemetry/agent.toml");
        assert_eq!(expand_path(&plain), plain);

        let expanded = expand_path(&PathBuf::from("~/agent.toml"));
        assert!(!expanded.to_string_lossy().starts_with('~'));
        assert!(expanded.ends_with("agent.toml"));
    }
}

// ============================================================================
// Validation Tests
// ============================================================================

mod validation {
    use super::*;

    fn rejected(edit: impl FnOnce(&mut AgentConfig)) -> bool {
        let mut config = AgentConfig::default();
        edit(&mut config);
        config.validate().is_err()
    }

    #[test]
    fn test_port_layouts() {
        for count in [2, 4, 6] {
            let mut config = AgentConfig::default();
            config.hub.ports = Port::ALL[..count].to_vec();
            config.simulation.devices.clear();
            assert!(config.validate().is_ok(), "{} ports", count);
        }
        assert!(rejected(|c| c.hub.ports = vec![Port::A]));
        assert!(rejected(|c| c.hub.ports = vec![Port::A, Port::A]));
    }

    #[test]
    fn test_scheduler_and_transport_limits() {
        assert!(rejected(|c| c.scheduler.tick_ms = 0));
        assert!(rejected(|c| c.scheduler.battery_interval_ticks = 0));
        assert!(rejected(|c| c.transport.chunk_size = 0));
        assert!(rejected(|c| c.transport.queue_depth = 0));
    }

    #[test]
    fn test_simulation_limits() {
        assert!(rejected(|c| c.simulation.detach_probability = 1.5));
        assert!(rejected(|c| c.simulation.detach_probability = -0.1));
        assert!(rejected(|c| c.simulation.charger_status = 4));
        assert!(!rejected(|c| c.simulation.charger_status = 3));
    }

    #[test]
    fn test_simulated_devices_must_fit_hub() {
        assert!(rejected(|c| c.hub.ports = vec![Port::A, Port::B]));
        assert!(rejected(|c| {
            c.simulation.devices = vec![device(Port::A, 48, None), device(Port::A, 61, None)]
        }));
    }
}

// ============================================================================
// Mode Preset Tests
// ============================================================================

mod presets {
    use super::*;

    #[test]
    fn test_presets_follow_port_order() {
        let mut config = AgentConfig::default();
        config.hub.ports = vec![Port::D, Port::C, Port::B, Port::A];
        config.simulation.devices = vec![
            device(Port::A, 61, Some(1)),
            device(Port::C, 37, Some(2)),
            device(Port::B, 48, None),
        ];

        assert_eq!(config.mode_presets(), vec![(3, 1), (1, 2)]);
    }
}
