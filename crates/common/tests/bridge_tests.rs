//! Agent Bridge Integration Tests
//!
//! Tests for the channels between the Tokio runtime and the telemetry thread.
//!
//! # Test Scenarios
//! - Command/event message flow across a real OS thread
//! - Chunk link ordering and back-pressure
//! - Mode Channel writes from the host side
//!
//! Run with: `cargo test -p common --test bridge_tests`

use common::test_utils::{DEFAULT_TEST_TIMEOUT, with_timeout};
use common::{AgentCommand, AgentEvent, create_agent_bridge, create_chunk_channel, mode_channel};
use protocol::{FrameWriter, LineAssembler, Port, Record, Transport};
use std::thread;
use std::time::Duration;

// ============================================================================
// Control Bridge Tests
// ============================================================================

mod control {
    use super::*;

    #[tokio::test]
    async fn test_commands_drained_in_order() {
        let (bridge, worker) = create_agent_bridge();

        bridge
            .send_command(AgentCommand::SetMode { index: 1, value: 2 })
            .await
            .unwrap();
        bridge.send_command(AgentCommand::Shutdown).await.unwrap();

        let handle = thread::spawn(move || {
            let mut seen = Vec::new();
            while let Some(cmd) = worker.try_recv_command() {
                seen.push(cmd);
            }
            seen
        });

        assert_eq!(
            handle.join().unwrap(),
            vec![
                AgentCommand::SetMode { index: 1, value: 2 },
                AgentCommand::Shutdown
            ]
        );
    }

    #[tokio::test]
    async fn test_events_reach_runtime() {
        let (bridge, worker) = create_agent_bridge();

        let handle = thread::spawn(move || {
            worker
                .try_send_event(AgentEvent::Fault {
                    session: "Port.A".to_string(),
                    reason: "read failed".to_string(),
                })
                .unwrap();
            thread::sleep(Duration::from_millis(10));
            worker
                .try_send_event(AgentEvent::Stopped { ticks: 7 })
                .unwrap();
        });

        let first = with_timeout(DEFAULT_TEST_TIMEOUT, bridge.recv_event())
            .await
            .unwrap()
            .unwrap();
        assert!(matches!(first, AgentEvent::Fault { ref session, .. } if session == "Port.A"));

        let second = with_timeout(DEFAULT_TEST_TIMEOUT, bridge.recv_event())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(second, AgentEvent::Stopped { ticks: 7 });

        handle.join().unwrap();
    }

    #[tokio::test]
    async fn test_recv_fails_after_worker_dropped() {
        let (bridge, worker) = create_agent_bridge();
        drop(worker);
        assert!(bridge.recv_event().await.is_err());
        assert!(bridge.send_command(AgentCommand::Shutdown).await.is_err());
    }
}

// ============================================================================
// Chunk Link Tests
// ============================================================================

mod chunk_link {
    use super::*;

    #[tokio::test]
    async fn test_frame_crosses_thread_intact() {
        let (mut transport, rx) = create_chunk_channel(64, 19);
        let message: protocol::CompositeMessage = [
            Record::PortEmpty { port: Port::A },
            common::test_utils::data_record(
                Port::B,
                48,
                &[("a", "450°"), ("r", "1R"), ("ra", "90°")],
            ),
        ]
        .into_iter()
        .collect();
        let expected = message.records().to_vec();

        let handle = thread::spawn(move || FrameWriter::default().send(&message, &mut transport));

        let report = handle.join().unwrap();
        assert!(report.is_complete());

        let mut assembler = LineAssembler::new();
        let mut parsed = Vec::new();
        while parsed.len() < expected.len() {
            let chunk = with_timeout(DEFAULT_TEST_TIMEOUT, rx.recv())
                .await
                .unwrap()
                .unwrap();
            assert!(chunk.len() <= 19);
            assembler.push(&chunk);
            while let Some(record) = assembler.next_record() {
                parsed.push(record.unwrap());
            }
        }
        assert_eq!(parsed, expected);
    }

    #[test]
    fn test_full_link_drops_chunks() {
        let (mut transport, rx) = create_chunk_channel(2, 19);
        let frame = bytes::Bytes::from(vec![b'x'; 19 * 4]);

        let report = FrameWriter::new(transport.capacity())
            .unwrap()
            .send_frame(&frame, &mut transport);

        assert_eq!(report.chunks_written, 2);
        assert_eq!(report.chunks_dropped, 2);
        assert_eq!(rx.len(), 2);
    }
}

// ============================================================================
// Mode Channel Tests
// ============================================================================

mod modes {
    use super::*;

    #[test]
    fn test_host_write_visible_to_core_thread() {
        let (writer, reader) = mode_channel(4);
        assert_eq!(writer.write(2, &[1]), 1);

        let seen = thread::spawn(move || reader.snapshot()).join().unwrap();
        assert_eq!(seen, vec![0, 0, 1, 0]);
    }

    #[test]
    fn test_out_of_range_write_ignored() {
        let (writer, reader) = mode_channel(2);
        assert_eq!(writer.write(5, &[1, 2]), 0);
        assert!(!writer.set(2, 9));
        assert_eq!(reader.snapshot(), vec![0, 0]);
    }
}
