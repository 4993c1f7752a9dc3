//! Mode channel shared between the host and the telemetry core
//!
//! One selector byte per configured port, index-aligned with port
//! declaration order and initialized to zero. The host writes through a
//! [`ModeWriter`]; decoders read through a [`ModeReader`]. Each byte is an
//! independent atomic, so reads never tear, but a write racing a read may be
//! observed one tick late.

use std::sync::Arc;
use std::sync::atomic::{AtomicU8, Ordering};
use tracing::warn;

type Slots = Arc<[AtomicU8]>;

/// Host side of the mode channel (write access)
#[derive(Debug, Clone)]
pub struct ModeWriter {
    slots: Slots,
}

impl ModeWriter {
    /// Set the selector for one port index
    ///
    /// Returns `false` if the index is outside the channel.
    pub fn set(&self, index: usize, value: u8) -> bool {
        match self.slots.get(index) {
            Some(slot) => {
                slot.store(value, Ordering::Relaxed);
                true
            }
            None => {
                warn!(
                    "Mode write to index {} ignored (channel has {} slots)",
                    index,
                    self.slots.len()
                );
                false
            }
        }
    }

    /// Write a run of selector bytes starting at `offset`
    ///
    /// Bytes that fall past the end of the channel are dropped. Returns the
    /// number of bytes stored.
    pub fn write(&self, offset: usize, bytes: &[u8]) -> usize {
        let mut stored = 0;
        for (i, value) in bytes.iter().enumerate() {
            match self.slots.get(offset + i) {
                Some(slot) => {
                    slot.store(*value, Ordering::Relaxed);
                    stored += 1;
                }
                None => break,
            }
        }
        if stored < bytes.len() {
            warn!(
                "Mode write at offset {} truncated: {} of {} bytes stored",
                offset,
                stored,
                bytes.len()
            );
        }
        stored
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }
}

/// Core side of the mode channel (read-only)
#[derive(Debug, Clone)]
pub struct ModeReader {
    slots: Slots,
}

impl ModeReader {
    /// Current selector for a port index; out-of-range reads as the primary mode
    pub fn get(&self, index: usize) -> u8 {
        self.slots
            .get(index)
            .map(|slot| slot.load(Ordering::Relaxed))
            .unwrap_or(0)
    }

    /// Copy of every selector, in port order
    pub fn snapshot(&self) -> Vec<u8> {
        self.slots
            .iter()
            .map(|slot| slot.load(Ordering::Relaxed))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }
}

/// Create a mode channel with one zeroed slot per port
///
/// Returns (ModeWriter for the host, ModeReader for the core)
pub fn mode_channel(ports: usize) -> (ModeWriter, ModeReader) {
    let slots: Slots = (0..ports).map(|_| AtomicU8::new(0)).collect();
    (
        ModeWriter {
            slots: slots.clone(),
        },
        ModeReader { slots },
    )
}
