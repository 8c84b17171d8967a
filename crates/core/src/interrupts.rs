//! External-interrupt latching.
//!
//! Devices raise interrupts from any thread through a shared
//! [`ExternalInterruptLine`]; the CPU services the latch only at instruction
//! boundaries and only when IF=1. There is no queue: a later injection
//! before service overwrites the pending vector, except that a pending
//! keyboard interrupt is never displaced (keyboard wins over timer).

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

/// Divide error / division overflow.
pub const VECTOR_DIVIDE_ERROR: u8 = 0x00;
/// System timer (IRQ 0).
pub const VECTOR_TIMER: u8 = 0x08;
/// Keyboard (IRQ 1).
pub const VECTOR_KEYBOARD: u8 = 0x09;

const NO_VECTOR: u32 = u32::MAX;

/// Single-slot interrupt latch shared between device threads and the CPU.
#[derive(Clone)]
pub struct ExternalInterruptLine {
    pending: Arc<AtomicU32>,
}

impl ExternalInterruptLine {
    pub fn new() -> Self {
        Self {
            pending: Arc::new(AtomicU32::new(NO_VECTOR)),
        }
    }

    /// Latch `vector` for service at the next instruction boundary.
    ///
    /// A pending keyboard vector is never overwritten; any other pending
    /// vector is replaced by the newcomer.
    pub fn raise(&self, vector: u8) {
        let mut current = self.pending.load(Ordering::Acquire);
        loop {
            if current == VECTOR_KEYBOARD as u32 {
                return;
            }
            match self.pending.compare_exchange_weak(
                current,
                vector as u32,
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => return,
                Err(observed) => current = observed,
            }
        }
    }

    /// Pending vector, if any, without clearing the latch.
    pub fn pending(&self) -> Option<u8> {
        let raw = self.pending.load(Ordering::Acquire);
        if raw == NO_VECTOR {
            None
        } else {
            Some(raw as u8)
        }
    }

    /// Take the pending vector, clearing the latch.
    pub fn take(&self) -> Option<u8> {
        let raw = self.pending.swap(NO_VECTOR, Ordering::AcqRel);
        if raw == NO_VECTOR {
            None
        } else {
            Some(raw as u8)
        }
    }
}

impl Default for ExternalInterruptLine {
    fn default() -> Self {
        Self::new()
    }
}
