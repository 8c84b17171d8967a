//! relic86 core: a real-mode x86 CPU built for running and reverse
//! engineering DOS binaries.
//!
//! The crate provides the instruction executor ([`cpu::Cpu`]), the flat
//! memory bus ([`memory::FlatMemory`] behind [`memory::MemoryBus`]), the
//! I/O-port dispatcher, the interrupt machinery, and the reverse-engineering
//! side: call/return tracking ([`function`]), the static-address recorder
//! ([`recorder`]), and the post-run dump ([`dump`]).

#![allow(clippy::upper_case_acronyms)]

pub mod alu;
pub mod cpu;
pub mod dump;
pub mod error;
pub mod function;
pub mod interrupts;
pub mod io;
pub mod logging;
pub mod memory;
pub mod pause;
pub mod recorder;
pub mod state;

#[cfg(test)]
mod cpu_tests;

use serde::Deserialize;

pub use cpu::{CallbackHandler, Cpu, StopReason};
pub use error::CpuError;
pub use function::{CallType, FunctionOverride, FunctionTracker};
pub use memory::{FlatMemory, MemoryBus};
pub use pause::PauseHandler;
pub use state::{CpuRegisters, SegmentedAddress};

/// Core configuration.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct CoreConfig {
    /// Fail on I/O to an unmapped port instead of reading 0 / swallowing.
    pub fail_on_unhandled_port: bool,
    /// Fail on interrupts whose vector is still zeroed.
    pub error_on_uninitialized_interrupt_handler: bool,
    /// Raise default log levels to Debug.
    pub debug_mode: bool,
    /// Hard logging override: Some(true) forces Trace, Some(false) silences.
    pub force_log: Option<bool>,
}
