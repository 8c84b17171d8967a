//! Fatal error kinds surfaced by the executor.
//!
//! Everything here aborts the run; the division fault is not an error — the
//! executor restarts the instruction and dispatches interrupt 0 instead.
//! Callers wanting the full architectural state at the failure point pair
//! the error with [`crate::cpu::Cpu::snapshot`].

use thiserror::Error;

#[derive(Debug, Error)]
pub enum CpuError {
    /// Opcode byte with no defined handler.
    #[error(
        "invalid opcode {opcode:#04X} at {cs:04X}:{ip:04X} (after prefix: {after_prefix})"
    )]
    InvalidOpcode {
        opcode: u8,
        /// True when at least one prefix byte preceded the failing byte.
        after_prefix: bool,
        cs: u16,
        ip: u16,
    },

    /// Grouped opcode with a reserved sub-index in the reg field.
    #[error("reserved sub-index {index} of group opcode {group:#04X} at {cs:04X}:{ip:04X}")]
    InvalidGroupIndex {
        group: u8,
        index: u8,
        cs: u16,
        ip: u16,
    },

    /// Interrupt dispatched to an uninitialized vector in strict mode.
    #[error("interrupt {vector:#04X} has no handler installed")]
    UnhandledInterrupt { vector: u8 },

    /// I/O access to an unmapped port in strict mode.
    #[error("unhandled I/O port {port:#06X}")]
    UnhandledIoPort { port: u16 },

    /// Callback opcode executed with no callback handler installed.
    #[error("callback {index:#06X} invoked with no handler installed")]
    UnhandledCallback { index: u16 },
}
