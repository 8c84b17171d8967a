//! Centralized logging configuration for the core.
//!
//! - **LogLevel**: hierarchical levels (Off < Error < Warn < Info < Debug < Trace)
//! - **LogCategory**: per-component channels (CPU, Memory, IO, Interrupts,
//!   Functions, Stubs)
//! - **log()**: lazy logging entry point
//!
//! The configuration is a set of per-category atomics, so the disabled path
//! costs one relaxed load and never evaluates the message closure. That is
//! the contract the executor's hot path relies on.
//!
//! # Usage
//!
//! ```rust
//! use relic86_core::logging::{log, LogCategory, LogLevel};
//!
//! log(LogCategory::Cpu, LogLevel::Debug, || {
//!     format!("divide fault at {:04X}:{:04X}", 0x1000u16, 0x0100u16)
//! });
//! ```

use std::sync::atomic::{AtomicU8, Ordering};

use crate::CoreConfig;

/// Log level for controlling verbosity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
#[repr(u8)]
pub enum LogLevel {
    Off = 0,
    Error = 1,
    Warn = 2,
    Info = 3,
    Debug = 4,
    Trace = 5,
}

impl LogLevel {
    /// Parse a log level from a string (case-insensitive).
    #[allow(clippy::should_implement_trait)]
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "off" | "0" => Some(LogLevel::Off),
            "error" | "err" | "1" => Some(LogLevel::Error),
            "warn" | "warning" | "2" => Some(LogLevel::Warn),
            "info" | "3" => Some(LogLevel::Info),
            "debug" | "4" => Some(LogLevel::Debug),
            "trace" | "5" => Some(LogLevel::Trace),
            _ => None,
        }
    }

    fn from_u8(val: u8) -> Self {
        match val {
            1 => LogLevel::Error,
            2 => LogLevel::Warn,
            3 => LogLevel::Info,
            4 => LogLevel::Debug,
            5 => LogLevel::Trace,
            _ => LogLevel::Off,
        }
    }

    fn name(&self) -> &'static str {
        match self {
            LogLevel::Off => "OFF",
            LogLevel::Error => "ERROR",
            LogLevel::Warn => "WARN",
            LogLevel::Info => "INFO",
            LogLevel::Debug => "DEBUG",
            LogLevel::Trace => "TRACE",
        }
    }
}

/// Log category for the core's components.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LogCategory {
    /// Instruction execution
    Cpu,
    /// Memory bus traffic
    Memory,
    /// I/O port dispatch
    Io,
    /// Interrupt entry/exit and external latching
    Interrupts,
    /// Call/return tracking
    Functions,
    /// Stubbed features (x87, unhandled ports in lenient mode)
    Stubs,
}

const CATEGORY_COUNT: usize = 6;

impl LogCategory {
    fn index(self) -> usize {
        match self {
            LogCategory::Cpu => 0,
            LogCategory::Memory => 1,
            LogCategory::Io => 2,
            LogCategory::Interrupts => 3,
            LogCategory::Functions => 4,
            LogCategory::Stubs => 5,
        }
    }

    fn name(&self) -> &'static str {
        match self {
            LogCategory::Cpu => "cpu",
            LogCategory::Memory => "mem",
            LogCategory::Io => "io",
            LogCategory::Interrupts => "int",
            LogCategory::Functions => "fn",
            LogCategory::Stubs => "stub",
        }
    }
}

#[allow(clippy::declare_interior_mutable_const)]
const DEFAULT_LEVEL: AtomicU8 = AtomicU8::new(LogLevel::Warn as u8);
static LEVELS: [AtomicU8; CATEGORY_COUNT] = [DEFAULT_LEVEL; CATEGORY_COUNT];

/// Set the maximum level for one category.
pub fn set_level(category: LogCategory, level: LogLevel) {
    LEVELS[category.index()].store(level as u8, Ordering::Relaxed);
}

/// Set the maximum level for every category.
pub fn set_all_levels(level: LogLevel) {
    for slot in &LEVELS {
        slot.store(level as u8, Ordering::Relaxed);
    }
}

/// Current maximum level for a category.
pub fn level(category: LogCategory) -> LogLevel {
    LogLevel::from_u8(LEVELS[category.index()].load(Ordering::Relaxed))
}

/// Whether a message at `level` would be emitted for `category`.
///
/// This is the only check on the hot path: a single relaxed load.
#[inline]
pub fn enabled(category: LogCategory, level: LogLevel) -> bool {
    level as u8 <= LEVELS[category.index()].load(Ordering::Relaxed)
}

/// Log with lazy evaluation; the closure runs only when enabled.
#[inline]
pub fn log<F: FnOnce() -> String>(category: LogCategory, level: LogLevel, message: F) {
    if enabled(category, level) {
        eprintln!("[{:5}] {:4} {}", level.name(), category.name(), message());
    }
}

/// Apply the logging part of a [`CoreConfig`].
///
/// `debug_mode` raises everything to Debug; `force_log` overrides both ways
/// (Some(true) forces Trace, Some(false) forces Off).
pub fn configure(config: &CoreConfig) {
    let base = if config.debug_mode {
        LogLevel::Debug
    } else {
        LogLevel::Warn
    };
    let level = match config.force_log {
        Some(true) => LogLevel::Trace,
        Some(false) => LogLevel::Off,
        None => base,
    };
    set_all_levels(level);
}
