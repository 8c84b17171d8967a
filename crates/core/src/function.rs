//! Call/return tracking for reverse engineering.
//!
//! The tracker keeps a shadow call stack alongside the emulated one and a
//! catalog of every function entry point it has observed. Inconsistencies
//! (a RET of the wrong kind, a return address that no longer matches) are
//! diagnosed and logged, never fatal: DOS programs do jump through their own
//! stacks, and the dump is still useful afterwards.
//!
//! Two independent trackers exist per CPU: one for normal program flow and
//! one that is active only while an externally injected interrupt is being
//! serviced, so device-driven control flow does not pollute the program's
//! call graph.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::fmt::Write as _;

use crate::cpu::Cpu;
use crate::error::CpuError;
use crate::logging::{log, LogCategory, LogLevel};
use crate::memory::MemoryBus;
use crate::state::SegmentedAddress;

/// How control reached a function.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallType {
    Near,
    Far,
    Interrupt,
}

impl fmt::Display for CallType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            CallType::Near => "near",
            CallType::Far => "far",
            CallType::Interrupt => "interrupt",
        };
        f.write_str(name)
    }
}

/// Everything known about one function entry point.
#[derive(Debug, Clone)]
pub struct FunctionInformation {
    pub address: SegmentedAddress,
    /// User-assigned name, if any.
    pub name: Option<String>,
    /// Entry addresses of the functions observed calling this one.
    pub callers: BTreeSet<SegmentedAddress>,
    /// Return-site address -> number of returns through it.
    pub returns: BTreeMap<SegmentedAddress, u64>,
    /// Number of recorded calls.
    pub calls: u64,
    /// True when a host-native override replaces the emulated body.
    pub has_override: bool,
}

impl FunctionInformation {
    fn new(address: SegmentedAddress) -> Self {
        Self {
            address,
            name: None,
            callers: BTreeSet::new(),
            returns: BTreeMap::new(),
            calls: 0,
            has_override: false,
        }
    }

    /// Assigned name, or the canonical placeholder derived from the address.
    pub fn name_or_default(&self) -> String {
        match &self.name {
            Some(name) => name.clone(),
            None => format!(
                "unknown_{:04X}_{:04X}_{:05X}",
                self.address.segment,
                self.address.offset,
                self.address.linear()
            ),
        }
    }
}

/// One entry of the shadow call stack.
#[derive(Debug, Clone, Copy)]
pub struct CallFrame {
    pub call_type: CallType,
    pub entry: SegmentedAddress,
    pub expected_return: SegmentedAddress,
}

/// Shadow call stack plus the function catalog.
pub struct FunctionTracker {
    label: &'static str,
    functions: BTreeMap<SegmentedAddress, FunctionInformation>,
    call_stack: Vec<CallFrame>,
}

impl FunctionTracker {
    pub fn new(label: &'static str) -> Self {
        Self {
            label,
            functions: BTreeMap::new(),
            call_stack: Vec::new(),
        }
    }

    /// Record a call to `entry` expected to come back to `expected_return`.
    ///
    /// With `record_return` false (external-interrupt entry) the function is
    /// cataloged but no shadow frame is pushed, so the matching IRET will
    /// not look for one.
    pub fn call(
        &mut self,
        call_type: CallType,
        entry: SegmentedAddress,
        expected_return: SegmentedAddress,
        record_return: bool,
    ) {
        let caller = self.call_stack.last().map(|frame| frame.entry);

        let info = self
            .functions
            .entry(entry)
            .or_insert_with(|| FunctionInformation::new(entry));
        info.calls += 1;
        if let Some(caller) = caller {
            info.callers.insert(caller);
        }

        log(LogCategory::Functions, LogLevel::Trace, || {
            format!(
                "[{}] {} call to {} (return {})",
                self.label, call_type, entry, expected_return
            )
        });

        if record_return {
            self.call_stack.push(CallFrame {
                call_type,
                entry,
                expected_return,
            });
        }
    }

    /// Record a return of `call_type` landing at `actual_return`.
    ///
    /// Mismatches are reported and tolerated; the dump survives stack abuse.
    pub fn ret(&mut self, call_type: CallType, actual_return: SegmentedAddress) {
        let frame = match self.call_stack.pop() {
            Some(frame) => frame,
            None => {
                log(LogCategory::Functions, LogLevel::Warn, || {
                    format!(
                        "[{}] {} return to {} with empty shadow stack",
                        self.label, call_type, actual_return
                    )
                });
                return;
            }
        };

        if frame.call_type != call_type {
            log(LogCategory::Functions, LogLevel::Warn, || {
                format!(
                    "[{}] return kind mismatch from {}: called {}, returned {}\n{}",
                    self.label,
                    frame.entry,
                    frame.call_type,
                    call_type,
                    self.stack_snapshot()
                )
            });
        }

        if frame.expected_return != actual_return {
            log(LogCategory::Functions, LogLevel::Warn, || {
                format!(
                    "[{}] corrupted return from {}: expected {}, got {}\n{}",
                    self.label,
                    frame.entry,
                    frame.expected_return,
                    actual_return,
                    self.stack_snapshot()
                )
            });
        }

        if let Some(info) = self.functions.get_mut(&frame.entry) {
            *info.returns.entry(actual_return).or_insert(0) += 1;
        }
    }

    /// Assign a human-readable name to a function entry point.
    pub fn name_function(&mut self, address: SegmentedAddress, name: impl Into<String>) {
        self.functions
            .entry(address)
            .or_insert_with(|| FunctionInformation::new(address))
            .name = Some(name.into());
    }

    /// Mark a function as replaced by a host-native override.
    pub fn mark_override(&mut self, address: SegmentedAddress) {
        self.functions
            .entry(address)
            .or_insert_with(|| FunctionInformation::new(address))
            .has_override = true;
    }

    /// Every function observed so far, ordered by entry address.
    pub fn functions(&self) -> &BTreeMap<SegmentedAddress, FunctionInformation> {
        &self.functions
    }

    pub fn call_depth(&self) -> usize {
        self.call_stack.len()
    }

    /// Innermost shadow frame, if any.
    pub fn top_frame(&self) -> Option<&CallFrame> {
        self.call_stack.last()
    }

    /// Drop any frames left on the shadow stack, reporting them.
    ///
    /// Called when an external-interrupt context ends with unreturned calls.
    pub fn drain_leftover_frames(&mut self) {
        if self.call_stack.is_empty() {
            return;
        }
        log(LogCategory::Functions, LogLevel::Warn, || {
            format!(
                "[{}] {} unreturned frame(s) at context end\n{}",
                self.label,
                self.call_stack.len(),
                self.stack_snapshot()
            )
        });
        self.call_stack.clear();
    }

    fn stack_snapshot(&self) -> String {
        let mut out = String::from("shadow stack (innermost last):");
        for frame in &self.call_stack {
            let _ = write!(
                &mut out,
                "\n  {} {} -> {}",
                frame.call_type, frame.entry, frame.expected_return
            );
        }
        out
    }
}

/// Host-native replacement for an emulated function body.
///
/// When the executor sees a tracked CALL whose target has an override
/// registered, it runs the override and synthesizes the matching return
/// instead of entering the emulated code.
pub trait FunctionOverride<M: MemoryBus> {
    fn run(&mut self, cpu: &mut Cpu<M>) -> Result<(), CpuError>;
}

impl<M: MemoryBus, F> FunctionOverride<M> for F
where
    F: FnMut(&mut Cpu<M>) -> Result<(), CpuError>,
{
    fn run(&mut self, cpu: &mut Cpu<M>) -> Result<(), CpuError> {
        self(cpu)
    }
}
