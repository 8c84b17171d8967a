//! Real-mode x86 instruction executor.
//!
//! `Cpu` is generic over the memory bus, so systems embed it the same way
//! regardless of how they back the 1 MiB address space. One call to
//! [`Cpu::step`] fetches, decodes, and executes exactly one instruction:
//!
//! 1. snapshot IP into a per-instruction working copy and reset the
//!    address-recorder slate,
//! 2. fold prefix bytes (segment overrides, LOCK, REP/REPZ/REPNZ) into the
//!    instruction context,
//! 3. dispatch the opcode (REP-wrapped string ops loop over CX here),
//! 4. commit the recorder, bump the cycle counter, service a pending
//!    external interrupt if IF=1, and write the working IP back.
//!
//! Division faults rewind the working IP to the instruction start before
//! dispatching INT 0, so the handler's IRET restarts the faulting
//! instruction.

use std::collections::HashMap;

use crate::alu;
use crate::error::CpuError;
use crate::function::{CallType, FunctionOverride, FunctionTracker};
use crate::interrupts::{ExternalInterruptLine, VECTOR_DIVIDE_ERROR};
use crate::io::IoPortDispatcher;
use crate::logging::{enabled, log, LogCategory, LogLevel};
use crate::memory::MemoryBus;
use crate::pause::PauseHandler;
use crate::recorder::{AccessKind, AddressRecorder, OperandWidth};
use crate::state::{CpuRegisters, Flags, Registers, SegmentOverride, SegmentedAddress};
use crate::CoreConfig;

/// ModR/M byte selecting the emulator callback in group 4 (mod=00 reg=111
/// rm=000, i.e. the `FE 38 <imm16>` sequence).
const CALLBACK_MODRM: u8 = 0x38;

/// Host hook invoked by the emulator-specific `FE 38 <imm16>` sequence.
///
/// This is how host-language interrupt overrides interpose on INT
/// instructions without patching the vector table.
pub trait CallbackHandler<M: MemoryBus> {
    fn run(&mut self, cpu: &mut Cpu<M>, index: u16) -> Result<(), CpuError>;
}

impl<M: MemoryBus, F> CallbackHandler<M> for F
where
    F: FnMut(&mut Cpu<M>, u16) -> Result<(), CpuError>,
{
    fn run(&mut self, cpu: &mut Cpu<M>, index: u16) -> Result<(), CpuError> {
        self(cpu, index)
    }
}

/// Why [`Cpu::run`] returned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    /// HLT with no pending interrupt to wake on.
    Halted,
    /// The pause handler requested a stop; in-flight instructions completed.
    Paused,
    /// The instruction budget ran out.
    InstructionLimit,
}

/// Per-instruction scratch. Dropped when the instruction commits or aborts,
/// so prefix state can never leak into the next instruction.
struct ExecContext {
    /// IP of the first prefix/opcode byte; division faults restart here.
    start_ip: u16,
    /// Working IP; committed to the architectural IP at instruction end.
    ip: u16,
    segment_override: Option<SegmentOverride>,
    /// REP tri-state: None, Some(false)=REPNZ, Some(true)=REPZ.
    continue_zero_flag: Option<bool>,
    had_prefix: bool,
}

impl ExecContext {
    fn new(ip: u16) -> Self {
        Self {
            start_ip: ip,
            ip,
            segment_override: None,
            continue_zero_flag: None,
            had_prefix: false,
        }
    }
}

/// Decoded ModR/M byte with its effective address resolved eagerly
/// (displacement bytes already consumed).
struct ModRm {
    reg: u8,
    rm: u8,
    ea: Option<SegmentedAddress>,
}

impl ModRm {
    /// The operand's memory address; `None` for register-direct (mod=11).
    fn memory_address(&self) -> Option<SegmentedAddress> {
        self.ea
    }
}

/// The eight classic ALU operations, as encoded in bits 5-3 of both the
/// 0x00-0x3D opcode block and the group 1 reg field.
#[derive(Debug, Clone, Copy)]
enum AluOp {
    Add,
    Or,
    Adc,
    Sbb,
    And,
    Sub,
    Xor,
    Cmp,
}

impl AluOp {
    fn from_index(index: u8) -> Self {
        match index & 0x07 {
            0 => AluOp::Add,
            1 => AluOp::Or,
            2 => AluOp::Adc,
            3 => AluOp::Sbb,
            4 => AluOp::And,
            5 => AluOp::Sub,
            6 => AluOp::Xor,
            _ => AluOp::Cmp,
        }
    }

    /// Apply the 8-bit form; `None` means no write-back (CMP).
    fn eval8(self, flags: &mut Flags, a: u8, b: u8) -> Option<u8> {
        match self {
            AluOp::Add => Some(alu::add8(flags, a, b)),
            AluOp::Or => Some(alu::or8(flags, a, b)),
            AluOp::Adc => Some(alu::adc8(flags, a, b)),
            AluOp::Sbb => Some(alu::sbb8(flags, a, b)),
            AluOp::And => Some(alu::and8(flags, a, b)),
            AluOp::Sub => Some(alu::sub8(flags, a, b)),
            AluOp::Xor => Some(alu::xor8(flags, a, b)),
            AluOp::Cmp => {
                alu::cmp8(flags, a, b);
                None
            }
        }
    }

    /// Apply the 16-bit form; `None` means no write-back (CMP).
    fn eval16(self, flags: &mut Flags, a: u16, b: u16) -> Option<u16> {
        match self {
            AluOp::Add => Some(alu::add16(flags, a, b)),
            AluOp::Or => Some(alu::or16(flags, a, b)),
            AluOp::Adc => Some(alu::adc16(flags, a, b)),
            AluOp::Sbb => Some(alu::sbb16(flags, a, b)),
            AluOp::And => Some(alu::and16(flags, a, b)),
            AluOp::Sub => Some(alu::sub16(flags, a, b)),
            AluOp::Xor => Some(alu::xor16(flags, a, b)),
            AluOp::Cmp => {
                alu::cmp16(flags, a, b);
                None
            }
        }
    }
}

/// Group 2 shift/rotate selector (sub-index 6 is reserved).
#[derive(Debug, Clone, Copy)]
enum ShiftOp {
    Rol,
    Ror,
    Rcl,
    Rcr,
    Shl,
    Shr,
    Sar,
}

impl ShiftOp {
    fn from_index(group: u8, index: u8, cs: u16, ip: u16) -> Result<Self, CpuError> {
        match index {
            0 => Ok(ShiftOp::Rol),
            1 => Ok(ShiftOp::Ror),
            2 => Ok(ShiftOp::Rcl),
            3 => Ok(ShiftOp::Rcr),
            4 => Ok(ShiftOp::Shl),
            5 => Ok(ShiftOp::Shr),
            7 => Ok(ShiftOp::Sar),
            _ => Err(CpuError::InvalidGroupIndex {
                group,
                index,
                cs,
                ip,
            }),
        }
    }
}

/// Real-mode x86 CPU.
pub struct Cpu<M: MemoryBus> {
    pub regs: Registers,
    pub flags: Flags,
    /// Memory bus.
    pub memory: M,
    /// I/O-port dispatcher; devices register here.
    pub io: IoPortDispatcher,
    /// Instructions committed so far (not bus cycles).
    pub cycles: u64,
    config: CoreConfig,
    halted: bool,
    interrupt_line: ExternalInterruptLine,
    recorder: AddressRecorder,
    primary_tracker: FunctionTracker,
    external_tracker: FunctionTracker,
    in_external_interrupt: bool,
    overrides: HashMap<SegmentedAddress, Box<dyn FunctionOverride<M>>>,
    callback: Option<Box<dyn CallbackHandler<M>>>,
    // Diagnostic scratch, populated only when CPU tracing is enabled
    instruction_name: String,
    prefix_labels: String,
}

impl<M: MemoryBus> Cpu<M> {
    /// Create a CPU with the default configuration.
    pub fn new(memory: M) -> Self {
        Self::with_config(memory, CoreConfig::default())
    }

    /// Create a CPU with an explicit configuration.
    pub fn with_config(memory: M, config: CoreConfig) -> Self {
        let mut regs = Registers::new();
        // Power-on: execution starts at 0xFFFF:0x0000
        regs.cs = 0xFFFF;
        Self {
            regs,
            flags: Flags::new(),
            memory,
            io: IoPortDispatcher::new(config.fail_on_unhandled_port),
            cycles: 0,
            config,
            halted: false,
            interrupt_line: ExternalInterruptLine::new(),
            recorder: AddressRecorder::new(true),
            primary_tracker: FunctionTracker::new("program"),
            external_tracker: FunctionTracker::new("external-int"),
            in_external_interrupt: false,
            overrides: HashMap::new(),
            callback: None,
            instruction_name: String::new(),
            prefix_labels: String::new(),
        }
    }

    /// Reset registers, flags, and the halt latch; keeps memory, devices,
    /// and the tracking state.
    pub fn reset(&mut self) {
        self.regs = Registers::new();
        self.regs.cs = 0xFFFF;
        self.flags = Flags::new();
        self.cycles = 0;
        self.halted = false;
        self.in_external_interrupt = false;
    }

    pub fn is_halted(&self) -> bool {
        self.halted
    }

    pub fn set_halted(&mut self, halted: bool) {
        self.halted = halted;
    }

    /// Handle other threads use to inject external interrupts.
    pub fn interrupt_line(&self) -> ExternalInterruptLine {
        self.interrupt_line.clone()
    }

    /// The normal-flow function tracker.
    pub fn functions(&self) -> &FunctionTracker {
        &self.primary_tracker
    }

    /// The tracker active while servicing externally injected interrupts.
    pub fn external_functions(&self) -> &FunctionTracker {
        &self.external_tracker
    }

    /// The committed memory-touch accumulator.
    pub fn recorder(&self) -> &AddressRecorder {
        &self.recorder
    }

    /// Assign a name to a function entry point in the program tracker.
    pub fn name_function(&mut self, address: SegmentedAddress, name: impl Into<String>) {
        self.primary_tracker.name_function(address, name);
    }

    /// Replace the emulated body at `address` with a host-native override.
    pub fn register_override(
        &mut self,
        address: SegmentedAddress,
        handler: Box<dyn FunctionOverride<M>>,
    ) {
        self.primary_tracker.mark_override(address);
        self.overrides.insert(address, handler);
    }

    /// Install the handler behind the `FE 38 <imm16>` callback opcode.
    pub fn install_callback_handler(&mut self, handler: Box<dyn CallbackHandler<M>>) {
        self.callback = Some(handler);
    }

    /// Current instruction mnemonic; empty unless CPU tracing is enabled.
    pub fn current_instruction_name(&self) -> &str {
        &self.instruction_name
    }

    /// Accumulated prefix labels; empty unless CPU tracing is enabled.
    pub fn current_prefixes(&self) -> &str {
        &self.prefix_labels
    }

    /// Serializable snapshot of the architectural state.
    pub fn snapshot(&self) -> CpuRegisters {
        CpuRegisters {
            ax: self.regs.ax,
            bx: self.regs.bx,
            cx: self.regs.cx,
            dx: self.regs.dx,
            sp: self.regs.sp,
            bp: self.regs.bp,
            si: self.regs.si,
            di: self.regs.di,
            es: self.regs.es,
            cs: self.regs.cs,
            ss: self.regs.ss,
            ds: self.regs.ds,
            fs: self.regs.fs,
            gs: self.regs.gs,
            ip: self.regs.ip,
            flags: self.flags.value(),
            cycles: self.cycles,
        }
    }

    /// Restore a snapshot taken with [`Cpu::snapshot`].
    pub fn restore(&mut self, snapshot: &CpuRegisters) {
        self.regs.ax = snapshot.ax;
        self.regs.bx = snapshot.bx;
        self.regs.cx = snapshot.cx;
        self.regs.dx = snapshot.dx;
        self.regs.sp = snapshot.sp;
        self.regs.bp = snapshot.bp;
        self.regs.si = snapshot.si;
        self.regs.di = snapshot.di;
        self.regs.es = snapshot.es;
        self.regs.cs = snapshot.cs;
        self.regs.ss = snapshot.ss;
        self.regs.ds = snapshot.ds;
        self.regs.fs = snapshot.fs;
        self.regs.gs = snapshot.gs;
        self.regs.ip = snapshot.ip;
        self.flags.set_value(snapshot.flags);
        self.cycles = snapshot.cycles;
    }

    // ---- fetch and operand access -------------------------------------

    #[inline]
    fn fetch8(&mut self, ctx: &mut ExecContext) -> u8 {
        let addr = SegmentedAddress::new(self.regs.cs, ctx.ip).linear();
        ctx.ip = ctx.ip.wrapping_add(1);
        self.memory.read8(addr)
    }

    #[inline]
    fn fetch16(&mut self, ctx: &mut ExecContext) -> u16 {
        let lo = self.fetch8(ctx) as u16;
        let hi = self.fetch8(ctx) as u16;
        (hi << 8) | lo
    }

    /// Resolve a segment override against the default segment value.
    #[inline]
    fn override_segment(&self, ovr: Option<SegmentOverride>, default: u16) -> u16 {
        match ovr {
            Some(SegmentOverride::ES) => self.regs.es,
            Some(SegmentOverride::CS) => self.regs.cs,
            Some(SegmentOverride::SS) => self.regs.ss,
            Some(SegmentOverride::DS) => self.regs.ds,
            Some(SegmentOverride::FS) => self.regs.fs,
            Some(SegmentOverride::GS) => self.regs.gs,
            None => default,
        }
    }

    #[inline]
    fn read_data8(&mut self, segment: u16, offset: u16) -> u8 {
        let addr = SegmentedAddress::new(segment, offset);
        self.recorder
            .record(addr, AccessKind::Read, OperandWidth::Byte);
        self.memory.read8(addr.linear())
    }

    #[inline]
    fn write_data8(&mut self, segment: u16, offset: u16, val: u8) {
        let addr = SegmentedAddress::new(segment, offset);
        self.recorder
            .record(addr, AccessKind::Write, OperandWidth::Byte);
        self.memory.write8(addr.linear(), val);
    }

    /// Word access; the offset wraps within the segment, so a word at
    /// offset 0xFFFF straddles to offset 0.
    #[inline]
    fn read_data16(&mut self, segment: u16, offset: u16) -> u16 {
        let addr = SegmentedAddress::new(segment, offset);
        self.recorder
            .record(addr, AccessKind::Read, OperandWidth::Word);
        let lo = self.memory.read8(addr.linear()) as u16;
        let hi = self
            .memory
            .read8(SegmentedAddress::new(segment, offset.wrapping_add(1)).linear())
            as u16;
        (hi << 8) | lo
    }

    #[inline]
    fn write_data16(&mut self, segment: u16, offset: u16, val: u16) {
        let addr = SegmentedAddress::new(segment, offset);
        self.recorder
            .record(addr, AccessKind::Write, OperandWidth::Word);
        self.memory.write8(addr.linear(), val as u8);
        self.memory.write8(
            SegmentedAddress::new(segment, offset.wrapping_add(1)).linear(),
            (val >> 8) as u8,
        );
    }

    /// Load a far pointer (offset word then segment word) from memory.
    #[inline]
    fn read_far_pointer(&mut self, segment: u16, offset: u16) -> SegmentedAddress {
        let addr = SegmentedAddress::new(segment, offset);
        self.recorder
            .record(addr, AccessKind::Read, OperandWidth::DwordPtr);
        let lo = self.memory.read16(addr.linear());
        let hi = self
            .memory
            .read16(SegmentedAddress::new(segment, offset.wrapping_add(2)).linear());
        SegmentedAddress::new(hi, lo)
    }

    // ---- stack --------------------------------------------------------

    /// Push through SS:SP. Stack accesses are never segment-overridden.
    #[inline]
    fn push16(&mut self, val: u16) {
        self.regs.sp = self.regs.sp.wrapping_sub(2);
        let (ss, sp) = (self.regs.ss, self.regs.sp);
        self.write_data16(ss, sp, val);
    }

    #[inline]
    fn pop16(&mut self) -> u16 {
        let (ss, sp) = (self.regs.ss, self.regs.sp);
        let val = self.read_data16(ss, sp);
        self.regs.sp = self.regs.sp.wrapping_add(2);
        val
    }

    // ---- ModR/M -------------------------------------------------------

    fn fetch_modrm(&mut self, ctx: &mut ExecContext) -> ModRm {
        let byte = self.fetch8(ctx);
        self.decode_modrm(ctx, byte)
    }

    fn decode_modrm(&mut self, ctx: &mut ExecContext, byte: u8) -> ModRm {
        let modbits = byte >> 6;
        let reg = (byte >> 3) & 0x07;
        let rm = byte & 0x07;
        let ea = if modbits == 0b11 {
            None
        } else {
            Some(self.effective_address(ctx, modbits, rm))
        };
        ModRm { reg, rm, ea }
    }

    /// 16-bit addressing table. Default segment is DS, or SS when BP is a
    /// base; the instruction's override replaces the default.
    fn effective_address(&mut self, ctx: &mut ExecContext, modbits: u8, rm: u8) -> SegmentedAddress {
        // mod=00 rm=110 is the direct-address form
        if modbits == 0b00 && rm == 0b110 {
            let offset = self.fetch16(ctx);
            let segment = self.override_segment(ctx.segment_override, self.regs.ds);
            return SegmentedAddress::new(segment, offset);
        }

        let (base, bp_based) = match rm {
            0 => (self.regs.bx.wrapping_add(self.regs.si), false),
            1 => (self.regs.bx.wrapping_add(self.regs.di), false),
            2 => (self.regs.bp.wrapping_add(self.regs.si), true),
            3 => (self.regs.bp.wrapping_add(self.regs.di), true),
            4 => (self.regs.si, false),
            5 => (self.regs.di, false),
            6 => (self.regs.bp, true),
            _ => (self.regs.bx, false),
        };
        let disp = match modbits {
            0b01 => self.fetch8(ctx) as i8 as u16, // sign-extended
            0b10 => self.fetch16(ctx),
            _ => 0,
        };
        let default = if bp_based { self.regs.ss } else { self.regs.ds };
        let segment = self.override_segment(ctx.segment_override, default);
        SegmentedAddress::new(segment, base.wrapping_add(disp))
    }

    fn rm8(&mut self, m: &ModRm) -> u8 {
        match m.ea {
            None => self.regs.reg8(m.rm),
            Some(addr) => self.read_data8(addr.segment, addr.offset),
        }
    }

    fn set_rm8(&mut self, m: &ModRm, val: u8) {
        match m.ea {
            None => self.regs.set_reg8(m.rm, val),
            Some(addr) => self.write_data8(addr.segment, addr.offset, val),
        }
    }

    fn rm16(&mut self, m: &ModRm) -> u16 {
        match m.ea {
            None => self.regs.reg16(m.rm),
            Some(addr) => self.read_data16(addr.segment, addr.offset),
        }
    }

    fn set_rm16(&mut self, m: &ModRm, val: u16) {
        match m.ea {
            None => self.regs.set_reg16(m.rm, val),
            Some(addr) => self.write_data16(addr.segment, addr.offset, val),
        }
    }

    // ---- conditions ---------------------------------------------------

    /// Condition codes shared by Jcc, SETcc, and Jcc rel16:
    /// 0=O 1=NO 2=B 3=NB 4=Z 5=NZ 6=BE 7=NBE 8=S 9=NS A=P B=NP C=L D=NL E=LE F=NLE
    fn condition(&self, code: u8) -> bool {
        match code & 0x0F {
            0x0 => self.flags.overflow(),
            0x1 => !self.flags.overflow(),
            0x2 => self.flags.carry(),
            0x3 => !self.flags.carry(),
            0x4 => self.flags.zero(),
            0x5 => !self.flags.zero(),
            0x6 => self.flags.carry() || self.flags.zero(),
            0x7 => !self.flags.carry() && !self.flags.zero(),
            0x8 => self.flags.sign(),
            0x9 => !self.flags.sign(),
            0xA => self.flags.parity(),
            0xB => !self.flags.parity(),
            0xC => self.flags.sign() != self.flags.overflow(),
            0xD => self.flags.sign() == self.flags.overflow(),
            0xE => self.flags.zero() || (self.flags.sign() != self.flags.overflow()),
            0xF => !self.flags.zero() && (self.flags.sign() == self.flags.overflow()),
            _ => unreachable!(),
        }
    }

    // ---- interrupts ---------------------------------------------------

    fn active_tracker(&mut self) -> &mut FunctionTracker {
        if self.in_external_interrupt {
            &mut self.external_tracker
        } else {
            &mut self.primary_tracker
        }
    }

    /// Dispatch an interrupt: vector lookup, FLAGS/CS/IP push, IF+TF clear.
    ///
    /// `external` switches call tracking to the external-interrupt tracker
    /// and marks the call as non-return-recorded.
    fn interrupt(
        &mut self,
        ctx: &mut ExecContext,
        vector: u8,
        external: bool,
    ) -> Result<(), CpuError> {
        let ivt_offset = vector as u32 * 4;
        let target_ip = self.memory.read16(ivt_offset);
        let target_cs = self.memory.read16(ivt_offset + 2);
        if target_ip == 0 && target_cs == 0 && self.config.error_on_uninitialized_interrupt_handler
        {
            return Err(CpuError::UnhandledInterrupt { vector });
        }

        let return_address = SegmentedAddress::new(self.regs.cs, ctx.ip);
        self.push16(self.flags.value());
        self.push16(self.regs.cs);
        self.push16(ctx.ip);
        self.flags.set_interrupt_enable(false);
        self.flags.set_trap(false);

        ctx.ip = target_ip;
        self.regs.cs = target_cs;
        let entry = SegmentedAddress::new(target_cs, target_ip);

        log(LogCategory::Interrupts, LogLevel::Debug, || {
            format!(
                "int {:#04X}{} -> {} (return {})",
                vector,
                if external { " (external)" } else { "" },
                entry,
                return_address
            )
        });

        if external {
            self.in_external_interrupt = true;
            self.external_tracker
                .call(CallType::Interrupt, entry, return_address, false);
            Ok(())
        } else {
            self.active_tracker()
                .call(CallType::Interrupt, entry, return_address, true);
            self.run_override_if_any(ctx, CallType::Interrupt, entry)
        }
    }

    /// IRET: pop IP/CS/FLAGS; ends the external-interrupt context when its
    /// shadow stack holds no nested frame.
    fn iret(&mut self, ctx: &mut ExecContext) {
        ctx.ip = self.pop16();
        self.regs.cs = self.pop16();
        let flags = self.pop16();
        self.flags.set_value(flags);
        let actual = SegmentedAddress::new(self.regs.cs, ctx.ip);

        if self.in_external_interrupt {
            let nested_interrupt = self
                .external_tracker
                .top_frame()
                .map(|frame| frame.call_type == CallType::Interrupt)
                .unwrap_or(false);
            if nested_interrupt {
                self.external_tracker.ret(CallType::Interrupt, actual);
            } else {
                // End of the injected-interrupt context: restore the
                // primary tracker.
                self.external_tracker.drain_leftover_frames();
                self.in_external_interrupt = false;
            }
        } else {
            self.primary_tracker.ret(CallType::Interrupt, actual);
        }
    }

    /// Serviced only at instruction boundaries and only when IF=1.
    fn service_external_interrupt(&mut self, ctx: &mut ExecContext) -> Result<(), CpuError> {
        if !self.flags.interrupt_enable() {
            return Ok(());
        }
        if let Some(vector) = self.interrupt_line.take() {
            self.halted = false;
            self.interrupt(ctx, vector, true)?;
        }
        Ok(())
    }

    /// DIV/IDIV fault: restart the instruction, then raise INT 0.
    fn division_fault(&mut self, ctx: &mut ExecContext) -> Result<(), CpuError> {
        log(LogCategory::Cpu, LogLevel::Debug, || {
            format!(
                "division fault at {:04X}:{:04X}, restarting via int 0",
                self.regs.cs, ctx.start_ip
            )
        });
        ctx.ip = ctx.start_ip;
        self.interrupt(ctx, VECTOR_DIVIDE_ERROR, false)
    }

    // ---- call tracking and overrides ----------------------------------

    /// Record a call in the active tracker and divert to a host-native
    /// override when one is registered for the target.
    fn record_call(
        &mut self,
        ctx: &mut ExecContext,
        call_type: CallType,
        entry: SegmentedAddress,
        expected_return: SegmentedAddress,
    ) -> Result<(), CpuError> {
        self.active_tracker()
            .call(call_type, entry, expected_return, true);
        self.run_override_if_any(ctx, call_type, entry)
    }

    /// If `entry` has an override, run it and synthesize the matching
    /// return so the emulated body is never entered.
    fn run_override_if_any(
        &mut self,
        ctx: &mut ExecContext,
        call_type: CallType,
        entry: SegmentedAddress,
    ) -> Result<(), CpuError> {
        let Some(mut handler) = self.overrides.remove(&entry) else {
            return Ok(());
        };
        log(LogCategory::Functions, LogLevel::Debug, || {
            format!("running {} override at {}", call_type, entry)
        });

        // The override sees (and may change) a consistent architectural IP.
        self.regs.ip = ctx.ip;
        let result = handler.run(self);
        self.overrides.insert(entry, handler);
        result?;
        ctx.ip = self.regs.ip;

        // Synthesized return of the same kind
        match call_type {
            CallType::Near => {
                ctx.ip = self.pop16();
            }
            CallType::Far => {
                ctx.ip = self.pop16();
                self.regs.cs = self.pop16();
            }
            CallType::Interrupt => {
                ctx.ip = self.pop16();
                self.regs.cs = self.pop16();
                let flags = self.pop16();
                self.flags.set_value(flags);
            }
        }
        let actual = SegmentedAddress::new(self.regs.cs, ctx.ip);
        self.active_tracker().ret(call_type, actual);
        Ok(())
    }

    fn run_callback(&mut self, ctx: &mut ExecContext, index: u16) -> Result<(), CpuError> {
        let Some(mut handler) = self.callback.take() else {
            return Err(CpuError::UnhandledCallback { index });
        };
        self.regs.ip = ctx.ip;
        let result = handler.run(self, index);
        self.callback = Some(handler);
        result?;
        ctx.ip = self.regs.ip;
        Ok(())
    }

    // ---- diagnostics --------------------------------------------------

    fn note_prefix(&mut self, label: &str) {
        if enabled(LogCategory::Cpu, LogLevel::Trace) {
            self.prefix_labels.push_str(label);
        }
    }

    fn note_instruction(&mut self, ctx: &ExecContext, opcode: u8) {
        if !enabled(LogCategory::Cpu, LogLevel::Trace) {
            return;
        }
        self.instruction_name.clear();
        self.instruction_name.push_str(mnemonic(opcode));
        let (cs, ip) = (self.regs.cs, ctx.start_ip);
        log(LogCategory::Cpu, LogLevel::Trace, || {
            format!(
                "{:04X}:{:04X} {}{} ({:02X})",
                cs, ip, self.prefix_labels, self.instruction_name, opcode
            )
        });
    }

    // ---- top level ----------------------------------------------------

    /// Execute one instruction (or wake-up check while halted).
    pub fn step(&mut self) -> Result<(), CpuError> {
        let mut ctx = ExecContext::new(self.regs.ip);

        if self.halted {
            // A pending external interrupt (IF=1) wakes the CPU
            self.service_external_interrupt(&mut ctx)?;
            self.regs.ip = ctx.ip;
            return Ok(());
        }

        self.recorder.begin_instruction();
        self.instruction_name.clear();
        self.prefix_labels.clear();

        // Fold prefixes; the first non-prefix byte is the opcode. Repeated
        // segment overrides collapse: the last one wins.
        let opcode = loop {
            let byte = self.fetch8(&mut ctx);
            let segment_prefix = match byte {
                0x26 => Some(SegmentOverride::ES),
                0x2E => Some(SegmentOverride::CS),
                0x36 => Some(SegmentOverride::SS),
                0x3E => Some(SegmentOverride::DS),
                0x64 => Some(SegmentOverride::FS),
                0x65 => Some(SegmentOverride::GS),
                _ => None,
            };
            if let Some(ovr) = segment_prefix {
                ctx.segment_override = Some(ovr);
                ctx.had_prefix = true;
                self.note_prefix(ovr.label());
                continue;
            }
            match byte {
                // LOCK: single CPU, nothing to arbitrate
                0xF0 => {
                    ctx.had_prefix = true;
                    self.note_prefix("LOCK ");
                }
                0xF2 => {
                    ctx.continue_zero_flag = Some(false);
                    ctx.had_prefix = true;
                    self.note_prefix("REPNZ ");
                }
                0xF3 => {
                    ctx.continue_zero_flag = Some(true);
                    ctx.had_prefix = true;
                    self.note_prefix("REPZ ");
                }
                _ => break byte,
            }
        };

        self.note_instruction(&ctx, opcode);

        if ctx.continue_zero_flag.is_some() && is_string_opcode(opcode) {
            self.run_rep(&mut ctx, opcode)?;
        } else {
            self.execute(&mut ctx, opcode)?;
        }

        self.recorder.commit();
        self.cycles = self.cycles.wrapping_add(1);
        self.service_external_interrupt(&mut ctx)?;
        self.regs.ip = ctx.ip;
        Ok(())
    }

    /// Step until the pause handler asks to stop, HLT with nothing pending,
    /// or the instruction budget runs out. The pause flag is only observed
    /// at instruction boundaries.
    pub fn run(
        &mut self,
        pause: &PauseHandler,
        max_instructions: u64,
    ) -> Result<StopReason, CpuError> {
        for _ in 0..max_instructions {
            if pause.is_paused() {
                return Ok(StopReason::Paused);
            }
            self.step()?;
            if self.halted && self.interrupt_line.pending().is_none() {
                return Ok(StopReason::Halted);
            }
        }
        Ok(StopReason::InstructionLimit)
    }

    // ---- string operations --------------------------------------------

    /// REP loop: run the primitive while CX != 0; CMPS/SCAS additionally
    /// stop when ZF disagrees with the REPZ/REPNZ condition.
    fn run_rep(&mut self, ctx: &mut ExecContext, opcode: u8) -> Result<(), CpuError> {
        let continue_zero = ctx.continue_zero_flag.unwrap_or(true);
        let compare_op = matches!(opcode, 0xA6 | 0xA7 | 0xAE | 0xAF);
        while self.regs.cx != 0 {
            self.string_op(ctx, opcode)?;
            self.regs.cx = self.regs.cx.wrapping_sub(1);
            if compare_op && self.flags.zero() != continue_zero {
                break;
            }
        }
        Ok(())
    }

    /// One execution of a string primitive. Source DS:SI honors the segment
    /// override; destination ES:DI never does.
    fn string_op(&mut self, ctx: &mut ExecContext, opcode: u8) -> Result<(), CpuError> {
        let wide = opcode & 1 != 0;
        let magnitude: u16 = if wide { 2 } else { 1 };
        let stride = if self.flags.direction() {
            0u16.wrapping_sub(magnitude)
        } else {
            magnitude
        };

        match opcode {
            // MOVS
            0xA4 | 0xA5 => {
                let src_seg = self.override_segment(ctx.segment_override, self.regs.ds);
                if wide {
                    let val = self.read_data16(src_seg, self.regs.si);
                    let (es, di) = (self.regs.es, self.regs.di);
                    self.write_data16(es, di, val);
                } else {
                    let val = self.read_data8(src_seg, self.regs.si);
                    let (es, di) = (self.regs.es, self.regs.di);
                    self.write_data8(es, di, val);
                }
                self.regs.si = self.regs.si.wrapping_add(stride);
                self.regs.di = self.regs.di.wrapping_add(stride);
            }
            // CMPS: SUB without write-back on the loaded values
            0xA6 | 0xA7 => {
                let src_seg = self.override_segment(ctx.segment_override, self.regs.ds);
                if wide {
                    let a = self.read_data16(src_seg, self.regs.si);
                    let (es, di) = (self.regs.es, self.regs.di);
                    let b = self.read_data16(es, di);
                    alu::cmp16(&mut self.flags, a, b);
                } else {
                    let a = self.read_data8(src_seg, self.regs.si);
                    let (es, di) = (self.regs.es, self.regs.di);
                    let b = self.read_data8(es, di);
                    alu::cmp8(&mut self.flags, a, b);
                }
                self.regs.si = self.regs.si.wrapping_add(stride);
                self.regs.di = self.regs.di.wrapping_add(stride);
            }
            // STOS
            0xAA | 0xAB => {
                let (es, di) = (self.regs.es, self.regs.di);
                if wide {
                    let ax = self.regs.ax;
                    self.write_data16(es, di, ax);
                } else {
                    let al = self.regs.al();
                    self.write_data8(es, di, al);
                }
                self.regs.di = self.regs.di.wrapping_add(stride);
            }
            // LODS
            0xAC | 0xAD => {
                let src_seg = self.override_segment(ctx.segment_override, self.regs.ds);
                if wide {
                    self.regs.ax = self.read_data16(src_seg, self.regs.si);
                } else {
                    let val = self.read_data8(src_seg, self.regs.si);
                    self.regs.set_al(val);
                }
                self.regs.si = self.regs.si.wrapping_add(stride);
            }
            // SCAS
            0xAE | 0xAF => {
                let (es, di) = (self.regs.es, self.regs.di);
                if wide {
                    let val = self.read_data16(es, di);
                    let ax = self.regs.ax;
                    alu::cmp16(&mut self.flags, ax, val);
                } else {
                    let val = self.read_data8(es, di);
                    let al = self.regs.al();
                    alu::cmp8(&mut self.flags, al, val);
                }
                self.regs.di = self.regs.di.wrapping_add(stride);
            }
            // INS
            0x6C | 0x6D => {
                let port = self.regs.dx;
                let (es, di) = (self.regs.es, self.regs.di);
                if wide {
                    let val = self.io.in16(port)?;
                    self.write_data16(es, di, val);
                } else {
                    let val = self.io.in8(port)?;
                    self.write_data8(es, di, val);
                }
                self.regs.di = self.regs.di.wrapping_add(stride);
            }
            // OUTS
            0x6E | 0x6F => {
                let src_seg = self.override_segment(ctx.segment_override, self.regs.ds);
                let port = self.regs.dx;
                if wide {
                    let val = self.read_data16(src_seg, self.regs.si);
                    self.io.out16(port, val)?;
                } else {
                    let val = self.read_data8(src_seg, self.regs.si);
                    self.io.out8(port, val)?;
                }
                self.regs.si = self.regs.si.wrapping_add(stride);
            }
            _ => unreachable!("not a string opcode: {:02X}", opcode),
        }
        Ok(())
    }

    // ---- ALU opcode families ------------------------------------------

    fn alu_rm8_r8(&mut self, ctx: &mut ExecContext, op: AluOp) {
        let m = self.fetch_modrm(ctx);
        let a = self.rm8(&m);
        let b = self.regs.reg8(m.reg);
        if let Some(result) = op.eval8(&mut self.flags, a, b) {
            self.set_rm8(&m, result);
        }
    }

    fn alu_rm16_r16(&mut self, ctx: &mut ExecContext, op: AluOp) {
        let m = self.fetch_modrm(ctx);
        let a = self.rm16(&m);
        let b = self.regs.reg16(m.reg);
        if let Some(result) = op.eval16(&mut self.flags, a, b) {
            self.set_rm16(&m, result);
        }
    }

    fn alu_r8_rm8(&mut self, ctx: &mut ExecContext, op: AluOp) {
        let m = self.fetch_modrm(ctx);
        let a = self.regs.reg8(m.reg);
        let b = self.rm8(&m);
        if let Some(result) = op.eval8(&mut self.flags, a, b) {
            self.regs.set_reg8(m.reg, result);
        }
    }

    fn alu_r16_rm16(&mut self, ctx: &mut ExecContext, op: AluOp) {
        let m = self.fetch_modrm(ctx);
        let a = self.regs.reg16(m.reg);
        let b = self.rm16(&m);
        if let Some(result) = op.eval16(&mut self.flags, a, b) {
            self.regs.set_reg16(m.reg, result);
        }
    }

    fn alu_al_imm8(&mut self, ctx: &mut ExecContext, op: AluOp) {
        let imm = self.fetch8(ctx);
        let a = self.regs.al();
        if let Some(result) = op.eval8(&mut self.flags, a, imm) {
            self.regs.set_al(result);
        }
    }

    fn alu_ax_imm16(&mut self, ctx: &mut ExecContext, op: AluOp) {
        let imm = self.fetch16(ctx);
        let a = self.regs.ax;
        if let Some(result) = op.eval16(&mut self.flags, a, imm) {
            self.regs.ax = result;
        }
    }

    // ---- grouped opcodes ----------------------------------------------

    /// Group 1 (0x80-0x83): ALU op selected by the reg field, immediate
    /// operand. 0x83 sign-extends a byte immediate to word size.
    fn group1(&mut self, ctx: &mut ExecContext, opcode: u8) {
        let m = self.fetch_modrm(ctx);
        let op = AluOp::from_index(m.reg);
        match opcode {
            0x80 | 0x82 => {
                let a = self.rm8(&m);
                let imm = self.fetch8(ctx);
                if let Some(result) = op.eval8(&mut self.flags, a, imm) {
                    self.set_rm8(&m, result);
                }
            }
            0x81 => {
                let a = self.rm16(&m);
                let imm = self.fetch16(ctx);
                if let Some(result) = op.eval16(&mut self.flags, a, imm) {
                    self.set_rm16(&m, result);
                }
            }
            _ => {
                let a = self.rm16(&m);
                let imm = self.fetch8(ctx) as i8 as u16;
                if let Some(result) = op.eval16(&mut self.flags, a, imm) {
                    self.set_rm16(&m, result);
                }
            }
        }
    }

    /// Group 2 (0xC0/0xC1 imm8, 0xD0/0xD1 by 1, 0xD2/0xD3 by CL).
    fn group2(&mut self, ctx: &mut ExecContext, opcode: u8) -> Result<(), CpuError> {
        let m = self.fetch_modrm(ctx);
        let op = ShiftOp::from_index(opcode, m.reg, self.regs.cs, ctx.start_ip)?;
        let count = match opcode {
            0xC0 | 0xC1 => self.fetch8(ctx),
            0xD0 | 0xD1 => 1,
            _ => self.regs.cl(),
        };
        if opcode & 1 == 0 {
            let val = self.rm8(&m);
            let result = match op {
                ShiftOp::Rol => alu::rol8(&mut self.flags, val, count),
                ShiftOp::Ror => alu::ror8(&mut self.flags, val, count),
                ShiftOp::Rcl => alu::rcl8(&mut self.flags, val, count),
                ShiftOp::Rcr => alu::rcr8(&mut self.flags, val, count),
                ShiftOp::Shl => alu::shl8(&mut self.flags, val, count),
                ShiftOp::Shr => alu::shr8(&mut self.flags, val, count),
                ShiftOp::Sar => alu::sar8(&mut self.flags, val, count),
            };
            self.set_rm8(&m, result);
        } else {
            let val = self.rm16(&m);
            let result = match op {
                ShiftOp::Rol => alu::rol16(&mut self.flags, val, count),
                ShiftOp::Ror => alu::ror16(&mut self.flags, val, count),
                ShiftOp::Rcl => alu::rcl16(&mut self.flags, val, count),
                ShiftOp::Rcr => alu::rcr16(&mut self.flags, val, count),
                ShiftOp::Shl => alu::shl16(&mut self.flags, val, count),
                ShiftOp::Shr => alu::shr16(&mut self.flags, val, count),
                ShiftOp::Sar => alu::sar16(&mut self.flags, val, count),
            };
            self.set_rm16(&m, result);
        }
        Ok(())
    }

    /// Group 3 byte form (0xF6): TEST/NOT/NEG/MUL/IMUL/DIV/IDIV on r/m8.
    fn group3_byte(&mut self, ctx: &mut ExecContext) -> Result<(), CpuError> {
        let m = self.fetch_modrm(ctx);
        match m.reg {
            0 => {
                let val = self.rm8(&m);
                let imm = self.fetch8(ctx);
                alu::test8(&mut self.flags, val, imm);
            }
            2 => {
                let val = self.rm8(&m);
                let result = alu::not8(&mut self.flags, val);
                self.set_rm8(&m, result);
            }
            3 => {
                let val = self.rm8(&m);
                let result = alu::neg8(&mut self.flags, val);
                self.set_rm8(&m, result);
            }
            4 => {
                let val = self.rm8(&m);
                let al = self.regs.al();
                self.regs.ax = alu::mul8(&mut self.flags, al, val);
            }
            5 => {
                let val = self.rm8(&m) as i8;
                let al = self.regs.al() as i8;
                self.regs.ax = alu::imul8(&mut self.flags, al, val) as u16;
            }
            6 => {
                let divisor = self.rm8(&m);
                match alu::div8(self.regs.ax, divisor) {
                    Some((quotient, remainder)) => {
                        self.regs.set_al(quotient);
                        self.regs.set_ah(remainder);
                    }
                    None => return self.division_fault(ctx),
                }
            }
            7 => {
                let divisor = self.rm8(&m) as i8;
                match alu::idiv8(self.regs.ax as i16, divisor) {
                    Some((quotient, remainder)) => {
                        self.regs.set_al(quotient as u8);
                        self.regs.set_ah(remainder as u8);
                    }
                    None => return self.division_fault(ctx),
                }
            }
            index => {
                return Err(CpuError::InvalidGroupIndex {
                    group: 0xF6,
                    index,
                    cs: self.regs.cs,
                    ip: ctx.start_ip,
                })
            }
        }
        Ok(())
    }

    /// Group 3 word form (0xF7).
    fn group3_word(&mut self, ctx: &mut ExecContext) -> Result<(), CpuError> {
        let m = self.fetch_modrm(ctx);
        match m.reg {
            0 => {
                let val = self.rm16(&m);
                let imm = self.fetch16(ctx);
                alu::test16(&mut self.flags, val, imm);
            }
            2 => {
                let val = self.rm16(&m);
                let result = alu::not16(&mut self.flags, val);
                self.set_rm16(&m, result);
            }
            3 => {
                let val = self.rm16(&m);
                let result = alu::neg16(&mut self.flags, val);
                self.set_rm16(&m, result);
            }
            4 => {
                let val = self.rm16(&m);
                let ax = self.regs.ax;
                let product = alu::mul16(&mut self.flags, ax, val);
                self.regs.ax = product as u16;
                self.regs.dx = (product >> 16) as u16;
            }
            5 => {
                let val = self.rm16(&m) as i16;
                let ax = self.regs.ax as i16;
                let product = alu::imul16(&mut self.flags, ax, val);
                self.regs.ax = product as u16;
                self.regs.dx = (product >> 16) as u16;
            }
            6 => {
                let divisor = self.rm16(&m);
                let dividend = ((self.regs.dx as u32) << 16) | self.regs.ax as u32;
                match alu::div16(dividend, divisor) {
                    Some((quotient, remainder)) => {
                        self.regs.ax = quotient;
                        self.regs.dx = remainder;
                    }
                    None => return self.division_fault(ctx),
                }
            }
            7 => {
                let divisor = self.rm16(&m) as i16;
                let dividend = (((self.regs.dx as u32) << 16) | self.regs.ax as u32) as i32;
                match alu::idiv16(dividend, divisor) {
                    Some((quotient, remainder)) => {
                        self.regs.ax = quotient as u16;
                        self.regs.dx = remainder as u16;
                    }
                    None => return self.division_fault(ctx),
                }
            }
            index => {
                return Err(CpuError::InvalidGroupIndex {
                    group: 0xF7,
                    index,
                    cs: self.regs.cs,
                    ip: ctx.start_ip,
                })
            }
        }
        Ok(())
    }

    /// Group 4 (0xFE): INC/DEC r/m8, plus the emulator callback at
    /// sub-index 7 (`FE 38 <imm16>`).
    fn group4(&mut self, ctx: &mut ExecContext) -> Result<(), CpuError> {
        let byte = self.fetch8(ctx);
        if byte == CALLBACK_MODRM {
            let index = self.fetch16(ctx);
            return self.run_callback(ctx, index);
        }
        let m = self.decode_modrm(ctx, byte);
        match m.reg {
            0 => {
                let val = self.rm8(&m);
                let result = alu::inc8(&mut self.flags, val);
                self.set_rm8(&m, result);
            }
            1 => {
                let val = self.rm8(&m);
                let result = alu::dec8(&mut self.flags, val);
                self.set_rm8(&m, result);
            }
            index => {
                return Err(CpuError::InvalidGroupIndex {
                    group: 0xFE,
                    index,
                    cs: self.regs.cs,
                    ip: ctx.start_ip,
                })
            }
        }
        Ok(())
    }

    /// Group 5 (0xFF): INC/DEC r/m16, indirect CALL/JMP (near and far),
    /// PUSH r/m16.
    fn group5(&mut self, ctx: &mut ExecContext) -> Result<(), CpuError> {
        let m = self.fetch_modrm(ctx);
        match m.reg {
            0 => {
                let val = self.rm16(&m);
                let result = alu::inc16(&mut self.flags, val);
                self.set_rm16(&m, result);
            }
            1 => {
                let val = self.rm16(&m);
                let result = alu::dec16(&mut self.flags, val);
                self.set_rm16(&m, result);
            }
            // CALL near indirect
            2 => {
                let target = self.rm16(&m);
                self.push16(ctx.ip);
                let expected_return = SegmentedAddress::new(self.regs.cs, ctx.ip);
                ctx.ip = target;
                let entry = SegmentedAddress::new(self.regs.cs, target);
                self.record_call(ctx, CallType::Near, entry, expected_return)?;
            }
            // CALL far indirect: operand must be memory
            3 => {
                let Some(addr) = m.memory_address() else {
                    return Err(CpuError::InvalidOpcode {
                        opcode: 0xFF,
                        after_prefix: ctx.had_prefix,
                        cs: self.regs.cs,
                        ip: ctx.start_ip,
                    });
                };
                let target = self.read_far_pointer(addr.segment, addr.offset);
                self.push16(self.regs.cs);
                self.push16(ctx.ip);
                let expected_return = SegmentedAddress::new(self.regs.cs, ctx.ip);
                self.regs.cs = target.segment;
                ctx.ip = target.offset;
                self.record_call(ctx, CallType::Far, target, expected_return)?;
            }
            // JMP near indirect
            4 => {
                ctx.ip = self.rm16(&m);
            }
            // JMP far indirect
            5 => {
                let Some(addr) = m.memory_address() else {
                    return Err(CpuError::InvalidOpcode {
                        opcode: 0xFF,
                        after_prefix: ctx.had_prefix,
                        cs: self.regs.cs,
                        ip: ctx.start_ip,
                    });
                };
                let target = self.read_far_pointer(addr.segment, addr.offset);
                self.regs.cs = target.segment;
                ctx.ip = target.offset;
            }
            // PUSH r/m16
            6 => {
                let val = self.rm16(&m);
                self.push16(val);
            }
            index => {
                return Err(CpuError::InvalidGroupIndex {
                    group: 0xFF,
                    index,
                    cs: self.regs.cs,
                    ip: ctx.start_ip,
                })
            }
        }
        Ok(())
    }

    // ---- BCD adjusts ---------------------------------------------------

    fn daa(&mut self) {
        let old_al = self.regs.al();
        let old_cf = self.flags.carry();
        let mut al = old_al;
        let mut cf = false;
        if (old_al & 0x0F) > 9 || self.flags.adjust() {
            al = al.wrapping_add(0x06);
            cf = old_cf || old_al > 0xF9;
            self.flags.set_adjust(true);
        } else {
            self.flags.set_adjust(false);
        }
        if old_al > 0x99 || old_cf {
            al = al.wrapping_add(0x60);
            cf = true;
        }
        self.regs.set_al(al);
        self.flags.set_carry(cf);
        alu::set_result_flags8(&mut self.flags, al);
    }

    fn das(&mut self) {
        let old_al = self.regs.al();
        let old_cf = self.flags.carry();
        let mut al = old_al;
        let mut cf = false;
        if (old_al & 0x0F) > 9 || self.flags.adjust() {
            al = al.wrapping_sub(0x06);
            cf = old_cf || old_al < 0x06;
            self.flags.set_adjust(true);
        } else {
            self.flags.set_adjust(false);
        }
        if old_al > 0x99 || old_cf {
            al = al.wrapping_sub(0x60);
            cf = true;
        }
        self.regs.set_al(al);
        self.flags.set_carry(cf);
        alu::set_result_flags8(&mut self.flags, al);
    }

    fn aaa(&mut self) {
        if (self.regs.al() & 0x0F) > 9 || self.flags.adjust() {
            self.regs.ax = self.regs.ax.wrapping_add(0x0106);
            self.flags.set_adjust(true);
            self.flags.set_carry(true);
        } else {
            self.flags.set_adjust(false);
            self.flags.set_carry(false);
        }
        let al = self.regs.al() & 0x0F;
        self.regs.set_al(al);
    }

    fn aas(&mut self) {
        if (self.regs.al() & 0x0F) > 9 || self.flags.adjust() {
            self.regs.ax = self.regs.ax.wrapping_sub(0x0006);
            self.regs.set_ah(self.regs.ah().wrapping_sub(1));
            self.flags.set_adjust(true);
            self.flags.set_carry(true);
        } else {
            self.flags.set_adjust(false);
            self.flags.set_carry(false);
        }
        let al = self.regs.al() & 0x0F;
        self.regs.set_al(al);
    }

    // ---- two-byte map (0x0F) ------------------------------------------

    /// The 80286/80386 subset DOS programs actually touch: PUSH/POP FS/GS,
    /// Jcc rel16, SETcc, MOVZX/MOVSX. Anything else in 0x0F space is
    /// invalid here.
    fn execute_0f(&mut self, ctx: &mut ExecContext) -> Result<(), CpuError> {
        let opcode = self.fetch8(ctx);
        match opcode {
            // Jcc rel16
            0x80..=0x8F => {
                let disp = self.fetch16(ctx);
                if self.condition(opcode & 0x0F) {
                    ctx.ip = ctx.ip.wrapping_add(disp);
                }
            }
            // SETcc r/m8
            0x90..=0x9F => {
                let m = self.fetch_modrm(ctx);
                let val = self.condition(opcode & 0x0F) as u8;
                self.set_rm8(&m, val);
            }
            0xA0 => self.push16(self.regs.fs),
            0xA1 => self.regs.fs = self.pop16(),
            0xA8 => self.push16(self.regs.gs),
            0xA9 => self.regs.gs = self.pop16(),
            // MOVZX r16, r/m8
            0xB6 => {
                let m = self.fetch_modrm(ctx);
                let val = self.rm8(&m) as u16;
                self.regs.set_reg16(m.reg, val);
            }
            // MOVZX r16, r/m16 (no-op extension at this operand size)
            0xB7 => {
                let m = self.fetch_modrm(ctx);
                let val = self.rm16(&m);
                self.regs.set_reg16(m.reg, val);
            }
            // MOVSX r16, r/m8
            0xBE => {
                let m = self.fetch_modrm(ctx);
                let val = self.rm8(&m) as i8 as u16;
                self.regs.set_reg16(m.reg, val);
            }
            // MOVSX r16, r/m16
            0xBF => {
                let m = self.fetch_modrm(ctx);
                let val = self.rm16(&m);
                self.regs.set_reg16(m.reg, val);
            }
            _ => {
                return Err(CpuError::InvalidOpcode {
                    opcode,
                    after_prefix: true,
                    cs: self.regs.cs,
                    ip: ctx.start_ip,
                })
            }
        }
        Ok(())
    }

    // ---- x87 stub -----------------------------------------------------

    /// No FPU is present. Escape opcodes consume their operand bytes and do
    /// nothing, except the status/control-word stores FPU probes rely on,
    /// which deliver 0xFFFF so detection concludes there is no coprocessor.
    fn execute_x87(&mut self, ctx: &mut ExecContext, opcode: u8) -> Result<(), CpuError> {
        let byte = self.fetch8(ctx);
        // FNSTSW AX
        if opcode == 0xDF && byte == 0xE0 {
            self.regs.ax = 0xFFFF;
            return Ok(());
        }
        let m = self.decode_modrm(ctx, byte);
        let stores_word = (opcode == 0xD9 && m.reg == 7) // FNSTCW m16
            || (opcode == 0xDD && m.reg == 7); // FNSTSW m16
        if stores_word {
            if let Some(addr) = m.memory_address() {
                self.write_data16(addr.segment, addr.offset, 0xFFFF);
            }
        }
        log(LogCategory::Stubs, LogLevel::Trace, || {
            format!("x87 escape {:02X}/{} ignored", opcode, m.reg)
        });
        Ok(())
    }

    // ---- opcode dispatch ----------------------------------------------

    fn execute(&mut self, ctx: &mut ExecContext, opcode: u8) -> Result<(), CpuError> {
        match opcode {
            // ALU block: operation in bits 5-3, form in bits 2-0
            0x00 | 0x08 | 0x10 | 0x18 | 0x20 | 0x28 | 0x30 | 0x38 => {
                self.alu_rm8_r8(ctx, AluOp::from_index(opcode >> 3))
            }
            0x01 | 0x09 | 0x11 | 0x19 | 0x21 | 0x29 | 0x31 | 0x39 => {
                self.alu_rm16_r16(ctx, AluOp::from_index(opcode >> 3))
            }
            0x02 | 0x0A | 0x12 | 0x1A | 0x22 | 0x2A | 0x32 | 0x3A => {
                self.alu_r8_rm8(ctx, AluOp::from_index(opcode >> 3))
            }
            0x03 | 0x0B | 0x13 | 0x1B | 0x23 | 0x2B | 0x33 | 0x3B => {
                self.alu_r16_rm16(ctx, AluOp::from_index(opcode >> 3))
            }
            0x04 | 0x0C | 0x14 | 0x1C | 0x24 | 0x2C | 0x34 | 0x3C => {
                self.alu_al_imm8(ctx, AluOp::from_index(opcode >> 3))
            }
            0x05 | 0x0D | 0x15 | 0x1D | 0x25 | 0x2D | 0x35 | 0x3D => {
                self.alu_ax_imm16(ctx, AluOp::from_index(opcode >> 3))
            }

            0x06 => self.push16(self.regs.es),
            0x07 => self.regs.es = self.pop16(),
            0x0E => self.push16(self.regs.cs),
            0x0F => return self.execute_0f(ctx),
            0x16 => self.push16(self.regs.ss),
            0x17 => self.regs.ss = self.pop16(),
            0x1E => self.push16(self.regs.ds),
            0x1F => self.regs.ds = self.pop16(),

            0x27 => self.daa(),
            0x2F => self.das(),
            0x37 => self.aaa(),
            0x3F => self.aas(),

            // INC/DEC r16
            0x40..=0x47 => {
                let index = opcode & 0x07;
                let val = self.regs.reg16(index);
                let result = alu::inc16(&mut self.flags, val);
                self.regs.set_reg16(index, result);
            }
            0x48..=0x4F => {
                let index = opcode & 0x07;
                let val = self.regs.reg16(index);
                let result = alu::dec16(&mut self.flags, val);
                self.regs.set_reg16(index, result);
            }

            // PUSH/POP r16
            0x50..=0x57 => {
                let val = self.regs.reg16(opcode & 0x07);
                self.push16(val);
            }
            0x58..=0x5F => {
                let val = self.pop16();
                self.regs.set_reg16(opcode & 0x07, val);
            }

            // PUSHA/POPA (80186+)
            0x60 => {
                let original_sp = self.regs.sp;
                self.push16(self.regs.ax);
                self.push16(self.regs.cx);
                self.push16(self.regs.dx);
                self.push16(self.regs.bx);
                self.push16(original_sp);
                self.push16(self.regs.bp);
                self.push16(self.regs.si);
                self.push16(self.regs.di);
            }
            0x61 => {
                self.regs.di = self.pop16();
                self.regs.si = self.pop16();
                self.regs.bp = self.pop16();
                self.regs.sp = self.regs.sp.wrapping_add(2); // SP slot skipped
                self.regs.bx = self.pop16();
                self.regs.dx = self.pop16();
                self.regs.cx = self.pop16();
                self.regs.ax = self.pop16();
            }

            // BOUND r16, m16&16 (80186+): out of range raises INT 5
            0x62 => {
                let m = self.fetch_modrm(ctx);
                let Some(addr) = m.memory_address() else {
                    return Err(CpuError::InvalidOpcode {
                        opcode,
                        after_prefix: ctx.had_prefix,
                        cs: self.regs.cs,
                        ip: ctx.start_ip,
                    });
                };
                let lower = self.read_data16(addr.segment, addr.offset) as i16;
                let upper =
                    self.read_data16(addr.segment, addr.offset.wrapping_add(2)) as i16;
                let index = self.regs.reg16(m.reg) as i16;
                if index < lower || index > upper {
                    self.interrupt(ctx, 5, false)?;
                }
            }

            // PUSH imm16 / imm8 (80186+)
            0x68 => {
                let val = self.fetch16(ctx);
                self.push16(val);
            }
            0x6A => {
                let val = self.fetch8(ctx) as i8 as u16;
                self.push16(val);
            }

            // IMUL r16, r/m16, imm (80186+)
            0x69 => {
                let m = self.fetch_modrm(ctx);
                let a = self.rm16(&m) as i16;
                let imm = self.fetch16(ctx) as i16;
                let product = alu::imul16(&mut self.flags, a, imm);
                self.regs.set_reg16(m.reg, product as u16);
            }
            0x6B => {
                let m = self.fetch_modrm(ctx);
                let a = self.rm16(&m) as i16;
                let imm = self.fetch8(ctx) as i8 as i16;
                let product = alu::imul16(&mut self.flags, a, imm);
                self.regs.set_reg16(m.reg, product as u16);
            }

            // INS/OUTS single forms
            0x6C..=0x6F => return self.string_op(ctx, opcode),

            // Jcc rel8
            0x70..=0x7F => {
                let disp = self.fetch8(ctx) as i8;
                if self.condition(opcode & 0x0F) {
                    ctx.ip = ctx.ip.wrapping_add(disp as u16);
                }
            }

            // Group 1: immediate ALU forms
            0x80..=0x83 => self.group1(ctx, opcode),

            0x84 => {
                let m = self.fetch_modrm(ctx);
                let a = self.rm8(&m);
                let b = self.regs.reg8(m.reg);
                alu::test8(&mut self.flags, a, b);
            }
            0x85 => {
                let m = self.fetch_modrm(ctx);
                let a = self.rm16(&m);
                let b = self.regs.reg16(m.reg);
                alu::test16(&mut self.flags, a, b);
            }

            // XCHG
            0x86 => {
                let m = self.fetch_modrm(ctx);
                let a = self.rm8(&m);
                let b = self.regs.reg8(m.reg);
                self.set_rm8(&m, b);
                self.regs.set_reg8(m.reg, a);
            }
            0x87 => {
                let m = self.fetch_modrm(ctx);
                let a = self.rm16(&m);
                let b = self.regs.reg16(m.reg);
                self.set_rm16(&m, b);
                self.regs.set_reg16(m.reg, a);
            }

            // MOV
            0x88 => {
                let m = self.fetch_modrm(ctx);
                let val = self.regs.reg8(m.reg);
                self.set_rm8(&m, val);
            }
            0x89 => {
                let m = self.fetch_modrm(ctx);
                let val = self.regs.reg16(m.reg);
                self.set_rm16(&m, val);
            }
            0x8A => {
                let m = self.fetch_modrm(ctx);
                let val = self.rm8(&m);
                self.regs.set_reg8(m.reg, val);
            }
            0x8B => {
                let m = self.fetch_modrm(ctx);
                let val = self.rm16(&m);
                self.regs.set_reg16(m.reg, val);
            }
            // MOV r/m16, sreg
            0x8C => {
                let m = self.fetch_modrm(ctx);
                if m.reg > 5 {
                    return Err(CpuError::InvalidOpcode {
                        opcode,
                        after_prefix: ctx.had_prefix,
                        cs: self.regs.cs,
                        ip: ctx.start_ip,
                    });
                }
                let val = self.regs.segment(m.reg);
                self.set_rm16(&m, val);
            }
            // LEA r16, m
            0x8D => {
                let m = self.fetch_modrm(ctx);
                let Some(addr) = m.memory_address() else {
                    return Err(CpuError::InvalidOpcode {
                        opcode,
                        after_prefix: ctx.had_prefix,
                        cs: self.regs.cs,
                        ip: ctx.start_ip,
                    });
                };
                self.regs.set_reg16(m.reg, addr.offset);
            }
            // MOV sreg, r/m16 (loading CS this way is invalid)
            0x8E => {
                let m = self.fetch_modrm(ctx);
                if m.reg > 5 || m.reg == 1 {
                    return Err(CpuError::InvalidOpcode {
                        opcode,
                        after_prefix: ctx.had_prefix,
                        cs: self.regs.cs,
                        ip: ctx.start_ip,
                    });
                }
                let val = self.rm16(&m);
                self.regs.set_segment(m.reg, val);
            }
            // POP r/m16 (group 1A, only sub-index 0 exists)
            0x8F => {
                let m = self.fetch_modrm(ctx);
                if m.reg != 0 {
                    return Err(CpuError::InvalidGroupIndex {
                        group: opcode,
                        index: m.reg,
                        cs: self.regs.cs,
                        ip: ctx.start_ip,
                    });
                }
                let val = self.pop16();
                self.set_rm16(&m, val);
            }

            // NOP (XCHG AX, AX)
            0x90 => {}
            // XCHG AX, r16
            0x91..=0x97 => {
                let index = opcode & 0x07;
                let val = self.regs.reg16(index);
                let ax = self.regs.ax;
                self.regs.set_reg16(index, ax);
                self.regs.ax = val;
            }

            // CBW / CWD
            0x98 => self.regs.ax = self.regs.al() as i8 as u16,
            0x99 => {
                self.regs.dx = if self.regs.ax & 0x8000 != 0 {
                    0xFFFF
                } else {
                    0x0000
                }
            }

            // CALL far absolute
            0x9A => {
                let offset = self.fetch16(ctx);
                let segment = self.fetch16(ctx);
                self.push16(self.regs.cs);
                self.push16(ctx.ip);
                let expected_return = SegmentedAddress::new(self.regs.cs, ctx.ip);
                self.regs.cs = segment;
                ctx.ip = offset;
                let entry = SegmentedAddress::new(segment, offset);
                self.record_call(ctx, CallType::Far, entry, expected_return)?;
            }

            // WAIT/FWAIT: no FPU to wait for
            0x9B => {}

            0x9C => {
                let flags = self.flags.value();
                self.push16(flags);
            }
            0x9D => {
                let flags = self.pop16();
                self.flags.set_value(flags);
            }
            // SAHF: only SF/ZF/AF/PF/CF come from AH
            0x9E => {
                let ah = self.regs.ah();
                self.flags.set_sign(ah & 0x80 != 0);
                self.flags.set_zero(ah & 0x40 != 0);
                self.flags.set_adjust(ah & 0x10 != 0);
                self.flags.set_parity(ah & 0x04 != 0);
                self.flags.set_carry(ah & 0x01 != 0);
            }
            0x9F => {
                let low = (self.flags.value() & 0x00FF) as u8;
                self.regs.set_ah(low);
            }

            // MOV accumulator <-> direct address
            0xA0 => {
                let offset = self.fetch16(ctx);
                let segment = self.override_segment(ctx.segment_override, self.regs.ds);
                let val = self.read_data8(segment, offset);
                self.regs.set_al(val);
            }
            0xA1 => {
                let offset = self.fetch16(ctx);
                let segment = self.override_segment(ctx.segment_override, self.regs.ds);
                self.regs.ax = self.read_data16(segment, offset);
            }
            0xA2 => {
                let offset = self.fetch16(ctx);
                let segment = self.override_segment(ctx.segment_override, self.regs.ds);
                let val = self.regs.al();
                self.write_data8(segment, offset, val);
            }
            0xA3 => {
                let offset = self.fetch16(ctx);
                let segment = self.override_segment(ctx.segment_override, self.regs.ds);
                let val = self.regs.ax;
                self.write_data16(segment, offset, val);
            }

            // String single forms
            0xA4..=0xA7 => return self.string_op(ctx, opcode),

            0xA8 => {
                let imm = self.fetch8(ctx);
                let al = self.regs.al();
                alu::test8(&mut self.flags, al, imm);
            }
            0xA9 => {
                let imm = self.fetch16(ctx);
                let ax = self.regs.ax;
                alu::test16(&mut self.flags, ax, imm);
            }

            0xAA..=0xAF => return self.string_op(ctx, opcode),

            // MOV r8, imm8
            0xB0..=0xB7 => {
                let val = self.fetch8(ctx);
                self.regs.set_reg8(opcode & 0x07, val);
            }
            // MOV r16, imm16
            0xB8..=0xBF => {
                let val = self.fetch16(ctx);
                self.regs.set_reg16(opcode & 0x07, val);
            }

            // Group 2 with imm8 count (80186+)
            0xC0 | 0xC1 => return self.group2(ctx, opcode),

            // RET near
            0xC2 => {
                let adjust = self.fetch16(ctx);
                ctx.ip = self.pop16();
                self.regs.sp = self.regs.sp.wrapping_add(adjust);
                let actual = SegmentedAddress::new(self.regs.cs, ctx.ip);
                self.active_tracker().ret(CallType::Near, actual);
            }
            0xC3 => {
                ctx.ip = self.pop16();
                let actual = SegmentedAddress::new(self.regs.cs, ctx.ip);
                self.active_tracker().ret(CallType::Near, actual);
            }

            // LES / LDS
            0xC4 | 0xC5 => {
                let m = self.fetch_modrm(ctx);
                let Some(addr) = m.memory_address() else {
                    return Err(CpuError::InvalidOpcode {
                        opcode,
                        after_prefix: ctx.had_prefix,
                        cs: self.regs.cs,
                        ip: ctx.start_ip,
                    });
                };
                let pointer = self.read_far_pointer(addr.segment, addr.offset);
                self.regs.set_reg16(m.reg, pointer.offset);
                if opcode == 0xC4 {
                    self.regs.es = pointer.segment;
                } else {
                    self.regs.ds = pointer.segment;
                }
            }

            // MOV r/m, imm (group 11, only sub-index 0 exists)
            0xC6 => {
                let m = self.fetch_modrm(ctx);
                if m.reg != 0 {
                    return Err(CpuError::InvalidGroupIndex {
                        group: opcode,
                        index: m.reg,
                        cs: self.regs.cs,
                        ip: ctx.start_ip,
                    });
                }
                let val = self.fetch8(ctx);
                self.set_rm8(&m, val);
            }
            0xC7 => {
                let m = self.fetch_modrm(ctx);
                if m.reg != 0 {
                    return Err(CpuError::InvalidGroupIndex {
                        group: opcode,
                        index: m.reg,
                        cs: self.regs.cs,
                        ip: ctx.start_ip,
                    });
                }
                let val = self.fetch16(ctx);
                self.set_rm16(&m, val);
            }

            // ENTER / LEAVE (80186+)
            0xC8 => {
                let frame_size = self.fetch16(ctx);
                let level = self.fetch8(ctx) & 0x1F;
                self.push16(self.regs.bp);
                let frame_ptr = self.regs.sp;
                if level > 0 {
                    for _ in 1..level {
                        self.regs.bp = self.regs.bp.wrapping_sub(2);
                        let (ss, bp) = (self.regs.ss, self.regs.bp);
                        let val = self.read_data16(ss, bp);
                        self.push16(val);
                    }
                    self.push16(frame_ptr);
                }
                self.regs.bp = frame_ptr;
                self.regs.sp = self.regs.sp.wrapping_sub(frame_size);
            }
            0xC9 => {
                self.regs.sp = self.regs.bp;
                self.regs.bp = self.pop16();
            }

            // RET far
            0xCA => {
                let adjust = self.fetch16(ctx);
                ctx.ip = self.pop16();
                self.regs.cs = self.pop16();
                self.regs.sp = self.regs.sp.wrapping_add(adjust);
                let actual = SegmentedAddress::new(self.regs.cs, ctx.ip);
                self.active_tracker().ret(CallType::Far, actual);
            }
            0xCB => {
                ctx.ip = self.pop16();
                self.regs.cs = self.pop16();
                let actual = SegmentedAddress::new(self.regs.cs, ctx.ip);
                self.active_tracker().ret(CallType::Far, actual);
            }

            // INT3 / INT imm8 / INTO / IRET
            0xCC => self.interrupt(ctx, 3, false)?,
            0xCD => {
                let vector = self.fetch8(ctx);
                self.interrupt(ctx, vector, false)?;
            }
            0xCE => {
                if self.flags.overflow() {
                    self.interrupt(ctx, 4, false)?;
                }
            }
            0xCF => self.iret(ctx),

            // Group 2 classic forms
            0xD0..=0xD3 => return self.group2(ctx, opcode),

            // AAM / AAD with explicit base
            0xD4 => {
                let base = self.fetch8(ctx);
                if base == 0 {
                    return self.division_fault(ctx);
                }
                let al = self.regs.al();
                self.regs.set_ah(al / base);
                let remainder = al % base;
                self.regs.set_al(remainder);
                alu::set_result_flags8(&mut self.flags, remainder);
            }
            0xD5 => {
                let base = self.fetch8(ctx);
                let result = self
                    .regs
                    .al()
                    .wrapping_add(self.regs.ah().wrapping_mul(base));
                self.regs.set_al(result);
                self.regs.set_ah(0);
                alu::set_result_flags8(&mut self.flags, result);
            }

            // XLAT: AL = [DS:BX+AL], overridable
            0xD7 => {
                let offset = self.regs.bx.wrapping_add(self.regs.al() as u16);
                let segment = self.override_segment(ctx.segment_override, self.regs.ds);
                let val = self.read_data8(segment, offset);
                self.regs.set_al(val);
            }

            // x87 escape range
            0xD8..=0xDF => return self.execute_x87(ctx, opcode),

            // LOOPNZ / LOOPZ / LOOP / JCXZ
            0xE0 => {
                let disp = self.fetch8(ctx) as i8;
                self.regs.cx = self.regs.cx.wrapping_sub(1);
                if self.regs.cx != 0 && !self.flags.zero() {
                    ctx.ip = ctx.ip.wrapping_add(disp as u16);
                }
            }
            0xE1 => {
                let disp = self.fetch8(ctx) as i8;
                self.regs.cx = self.regs.cx.wrapping_sub(1);
                if self.regs.cx != 0 && self.flags.zero() {
                    ctx.ip = ctx.ip.wrapping_add(disp as u16);
                }
            }
            0xE2 => {
                let disp = self.fetch8(ctx) as i8;
                self.regs.cx = self.regs.cx.wrapping_sub(1);
                if self.regs.cx != 0 {
                    ctx.ip = ctx.ip.wrapping_add(disp as u16);
                }
            }
            0xE3 => {
                let disp = self.fetch8(ctx) as i8;
                if self.regs.cx == 0 {
                    ctx.ip = ctx.ip.wrapping_add(disp as u16);
                }
            }

            // IN / OUT with immediate port
            0xE4 => {
                let port = self.fetch8(ctx) as u16;
                let val = self.io.in8(port)?;
                self.regs.set_al(val);
            }
            0xE5 => {
                let port = self.fetch8(ctx) as u16;
                self.regs.ax = self.io.in16(port)?;
            }
            0xE6 => {
                let port = self.fetch8(ctx) as u16;
                let val = self.regs.al();
                self.io.out8(port, val)?;
            }
            0xE7 => {
                let port = self.fetch8(ctx) as u16;
                let val = self.regs.ax;
                self.io.out16(port, val)?;
            }

            // CALL rel16
            0xE8 => {
                let disp = self.fetch16(ctx);
                self.push16(ctx.ip);
                let expected_return = SegmentedAddress::new(self.regs.cs, ctx.ip);
                ctx.ip = ctx.ip.wrapping_add(disp);
                let entry = SegmentedAddress::new(self.regs.cs, ctx.ip);
                self.record_call(ctx, CallType::Near, entry, expected_return)?;
            }
            // JMP rel16 / far / rel8
            0xE9 => {
                let disp = self.fetch16(ctx);
                ctx.ip = ctx.ip.wrapping_add(disp);
            }
            0xEA => {
                let offset = self.fetch16(ctx);
                let segment = self.fetch16(ctx);
                self.regs.cs = segment;
                ctx.ip = offset;
            }
            0xEB => {
                let disp = self.fetch8(ctx) as i8;
                ctx.ip = ctx.ip.wrapping_add(disp as u16);
            }

            // IN / OUT with DX port
            0xEC => {
                let port = self.regs.dx;
                let val = self.io.in8(port)?;
                self.regs.set_al(val);
            }
            0xED => {
                let port = self.regs.dx;
                self.regs.ax = self.io.in16(port)?;
            }
            0xEE => {
                let port = self.regs.dx;
                let val = self.regs.al();
                self.io.out8(port, val)?;
            }
            0xEF => {
                let port = self.regs.dx;
                let val = self.regs.ax;
                self.io.out16(port, val)?;
            }

            0xF4 => self.halted = true,
            0xF5 => {
                let carry = self.flags.carry();
                self.flags.set_carry(!carry);
            }

            0xF6 => return self.group3_byte(ctx),
            0xF7 => return self.group3_word(ctx),

            0xF8 => self.flags.set_carry(false),
            0xF9 => self.flags.set_carry(true),
            0xFA => self.flags.set_interrupt_enable(false),
            0xFB => self.flags.set_interrupt_enable(true),
            0xFC => self.flags.set_direction(false),
            0xFD => self.flags.set_direction(true),

            0xFE => return self.group4(ctx),
            0xFF => return self.group5(ctx),

            // Everything else is undefined here (0x63 ARPL, 0x66/0x67
            // operand-size prefixes, 0xD6 SALC, 0xF1, ...)
            _ => {
                return Err(CpuError::InvalidOpcode {
                    opcode,
                    after_prefix: ctx.had_prefix,
                    cs: self.regs.cs,
                    ip: ctx.start_ip,
                })
            }
        }
        Ok(())
    }
}

/// String-op opcodes eligible for REP (MOVS/CMPS/STOS/LODS/SCAS/INS/OUTS).
fn is_string_opcode(opcode: u8) -> bool {
    matches!(opcode, 0xA4..=0xA7 | 0xAA..=0xAF | 0x6C..=0x6F)
}

/// Mnemonic table for the diagnostic scratch; coarse on purpose (group
/// opcodes resolve to their group name).
fn mnemonic(opcode: u8) -> &'static str {
    match opcode {
        0x00..=0x05 => "ADD",
        0x06 | 0x0E | 0x16 | 0x1E | 0x50..=0x57 | 0x68 | 0x6A => "PUSH",
        0x07 | 0x17 | 0x1F | 0x58..=0x5F | 0x8F => "POP",
        0x08..=0x0D => "OR",
        0x0F => "0F-EXT",
        0x10..=0x15 => "ADC",
        0x18..=0x1D => "SBB",
        0x20..=0x25 => "AND",
        0x27 => "DAA",
        0x28..=0x2D => "SUB",
        0x2F => "DAS",
        0x30..=0x35 => "XOR",
        0x37 => "AAA",
        0x38..=0x3D => "CMP",
        0x3F => "AAS",
        0x40..=0x47 => "INC",
        0x48..=0x4F => "DEC",
        0x60 => "PUSHA",
        0x61 => "POPA",
        0x62 => "BOUND",
        0x69 | 0x6B => "IMUL",
        0x6C | 0x6D => "INS",
        0x6E | 0x6F => "OUTS",
        0x70..=0x7F => "Jcc",
        0x80..=0x83 => "GRP1",
        0x84 | 0x85 | 0xA8 | 0xA9 => "TEST",
        0x86 | 0x87 | 0x91..=0x97 => "XCHG",
        0x88..=0x8C | 0x8E | 0xA0..=0xA3 | 0xB0..=0xBF | 0xC6 | 0xC7 => "MOV",
        0x8D => "LEA",
        0x90 => "NOP",
        0x98 => "CBW",
        0x99 => "CWD",
        0x9A | 0xE8 => "CALL",
        0x9B => "WAIT",
        0x9C => "PUSHF",
        0x9D => "POPF",
        0x9E => "SAHF",
        0x9F => "LAHF",
        0xA4 | 0xA5 => "MOVS",
        0xA6 | 0xA7 => "CMPS",
        0xAA | 0xAB => "STOS",
        0xAC | 0xAD => "LODS",
        0xAE | 0xAF => "SCAS",
        0xC0 | 0xC1 | 0xD0..=0xD3 => "GRP2",
        0xC2 | 0xC3 => "RET",
        0xC4 => "LES",
        0xC5 => "LDS",
        0xC8 => "ENTER",
        0xC9 => "LEAVE",
        0xCA | 0xCB => "RETF",
        0xCC | 0xCD => "INT",
        0xCE => "INTO",
        0xCF => "IRET",
        0xD4 => "AAM",
        0xD5 => "AAD",
        0xD7 => "XLAT",
        0xD8..=0xDF => "ESC",
        0xE0 => "LOOPNZ",
        0xE1 => "LOOPZ",
        0xE2 => "LOOP",
        0xE3 => "JCXZ",
        0xE4 | 0xE5 | 0xEC | 0xED => "IN",
        0xE6 | 0xE7 | 0xEE | 0xEF => "OUT",
        0xE9 | 0xEA | 0xEB => "JMP",
        0xF4 => "HLT",
        0xF5 => "CMC",
        0xF6 | 0xF7 => "GRP3",
        0xF8 => "CLC",
        0xF9 => "STC",
        0xFA => "CLI",
        0xFB => "STI",
        0xFC => "CLD",
        0xFD => "STD",
        0xFE => "GRP4",
        0xFF => "GRP5",
        _ => "DB",
    }
}
