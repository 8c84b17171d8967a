//! Executor tests, organized by instruction family:
//! - `tests_arith`: ALU forms, INC/DEC, BCD adjusts, group 1/3
//! - `tests_transfer`: MOV family, XCHG, LEA/LDS/LES, stack traffic
//! - `tests_jumps`: conditional jumps, loops, CALL/RET in all kinds
//! - `tests_strings`: string primitives and REP semantics
//! - `tests_interrupts`: INT/IRET, external injection, fault restart
//! - `tests_functions`: call tracking, overrides, the callback opcode
//! - `tests_misc`: flags, I/O, HLT, shifts, the x87 stub, 0x0F subset

use crate::cpu::Cpu;
use crate::memory::FlatMemory;

mod tests_arith;
mod tests_functions;
mod tests_interrupts;
mod tests_misc;
mod tests_strings;
mod tests_transfer;

/// CPU with `program` loaded at 1000:0100 and a stack at 9000:FFFE.
fn boot(program: &[u8]) -> Cpu<FlatMemory> {
    let mut memory = FlatMemory::new();
    memory.load(0x10100, program);
    let mut cpu = Cpu::new(memory);
    cpu.regs.cs = 0x1000;
    cpu.regs.ip = 0x0100;
    cpu.regs.ss = 0x9000;
    cpu.regs.sp = 0xFFFE;
    cpu
}
