//! Interrupt dispatch, IRET, external injection, and fault restart.

use super::boot;
use crate::memory::MemoryBus;
use crate::error::CpuError;
use crate::state::SegmentedAddress;
use crate::CoreConfig;
use crate::cpu::Cpu;
use crate::memory::FlatMemory;

fn set_vector(cpu: &mut Cpu<FlatMemory>, vector: u8, segment: u16, offset: u16) {
    cpu.memory.write16(vector as u32 * 4, offset);
    cpu.memory.write16(vector as u32 * 4 + 2, segment);
}

#[test]
fn test_int_pushes_frame_and_clears_if() {
    // INT 21h with IVT[0x21] = 0080:0100
    let mut cpu = boot(&[0xCD, 0x21]);
    set_vector(&mut cpu, 0x21, 0x0080, 0x0100);
    cpu.flags.set_interrupt_enable(true);
    let flags_pushed = cpu.flags.value();

    cpu.step().unwrap();
    assert_eq!(cpu.regs.cs, 0x0080);
    assert_eq!(cpu.regs.ip, 0x0100);
    assert!(!cpu.flags.interrupt_enable());

    // Stack: IP at SP, CS at SP+2, FLAGS at SP+4
    let sp = cpu.regs.sp;
    let stack = |off: u16| {
        cpu.memory
            .read16(SegmentedAddress::new(cpu.regs.ss, sp.wrapping_add(off)).linear())
    };
    assert_eq!(stack(0), 0x0102);
    assert_eq!(stack(2), 0x1000);
    assert_eq!(stack(4), flags_pushed);
}

#[test]
fn test_iret_restores_flow_and_flags() {
    let mut cpu = boot(&[0xCD, 0x21, 0x90]);
    set_vector(&mut cpu, 0x21, 0x0080, 0x0100);
    cpu.memory.write8(0x00900, 0xCF); // handler: IRET
    cpu.flags.set_interrupt_enable(true);

    cpu.step().unwrap();
    assert!(!cpu.flags.interrupt_enable());
    cpu.step().unwrap();
    assert_eq!(cpu.regs.cs, 0x1000);
    assert_eq!(cpu.regs.ip, 0x0102);
    assert!(cpu.flags.interrupt_enable()); // restored by IRET
}

#[test]
fn test_int3_and_into() {
    let mut cpu = boot(&[0xCC]);
    set_vector(&mut cpu, 3, 0x0090, 0x0010);
    cpu.step().unwrap();
    assert_eq!(cpu.regs.cs, 0x0090);
    assert_eq!(cpu.regs.ip, 0x0010);

    // INTO only fires with OF set
    let mut cpu = boot(&[0xCE, 0x90]);
    set_vector(&mut cpu, 4, 0x0090, 0x0020);
    cpu.step().unwrap();
    assert_eq!(cpu.regs.ip, 0x0101); // not taken

    let mut cpu = boot(&[0xCE]);
    set_vector(&mut cpu, 4, 0x0090, 0x0020);
    cpu.flags.set_overflow(true);
    cpu.step().unwrap();
    assert_eq!(cpu.regs.ip, 0x0020);
}

#[test]
fn test_uninitialized_vector_strict_mode() {
    let config = CoreConfig {
        error_on_uninitialized_interrupt_handler: true,
        ..CoreConfig::default()
    };
    let mut memory = FlatMemory::new();
    memory.load(0x10100, &[0xCD, 0x42]);
    let mut cpu = Cpu::with_config(memory, config);
    cpu.regs.cs = 0x1000;
    cpu.regs.ip = 0x0100;
    cpu.regs.ss = 0x9000;
    cpu.regs.sp = 0xFFFE;

    assert!(matches!(
        cpu.step(),
        Err(CpuError::UnhandledInterrupt { vector: 0x42 })
    ));
}

#[test]
fn test_division_fault_restarts_instruction() {
    // DIV CX with CX=0: IP rewinds to the DIV itself, INT 0 dispatched
    let mut cpu = boot(&[0xF7, 0xF1]);
    set_vector(&mut cpu, 0, 0x2000, 0x0300);
    cpu.memory.write8(0x20300, 0xCF); // handler: IRET
    cpu.regs.ax = 0x000A;
    cpu.regs.cx = 0;

    cpu.step().unwrap();
    assert_eq!(cpu.regs.cs, 0x2000);
    assert_eq!(cpu.regs.ip, 0x0300);
    // Pushed return address is the DIV's own start
    let pushed_ip = cpu
        .memory
        .read16(SegmentedAddress::new(cpu.regs.ss, cpu.regs.sp).linear());
    assert_eq!(pushed_ip, 0x0100);

    // Handler IRET returns to the DIV instruction
    cpu.step().unwrap();
    assert_eq!(cpu.regs.cs, 0x1000);
    assert_eq!(cpu.regs.ip, 0x0100);
}

#[test]
fn test_division_overflow_also_faults() {
    // DIV CL with AX=0x1000, CL=1: quotient > 0xFF
    let mut cpu = boot(&[0xF6, 0xF1]);
    set_vector(&mut cpu, 0, 0x2000, 0x0300);
    cpu.regs.ax = 0x1000;
    cpu.regs.cx = 0x0001;

    cpu.step().unwrap();
    assert_eq!(cpu.regs.ip, 0x0300);
}

#[test]
fn test_external_interrupt_serviced_at_boundary() {
    // The injected interrupt must not preempt the in-flight instruction
    let mut cpu = boot(&[0xB8, 0x34, 0x12, 0x90]);
    set_vector(&mut cpu, 8, 0x4000, 0x0000);
    cpu.flags.set_interrupt_enable(true);

    cpu.interrupt_line().raise(8);
    cpu.step().unwrap();
    // MOV completed...
    assert_eq!(cpu.regs.ax, 0x1234);
    // ...and control is already at the handler before the next instruction
    assert_eq!(cpu.regs.cs, 0x4000);
    assert_eq!(cpu.regs.ip, 0x0000);
    // Return address on the stack points at the NOP
    let pushed_ip = cpu
        .memory
        .read16(SegmentedAddress::new(cpu.regs.ss, cpu.regs.sp).linear());
    assert_eq!(pushed_ip, 0x0103);
}

#[test]
fn test_external_interrupt_held_while_if_clear() {
    let mut cpu = boot(&[0x90, 0xFB, 0x90]);
    set_vector(&mut cpu, 8, 0x4000, 0x0000);

    cpu.interrupt_line().raise(8);
    cpu.step().unwrap(); // NOP, IF=0: latch stays pending
    assert_eq!(cpu.regs.ip, 0x0101);
    assert_eq!(cpu.interrupt_line().pending(), Some(8));

    cpu.step().unwrap(); // STI, then the boundary services the latch
    assert_eq!(cpu.regs.cs, 0x4000);
    assert_eq!(cpu.interrupt_line().pending(), None);
}

#[test]
fn test_external_interrupt_uses_external_tracker() {
    let mut cpu = boot(&[0x90, 0x90]);
    set_vector(&mut cpu, 9, 0x4000, 0x0000);
    cpu.memory.write8(0x40000, 0xCF); // handler: IRET
    cpu.flags.set_interrupt_enable(true);

    cpu.interrupt_line().raise(9);
    cpu.step().unwrap();
    assert_eq!(cpu.regs.cs, 0x4000);

    let handler_entry = SegmentedAddress::new(0x4000, 0x0000);
    assert!(cpu.external_functions().functions().contains_key(&handler_entry));
    assert!(!cpu.functions().functions().contains_key(&handler_entry));

    // IRET ends the external context and returns to the program
    cpu.step().unwrap();
    assert_eq!(cpu.regs.cs, 0x1000);
    assert_eq!(cpu.regs.ip, 0x0101);
}
