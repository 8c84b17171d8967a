//! Flags, shifts, I/O, HLT, the 0x0F subset, and the x87 stub.

use super::boot;
use crate::memory::MemoryBus;
use crate::error::CpuError;
use crate::io::IoPortHandler;
use crate::memory::FlatMemory;
use crate::CoreConfig;
use crate::cpu::Cpu;

#[test]
fn test_flag_instructions() {
    // STC; CMC; CLD; STD; CLI; STI
    let mut cpu = boot(&[0xF9, 0xF5, 0xFC, 0xFD, 0xFA, 0xFB]);
    cpu.step().unwrap();
    assert!(cpu.flags.carry());
    cpu.step().unwrap();
    assert!(!cpu.flags.carry());
    cpu.step().unwrap();
    assert!(!cpu.flags.direction());
    cpu.step().unwrap();
    assert!(cpu.flags.direction());
    cpu.step().unwrap();
    assert!(!cpu.flags.interrupt_enable());
    cpu.step().unwrap();
    assert!(cpu.flags.interrupt_enable());
}

#[test]
fn test_pushf_popf_fixed_bits() {
    // PUSHF; POP AX
    let mut cpu = boot(&[0x9C, 0x58]);
    cpu.flags.set_carry(true);
    cpu.step().unwrap();
    cpu.step().unwrap();
    assert_eq!(cpu.regs.ax & 0xF002, 0xF002); // reserved bits read as set
    assert_eq!(cpu.regs.ax & 0x0001, 0x0001);
}

#[test]
fn test_sahf_lahf() {
    // MOV AH, 0xC1 is not a flag image; use SAHF then LAHF roundtrip
    let mut cpu = boot(&[0x9E, 0x9F]);
    cpu.regs.set_ah(0b1101_0101); // SF ZF AF PF CF set
    cpu.step().unwrap();
    assert!(cpu.flags.sign());
    assert!(cpu.flags.zero());
    assert!(cpu.flags.adjust());
    assert!(cpu.flags.parity());
    assert!(cpu.flags.carry());

    cpu.step().unwrap();
    // Bit 1 always reads as set in the flag image
    assert_eq!(cpu.regs.ah(), 0b1101_0111);
}

#[test]
fn test_shl_via_group2() {
    // SHL AL, 1
    let mut cpu = boot(&[0xD0, 0xE0]);
    cpu.regs.set_al(0x81);
    cpu.step().unwrap();
    assert_eq!(cpu.regs.al(), 0x02);
    assert!(cpu.flags.carry());
}

#[test]
fn test_shift_by_cl_and_by_immediate() {
    // SHR AX, CL; then SHL AX, 4 (0xC1 form)
    let mut cpu = boot(&[0xD3, 0xE8, 0xC1, 0xE0, 0x04]);
    cpu.regs.ax = 0x0100;
    cpu.regs.cx = 0x0004;
    cpu.step().unwrap();
    assert_eq!(cpu.regs.ax, 0x0010);
    cpu.step().unwrap();
    assert_eq!(cpu.regs.ax, 0x0100);
}

#[test]
fn test_rcr_through_carry_memory_operand() {
    // RCR word [BX], 1
    let mut cpu = boot(&[0xD1, 0x1F]);
    cpu.regs.ds = 0x2000;
    cpu.regs.bx = 0x0000;
    cpu.memory.write16(0x20000, 0x0001);
    cpu.flags.set_carry(true);
    cpu.step().unwrap();
    assert_eq!(cpu.memory.read16(0x20000), 0x8000);
    assert!(cpu.flags.carry());
}

#[test]
fn test_group2_reserved_index() {
    // D0 /6 is reserved
    let mut cpu = boot(&[0xD0, 0xF0]);
    assert!(matches!(
        cpu.step(),
        Err(CpuError::InvalidGroupIndex { index: 6, .. })
    ));
}

struct EchoPort {
    last: u16,
}

impl IoPortHandler for EchoPort {
    fn read_byte(&mut self, _port: u16) -> u8 {
        self.last as u8
    }

    fn write_byte(&mut self, _port: u16, val: u8) {
        self.last = val as u16;
    }
}

#[test]
fn test_in_out_immediate_and_dx() {
    let mut cpu = boot(&[0xE6, 0x42, 0xE4, 0x42, 0xEE, 0xEC]);
    cpu.io.register(0x42, Box::new(EchoPort { last: 0 }));
    cpu.io.register(0x0300, Box::new(EchoPort { last: 0x77 }));

    cpu.regs.set_al(0x5A);
    cpu.step().unwrap(); // OUT 0x42, AL
    cpu.regs.set_al(0x00);
    cpu.step().unwrap(); // IN AL, 0x42
    assert_eq!(cpu.regs.al(), 0x5A);

    cpu.regs.dx = 0x0300;
    cpu.regs.set_al(0x01);
    cpu.step().unwrap(); // OUT DX, AL
    cpu.step().unwrap(); // IN AL, DX
    assert_eq!(cpu.regs.al(), 0x01);
}

#[test]
fn test_unhandled_port_strict() {
    let config = CoreConfig {
        fail_on_unhandled_port: true,
        ..CoreConfig::default()
    };
    let mut memory = FlatMemory::new();
    memory.load(0x10100, &[0xE4, 0x60]);
    let mut cpu = Cpu::with_config(memory, config);
    cpu.regs.cs = 0x1000;
    cpu.regs.ip = 0x0100;

    assert!(matches!(
        cpu.step(),
        Err(CpuError::UnhandledIoPort { port: 0x60 })
    ));
}

#[test]
fn test_unhandled_port_lenient_reads_zero() {
    let mut cpu = boot(&[0xE4, 0x60]);
    cpu.regs.set_al(0xFF);
    cpu.step().unwrap();
    assert_eq!(cpu.regs.al(), 0x00);
}

#[test]
fn test_bound_in_range_and_out_of_range() {
    // BOUND AX, [0x0040] with bounds [1, 10]
    let mut cpu = boot(&[0x62, 0x06, 0x40, 0x00]);
    cpu.regs.ds = 0x2000;
    cpu.memory.write16(0x20040, 1);
    cpu.memory.write16(0x20042, 10);
    cpu.regs.ax = 5;
    cpu.step().unwrap();
    assert_eq!(cpu.regs.ip, 0x0104); // in range: falls through

    let mut cpu = boot(&[0x62, 0x06, 0x40, 0x00]);
    cpu.regs.ds = 0x2000;
    cpu.memory.write16(0x20040, 1);
    cpu.memory.write16(0x20042, 10);
    cpu.memory.write16(5 * 4, 0x0500);
    cpu.memory.write16(5 * 4 + 2, 0x0600);
    cpu.regs.ax = 11;
    cpu.step().unwrap();
    assert_eq!(cpu.regs.cs, 0x0600); // out of range: INT 5
    assert_eq!(cpu.regs.ip, 0x0500);
}

#[test]
fn test_0f_jcc_rel16() {
    // JNZ rel16 (0F 85)
    let mut cpu = boot(&[0x0F, 0x85, 0x00, 0x01]);
    cpu.flags.set_zero(false);
    cpu.step().unwrap();
    assert_eq!(cpu.regs.ip, 0x0204);
}

#[test]
fn test_0f_setcc() {
    // SETZ AL; SETNZ BL
    let mut cpu = boot(&[0x0F, 0x94, 0xC0, 0x0F, 0x95, 0xC3]);
    cpu.flags.set_zero(true);
    cpu.step().unwrap();
    assert_eq!(cpu.regs.al(), 1);
    cpu.step().unwrap();
    assert_eq!(cpu.regs.bl(), 0);
}

#[test]
fn test_0f_movzx_movsx() {
    // MOVZX AX, BL; MOVSX CX, BL
    let mut cpu = boot(&[0x0F, 0xB6, 0xC3, 0x0F, 0xBE, 0xCB]);
    cpu.regs.bx = 0x0080;
    cpu.step().unwrap();
    assert_eq!(cpu.regs.ax, 0x0080);
    cpu.step().unwrap();
    assert_eq!(cpu.regs.cx, 0xFF80);
}

#[test]
fn test_0f_push_pop_fs_gs() {
    // PUSH FS; POP GS
    let mut cpu = boot(&[0x0F, 0xA0, 0x0F, 0xA9]);
    cpu.regs.fs = 0x7000;
    cpu.step().unwrap();
    cpu.step().unwrap();
    assert_eq!(cpu.regs.gs, 0x7000);
}

#[test]
fn test_0f_unknown_is_invalid() {
    // 0F 01 (LGDT family) is outside the supported subset
    let mut cpu = boot(&[0x0F, 0x01, 0x00]);
    assert!(matches!(
        cpu.step(),
        Err(CpuError::InvalidOpcode { opcode: 0x01, .. })
    ));
}

#[test]
fn test_x87_probe_sees_no_fpu() {
    // FNSTSW AX reports 0xFFFF; FNSTCW [BX] stores 0xFFFF
    let mut cpu = boot(&[0xDF, 0xE0, 0xD9, 0x3F]);
    cpu.regs.ds = 0x2000;
    cpu.regs.bx = 0x0000;
    cpu.memory.write16(0x20000, 0x1234);

    cpu.step().unwrap();
    assert_eq!(cpu.regs.ax, 0xFFFF);

    cpu.step().unwrap();
    assert_eq!(cpu.memory.read16(0x20000), 0xFFFF);
}

#[test]
fn test_x87_arithmetic_is_ignored() {
    // FADD dword [BX] consumes its operand and changes nothing
    let mut cpu = boot(&[0xD8, 0x07, 0x90]);
    cpu.regs.ds = 0x2000;
    cpu.regs.bx = 0x0010;
    cpu.memory.write16(0x20010, 0xAAAA);

    cpu.step().unwrap();
    assert_eq!(cpu.regs.ip, 0x0102);
    assert_eq!(cpu.memory.read16(0x20010), 0xAAAA);
    cpu.step().unwrap(); // the NOP right after decodes cleanly
    assert_eq!(cpu.regs.ip, 0x0103);
}

#[test]
fn test_wait_is_noop() {
    let mut cpu = boot(&[0x9B]);
    cpu.step().unwrap();
    assert_eq!(cpu.regs.ip, 0x0101);
}

#[test]
fn test_lock_prefix_is_accepted() {
    // LOCK INC word [BX]
    let mut cpu = boot(&[0xF0, 0xFF, 0x07]);
    cpu.regs.ds = 0x2000;
    cpu.regs.bx = 0x0000;
    cpu.memory.write16(0x20000, 41);
    cpu.step().unwrap();
    assert_eq!(cpu.memory.read16(0x20000), 42);
}

#[test]
fn test_repeated_segment_prefix_collapses() {
    // ES: ES: MOV AL, [BX]: identical prefixes act once
    let mut cpu = boot(&[0x26, 0x26, 0x8A, 0x07]);
    cpu.regs.es = 0x2000;
    cpu.regs.ds = 0x3000;
    cpu.regs.bx = 0x0000;
    cpu.memory.write8(0x20000, 0x42);
    cpu.step().unwrap();
    assert_eq!(cpu.regs.al(), 0x42);
}

#[test]
fn test_cycle_counter_counts_instructions() {
    let mut cpu = boot(&[0x90, 0x90, 0xF3, 0xAB]);
    cpu.regs.cx = 100;
    cpu.regs.es = 0x3000;
    cpu.step().unwrap();
    cpu.step().unwrap();
    cpu.step().unwrap(); // REP STOSW: 100 iterations, one instruction
    assert_eq!(cpu.cycles, 3);
}
