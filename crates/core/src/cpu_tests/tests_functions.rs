//! Call tracking, host-native overrides, and the callback opcode.

use super::boot;
use crate::memory::MemoryBus;
use crate::cpu::Cpu;
use crate::dump::write_execution_dump;
use crate::error::CpuError;
use crate::function::CallType;
use crate::memory::FlatMemory;
use crate::state::SegmentedAddress;

#[test]
fn test_near_call_tracked() {
    // CALL 0x0110; target: RET
    let mut cpu = boot(&[0xE8, 0x0D, 0x00]);
    cpu.memory.write8(0x10110, 0xC3);

    cpu.step().unwrap();
    cpu.step().unwrap();

    let entry = SegmentedAddress::new(0x1000, 0x0110);
    let info = &cpu.functions().functions()[&entry];
    assert_eq!(info.calls, 1);
    assert_eq!(info.returns[&SegmentedAddress::new(0x1000, 0x0103)], 1);
    assert_eq!(cpu.functions().call_depth(), 0);
}

#[test]
fn test_nested_calls_link_callers() {
    // outer at 0x0110 calls inner at 0x0120
    // 0100: CALL 0x0110
    // 0110: CALL 0x0120; RET
    // 0120: RET
    let mut cpu = boot(&[0xE8, 0x0D, 0x00]);
    cpu.memory.load(0x10110, &[0xE8, 0x0D, 0x00, 0xC3]);
    cpu.memory.write8(0x10120, 0xC3);

    for _ in 0..4 {
        cpu.step().unwrap();
    }

    let outer = SegmentedAddress::new(0x1000, 0x0110);
    let inner = SegmentedAddress::new(0x1000, 0x0120);
    let info = &cpu.functions().functions()[&inner];
    assert!(info.callers.contains(&outer));
    assert_eq!(cpu.regs.ip, 0x0103);
}

#[test]
fn test_interrupt_call_kind_tracked() {
    let mut cpu = boot(&[0xCD, 0x21]);
    cpu.memory.write16(0x21 * 4, 0x0100);
    cpu.memory.write16(0x21 * 4 + 2, 0x0080);
    cpu.memory.write8(0x00900, 0xCF);

    cpu.step().unwrap();
    cpu.step().unwrap();

    let entry = SegmentedAddress::new(0x0080, 0x0100);
    let info = &cpu.functions().functions()[&entry];
    assert_eq!(info.calls, 1);
    assert_eq!(info.returns[&SegmentedAddress::new(0x1000, 0x0102)], 1);
}

#[test]
fn test_override_replaces_emulated_body() {
    // CALL 0x0110; the emulated body would set AX=1, the override sets 0x99
    let mut cpu = boot(&[0xE8, 0x0D, 0x00]);
    cpu.memory.load(0x10110, &[0xB8, 0x01, 0x00, 0xC3]);

    let entry = SegmentedAddress::new(0x1000, 0x0110);
    cpu.register_override(
        entry,
        Box::new(|cpu: &mut Cpu<FlatMemory>| -> Result<(), CpuError> {
            cpu.regs.ax = 0x0099;
            Ok(())
        }),
    );

    cpu.step().unwrap();
    // One step: the call diverted to the override and already returned
    assert_eq!(cpu.regs.ax, 0x0099);
    assert_eq!(cpu.regs.ip, 0x0103);

    let info = &cpu.functions().functions()[&entry];
    assert!(info.has_override);
    assert_eq!(info.calls, 1);
    assert_eq!(info.returns[&SegmentedAddress::new(0x1000, 0x0103)], 1);
}

#[test]
fn test_override_runs_on_every_call() {
    // Two calls through the same override
    // 0100: CALL 0x0110; CALL 0x0110
    let mut cpu = boot(&[0xE8, 0x0D, 0x00, 0xE8, 0x0A, 0x00]);
    let entry = SegmentedAddress::new(0x1000, 0x0110);
    cpu.register_override(
        entry,
        Box::new(|cpu: &mut Cpu<FlatMemory>| -> Result<(), CpuError> {
            cpu.regs.ax = cpu.regs.ax.wrapping_add(1);
            Ok(())
        }),
    );

    cpu.step().unwrap();
    cpu.step().unwrap();
    assert_eq!(cpu.regs.ax, 2);
    assert_eq!(cpu.functions().functions()[&entry].calls, 2);
}

#[test]
fn test_callback_opcode_invokes_handler() {
    // FE 38 34 12: callback index 0x1234
    let mut cpu = boot(&[0xFE, 0x38, 0x34, 0x12]);
    cpu.install_callback_handler(Box::new(
        |cpu: &mut Cpu<FlatMemory>, index: u16| -> Result<(), CpuError> {
            cpu.regs.ax = index;
            Ok(())
        },
    ));

    cpu.step().unwrap();
    assert_eq!(cpu.regs.ax, 0x1234);
    assert_eq!(cpu.regs.ip, 0x0104);
}

#[test]
fn test_callback_without_handler_fails() {
    let mut cpu = boot(&[0xFE, 0x38, 0x01, 0x00]);
    assert!(matches!(
        cpu.step(),
        Err(CpuError::UnhandledCallback { index: 1 })
    ));
}

#[test]
fn test_group4_plain_inc_dec_still_work() {
    // INC byte [BX]; DEC byte [BX]
    let mut cpu = boot(&[0xFE, 0x07, 0xFE, 0x0F]);
    cpu.regs.ds = 0x2000;
    cpu.regs.bx = 0x0000;
    cpu.memory.write8(0x20000, 0x10);
    cpu.step().unwrap();
    assert_eq!(cpu.memory.read8(0x20000), 0x11);
    cpu.step().unwrap();
    assert_eq!(cpu.memory.read8(0x20000), 0x10);
}

#[test]
fn test_group4_reserved_index() {
    // 0xFE /3 is reserved
    let mut cpu = boot(&[0xFE, 0x1F]);
    assert!(matches!(
        cpu.step(),
        Err(CpuError::InvalidGroupIndex {
            group: 0xFE,
            index: 3,
            ..
        })
    ));
}

#[test]
fn test_named_function_appears_in_dump() {
    let mut cpu = boot(&[0xE8, 0x0D, 0x00]);
    cpu.memory.write8(0x10110, 0xC3);
    let entry = SegmentedAddress::new(0x1000, 0x0110);
    cpu.name_function(entry, "update_palette");

    cpu.step().unwrap();
    cpu.step().unwrap();

    let mut out = Vec::new();
    write_execution_dump(&mut out, cpu.functions(), cpu.recorder()).unwrap();
    let text = String::from_utf8(out).unwrap();
    assert!(text.contains("function update_palette 1000:0110"));
    assert!(text.contains("return 1000:0103 count 1"));
}

#[test]
fn test_ret_kind_mismatch_is_tolerated() {
    // CALL near, but the body returns with RETF after pushing CS
    // 0100: CALL 0x0110
    // 0110: PUSH CS-equivalent is already on stack? Use: RETF would pop
    //       ip then cs, unbalancing: we push CS first to keep flow valid
    // Simpler: far call returned with near RET
    // 0100: CALL FAR 1000:0110 ; 0110: RET (near)
    let mut cpu = boot(&[0x9A, 0x10, 0x01, 0x00, 0x10]);
    cpu.memory.write8(0x10110, 0xC3);

    cpu.step().unwrap();
    cpu.step().unwrap(); // near RET pops only IP; kind mismatch is logged

    // Execution continues; shadow stack is drained
    assert_eq!(cpu.functions().call_depth(), 0);
    let entry = SegmentedAddress::new(0x1000, 0x0110);
    assert_eq!(cpu.functions().functions()[&entry].calls, 1);
}

#[test]
fn test_call_type_display() {
    assert_eq!(format!("{}", CallType::Near), "near");
    assert_eq!(format!("{}", CallType::Far), "far");
    assert_eq!(format!("{}", CallType::Interrupt), "interrupt");
}
