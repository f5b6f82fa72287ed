//! Instruction handlers, indexed by opcode.
//!
//! A handler reads its own operand bytes relative to `pc` and reports how the program counter
//! should move. Handlers never advance `pc` themselves.

use super::{Core, Flow};
use crate::alu::{self, AluResult, Flags};
use crate::bus::Bus;
use crate::error::EmuError;

pub(super) type Handler = fn(&mut Core, &mut Bus, u8) -> Result<Flow, EmuError>;

macro_rules! table {
    ( $( $($opcode:literal)|+ => $handler:path ),* $(,)? ) => {{
        let mut table: [Option<Handler>; 256] = [None; 256];
        $( $( table[$opcode] = Some($handler as Handler); )+ )*
        table
    }};
}

pub(super) const OP_TABLE: [Option<Handler>; 256] = table![
    0x00 => nop,
    0x01 => halt,
    0x02 | 0x03 => interrupt_enable,
    0x04 => iret,
    0x05 => ret,
    0x06 => core_start,
    0x07 => core_id,
    0x10 | 0x11 | 0x12 | 0x13 | 0x14 => mov,
    0x15 | 0x19 => lea,
    0x16 => ldi,
    0x17 => sti,
    0x1A => push,
    0x1B => pop,
    0x1C => pushf,
    0x1D => popf,
    0x20 | 0x21 | 0x22 | 0x23 | 0x24 | 0x25 => binary,
    0x26 | 0x27 | 0x28 | 0x29 | 0x2A | 0x2B => binary,
    0x2C | 0x2D | 0x2E | 0x2F => binary,
    0x30 | 0x31 | 0x32 => unary,
    0x40 | 0x41 | 0x42 | 0x43 | 0x44 | 0x45 | 0x46 | 0x47 => shift,
    0x48 | 0x49 | 0x4A | 0x4B | 0x4C | 0x4D => shift,
    0x50 | 0x51 => jmp,
    0x52 | 0x53 | 0x54 | 0x55 | 0x56 | 0x57 | 0x58 | 0x59 => jcc,
    0x5A => call,
];

fn nop(_core: &mut Core, _bus: &mut Bus, _op: u8) -> Result<Flow, EmuError> {
    Ok(Flow::Next)
}

fn halt(_core: &mut Core, _bus: &mut Bus, _op: u8) -> Result<Flow, EmuError> {
    Ok(Flow::Halt)
}

fn interrupt_enable(core: &mut Core, _bus: &mut Bus, op: u8) -> Result<Flow, EmuError> {
    // 0x02 `EI`, 0x03 `DI`
    core.interrupts_enabled = op == 0x02;
    Ok(Flow::Next)
}

fn iret(core: &mut Core, bus: &mut Bus, _op: u8) -> Result<Flow, EmuError> {
    let pc = core.pop16(bus)?;
    core.regs.flags = core.pop8(bus)?;
    core.interrupts_enabled = true;
    core.in_handler = false;
    Ok(Flow::Jump(pc))
}

fn ret(core: &mut Core, bus: &mut Bus, _op: u8) -> Result<Flow, EmuError> {
    Ok(Flow::Jump(core.pop16(bus)?))
}

fn core_start(core: &mut Core, bus: &mut Bus, _op: u8) -> Result<Flow, EmuError> {
    let reg = core.reg_operand(bus, 1)?;
    let entry = core.operand16(bus, 2)?;
    Ok(Flow::StartCore {
        core: core.regs.get(reg) as usize,
        entry,
    })
}

fn core_id(core: &mut Core, bus: &mut Bus, _op: u8) -> Result<Flow, EmuError> {
    let reg = core.reg_operand(bus, 1)?;
    core.regs.set(reg, core.index as u8);
    Ok(Flow::Next)
}

fn mov(core: &mut Core, bus: &mut Bus, op: u8) -> Result<Flow, EmuError> {
    match op {
        0x10 => {
            let dst = core.reg_operand(bus, 1)?;
            let src = core.reg_operand(bus, 2)?;
            core.regs.set(dst, core.regs.get(src));
        }
        0x11 => {
            let dst = core.reg_operand(bus, 1)?;
            let value = core.operand8(bus, 2)?;
            core.regs.set(dst, value);
        }
        0x12 => {
            let dst = core.reg_operand(bus, 1)?;
            let addr = core.operand16(bus, 2)?;
            let value = bus.read(addr)?;
            core.regs.set(dst, value);
        }
        0x13 => {
            let addr = core.operand16(bus, 1)?;
            let src = core.reg_operand(bus, 3)?;
            bus.write(addr, core.regs.get(src))?;
        }
        0x14 => {
            let addr = core.operand16(bus, 1)?;
            let value = core.operand8(bus, 3)?;
            bus.write(addr, value)?;
        }
        _ => unreachable!("opcode 0x{op:02x} is not a `MOV`"),
    }
    Ok(Flow::Next)
}

fn lea(core: &mut Core, bus: &mut Bus, op: u8) -> Result<Flow, EmuError> {
    let hi = core.reg_operand(bus, 1)?;
    let lo = core.reg_operand(bus, 2)?;
    let operand = core.operand16(bus, 3)?;
    // 0x19 loads the pointer stored at the operand, 0x15 the operand itself
    let addr = if op == 0x19 {
        bus.read16(operand)?
    } else {
        operand
    };
    core.regs.set(hi, (addr >> 8) as u8);
    core.regs.set(lo, (addr & 0xFF) as u8);
    Ok(Flow::Next)
}

fn ldi(core: &mut Core, bus: &mut Bus, _op: u8) -> Result<Flow, EmuError> {
    let dst = core.reg_operand(bus, 1)?;
    let hi = core.reg_operand(bus, 2)?;
    let lo = core.reg_operand(bus, 3)?;
    let value = bus.read(core.regs.pair(hi, lo))?;
    core.regs.set(dst, value);
    Ok(Flow::Next)
}

fn sti(core: &mut Core, bus: &mut Bus, _op: u8) -> Result<Flow, EmuError> {
    let hi = core.reg_operand(bus, 1)?;
    let lo = core.reg_operand(bus, 2)?;
    let src = core.reg_operand(bus, 3)?;
    bus.write(core.regs.pair(hi, lo), core.regs.get(src))?;
    Ok(Flow::Next)
}

fn push(core: &mut Core, bus: &mut Bus, _op: u8) -> Result<Flow, EmuError> {
    let reg = core.reg_operand(bus, 1)?;
    core.push8(bus, core.regs.get(reg))?;
    Ok(Flow::Next)
}

fn pop(core: &mut Core, bus: &mut Bus, _op: u8) -> Result<Flow, EmuError> {
    let reg = core.reg_operand(bus, 1)?;
    let value = core.pop8(bus)?;
    core.regs.set(reg, value);
    Ok(Flow::Next)
}

fn pushf(core: &mut Core, bus: &mut Bus, _op: u8) -> Result<Flow, EmuError> {
    core.push8(bus, core.regs.flags)?;
    Ok(Flow::Next)
}

fn popf(core: &mut Core, bus: &mut Bus, _op: u8) -> Result<Flow, EmuError> {
    core.regs.flags = core.pop8(bus)?;
    Ok(Flow::Next)
}

/// Result of a two-operand ALU operation. `None` result means flags only.
fn apply_binary(op: u8, a: u8, b: u8) -> (Option<u8>, Flags) {
    fn write(out: AluResult) -> (Option<u8>, Flags) {
        (Some(out.result), out.flags)
    }
    match op {
        0x20..=0x22 => write(alu::add(a, b)),
        0x23..=0x25 => write(alu::sub(a, b)),
        0x26 | 0x27 => write(alu::and(a, b)),
        0x28 | 0x29 => write(alu::or(a, b)),
        0x2A | 0x2B => write(alu::xor(a, b)),
        0x2C | 0x2D => (None, alu::cmp(a, b)),
        0x2E | 0x2F => (None, alu::test(a, b)),
        _ => unreachable!("opcode 0x{op:02x} is not a binary ALU operation"),
    }
}

fn binary(core: &mut Core, bus: &mut Bus, op: u8) -> Result<Flow, EmuError> {
    let dst = core.reg_operand(bus, 1)?;
    let b = match op {
        // Memory forms
        0x22 | 0x25 => {
            let addr = core.operand16(bus, 2)?;
            bus.read(addr)?
        }
        // `ADD`/`SUB` register forms, then every even opcode from `AND` onwards
        0x20 | 0x23 => core.regs.get(core.reg_operand(bus, 2)?),
        0x26..=0x2F if op % 2 == 0 => core.regs.get(core.reg_operand(bus, 2)?),
        _ => core.operand8(bus, 2)?,
    };
    let (result, flags) = apply_binary(op, core.regs.get(dst), b);
    core.regs.set_flags(flags.zero, flags.carry);
    if let Some(result) = result {
        core.regs.set(dst, result);
    }
    Ok(Flow::Next)
}

fn unary(core: &mut Core, bus: &mut Bus, op: u8) -> Result<Flow, EmuError> {
    let reg = core.reg_operand(bus, 1)?;
    let value = core.regs.get(reg);
    let out = match op {
        0x30 => alu::inc(value),
        0x31 => alu::dec(value),
        0x32 => alu::not(value),
        _ => unreachable!("opcode 0x{op:02x} is not a unary ALU operation"),
    };
    core.regs.set_flags(out.flags.zero, out.flags.carry);
    core.regs.set(reg, out.result);
    Ok(Flow::Next)
}

fn shift(core: &mut Core, bus: &mut Bus, op: u8) -> Result<Flow, EmuError> {
    let reg = core.reg_operand(bus, 1)?;
    // Odd opcodes carry an explicit count
    let count = if op & 1 == 1 {
        core.operand8(bus, 2)?
    } else {
        1
    };
    let (value, carry) = (core.regs.get(reg), core.regs.carry());
    let out = match op & !1 {
        0x40 => alu::rol(value, count, carry),
        0x42 => alu::ror(value, count, carry),
        0x44 => alu::rcl(value, count, carry),
        0x46 => alu::rcr(value, count, carry),
        0x48 => alu::shl(value, count, carry),
        0x4A => alu::shr(value, count, carry),
        0x4C => alu::sar(value, count, carry),
        _ => unreachable!("opcode 0x{op:02x} is not a shift"),
    };
    core.regs.set_flags(out.flags.zero, out.flags.carry);
    core.regs.set(reg, out.result);
    Ok(Flow::Next)
}

fn jmp(core: &mut Core, bus: &mut Bus, op: u8) -> Result<Flow, EmuError> {
    let target = if op == 0x51 {
        let hi = core.reg_operand(bus, 1)?;
        let lo = core.reg_operand(bus, 2)?;
        core.regs.pair(hi, lo)
    } else {
        core.operand16(bus, 1)?
    };
    Ok(Flow::Jump(target))
}

fn jcc(core: &mut Core, bus: &mut Bus, op: u8) -> Result<Flow, EmuError> {
    let (zero, carry) = (core.regs.zero(), core.regs.carry());
    let taken = match op {
        0x52 => zero,
        0x53 => !zero,
        0x54 | 0x56 => carry,
        0x55 | 0x59 => !carry,
        0x57 => carry || zero,
        0x58 => !carry && !zero,
        _ => unreachable!("opcode 0x{op:02x} is not a conditional jump"),
    };
    if taken {
        Ok(Flow::Jump(core.operand16(bus, 1)?))
    } else {
        Ok(Flow::Next)
    }
}

fn call(core: &mut Core, bus: &mut Bus, _op: u8) -> Result<Flow, EmuError> {
    let target = core.operand16(bus, 1)?;
    // `CALL` is three bytes
    let return_addr = core.regs.pc.wrapping_add(3);
    core.push16(bus, return_addr)?;
    Ok(Flow::Jump(target))
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::isa;

    #[test]
    fn every_opcode_has_a_handler() {
        for opcode in 0..=255u8 {
            assert_eq!(
                isa::decode(opcode).is_some(),
                OP_TABLE[opcode as usize].is_some(),
                "table mismatch for opcode 0x{opcode:02x}"
            );
        }
    }

    #[test]
    fn binary_operations() {
        assert_eq!(apply_binary(0x21, 200, 100).0, Some(44));
        assert!(apply_binary(0x21, 200, 100).1.carry);
        assert_eq!(apply_binary(0x2D, 1, 1).0, None);
        assert!(apply_binary(0x2D, 1, 1).1.zero);
        assert_eq!(apply_binary(0x2B, 0xF0, 0xFF).0, Some(0x0F));
    }

    #[test]
    fn conditional_jumps_follow_flags() {
        use crate::cpu::Registers;
        use crate::memory::{RAM_START, STACK_TOP};

        let mut bus = Bus::new();
        bus.write(RAM_START + 1, 0x34).unwrap();
        bus.write(RAM_START + 2, 0x12).unwrap();
        // (opcode, zero, carry, taken)
        let cases = [
            (0x54, false, true, true),   // JC
            (0x54, false, false, false),
            (0x57, false, false, false), // JLE
            (0x57, true, false, true),
            (0x57, false, true, true),
            (0x58, false, false, true), // JG
            (0x58, true, false, false),
            (0x58, false, true, false),
            (0x59, false, false, true), // JGE
            (0x59, false, true, false),
            (0x59, true, false, true),
        ];
        for (op, zero, carry, taken) in cases {
            let mut core = Core::new(0);
            core.regs = Registers::new(RAM_START, STACK_TOP);
            core.regs.set_flags(zero, carry);
            let expected = if taken { Flow::Jump(0x1234) } else { Flow::Next };
            assert_eq!(
                jcc(&mut core, &mut bus, op),
                Ok(expected),
                "opcode 0x{op:02x} with zero={zero} carry={carry}"
            );
        }
    }
}
