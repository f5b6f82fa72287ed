use std::fmt;

use crate::symbol::Register;

pub const FLAG_CARRY: u8 = 0b01;
pub const FLAG_ZERO: u8 = 0b10;

/// Register file of a single core.
#[derive(Clone, PartialEq, Eq, Default, Debug)]
pub struct Registers {
    gp: [u8; 6],
    /// Program counter
    pub pc: u16,
    /// Stack pointer, grows downwards
    pub sp: u16,
    /// Last fetched opcode
    pub ir: u8,
    /// Bit 0 carry, bit 1 zero
    pub flags: u8,
}

impl Registers {
    pub fn new(pc: u16, sp: u16) -> Self {
        Registers {
            pc,
            sp,
            ..Default::default()
        }
    }

    #[inline]
    pub fn get(&self, reg: Register) -> u8 {
        self.gp[reg.index()]
    }

    #[inline]
    pub fn set(&mut self, reg: Register, value: u8) {
        self.gp[reg.index()] = value;
    }

    /// Address formed by a register pair.
    pub fn pair(&self, hi: Register, lo: Register) -> u16 {
        (self.get(hi) as u16) * 256 + self.get(lo) as u16
    }

    pub fn carry(&self) -> bool {
        self.flags & FLAG_CARRY != 0
    }

    pub fn zero(&self) -> bool {
        self.flags & FLAG_ZERO != 0
    }

    pub fn set_flags(&mut self, zero: bool, carry: bool) {
        self.flags = (zero as u8) << 1 | carry as u8;
    }
}

impl fmt::Display for Registers {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for reg in Register::ALL {
            write!(f, "{reg}={:02x} ", self.get(reg))?;
        }
        write!(
            f,
            "PC={:04x} SP={:04x} IR={:02x} Z={} C={}",
            self.pc,
            self.sp,
            self.ir,
            self.zero() as u8,
            self.carry() as u8
        )
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn flags_bits() {
        let mut regs = Registers::new(0, 0);
        regs.set_flags(true, false);
        assert_eq!(regs.flags, FLAG_ZERO);
        regs.set_flags(false, true);
        assert_eq!(regs.flags, FLAG_CARRY);
        assert!(regs.carry() && !regs.zero());
    }

    #[test]
    fn register_pair_address() {
        let mut regs = Registers::new(0, 0);
        regs.set(Register::C, 0x12);
        regs.set(Register::D, 0xFF);
        assert_eq!(regs.pair(Register::C, Register::D), 0x12FF);
    }
}
