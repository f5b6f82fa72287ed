//! Static instruction set table.
//!
//! Every mnemonic lists its variants in declaration order. The assembler picks the first variant
//! whose operand pattern and selector both accept the parsed operands; the CPU decodes an opcode
//! byte back into its variant with [`decode`].

use std::fmt;

/// Shape of an instruction's operands.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub enum Pattern {
    None,
    Reg,
    RegReg,
    RegImm8,
    RegImm16,
    RegMem,
    MemReg,
    MemImm8,
    Imm16,
    RegRegImm16,
    RegRegMem,
    RegRegReg,
}

/// A single operand slot within a pattern.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum Slot {
    Reg,
    Imm8,
    Imm16,
    Mem,
}

impl Slot {
    pub fn size(self) -> u16 {
        match self {
            Slot::Reg | Slot::Imm8 => 1,
            Slot::Imm16 | Slot::Mem => 2,
        }
    }
}

impl Pattern {
    pub fn slots(self) -> &'static [Slot] {
        use Slot::*;
        match self {
            Pattern::None => &[],
            Pattern::Reg => &[Reg],
            Pattern::RegReg => &[Reg, Reg],
            Pattern::RegImm8 => &[Reg, Imm8],
            Pattern::RegImm16 => &[Reg, Imm16],
            Pattern::RegMem => &[Reg, Mem],
            Pattern::MemReg => &[Mem, Reg],
            Pattern::MemImm8 => &[Mem, Imm8],
            Pattern::Imm16 => &[Imm16],
            Pattern::RegRegImm16 => &[Reg, Reg, Imm16],
            Pattern::RegRegMem => &[Reg, Reg, Mem],
            Pattern::RegRegReg => &[Reg, Reg, Reg],
        }
    }

    /// Encoded instruction size, opcode byte included.
    pub fn size(self) -> u16 {
        1 + self.slots().iter().map(|slot| slot.size()).sum::<u16>()
    }
}

impl fmt::Display for Pattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Pattern::None => "NONE",
            Pattern::Reg => "REG",
            Pattern::RegReg => "REG_REG",
            Pattern::RegImm8 => "REG_IMM8",
            Pattern::RegImm16 => "REG_IMM16",
            Pattern::RegMem => "REG_MEM",
            Pattern::MemReg => "MEM_REG",
            Pattern::MemImm8 => "MEM_IMM8",
            Pattern::Imm16 => "IMM16",
            Pattern::RegRegImm16 => "REG_REG_IMM16",
            Pattern::RegRegMem => "REG_REG_MEM",
            Pattern::RegRegReg => "REG_REG_REG",
        };
        f.write_str(name)
    }
}

/// Extra condition a variant places on its operands, beyond their shape.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum Selector {
    Always,
    /// The last operand is a literal number below the bound
    LiteralBelow(u8),
}

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct Variant {
    pub opcode: u8,
    pub pattern: Pattern,
    pub selector: Selector,
}

impl Variant {
    pub fn size(&self) -> u16 {
        self.pattern.size()
    }
}

#[derive(Debug)]
pub struct InstrDef {
    pub mnemonic: &'static str,
    pub variants: &'static [Variant],
}

const fn v(opcode: u8, pattern: Pattern) -> Variant {
    Variant {
        opcode,
        pattern,
        selector: Selector::Always,
    }
}

const fn count(opcode: u8) -> Variant {
    Variant {
        opcode,
        pattern: Pattern::RegImm8,
        selector: Selector::LiteralBelow(8),
    }
}

macro_rules! instr {
    ( $name:literal => $( $variant:expr ),+ $(,)? ) => {
        InstrDef {
            mnemonic: $name,
            variants: &[ $( $variant ),+ ],
        }
    };
}

use Pattern as P;

pub static INSTRUCTIONS: &[InstrDef] = &[
    instr!("NOP" => v(0x00, P::None)),
    instr!("HALT" => v(0x01, P::None)),
    instr!("EI" => v(0x02, P::None)),
    instr!("DI" => v(0x03, P::None)),
    instr!("IRET" => v(0x04, P::None)),
    instr!("RET" => v(0x05, P::None)),
    instr!("CORE_START" => v(0x06, P::RegImm16)),
    instr!("CORE_ID" => v(0x07, P::Reg)),
    instr!("MOV" =>
        v(0x10, P::RegReg),
        v(0x11, P::RegImm8),
        v(0x12, P::RegMem),
        v(0x13, P::MemReg),
        v(0x14, P::MemImm8),
    ),
    instr!("LEA" => v(0x15, P::RegRegImm16), v(0x19, P::RegRegMem)),
    instr!("LDI" => v(0x16, P::RegRegReg)),
    instr!("STI" => v(0x17, P::RegRegReg)),
    instr!("PUSH" => v(0x1A, P::Reg)),
    instr!("POP" => v(0x1B, P::Reg)),
    instr!("PUSHF" => v(0x1C, P::None)),
    instr!("POPF" => v(0x1D, P::None)),
    instr!("ADD" => v(0x20, P::RegReg), v(0x21, P::RegImm8), v(0x22, P::RegMem)),
    instr!("SUB" => v(0x23, P::RegReg), v(0x24, P::RegImm8), v(0x25, P::RegMem)),
    instr!("AND" => v(0x26, P::RegReg), v(0x27, P::RegImm8)),
    instr!("OR" => v(0x28, P::RegReg), v(0x29, P::RegImm8)),
    instr!("XOR" => v(0x2A, P::RegReg), v(0x2B, P::RegImm8)),
    instr!("CMP" => v(0x2C, P::RegReg), v(0x2D, P::RegImm8)),
    instr!("TEST" => v(0x2E, P::RegReg), v(0x2F, P::RegImm8)),
    instr!("INC" => v(0x30, P::Reg)),
    instr!("DEC" => v(0x31, P::Reg)),
    instr!("NOT" => v(0x32, P::Reg)),
    instr!("ROL" => v(0x40, P::Reg), count(0x41)),
    instr!("ROR" => v(0x42, P::Reg), count(0x43)),
    instr!("RCL" => v(0x44, P::Reg), count(0x45)),
    instr!("RCR" => v(0x46, P::Reg), count(0x47)),
    instr!("SHL" => v(0x48, P::Reg), count(0x49)),
    instr!("SHR" => v(0x4A, P::Reg), count(0x4B)),
    instr!("SAR" => v(0x4C, P::Reg), count(0x4D)),
    instr!("JMP" => v(0x50, P::Imm16), v(0x51, P::RegReg)),
    instr!("JZ" => v(0x52, P::Imm16)),
    instr!("JNZ" => v(0x53, P::Imm16)),
    instr!("JC" => v(0x54, P::Imm16)),
    instr!("JNC" => v(0x55, P::Imm16)),
    instr!("JL" => v(0x56, P::Imm16)),
    instr!("JLE" => v(0x57, P::Imm16)),
    instr!("JG" => v(0x58, P::Imm16)),
    instr!("JGE" => v(0x59, P::Imm16)),
    instr!("CALL" => v(0x5A, P::Imm16)),
];

/// Case-insensitive mnemonic lookup.
pub fn lookup(mnemonic: &str) -> Option<&'static InstrDef> {
    INSTRUCTIONS
        .iter()
        .find(|def| def.mnemonic.eq_ignore_ascii_case(mnemonic))
}

/// Decoded form of an opcode byte.
#[derive(Clone, Copy, Debug)]
pub struct OpInfo {
    pub mnemonic: &'static str,
    pub variant: Variant,
}

static DECODE_TABLE: std::sync::OnceLock<[Option<OpInfo>; 256]> = std::sync::OnceLock::new();

/// Map an opcode byte to its mnemonic and variant.
pub fn decode(opcode: u8) -> Option<OpInfo> {
    DECODE_TABLE.get_or_init(|| {
        let mut table = [Option::<OpInfo>::None; 256];
        for def in INSTRUCTIONS {
            for variant in def.variants {
                table[variant.opcode as usize] = Some(OpInfo {
                    mnemonic: def.mnemonic,
                    variant: *variant,
                });
            }
        }
        table
    })[opcode as usize]
}

/// Names the lexer classifies as instructions.
pub fn mnemonics() -> impl Iterator<Item = &'static str> {
    INSTRUCTIONS.iter().map(|def| def.mnemonic)
}

#[cfg(test)]
mod test {
    use std::collections::HashSet;

    use super::*;

    #[test]
    fn pattern_sizes() {
        assert_eq!(Pattern::None.size(), 1);
        assert_eq!(Pattern::Reg.size(), 2);
        assert_eq!(Pattern::RegImm8.size(), 3);
        assert_eq!(Pattern::Imm16.size(), 3);
        assert_eq!(Pattern::MemReg.size(), 4);
        assert_eq!(Pattern::MemImm8.size(), 4);
        assert_eq!(Pattern::RegRegReg.size(), 4);
        assert_eq!(Pattern::RegRegMem.size(), 5);
    }

    #[test]
    fn opcodes_are_unique() {
        let mut seen = HashSet::new();
        for def in INSTRUCTIONS {
            for variant in def.variants {
                assert!(
                    seen.insert(variant.opcode),
                    "opcode 0x{:02x} used twice ({})",
                    variant.opcode,
                    def.mnemonic
                );
            }
        }
    }

    #[test]
    fn decode_matches_table() {
        let mov = lookup("mov").unwrap();
        assert_eq!(mov.variants.len(), 5);
        let info = decode(0x13).unwrap();
        assert_eq!(info.mnemonic, "MOV");
        assert_eq!(info.variant.pattern, Pattern::MemReg);
        assert!(decode(0xFF).is_none());
    }
}
