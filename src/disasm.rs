use std::fmt;

use crate::isa::{self, Slot};
use crate::symbol::Register;

/// A decoded instruction.
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct Instruction {
    pub address: u16,
    pub mnemonic: &'static str,
    pub operands: Vec<String>,
    /// Encoded bytes, opcode included
    pub bytes: Vec<u8>,
}

impl Instruction {
    pub fn size(&self) -> u16 {
        self.bytes.len() as u16
    }

    /// Raw byte that is not an instruction.
    fn data(address: u16, byte: u8) -> Self {
        Instruction {
            address,
            mnemonic: "DB",
            operands: vec![format!("0x{byte:02X}")],
            bytes: vec![byte],
        }
    }

    pub fn is_data(&self) -> bool {
        self.mnemonic == "DB"
    }
}

impl fmt::Display for Instruction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.operands.is_empty() {
            return write!(f, "{}", self.mnemonic);
        }
        write!(f, "{:<10} {}", self.mnemonic, self.operands.join(", "))
    }
}

/// Decode the instruction at the start of `bytes`, which sits at `address`.
///
/// Unknown opcodes, bad register bytes and truncated operands decode as a single `DB` byte.
pub fn decode(address: u16, bytes: &[u8]) -> Option<Instruction> {
    let &opcode = bytes.first()?;
    let Some(info) = isa::decode(opcode) else {
        return Some(Instruction::data(address, opcode));
    };
    let size = info.variant.size() as usize;
    if bytes.len() < size {
        return Some(Instruction::data(address, opcode));
    }

    let mut operands = Vec::new();
    let mut pos = 1;
    for slot in info.variant.pattern.slots() {
        let text = match slot {
            Slot::Reg => match Register::from_byte(bytes[pos]) {
                Some(reg) => reg.to_string(),
                None => return Some(Instruction::data(address, opcode)),
            },
            Slot::Imm8 => format!("0x{:02X}", bytes[pos]),
            Slot::Imm16 => format!("0x{:04X}", word(bytes, pos)),
            Slot::Mem => format!("[0x{:04X}]", word(bytes, pos)),
        };
        operands.push(text);
        pos += slot.size() as usize;
    }
    Some(Instruction {
        address,
        mnemonic: info.mnemonic,
        operands,
        bytes: bytes[..size].to_vec(),
    })
}

fn word(bytes: &[u8], pos: usize) -> u16 {
    u16::from_le_bytes([bytes[pos], bytes[pos + 1]])
}

/// Linear sweep over a contiguous block starting at `start`.
pub fn disassemble(start: u16, bytes: &[u8]) -> Vec<Instruction> {
    let mut listing = Vec::new();
    let mut offset = 0;
    while let Some(instr) = decode(start.wrapping_add(offset as u16), &bytes[offset..]) {
        offset += instr.bytes.len();
        listing.push(instr);
    }
    listing
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn decodes_every_operand_kind() {
        let program = [0x11, 0x00, 0x0D, 0x13, 0x00, 0x10, 0x00, 0x16, 0x01, 0x02, 0x03, 0x01];
        let listing = disassemble(0x0000, &program);
        let text: Vec<_> = listing.iter().map(|instr| instr.to_string()).collect();
        assert_eq!(
            text,
            vec![
                "MOV        A, 0x0D",
                "MOV        [0x1000], A",
                "LDI        B, C, D",
                "HALT",
            ]
        );
        assert_eq!(listing[1].address, 3);
        assert_eq!(listing[2].size(), 4);
    }

    #[test]
    fn undecodable_bytes_become_data() {
        let listing = disassemble(0x0100, &[0xFF, 0x10, 0x09, 0x00, 0x50, 0x00]);
        assert!(listing[0].is_data());
        // Register byte 9 does not exist
        assert!(listing[1].is_data());
        assert_eq!(listing[1].address, 0x0101);
        // Truncated JMP
        assert!(listing[4].is_data());
        assert_eq!(listing[4].address, 0x0104);
        assert_eq!(listing.iter().map(Instruction::size).sum::<u16>(), 6);
    }
}
