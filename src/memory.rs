//! Address space layout and the ROM/RAM backing stores.

use crate::error::EmuError;

/// Full addressable space.
const MEMORY_MAX: usize = 0x10000;

pub const ROM_START: u16 = 0x0000;
/// Exclusive
pub const ROM_END: u16 = 0x1000;
pub const RAM_START: u16 = 0x1000;
/// Exclusive
pub const RAM_END: u16 = 0xF000;
pub const IO_START: u16 = 0xF000;
/// Inclusive; I/O runs to the top of the address space.
pub const IO_END: u16 = 0xFFFF;

/// Start of device port windows.
pub const DEVICE_START: u16 = IO_START;
/// Exclusive end of device port windows, and start of the device table.
pub const DEVICE_END: u16 = 0xFE00;
pub const DEVICE_WINDOW: u16 = 16;
pub const MAX_DEVICES: usize = ((DEVICE_END - DEVICE_START) / DEVICE_WINDOW) as usize;

/// Read-only table with one kind id byte per device index.
pub const DEVICE_TABLE_START: u16 = 0xFE00;
pub const DEVICE_TABLE_END: u16 = 0xFF00;

/// Interrupt controller register block.
pub const INTERRUPT_START: u16 = 0xFF00;
pub const INTERRUPT_END: u16 = 0xFF10;

/// Initial stack pointer: top of RAM, growing downwards.
pub const STACK_TOP: u16 = RAM_END - 1;

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum Region {
    Rom,
    Ram,
    Io,
}

pub fn is_rom_address(address: u32) -> bool {
    (ROM_START as u32..ROM_END as u32).contains(&address)
}

pub fn is_ram_address(address: u32) -> bool {
    (RAM_START as u32..RAM_END as u32).contains(&address)
}

pub fn is_io_address(address: u32) -> bool {
    (IO_START as u32..=IO_END as u32).contains(&address)
}

/// Classify an address. Takes `u32` so callers computing `address + n` cannot wrap silently.
pub fn region_of(address: u32) -> Result<Region, EmuError> {
    if is_rom_address(address) {
        Ok(Region::Rom)
    } else if is_ram_address(address) {
        Ok(Region::Ram)
    } else if is_io_address(address) {
        Ok(Region::Io)
    } else {
        Err(EmuError::OutOfRange { address })
    }
}

/// Read-only after loading.
pub struct Rom {
    mem: Box<[u8; MEMORY_MAX]>,
}

impl Rom {
    pub fn new() -> Self {
        Rom {
            mem: Box::new([0; MEMORY_MAX]),
        }
    }

    pub fn read(&self, address: u16) -> Result<u8, EmuError> {
        if !is_rom_address(address as u32) {
            return Err(EmuError::OutOfRange {
                address: address as u32,
            });
        }
        Ok(self.mem[address as usize])
    }

    /// Only used by program loading; the bus never forwards writes here.
    pub fn load(&mut self, address: u16, value: u8) -> Result<(), EmuError> {
        if !is_rom_address(address as u32) {
            return Err(EmuError::OutOfRange {
                address: address as u32,
            });
        }
        self.mem[address as usize] = value;
        Ok(())
    }
}

impl Default for Rom {
    fn default() -> Self {
        Self::new()
    }
}

pub struct Ram {
    mem: Box<[u8; MEMORY_MAX]>,
}

impl Ram {
    pub fn new() -> Self {
        Ram {
            mem: Box::new([0; MEMORY_MAX]),
        }
    }

    pub fn read(&self, address: u16) -> Result<u8, EmuError> {
        if !is_ram_address(address as u32) {
            return Err(EmuError::OutOfRange {
                address: address as u32,
            });
        }
        Ok(self.mem[address as usize])
    }

    pub fn write(&mut self, address: u16, value: u8) -> Result<(), EmuError> {
        if !is_ram_address(address as u32) {
            return Err(EmuError::OutOfRange {
                address: address as u32,
            });
        }
        self.mem[address as usize] = value;
        Ok(())
    }
}

impl Default for Ram {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn regions_partition_address_space() {
        for address in 0..=u16::MAX as u32 {
            let hits = [
                is_rom_address(address),
                is_ram_address(address),
                is_io_address(address),
            ]
            .iter()
            .filter(|hit| **hit)
            .count();
            assert_eq!(hits, 1, "address 0x{address:04x} matched {hits} regions");
        }
        assert!(region_of(0x10000).is_err());
    }

    #[test]
    fn io_layout_fits() {
        assert_eq!(MAX_DEVICES, 224);
        assert_eq!(DEVICE_END, DEVICE_TABLE_START);
        assert!(DEVICE_TABLE_END as usize - DEVICE_TABLE_START as usize >= MAX_DEVICES);
        assert!(INTERRUPT_END - 1 <= IO_END);
    }

    #[test]
    fn stores_are_bounds_checked() {
        let mut ram = Ram::new();
        ram.write(0x1000, 7).unwrap();
        assert_eq!(ram.read(0x1000), Ok(7));
        assert!(ram.write(0x0FFF, 1).is_err());
        let rom = Rom::new();
        assert!(rom.read(RAM_START).is_err());
    }
}
