use crate::error::EmuError;
use crate::interrupt::InterruptController;
use crate::io::{IoDevice, IoManager};
use crate::memory::{region_of, Ram, Region, Rom};

/// Single dispatcher for every CPU memory access.
#[derive(Default)]
pub struct Bus {
    rom: Rom,
    ram: Ram,
    io: IoManager,
}

impl Bus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn read(&mut self, address: u16) -> Result<u8, EmuError> {
        match region_of(address as u32)? {
            Region::Rom => self.rom.read(address),
            Region::Ram => self.ram.read(address),
            Region::Io => Ok(self.io.read(address)),
        }
    }

    pub fn write(&mut self, address: u16, value: u8) -> Result<(), EmuError> {
        match region_of(address as u32)? {
            Region::Rom => Err(EmuError::RomWrite { address }),
            Region::Ram => self.ram.write(address, value),
            Region::Io => {
                self.io.write(address, value);
                Ok(())
            }
        }
    }

    /// Little-endian 16-bit read. The high byte address wraps at the top of memory.
    pub fn read16(&mut self, address: u16) -> Result<u16, EmuError> {
        let lo = self.read(address)?;
        let hi = self.read(address.wrapping_add(1))?;
        Ok(u16::from_le_bytes([lo, hi]))
    }

    /// Place a byte during program loading. Unlike [`Bus::write`], this may fill ROM.
    pub fn load(&mut self, address: u16, value: u8) -> Result<(), EmuError> {
        match region_of(address as u32)? {
            Region::Rom => self.rom.load(address, value),
            _ => self.write(address, value),
        }
    }

    pub fn add_device(&mut self, device: Box<dyn IoDevice>) -> Result<usize, EmuError> {
        self.io.register(device)
    }

    pub fn io(&self) -> &IoManager {
        &self.io
    }

    pub fn io_mut(&mut self) -> &mut IoManager {
        &mut self.io
    }

    pub fn interrupts(&self) -> &InterruptController {
        self.io.interrupts()
    }

    pub fn interrupts_mut(&mut self) -> &mut InterruptController {
        self.io.interrupts_mut()
    }

    /// Advance every device by one cycle.
    pub fn tick(&mut self) {
        self.io.tick();
    }
}
