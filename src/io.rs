use std::any::Any;

use log::warn;

use crate::error::EmuError;
use crate::interrupt::{InterruptController, InterruptSink};
use crate::memory::{
    DEVICE_END, DEVICE_START, DEVICE_TABLE_END, DEVICE_TABLE_START, DEVICE_WINDOW,
    INTERRUPT_END, INTERRUPT_START, MAX_DEVICES,
};

/// A peripheral occupying a 16-port window of I/O space.
///
/// Ports are device-relative, `0..16`.
pub trait IoDevice {
    fn name(&self) -> &str;

    /// Id published in the device table. Zero is reserved for "no device".
    fn kind_id(&self) -> u8;

    fn read(&mut self, port: u8) -> u8;

    fn write(&mut self, port: u8, value: u8);

    /// Called once per machine cycle, after every CPU has stepped.
    fn tick(&mut self, _irq: &mut dyn InterruptSink) {}

    fn as_any(&self) -> &dyn Any;
}

/// Routes I/O addresses to device windows, the device table, and the interrupt controller.
#[derive(Default)]
pub struct IoManager {
    devices: Vec<Option<Box<dyn IoDevice>>>,
    interrupts: InterruptController,
}

impl IoManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a device in the first free slot, returning its index.
    pub fn register(&mut self, device: Box<dyn IoDevice>) -> Result<usize, EmuError> {
        let index = self
            .devices
            .iter()
            .position(Option::is_none)
            .unwrap_or(self.devices.len());
        self.register_at(index, device)?;
        Ok(index)
    }

    /// Register a device at a fixed index, replacing any device already there.
    pub fn register_at(&mut self, index: usize, device: Box<dyn IoDevice>) -> Result<(), EmuError> {
        if index >= MAX_DEVICES {
            return Err(EmuError::DeviceTableFull {
                index,
                max: MAX_DEVICES,
            });
        }
        if self.devices.len() <= index {
            self.devices.resize_with(index + 1, || None);
        }
        if let Some(old) = self.devices[index].replace(device) {
            warn!("Replaced device `{}` at index {index}", old.name());
        }
        Ok(())
    }

    pub fn remove(&mut self, index: usize) -> Option<Box<dyn IoDevice>> {
        self.devices.get_mut(index).and_then(Option::take)
    }

    pub fn device(&self, index: usize) -> Option<&dyn IoDevice> {
        self.devices.get(index)?.as_deref()
    }

    /// Base address of a device index's window.
    pub fn io_base(index: usize) -> u16 {
        DEVICE_START + index as u16 * DEVICE_WINDOW
    }

    pub fn interrupts(&self) -> &InterruptController {
        &self.interrupts
    }

    pub fn interrupts_mut(&mut self) -> &mut InterruptController {
        &mut self.interrupts
    }

    fn split(address: u16) -> (usize, u8) {
        let relative = address - DEVICE_START;
        (
            (relative / DEVICE_WINDOW) as usize,
            (relative % DEVICE_WINDOW) as u8,
        )
    }

    fn device_mut(&mut self, index: usize) -> Option<&mut Box<dyn IoDevice>> {
        self.devices.get_mut(index)?.as_mut()
    }

    pub fn read(&mut self, address: u16) -> u8 {
        match address {
            DEVICE_START..DEVICE_END => {
                let (index, port) = Self::split(address);
                match self.device_mut(index) {
                    Some(device) => device.read(port),
                    None => {
                        warn!("Read from unregistered device {index} (port {port})");
                        0
                    }
                }
            }
            DEVICE_TABLE_START..DEVICE_TABLE_END => {
                let index = (address - DEVICE_TABLE_START) as usize;
                self.device(index).map_or(0, |device| device.kind_id())
            }
            INTERRUPT_START..INTERRUPT_END => self.interrupts.read(address - INTERRUPT_START),
            _ => {
                warn!("Read from reserved I/O address 0x{address:04x}");
                0
            }
        }
    }

    pub fn write(&mut self, address: u16, value: u8) {
        match address {
            DEVICE_START..DEVICE_END => {
                let (index, port) = Self::split(address);
                match self.device_mut(index) {
                    Some(device) => device.write(port, value),
                    None => warn!("Write to unregistered device {index} (port {port})"),
                }
            }
            DEVICE_TABLE_START..DEVICE_TABLE_END => {
                warn!("Ignoring write to device table at 0x{address:04x}")
            }
            INTERRUPT_START..INTERRUPT_END => {
                self.interrupts.write(address - INTERRUPT_START, value)
            }
            _ => warn!("Write to reserved I/O address 0x{address:04x}"),
        }
    }

    pub fn tick(&mut self) {
        for device in self.devices.iter_mut().flatten() {
            device.tick(&mut self.interrupts);
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::devices::Console;

    #[test]
    fn windows_route_to_devices() {
        let mut io = IoManager::new();
        assert_eq!(io.register(Box::new(Console::new())).unwrap(), 0);
        assert_eq!(io.register(Box::new(Console::new())).unwrap(), 1);
        let base = IoManager::io_base(1);
        assert_eq!(base, 0xF010);
        io.write(base, b'h');
        io.write(base, b'i');
        assert_eq!(io.read(base + 1), 2);
        assert_eq!(io.read(IoManager::io_base(0) + 1), 0);
        let console = io.device(1).unwrap().as_any().downcast_ref::<Console>().unwrap();
        assert_eq!(console.output(), b"hi");
    }

    #[test]
    fn unregistered_devices_read_zero() {
        let mut io = IoManager::new();
        assert_eq!(io.read(IoManager::io_base(7) + 3), 0);
        io.write(IoManager::io_base(7), 1);
        assert_eq!(io.read(DEVICE_TABLE_START + 7), 0);
    }

    #[test]
    fn device_table_lists_kinds() {
        let mut io = IoManager::new();
        io.register_at(4, Box::new(Console::new())).unwrap();
        assert_eq!(io.read(DEVICE_TABLE_START + 4), Console::KIND_ID);
        assert!(io.register_at(MAX_DEVICES, Box::new(Console::new())).is_err());
    }
}
