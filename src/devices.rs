//! Minimal built-in peripherals.

use std::any::Any;
use std::collections::VecDeque;
use std::fmt;
use std::str::FromStr;

use log::warn;

use crate::interrupt::InterruptSink;
use crate::io::IoDevice;

/// Largest console buffer before the oldest bytes are dropped.
pub const CONSOLE_CAPACITY: usize = 4096;

/// Character output device.
///
/// Port 0: write appends a byte. Port 1: read returns the buffered length, saturated.
#[derive(Debug, Default)]
pub struct Console {
    output: VecDeque<u8>,
}

impl Console {
    pub const KIND_ID: u8 = 1;

    pub fn new() -> Self {
        Self::default()
    }

    /// Buffered bytes, oldest first.
    pub fn output(&self) -> Vec<u8> {
        self.output.iter().copied().collect()
    }
}

impl IoDevice for Console {
    fn name(&self) -> &str {
        "console"
    }

    fn kind_id(&self) -> u8 {
        Self::KIND_ID
    }

    fn read(&mut self, port: u8) -> u8 {
        match port {
            1 => self.output.len().min(u8::MAX as usize) as u8,
            _ => 0,
        }
    }

    fn write(&mut self, port: u8, value: u8) {
        match port {
            0 => {
                if self.output.len() >= CONSOLE_CAPACITY {
                    warn!("Console buffer full, dropping oldest byte");
                    self.output.pop_front();
                }
                self.output.push_back(value);
            }
            // Clear
            1 => self.output.clear(),
            _ => {}
        }
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// Periodic interrupt source.
///
/// Port 0: reload period in ticks. Port 1: control, bit 0 enables. Port 2: IRQ line.
#[derive(Debug, Default)]
pub struct Timer {
    period: u8,
    counter: u8,
    enabled: bool,
    irq: u8,
}

impl Timer {
    pub const KIND_ID: u8 = 2;

    pub fn new() -> Self {
        Self::default()
    }
}

impl IoDevice for Timer {
    fn name(&self) -> &str {
        "timer"
    }

    fn kind_id(&self) -> u8 {
        Self::KIND_ID
    }

    fn read(&mut self, port: u8) -> u8 {
        match port {
            0 => self.period,
            1 => self.enabled as u8,
            2 => self.irq,
            3 => self.counter,
            _ => 0,
        }
    }

    fn write(&mut self, port: u8, value: u8) {
        match port {
            0 => {
                self.period = value;
                self.counter = 0;
            }
            1 => self.enabled = value & 1 != 0,
            2 => self.irq = value,
            _ => {}
        }
    }

    fn tick(&mut self, irq: &mut dyn InterruptSink) {
        if !self.enabled || self.period == 0 {
            return;
        }
        self.counter += 1;
        if self.counter >= self.period {
            self.counter = 0;
            irq.request_interrupt(self.irq);
        }
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// Built-in device kinds, nameable from the command line.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum DeviceKind {
    Console,
    Timer,
}

impl DeviceKind {
    pub fn build(self) -> Box<dyn IoDevice> {
        match self {
            DeviceKind::Console => Box::new(Console::new()),
            DeviceKind::Timer => Box::new(Timer::new()),
        }
    }
}

impl FromStr for DeviceKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "console" => Ok(DeviceKind::Console),
            "timer" => Ok(DeviceKind::Timer),
            _ => Err(format!("Unknown device kind '{}'", s)),
        }
    }
}

impl fmt::Display for DeviceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DeviceKind::Console => write!(f, "console"),
            DeviceKind::Timer => write!(f, "timer"),
        }
    }
}
