use std::collections::BTreeMap;

use log::{debug, info};

use crate::asm::Assembly;
use crate::breakpoint::Breakpoint;
use crate::bus::Bus;
use crate::cpu::{Cpu, Registers, StepOutcome};
use crate::devices::DeviceKind;
use crate::error::EmuError;
use crate::io::IoDevice;
use crate::memory::STACK_TOP;

#[derive(Clone, Debug)]
pub struct MachineConfig {
    pub cpus: usize,
    pub cores: usize,
    /// Initial SP of core 0 of CPU 0. Every further core, counting across CPUs, starts
    /// `stack_size` bytes lower.
    pub stack_top: u16,
    pub stack_size: u16,
    /// Where core 0 of every CPU begins until a program is loaded
    pub entry: u16,
}

impl Default for MachineConfig {
    fn default() -> Self {
        MachineConfig {
            cpus: 1,
            cores: 1,
            stack_top: STACK_TOP,
            stack_size: 0x100,
            entry: 0x0000,
        }
    }
}

/// Why [`Machine::run`] stopped.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum MachineStatus {
    /// Cycle budget used up, still running
    Running,
    /// Every core halted
    Halted,
    /// A core arrived at a breakpoint
    Paused(u16),
}

/// A complete computer: one bus shared by an ordered set of CPUs.
pub struct Machine {
    config: MachineConfig,
    bus: Bus,
    cpus: Vec<Cpu>,
    cycles: u64,
}

impl Default for Machine {
    fn default() -> Self {
        Machine::new(MachineConfig::default())
    }
}

impl Machine {
    pub fn new(config: MachineConfig) -> Self {
        let mut machine = Machine {
            cpus: Vec::new(),
            bus: Bus::new(),
            cycles: 0,
            config,
        };
        machine.reset(machine.config.entry);
        machine
    }

    /// Restart every CPU at `entry`. Memory and devices are left alone, breakpoints are kept.
    pub fn reset(&mut self, entry: u16) {
        let breakpoints: Vec<Breakpoint> = self
            .cpus
            .first()
            .map(|cpu| cpu.breakpoints().iter().cloned().collect())
            .unwrap_or_default();
        let cores = self.config.cores.max(1);
        self.cpus = (0..self.config.cpus.max(1))
            .map(|idx| {
                // Stacks of one CPU sit below those of the previous one
                let below = self.config.stack_size.wrapping_mul((idx * cores) as u16);
                let mut cpu = Cpu::new(
                    idx,
                    cores,
                    entry,
                    self.config.stack_top.wrapping_sub(below),
                    self.config.stack_size,
                );
                *cpu.breakpoints_mut() = breakpoints.clone().into();
                cpu
            })
            .collect();
        self.cycles = 0;
    }

    /// Place a byte map into memory. ROM addresses may be filled this way.
    pub fn load(&mut self, program: &BTreeMap<u16, u8>) -> Result<(), EmuError> {
        for (&address, &value) in program {
            self.bus.load(address, value)?;
        }
        debug!("loaded {} bytes", program.len());
        Ok(())
    }

    /// Load an assembled program and restart at its entry point.
    pub fn load_assembly(&mut self, assembly: &Assembly) -> Result<(), EmuError> {
        self.load(&assembly.bytes)?;
        self.reset(assembly.entry);
        Ok(())
    }

    /// Load a flat image starting at address 0.
    pub fn load_image(&mut self, image: &[u8]) -> Result<(), EmuError> {
        for (address, &value) in image.iter().enumerate() {
            let address = u16::try_from(address).map_err(|_| EmuError::OutOfRange {
                address: address as u32,
            })?;
            self.bus.load(address, value)?;
        }
        self.reset(self.config.entry);
        Ok(())
    }

    /// One clock tick: every core of every CPU steps once, then devices tick.
    ///
    /// When no core can make progress, because all of them are halted, idle or paused, time
    /// stands still: the cycle is not counted and devices do not tick.
    pub fn execute_cycle(&mut self) -> Result<Vec<StepOutcome>, EmuError> {
        if !self.can_progress() {
            return Ok(Vec::new());
        }
        self.cycles += 1;
        let mut outcomes = Vec::new();
        for cpu in &mut self.cpus {
            outcomes.extend(cpu.step(&mut self.bus)?);
        }
        self.bus.tick();
        Ok(outcomes)
    }

    /// Run up to `cycles` cycles, stopping early when halted or at a breakpoint.
    pub fn run(&mut self, cycles: u64) -> Result<MachineStatus, EmuError> {
        for _ in 0..cycles {
            if !self.can_progress() {
                break;
            }
            let outcomes = self.execute_cycle()?;
            let breakpoint = outcomes.iter().find_map(|outcome| match outcome {
                StepOutcome::Breakpoint(address) => Some(*address),
                _ => None,
            });
            if let Some(address) = breakpoint {
                info!("Paused at breakpoint 0x{address:04x}");
                return Ok(MachineStatus::Paused(address));
            }
        }
        Ok(self.status())
    }

    pub fn status(&self) -> MachineStatus {
        if self.is_halted() {
            return MachineStatus::Halted;
        }
        let paused = self
            .cpus
            .iter()
            .flat_map(|cpu| cpu.cores())
            .find(|core| core.is_paused());
        match paused {
            Some(core) => MachineStatus::Paused(core.regs.pc),
            None => MachineStatus::Running,
        }
    }

    pub fn is_halted(&self) -> bool {
        self.cpus.iter().all(Cpu::is_halted)
    }

    /// Some core is running and not waiting at a breakpoint.
    fn can_progress(&self) -> bool {
        self.cpus
            .iter()
            .flat_map(|cpu| cpu.cores())
            .any(|core| core.is_running() && !core.is_paused())
    }

    /// Direct bus read, with the same routing a CPU sees.
    pub fn read_memory(&mut self, address: u16) -> Result<u8, EmuError> {
        self.bus.read(address)
    }

    /// Direct bus write. ROM stays read-only; use [`Machine::load`] to fill it.
    pub fn write_memory(&mut self, address: u16, value: u8) -> Result<(), EmuError> {
        self.bus.write(address, value)
    }

    pub fn add_device(&mut self, device: Box<dyn IoDevice>) -> Result<usize, EmuError> {
        let name = device.name().to_string();
        let index = self.bus.add_device(device)?;
        info!("Attached {name} as device {index}");
        Ok(index)
    }

    pub fn add_device_kind(&mut self, kind: DeviceKind) -> Result<usize, EmuError> {
        self.add_device(kind.build())
    }

    /// Look up a device by index and concrete type.
    pub fn device<T: IoDevice + 'static>(&self, index: usize) -> Option<&T> {
        self.bus.io().device(index)?.as_any().downcast_ref::<T>()
    }

    pub fn registers(&self, cpu: usize, core: usize) -> Option<&Registers> {
        self.cpus.get(cpu)?.registers(core)
    }

    pub fn cycles(&self) -> u64 {
        self.cycles
    }

    pub fn cpus(&self) -> &[Cpu] {
        &self.cpus
    }

    pub fn bus(&self) -> &Bus {
        &self.bus
    }

    pub fn bus_mut(&mut self) -> &mut Bus {
        &mut self.bus
    }

    /// Set a breakpoint on every CPU. Returns false if one already existed.
    pub fn add_breakpoint(&mut self, breakpoint: Breakpoint) -> bool {
        let mut added = false;
        for cpu in &mut self.cpus {
            added |= cpu.breakpoints_mut().insert(breakpoint.clone());
        }
        added
    }

    pub fn remove_breakpoint(&mut self, address: u16) -> bool {
        let mut removed = false;
        for cpu in &mut self.cpus {
            removed |= cpu.breakpoints_mut().remove(address);
        }
        removed
    }

    /// Continue past the breakpoint the machine is paused at.
    pub fn resume(&mut self) {
        for cpu in &mut self.cpus {
            cpu.resume();
        }
    }
}
