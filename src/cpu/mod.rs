mod ops;
mod registers;

pub use self::registers::{Registers, FLAG_CARRY, FLAG_ZERO};

use log::{log_enabled, trace, Level};

use crate::breakpoint::Breakpoints;
use crate::bus::Bus;
use crate::disasm;
use crate::error::EmuError;
use crate::isa;
use crate::symbol::Register;

/// How a handler wants the program counter to move.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub(crate) enum Flow {
    /// Fall through by the instruction's size
    Next,
    Jump(u16),
    Halt,
    /// Fall through, then start another core of the same CPU
    StartCore { core: usize, entry: u16 },
}

/// Observable result of stepping a single core.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum StepOutcome {
    Executed,
    /// Entered the interrupt handler for this line instead of fetching.
    Interrupted(u8),
    Halted,
    /// Not yet started with `CORE_START`.
    Idle,
    /// Stopped at a breakpoint earlier, waiting for [`Cpu::resume`].
    Paused,
    /// Arrived at a breakpoint; nothing was executed.
    Breakpoint(u16),
}

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
enum CoreState {
    Idle,
    Running,
    Halted,
}

/// One hardware thread: a register file plus its interrupt and breakpoint bookkeeping.
#[derive(Debug)]
pub struct Core {
    index: usize,
    pub regs: Registers,
    state: CoreState,
    interrupts_enabled: bool,
    in_handler: bool,
    paused: bool,
    /// Used to allow breakpoint to be passed on second attempt.
    current_breakpoint: Option<u16>,
}

impl Core {
    fn new(index: usize) -> Self {
        Core {
            index,
            regs: Registers::default(),
            state: CoreState::Idle,
            interrupts_enabled: false,
            in_handler: false,
            paused: false,
            current_breakpoint: None,
        }
    }

    /// Reset and begin executing at `pc`.
    fn start(&mut self, pc: u16, sp: u16) {
        *self = Core::new(self.index);
        self.regs = Registers::new(pc, sp);
        self.state = CoreState::Running;
    }

    pub fn index(&self) -> usize {
        self.index
    }

    pub fn is_halted(&self) -> bool {
        self.state == CoreState::Halted
    }

    pub fn is_running(&self) -> bool {
        self.state == CoreState::Running
    }

    pub fn is_paused(&self) -> bool {
        self.paused
    }

    pub fn interrupts_enabled(&self) -> bool {
        self.interrupts_enabled
    }

    pub fn in_handler(&self) -> bool {
        self.in_handler
    }

    fn operand8(&self, bus: &mut Bus, offset: u16) -> Result<u8, EmuError> {
        bus.read(self.regs.pc.wrapping_add(offset))
    }

    fn operand16(&self, bus: &mut Bus, offset: u16) -> Result<u16, EmuError> {
        bus.read16(self.regs.pc.wrapping_add(offset))
    }

    fn reg_operand(&self, bus: &mut Bus, offset: u16) -> Result<Register, EmuError> {
        let byte = self.operand8(bus, offset)?;
        Register::from_byte(byte).ok_or(EmuError::InvalidRegister {
            byte,
            pc: self.regs.pc,
        })
    }

    // The stack grows downwards; SP points at the next free byte.

    fn push8(&mut self, bus: &mut Bus, value: u8) -> Result<(), EmuError> {
        bus.write(self.regs.sp, value)?;
        self.regs.sp = self.regs.sp.wrapping_sub(1);
        Ok(())
    }

    fn pop8(&mut self, bus: &mut Bus) -> Result<u8, EmuError> {
        self.regs.sp = self.regs.sp.wrapping_add(1);
        bus.read(self.regs.sp)
    }

    /// High byte first, so the low byte ends up at the lower address.
    fn push16(&mut self, bus: &mut Bus, value: u16) -> Result<(), EmuError> {
        self.push8(bus, (value >> 8) as u8)?;
        self.push8(bus, (value & 0xFF) as u8)
    }

    fn pop16(&mut self, bus: &mut Bus) -> Result<u16, EmuError> {
        let lo = self.pop8(bus)?;
        let hi = self.pop8(bus)?;
        Ok(u16::from_le_bytes([lo, hi]))
    }

    /// Enter the interrupt handler, saving `FLAGS` then `PC`.
    fn enter_interrupt(&mut self, bus: &mut Bus, irq: u8) -> Result<(), EmuError> {
        self.push8(bus, self.regs.flags)?;
        self.push16(bus, self.regs.pc)?;
        self.interrupts_enabled = false;
        self.in_handler = true;
        bus.interrupts_mut().acknowledge(irq);
        self.regs.pc = bus.interrupts().handler_addr();
        Ok(())
    }

    /// Advance by one instruction, or one interrupt entry.
    fn step(
        &mut self,
        bus: &mut Bus,
        breakpoints: &Breakpoints,
        cpu: usize,
    ) -> Result<(StepOutcome, Option<Flow>), EmuError> {
        match self.state {
            CoreState::Idle => return Ok((StepOutcome::Idle, None)),
            CoreState::Halted => return Ok((StepOutcome::Halted, None)),
            CoreState::Running => {}
        }
        if self.paused {
            return Ok((StepOutcome::Paused, None));
        }

        let pc = self.regs.pc;
        // Remember if previous cycle paused on the same breakpoint. If so, don't break now.
        if self.current_breakpoint.is_some_and(|addr| addr != pc) {
            self.current_breakpoint = None;
        }
        if self.current_breakpoint.is_none() && breakpoints.contains(pc) {
            self.current_breakpoint = Some(pc);
            self.paused = true;
            return Ok((StepOutcome::Breakpoint(pc), None));
        }

        if self.interrupts_enabled && !self.in_handler {
            if let Some(irq) = bus.interrupts().pending_irq(cpu, self.index) {
                trace!("cpu{cpu}.{} IRQ {irq} at 0x{pc:04x}", self.index);
                self.enter_interrupt(bus, irq)?;
                return Ok((StepOutcome::Interrupted(irq), None));
            }
        }

        let opcode = bus.read(pc)?;
        self.regs.ir = opcode;
        let unknown = EmuError::UnknownOpcode { opcode, pc };
        let info = isa::decode(opcode).ok_or(unknown.clone())?;
        let handler = ops::OP_TABLE[opcode as usize].ok_or(unknown)?;
        if log_enabled!(Level::Trace) {
            let bytes: Vec<u8> = (0..info.variant.size())
                .filter_map(|offs| bus.read(pc.wrapping_add(offs)).ok())
                .collect();
            let text = disasm::decode(pc, &bytes).map_or_else(String::new, |instr| instr.to_string());
            trace!("cpu{cpu}.{} {pc:04x}: {text:<24} {}", self.index, self.regs);
        }

        let flow = handler(self, bus, opcode)?;
        let next = pc.wrapping_add(info.variant.size());
        match flow {
            Flow::Next | Flow::StartCore { .. } => self.regs.pc = next,
            Flow::Jump(target) => self.regs.pc = target,
            Flow::Halt => {
                self.regs.pc = next;
                self.state = CoreState::Halted;
                return Ok((StepOutcome::Halted, None));
            }
        }
        Ok((StepOutcome::Executed, Some(flow)))
    }
}

/// A CPU: an ordered set of cores stepped round-robin, sharing breakpoints.
#[derive(Debug)]
pub struct Cpu {
    index: usize,
    cores: Vec<Core>,
    breakpoints: Breakpoints,
    stack_top: u16,
    /// Stack bytes reserved per core below `stack_top`.
    stack_size: u16,
}

impl Cpu {
    /// Core 0 starts at `entry`; the remaining cores wait for `CORE_START`.
    pub fn new(index: usize, cores: usize, entry: u16, stack_top: u16, stack_size: u16) -> Self {
        let mut cpu = Cpu {
            index,
            cores: (0..cores.max(1)).map(Core::new).collect(),
            breakpoints: Breakpoints::new(),
            stack_top,
            stack_size,
        };
        cpu.start_core(0, entry);
        cpu
    }

    fn start_core(&mut self, core: usize, entry: u16) {
        let sp = self
            .stack_top
            .wrapping_sub(self.stack_size.wrapping_mul(core as u16));
        self.cores[core].start(entry, sp);
    }

    pub fn index(&self) -> usize {
        self.index
    }

    pub fn cores(&self) -> &[Core] {
        &self.cores
    }

    pub fn core(&self, core: usize) -> Option<&Core> {
        self.cores.get(core)
    }

    pub fn core_mut(&mut self, core: usize) -> Option<&mut Core> {
        self.cores.get_mut(core)
    }

    pub fn registers(&self, core: usize) -> Option<&Registers> {
        self.core(core).map(|core| &core.regs)
    }

    pub fn breakpoints(&self) -> &Breakpoints {
        &self.breakpoints
    }

    pub fn breakpoints_mut(&mut self) -> &mut Breakpoints {
        &mut self.breakpoints
    }

    /// No core is running or paused.
    pub fn is_halted(&self) -> bool {
        self.cores.iter().all(|core| !core.is_running())
    }

    /// Release every core paused at a breakpoint.
    pub fn resume(&mut self) {
        for core in &mut self.cores {
            core.paused = false;
        }
    }

    fn halt_all(&mut self) {
        for core in &mut self.cores {
            if core.state == CoreState::Running {
                core.state = CoreState::Halted;
            }
        }
    }

    /// Step every core once, in index order.
    ///
    /// A fatal error halts the whole CPU and is returned immediately.
    pub fn step(&mut self, bus: &mut Bus) -> Result<Vec<StepOutcome>, EmuError> {
        let mut outcomes = Vec::with_capacity(self.cores.len());
        for idx in 0..self.cores.len() {
            let result = self.cores[idx].step(bus, &self.breakpoints, self.index);
            let (outcome, flow) = match result {
                Ok(ok) => ok,
                Err(err) => {
                    self.halt_all();
                    return Err(err);
                }
            };
            if let Some(Flow::StartCore { core, entry }) = flow {
                if core >= self.cores.len() {
                    self.halt_all();
                    return Err(EmuError::NoSuchCore {
                        cpu: self.index,
                        core,
                    });
                }
                self.start_core(core, entry);
            }
            outcomes.push(outcome);
        }
        Ok(outcomes)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::breakpoint::Breakpoint;
    use crate::memory::{RAM_START, STACK_TOP};

    const ORIGIN: u16 = RAM_START;

    fn setup(program: &[u8]) -> (Cpu, Bus) {
        let mut bus = Bus::new();
        for (i, byte) in program.iter().enumerate() {
            bus.load(ORIGIN + i as u16, *byte).unwrap();
        }
        (Cpu::new(0, 1, ORIGIN, STACK_TOP, 0x100), bus)
    }

    fn run_until_halt(cpu: &mut Cpu, bus: &mut Bus) -> usize {
        let mut steps = 0;
        while !cpu.is_halted() {
            cpu.step(bus).unwrap();
            steps += 1;
            assert!(steps < 10_000, "program did not halt");
        }
        steps
    }

    #[test]
    fn mov_store_halt() {
        // MOV A,#13 ; MOV [0x2000],A ; HALT
        let (mut cpu, mut bus) = setup(&[0x11, 0, 13, 0x13, 0x00, 0x20, 0, 0x01]);
        assert_eq!(run_until_halt(&mut cpu, &mut bus), 3);
        assert_eq!(cpu.registers(0).unwrap().get(Register::A), 13);
        assert_eq!(bus.read(0x2000), Ok(13));
    }

    #[test]
    fn call_and_ret_restore_sp() {
        // CALL sub ; HALT ; sub: INC A ; RET
        let sub = ORIGIN + 4;
        let (mut cpu, mut bus) = setup(&[
            0x5A,
            (sub & 0xFF) as u8,
            (sub >> 8) as u8,
            0x01,
            0x30,
            0,
            0x05,
        ]);
        cpu.step(&mut bus).unwrap();
        let regs = cpu.registers(0).unwrap();
        assert_eq!(regs.pc, sub);
        assert_eq!(regs.sp, STACK_TOP - 2);
        // Return address stored low byte at the lower address
        assert_eq!(bus.read16(STACK_TOP - 1), Ok(ORIGIN + 3));
        cpu.step(&mut bus).unwrap();
        cpu.step(&mut bus).unwrap();
        let regs = cpu.registers(0).unwrap();
        assert_eq!(regs.pc, ORIGIN + 3);
        assert_eq!(regs.sp, STACK_TOP);
    }

    #[test]
    fn conditional_jumps_follow_flags() {
        // MOV A,#3 ; CMP A,#5 ; JL taken ; HALT ; taken: MOV B,#1 ; HALT
        let taken = ORIGIN + 10;
        let (mut cpu, mut bus) = setup(&[
            0x11,
            0,
            3,
            0x2D,
            0,
            5,
            0x56,
            (taken & 0xFF) as u8,
            (taken >> 8) as u8,
            0x01,
            0x11,
            1,
            1,
            0x01,
        ]);
        run_until_halt(&mut cpu, &mut bus);
        let regs = cpu.registers(0).unwrap();
        assert_eq!(regs.get(Register::B), 1);
        // CMP leaves A untouched
        assert_eq!(regs.get(Register::A), 3);
        assert!(regs.carry());
    }

    #[test]
    fn unknown_opcode_is_fatal() {
        let (mut cpu, mut bus) = setup(&[0x00, 0xFF]);
        cpu.step(&mut bus).unwrap();
        assert_eq!(
            cpu.step(&mut bus),
            Err(EmuError::UnknownOpcode {
                opcode: 0xFF,
                pc: ORIGIN + 1
            })
        );
        assert!(cpu.is_halted());
        assert_eq!(cpu.step(&mut bus), Ok(vec![StepOutcome::Halted]));
    }

    #[test]
    fn register_pair_load_and_store() {
        // LEA C,D,0x2345 ; MOV A,#9 ; STI C,D,A ; LDI B,C,D ; HALT
        let (mut cpu, mut bus) = setup(&[
            0x15, 2, 3, 0x45, 0x23, 0x11, 0, 9, 0x17, 2, 3, 0, 0x16, 1, 2, 3, 0x01,
        ]);
        run_until_halt(&mut cpu, &mut bus);
        assert_eq!(bus.read(0x2345), Ok(9));
        assert_eq!(cpu.registers(0).unwrap().get(Register::B), 9);
    }

    #[test]
    fn interrupt_entry_and_iret() {
        // 0: EI ; 1: NOP ; 2: HALT ... handler at +8: MOV C,#7 ; IRET
        let handler = ORIGIN + 8;
        let (mut cpu, mut bus) = setup(&[0x02, 0x00, 0x01, 0, 0, 0, 0, 0, 0x11, 2, 7, 0x04]);
        bus.interrupts_mut().set_handler_addr(handler);
        bus.interrupts_mut().set_enabled(0xFF);
        cpu.step(&mut bus).unwrap();
        cpu.core_mut(0).unwrap().regs.set_flags(true, true);
        bus.interrupts_mut().request(2);

        assert_eq!(cpu.step(&mut bus), Ok(vec![StepOutcome::Interrupted(2)]));
        let core = cpu.core(0).unwrap();
        assert_eq!(core.regs.pc, handler);
        assert!(core.in_handler() && !core.interrupts_enabled());
        assert_eq!(bus.interrupts().pending(), 0);

        // No nesting while inside the handler
        bus.interrupts_mut().request(1);
        assert_eq!(cpu.step(&mut bus), Ok(vec![StepOutcome::Executed]));
        cpu.core_mut(0).unwrap().regs.set_flags(false, false);
        cpu.step(&mut bus).unwrap();
        let core = cpu.core(0).unwrap();
        assert_eq!(core.regs.pc, ORIGIN + 1);
        assert_eq!(core.regs.flags, FLAG_ZERO | FLAG_CARRY);
        assert_eq!(core.regs.sp, STACK_TOP);
        assert!(core.interrupts_enabled() && !core.in_handler());
        assert_eq!(core.regs.get(Register::C), 7);

        // The line raised during the handler is taken now
        assert_eq!(cpu.step(&mut bus), Ok(vec![StepOutcome::Interrupted(1)]));
    }

    #[test]
    fn breakpoint_pauses_once_per_arrival() {
        // loop: INC A ; JMP loop
        let (mut cpu, mut bus) = setup(&[0x30, 0, 0x50, (ORIGIN & 0xFF) as u8, (ORIGIN >> 8) as u8]);
        cpu.breakpoints_mut().insert(Breakpoint::at(ORIGIN));

        assert_eq!(cpu.step(&mut bus), Ok(vec![StepOutcome::Breakpoint(ORIGIN)]));
        assert_eq!(cpu.step(&mut bus), Ok(vec![StepOutcome::Paused]));
        cpu.resume();
        assert_eq!(cpu.step(&mut bus), Ok(vec![StepOutcome::Executed]));
        assert_eq!(cpu.step(&mut bus), Ok(vec![StepOutcome::Executed]));
        // Back at the loop head after leaving it
        assert_eq!(cpu.step(&mut bus), Ok(vec![StepOutcome::Breakpoint(ORIGIN)]));
        assert_eq!(cpu.registers(0).unwrap().get(Register::A), 1);
    }

    #[test]
    fn core_start_runs_second_core() {
        // core 0: MOV A,#1 ; CORE_START A,second ; HALT
        // second: CORE_ID B ; HALT
        let second = ORIGIN + 8;
        let mut bus = Bus::new();
        let program = [
            0x11,
            0,
            1,
            0x06,
            0,
            (second & 0xFF) as u8,
            (second >> 8) as u8,
            0x01,
            0x07,
            1,
            0x01,
        ];
        for (i, byte) in program.iter().enumerate() {
            bus.load(ORIGIN + i as u16, *byte).unwrap();
        }
        let mut cpu = Cpu::new(0, 2, ORIGIN, STACK_TOP, 0x100);
        assert_eq!(
            cpu.step(&mut bus),
            Ok(vec![StepOutcome::Executed, StepOutcome::Idle])
        );
        // Started core steps later in the same cycle
        assert_eq!(
            cpu.step(&mut bus),
            Ok(vec![StepOutcome::Executed, StepOutcome::Executed])
        );
        let regs = cpu.registers(1).unwrap();
        assert_eq!(regs.get(Register::B), 1);
        assert_eq!(regs.sp, STACK_TOP - 0x100);
        run_until_halt(&mut cpu, &mut bus);
    }

    #[test]
    fn rom_write_halts_cpu() {
        // MOV [0x0000],#1
        let (mut cpu, mut bus) = setup(&[0x14, 0x00, 0x00, 1]);
        assert_eq!(
            cpu.step(&mut bus),
            Err(EmuError::RomWrite { address: 0x0000 })
        );
        assert!(cpu.is_halted());
    }
}
