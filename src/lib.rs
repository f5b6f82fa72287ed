// Assembling
mod lexer;
pub use lexer::{parse_number, tokenize, LexerConfig, Token, TokenKind};
pub mod asm;
pub use asm::{assemble, AsmConfig, Assembly};
pub mod disasm;
pub mod isa;

// Emulation
pub mod alu;
pub mod bus;
pub mod cpu;
pub use cpu::{Cpu, Registers, StepOutcome};
pub mod interrupt;
pub mod io;
pub use io::IoDevice;
pub mod devices;
pub use devices::DeviceKind;
pub mod memory;
mod machine;
pub use machine::{Machine, MachineConfig, MachineStatus};

mod breakpoint;
pub use breakpoint::{Breakpoint, Breakpoints};
mod error;
pub use error::{AsmError, EmuError};
pub mod span;
pub mod symbol;

pub mod env;

/// Amount of lines to show as context, each side of focus line (line containing span).
pub const DIAGNOSTIC_CONTEXT_LINES: usize = 8;
