use std::fmt;

use miette::{miette, Diagnostic, LabeledSpan, Report, Severity};
use thiserror::Error;

use crate::span::Span;

// Emulation errors

/// Terminal emulation condition. The core that raised it is halted.
#[derive(Clone, Debug, PartialEq, Eq, Error, Diagnostic)]
pub enum EmuError {
    #[error("Write to read-only memory at 0x{address:04x}")]
    #[diagnostic(
        code(emu::rom_write),
        help("ROM can only be filled while loading a program")
    )]
    RomWrite { address: u16 },

    #[error("Address 0x{address:04x} is outside every memory region")]
    #[diagnostic(code(emu::out_of_range))]
    OutOfRange { address: u32 },

    #[error("Unknown opcode 0x{opcode:02x} at 0x{pc:04x}")]
    #[diagnostic(
        code(emu::unknown_opcode),
        help("the program counter may have run into data or uninitialised memory")
    )]
    UnknownOpcode { opcode: u8, pc: u16 },

    #[error("Invalid register operand 0x{byte:02x} at 0x{pc:04x}")]
    #[diagnostic(code(emu::invalid_register))]
    InvalidRegister { byte: u8, pc: u16 },

    #[error("Core {core} does not exist on CPU {cpu}")]
    #[diagnostic(code(emu::no_such_core))]
    NoSuchCore { cpu: usize, core: usize },

    #[error("Device index {index} exceeds the {max} available I/O windows")]
    #[diagnostic(code(emu::device_table_full))]
    DeviceTableFull { index: usize, max: usize },
}

// Assembler errors

/// A single assembler problem with its position.
///
/// These are collected rather than returned early, so callers see every problem in a file.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AsmError {
    pub line: u32,
    pub col: u32,
    pub span: Span,
    pub message: String,
    pub severity: Severity,
    pub code: &'static str,
    pub help: Option<&'static str>,
}

impl AsmError {
    pub fn error(code: &'static str, span: Span, message: impl Into<String>) -> Self {
        AsmError {
            line: span.line,
            col: span.col,
            span,
            message: message.into(),
            severity: Severity::Error,
            code,
            help: None,
        }
    }

    pub fn warning(code: &'static str, span: Span, message: impl Into<String>) -> Self {
        AsmError {
            severity: Severity::Warning,
            ..Self::error(code, span, message)
        }
    }

    pub fn with_help(mut self, help: &'static str) -> Self {
        self.help = Some(help);
        self
    }

    pub fn is_error(&self) -> bool {
        self.severity == Severity::Error
    }

    /// Attach the source for rendering.
    pub fn to_report(&self, src: &str) -> Report {
        let report = match self.help {
            Some(help) => miette!(
                severity = self.severity,
                code = self.code,
                help = help,
                labels = vec![LabeledSpan::at(self.span, "here")],
                "{}",
                self.message
            ),
            None => miette!(
                severity = self.severity,
                code = self.code,
                labels = vec![LabeledSpan::at(self.span, "here")],
                "{}",
                self.message
            ),
        };
        report.with_source_code(src.to_owned())
    }
}

impl fmt::Display for AsmError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let level = match self.severity {
            Severity::Advice => "advice",
            Severity::Warning => "warning",
            Severity::Error => "error",
        };
        write!(f, "{}:{}: {level}: {}", self.line, self.col, self.message)
    }
}

// Lexer errors

pub fn lex_unknown(span: Span, ch: char) -> AsmError {
    AsmError::error("lex::unknown", span, format!("Unrecognised character `{ch}`"))
}

pub fn lex_unclosed_str(span: Span) -> AsmError {
    AsmError::error("lex::str_lit", span, "Unterminated string literal")
        .with_help("close string literals with the same quote they were opened with")
}

pub fn lex_invalid_lit(span: Span, text: &str) -> AsmError {
    AsmError::error("lex::bad_lit", span, format!("Invalid numeric literal `{text}`"))
        .with_help("use decimal, 0x/$ hex, 0b binary, or a h/b/o/d suffix")
}

// Parser errors

pub fn parse_unknown_instr(span: Span, name: &str) -> AsmError {
    AsmError::error(
        "parse::unknown_instruction",
        span,
        format!("Unknown instruction `{name}`"),
    )
}

pub fn parse_no_variant(span: Span, mnemonic: &str, shape: &str) -> AsmError {
    AsmError::error(
        "parse::no_variant",
        span,
        format!("No form of `{mnemonic}` accepts operands ({shape})"),
    )
    .with_help("check the operands for this instruction")
}

pub fn parse_unexpected(span: Span, expected: &str, found: impl fmt::Display) -> AsmError {
    AsmError::error(
        "parse::unexpected_token",
        span,
        format!("Expected {expected}, found {found}"),
    )
}

pub fn parse_duplicate_label(span: Span, name: &str) -> AsmError {
    AsmError::error(
        "parse::duplicate_label",
        span,
        format!("Label `{name}` is defined more than once"),
    )
}

pub fn parse_out_of_range(span: Span, value: i64, bits: u8) -> AsmError {
    AsmError::error(
        "parse::out_of_range",
        span,
        format!("Value {value} does not fit in {bits} bits"),
    )
}

pub fn undefined_label(span: Span, name: &str) -> AsmError {
    AsmError::error(
        "reloc::undefined_label",
        span,
        format!("Undefined label `{name}`"),
    )
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::span::Idx;

    #[test]
    fn asm_error_display_has_position() {
        let span = Span::new(Idx(10), 3, 2, 5);
        let err = undefined_label(span, "nowhere");
        assert_eq!(err.to_string(), "2:5: error: Undefined label `nowhere`");
        assert!(err.is_error());
    }

    #[test]
    fn emu_errors_render() {
        let err = EmuError::RomWrite { address: 0x0010 };
        assert_eq!(err.to_string(), "Write to read-only memory at 0x0010");
    }
}
