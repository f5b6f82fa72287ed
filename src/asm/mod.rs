//! Two-pass assembler.
//!
//! The first pass walks every statement to build the symbol table and measure each section. Once
//! sizes are known, sections are laid out one after the other. The second pass emits bytes. Names
//! that the second pass has not reached yet are written as zero placeholders and patched once
//! every statement has been seen.

use std::collections::BTreeMap;

use fxhash::FxHashSet;
use log::{debug, warn};

use crate::error::{
    parse_duplicate_label, parse_no_variant, parse_out_of_range, parse_unexpected,
    parse_unknown_instr, undefined_label, AsmError,
};
use crate::isa;
use crate::lexer::{tokenize, LexerConfig, Token, TokenKind};
use crate::span::Span;
use crate::symbol::{DirKind, SectionKind, Symbol, SymbolTable};

use self::operand::{DataItem, OperandParser, Resolve, Resolved, Value};

pub mod operand;
pub mod section;

pub use self::operand::Operand;
pub use self::section::{EmittedByte, Section, UnresolvedRef};

/// Names that make a global symbol the program entry, in order of preference.
const ENTRY_NAMES: [&str; 3] = ["_start", "start", "main"];

#[derive(Clone, Debug)]
pub struct AsmConfig {
    /// Default start of `.text`
    pub start: u16,
    pub lexer: LexerConfig,
}

impl Default for AsmConfig {
    fn default() -> Self {
        AsmConfig {
            start: 0x0000,
            lexer: LexerConfig::default(),
        }
    }
}

/// Output of an assembly run. Always produced, even when there are errors.
#[derive(Debug)]
pub struct Assembly {
    pub bytes: BTreeMap<u16, u8>,
    pub entry: u16,
    pub sections: Vec<Section>,
    pub symbols: SymbolTable,
    pub diagnostics: Vec<AsmError>,
}

impl Assembly {
    pub fn has_errors(&self) -> bool {
        self.diagnostics.iter().any(AsmError::is_error)
    }

    pub fn errors(&self) -> impl Iterator<Item = &AsmError> {
        self.diagnostics.iter().filter(|diag| diag.is_error())
    }

    pub fn section(&self, kind: SectionKind) -> Option<&Section> {
        self.sections.iter().find(|section| section.kind == kind)
    }

    /// Absolute address of a label, or the value of a constant.
    pub fn symbol_value(&self, name: &str) -> Option<i64> {
        let symbol = self.symbols.get(name)?;
        if symbol.is_constant() {
            return symbol.value.first().copied();
        }
        let section = self.section(symbol.section)?;
        Some(section.start as i64 + symbol.address as i64)
    }

    /// Contiguous image from address 0 up to the highest emitted byte. Gaps are zero.
    pub fn image(&self) -> Vec<u8> {
        let Some((&last, _)) = self.bytes.last_key_value() else {
            return Vec::new();
        };
        let mut image = vec![0; last as usize + 1];
        for (&address, &value) in &self.bytes {
            image[address as usize] = value;
        }
        image
    }
}

/// Assemble a source file.
pub fn assemble(src: &str, config: &AsmConfig) -> Assembly {
    let tokens = match tokenize(src, &config.lexer) {
        Ok(tokens) => tokens,
        Err(err) => {
            return Assembly {
                bytes: BTreeMap::new(),
                entry: config.start,
                sections: SectionKind::ALL.into_iter().map(Section::new).collect(),
                symbols: SymbolTable::new(),
                diagnostics: vec![err],
            }
        }
    };
    let mut asm = Assembler::new(src, &tokens, config);
    asm.collect_symbols();
    asm.layout();
    asm.generate();
    asm.relocate();
    asm.finish()
}

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
enum Pass {
    Symbols,
    Emit,
}

/// Tokens of one source line, comments and newline stripped.
#[derive(Clone, Copy)]
struct Line<'t> {
    toks: &'t [Token],
    /// Span of the entire line's content
    span: Span,
}

struct Assembler<'a> {
    src: &'a str,
    lines: Vec<Line<'a>>,
    config: &'a AsmConfig,
    pass: Pass,
    symbols: SymbolTable,
    sections: [Section; 3],
    current: SectionKind,
    /// Statement being walked
    line: Span,
    /// Per-section address counters, relative to the section start
    counters: [u32; 3],
    /// Names defined so far during emission
    seen: FxHashSet<String>,
    globals: Vec<(String, Span)>,
    unresolved: Vec<UnresolvedRef>,
    diagnostics: Vec<AsmError>,
}

impl<'a> Assembler<'a> {
    fn new(src: &'a str, tokens: &'a [Token], config: &'a AsmConfig) -> Self {
        let lines = tokens
            .split(|tok| matches!(tok.kind, TokenKind::Newline | TokenKind::Eof))
            .filter_map(|line| {
                let end = line
                    .iter()
                    .position(|tok| tok.kind == TokenKind::Comment)
                    .unwrap_or(line.len());
                let toks = &line[..end];
                let first = toks.first()?;
                let last = toks.last()?;
                Some(Line {
                    toks,
                    span: first.span.join(last.span),
                })
            })
            .collect();
        Assembler {
            src,
            lines,
            config,
            pass: Pass::Symbols,
            symbols: SymbolTable::new(),
            sections: SectionKind::ALL.map(Section::new),
            current: SectionKind::Text,
            line: Span::dummy(),
            counters: [0; 3],
            seen: FxHashSet::default(),
            globals: Vec::new(),
            unresolved: Vec::new(),
            diagnostics: Vec::new(),
        }
    }

    fn section(&self) -> &Section {
        &self.sections[self.current as usize]
    }

    fn section_mut(&mut self) -> &mut Section {
        &mut self.sections[self.current as usize]
    }

    fn counter(&self) -> u32 {
        self.counters[self.current as usize]
    }

    fn advance(&mut self, by: u32) {
        let idx = self.current as usize;
        self.counters[idx] += by;
        if self.pass == Pass::Symbols {
            let section = &mut self.sections[idx];
            section.size = section.size.max(self.counters[idx]);
        }
    }

    fn report(&mut self, err: AsmError) {
        self.diagnostics.push(err);
    }

    fn reset(&mut self, pass: Pass) {
        self.pass = pass;
        self.current = SectionKind::Text;
        self.counters = [0; 3];
    }

    fn collect_symbols(&mut self) {
        self.reset(Pass::Symbols);
        self.walk();
        debug!("collected {} symbols", self.symbols.len());
    }

    /// Fix each section start now that sizes are known.
    fn layout(&mut self) {
        let mut next = self.config.start as u32;
        for section in &mut self.sections {
            let start = section.origin.map(u32::from).unwrap_or(next);
            section.start = start.min(u16::MAX as u32) as u16;
            next = start + section.size;
            debug!(
                "{} at 0x{:04x}, {} bytes",
                section.name(),
                section.start,
                section.size
            );
        }
    }

    fn generate(&mut self) {
        self.reset(Pass::Emit);
        self.walk();
    }

    fn walk(&mut self) {
        for idx in 0..self.lines.len() {
            let Line { toks, span } = self.lines[idx];
            self.line = span;
            if let Err(err) = self.statement(toks, span) {
                self.report(err);
            }
        }
    }

    fn statement(&mut self, toks: &'a [Token], line: Span) -> Result<(), AsmError> {
        let mut rest = toks;
        // Prefix labels
        while let Some((first, tail)) = rest.split_first() {
            if first.kind != TokenKind::Label {
                break;
            }
            // A label directly in front of a data directive names that data
            if let Some(Token {
                kind: TokenKind::Dir(dir),
                ..
            }) = tail.first()
            {
                if dir.defines_symbol() {
                    return self.directive(*dir, &tail[1..], Some(first), tail[0].span);
                }
            }
            // Keep going so the statement is still measured
            if let Err(err) = self.define(first, 0, Vec::new()) {
                self.report(err);
            }
            rest = tail;
        }

        let Some((first, tail)) = rest.split_first() else {
            return Ok(());
        };
        match &first.kind {
            TokenKind::Instr => self.instruction(first, tail, line),
            TokenKind::Dir(DirKind::Equ) => Err(AsmError::error(
                "parse::unnamed_constant",
                first.span,
                "`EQU` needs a name in front of it",
            )),
            TokenKind::Dir(dir) => self.directive(*dir, tail, None, first.span),
            TokenKind::Ident => match tail.first() {
                Some(Token {
                    kind: TokenKind::Dir(dir),
                    span,
                    ..
                }) if dir.defines_symbol() => self.directive(*dir, &tail[1..], Some(first), *span),
                _ => Err(parse_unknown_instr(first.span, &first.text)),
            },
            kind => Err(parse_unexpected(
                first.span,
                "instruction, directive or label",
                kind,
            )),
        }
    }

    /// Record a symbol at the current address.
    fn define(&mut self, name: &Token, size: u8, value: Vec<i64>) -> Result<(), AsmError> {
        match self.pass {
            Pass::Symbols => {
                let symbol = Symbol {
                    name: name.text.clone(),
                    section: self.current,
                    address: self.counter().min(u16::MAX as u32) as u16,
                    value,
                    size,
                    is_global: false,
                    span: name.span,
                };
                self.symbols
                    .insert(symbol)
                    .map_err(|_| parse_duplicate_label(name.span, &name.text))
            }
            Pass::Emit => {
                self.seen.insert(name.text.clone());
                Ok(())
            }
        }
    }

    fn instruction(
        &mut self,
        mnemonic: &Token,
        toks: &'a [Token],
        line: Span,
    ) -> Result<(), AsmError> {
        let def = isa::lookup(&mnemonic.text)
            .ok_or_else(|| parse_unknown_instr(mnemonic.span, &mnemonic.text))?;
        let operands = OperandParser::new(toks, &*self, line).operands()?;
        let variant = operand::select(def, &operands).ok_or_else(|| {
            parse_no_variant(mnemonic.span, def.mnemonic, &operand::shape(&operands))
        })?;

        if self.pass == Pass::Symbols {
            self.advance(variant.size() as u32);
            return Ok(());
        }

        let comment = self.src.get(line.as_range()).map(str::to_string);
        let mut result = self.emit(mnemonic.span, variant.opcode, comment, true);
        for (slot, op) in variant.pattern.slots().iter().zip(&operands) {
            let emitted = match op {
                Operand::Reg(reg, span) => self.emit(*span, reg.index() as u8, None, false),
                Operand::Imm(value, span) | Operand::Mem(value, span) => {
                    self.emit_value(value, *span, slot.size() as u8)
                }
            };
            // Every slot is still placed so addresses agree with the first pass
            result = result.and(emitted);
        }
        result
    }

    fn directive(
        &mut self,
        dir: DirKind,
        toks: &'a [Token],
        name: Option<&Token>,
        span: Span,
    ) -> Result<(), AsmError> {
        match dir {
            DirKind::Section => {
                let target = toks.first().and_then(|tok| match &tok.kind {
                    TokenKind::Dir(DirKind::Switch(kind)) => Some(*kind),
                    TokenKind::Ident => SectionKind::from_name(&tok.text),
                    _ => None,
                });
                match (target, toks.len()) {
                    (Some(kind), 1) => {
                        self.current = kind;
                        Ok(())
                    }
                    _ => Err(AsmError::error(
                        "parse::bad_section",
                        toks.first().map_or(span, |tok| tok.span),
                        "Expected a section name",
                    )
                    .with_help("sections are .text, .data and .bss")),
                }
            }
            DirKind::Switch(kind) => {
                self.no_operands(toks)?;
                self.current = kind;
                Ok(())
            }
            DirKind::Org => self.org(toks, span),
            DirKind::Global => {
                if self.pass == Pass::Symbols {
                    for tok in self.names(toks, span)? {
                        self.globals.push((tok.text.clone(), tok.span));
                    }
                }
                Ok(())
            }
            DirKind::Extern => {
                self.names(toks, span)?;
                Ok(())
            }
            DirKind::Include => match toks {
                [Token {
                    kind: TokenKind::Str(path),
                    span,
                    ..
                }] => {
                    if self.pass == Pass::Symbols {
                        warn!("ignoring include of {path}");
                        self.report(
                            AsmError::warning(
                                "parse::include",
                                *span,
                                format!("`{path}` was not included"),
                            )
                            .with_help("combine sources into a single file before assembling"),
                        );
                    }
                    Ok(())
                }
                _ => Err(parse_unexpected(
                    toks.first().map_or(span, |tok| tok.span),
                    "file name string",
                    toks.first().map_or(TokenKind::Newline, |tok| tok.kind.clone()),
                )),
            },
            DirKind::Equ => {
                let (value, value_span) = OperandParser::new(toks, &*self, span).single()?;
                if value.label.is_some() || !value.literal {
                    return Err(AsmError::error(
                        "parse::equ_value",
                        value_span,
                        "EQU values must be constant",
                    )
                    .with_help("only numbers and previously defined constants may be used"));
                }
                match name {
                    Some(name) => self.define(name, 0, vec![value.constant]),
                    None => Ok(()),
                }
            }
            DirKind::Define(size) => {
                let items = OperandParser::new(toks, &*self, span).data_list()?;
                if let Some(name) = name {
                    if let Err(err) = self.define(name, size, Vec::new()) {
                        self.report(err);
                    }
                }
                if self.pass == Pass::Symbols {
                    let count: u32 = items.iter().map(DataItem::elements).sum();
                    self.advance(count * size as u32);
                    return Ok(());
                }
                for item in &items {
                    match item {
                        DataItem::Bytes(bytes, span) => {
                            for &byte in bytes {
                                let value = Value {
                                    constant: byte as i64,
                                    label: None,
                                    literal: true,
                                };
                                self.emit_value(&value, *span, size)?;
                            }
                        }
                        DataItem::Value(value, span) => self.emit_value(value, *span, size)?,
                    }
                }
                Ok(())
            }
            DirKind::Reserve(size) => {
                let (count, count_span) = OperandParser::new(toks, &*self, span).single()?;
                if count.label.is_some() || !count.literal || count.constant < 0 {
                    return Err(AsmError::error(
                        "parse::reserve_count",
                        count_span,
                        "Reservation count must be a non-negative constant",
                    ));
                }
                if let Some(name) = name {
                    if let Err(err) = self.define(name, size, Vec::new()) {
                        self.report(err);
                    }
                }
                let bytes = (count.constant as u64).saturating_mul(size as u64);
                self.advance(bytes.min(u32::MAX as u64 / 2) as u32);
                Ok(())
            }
        }
    }

    fn no_operands(&self, toks: &[Token]) -> Result<(), AsmError> {
        match toks.first() {
            Some(tok) => Err(parse_unexpected(tok.span, "end of line", &tok.kind)),
            None => Ok(()),
        }
    }

    /// Comma separated identifiers after `GLOBAL`/`EXTERN`.
    fn names<'t>(&self, toks: &'t [Token], span: Span) -> Result<Vec<&'t Token>, AsmError> {
        let mut names = Vec::new();
        for (idx, tok) in toks.iter().enumerate() {
            let expect_name = idx % 2 == 0;
            match (&tok.kind, expect_name) {
                (TokenKind::Ident, true) => names.push(tok),
                (TokenKind::Comma, false) => {}
                (kind, true) => return Err(parse_unexpected(tok.span, "symbol name", kind)),
                (kind, false) => return Err(parse_unexpected(tok.span, "`,`", kind)),
            }
        }
        if names.is_empty() || toks.len() % 2 == 0 {
            return Err(parse_unexpected(
                toks.last().map_or(span, |tok| tok.span),
                "symbol name",
                TokenKind::Newline,
            ));
        }
        Ok(names)
    }

    fn org(&mut self, toks: &'a [Token], span: Span) -> Result<(), AsmError> {
        let (target, target_span) = OperandParser::new(toks, &*self, span).single()?;
        if target.label.is_some() || !target.literal || !(0..=0xFFFF).contains(&target.constant) {
            return Err(AsmError::error(
                "parse::org",
                target_span,
                ".ORG needs a constant address",
            ));
        }
        let target = target.constant as u32;
        let idx = self.current as usize;
        let origin = self.sections[idx].origin;
        if self.counters[idx] == 0 && (origin.is_none() || origin == Some(target as u16)) {
            let section = &mut self.sections[idx];
            section.origin = Some(target as u16);
            section.start = target as u16;
            return Ok(());
        }
        let section = &self.sections[idx];
        if !section.start_is_fixed() {
            return Err(AsmError::error(
                "parse::org",
                span,
                format!(".ORG inside {} needs the section start fixed first", section.name()),
            )
            .with_help("place .ORG at the beginning of the section"));
        }
        let start = match self.pass {
            Pass::Symbols => section.origin.map(u32::from).unwrap_or(self.config.start as u32),
            Pass::Emit => section.start as u32,
        };
        let current = start + self.counters[idx];
        if target < current {
            return Err(AsmError::error(
                "parse::org",
                target_span,
                format!(".ORG 0x{target:04x} is behind the current address 0x{current:04x}"),
            ));
        }
        self.advance(target - current);
        Ok(())
    }

    /// Place a byte at the current address. Only called while emitting.
    fn emit(
        &mut self,
        span: Span,
        value: u8,
        comment: Option<String>,
        is_opcode: bool,
    ) -> Result<(), AsmError> {
        let address = self.section().start as u32 + self.counter();
        let Ok(address) = u16::try_from(address) else {
            self.advance(1);
            return Err(AsmError::error(
                "emit::overflow",
                span,
                format!("{} runs past the end of memory", self.section().name()),
            ));
        };
        let line = self.line;
        self.section_mut().emit(address, value, comment, is_opcode, line);
        self.advance(1);
        Ok(())
    }

    /// Emit a value of `size` bytes, little-endian, deferring it if it names an unknown label.
    fn emit_value(&mut self, value: &Value, span: Span, size: u8) -> Result<(), AsmError> {
        let address = (self.section().start as u32 + self.counter()).min(u16::MAX as u32) as u16;
        let bytes = match &value.label {
            Some(label) => {
                self.unresolved.push(UnresolvedRef {
                    address,
                    section: self.current,
                    label: label.name.clone(),
                    size: size.min(2),
                    addend: value.constant,
                    span,
                });
                0u64.to_le_bytes()
            }
            None => match check_range(value.constant, size, span) {
                Ok(()) => value.constant.to_le_bytes(),
                Err(err) => {
                    self.advance(size as u32);
                    return Err(err);
                }
            },
        };
        let mut result = Ok(());
        for &byte in &bytes[..size as usize] {
            result = result.and(self.emit(span, byte, None, false));
        }
        result
    }

    /// Patch every placeholder now that all labels are known.
    fn relocate(&mut self) {
        let unresolved = std::mem::take(&mut self.unresolved);
        for reloc in &unresolved {
            let Some(target) = self.symbol_value(&reloc.label) else {
                self.report(undefined_label(reloc.span, &reloc.label));
                continue;
            };
            let value = target.wrapping_add(reloc.addend);
            if let Err(err) = check_range(value, reloc.size, reloc.span) {
                self.report(err);
                continue;
            }
            let section = &mut self.sections[reloc.section as usize];
            for (offset, byte) in value.to_le_bytes()[..reloc.size as usize].iter().enumerate() {
                section.patch(reloc.address.wrapping_add(offset as u16), *byte);
            }
        }
        self.unresolved = unresolved;
    }

    fn symbol_value(&self, name: &str) -> Option<i64> {
        let symbol = self.symbols.get(name)?;
        if symbol.is_constant() {
            return symbol.value.first().copied();
        }
        let start = self.sections[symbol.section as usize].start;
        Some(start as i64 + symbol.address as i64)
    }

    fn entry(&mut self) -> u16 {
        let globals = std::mem::take(&mut self.globals);
        for (name, span) in &globals {
            match self.symbols.get_mut(name) {
                Some(symbol) => symbol.is_global = true,
                None => self.report(undefined_label(*span, name)),
            }
        }
        let entry = ENTRY_NAMES.iter().find_map(|name| {
            let symbol = self.symbols.get(name).filter(|symbol| symbol.is_global)?;
            let value = self.symbol_value(&symbol.name)?;
            u16::try_from(value).ok()
        });
        entry.unwrap_or(self.sections[SectionKind::Text as usize].start)
    }

    fn finish(mut self) -> Assembly {
        let entry = self.entry();
        let mut bytes = BTreeMap::new();
        let mut collisions = Vec::new();
        for section in &self.sections {
            for byte in &section.bytes {
                if bytes.insert(byte.address, byte.value).is_some() {
                    collisions.push((byte.address, section.kind, byte.span));
                }
            }
        }
        for (address, kind, span) in collisions {
            warn!("address 0x{address:04x} written twice, {} wins", kind.name());
            self.report(AsmError::warning(
                "emit::overlap",
                span,
                format!("Address 0x{address:04x} is written by more than one section"),
            ));
        }

        // Errors from statements seen in both passes are reported once
        let mut unique = FxHashSet::default();
        self.diagnostics
            .retain(|diag| unique.insert((diag.span, diag.code, diag.message.clone())));
        self.diagnostics.sort_by_key(|diag| (diag.line, diag.col));

        Assembly {
            bytes,
            entry,
            sections: self.sections.into_iter().collect(),
            symbols: self.symbols,
            diagnostics: self.diagnostics,
        }
    }
}

impl Resolve for Assembler<'_> {
    fn resolve(&self, name: &str) -> Resolved {
        let Some(symbol) = self.symbols.get(name) else {
            return Resolved::Unknown;
        };
        if self.pass == Pass::Emit && !self.seen.contains(name) {
            return Resolved::Unknown;
        }
        match self.symbol_value(name) {
            Some(value) if symbol.is_constant() => Resolved::Constant(value),
            Some(value) => Resolved::Address(value.clamp(0, u16::MAX as i64) as u16),
            None => Resolved::Unknown,
        }
    }
}

/// Values that fit a slot of `size` bytes, taken as either signed or unsigned.
fn check_range(value: i64, size: u8, span: Span) -> Result<(), AsmError> {
    let bits = size as u32 * 8;
    if bits >= 64 {
        return Ok(());
    }
    let min = -(1i64 << (bits - 1));
    let max = (1i64 << bits) - 1;
    if (min..=max).contains(&value) {
        Ok(())
    } else {
        Err(parse_out_of_range(span, value, bits as u8))
    }
}

#[cfg(test)]
mod test {
    use miette::Severity;

    use super::*;

    fn asm(src: &str) -> Assembly {
        assemble(src, &AsmConfig::default())
    }

    fn bytes(assembly: &Assembly) -> Vec<(u16, u8)> {
        assembly.bytes.iter().map(|(&a, &v)| (a, v)).collect()
    }

    #[test]
    fn mov_store_halt() {
        let out = asm("MOV A, #13\nMOV [0x1000], A\nHALT\n");
        assert!(out.diagnostics.is_empty(), "{:?}", out.diagnostics);
        assert_eq!(
            out.image(),
            vec![0x11, 0x00, 13, 0x13, 0x00, 0x10, 0x00, 0x01]
        );
    }

    #[test]
    fn forward_reference_is_relocated() {
        let out = asm("JMP skip\nNOP\nNOP\nskip: HALT\n");
        assert!(!out.has_errors());
        assert_eq!(out.image(), vec![0x50, 0x05, 0x00, 0x00, 0x00, 0x01]);
        assert_eq!(out.symbol_value("skip"), Some(5));
    }

    #[test]
    fn backward_reference_resolves_directly() {
        let out = asm("top: NOP\nJNZ top + 1\n");
        assert!(!out.has_errors());
        assert_eq!(out.image(), vec![0x00, 0x53, 0x01, 0x00]);
    }

    #[test]
    fn undefined_label_is_collected() {
        let out = asm("JMP nowhere\nCALL elsewhere\nHALT\n");
        let errors: Vec<_> = out.errors().collect();
        assert_eq!(errors.len(), 2);
        assert_eq!(errors[0].code, "reloc::undefined_label");
        assert_eq!((errors[1].line, errors[1].col), (2, 6));
        // Placeholders are still emitted
        assert_eq!(out.bytes.get(&0x0006), Some(&0x01));
    }

    #[test]
    fn errors_do_not_stop_assembly() {
        let out = asm("FROB A\nMOV A, B, C\nADD A, [0x1000], B\nMOV B, 300\nHALT\n");
        let codes: Vec<_> = out.errors().map(|err| err.code).collect();
        assert_eq!(
            codes,
            vec![
                "parse::unknown_instruction",
                "parse::no_variant",
                "parse::no_variant",
                "parse::out_of_range",
            ]
        );
        assert_eq!(out.bytes.get(&0x0003), Some(&0x01));
    }

    #[test]
    fn data_section_follows_text() {
        let src = "
            .text
            MOV A, [value]
            HALT
            .data
            value DB 7, 'h', \"ok\"
            words: DW 0x1234, value
            .bss
            buf RESB 4
            after RESW 1
        ";
        let out = asm(src);
        assert!(out.diagnostics.is_empty(), "{:?}", out.diagnostics);
        let data = out.section(SectionKind::Data).unwrap();
        assert_eq!(data.start, 5);
        assert_eq!(out.symbol_value("value"), Some(5));
        assert_eq!(out.symbol_value("words"), Some(9));
        assert_eq!(out.symbol_value("buf"), Some(13));
        assert_eq!(out.symbol_value("after"), Some(17));
        assert_eq!(
            bytes(&out),
            vec![
                (0, 0x12),
                (1, 0),
                (2, 5),
                (3, 0),
                (4, 0x01),
                (5, 7),
                (6, b'h'),
                (7, b'o'),
                (8, b'k'),
                (9, 0x34),
                (10, 0x12),
                (11, 5),
                (12, 0),
            ]
        );
        let symbol = out.symbols.get("value").unwrap();
        assert_eq!((symbol.section, symbol.address, symbol.size), (SectionKind::Data, 0, 1));
    }

    #[test]
    fn equ_constants_select_count_variant() {
        let out = asm("COUNT EQU 3\nSHL A, COUNT\nSHL A\nMOV B, COUNT * 2\n");
        assert!(out.diagnostics.is_empty(), "{:?}", out.diagnostics);
        assert_eq!(bytes(&out).iter().map(|(_, v)| *v).collect::<Vec<_>>(), vec![
            0x49, 0, 3, 0x48, 0, 0x11, 1, 6
        ]);
        assert!(out.symbols.get("COUNT").unwrap().is_constant());
    }

    #[test]
    fn org_places_sections() {
        let src = "
            .ORG 0x1000
            GLOBAL main
            NOP
            main: HALT
            SECTION .data
            .ORG 0x2000
            msg DB 1
            .ORG 0x2004
            DB 2
        ";
        let out = asm(src);
        assert!(out.diagnostics.is_empty(), "{:?}", out.diagnostics);
        assert_eq!(out.entry, 0x1001);
        assert_eq!(
            bytes(&out),
            vec![(0x1000, 0x00), (0x1001, 0x01), (0x2000, 1), (0x2004, 2)]
        );
        assert!(out.symbols.get("main").unwrap().is_global);
    }

    #[test]
    fn duplicate_labels_are_reported_once() {
        let out = asm("here: NOP\nhere: HALT\n");
        let errors: Vec<_> = out.errors().collect();
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].code, "parse::duplicate_label");
        assert_eq!(errors[0].line, 2);
    }

    #[test]
    fn forward_reference_in_data() {
        let out = asm(".data\nptr DW target\n.text\nHALT\ntarget: NOP\n");
        assert!(!out.has_errors());
        // text is 2 bytes, so data starts at 2 and target sits at 1
        assert_eq!(bytes(&out), vec![(0, 0x01), (1, 0x00), (2, 0x01), (3, 0x00)]);
    }

    #[test]
    fn overlapping_sections_warn() {
        let out = asm("NOP\n.data\n.ORG 0\nDB 9\n");
        assert!(!out.has_errors());
        assert_eq!(out.diagnostics.len(), 1);
        assert_eq!(out.diagnostics[0].severity, Severity::Warning);
        // Points at the statement that wrote the byte last
        assert_eq!(out.diagnostics[0].line, 4);
        assert_eq!(out.bytes.get(&0), Some(&9));
    }

    #[test]
    fn lexer_errors_produce_empty_output() {
        let out = asm("MOV A, @\n");
        assert!(out.has_errors());
        assert!(out.bytes.is_empty());
    }
}
