use std::fmt;
use std::str::FromStr;

use fxhash::FxBuildHasher;
use indexmap::IndexMap;

use crate::span::Span;

// Symbol table of symbol -> definition, in definition order
pub type FxMap<K, V> = IndexMap<K, V, FxBuildHasher>;

/// Represents the general purpose CPU registers.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Debug)]
pub enum Register {
    A = 0,
    B,
    C,
    D,
    E,
    F,
}

impl Register {
    pub const ALL: [Register; 6] = [
        Register::A,
        Register::B,
        Register::C,
        Register::D,
        Register::E,
        Register::F,
    ];

    /// Decode a register operand byte.
    pub fn from_byte(byte: u8) -> Option<Register> {
        Self::ALL.get(byte as usize).copied()
    }

    pub fn index(self) -> usize {
        self as usize
    }

    pub fn name(self) -> &'static str {
        match self {
            Register::A => "A",
            Register::B => "B",
            Register::C => "C",
            Register::D => "D",
            Register::E => "E",
            Register::F => "F",
        }
    }
}

impl FromStr for Register {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|reg| reg.name().eq_ignore_ascii_case(s))
            .ok_or(())
    }
}

impl fmt::Display for Register {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Output sections. Each has its own start address and address counter.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Debug)]
pub enum SectionKind {
    Text = 0,
    Data,
    Bss,
}

impl SectionKind {
    pub const ALL: [SectionKind; 3] = [SectionKind::Text, SectionKind::Data, SectionKind::Bss];

    pub fn name(self) -> &'static str {
        match self {
            SectionKind::Text => ".text",
            SectionKind::Data => ".data",
            SectionKind::Bss => ".bss",
        }
    }

    pub fn from_name(name: &str) -> Option<SectionKind> {
        let name = name.strip_prefix('.').unwrap_or(name);
        Self::ALL
            .into_iter()
            .find(|kind| kind.name()[1..].eq_ignore_ascii_case(name))
    }
}

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum DirKind {
    Section,
    /// `.text`, `.data`, `.bss` used on their own
    Switch(SectionKind),
    Org,
    Global,
    Extern,
    Include,
    Equ,
    /// Data definition with element size in bytes
    Define(u8),
    /// Reservation with element size in bytes
    Reserve(u8),
}

impl DirKind {
    pub const NAMES: [&'static str; 17] = [
        "SECTION", ".TEXT", ".DATA", ".BSS", ".ORG", "GLOBAL", "EXTERN", "INCLUDE", "EQU", "DB",
        "DW", "DD", "DQ", "RESB", "RESW", "RESD", "RESQ",
    ];

    pub fn from_name(name: &str) -> Option<DirKind> {
        let kind = match name.to_ascii_uppercase().as_str() {
            "SECTION" => DirKind::Section,
            ".TEXT" => DirKind::Switch(SectionKind::Text),
            ".DATA" => DirKind::Switch(SectionKind::Data),
            ".BSS" => DirKind::Switch(SectionKind::Bss),
            ".ORG" => DirKind::Org,
            "GLOBAL" => DirKind::Global,
            "EXTERN" => DirKind::Extern,
            "INCLUDE" => DirKind::Include,
            "EQU" => DirKind::Equ,
            "DB" => DirKind::Define(1),
            "DW" => DirKind::Define(2),
            "DD" => DirKind::Define(4),
            "DQ" => DirKind::Define(8),
            "RESB" => DirKind::Reserve(1),
            "RESW" => DirKind::Reserve(2),
            "RESD" => DirKind::Reserve(4),
            "RESQ" => DirKind::Reserve(8),
            _ => return None,
        };
        Some(kind)
    }

    /// Directives that name the identifier in front of them.
    pub fn defines_symbol(self) -> bool {
        matches!(
            self,
            DirKind::Equ | DirKind::Define(_) | DirKind::Reserve(_)
        )
    }
}

/// A label, data label, or `EQU` constant.
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct Symbol {
    pub name: String,
    pub section: SectionKind,
    /// Offset from the start of `section`
    pub address: u16,
    /// Literal payload for data and constants. Only filled for `EQU`.
    pub value: Vec<i64>,
    /// Element size of the defining directive. Zero for labels and constants.
    pub size: u8,
    pub is_global: bool,
    pub span: Span,
}

impl Symbol {
    /// Constants defined with `EQU` have no storage.
    pub fn is_constant(&self) -> bool {
        self.size == 0 && !self.value.is_empty()
    }
}

#[derive(Debug, Default)]
pub struct SymbolTable {
    symbols: FxMap<String, Symbol>,
}

impl SymbolTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the previous definition's span if the name was already defined.
    pub fn insert(&mut self, symbol: Symbol) -> Result<(), Span> {
        if let Some(existing) = self.symbols.get(&symbol.name) {
            return Err(existing.span);
        }
        self.symbols.insert(symbol.name.clone(), symbol);
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<&Symbol> {
        self.symbols.get(name)
    }

    pub fn get_mut(&mut self, name: &str) -> Option<&mut Symbol> {
        self.symbols.get_mut(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.symbols.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.symbols.len()
    }

    pub fn is_empty(&self) -> bool {
        self.symbols.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Symbol> {
        self.symbols.values()
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn register_names_are_case_insensitive() {
        assert_eq!("a".parse(), Ok(Register::A));
        assert_eq!("F".parse(), Ok(Register::F));
        assert_eq!("G".parse::<Register>(), Err(()));
        assert_eq!(Register::from_byte(3), Some(Register::D));
        assert_eq!(Register::from_byte(6), None);
    }

    #[test]
    fn section_names() {
        assert_eq!(SectionKind::from_name(".data"), Some(SectionKind::Data));
        assert_eq!(SectionKind::from_name("BSS"), Some(SectionKind::Bss));
        assert_eq!(SectionKind::from_name(".rodata"), None);
    }

    #[test]
    fn duplicate_symbols_are_rejected() {
        let mut table = SymbolTable::new();
        let symbol = Symbol {
            name: "loop".into(),
            section: SectionKind::Text,
            address: 4,
            value: Vec::new(),
            size: 0,
            is_global: false,
            span: Span::dummy(),
        };
        assert!(table.insert(symbol.clone()).is_ok());
        assert!(table.insert(symbol).is_err());
        assert_eq!(table.len(), 1);
    }
}
