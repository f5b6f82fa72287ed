use crate::span::Span;
use crate::symbol::SectionKind;

/// One output byte and where it came from.
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct EmittedByte {
    pub address: u16,
    pub value: u8,
    pub section: SectionKind,
    /// Source text of the statement, attached to its first byte
    pub comment: Option<String>,
    pub is_opcode: bool,
    /// Statement that produced the byte
    pub span: Span,
}

#[derive(Clone, Debug)]
pub struct Section {
    pub kind: SectionKind,
    pub start: u16,
    /// Start fixed by `.ORG` before anything was placed
    pub origin: Option<u16>,
    /// Highest offset reached during symbol collection
    pub size: u32,
    /// Emitted bytes, in ascending address order
    pub bytes: Vec<EmittedByte>,
}

impl Section {
    pub fn new(kind: SectionKind) -> Self {
        Section {
            kind,
            start: 0,
            origin: None,
            size: 0,
            bytes: Vec::new(),
        }
    }

    pub fn name(&self) -> &'static str {
        self.kind.name()
    }

    /// Is the absolute start known while symbols are still being collected.
    pub(crate) fn start_is_fixed(&self) -> bool {
        self.origin.is_some() || self.kind == SectionKind::Text
    }

    pub(crate) fn emit(
        &mut self,
        address: u16,
        value: u8,
        comment: Option<String>,
        is_opcode: bool,
        span: Span,
    ) {
        self.bytes.push(EmittedByte {
            address,
            value,
            section: self.kind,
            comment,
            is_opcode,
            span,
        });
    }

    /// Overwrite a placeholder byte. Reservations and `.ORG` leave gaps, so the byte is found by
    /// address rather than by position.
    pub(crate) fn patch(&mut self, address: u16, value: u8) -> bool {
        let idx = self.bytes.partition_point(|byte| byte.address < address);
        match self.bytes.get_mut(idx) {
            Some(byte) if byte.address == address => {
                byte.value = value;
                true
            }
            _ => false,
        }
    }

    pub fn get(&self, address: u16) -> Option<&EmittedByte> {
        let idx = self.bytes.partition_point(|byte| byte.address < address);
        self.bytes.get(idx).filter(|byte| byte.address == address)
    }
}

/// Operand bytes left as zero until the named label is known.
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct UnresolvedRef {
    /// Absolute address of the first placeholder byte
    pub address: u16,
    pub section: SectionKind,
    pub label: String,
    /// Placeholder width, 1 or 2 bytes
    pub size: u8,
    pub addend: i64,
    pub span: Span,
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn patch_finds_bytes_across_gaps() {
        let mut section = Section::new(SectionKind::Data);
        let span = Span::dummy();
        section.emit(0x2000, 1, None, false, span);
        section.emit(0x2010, 0, None, false, span);
        section.emit(0x2011, 0, None, false, span);
        assert!(section.patch(0x2011, 0x7F));
        assert!(!section.patch(0x2005, 0x7F));
        assert_eq!(section.get(0x2011).map(|byte| byte.value), Some(0x7F));
        assert_eq!(section.get(0x2010).map(|byte| byte.value), Some(0));
    }
}
