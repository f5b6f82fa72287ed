use std::ops::Range;

use miette::SourceSpan;

/// Position relative to start of source.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Debug)]
pub struct Idx(pub u32);

/// Holds a view into a source, plus the human-facing position of its first character.
#[derive(Clone, Copy, PartialEq, Eq, Default, Hash, Debug)]
pub struct Span {
    start: Idx,
    len: u16,
    /// 1-based line
    pub line: u32,
    /// 1-based column
    pub col: u32,
}

impl Span {
    pub fn new(start: Idx, len: u16, line: u32, col: u32) -> Self {
        Span {
            start,
            len,
            line,
            col,
        }
    }

    pub fn dummy() -> Self {
        Span::default()
    }

    pub fn offs(&self) -> usize {
        self.start.0 as usize
    }

    pub fn len(&self) -> usize {
        self.len as usize
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn end(&self) -> usize {
        self.offs() + self.len()
    }

    /// Span covering `self` through the end of `other`, positioned at `self`.
    pub fn join(self, other: Span) -> Span {
        let len = other.end().saturating_sub(self.offs()).min(u16::MAX as usize) as u16;
        Span { len, ..self }
    }

    pub fn as_range(&self) -> Range<usize> {
        let start = self.start.0 as usize;
        let end = start + self.len as usize;
        start..end
    }
}

impl From<Span> for SourceSpan {
    fn from(value: Span) -> Self {
        SourceSpan::new(value.offs().into(), value.len())
    }
}
