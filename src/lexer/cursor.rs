// Heavily inspired and referenced from `rustc_lexer` and adapted to suit the project.
// See https://doc.rust-lang.org/beta/nightly-rustc/src/rustc_lexer/cursor.rs.html

use std::str::Chars;

use crate::span::{Idx, Span};

/// Peekable iterator over a char sequence, tracking line and column.
#[derive(Clone)]
pub struct Cursor<'a> {
    input: &'a str,
    len_remaining: usize,
    chars: Chars<'a>,
    /// Start of the token being scanned
    token_start: usize,
    token_line: u32,
    token_col: u32,
    line: u32,
    col: u32,
}

pub(crate) const EOF_CHAR: char = '\0';

impl<'a> Cursor<'a> {
    pub fn new(input: &'a str) -> Cursor<'a> {
        Cursor {
            input,
            len_remaining: input.len(),
            chars: input.chars(),
            token_start: 0,
            token_line: 1,
            token_col: 1,
            line: 1,
            col: 1,
        }
    }

    /// Peeks the next symbol from the input stream without consuming it.
    pub fn first(&self) -> char {
        self.chars.clone().next().unwrap_or(EOF_CHAR)
    }

    /// File is finished parsing
    pub fn is_eof(&self) -> bool {
        self.chars.as_str().is_empty()
    }

    /// Move to the next character.
    pub fn bump(&mut self) -> Option<char> {
        let c = self.chars.next()?;
        if c == '\n' {
            self.line += 1;
            self.col = 1;
        } else {
            self.col += 1;
        }
        Some(c)
    }

    /// Eats symbols while predicate returns true or until the end of file is reached.
    pub fn take_while(&mut self, mut predicate: impl FnMut(char) -> bool) {
        while predicate(self.first()) && !self.is_eof() {
            self.bump();
        }
    }

    /// Byte offset of the cursor into the input.
    pub fn offset(&self) -> usize {
        self.input.len() - self.chars.as_str().len()
    }

    /// Returns amount of already consumed bytes in the current token.
    pub fn pos_in_token(&self) -> usize {
        self.len_remaining - self.chars.as_str().len()
    }

    /// Text of the current token.
    pub fn token_text(&self) -> &'a str {
        &self.input[self.token_start..self.offset()]
    }

    /// Span of the current token.
    pub fn token_span(&self) -> Span {
        let len = self.pos_in_token().min(u16::MAX as usize) as u16;
        Span::new(
            Idx(self.token_start as u32),
            len,
            self.token_line,
            self.token_col,
        )
    }

    /// Resets the number of bytes consumed to 0, starting a new token.
    pub fn reset_pos(&mut self) {
        self.len_remaining = self.chars.as_str().len();
        self.token_start = self.offset();
        self.token_line = self.line;
        self.token_col = self.col;
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn tracks_lines_and_columns() {
        let mut cur = Cursor::new("ab\ncd");
        cur.bump();
        cur.bump();
        cur.bump();
        cur.reset_pos();
        cur.take_while(|c| c.is_ascii_alphabetic());
        let span = cur.token_span();
        assert_eq!((span.line, span.col), (2, 1));
        assert_eq!(cur.token_text(), "cd");
        assert!(cur.is_eof());
    }
}
