use std::fmt;

use fxhash::FxHashSet;

use crate::error::{lex_invalid_lit, lex_unclosed_str, lex_unknown, AsmError};
use crate::isa;
use crate::lexer::cursor::Cursor;
use crate::span::Span;
use crate::symbol::{DirKind, Register};

pub mod cursor;

#[derive(Clone, PartialEq, Eq, Debug)]
pub enum TokenKind {
    Instr,
    Reg(Register),
    /// Identifier directly followed by `:`. The colon is part of the token.
    Label,
    Ident,
    Dir(DirKind),
    Num(i64),
    /// String or char literal with escapes resolved
    Str(String),
    Comma,
    Colon,
    Plus,
    Minus,
    Star,
    LBracket,
    RBracket,
    LParen,
    RParen,
    /// Optional immediate marker
    Hash,
    Newline,
    Comment,
    Eof,
}

impl fmt::Display for TokenKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TokenKind::Instr => write!(f, "instruction"),
            TokenKind::Reg(_) => write!(f, "register"),
            TokenKind::Label => write!(f, "label"),
            TokenKind::Ident => write!(f, "identifier"),
            TokenKind::Dir(_) => write!(f, "directive"),
            TokenKind::Num(_) => write!(f, "number"),
            TokenKind::Str(_) => write!(f, "string"),
            TokenKind::Comma => write!(f, "`,`"),
            TokenKind::Colon => write!(f, "`:`"),
            TokenKind::Plus => write!(f, "`+`"),
            TokenKind::Minus => write!(f, "`-`"),
            TokenKind::Star => write!(f, "`*`"),
            TokenKind::LBracket => write!(f, "`[`"),
            TokenKind::RBracket => write!(f, "`]`"),
            TokenKind::LParen => write!(f, "`(`"),
            TokenKind::RParen => write!(f, "`)`"),
            TokenKind::Hash => write!(f, "`#`"),
            TokenKind::Newline => write!(f, "end of line"),
            TokenKind::Comment => write!(f, "comment"),
            TokenKind::Eof => write!(f, "end of file"),
        }
    }
}

#[derive(Clone, PartialEq, Eq, Debug)]
pub struct Token {
    pub kind: TokenKind,
    /// Source text of the token, without a label's trailing colon
    pub text: String,
    pub span: Span,
}

/// Name sets used to classify identifiers. Lookups are case-insensitive.
#[derive(Clone, Debug)]
pub struct LexerConfig {
    instructions: FxHashSet<String>,
    registers: FxHashSet<String>,
    directives: FxHashSet<String>,
}

impl LexerConfig {
    pub fn new<'a>(
        instructions: impl IntoIterator<Item = &'a str>,
        registers: impl IntoIterator<Item = &'a str>,
        directives: impl IntoIterator<Item = &'a str>,
    ) -> Self {
        fn upper<'a>(names: impl IntoIterator<Item = &'a str>) -> FxHashSet<String> {
            names.into_iter().map(str::to_ascii_uppercase).collect()
        }
        LexerConfig {
            instructions: upper(instructions),
            registers: upper(registers),
            directives: upper(directives),
        }
    }

    fn classify(&self, ident: &str) -> TokenKind {
        let upper = ident.to_ascii_uppercase();
        if self.directives.contains(&upper) {
            if let Some(dir) = DirKind::from_name(&upper) {
                return TokenKind::Dir(dir);
            }
        }
        if self.instructions.contains(&upper) {
            return TokenKind::Instr;
        }
        if self.registers.contains(&upper) {
            if let Ok(reg) = upper.parse() {
                return TokenKind::Reg(reg);
            }
        }
        TokenKind::Ident
    }
}

impl Default for LexerConfig {
    fn default() -> Self {
        LexerConfig::new(
            isa::mnemonics(),
            Register::ALL.iter().map(|reg| reg.name()),
            DirKind::NAMES,
        )
    }
}

pub(crate) fn is_id_start(c: char) -> bool {
    matches!(c, 'a'..='z' | 'A'..='Z' | '_' | '.')
}

pub(crate) fn is_id(c: char) -> bool {
    matches!(c, 'a'..='z' | 'A'..='Z' | '0'..='9' | '_' | '.')
}

/// Parse a numeric literal in any of the supported bases.
pub fn parse_number(text: &str) -> Option<i64> {
    let lower = text.to_ascii_lowercase();
    let (digits, radix) = if let Some(rest) = lower.strip_prefix('$') {
        (rest, 16)
    } else if let Some(rest) = lower.strip_suffix('h') {
        (rest, 16)
    } else if let Some(rest) = lower.strip_prefix("0x") {
        (rest, 16)
    } else if let Some(rest) = lower.strip_prefix("0b") {
        (rest, 2)
    } else if let Some(rest) = lower.strip_suffix('b') {
        (rest, 2)
    } else if let Some(rest) = lower.strip_suffix('o') {
        (rest, 8)
    } else if let Some(rest) = lower.strip_suffix('d') {
        (rest, 10)
    } else {
        (lower.as_str(), 10)
    };
    if digits.is_empty() {
        return None;
    }
    i64::from_str_radix(digits, radix).ok()
}

/// Turn source text into a token stream ending in [`TokenKind::Eof`].
pub fn tokenize(src: &str, config: &LexerConfig) -> Result<Vec<Token>, AsmError> {
    let mut cursor = Cursor::new(src);
    let mut tokens = Vec::new();
    loop {
        let token = cursor.advance_token(config)?;
        let is_eof = token.kind == TokenKind::Eof;
        tokens.push(token);
        if is_eof {
            return Ok(tokens);
        }
    }
}

impl Cursor<'_> {
    pub fn advance_token(&mut self, config: &LexerConfig) -> Result<Token, AsmError> {
        // Skip insignificant whitespace
        self.reset_pos();
        self.take_while(|c| matches!(c, ' ' | '\t' | '\r'));
        self.reset_pos();

        let first_char = match self.bump() {
            Some(c) => c,
            None => return Ok(self.finish(TokenKind::Eof)),
        };
        let kind = match first_char {
            '\n' => TokenKind::Newline,
            ';' => {
                self.take_while(|c| c != '\n');
                TokenKind::Comment
            }
            ',' => TokenKind::Comma,
            ':' => TokenKind::Colon,
            '+' => TokenKind::Plus,
            '-' => TokenKind::Minus,
            '*' => TokenKind::Star,
            '[' => TokenKind::LBracket,
            ']' => TokenKind::RBracket,
            '(' => TokenKind::LParen,
            ')' => TokenKind::RParen,
            '#' => TokenKind::Hash,
            quote @ ('"' | '\'') => TokenKind::Str(self.string_lit(quote)?),
            '$' if self.first().is_ascii_hexdigit() => self.number()?,
            c if c.is_ascii_digit() => self.number()?,
            // Identifiers should be checked after everything else that overlaps.
            c if is_id_start(c) => {
                self.take_while(is_id);
                if self.first() == ':' {
                    let name = self.token_text().to_string();
                    self.bump();
                    return Ok(Token {
                        kind: TokenKind::Label,
                        text: name,
                        span: self.token_span(),
                    });
                }
                config.classify(self.token_text())
            }
            c => return Err(lex_unknown(self.token_span(), c)),
        };
        Ok(self.finish(kind))
    }

    fn finish(&self, kind: TokenKind) -> Token {
        Token {
            kind,
            text: self.token_text().to_string(),
            span: self.token_span(),
        }
    }

    fn number(&mut self) -> Result<TokenKind, AsmError> {
        self.take_while(|c| c.is_ascii_alphanumeric() || c == '_');
        let text = self.token_text().replace('_', "");
        match parse_number(&text) {
            Some(value) => Ok(TokenKind::Num(value)),
            None => Err(lex_invalid_lit(self.token_span(), self.token_text())),
        }
    }

    fn string_lit(&mut self, quote: char) -> Result<String, AsmError> {
        let mut value = String::new();
        loop {
            match self.bump() {
                None | Some('\n') => return Err(lex_unclosed_str(self.token_span())),
                Some(c) if c == quote => return Ok(value),
                Some('\\') => {
                    let escaped = match self.bump() {
                        Some('n') => '\n',
                        Some('t') => '\t',
                        Some('r') => '\r',
                        Some('0') => '\0',
                        Some(c) => c,
                        None => return Err(lex_unclosed_str(self.token_span())),
                    };
                    value.push(escaped);
                }
                Some(c) => value.push(c),
            }
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn kinds(src: &str) -> Vec<TokenKind> {
        tokenize(src, &LexerConfig::default())
            .unwrap()
            .into_iter()
            .map(|token| token.kind)
            .collect()
    }

    #[test]
    fn classifies_identifiers() {
        assert_eq!(
            kinds("start: mov a, count ; set up\n"),
            vec![
                TokenKind::Label,
                TokenKind::Instr,
                TokenKind::Reg(Register::A),
                TokenKind::Comma,
                TokenKind::Ident,
                TokenKind::Comment,
                TokenKind::Newline,
                TokenKind::Eof,
            ]
        );
        // An instruction name followed by a colon is still a label
        assert_eq!(kinds("mov:")[0], TokenKind::Label);
        assert_eq!(kinds(".data")[0], TokenKind::Dir(DirKind::Switch(crate::symbol::SectionKind::Data)));
        assert_eq!(kinds("msg db")[1], TokenKind::Dir(DirKind::Define(1)));
    }

    #[test]
    fn numeric_literals() {
        assert_eq!(parse_number("42"), Some(42));
        assert_eq!(parse_number("0x1F"), Some(31));
        assert_eq!(parse_number("$ff"), Some(255));
        assert_eq!(parse_number("0b101"), Some(5));
        assert_eq!(parse_number("0Bh"), Some(11));
        assert_eq!(parse_number("1010b"), Some(10));
        assert_eq!(parse_number("17o"), Some(15));
        assert_eq!(parse_number("99d"), Some(99));
        assert_eq!(parse_number("12z"), None);
        assert_eq!(kinds("$10 0FFh")[..2], [TokenKind::Num(16), TokenKind::Num(255)]);
    }

    #[test]
    fn string_literals_unescape() {
        assert_eq!(
            kinds(r#""a\"b\n" 'x'"#)[..2],
            [TokenKind::Str("a\"b\n".into()), TokenKind::Str("x".into())]
        );
        assert!(tokenize("\"open", &LexerConfig::default()).is_err());
    }

    #[test]
    fn positions_are_tracked() {
        let tokens = tokenize("nop\n  halt", &LexerConfig::default()).unwrap();
        let halt = &tokens[2];
        assert_eq!(halt.text, "halt");
        assert_eq!((halt.span.line, halt.span.col), (2, 3));
        assert_eq!(halt.span.as_range(), 6..10);
    }

    #[test]
    fn unknown_character_reports_position() {
        let err = tokenize("mov a, @", &LexerConfig::default()).unwrap_err();
        assert_eq!((err.line, err.col), (1, 8));
    }
}
