use std::fmt;

use crate::error::{parse_unexpected, AsmError};
use crate::isa::{InstrDef, Selector, Slot, Variant};
use crate::lexer::{Token, TokenKind};
use crate::span::Span;
use crate::symbol::Register;

/// How a name looks from the current point of the walk.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub(crate) enum Resolved {
    Constant(i64),
    Address(u16),
    Unknown,
}

pub(crate) trait Resolve {
    fn resolve(&self, name: &str) -> Resolved;
}

#[derive(Clone, PartialEq, Eq, Debug)]
pub struct LabelRef {
    pub name: String,
    pub span: Span,
}

/// Result of evaluating an operand expression.
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct Value {
    pub constant: i64,
    /// Label that could not be resolved yet. Its address is added to `constant`.
    pub label: Option<LabelRef>,
    /// No names were involved except already-defined constants
    pub literal: bool,
}

impl Value {
    fn number(constant: i64) -> Self {
        Value {
            constant,
            label: None,
            literal: true,
        }
    }
}

#[derive(Clone, PartialEq, Eq, Debug)]
pub enum Operand {
    Reg(Register, Span),
    Imm(Value, Span),
    Mem(Value, Span),
}

impl Operand {
    pub fn span(&self) -> Span {
        match self {
            Operand::Reg(_, span) | Operand::Imm(_, span) | Operand::Mem(_, span) => *span,
        }
    }

    fn fits(&self, slot: Slot) -> bool {
        matches!(
            (self, slot),
            (Operand::Reg(..), Slot::Reg)
                | (Operand::Imm(..), Slot::Imm8 | Slot::Imm16)
                | (Operand::Mem(..), Slot::Mem)
        )
    }
}

impl fmt::Display for Operand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Operand::Reg(..) => write!(f, "REG"),
            Operand::Imm(..) => write!(f, "IMM"),
            Operand::Mem(..) => write!(f, "MEM"),
        }
    }
}

/// Comma separated operand kinds, for diagnostics.
pub(crate) fn shape(operands: &[Operand]) -> String {
    if operands.is_empty() {
        return "none".into();
    }
    operands
        .iter()
        .map(|op| op.to_string())
        .collect::<Vec<_>>()
        .join(", ")
}

/// First variant, in declaration order, whose pattern and selector accept the operands.
pub(crate) fn select(def: &'static InstrDef, operands: &[Operand]) -> Option<&'static Variant> {
    def.variants.iter().find(|variant| {
        let slots = variant.pattern.slots();
        slots.len() == operands.len()
            && slots.iter().zip(operands).all(|(slot, op)| op.fits(*slot))
            && selector_accepts(variant.selector, operands)
    })
}

fn selector_accepts(selector: Selector, operands: &[Operand]) -> bool {
    match selector {
        Selector::Always => true,
        Selector::LiteralBelow(bound) => match operands.last() {
            Some(Operand::Imm(value, _)) => {
                value.literal && (0..bound as i64).contains(&value.constant)
            }
            _ => false,
        },
    }
}

/// Item of a data directive list.
#[derive(Clone, PartialEq, Eq, Debug)]
pub enum DataItem {
    /// String literal, one element per character
    Bytes(Vec<u8>, Span),
    Value(Value, Span),
}

impl DataItem {
    pub fn elements(&self) -> u32 {
        match self {
            DataItem::Bytes(bytes, _) => bytes.len() as u32,
            DataItem::Value(..) => 1,
        }
    }
}

/// Recursive descent over the tokens of a single statement.
pub(crate) struct OperandParser<'t, R> {
    toks: &'t [Token],
    pos: usize,
    resolver: &'t R,
    /// Where to point when the statement ends early
    end: Span,
}

impl<'t, R: Resolve> OperandParser<'t, R> {
    pub fn new(toks: &'t [Token], resolver: &'t R, end: Span) -> Self {
        OperandParser {
            toks,
            pos: 0,
            resolver,
            end,
        }
    }

    fn peek(&self) -> Option<&'t Token> {
        self.toks.get(self.pos)
    }

    fn next(&mut self) -> Option<&'t Token> {
        let tok = self.toks.get(self.pos)?;
        self.pos += 1;
        Some(tok)
    }

    fn at_end(&self) -> bool {
        self.pos >= self.toks.len()
    }

    fn last_span(&self) -> Span {
        self.pos
            .checked_sub(1)
            .and_then(|idx| self.toks.get(idx))
            .map(|tok| tok.span)
            .unwrap_or(self.end)
    }

    fn unexpected(&self, expected: &str) -> AsmError {
        match self.peek() {
            Some(tok) => parse_unexpected(tok.span, expected, &tok.kind),
            None => parse_unexpected(self.end, expected, TokenKind::Newline),
        }
    }

    fn expect(&mut self, kind: TokenKind, expected: &str) -> Result<&'t Token, AsmError> {
        match self.peek() {
            Some(tok) if tok.kind == kind => {
                self.pos += 1;
                Ok(tok)
            }
            _ => Err(self.unexpected(expected)),
        }
    }

    /// Everything after the mnemonic.
    pub fn operands(mut self) -> Result<Vec<Operand>, AsmError> {
        let mut operands = Vec::new();
        if self.at_end() {
            return Ok(operands);
        }
        loop {
            operands.push(self.operand()?);
            if self.at_end() {
                return Ok(operands);
            }
            self.expect(TokenKind::Comma, "`,` between operands")?;
        }
    }

    fn operand(&mut self) -> Result<Operand, AsmError> {
        let Some(first) = self.peek() else {
            return Err(self.unexpected("operand"));
        };
        match first.kind {
            TokenKind::Reg(reg) => {
                self.pos += 1;
                Ok(Operand::Reg(reg, first.span))
            }
            TokenKind::LBracket => {
                self.pos += 1;
                let value = self.expr()?;
                let close = self.expect(TokenKind::RBracket, "`]`")?;
                Ok(Operand::Mem(value, first.span.join(close.span)))
            }
            TokenKind::Hash => {
                self.pos += 1;
                let value = self.expr()?;
                Ok(Operand::Imm(value, first.span.join(self.last_span())))
            }
            _ => {
                let value = self.expr()?;
                Ok(Operand::Imm(value, first.span.join(self.last_span())))
            }
        }
    }

    /// Comma separated list for `DB` and friends.
    pub fn data_list(mut self) -> Result<Vec<DataItem>, AsmError> {
        let mut items = Vec::new();
        loop {
            match self.peek() {
                // Single characters are numbers, so `'a'+1` still works
                Some(Token {
                    kind: TokenKind::Str(text),
                    span,
                    ..
                }) if text.chars().count() != 1 => {
                    self.pos += 1;
                    items.push(DataItem::Bytes(text.bytes().collect(), *span));
                }
                Some(tok) => {
                    let value = self.expr()?;
                    items.push(DataItem::Value(value, tok.span.join(self.last_span())));
                }
                None => return Err(self.unexpected("value")),
            }
            if self.at_end() {
                return Ok(items);
            }
            self.expect(TokenKind::Comma, "`,` between values")?;
        }
    }

    /// A single expression spanning the rest of the statement.
    pub fn single(mut self) -> Result<(Value, Span), AsmError> {
        let start = self.peek().map(|tok| tok.span).unwrap_or(self.end);
        let value = self.expr()?;
        if !self.at_end() {
            return Err(self.unexpected("end of line"));
        }
        Ok((value, start.join(self.last_span())))
    }

    fn expr(&mut self) -> Result<Value, AsmError> {
        let mut lhs = self.term()?;
        loop {
            let negate = match self.peek().map(|tok| &tok.kind) {
                Some(TokenKind::Plus) => false,
                Some(TokenKind::Minus) => true,
                _ => return Ok(lhs),
            };
            let op = self.last_span_of_next();
            let rhs = self.term()?;
            let rhs = if negate { negate_value(rhs, op)? } else { rhs };
            lhs = add_values(lhs, rhs, op)?;
        }
    }

    fn term(&mut self) -> Result<Value, AsmError> {
        let mut lhs = self.unary()?;
        while let Some(TokenKind::Star) = self.peek().map(|tok| &tok.kind) {
            let op = self.last_span_of_next();
            let rhs = self.unary()?;
            if lhs.label.is_some() || rhs.label.is_some() {
                return Err(AsmError::error(
                    "parse::label_arith",
                    op,
                    "Labels cannot be multiplied",
                ));
            }
            lhs = Value {
                constant: lhs.constant.wrapping_mul(rhs.constant),
                label: None,
                literal: lhs.literal && rhs.literal,
            };
        }
        Ok(lhs)
    }

    fn unary(&mut self) -> Result<Value, AsmError> {
        if let Some(TokenKind::Minus) = self.peek().map(|tok| &tok.kind) {
            let op = self.last_span_of_next();
            let value = self.unary()?;
            return negate_value(value, op);
        }
        self.atom()
    }

    fn atom(&mut self) -> Result<Value, AsmError> {
        let Some(tok) = self.peek() else {
            return Err(self.unexpected("value"));
        };
        let value = match &tok.kind {
            TokenKind::Num(value) => Value::number(*value),
            TokenKind::Str(text) if text.chars().count() == 1 => {
                Value::number(text.chars().next().map_or(0, |c| c as i64))
            }
            TokenKind::Ident | TokenKind::Label => match self.resolver.resolve(&tok.text) {
                Resolved::Constant(value) => Value::number(value),
                Resolved::Address(address) => Value {
                    constant: address as i64,
                    label: None,
                    literal: false,
                },
                Resolved::Unknown => Value {
                    constant: 0,
                    label: Some(LabelRef {
                        name: tok.text.clone(),
                        span: tok.span,
                    }),
                    literal: false,
                },
            },
            TokenKind::LParen => {
                self.pos += 1;
                let value = self.expr()?;
                self.expect(TokenKind::RParen, "`)`")?;
                return Ok(value);
            }
            _ => return Err(self.unexpected("value")),
        };
        self.pos += 1;
        Ok(value)
    }

    /// Consume the operator token and return its span.
    fn last_span_of_next(&mut self) -> Span {
        self.next().map(|tok| tok.span).unwrap_or(self.end)
    }
}

fn negate_value(value: Value, op: Span) -> Result<Value, AsmError> {
    if value.label.is_some() {
        return Err(AsmError::error(
            "parse::label_arith",
            op,
            "Unresolved labels cannot be negated",
        ));
    }
    Ok(Value {
        constant: value.constant.wrapping_neg(),
        ..value
    })
}

fn add_values(lhs: Value, rhs: Value, op: Span) -> Result<Value, AsmError> {
    let label = match (lhs.label, rhs.label) {
        (Some(_), Some(_)) => {
            return Err(AsmError::error(
                "parse::label_arith",
                op,
                "An expression may refer to at most one unresolved label",
            ))
        }
        (label, None) | (None, label) => label,
    };
    Ok(Value {
        constant: lhs.constant.wrapping_add(rhs.constant),
        label,
        literal: lhs.literal && rhs.literal,
    })
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::isa;
    use crate::lexer::{tokenize, LexerConfig};

    struct Names;

    impl Resolve for Names {
        fn resolve(&self, name: &str) -> Resolved {
            match name {
                "SIZE" => Resolved::Constant(4),
                "here" => Resolved::Address(0x0100),
                _ => Resolved::Unknown,
            }
        }
    }

    fn operands(src: &str) -> Result<Vec<Operand>, AsmError> {
        let toks = tokenize(src, &LexerConfig::default()).unwrap();
        let toks: Vec<_> = toks
            .into_iter()
            .filter(|tok| tok.kind != TokenKind::Eof)
            .collect();
        OperandParser::new(&toks, &Names, Span::dummy()).operands()
    }

    #[test]
    fn parses_operand_kinds() {
        let ops = operands("A, #13").unwrap();
        assert!(matches!(ops[0], Operand::Reg(Register::A, _)));
        assert!(matches!(&ops[1], Operand::Imm(value, _) if value.constant == 13 && value.literal));

        let ops = operands("[0x1000], B").unwrap();
        assert!(matches!(&ops[0], Operand::Mem(value, _) if value.constant == 0x1000));
    }

    #[test]
    fn expressions_fold_constants() {
        let ops = operands("(SIZE + 2) * 3 - -1").unwrap();
        assert!(matches!(&ops[0], Operand::Imm(value, _) if value.constant == 19 && value.literal));

        let ops = operands("here + 2").unwrap();
        assert!(matches!(&ops[0], Operand::Imm(value, _) if value.constant == 0x102 && !value.literal));
    }

    #[test]
    fn unresolved_label_keeps_addend() {
        let ops = operands("[table + 4]").unwrap();
        let Operand::Mem(value, _) = &ops[0] else {
            panic!("expected memory operand");
        };
        assert_eq!(value.constant, 4);
        assert_eq!(value.label.as_ref().map(|l| l.name.as_str()), Some("table"));
        assert!(operands("a_label + other").is_err());
        assert!(operands("-a_label").is_err());
    }

    #[test]
    fn selects_variants_in_order() {
        let mov = isa::lookup("MOV").unwrap();
        let ops = operands("A, 13").unwrap();
        assert_eq!(select(mov, &ops).map(|v| v.opcode), Some(0x11));
        let ops = operands("[0x1000], A").unwrap();
        assert_eq!(select(mov, &ops).map(|v| v.opcode), Some(0x13));

        let shl = isa::lookup("SHL").unwrap();
        let ops = operands("A").unwrap();
        assert_eq!(select(shl, &ops).map(|v| v.opcode), Some(0x48));
        let ops = operands("A, 3").unwrap();
        assert_eq!(select(shl, &ops).map(|v| v.opcode), Some(0x49));
        let ops = operands("A, 9").unwrap();
        assert_eq!(select(shl, &ops), None);
        let ops = operands("A, forward").unwrap();
        assert_eq!(select(shl, &ops), None);
    }
}
