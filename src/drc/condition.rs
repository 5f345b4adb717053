//! Rule condition language
//!
//! Conditions are compiled once and evaluated per (item, other, layer):
//!
//! ```text
//! A.Type == 'via' && (A.NetClass == 'Power*' || B.Reference != 'J?')
//! A.insideArea('RF shield') || !A.intersectsArea('KO*')
//! ```
//!
//! `B.*` comparisons are false when there is no second item.

use glob::Pattern;
use std::fmt;

/// Which item of the evaluation a term refers to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Side {
    A,
    B,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Property {
    Type,
    Layer,
    NetName,
    NetClass,
    Reference,
    Name,
}

impl Property {
    fn from_ident(ident: &str) -> Option<Self> {
        Some(match ident {
            "Type" => Property::Type,
            "Layer" => Property::Layer,
            "NetName" => Property::NetName,
            "NetClass" => Property::NetClass,
            "Reference" => Property::Reference,
            "Name" => Property::Name,
            _ => return None,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AreaTest {
    Inside,
    Intersects,
}

#[derive(Debug, Clone)]
enum Expr {
    Compare {
        side: Side,
        prop: Property,
        negate: bool,
        pattern: Pattern,
    },
    Area {
        side: Side,
        test: AreaTest,
        area: String,
    },
    Not(Box<Expr>),
    And(Box<Expr>, Box<Expr>),
    Or(Box<Expr>, Box<Expr>),
}

/// Parse failure with the byte offset it was detected at
#[derive(Debug, Clone, PartialEq)]
pub struct ConditionError {
    pub offset: usize,
    pub reason: String,
}

impl fmt::Display for ConditionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "offset {}: {}", self.offset, self.reason)
    }
}

/// What a condition needs from the engine to evaluate
pub trait ConditionContext {
    /// Values of `prop` for one side; `None` when that side has no item.
    /// Multi-valued properties (layers) match if any value matches.
    fn property(&self, side: Side, prop: Property) -> Option<Vec<String>>;

    /// Area function result; `Err` for unknown areas
    fn area_test(&self, side: Side, test: AreaTest, area: &str) -> Result<bool, String>;
}

/// A compiled condition
#[derive(Debug, Clone)]
pub struct Condition {
    source: String,
    expr: Expr,
}

impl Condition {
    pub fn parse(source: &str) -> Result<Self, ConditionError> {
        let tokens = tokenize(source)?;
        let mut parser = Parser { tokens, pos: 0, end: source.len() };
        let expr = parser.parse_or()?;
        if let Some(tok) = parser.tokens.get(parser.pos) {
            return Err(ConditionError {
                offset: tok.offset,
                reason: format!("unexpected {}", tok.kind),
            });
        }
        Ok(Self { source: source.to_string(), expr })
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    /// Whether any term compares `prop`
    pub fn references(&self, prop: Property) -> bool {
        fn walk(expr: &Expr, prop: Property) -> bool {
            match expr {
                Expr::Compare { prop: p, .. } => *p == prop,
                Expr::Area { .. } => false,
                Expr::Not(e) => walk(e, prop),
                Expr::And(l, r) | Expr::Or(l, r) => walk(l, prop) || walk(r, prop),
            }
        }
        walk(&self.expr, prop)
    }

    pub fn uses_area_functions(&self) -> bool {
        fn walk(expr: &Expr) -> bool {
            match expr {
                Expr::Compare { .. } => false,
                Expr::Area { .. } => true,
                Expr::Not(e) => walk(e),
                Expr::And(l, r) | Expr::Or(l, r) => walk(l) || walk(r),
            }
        }
        walk(&self.expr)
    }

    pub fn evaluate(&self, ctx: &dyn ConditionContext) -> Result<bool, String> {
        eval(&self.expr, ctx)
    }
}

fn eval(expr: &Expr, ctx: &dyn ConditionContext) -> Result<bool, String> {
    Ok(match expr {
        Expr::Compare { side, prop, negate, pattern } => match ctx.property(*side, *prop) {
            None => false,
            Some(values) => {
                let hit = values.iter().any(|v| pattern.matches(v));
                hit != *negate
            }
        },
        Expr::Area { side, test, area } => ctx.area_test(*side, *test, area)?,
        Expr::Not(e) => !eval(e, ctx)?,
        Expr::And(l, r) => eval(l, ctx)? && eval(r, ctx)?,
        Expr::Or(l, r) => eval(l, ctx)? || eval(r, ctx)?,
    })
}

#[derive(Debug, Clone, PartialEq)]
enum TokenKind {
    Ident(String),
    Str(String),
    Dot,
    Eq,
    Ne,
    AndAnd,
    OrOr,
    Bang,
    LParen,
    RParen,
}

impl fmt::Display for TokenKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TokenKind::Ident(s) => write!(f, "'{}'", s),
            TokenKind::Str(s) => write!(f, "string '{}'", s),
            TokenKind::Dot => f.write_str("'.'"),
            TokenKind::Eq => f.write_str("'=='"),
            TokenKind::Ne => f.write_str("'!='"),
            TokenKind::AndAnd => f.write_str("'&&'"),
            TokenKind::OrOr => f.write_str("'||'"),
            TokenKind::Bang => f.write_str("'!'"),
            TokenKind::LParen => f.write_str("'('"),
            TokenKind::RParen => f.write_str("')'"),
        }
    }
}

#[derive(Debug, Clone)]
struct Token {
    kind: TokenKind,
    offset: usize,
}

fn tokenize(src: &str) -> Result<Vec<Token>, ConditionError> {
    let mut tokens = Vec::new();
    let mut chars = src.char_indices().peekable();
    while let Some((offset, c)) = chars.next() {
        let kind = match c {
            c if c.is_whitespace() => continue,
            '.' => TokenKind::Dot,
            '(' => TokenKind::LParen,
            ')' => TokenKind::RParen,
            '=' | '&' | '|' => {
                let doubled = matches!(chars.peek(), Some((_, n)) if *n == c);
                if !doubled {
                    return Err(ConditionError { offset, reason: format!("expected '{}{}'", c, c) });
                }
                chars.next();
                match c {
                    '=' => TokenKind::Eq,
                    '&' => TokenKind::AndAnd,
                    _ => TokenKind::OrOr,
                }
            }
            '!' => {
                if matches!(chars.peek(), Some((_, '='))) {
                    chars.next();
                    TokenKind::Ne
                } else {
                    TokenKind::Bang
                }
            }
            '\'' | '"' => {
                let mut value = String::new();
                let mut closed = false;
                for (_, n) in chars.by_ref() {
                    if n == c {
                        closed = true;
                        break;
                    }
                    value.push(n);
                }
                if !closed {
                    return Err(ConditionError { offset, reason: "unterminated string".into() });
                }
                TokenKind::Str(value)
            }
            c if c.is_alphabetic() || c == '_' => {
                let mut ident = String::from(c);
                while let Some((_, n)) = chars.peek() {
                    if n.is_alphanumeric() || *n == '_' {
                        ident.push(*n);
                        chars.next();
                    } else {
                        break;
                    }
                }
                TokenKind::Ident(ident)
            }
            other => {
                return Err(ConditionError { offset, reason: format!("unexpected character '{}'", other) });
            }
        };
        tokens.push(Token { kind, offset });
    }
    Ok(tokens)
}

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
    end: usize,
}

impl Parser {
    fn peek(&self) -> Option<&TokenKind> {
        self.tokens.get(self.pos).map(|t| &t.kind)
    }

    fn offset(&self) -> usize {
        self.tokens.get(self.pos).map_or(self.end, |t| t.offset)
    }

    fn error(&self, reason: impl Into<String>) -> ConditionError {
        ConditionError { offset: self.offset(), reason: reason.into() }
    }

    fn next(&mut self) -> Option<TokenKind> {
        let tok = self.tokens.get(self.pos).map(|t| t.kind.clone());
        self.pos += 1;
        tok
    }

    fn expect(&mut self, kind: TokenKind) -> Result<(), ConditionError> {
        if self.peek() == Some(&kind) {
            self.pos += 1;
            Ok(())
        } else {
            Err(self.error(format!("expected {}", kind)))
        }
    }

    fn parse_or(&mut self) -> Result<Expr, ConditionError> {
        let mut lhs = self.parse_and()?;
        while self.peek() == Some(&TokenKind::OrOr) {
            self.pos += 1;
            let rhs = self.parse_and()?;
            lhs = Expr::Or(Box::new(lhs), Box::new(rhs));
        }
        Ok(lhs)
    }

    fn parse_and(&mut self) -> Result<Expr, ConditionError> {
        let mut lhs = self.parse_unary()?;
        while self.peek() == Some(&TokenKind::AndAnd) {
            self.pos += 1;
            let rhs = self.parse_unary()?;
            lhs = Expr::And(Box::new(lhs), Box::new(rhs));
        }
        Ok(lhs)
    }

    fn parse_unary(&mut self) -> Result<Expr, ConditionError> {
        match self.peek() {
            Some(TokenKind::Bang) => {
                self.pos += 1;
                Ok(Expr::Not(Box::new(self.parse_unary()?)))
            }
            Some(TokenKind::LParen) => {
                self.pos += 1;
                let inner = self.parse_or()?;
                self.expect(TokenKind::RParen)?;
                Ok(inner)
            }
            _ => self.parse_term(),
        }
    }

    fn parse_term(&mut self) -> Result<Expr, ConditionError> {
        let side = match self.next() {
            Some(TokenKind::Ident(s)) if s == "A" => Side::A,
            Some(TokenKind::Ident(s)) if s == "B" => Side::B,
            _ => {
                self.pos = self.pos.saturating_sub(1);
                return Err(self.error("expected 'A' or 'B'"));
            }
        };
        self.expect(TokenKind::Dot)?;
        let name_offset = self.offset();
        let name = match self.next() {
            Some(TokenKind::Ident(s)) => s,
            _ => return Err(ConditionError { offset: name_offset, reason: "expected property".into() }),
        };

        let area_test = match name.as_str() {
            "insideArea" => Some(AreaTest::Inside),
            "intersectsArea" => Some(AreaTest::Intersects),
            _ => None,
        };
        if let Some(test) = area_test {
            self.expect(TokenKind::LParen)?;
            let area = self.expect_string()?;
            self.expect(TokenKind::RParen)?;
            return Ok(Expr::Area { side, test, area });
        }

        let prop = Property::from_ident(&name).ok_or_else(|| ConditionError {
            offset: name_offset,
            reason: format!("unknown property '{}'", name),
        })?;
        let negate = match self.next() {
            Some(TokenKind::Eq) => false,
            Some(TokenKind::Ne) => true,
            _ => {
                self.pos = self.pos.saturating_sub(1);
                return Err(self.error("expected '==' or '!='"));
            }
        };
        let value_offset = self.offset();
        let value = self.expect_string()?;
        let pattern = Pattern::new(&value).map_err(|e| ConditionError {
            offset: value_offset,
            reason: format!("bad pattern '{}': {}", value, e.msg),
        })?;
        Ok(Expr::Compare { side, prop, negate, pattern })
    }

    fn expect_string(&mut self) -> Result<String, ConditionError> {
        match self.peek() {
            Some(TokenKind::Str(s)) => {
                let s = s.clone();
                self.pos += 1;
                Ok(s)
            }
            _ => Err(self.error("expected quoted string")),
        }
    }
}
