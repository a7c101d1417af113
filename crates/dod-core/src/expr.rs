//! Expression grammar for conditions that are not a single comparison.
//!
//! ```text
//! expr       := and ( ("or" | "||") and )*
//! and        := not ( ("and" | "&&") not )*
//! not        := ("not" | "!") not | comparison
//! comparison := sum ( cmp-op sum )?
//! sum        := product ( ("+" | "-") product )*
//! product    := unary ( ("*" | "/") unary )*
//! unary      := "-" unary | atom
//! atom       := number | number "%" | string | "true" | "false" | ident | "(" expr ")"
//! ```
//!
//! Identifiers resolve against the [`Context`] only; there is nothing else
//! an expression can reach.

use crate::value::{CmpOp, Context, EvalError, Value};
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ExprError {
    #[error("unexpected end of expression")]
    UnexpectedEof,
    #[error("unexpected token: {0}")]
    UnexpectedToken(String),
    #[error("unexpected character: {0}")]
    UnexpectedChar(char),
    #[error("unterminated string literal")]
    UnterminatedString,
    #[error("invalid number: {0}")]
    InvalidNumber(String),
    #[error("expression nests deeper than {0} levels")]
    TooDeep(usize),
    #[error("expression has more than {0} tokens")]
    TooLong(usize),
}

/// Nesting limit for parentheses, `not` and unary minus.
pub const MAX_DEPTH: usize = 64;
/// Token limit; bounds the depth of left-leaning operator chains.
pub const MAX_TOKENS: usize = 1024;

// ---------------------------------------------------------------------------
// AST
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArithOp {
    Add,
    Sub,
    Mul,
    Div,
}

impl ArithOp {
    fn symbol(self) -> &'static str {
        match self {
            ArithOp::Add => "+",
            ArithOp::Sub => "-",
            ArithOp::Mul => "*",
            ArithOp::Div => "/",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Literal(Value),
    Field(String),
    Not(Box<Expr>),
    Neg(Box<Expr>),
    And(Box<Expr>, Box<Expr>),
    Or(Box<Expr>, Box<Expr>),
    Compare(Box<Expr>, CmpOp, Box<Expr>),
    Arith(Box<Expr>, ArithOp, Box<Expr>),
}

impl Expr {
    pub fn eval(&self, ctx: &Context) -> Result<Value, EvalError> {
        match self {
            Expr::Literal(v) => Ok(v.clone()),
            Expr::Field(name) => Ok(ctx.lookup(name)),
            Expr::Not(inner) => Ok(Value::Bool(!inner.eval(ctx)?.truthy())),
            Expr::Neg(inner) => match inner.eval(ctx)? {
                Value::Int(i) => Ok(i.checked_neg().map_or(Value::Float(-(i as f64)), Value::Int)),
                Value::Float(f) => Ok(Value::Float(-f)),
                other => Err(EvalError::TypeMismatch {
                    op: "-",
                    lhs: other.kind(),
                    rhs: other.kind(),
                }),
            },
            Expr::And(l, r) => {
                if !l.eval(ctx)?.truthy() {
                    return Ok(Value::Bool(false));
                }
                Ok(Value::Bool(r.eval(ctx)?.truthy()))
            }
            Expr::Or(l, r) => {
                if l.eval(ctx)?.truthy() {
                    return Ok(Value::Bool(true));
                }
                Ok(Value::Bool(r.eval(ctx)?.truthy()))
            }
            Expr::Compare(l, op, r) => Ok(Value::Bool(op.apply(&l.eval(ctx)?, &r.eval(ctx)?)?)),
            Expr::Arith(l, op, r) => arith(*op, l.eval(ctx)?, r.eval(ctx)?),
        }
    }

    /// Names of every context field the expression reads, in source order.
    pub fn fields(&self) -> Vec<&str> {
        let mut out = Vec::new();
        self.collect_fields(&mut out);
        out
    }

    fn collect_fields<'a>(&'a self, out: &mut Vec<&'a str>) {
        match self {
            Expr::Literal(_) => {}
            Expr::Field(name) => out.push(name),
            Expr::Not(e) | Expr::Neg(e) => e.collect_fields(out),
            Expr::And(l, r) | Expr::Or(l, r) | Expr::Compare(l, _, r) | Expr::Arith(l, _, r) => {
                l.collect_fields(out);
                r.collect_fields(out);
            }
        }
    }
}

fn arith(op: ArithOp, lhs: Value, rhs: Value) -> Result<Value, EvalError> {
    if let (ArithOp::Add, Value::Str(a), Value::Str(b)) = (op, &lhs, &rhs) {
        return Ok(Value::Str(format!("{a}{b}")));
    }
    let mismatch = || EvalError::TypeMismatch {
        op: op.symbol(),
        lhs: lhs.kind(),
        rhs: rhs.kind(),
    };
    if let (Value::Int(a), Value::Int(b)) = (&lhs, &rhs) {
        let exact = match op {
            ArithOp::Add => a.checked_add(*b),
            ArithOp::Sub => a.checked_sub(*b),
            ArithOp::Mul => a.checked_mul(*b),
            ArithOp::Div => None,
        };
        if let Some(v) = exact {
            return Ok(Value::Int(v));
        }
    }
    let a = lhs.as_f64().ok_or_else(mismatch)?;
    let b = rhs.as_f64().ok_or_else(mismatch)?;
    Ok(Value::Float(match op {
        ArithOp::Add => a + b,
        ArithOp::Sub => a - b,
        ArithOp::Mul => a * b,
        ArithOp::Div => {
            if b == 0.0 {
                return Err(EvalError::DivisionByZero);
            }
            a / b
        }
    }))
}

// ---------------------------------------------------------------------------
// Tokenizer
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Ident(String),
    Number(String),
    Percent(String),
    Str(String),
    Symbol(&'static str),
}

const SYMBOLS: &[&str] = &[
    ">=", "<=", "==", "!=", "&&", "||", ">", "<", "!", "+", "-", "*", "/", "(", ")",
];

fn tokenize(input: &str) -> Result<Vec<Token>, ExprError> {
    let mut tokens = Vec::new();
    let mut chars = input.char_indices().peekable();

    while let Some(&(pos, ch)) = chars.peek() {
        if ch.is_whitespace() {
            chars.next();
            continue;
        }

        if ch == '"' || ch == '\'' {
            chars.next();
            let mut value = String::new();
            let mut closed = false;
            while let Some((_, c)) = chars.next() {
                if c == ch {
                    closed = true;
                    break;
                }
                if c == '\\' {
                    match chars.next() {
                        Some((_, escaped)) => value.push(escaped),
                        None => return Err(ExprError::UnterminatedString),
                    }
                    continue;
                }
                value.push(c);
            }
            if !closed {
                return Err(ExprError::UnterminatedString);
            }
            tokens.push(Token::Str(value));
            continue;
        }

        if ch.is_ascii_digit() {
            let mut value = String::new();
            while let Some(&(_, c)) = chars.peek() {
                if c.is_ascii_digit() || c == '.' {
                    value.push(c);
                    chars.next();
                } else {
                    break;
                }
            }
            if let Some(&(_, '%')) = chars.peek() {
                chars.next();
                tokens.push(Token::Percent(value));
            } else {
                tokens.push(Token::Number(value));
            }
            continue;
        }

        if ch.is_ascii_alphabetic() || ch == '_' {
            let mut value = String::new();
            while let Some(&(_, c)) = chars.peek() {
                if c.is_ascii_alphanumeric() || c == '_' || c == '.' {
                    value.push(c);
                    chars.next();
                } else {
                    break;
                }
            }
            tokens.push(Token::Ident(value));
            continue;
        }

        let rest = &input[pos..];
        match SYMBOLS.iter().find(|s| rest.starts_with(**s)) {
            Some(sym) => {
                for _ in 0..sym.len() {
                    chars.next();
                }
                tokens.push(Token::Symbol(sym));
            }
            None => return Err(ExprError::UnexpectedChar(ch)),
        }
    }

    Ok(tokens)
}

// ---------------------------------------------------------------------------
// Parser
// ---------------------------------------------------------------------------

pub fn parse(input: &str) -> Result<Expr, ExprError> {
    let tokens = tokenize(input)?;
    if tokens.len() > MAX_TOKENS {
        return Err(ExprError::TooLong(MAX_TOKENS));
    }
    let mut parser = Parser {
        tokens,
        pos: 0,
        depth: 0,
    };
    let expr = parser.parse_or()?;
    match parser.peek() {
        None => Ok(expr),
        Some(tok) => Err(ExprError::UnexpectedToken(describe(tok))),
    }
}

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
    depth: usize,
}

impl Parser {
    fn nested<T>(
        &mut self,
        f: impl FnOnce(&mut Self) -> Result<T, ExprError>,
    ) -> Result<T, ExprError> {
        if self.depth >= MAX_DEPTH {
            return Err(ExprError::TooDeep(MAX_DEPTH));
        }
        self.depth += 1;
        let out = f(self);
        self.depth -= 1;
        out
    }

    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn next(&mut self) -> Option<Token> {
        let tok = self.tokens.get(self.pos).cloned();
        if tok.is_some() {
            self.pos += 1;
        }
        tok
    }

    fn eat_symbol(&mut self, sym: &str) -> bool {
        if matches!(self.peek(), Some(Token::Symbol(s)) if *s == sym) {
            self.pos += 1;
            return true;
        }
        false
    }

    fn eat_keyword(&mut self, kw: &str) -> bool {
        if matches!(self.peek(), Some(Token::Ident(s)) if s.eq_ignore_ascii_case(kw)) {
            self.pos += 1;
            return true;
        }
        false
    }

    fn parse_or(&mut self) -> Result<Expr, ExprError> {
        let mut lhs = self.parse_and()?;
        while self.eat_keyword("or") || self.eat_symbol("||") {
            let rhs = self.parse_and()?;
            lhs = Expr::Or(Box::new(lhs), Box::new(rhs));
        }
        Ok(lhs)
    }

    fn parse_and(&mut self) -> Result<Expr, ExprError> {
        let mut lhs = self.parse_not()?;
        while self.eat_keyword("and") || self.eat_symbol("&&") {
            let rhs = self.parse_not()?;
            lhs = Expr::And(Box::new(lhs), Box::new(rhs));
        }
        Ok(lhs)
    }

    fn parse_not(&mut self) -> Result<Expr, ExprError> {
        if self.eat_keyword("not") || self.eat_symbol("!") {
            let inner = self.nested(Self::parse_not)?;
            return Ok(Expr::Not(Box::new(inner)));
        }
        self.parse_comparison()
    }

    fn parse_comparison(&mut self) -> Result<Expr, ExprError> {
        let lhs = self.parse_sum()?;
        let op = match self.peek() {
            Some(Token::Symbol(s)) => CmpOp::scan_order()
                .iter()
                .copied()
                .find(|op| op.symbol() == *s),
            _ => None,
        };
        match op {
            Some(op) => {
                self.pos += 1;
                let rhs = self.parse_sum()?;
                Ok(Expr::Compare(Box::new(lhs), op, Box::new(rhs)))
            }
            None => Ok(lhs),
        }
    }

    fn parse_sum(&mut self) -> Result<Expr, ExprError> {
        let mut lhs = self.parse_product()?;
        loop {
            let op = if self.eat_symbol("+") {
                ArithOp::Add
            } else if self.eat_symbol("-") {
                ArithOp::Sub
            } else {
                return Ok(lhs);
            };
            let rhs = self.parse_product()?;
            lhs = Expr::Arith(Box::new(lhs), op, Box::new(rhs));
        }
    }

    fn parse_product(&mut self) -> Result<Expr, ExprError> {
        let mut lhs = self.parse_unary()?;
        loop {
            let op = if self.eat_symbol("*") {
                ArithOp::Mul
            } else if self.eat_symbol("/") {
                ArithOp::Div
            } else {
                return Ok(lhs);
            };
            let rhs = self.parse_unary()?;
            lhs = Expr::Arith(Box::new(lhs), op, Box::new(rhs));
        }
    }

    fn parse_unary(&mut self) -> Result<Expr, ExprError> {
        if self.eat_symbol("-") {
            let inner = self.nested(Self::parse_unary)?;
            return Ok(Expr::Neg(Box::new(inner)));
        }
        self.parse_atom()
    }

    fn parse_atom(&mut self) -> Result<Expr, ExprError> {
        match self.next().ok_or(ExprError::UnexpectedEof)? {
            Token::Number(raw) => parse_number(&raw).map(Expr::Literal),
            Token::Percent(raw) => raw
                .parse::<f64>()
                .map(|f| Expr::Literal(Value::Float(f)))
                .map_err(|_| ExprError::InvalidNumber(format!("{raw}%"))),
            Token::Str(s) => Ok(Expr::Literal(Value::Str(s))),
            Token::Ident(name) => {
                if name.eq_ignore_ascii_case("true") {
                    Ok(Expr::Literal(Value::Bool(true)))
                } else if name.eq_ignore_ascii_case("false") {
                    Ok(Expr::Literal(Value::Bool(false)))
                } else if is_keyword(&name) {
                    Err(ExprError::UnexpectedToken(name))
                } else {
                    Ok(Expr::Field(name))
                }
            }
            Token::Symbol("(") => {
                let inner = self.nested(Self::parse_or)?;
                if !self.eat_symbol(")") {
                    return Err(match self.peek() {
                        Some(tok) => ExprError::UnexpectedToken(describe(tok)),
                        None => ExprError::UnexpectedEof,
                    });
                }
                Ok(inner)
            }
            other => Err(ExprError::UnexpectedToken(describe(&other))),
        }
    }
}

fn parse_number(raw: &str) -> Result<Value, ExprError> {
    if raw.contains('.') {
        raw.parse::<f64>()
            .map(Value::Float)
            .map_err(|_| ExprError::InvalidNumber(raw.to_string()))
    } else {
        raw.parse::<i64>()
            .map(Value::Int)
            .map_err(|_| ExprError::InvalidNumber(raw.to_string()))
    }
}

fn is_keyword(name: &str) -> bool {
    ["and", "or", "not"]
        .iter()
        .any(|kw| name.eq_ignore_ascii_case(kw))
}

fn describe(tok: &Token) -> String {
    match tok {
        Token::Ident(s) | Token::Number(s) => s.clone(),
        Token::Percent(s) => format!("{s}%"),
        Token::Str(s) => format!("\"{s}\""),
        Token::Symbol(s) => s.to_string(),
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
