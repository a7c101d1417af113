use crate::expr::{self, Expr};
use crate::value::{CmpOp, Context, EvalError, Value};

// ---------------------------------------------------------------------------
// Condition
// ---------------------------------------------------------------------------

/// A compiled rule condition.
///
/// `field OP literal` compiles to [`Condition::Compare`]; anything else goes
/// through the expression grammar. Strings neither form accepts compile to
/// [`Condition::Invalid`] and always evaluate to `false`.
#[derive(Debug, Clone, PartialEq)]
pub enum Condition {
    Compare {
        field: String,
        op: CmpOp,
        value: Value,
    },
    Expr(Expr),
    Invalid {
        reason: String,
    },
}

impl Condition {
    pub fn parse(source: &str) -> Condition {
        let trimmed = source.trim();
        if let Some((op, lhs, rhs)) = split_operator(trimmed) {
            let field = lhs.trim();
            let rhs = rhs.trim();
            if is_identifier(field) && is_single_literal(rhs) {
                return Condition::Compare {
                    field: field.to_string(),
                    op,
                    value: Value::parse_literal(rhs),
                };
            }
        }
        match expr::parse(trimmed) {
            Ok(e) => Condition::Expr(e),
            Err(e) => Condition::Invalid {
                reason: e.to_string(),
            },
        }
    }

    pub fn is_valid(&self) -> bool {
        !matches!(self, Condition::Invalid { .. })
    }

    pub fn evaluate(&self, ctx: &Context) -> Result<bool, EvalError> {
        match self {
            Condition::Compare { field, op, value } => op.apply(&ctx.lookup(field), value),
            Condition::Expr(e) => Ok(e.eval(ctx)?.truthy()),
            Condition::Invalid { reason } => Err(EvalError::Malformed(reason.clone())),
        }
    }

    /// Predicate view: any error counts as "does not hold".
    pub fn holds(&self, ctx: &Context) -> bool {
        self.evaluate(ctx).unwrap_or(false)
    }

    /// `(field, op, threshold)` for a simple numeric comparison.
    pub fn numeric_threshold(&self) -> Option<(&str, CmpOp, f64)> {
        match self {
            Condition::Compare {
                field,
                op,
                value: value @ (Value::Int(_) | Value::Float(_)),
            } => value.as_f64().map(|t| (field.as_str(), *op, t)),
            _ => None,
        }
    }
}

// ---------------------------------------------------------------------------
// Display operands
// ---------------------------------------------------------------------------

/// Operands shown next to a result: the first token before the operator and
/// the text after it. Purely cosmetic; for compound expressions these need
/// not match what was evaluated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DisplayOperands {
    pub actual_key: Option<String>,
    pub expected: Option<String>,
}

pub fn display_operands(source: &str) -> DisplayOperands {
    match split_operator(source) {
        Some((_, lhs, rhs)) => DisplayOperands {
            actual_key: lhs
                .split_whitespace()
                .next()
                .map(|t| t.trim_start_matches('(').to_string())
                .filter(|t| !t.is_empty()),
            expected: Some(rhs.trim().to_string()).filter(|s| !s.is_empty()),
        },
        None => DisplayOperands {
            actual_key: None,
            expected: None,
        },
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn split_operator(source: &str) -> Option<(CmpOp, &str, &str)> {
    CmpOp::scan_order().iter().find_map(|op| {
        source
            .find(op.symbol())
            .map(|idx| (*op, &source[..idx], &source[idx + op.symbol().len()..]))
    })
}

fn is_identifier(s: &str) -> bool {
    let mut chars = s.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '.')
}

fn is_single_literal(s: &str) -> bool {
    if s.is_empty() {
        return false;
    }
    for q in ['"', '\''] {
        if s.len() >= 2 && s.starts_with(q) && s.ends_with(q) {
            return !s[1..s.len() - 1].contains(q);
        }
    }
    s.chars()
        .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '%' | '-' | '+'))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
