use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::fmt;
use thiserror::Error;

// ---------------------------------------------------------------------------
// Value
// ---------------------------------------------------------------------------

/// A metric value. Serialized as a plain scalar so metric files read like
/// `coverage: 85` rather than a tagged map.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
}

impl Value {
    /// Parse the right-hand side of a condition into a typed literal.
    ///
    /// `80%` is a float, `true`/`false` (any case) a bool, digits without a
    /// decimal point an int, digits with one a float. Anything else stays a
    /// string, with one pair of surrounding quotes removed.
    pub fn parse_literal(raw: &str) -> Value {
        let s = raw.trim();
        if let Some(pct) = s.strip_suffix('%') {
            if let Ok(f) = pct.trim().parse::<f64>() {
                return Value::Float(f);
            }
        }
        if s.eq_ignore_ascii_case("true") {
            return Value::Bool(true);
        }
        if s.eq_ignore_ascii_case("false") {
            return Value::Bool(false);
        }
        if s.contains('.') {
            if let Ok(f) = s.parse::<f64>() {
                return Value::Float(f);
            }
        } else if let Ok(i) = s.parse::<i64>() {
            return Value::Int(i);
        }
        Value::Str(unquote(s).to_string())
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Value::Bool(_) => "bool",
            Value::Int(_) => "int",
            Value::Float(_) => "float",
            Value::Str(_) => "string",
        }
    }

    /// Numeric view: ints, floats and bools (as 0/1).
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
            Value::Int(i) => Some(*i as f64),
            Value::Float(f) => Some(*f),
            Value::Str(_) => None,
        }
    }

    pub fn truthy(&self) -> bool {
        match self {
            Value::Bool(b) => *b,
            Value::Int(i) => *i != 0,
            Value::Float(f) => *f != 0.0,
            Value::Str(s) => !s.is_empty(),
        }
    }

    fn partial_cmp_value(&self, other: &Value) -> Option<Ordering> {
        match (self, other) {
            (Value::Int(a), Value::Int(b)) => Some(a.cmp(b)),
            (Value::Str(a), Value::Str(b)) => Some(a.cmp(b)),
            (a, b) => match (a.as_f64(), b.as_f64()) {
                (Some(x), Some(y)) => x.partial_cmp(&y),
                _ => None,
            },
        }
    }
}

fn unquote(s: &str) -> &str {
    for q in ['"', '\''] {
        if s.len() >= 2 && s.starts_with(q) && s.ends_with(q) {
            return &s[1..s.len() - 1];
        }
    }
    s
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Bool(b) => write!(f, "{b}"),
            Value::Int(i) => write!(f, "{i}"),
            Value::Float(x) => write!(f, "{x}"),
            Value::Str(s) => f.write_str(s),
        }
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Value::Int(i)
    }
}

impl From<f64> for Value {
    fn from(f: f64) -> Self {
        Value::Float(f)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Str(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Str(s)
    }
}

// ---------------------------------------------------------------------------
// EvalError
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Error)]
pub enum EvalError {
    #[error("cannot apply '{op}' to {lhs} and {rhs}")]
    TypeMismatch {
        op: &'static str,
        lhs: &'static str,
        rhs: &'static str,
    },

    #[error("division by zero")]
    DivisionByZero,

    #[error("malformed condition: {0}")]
    Malformed(String),
}

// ---------------------------------------------------------------------------
// CmpOp
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CmpOp {
    Ge,
    Le,
    Eq,
    Ne,
    Gt,
    Lt,
}

impl CmpOp {
    /// Operators in the order conditions are scanned: two-character
    /// operators first so `>=` is never read as `>`.
    pub fn scan_order() -> &'static [CmpOp] {
        &[CmpOp::Ge, CmpOp::Le, CmpOp::Eq, CmpOp::Ne, CmpOp::Gt, CmpOp::Lt]
    }

    pub fn symbol(self) -> &'static str {
        match self {
            CmpOp::Ge => ">=",
            CmpOp::Le => "<=",
            CmpOp::Eq => "==",
            CmpOp::Ne => "!=",
            CmpOp::Gt => ">",
            CmpOp::Lt => "<",
        }
    }

    /// Compare two values. Equality across unrelated kinds is simply
    /// unequal; ordering across them is an error.
    pub fn apply(self, lhs: &Value, rhs: &Value) -> Result<bool, EvalError> {
        let ord = lhs.partial_cmp_value(rhs);
        match self {
            CmpOp::Eq => Ok(ord == Some(Ordering::Equal)),
            CmpOp::Ne => Ok(ord != Some(Ordering::Equal)),
            CmpOp::Ge | CmpOp::Le | CmpOp::Gt | CmpOp::Lt => {
                let ord = ord.ok_or(EvalError::TypeMismatch {
                    op: self.symbol(),
                    lhs: lhs.kind(),
                    rhs: rhs.kind(),
                })?;
                Ok(match self {
                    CmpOp::Ge => ord != Ordering::Less,
                    CmpOp::Le => ord != Ordering::Greater,
                    CmpOp::Gt => ord == Ordering::Greater,
                    _ => ord == Ordering::Less,
                })
            }
        }
    }
}

impl fmt::Display for CmpOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.symbol())
    }
}

// ---------------------------------------------------------------------------
// Context
// ---------------------------------------------------------------------------

/// Metric values a rule is evaluated against.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Context {
    values: BTreeMap<String, Value>,
}

impl Context {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.insert(key, value);
        self
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        self.values.insert(key.into(), value.into());
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.values.get(key)
    }

    /// Attribute lookup used by comparisons: missing keys read as `0`.
    pub fn lookup(&self, key: &str) -> Value {
        self.values.get(key).cloned().unwrap_or(Value::Int(0))
    }

    /// Overlay `other` on top of `self`; keys in `other` win.
    pub fn merge(&mut self, other: Context) {
        self.values.extend(other.values);
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.values.iter()
    }
}

impl From<BTreeMap<String, Value>> for Context {
    fn from(values: BTreeMap<String, Value>) -> Self {
        Self { values }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_literal_kinds() {
        assert_eq!(Value::parse_literal("80"), Value::Int(80));
        assert_eq!(Value::parse_literal(" 7.5 "), Value::Float(7.5));
        assert_eq!(Value::parse_literal("80%"), Value::Float(80.0));
        assert_eq!(Value::parse_literal("TRUE"), Value::Bool(true));
        assert_eq!(Value::parse_literal("False"), Value::Bool(false));
        assert_eq!(Value::parse_literal("\"main\""), Value::Str("main".into()));
        assert_eq!(Value::parse_literal("v1.2"), Value::Str("v1.2".into()));
        assert_eq!(Value::parse_literal("1e3"), Value::Str("1e3".into()));
    }

    #[test]
    fn numeric_kinds_compare_together() {
        assert!(CmpOp::Ge.apply(&Value::Int(85), &Value::Float(80.0)).unwrap());
        assert!(CmpOp::Eq.apply(&Value::Float(3.0), &Value::Int(3)).unwrap());
        assert!(CmpOp::Eq.apply(&Value::Bool(true), &Value::Int(1)).unwrap());
        assert!(!CmpOp::Lt.apply(&Value::Int(5), &Value::Int(5)).unwrap());
        assert!(CmpOp::Le.apply(&Value::Int(5), &Value::Int(5)).unwrap());
    }

    #[test]
    fn strings_compare_lexically() {
        let a = Value::from("alpha");
        let b = Value::from("beta");
        assert!(CmpOp::Lt.apply(&a, &b).unwrap());
        assert!(CmpOp::Ne.apply(&a, &b).unwrap());
    }

    #[test]
    fn mixed_kinds_equality_is_false_ordering_errors() {
        let n = Value::Int(3);
        let s = Value::from("3");
        assert!(!CmpOp::Eq.apply(&n, &s).unwrap());
        assert!(CmpOp::Ne.apply(&n, &s).unwrap());
        let err = CmpOp::Gt.apply(&n, &s).unwrap_err();
        assert!(matches!(err, EvalError::TypeMismatch { op: ">", .. }));
    }

    #[test]
    fn context_lookup_defaults_to_zero() {
        let ctx = Context::new().with("coverage", 85i64);
        assert_eq!(ctx.lookup("coverage"), Value::Int(85));
        assert_eq!(ctx.lookup("missing"), Value::Int(0));
        assert!(ctx.get("missing").is_none());
    }

    #[test]
    fn context_yaml_is_plain_map() {
        let ctx: Context =
            serde_yaml::from_str("coverage: 85\nlint_score: 9.5\nhas_readme: true\nbranch: main\n")
                .unwrap();
        assert_eq!(ctx.get("coverage"), Some(&Value::Int(85)));
        assert_eq!(ctx.get("lint_score"), Some(&Value::Float(9.5)));
        assert_eq!(ctx.get("has_readme"), Some(&Value::Bool(true)));
        assert_eq!(ctx.get("branch"), Some(&Value::Str("main".into())));
    }

    #[test]
    fn merge_overrides() {
        let mut base = Context::new().with("a", 1i64).with("b", 2i64);
        base.merge(Context::new().with("b", 3i64));
        assert_eq!(base.lookup("a"), Value::Int(1));
        assert_eq!(base.lookup("b"), Value::Int(3));
    }
}
