//! Response condition expressions.
//!
//! Conditions are written in a small closed grammar and compiled once into an
//! expression tree, then evaluated against each request:
//!
//! ```text
//! query.page > 1 && headers.x-tier == "gold"
//! not (body.user.role == 'admin' or method == "DELETE")
//! path startsWith "/v2" and body.email matches "^[a-z]+@example\.com$"
//! ```
//!
//! Fields resolve through [`RequestContext::lookup`]; a `request.` prefix is
//! optional. Missing fields evaluate to `null`.

mod lexer;
mod parser;

use crate::request::RequestContext;
use regex::Regex;
use std::fmt;

/// Comparison operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompareOp {
    Eq,
    Ne,
    Gt,
    Ge,
    Lt,
    Le,
    Contains,
    StartsWith,
    EndsWith,
    Matches,
}

/// Literal operand.
#[derive(Debug, Clone, PartialEq)]
pub enum Literal {
    Str(String),
    Num(f64),
    Bool(bool),
    Null,
}

/// Compiled expression tree.
#[derive(Debug, Clone)]
pub enum Expr {
    Literal(Literal),
    Field(String),
    Not(Box<Expr>),
    And(Vec<Expr>),
    Or(Vec<Expr>),
    Compare {
        op: CompareOp,
        left: Box<Expr>,
        right: Box<Expr>,
    },
    Matches {
        subject: Box<Expr>,
        regex: Regex,
    },
}

/// Error raised while compiling a condition.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("condition error at offset {position}: {message}")]
pub struct ConditionError {
    pub position: usize,
    pub message: String,
}

impl ConditionError {
    pub(crate) fn new(position: usize, message: impl Into<String>) -> Self {
        Self {
            position,
            message: message.into(),
        }
    }
}

/// A condition compiled from source text.
#[derive(Debug, Clone)]
pub struct CompiledCondition {
    source: String,
    expr: Expr,
}

impl CompiledCondition {
    pub fn compile(source: &str) -> Result<Self, ConditionError> {
        let tokens = lexer::tokenize(source)?;
        let expr = parser::Parser::new(tokens).parse()?;
        Ok(Self {
            source: source.to_string(),
            expr,
        })
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn expr(&self) -> &Expr {
        &self.expr
    }

    pub fn evaluate(&self, ctx: &RequestContext) -> bool {
        eval(&self.expr, ctx).truthy()
    }
}

impl fmt::Display for CompiledCondition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.source)
    }
}

/// Runtime value produced while evaluating.
#[derive(Debug, Clone, PartialEq)]
enum Value {
    Str(String),
    Num(f64),
    Bool(bool),
    Null,
}

impl Value {
    fn truthy(&self) -> bool {
        match self {
            Value::Null => false,
            Value::Bool(b) => *b,
            Value::Num(n) => *n != 0.0,
            Value::Str(s) => {
                let s = s.trim();
                !(s.is_empty() || s.eq_ignore_ascii_case("false") || s == "0")
            }
        }
    }

    fn as_number(&self) -> Option<f64> {
        match self {
            Value::Num(n) => Some(*n),
            Value::Str(s) => s.trim().parse::<f64>().ok().filter(|n| n.is_finite()),
            _ => None,
        }
    }

    fn as_text(&self) -> String {
        match self {
            Value::Str(s) => s.clone(),
            Value::Num(n) => format_number(*n),
            Value::Bool(b) => b.to_string(),
            Value::Null => String::new(),
        }
    }
}

fn format_number(n: f64) -> String {
    if n.fract() == 0.0 && n.abs() < 1e15 {
        format!("{}", n as i64)
    } else {
        n.to_string()
    }
}

fn eval(expr: &Expr, ctx: &RequestContext) -> Value {
    match expr {
        Expr::Literal(Literal::Str(s)) => Value::Str(s.clone()),
        Expr::Literal(Literal::Num(n)) => Value::Num(*n),
        Expr::Literal(Literal::Bool(b)) => Value::Bool(*b),
        Expr::Literal(Literal::Null) => Value::Null,
        Expr::Field(name) => ctx.lookup(name).map(Value::Str).unwrap_or(Value::Null),
        Expr::Not(inner) => Value::Bool(!eval(inner, ctx).truthy()),
        Expr::And(branches) => Value::Bool(branches.iter().all(|b| eval(b, ctx).truthy())),
        Expr::Or(branches) => Value::Bool(branches.iter().any(|b| eval(b, ctx).truthy())),
        Expr::Matches { subject, regex } => match eval(subject, ctx) {
            Value::Null => Value::Bool(false),
            value => Value::Bool(regex.is_match(&value.as_text())),
        },
        Expr::Compare { op, left, right } => {
            Value::Bool(compare(*op, &eval(left, ctx), &eval(right, ctx)))
        }
    }
}

fn compare(op: CompareOp, left: &Value, right: &Value) -> bool {
    if left == &Value::Null || right == &Value::Null {
        return match op {
            CompareOp::Eq => left == right,
            CompareOp::Ne => left != right,
            _ => false,
        };
    }

    if let (Value::Bool(_), _) | (_, Value::Bool(_)) = (left, right) {
        let (l, r) = (left.truthy(), right.truthy());
        return match op {
            CompareOp::Eq => l == r,
            CompareOp::Ne => l != r,
            _ => compare_text(op, &left.as_text(), &right.as_text()),
        };
    }

    if let (Some(l), Some(r)) = (left.as_number(), right.as_number()) {
        return match op {
            CompareOp::Eq => l == r,
            CompareOp::Ne => l != r,
            CompareOp::Gt => l > r,
            CompareOp::Ge => l >= r,
            CompareOp::Lt => l < r,
            CompareOp::Le => l <= r,
            _ => compare_text(op, &left.as_text(), &right.as_text()),
        };
    }

    compare_text(op, &left.as_text(), &right.as_text())
}

fn compare_text(op: CompareOp, l: &str, r: &str) -> bool {
    match op {
        CompareOp::Eq => l == r,
        CompareOp::Ne => l != r,
        CompareOp::Gt => l > r,
        CompareOp::Ge => l >= r,
        CompareOp::Lt => l < r,
        CompareOp::Le => l <= r,
        CompareOp::Contains => l.contains(r),
        CompareOp::StartsWith => l.starts_with(r),
        CompareOp::EndsWith => l.ends_with(r),
        // Compiled into Expr::Matches by the parser.
        CompareOp::Matches => false,
    }
}
