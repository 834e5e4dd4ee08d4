//! evex — a safe, embeddable expression language
//!
//! A single-expression language with a recursive-descent parser and a
//! budgeted tree-walking evaluator. Expressions run against a
//! host-provided environment under a conservative safe-access policy: no
//! dynamic code, no prototype walking, no hidden host calls during
//! equality, and hard step/depth/size budgets.
//!
//! ## Quick Start
//!
//! ```ignore
//! use evex::{evaluate, EvalOptions, HostFn, Value};
//!
//! let env = Value::object([
//!     ("user", Value::object([("plan", Value::from("free"))])),
//!     ("inc", Value::from(HostFn::new(|args| match args {
//!         [Value::Number(n)] => Ok(Value::Number(n + 1.0)),
//!         _ => Err("inc expects one number".to_string()),
//!     }))),
//! ]);
//!
//! let value = evaluate("user.plan == 'free' ? 41 |> inc : 0", &env, &EvalOptions::default())?;
//! assert_eq!(value, Value::Number(42.0));
//! ```
//!
//! ## Language
//!
//! - Literals: numbers (IEEE-754 doubles), single/double-quoted strings
//!   with ECMAScript-style escapes, `true`, `false`, `null`, arrays.
//! - Operators: `?:`, `|>`, `||`, `&&`, `==` `!=`, `<` `<=` `>` `>=`,
//!   `+` `-`, `*` `/` `%`, unary `!` `+` `-`, member access, calls.
//! - `a |> f(x)` is sugar for `f(a, x)`, desugared at parse time.
//! - The reserved identifier `std` exposes the standard library and
//!   cannot be supplied by the environment.

mod ast;
mod eval;
mod parse;
mod pretty;
mod stdlib;
mod strings;
mod value;

use thiserror::Error;

// ============ Primary Public API ============

pub use ast::{BinOp, Expr, ExprKind, Literal, Span, UnaryOp};
pub use eval::{EvalError, EvalErrorKind, EvalOptions, UnknownIdentifiers, evaluate_ast};
pub use parse::{ParseError, parse};
pub use pretty::pretty;
pub use value::{HostFn, HostResult, Value};

#[derive(Error, Debug)]
pub enum EvexError {
    #[error("parse error: {0}")]
    Parse(#[from] ParseError),
    #[error("eval error: {0}")]
    Eval(#[from] EvalError),
}

impl EvexError {
    /// Byte index of the failure, present when the cause is a parse error.
    pub fn index(&self) -> Option<usize> {
        match self {
            EvexError::Parse(e) => Some(e.index),
            EvexError::Eval(_) => None,
        }
    }

    /// Span of the responsible node, present for most evaluation errors.
    pub fn span(&self) -> Option<Span> {
        match self {
            EvexError::Parse(_) => None,
            EvexError::Eval(e) => e.span,
        }
    }
}

/// Parse and evaluate in one step.
pub fn evaluate(input: &str, env: &Value, opts: &EvalOptions) -> Result<Value, EvexError> {
    let expr = parse(input)?;
    let value = evaluate_ast(&expr, env, opts)?;
    Ok(value)
}
