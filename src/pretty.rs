//! Canonical single-line rendering of the AST
//!
//! `parse(pretty(expr))` reproduces the same structure for any
//! parser-produced expression; the property tests lean on this. Children
//! that would re-associate are parenthesized conservatively.

use std::fmt::{self, Display};

use crate::ast::{BinOp, Expr, ExprKind, Literal, UnaryOp};
use crate::value::number_to_string;

/// Render an expression as canonical source text.
pub fn pretty(expr: &Expr) -> String {
    expr.to_string()
}

impl Display for Literal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Literal::String(s) => write!(f, "\"{}\"", escape_string(s)),
            Literal::Number(n) => write!(f, "{}", number_to_string(*n)),
            Literal::Bool(b) => write!(f, "{}", if *b { "true" } else { "false" }),
            Literal::Null => write!(f, "null"),
        }
    }
}

impl Display for BinOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            BinOp::Add => "+",
            BinOp::Sub => "-",
            BinOp::Mul => "*",
            BinOp::Div => "/",
            BinOp::Mod => "%",
            BinOp::Eq => "==",
            BinOp::Ne => "!=",
            BinOp::Lt => "<",
            BinOp::Le => "<=",
            BinOp::Gt => ">",
            BinOp::Ge => ">=",
            BinOp::And => "&&",
            BinOp::Or => "||",
        };
        write!(f, "{}", s)
    }
}

impl Display for UnaryOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            UnaryOp::Not => "!",
            UnaryOp::Pos => "+",
            UnaryOp::Neg => "-",
        };
        write!(f, "{}", s)
    }
}

impl Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.kind {
            ExprKind::Literal(lit) => write!(f, "{}", lit),
            ExprKind::Ident(name) => write!(f, "{}", name),
            ExprKind::Array(elements) => {
                write!(f, "[")?;
                for (i, element) in elements.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", element)?;
                }
                write!(f, "]")
            }
            ExprKind::Member(base, property) => {
                if needs_parens_as_base(base) {
                    write!(f, "({}).{}", base, property)
                } else {
                    write!(f, "{}.{}", base, property)
                }
            }
            ExprKind::Call(callee, args) => {
                if needs_parens_as_base(callee) {
                    write!(f, "({})(", callee)?;
                } else {
                    write!(f, "{}(", callee)?;
                }
                for (i, arg) in args.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", arg)?;
                }
                write!(f, ")")
            }
            ExprKind::Binary(lhs, op, rhs) => {
                if needs_parens_as_operand(lhs) {
                    write!(f, "({})", lhs)?;
                } else {
                    write!(f, "{}", lhs)?;
                }
                write!(f, " {} ", op)?;
                if needs_parens_as_operand(rhs) {
                    write!(f, "({})", rhs)
                } else {
                    write!(f, "{}", rhs)
                }
            }
            ExprKind::Unary(op, operand) => {
                if needs_parens_as_operand(operand) {
                    write!(f, "{}({})", op, operand)
                } else {
                    write!(f, "{}{}", op, operand)
                }
            }
            ExprKind::Conditional {
                test,
                consequent,
                alternate,
            } => {
                if matches!(test.kind, ExprKind::Conditional { .. }) {
                    write!(f, "({})", test)?;
                } else {
                    write!(f, "{}", test)?;
                }
                write!(f, " ? {} : {}", consequent, alternate)
            }
        }
    }
}

/// Operands of binary/unary operators re-associate without parens.
fn needs_parens_as_operand(expr: &Expr) -> bool {
    matches!(
        expr.kind,
        ExprKind::Binary(..) | ExprKind::Conditional { .. }
    )
}

/// Receivers of `.` and `(` additionally cover number literals, where a
/// following `.` would be read into the literal.
fn needs_parens_as_base(expr: &Expr) -> bool {
    matches!(
        expr.kind,
        ExprKind::Binary(..)
            | ExprKind::Unary(..)
            | ExprKind::Conditional { .. }
            | ExprKind::Literal(Literal::Number(_))
    )
}

fn escape_string(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            '\u{2028}' => out.push_str("\\u{2028}"),
            '\u{2029}' => out.push_str("\\u{2029}"),
            c if (c as u32) < 0x20 => out.push_str(&format!("\\x{:02x}", c as u32)),
            c => out.push(c),
        }
    }
    out
}

// ============ Sanity Tests ============
