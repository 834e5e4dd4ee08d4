//! Tree-walking evaluator
//!
//! Executes an `Expr` against a host-supplied environment under hard
//! resource budgets. Evaluation is synchronous, deterministic, and never
//! reaches a host dynamic-code facility: member access is restricted to
//! own data members, equality never invokes host code, and every visit
//! charges the step budget.

use indexmap::IndexMap;
use thiserror::Error;

use crate::ast::{BinOp, Expr, ExprKind, Literal, Span, UnaryOp};
use crate::stdlib;
use crate::value::{Value, number_to_string};

/// Member names that are never readable, on any value.
const FORBIDDEN_MEMBERS: [&str; 3] = ["__proto__", "prototype", "constructor"];

/// What an identifier lookup miss means.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum UnknownIdentifiers {
    /// Fail with `UnknownIdentifier` (the default).
    #[default]
    Error,
    /// Produce `Undefined`.
    Undefined,
}

#[derive(Debug, Clone, PartialEq)]
pub struct EvalOptions {
    /// Every node visit charges one step.
    pub max_steps: u64,
    /// Maximum depth of nested node visits.
    pub max_depth: usize,
    /// Array literals larger than this abort before evaluating elements.
    pub max_array_elements: usize,
    pub unknown_identifiers: UnknownIdentifiers,
}

impl Default for EvalOptions {
    fn default() -> Self {
        Self {
            max_steps: 10_000,
            max_depth: 256,
            max_array_elements: 1_000,
            unknown_identifiers: UnknownIdentifiers::Error,
        }
    }
}

impl EvalOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_max_steps(mut self, max_steps: u64) -> Self {
        self.max_steps = max_steps;
        self
    }

    pub fn with_max_depth(mut self, max_depth: usize) -> Self {
        self.max_depth = max_depth;
        self
    }

    pub fn with_max_array_elements(mut self, max_array_elements: usize) -> Self {
        self.max_array_elements = max_array_elements;
        self
    }

    pub fn with_unknown_identifiers(mut self, policy: UnknownIdentifiers) -> Self {
        self.unknown_identifiers = policy;
        self
    }
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum EvalErrorKind {
    #[error("invalid environment: {0}")]
    EnvInvalid(String),

    #[error("unknown identifier: {0}")]
    UnknownIdentifier(String),

    #[error("forbidden member: {0}")]
    ForbiddenMember(String),

    #[error("expected a primitive value, got {0}")]
    ExpectedPrimitive(&'static str),

    #[error("not callable: {0}")]
    NotCallable(String),

    #[error("host function error: {0}")]
    HostError(String),

    #[error("array literal has {len} elements, limit is {max}")]
    ArrayTooLarge { len: usize, max: usize },

    #[error("evaluation budget exceeded (max {0} steps)")]
    BudgetExceeded(u64),

    #[error("recursion depth limit exceeded (max {0})")]
    RecursionLimit(usize),
}

/// Evaluation failure: a taxonomy tag plus the nearest responsible span
/// and the step counter at failure. Environment validation errors carry
/// no span (no node is responsible).
#[derive(Error, Debug, Clone, PartialEq)]
#[error("{kind}")]
pub struct EvalError {
    pub kind: EvalErrorKind,
    pub span: Option<Span>,
    pub steps: u64,
}

type Result<T> = std::result::Result<T, EvalError>;

/// Mutable evaluation state threaded through the visit.
struct Cx<'a> {
    env: &'a IndexMap<String, Value>,
    opts: &'a EvalOptions,
    steps: u64,
    depth: usize,
}

impl Cx<'_> {
    fn enter(&mut self, span: Span) -> Result<()> {
        self.steps += 1;
        if self.steps > self.opts.max_steps {
            return Err(self.err(EvalErrorKind::BudgetExceeded(self.opts.max_steps), span));
        }
        self.depth += 1;
        if self.depth > self.opts.max_depth {
            return Err(self.err(EvalErrorKind::RecursionLimit(self.opts.max_depth), span));
        }
        Ok(())
    }

    fn leave(&mut self) {
        self.depth -= 1;
    }

    fn err(&self, kind: EvalErrorKind, span: Span) -> EvalError {
        EvalError {
            kind,
            span: Some(span),
            steps: self.steps,
        }
    }

    fn number_of(&self, value: &Value, span: Span) -> Result<f64> {
        to_number(value).map_err(|got| self.err(EvalErrorKind::ExpectedPrimitive(got), span))
    }

    fn string_of(&self, value: &Value, span: Span) -> Result<String> {
        to_display_string(value)
            .map_err(|got| self.err(EvalErrorKind::ExpectedPrimitive(got), span))
    }
}

/// Evaluate an already-parsed expression against `env`.
///
/// The environment must be an object and must not define the reserved
/// name `std`; it is borrowed read-only for the duration of the call and
/// never mutated. The AST may be shared across concurrent evaluations.
pub fn evaluate_ast(expr: &Expr, env: &Value, opts: &EvalOptions) -> Result<Value> {
    let env = validate_env(env)?;
    log::trace!("evaluating with budget of {} steps", opts.max_steps);
    let mut cx = Cx {
        env,
        opts,
        steps: 0,
        depth: 0,
    };
    eval_expr(expr, &mut cx)
}

fn validate_env(env: &Value) -> Result<&IndexMap<String, Value>> {
    let invalid = |reason: String| EvalError {
        kind: EvalErrorKind::EnvInvalid(reason),
        span: None,
        steps: 0,
    };
    let Value::Object(members) = env else {
        return Err(invalid(format!(
            "environment must be an object, got {}",
            env.type_name()
        )));
    };
    if members.contains_key(stdlib::STD_NAME) {
        return Err(invalid(format!(
            "environment must not define the reserved name `{}`",
            stdlib::STD_NAME
        )));
    }
    Ok(members)
}

fn eval_expr(expr: &Expr, cx: &mut Cx<'_>) -> Result<Value> {
    cx.enter(expr.span)?;
    let value = match &expr.kind {
        ExprKind::Literal(lit) => Ok(literal_value(lit)),
        ExprKind::Ident(name) => eval_ident(name, expr.span, cx),
        ExprKind::Array(elements) => eval_array(elements, expr.span, cx),
        ExprKind::Unary(op, operand) => eval_unary(*op, operand, expr.span, cx),
        ExprKind::Binary(lhs, op, rhs) => eval_binary(lhs, *op, rhs, expr.span, cx),
        ExprKind::Member(object, property) => eval_member(object, property, expr.span, cx),
        ExprKind::Call(callee, args) => eval_call(callee, args, expr.span, cx),
        ExprKind::Conditional {
            test,
            consequent,
            alternate,
        } => eval_conditional(test, consequent, alternate, cx),
    };
    cx.leave();
    value
}

fn literal_value(lit: &Literal) -> Value {
    match lit {
        Literal::String(s) => Value::String(s.clone()),
        Literal::Number(n) => Value::Number(*n),
        Literal::Bool(b) => Value::Bool(*b),
        Literal::Null => Value::Null,
    }
}

/// Two-layer scope: the immutable `std` binding, then the environment's
/// own members. Misses follow the configured policy.
fn eval_ident(name: &str, span: Span, cx: &mut Cx<'_>) -> Result<Value> {
    if name == stdlib::STD_NAME {
        return Ok(stdlib::std_object());
    }
    if let Some(value) = cx.env.get(name) {
        return Ok(value.clone());
    }
    match cx.opts.unknown_identifiers {
        UnknownIdentifiers::Error => Err(cx.err(
            EvalErrorKind::UnknownIdentifier(name.to_string()),
            span,
        )),
        UnknownIdentifiers::Undefined => Ok(Value::Undefined),
    }
}

fn eval_array(elements: &[Expr], span: Span, cx: &mut Cx<'_>) -> Result<Value> {
    if elements.len() > cx.opts.max_array_elements {
        return Err(cx.err(
            EvalErrorKind::ArrayTooLarge {
                len: elements.len(),
                max: cx.opts.max_array_elements,
            },
            span,
        ));
    }
    let mut items = Vec::with_capacity(elements.len());
    for element in elements {
        items.push(eval_expr(element, cx)?);
    }
    Ok(Value::array(items))
}

fn eval_unary(op: UnaryOp, operand: &Expr, span: Span, cx: &mut Cx<'_>) -> Result<Value> {
    let value = eval_expr(operand, cx)?;
    match op {
        UnaryOp::Not => Ok(Value::Bool(!value.truthy())),
        UnaryOp::Pos => Ok(Value::Number(cx.number_of(&value, span)?)),
        UnaryOp::Neg => Ok(Value::Number(-cx.number_of(&value, span)?)),
    }
}

fn eval_binary(lhs: &Expr, op: BinOp, rhs: &Expr, span: Span, cx: &mut Cx<'_>) -> Result<Value> {
    // Short-circuit operators never evaluate (or surface errors from)
    // the right operand when the left decides.
    match op {
        BinOp::And => {
            let left = eval_expr(lhs, cx)?;
            return if left.truthy() {
                eval_expr(rhs, cx)
            } else {
                Ok(left)
            };
        }
        BinOp::Or => {
            let left = eval_expr(lhs, cx)?;
            return if left.truthy() {
                Ok(left)
            } else {
                eval_expr(rhs, cx)
            };
        }
        _ => {}
    }

    let left = eval_expr(lhs, cx)?;
    let right = eval_expr(rhs, cx)?;
    match op {
        // `+` concatenates as soon as either side is a string.
        BinOp::Add => {
            if matches!(left, Value::String(_)) || matches!(right, Value::String(_)) {
                let mut s = cx.string_of(&left, span)?;
                s.push_str(&cx.string_of(&right, span)?);
                Ok(Value::String(s))
            } else {
                Ok(Value::Number(
                    cx.number_of(&left, span)? + cx.number_of(&right, span)?,
                ))
            }
        }
        BinOp::Sub => Ok(Value::Number(
            cx.number_of(&left, span)? - cx.number_of(&right, span)?,
        )),
        BinOp::Mul => Ok(Value::Number(
            cx.number_of(&left, span)? * cx.number_of(&right, span)?,
        )),
        // IEEE-754: division by zero yields an infinity or NaN.
        BinOp::Div => Ok(Value::Number(
            cx.number_of(&left, span)? / cx.number_of(&right, span)?,
        )),
        BinOp::Mod => Ok(Value::Number(
            cx.number_of(&left, span)? % cx.number_of(&right, span)?,
        )),
        BinOp::Lt => Ok(Value::Bool(
            cx.number_of(&left, span)? < cx.number_of(&right, span)?,
        )),
        BinOp::Le => Ok(Value::Bool(
            cx.number_of(&left, span)? <= cx.number_of(&right, span)?,
        )),
        BinOp::Gt => Ok(Value::Bool(
            cx.number_of(&left, span)? > cx.number_of(&right, span)?,
        )),
        BinOp::Ge => Ok(Value::Bool(
            cx.number_of(&left, span)? >= cx.number_of(&right, span)?,
        )),
        BinOp::Eq => Ok(Value::Bool(loose_eq(&left, &right))),
        BinOp::Ne => Ok(Value::Bool(!loose_eq(&left, &right))),
        BinOp::And | BinOp::Or => unreachable!("short-circuit forms returned above"),
    }
}

fn eval_conditional(
    test: &Expr,
    consequent: &Expr,
    alternate: &Expr,
    cx: &mut Cx<'_>,
) -> Result<Value> {
    let condition = eval_expr(test, cx)?;
    if condition.truthy() {
        eval_expr(consequent, cx)
    } else {
        eval_expr(alternate, cx)
    }
}

fn eval_member(object_expr: &Expr, property: &str, span: Span, cx: &mut Cx<'_>) -> Result<Value> {
    let object = eval_expr(object_expr, cx)?;
    member_value(&object, property, span, cx)
}

/// The safe-access policy: forbidden names always fail; arrays expose
/// only `length`; objects expose own members; everything else reads as
/// `Undefined`.
fn member_value(object: &Value, property: &str, span: Span, cx: &Cx<'_>) -> Result<Value> {
    if FORBIDDEN_MEMBERS.contains(&property) {
        return Err(cx.err(
            EvalErrorKind::ForbiddenMember(property.to_string()),
            span,
        ));
    }
    match object {
        Value::Array(items) if property == "length" => Ok(Value::Number(items.len() as f64)),
        Value::Object(members) => Ok(members.get(property).cloned().unwrap_or(Value::Undefined)),
        _ => Ok(Value::Undefined),
    }
}

fn eval_call(callee: &Expr, args: &[Expr], span: Span, cx: &mut Cx<'_>) -> Result<Value> {
    // Member call: `obj.m(...)` resolves `m` under the member-access
    // policy and invokes with `obj` as the bound receiver.
    if let ExprKind::Member(object_expr, property) = &callee.kind {
        let object = eval_expr(object_expr, cx)?;
        let member = member_value(&object, property, callee.span, cx)?;
        let Value::Function(function) = member else {
            return Err(cx.err(
                EvalErrorKind::NotCallable(format!(
                    "member `{property}` is {}",
                    member.type_name()
                )),
                callee.span,
            ));
        };
        let args = eval_args(args, cx)?;
        return function
            .call(Some(&object), &args)
            .map_err(|message| cx.err(EvalErrorKind::HostError(message), span));
    }

    let callee_value = eval_expr(callee, cx)?;
    let Value::Function(function) = callee_value else {
        return Err(cx.err(
            EvalErrorKind::NotCallable(callee_value.type_name().to_string()),
            callee.span,
        ));
    };
    let args = eval_args(args, cx)?;
    function
        .call(None, &args)
        .map_err(|message| cx.err(EvalErrorKind::HostError(message), span))
}

fn eval_args(args: &[Expr], cx: &mut Cx<'_>) -> Result<Vec<Value>> {
    let mut values = Vec::with_capacity(args.len());
    for arg in args {
        values.push(eval_expr(arg, cx)?);
    }
    Ok(values)
}

// ============ Coercions ============

/// ToNumber. Strings parse as trimmed decimal (empty means zero, failure
/// means NaN); non-primitives are an error, reported as their type name.
pub(crate) fn to_number(value: &Value) -> std::result::Result<f64, &'static str> {
    match value {
        Value::Number(n) => Ok(*n),
        Value::Bool(true) => Ok(1.0),
        Value::Bool(false) => Ok(0.0),
        Value::Null => Ok(0.0),
        Value::Undefined => Ok(f64::NAN),
        Value::String(s) => Ok(parse_number(s)),
        other => Err(other.type_name()),
    }
}

fn parse_number(s: &str) -> f64 {
    let trimmed = s.trim();
    if trimmed.is_empty() {
        return 0.0;
    }
    trimmed.parse::<f64>().unwrap_or(f64::NAN)
}

/// ToString for primitives; non-primitives are an error.
pub(crate) fn to_display_string(value: &Value) -> std::result::Result<String, &'static str> {
    match value {
        Value::String(s) => Ok(s.clone()),
        Value::Number(n) => Ok(number_to_string(*n)),
        Value::Bool(b) => Ok(b.to_string()),
        Value::Null => Ok("null".to_string()),
        Value::Undefined => Ok("undefined".to_string()),
        other => Err(other.type_name()),
    }
}

/// Safe loose equality. Primitive pairs follow conventional loose
/// equality (`null == undefined`, booleans and numeric strings coerce to
/// numbers). If either side is non-primitive the comparison is reference
/// identity only: no conversion is attempted and no host code runs.
pub(crate) fn loose_eq(left: &Value, right: &Value) -> bool {
    match (left, right) {
        (Value::Undefined | Value::Null, Value::Undefined | Value::Null) => true,
        (Value::Number(a), Value::Number(b)) => a == b,
        (Value::String(a), Value::String(b)) => a == b,
        (Value::Bool(a), _) => loose_eq(&Value::Number(if *a { 1.0 } else { 0.0 }), right),
        (_, Value::Bool(b)) => loose_eq(left, &Value::Number(if *b { 1.0 } else { 0.0 })),
        (Value::Number(a), Value::String(s)) => *a == parse_number(s),
        (Value::String(s), Value::Number(b)) => parse_number(s) == *b,
        _ => left.ref_eq(right),
    }
}

// ============ Sanity Tests ============
// Most testing is done via integration tests in tests/integration.rs

#[cfg(test)]
mod tests {
    use super::*;

    fn empty_env() -> Value {
        let no_members: [(&str, Value); 0] = [];
        Value::object(no_members)
    }

    fn eval(expr: &Expr) -> Result<Value> {
        evaluate_ast(expr, &empty_env(), &EvalOptions::default())
    }

    #[test]
    fn synthesized_ast_evaluates() {
        let expr = Expr::number(40.0).binop(BinOp::Add, Expr::number(2.0));
        assert_eq!(eval(&expr).unwrap(), Value::Number(42.0));
    }

    #[test]
    fn env_must_be_an_object() {
        let expr = Expr::number(1.0);
        let err = evaluate_ast(&expr, &Value::Null, &EvalOptions::default()).unwrap_err();
        assert!(matches!(err.kind, EvalErrorKind::EnvInvalid(_)));
        assert_eq!(err.span, None);
    }

    #[test]
    fn env_must_not_shadow_std() {
        let expr = Expr::number(1.0);
        let env = Value::object([("std", Value::Null)]);
        let err = evaluate_ast(&expr, &env, &EvalOptions::default()).unwrap_err();
        assert!(matches!(err.kind, EvalErrorKind::EnvInvalid(ref r) if r.contains("std")));
    }

    #[test]
    fn ident_policy() {
        let expr = Expr::ident("missing");
        let err = eval(&expr).unwrap_err();
        assert!(matches!(err.kind, EvalErrorKind::UnknownIdentifier(_)));

        let opts = EvalOptions::default().with_unknown_identifiers(UnknownIdentifiers::Undefined);
        let value = evaluate_ast(&expr, &empty_env(), &opts).unwrap();
        assert_eq!(value, Value::Undefined);
    }

    #[test]
    fn std_binding_resolves() {
        let expr = Expr::ident("std").member("len");
        assert!(matches!(eval(&expr).unwrap(), Value::Function(_)));
    }

    #[test]
    fn coercions() {
        assert_eq!(to_number(&Value::Bool(true)), Ok(1.0));
        assert_eq!(to_number(&Value::Null), Ok(0.0));
        assert!(to_number(&Value::Undefined).unwrap().is_nan());
        assert_eq!(to_number(&Value::from(" 12.5 ")), Ok(12.5));
        assert_eq!(to_number(&Value::from("")), Ok(0.0));
        assert!(to_number(&Value::from("12x")).unwrap().is_nan());
        assert_eq!(to_number(&Value::array([])), Err("array"));

        assert_eq!(to_display_string(&Value::Number(7.0)).unwrap(), "7");
        assert_eq!(to_display_string(&Value::Undefined).unwrap(), "undefined");
        assert_eq!(to_display_string(&empty_env()), Err("object"));
    }

    #[test]
    fn loose_equality_rules() {
        assert!(loose_eq(&Value::Null, &Value::Undefined));
        assert!(loose_eq(&Value::Bool(true), &Value::Number(1.0)));
        assert!(loose_eq(&Value::from("2"), &Value::Number(2.0)));
        assert!(!loose_eq(
            &Value::Number(f64::NAN),
            &Value::Number(f64::NAN)
        ));

        // Non-primitives never coerce.
        let xs = Value::array([Value::from(1.0)]);
        assert!(loose_eq(&xs, &xs.clone()));
        assert!(!loose_eq(&xs, &Value::array([Value::from(1.0)])));
        assert!(!loose_eq(&xs, &Value::from("1")));
        assert!(!loose_eq(&xs, &Value::Bool(true)));
        assert!(!loose_eq(&empty_env(), &Value::from("")));
    }
}
