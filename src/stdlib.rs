//! The `std` standard library
//!
//! A fixed, read-only object bound to the reserved identifier `std`. Every
//! function is deterministic and side-effect-free, validates its arguments
//! and fails with a message naming the function; failures surface to the
//! evaluator like any other host error.

use std::sync::LazyLock;

use crate::value::{HostFn, HostResult, Value};

/// Reserved identifier. Environments must not define it.
pub(crate) const STD_NAME: &str = "std";

static STD: LazyLock<Value> = LazyLock::new(build_std);

pub(crate) fn std_object() -> Value {
    STD.clone()
}

fn build_std() -> Value {
    Value::object([
        ("len", func(len)),
        ("abs", numeric("abs", f64::abs)),
        ("floor", numeric("floor", f64::floor)),
        ("ceil", numeric("ceil", f64::ceil)),
        ("round", numeric("round", round_half_up)),
        ("trunc", numeric("trunc", f64::trunc)),
        ("sqrt", numeric("sqrt", f64::sqrt)),
        ("pow", numeric2("pow", f64::powf)),
        ("min", numeric2("min", min)),
        ("max", numeric2("max", max)),
        ("clamp", func(clamp)),
        ("lower", textual("lower", |s| s.to_lowercase())),
        ("upper", textual("upper", |s| s.to_uppercase())),
        ("trim", textual("trim", |s| s.trim().to_string())),
        ("startsWith", func(starts_with)),
        ("endsWith", func(ends_with)),
        ("includes", func(includes)),
        ("slice", func(slice)),
    ])
}

// ============ Table constructors ============

fn func(f: impl Fn(&[Value]) -> HostResult + Send + Sync + 'static) -> Value {
    Value::Function(HostFn::new(f))
}

fn numeric(name: &'static str, op: impl Fn(f64) -> f64 + Send + Sync + 'static) -> Value {
    func(move |args| {
        arity(name, args, 1)?;
        Ok(Value::Number(op(number_arg(name, args, 0)?)))
    })
}

fn numeric2(name: &'static str, op: impl Fn(f64, f64) -> f64 + Send + Sync + 'static) -> Value {
    func(move |args| {
        arity(name, args, 2)?;
        let a = number_arg(name, args, 0)?;
        let b = number_arg(name, args, 1)?;
        Ok(Value::Number(op(a, b)))
    })
}

fn textual(name: &'static str, op: impl Fn(&str) -> String + Send + Sync + 'static) -> Value {
    func(move |args| {
        arity(name, args, 1)?;
        Ok(Value::String(op(string_arg(name, args, 0)?)))
    })
}

// ============ Argument validation ============

fn arity(name: &str, args: &[Value], expected: usize) -> Result<(), String> {
    if args.len() != expected {
        return Err(format!(
            "{name} expects {expected} argument{}, got {}",
            if expected == 1 { "" } else { "s" },
            args.len()
        ));
    }
    Ok(())
}

fn number_arg(name: &str, args: &[Value], index: usize) -> Result<f64, String> {
    match &args[index] {
        Value::Number(n) => Ok(*n),
        other => Err(format!(
            "{name}: argument {} must be a number, got {}",
            index + 1,
            other.type_name()
        )),
    }
}

fn string_arg<'a>(name: &str, args: &'a [Value], index: usize) -> Result<&'a str, String> {
    match &args[index] {
        Value::String(s) => Ok(s),
        other => Err(format!(
            "{name}: argument {} must be a string, got {}",
            index + 1,
            other.type_name()
        )),
    }
}

// ============ Functions ============

fn len(args: &[Value]) -> HostResult {
    arity("len", args, 1)?;
    match &args[0] {
        Value::String(s) => Ok(Value::Number(s.chars().count() as f64)),
        Value::Array(items) => Ok(Value::Number(items.len() as f64)),
        other => Err(format!(
            "len expects a string or an array, got {}",
            other.type_name()
        )),
    }
}

fn clamp(args: &[Value]) -> HostResult {
    arity("clamp", args, 3)?;
    let x = number_arg("clamp", args, 0)?;
    let lo = number_arg("clamp", args, 1)?;
    let hi = number_arg("clamp", args, 2)?;
    Ok(Value::Number(min(hi, max(lo, x))))
}

fn starts_with(args: &[Value]) -> HostResult {
    arity("startsWith", args, 2)?;
    let s = string_arg("startsWith", args, 0)?;
    let prefix = string_arg("startsWith", args, 1)?;
    Ok(Value::Bool(s.starts_with(prefix)))
}

fn ends_with(args: &[Value]) -> HostResult {
    arity("endsWith", args, 2)?;
    let s = string_arg("endsWith", args, 0)?;
    let suffix = string_arg("endsWith", args, 1)?;
    Ok(Value::Bool(s.ends_with(suffix)))
}

/// Substring containment on strings, SameValueZero membership on arrays
/// (NaN finds NaN; arrays, objects and functions match by identity).
fn includes(args: &[Value]) -> HostResult {
    arity("includes", args, 2)?;
    match &args[0] {
        Value::String(haystack) => {
            let needle = string_arg("includes", args, 1)?;
            Ok(Value::Bool(haystack.contains(needle)))
        }
        Value::Array(items) => Ok(Value::Bool(
            items.iter().any(|item| same_value_zero(item, &args[1])),
        )),
        other => Err(format!(
            "includes expects a string or an array, got {}",
            other.type_name()
        )),
    }
}

fn same_value_zero(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => x == y || (x.is_nan() && y.is_nan()),
        _ if !a.is_primitive() || !b.is_primitive() => a.ref_eq(b),
        _ => a == b,
    }
}

/// `slice(s, start, end?)`, counting Unicode scalar values. Negative
/// indices count from the end; out-of-range indices clamp.
fn slice(args: &[Value]) -> HostResult {
    if args.len() != 2 && args.len() != 3 {
        return Err(format!("slice expects 2 or 3 arguments, got {}", args.len()));
    }
    let s = string_arg("slice", args, 0)?;
    let start = number_arg("slice", args, 1)?;
    let end = if args.len() == 3 {
        Some(number_arg("slice", args, 2)?)
    } else {
        None
    };

    let chars: Vec<char> = s.chars().collect();
    let from = resolve_index(start, chars.len());
    let to = end.map_or(chars.len(), |e| resolve_index(e, chars.len()));
    if from >= to {
        return Ok(Value::String(String::new()));
    }
    Ok(Value::String(chars[from..to].iter().collect()))
}

fn resolve_index(raw: f64, len: usize) -> usize {
    if raw.is_nan() {
        return 0;
    }
    let i = raw.trunc();
    if i < 0.0 {
        let from_end = len as f64 + i;
        if from_end < 0.0 { 0 } else { from_end as usize }
    } else if i >= len as f64 {
        len
    } else {
        i as usize
    }
}

/// ECMAScript `Math.round`: halves round toward positive infinity, so
/// `round(-2.5)` is `-2`.
fn round_half_up(x: f64) -> f64 {
    if x.fract() == -0.5 { x.ceil() } else { x.round() }
}

/// Unlike `f64::min`/`f64::max`, NaN operands propagate.
fn min(a: f64, b: f64) -> f64 {
    if a.is_nan() || b.is_nan() { f64::NAN } else { a.min(b) }
}

fn max(a: f64, b: f64) -> f64 {
    if a.is_nan() || b.is_nan() { f64::NAN } else { a.max(b) }
}

// ============ Sanity Tests ============

#[cfg(test)]
mod tests {
    use super::*;

    fn call(name: &str, args: &[Value]) -> HostResult {
        let Value::Object(table) = std_object() else {
            panic!("std is not an object");
        };
        let Some(Value::Function(f)) = table.get(name).cloned() else {
            panic!("std.{name} is not a function");
        };
        f.call(None, args)
    }

    #[test]
    fn len_of_strings_and_arrays() {
        assert_eq!(call("len", &["héllo".into()]).unwrap(), Value::Number(5.0));
        let xs = Value::array([1.0.into(), 2.0.into()]);
        assert_eq!(call("len", &[xs]).unwrap(), Value::Number(2.0));

        let no_members: [(&str, Value); 0] = [];
        let err = call("len", &[Value::object(no_members)]).unwrap_err();
        assert!(err.contains("len"));
        assert!(call("len", &[]).unwrap_err().contains("1 argument"));
    }

    #[test]
    fn numeric_functions() {
        assert_eq!(call("abs", &[(-3.5).into()]).unwrap(), Value::Number(3.5));
        assert_eq!(call("floor", &[1.9.into()]).unwrap(), Value::Number(1.0));
        assert_eq!(call("ceil", &[1.1.into()]).unwrap(), Value::Number(2.0));
        assert_eq!(call("trunc", &[(-1.9).into()]).unwrap(), Value::Number(-1.0));
        assert_eq!(call("sqrt", &[9.0.into()]).unwrap(), Value::Number(3.0));
        assert_eq!(call("pow", &[2.0.into(), 10.0.into()]).unwrap(), Value::Number(1024.0));

        let err = call("sqrt", &["4".into()]).unwrap_err();
        assert!(err.contains("must be a number"));
    }

    #[test]
    fn round_follows_ecmascript() {
        assert_eq!(call("round", &[2.5.into()]).unwrap(), Value::Number(3.0));
        assert_eq!(call("round", &[(-2.5).into()]).unwrap(), Value::Number(-2.0));
        assert_eq!(call("round", &[(-2.6).into()]).unwrap(), Value::Number(-3.0));
        assert_eq!(call("round", &[2.4.into()]).unwrap(), Value::Number(2.0));
    }

    #[test]
    fn min_max_clamp() {
        assert_eq!(call("min", &[1.0.into(), 2.0.into()]).unwrap(), Value::Number(1.0));
        assert_eq!(call("max", &[1.0.into(), 2.0.into()]).unwrap(), Value::Number(2.0));
        let nan = call("min", &[f64::NAN.into(), 2.0.into()]).unwrap();
        assert!(matches!(nan, Value::Number(n) if n.is_nan()));

        assert_eq!(
            call("clamp", &[5.0.into(), 0.0.into(), 3.0.into()]).unwrap(),
            Value::Number(3.0)
        );
        assert_eq!(
            call("clamp", &[(-1.0).into(), 0.0.into(), 3.0.into()]).unwrap(),
            Value::Number(0.0)
        );
        assert_eq!(
            call("clamp", &[2.0.into(), 0.0.into(), 3.0.into()]).unwrap(),
            Value::Number(2.0)
        );
    }

    #[test]
    fn string_functions() {
        assert_eq!(call("lower", &["AbC".into()]).unwrap(), Value::from("abc"));
        assert_eq!(call("upper", &["AbC".into()]).unwrap(), Value::from("ABC"));
        assert_eq!(call("trim", &["  x \t".into()]).unwrap(), Value::from("x"));
        assert_eq!(
            call("startsWith", &["hello".into(), "he".into()]).unwrap(),
            Value::Bool(true)
        );
        assert_eq!(
            call("endsWith", &["hello".into(), "he".into()]).unwrap(),
            Value::Bool(false)
        );
    }

    #[test]
    fn includes_on_strings_and_arrays() {
        assert_eq!(
            call("includes", &["haystack".into(), "sta".into()]).unwrap(),
            Value::Bool(true)
        );
        let xs = Value::array(["a".into(), Value::Number(f64::NAN), 2.0.into()]);
        assert_eq!(
            call("includes", &[xs.clone(), "a".into()]).unwrap(),
            Value::Bool(true)
        );
        assert_eq!(
            call("includes", &[xs.clone(), Value::Number(f64::NAN)]).unwrap(),
            Value::Bool(true)
        );
        assert_eq!(
            call("includes", &[xs.clone(), "b".into()]).unwrap(),
            Value::Bool(false)
        );

        // Non-primitive membership is identity, not structure.
        let inner = Value::array([1.0.into()]);
        let outer = Value::array([inner.clone()]);
        assert_eq!(
            call("includes", &[outer.clone(), inner]).unwrap(),
            Value::Bool(true)
        );
        assert_eq!(
            call("includes", &[outer, Value::array([1.0.into()])]).unwrap(),
            Value::Bool(false)
        );

        assert!(call("includes", &[1.0.into(), 1.0.into()]).is_err());
    }

    #[test]
    fn slice_semantics() {
        assert_eq!(
            call("slice", &["hello".into(), 1.0.into(), 4.0.into()]).unwrap(),
            Value::from("ell")
        );
        assert_eq!(
            call("slice", &["hello".into(), (-3.0).into()]).unwrap(),
            Value::from("llo")
        );
        assert_eq!(
            call("slice", &["hello".into(), 3.0.into(), 1.0.into()]).unwrap(),
            Value::from("")
        );
        assert_eq!(
            call("slice", &["hello".into(), 0.0.into(), 99.0.into()]).unwrap(),
            Value::from("hello")
        );
        assert_eq!(
            call("slice", &["héllo".into(), 1.0.into(), 2.0.into()]).unwrap(),
            Value::from("é")
        );
    }
}
