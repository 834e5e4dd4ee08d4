//! Runtime value model
//!
//! The closed set of values admissible at evaluation time. Arrays and
//! objects are shared immutably behind `Arc`, which keeps clones cheap in
//! the tree-walking evaluator and gives `==` genuine reference identity
//! for non-primitives. Values are never mutated after construction.

use std::fmt;
use std::sync::Arc;

use indexmap::IndexMap;

pub type HostResult = Result<Value, String>;

type HostImpl = dyn Fn(Option<&Value>, &[Value]) -> HostResult + Send + Sync;

/// An invocable host callable. Opaque to expressions: member access on a
/// function yields nothing, and equality is pointer identity.
#[derive(Clone)]
pub struct HostFn {
    f: Arc<HostImpl>,
}

impl HostFn {
    /// A host function that ignores its receiver.
    pub fn new(f: impl Fn(&[Value]) -> HostResult + Send + Sync + 'static) -> HostFn {
        HostFn {
            f: Arc::new(move |_receiver, args| f(args)),
        }
    }

    /// A host function that also sees the bound receiver of a member call
    /// (`obj.m(...)` passes `obj`; free calls pass `None`).
    pub fn with_receiver(
        f: impl Fn(Option<&Value>, &[Value]) -> HostResult + Send + Sync + 'static,
    ) -> HostFn {
        HostFn { f: Arc::new(f) }
    }

    pub fn call(&self, receiver: Option<&Value>, args: &[Value]) -> HostResult {
        (self.f)(receiver, args)
    }

    pub(crate) fn ptr_eq(&self, other: &HostFn) -> bool {
        Arc::ptr_eq(&self.f, &other.f)
    }
}

impl fmt::Debug for HostFn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HostFn").finish_non_exhaustive()
    }
}

/// A runtime value. No other shapes are admissible; hosts cannot smuggle
/// dates, iterators or class instances through the environment.
#[derive(Debug, Clone)]
pub enum Value {
    Undefined,
    Null,
    Bool(bool),
    /// IEEE-754 double, including NaN and infinities
    Number(f64),
    String(String),
    /// Ordered sequence of values
    Array(Arc<Vec<Value>>),
    /// Mapping from text keys to values, own members only
    Object(Arc<IndexMap<String, Value>>),
    Function(HostFn),
}

impl Value {
    pub fn array(items: impl IntoIterator<Item = Value>) -> Value {
        Value::Array(Arc::new(items.into_iter().collect()))
    }

    pub fn object<K, V>(members: impl IntoIterator<Item = (K, V)>) -> Value
    where
        K: Into<String>,
        V: Into<Value>,
    {
        Value::Object(Arc::new(
            members
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        ))
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Undefined => "undefined",
            Value::Null => "null",
            Value::Bool(_) => "boolean",
            Value::Number(_) => "number",
            Value::String(_) => "string",
            Value::Array(_) => "array",
            Value::Object(_) => "object",
            Value::Function(_) => "function",
        }
    }

    /// `false`, `null`, `undefined`, `NaN`, `0` and `""` are falsy; all
    /// other values (including empty arrays and objects) are truthy.
    pub fn truthy(&self) -> bool {
        match self {
            Value::Undefined | Value::Null => false,
            Value::Bool(b) => *b,
            Value::Number(n) => *n != 0.0 && !n.is_nan(),
            Value::String(s) => !s.is_empty(),
            Value::Array(_) | Value::Object(_) | Value::Function(_) => true,
        }
    }

    pub fn is_primitive(&self) -> bool {
        !matches!(
            self,
            Value::Array(_) | Value::Object(_) | Value::Function(_)
        )
    }

    /// Reference identity for non-primitives; false for everything else.
    pub(crate) fn ref_eq(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::Array(a), Value::Array(b)) => Arc::ptr_eq(a, b),
            (Value::Object(a), Value::Object(b)) => Arc::ptr_eq(a, b),
            (Value::Function(a), Value::Function(b)) => a.ptr_eq(b),
            _ => false,
        }
    }

    /// Build a value from JSON. Total: every JSON value is admissible.
    pub fn from_json(json: serde_json::Value) -> Value {
        match json {
            serde_json::Value::Null => Value::Null,
            serde_json::Value::Bool(b) => Value::Bool(b),
            serde_json::Value::Number(n) => Value::Number(n.as_f64().unwrap_or(f64::NAN)),
            serde_json::Value::String(s) => Value::String(s),
            serde_json::Value::Array(items) => {
                Value::array(items.into_iter().map(Value::from_json))
            }
            serde_json::Value::Object(members) => Value::Object(Arc::new(
                members
                    .into_iter()
                    .map(|(k, v)| (k, Value::from_json(v)))
                    .collect(),
            )),
        }
    }

    /// Convert back to JSON. Partial: functions and non-finite numbers
    /// have no JSON form and yield `None`; `Undefined` maps to JSON null.
    pub fn into_json(self) -> Option<serde_json::Value> {
        match self {
            Value::Undefined | Value::Null => Some(serde_json::Value::Null),
            Value::Bool(b) => Some(serde_json::Value::Bool(b)),
            Value::Number(n) => serde_json::Number::from_f64(n).map(serde_json::Value::Number),
            Value::String(s) => Some(serde_json::Value::String(s)),
            Value::Array(items) => items
                .iter()
                .map(|item| item.clone().into_json())
                .collect::<Option<Vec<_>>>()
                .map(serde_json::Value::Array),
            Value::Object(members) => members
                .iter()
                .map(|(k, v)| v.clone().into_json().map(|v| (k.clone(), v)))
                .collect::<Option<serde_json::Map<_, _>>>()
                .map(serde_json::Value::Object),
            Value::Function(_) => None,
        }
    }
}

/// Structural equality, used by hosts and tests. Arrays and objects
/// compare deeply (object member order does not matter); functions compare
/// by identity; `NaN != NaN`. The expression-level `==` operator applies
/// different, coercing rules — see the evaluator.
impl PartialEq for Value {
    fn eq(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::Undefined, Value::Undefined) | (Value::Null, Value::Null) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Number(a), Value::Number(b)) => a == b,
            (Value::String(a), Value::String(b)) => a == b,
            (Value::Array(a), Value::Array(b)) => a == b,
            (Value::Object(a), Value::Object(b)) => a == b,
            (Value::Function(a), Value::Function(b)) => a.ptr_eq(b),
            _ => false,
        }
    }
}

/// Canonical decimal rendering of a number, shared by the `ToString`
/// coercion and the pretty-printer. Zero loses its sign; non-finite
/// values spell out as `NaN` / `Infinity`.
pub(crate) fn number_to_string(n: f64) -> String {
    if n.is_nan() {
        "NaN".to_string()
    } else if n.is_infinite() {
        if n > 0.0 { "Infinity" } else { "-Infinity" }.to_string()
    } else if n == 0.0 {
        "0".to_string()
    } else {
        format!("{n}")
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Value {
        Value::Bool(b)
    }
}

impl From<f64> for Value {
    fn from(n: f64) -> Value {
        Value::Number(n)
    }
}

impl From<i32> for Value {
    fn from(n: i32) -> Value {
        Value::Number(f64::from(n))
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Value {
        Value::String(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Value {
        Value::String(s)
    }
}

impl From<Vec<Value>> for Value {
    fn from(items: Vec<Value>) -> Value {
        Value::Array(Arc::new(items))
    }
}

impl From<HostFn> for Value {
    fn from(f: HostFn) -> Value {
        Value::Function(f)
    }
}

// ============ Sanity Tests ============
