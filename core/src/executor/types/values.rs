//! Runtime value types

use indexmap::IndexMap;
use serde_json::Value as JsonValue;
use std::fmt;
use std::sync::Arc;

use super::ast::{Field, FunctionDef, LambdaBody};
use crate::executor::capability::Capability;
use crate::executor::env::Environment;
use crate::executor::future::Future;
use crate::executor::stdlib::StdlibFunc;

/// Insertion-ordered object storage
pub type Object = IndexMap<String, Value>;

/// Runtime value
#[derive(Debug, Clone)]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    Array(Vec<Value>),
    Object(Object),
    Function(Arc<FunctionDef>),
    Closure(Arc<Closure>),
    /// Standard library function referenced as a value, e.g. `map(xs, upper)`
    Builtin(StdlibFunc),
    Result(ResultValue),
    Future(Future),
    Capability(Capability),
}

/// `Ok(v)` / `Err(e)` produced by the `Ok` and `Err` builtins
#[derive(Debug, Clone)]
pub enum ResultValue {
    Ok(Box<Value>),
    Err(Box<Value>),
}

/// Lambda plus the scope it was created in
pub struct Closure {
    pub params: Vec<Field>,
    pub body: LambdaBody,
    pub env: Arc<Environment>,
}

impl fmt::Debug for Closure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names: Vec<&str> = self.params.iter().map(|p| p.name.as_str()).collect();
        f.debug_struct("Closure").field("params", &names).finish()
    }
}

impl Value {
    pub fn str(s: impl Into<String>) -> Self {
        Value::Str(s.into())
    }

    pub fn ok(v: Value) -> Self {
        Value::Result(ResultValue::Ok(Box::new(v)))
    }

    pub fn err(v: Value) -> Self {
        Value::Result(ResultValue::Err(Box::new(v)))
    }

    /// Human-readable type name used in error messages
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Bool(_) => "bool",
            Value::Int(_) => "int",
            Value::Float(_) => "float",
            Value::Str(_) => "string",
            Value::Array(_) => "array",
            Value::Object(_) => "object",
            Value::Function(_) => "function",
            Value::Closure(_) => "closure",
            Value::Builtin(_) => "builtin",
            Value::Result(_) => "result",
            Value::Future(_) => "future",
            Value::Capability(_) => "capability",
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            Value::Int(n) => Some(*n),
            _ => None,
        }
    }

    /// Numeric view with Int promoted to Float
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Int(n) => Some(*n as f64),
            Value::Float(n) => Some(*n),
            _ => None,
        }
    }

    pub fn is_callable(&self) -> bool {
        matches!(
            self,
            Value::Function(_) | Value::Closure(_) | Value::Builtin(_)
        )
    }

    /// Convert an incoming JSON document (request body, CLI argument)
    pub fn from_json(json: JsonValue) -> Self {
        match json {
            JsonValue::Null => Value::Null,
            JsonValue::Bool(b) => Value::Bool(b),
            JsonValue::Number(n) => match n.as_i64() {
                Some(i) => Value::Int(i),
                None => Value::Float(n.as_f64().unwrap_or(f64::NAN)),
            },
            JsonValue::String(s) => Value::Str(s),
            JsonValue::Array(items) => Value::Array(items.into_iter().map(Value::from_json).collect()),
            JsonValue::Object(map) => Value::Object(
                map.into_iter()
                    .map(|(k, v)| (k, Value::from_json(v)))
                    .collect(),
            ),
        }
    }

    /// Render as JSON for responses. Non-data values become descriptive strings.
    pub fn to_json(&self) -> JsonValue {
        match self {
            Value::Null => JsonValue::Null,
            Value::Bool(b) => JsonValue::Bool(*b),
            Value::Int(n) => JsonValue::from(*n),
            Value::Float(n) => serde_json::Number::from_f64(*n)
                .map(JsonValue::Number)
                .unwrap_or(JsonValue::Null),
            Value::Str(s) => JsonValue::String(s.clone()),
            Value::Array(items) => JsonValue::Array(items.iter().map(Value::to_json).collect()),
            Value::Object(map) => JsonValue::Object(
                map.iter()
                    .map(|(k, v)| (k.clone(), v.to_json()))
                    .collect(),
            ),
            Value::Result(ResultValue::Ok(v)) => serde_json::json!({ "ok": v.to_json() }),
            Value::Result(ResultValue::Err(e)) => serde_json::json!({ "err": e.to_json() }),
            Value::Function(f) => JsonValue::String(format!("<function {}>", f.name)),
            Value::Closure(_) => JsonValue::String("<closure>".to_string()),
            Value::Builtin(func) => JsonValue::String(format!("<builtin {}>", func.name())),
            Value::Future(_) => JsonValue::String("<future>".to_string()),
            Value::Capability(c) => JsonValue::String(format!("<capability {}>", c.kind())),
        }
    }
}

/// Equality with Int/Float coercion. Arrays, objects and results compare
/// structurally; functions, futures and capabilities by identity.
impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Null, Value::Null) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Int(a), Value::Int(b)) => a == b,
            (Value::Int(_) | Value::Float(_), Value::Int(_) | Value::Float(_)) => {
                self.as_f64() == other.as_f64()
            }
            (Value::Str(a), Value::Str(b)) => a == b,
            (Value::Array(a), Value::Array(b)) => a == b,
            (Value::Object(a), Value::Object(b)) => {
                a.len() == b.len() && a.iter().all(|(k, v)| b.get(k) == Some(v))
            }
            (Value::Result(ResultValue::Ok(a)), Value::Result(ResultValue::Ok(b))) => a == b,
            (Value::Result(ResultValue::Err(a)), Value::Result(ResultValue::Err(b))) => a == b,
            (Value::Function(a), Value::Function(b)) => Arc::ptr_eq(a, b),
            (Value::Closure(a), Value::Closure(b)) => Arc::ptr_eq(a, b),
            (Value::Builtin(a), Value::Builtin(b)) => a == b,
            (Value::Future(a), Value::Future(b)) => a.same_as(b),
            (Value::Capability(a), Value::Capability(b)) => a.same_as(b),
            _ => false,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => f.write_str("null"),
            Value::Bool(b) => write!(f, "{}", b),
            Value::Int(n) => write!(f, "{}", n),
            Value::Float(n) => write!(f, "{}", n),
            Value::Str(s) => f.write_str(s),
            Value::Result(ResultValue::Ok(v)) => write!(f, "Ok({})", v),
            Value::Result(ResultValue::Err(e)) => write!(f, "Err({})", e),
            other => write!(f, "{}", other.to_json()),
        }
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Value::Int(n)
    }
}

impl From<f64> for Value {
    fn from(n: f64) -> Self {
        Value::Float(n)
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

impl From<Vec<Value>> for Value {
    fn from(items: Vec<Value>) -> Self {
        Value::Array(items)
    }
}

impl From<Object> for Value {
    fn from(map: Object) -> Self {
        Value::Object(map)
    }
}
