//! Conversions and type inspection

use super::{expect_args, str_arg};
use crate::executor::errors::RuntimeError;
use crate::executor::types::Value;

/// Characters for strings, elements for arrays, fields for objects
pub fn length(args: &[Value]) -> Result<Value, RuntimeError> {
    expect_args("length", args, 1)?;
    let len = match &args[0] {
        Value::Str(s) => s.chars().count(),
        Value::Array(items) => items.len(),
        Value::Object(obj) => obj.len(),
        other => {
            return Err(RuntimeError::type_mismatch(format!(
                "length() expects a string, array, or object argument, got {}",
                other.type_name()
            )))
        }
    };
    Ok(Value::Int(len as i64))
}

pub fn to_string(args: &[Value]) -> Result<Value, RuntimeError> {
    expect_args("toString", args, 1)?;
    Ok(Value::Str(args[0].to_string()))
}

pub fn parse_int(args: &[Value]) -> Result<Value, RuntimeError> {
    expect_args("parseInt", args, 1)?;
    let s = str_arg("parseInt", args, 0)?.trim();
    s.parse::<i64>().map(Value::Int).map_err(|e| {
        RuntimeError::type_mismatch(format!("parseInt() failed to parse '{}': {}", s, e))
    })
}

pub fn parse_float(args: &[Value]) -> Result<Value, RuntimeError> {
    expect_args("parseFloat", args, 1)?;
    let s = str_arg("parseFloat", args, 0)?.trim();
    s.parse::<f64>().map(Value::Float).map_err(|e| {
        RuntimeError::type_mismatch(format!("parseFloat() failed to parse '{}': {}", s, e))
    })
}

pub fn type_of(args: &[Value]) -> Result<Value, RuntimeError> {
    expect_args("typeOf", args, 1)?;
    Ok(Value::str(args[0].type_name()))
}
