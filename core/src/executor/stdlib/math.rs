//! Math, randomness, ids and clock

use rand::Rng;

use super::{expect_args, int_arg};
use crate::executor::errors::RuntimeError;
use crate::executor::types::Value;

fn not_numeric(name: &str, value: &Value) -> RuntimeError {
    RuntimeError::type_mismatch(format!(
        "{}() expects a numeric argument, got {}",
        name,
        value.type_name()
    ))
}

pub fn abs(args: &[Value]) -> Result<Value, RuntimeError> {
    expect_args("abs", args, 1)?;
    match &args[0] {
        Value::Int(n) => n
            .checked_abs()
            .map(Value::Int)
            .ok_or(RuntimeError::IntegerOverflow("abs")),
        Value::Float(n) => Ok(Value::Float(n.abs())),
        other => Err(not_numeric("abs", other)),
    }
}

fn pick(name: &'static str, args: &[Value], want_less: bool) -> Result<Value, RuntimeError> {
    expect_args(name, args, 2)?;
    let (left, right) = (&args[0], &args[1]);
    match (left, right) {
        (Value::Int(a), Value::Int(b)) => {
            let keep_left = if want_less { a <= b } else { a >= b };
            Ok(Value::Int(if keep_left { *a } else { *b }))
        }
        _ => {
            let a = left.as_f64().ok_or_else(|| not_numeric(name, left))?;
            let b = right.as_f64().ok_or_else(|| not_numeric(name, right))?;
            Ok(Value::Float(if want_less { a.min(b) } else { a.max(b) }))
        }
    }
}

pub fn min(args: &[Value]) -> Result<Value, RuntimeError> {
    pick("min", args, true)
}

pub fn max(args: &[Value]) -> Result<Value, RuntimeError> {
    pick("max", args, false)
}

fn rounding(name: &str, args: &[Value], op: fn(f64) -> f64) -> Result<Value, RuntimeError> {
    expect_args(name, args, 1)?;
    match &args[0] {
        Value::Int(n) => Ok(Value::Int(*n)),
        Value::Float(n) => {
            let rounded = op(*n);
            if rounded.is_finite() && rounded.abs() < i64::MAX as f64 {
                Ok(Value::Int(rounded as i64))
            } else {
                Ok(Value::Float(rounded))
            }
        }
        other => Err(not_numeric(name, other)),
    }
}

pub fn floor(args: &[Value]) -> Result<Value, RuntimeError> {
    rounding("floor", args, f64::floor)
}

pub fn ceil(args: &[Value]) -> Result<Value, RuntimeError> {
    rounding("ceil", args, f64::ceil)
}

pub fn round(args: &[Value]) -> Result<Value, RuntimeError> {
    rounding("round", args, f64::round)
}

/// Uniform integer in `[min, max]`
pub fn random_int(args: &[Value]) -> Result<Value, RuntimeError> {
    expect_args("randomInt", args, 2)?;
    let lo = int_arg("randomInt", args, 0)?;
    let hi = int_arg("randomInt", args, 1)?;
    if lo > hi {
        return Err(RuntimeError::type_mismatch(format!(
            "randomInt() requires min <= max, got min={}, max={}",
            lo, hi
        )));
    }
    Ok(Value::Int(rand::thread_rng().gen_range(lo..=hi)))
}

pub fn generate_id(args: &[Value]) -> Result<Value, RuntimeError> {
    expect_args("generateId", args, 0)?;
    Ok(Value::Str(uuid::Uuid::new_v4().to_string()))
}

/// Unix seconds
pub fn now(args: &[Value]) -> Result<Value, RuntimeError> {
    expect_args("now", args, 0)?;
    Ok(Value::Int(chrono::Utc::now().timestamp()))
}
