use super::expect_args;
use crate::executor::errors::RuntimeError;
use crate::executor::types::{ResultValue, Value};

fn take_one(name: &str, mut args: Vec<Value>) -> Result<Value, RuntimeError> {
    expect_args(name, &args, 1)?;
    Ok(args.pop().unwrap_or(Value::Null))
}

fn not_result(name: &str, value: &Value) -> RuntimeError {
    RuntimeError::type_mismatch(format!(
        "{}() expects a Result argument, got {}",
        name,
        value.type_name()
    ))
}

pub fn ok(args: Vec<Value>) -> Result<Value, RuntimeError> {
    Ok(Value::ok(take_one("Ok", args)?))
}

pub fn err(args: Vec<Value>) -> Result<Value, RuntimeError> {
    Ok(Value::err(take_one("Err", args)?))
}

pub fn is_ok(args: &[Value]) -> Result<Value, RuntimeError> {
    expect_args("isOk", args, 1)?;
    match &args[0] {
        Value::Result(r) => Ok(Value::Bool(matches!(r, ResultValue::Ok(_)))),
        other => Err(not_result("isOk", other)),
    }
}

pub fn is_err(args: &[Value]) -> Result<Value, RuntimeError> {
    expect_args("isErr", args, 1)?;
    match &args[0] {
        Value::Result(r) => Ok(Value::Bool(matches!(r, ResultValue::Err(_)))),
        other => Err(not_result("isErr", other)),
    }
}

pub fn unwrap(args: Vec<Value>) -> Result<Value, RuntimeError> {
    match take_one("unwrap", args)? {
        Value::Result(ResultValue::Ok(v)) => Ok(*v),
        Value::Result(ResultValue::Err(e)) => Err(RuntimeError::type_mismatch(format!(
            "unwrap() called on Err({})",
            e
        ))),
        other => Err(not_result("unwrap", &other)),
    }
}

/// Ok payload, or the fallback for an Err
pub fn unwrap_or(mut args: Vec<Value>) -> Result<Value, RuntimeError> {
    expect_args("unwrapOr", &args, 2)?;
    let fallback = args.pop().unwrap_or(Value::Null);
    match args.pop().unwrap_or(Value::Null) {
        Value::Result(ResultValue::Ok(v)) => Ok(*v),
        Value::Result(ResultValue::Err(_)) => Ok(fallback),
        other => Err(not_result("unwrapOr", &other)),
    }
}

pub fn unwrap_err(args: Vec<Value>) -> Result<Value, RuntimeError> {
    match take_one("unwrapErr", args)? {
        Value::Result(ResultValue::Err(e)) => Ok(*e),
        Value::Result(ResultValue::Ok(v)) => Err(RuntimeError::type_mismatch(format!(
            "unwrapErr() called on Ok({})",
            v
        ))),
        other => Err(not_result("unwrapErr", &other)),
    }
}
