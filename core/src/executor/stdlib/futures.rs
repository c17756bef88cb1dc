//! Future combinators exposed to scripts

use std::time::Duration;

use super::{expect_args, int_arg};
use crate::executor::errors::RuntimeError;
use crate::executor::future::{self, Future};
use crate::executor::types::Value;

fn future_arg<'a>(name: &str, args: &'a [Value], idx: usize) -> Result<&'a Future, RuntimeError> {
    match &args[idx] {
        Value::Future(f) => Ok(f),
        other => Err(RuntimeError::type_mismatch(format!(
            "{}() expects a future, got {}",
            name,
            other.type_name()
        ))),
    }
}

/// Accepts `all([f1, f2])` as well as `all(f1, f2)`
fn future_list(name: &str, args: Vec<Value>) -> Result<Vec<Future>, RuntimeError> {
    let items = match <[Value; 1]>::try_from(args) {
        Ok([Value::Array(items)]) => items,
        Ok([single]) => vec![single],
        Err(args) => args,
    };
    items
        .into_iter()
        .map(|item| match item {
            Value::Future(f) => Ok(f),
            other => Err(RuntimeError::type_mismatch(format!(
                "{}() expects futures, got {}",
                name,
                other.type_name()
            ))),
        })
        .collect()
}

pub fn all(args: Vec<Value>) -> Result<Value, RuntimeError> {
    Ok(Value::Future(future::all(future_list("all", args)?)))
}

pub fn race(args: Vec<Value>) -> Result<Value, RuntimeError> {
    Ok(Value::Future(future::race(future_list("race", args)?)))
}

pub fn any(args: Vec<Value>) -> Result<Value, RuntimeError> {
    Ok(Value::Future(future::any(future_list("any", args)?)))
}

/// Returns whether the call had any effect
pub fn cancel(args: &[Value]) -> Result<Value, RuntimeError> {
    expect_args("cancel", args, 1)?;
    Ok(Value::Bool(future_arg("cancel", args, 0)?.cancel()))
}

/// `awaitTimeout(f, ms)`; the producer keeps running after a timeout
pub fn await_timeout(args: &[Value]) -> Result<Value, RuntimeError> {
    expect_args("awaitTimeout", args, 2)?;
    let f = future_arg("awaitTimeout", args, 0)?;
    let ms = int_arg("awaitTimeout", args, 1)?;
    let ms = u64::try_from(ms).map_err(|_| {
        RuntimeError::type_mismatch(format!("awaitTimeout() timeout must be non-negative, got {}", ms))
    })?;
    f.wait_timeout(Duration::from_millis(ms))
}

pub fn is_cancelled(args: &[Value]) -> Result<Value, RuntimeError> {
    expect_args("isCancelled", args, 1)?;
    Ok(Value::Bool(future_arg("isCancelled", args, 0)?.is_cancelled()))
}
