//! Array and object functions
//!
//! Values are owned, so every "mutating" function returns a new collection
//! and leaves its argument untouched.

use std::cmp::Ordering;

use super::{array_arg, callable_arg, expect_arg_range, expect_args, int_arg, object_arg, str_arg};
use crate::executor::errors::RuntimeError;
use crate::executor::types::Value;
use crate::executor::Executor;

fn take_array(name: &str, args: &mut Vec<Value>, idx: usize) -> Result<Vec<Value>, RuntimeError> {
    array_arg(name, args, idx)?;
    match std::mem::replace(&mut args[idx], Value::Null) {
        Value::Array(items) => Ok(items),
        _ => Ok(Vec::new()),
    }
}

fn callback_error(name: &str, idx: usize) -> impl Fn(RuntimeError) -> RuntimeError + '_ {
    move |e| e.context(&format!("{}() callback at index {}", name, idx))
}

fn is_true(value: &Value) -> bool {
    matches!(value, Value::Bool(true))
}

pub fn append(mut args: Vec<Value>) -> Result<Value, RuntimeError> {
    expect_args("append", &args, 2)?;
    let mut items = take_array("append", &mut args, 0)?;
    items.push(args.pop().unwrap_or(Value::Null));
    Ok(Value::Array(items))
}

pub fn map(exec: &Executor, mut args: Vec<Value>) -> Result<Value, RuntimeError> {
    expect_args("map", &args, 2)?;
    let callback = callable_arg("map", &args, 1)?;
    let items = take_array("map", &mut args, 0)?;
    let mut out = Vec::with_capacity(items.len());
    for (idx, item) in items.into_iter().enumerate() {
        out.push(
            exec.call_value(&callback, vec![item])
                .map_err(callback_error("map", idx))?,
        );
    }
    Ok(Value::Array(out))
}

pub fn filter(exec: &Executor, mut args: Vec<Value>) -> Result<Value, RuntimeError> {
    expect_args("filter", &args, 2)?;
    let callback = callable_arg("filter", &args, 1)?;
    let items = take_array("filter", &mut args, 0)?;
    let mut out = Vec::new();
    for (idx, item) in items.into_iter().enumerate() {
        let keep = exec
            .call_value(&callback, vec![item.clone()])
            .map_err(callback_error("filter", idx))?;
        if is_true(&keep) {
            out.push(item);
        }
    }
    Ok(Value::Array(out))
}

pub fn reduce(exec: &Executor, mut args: Vec<Value>) -> Result<Value, RuntimeError> {
    expect_args("reduce", &args, 3)?;
    let callback = callable_arg("reduce", &args, 1)?;
    let mut acc = args.pop().unwrap_or(Value::Null);
    let items = take_array("reduce", &mut args, 0)?;
    for (idx, item) in items.into_iter().enumerate() {
        acc = exec
            .call_value(&callback, vec![acc, item])
            .map_err(callback_error("reduce", idx))?;
    }
    Ok(acc)
}

/// First element the predicate accepts, or null
pub fn find(exec: &Executor, mut args: Vec<Value>) -> Result<Value, RuntimeError> {
    expect_args("find", &args, 2)?;
    let callback = callable_arg("find", &args, 1)?;
    let items = take_array("find", &mut args, 0)?;
    for (idx, item) in items.into_iter().enumerate() {
        let hit = exec
            .call_value(&callback, vec![item.clone()])
            .map_err(callback_error("find", idx))?;
        if is_true(&hit) {
            return Ok(item);
        }
    }
    Ok(Value::Null)
}

pub fn some(exec: &Executor, mut args: Vec<Value>) -> Result<Value, RuntimeError> {
    expect_args("some", &args, 2)?;
    let callback = callable_arg("some", &args, 1)?;
    let items = take_array("some", &mut args, 0)?;
    for (idx, item) in items.into_iter().enumerate() {
        let hit = exec
            .call_value(&callback, vec![item])
            .map_err(callback_error("some", idx))?;
        if is_true(&hit) {
            return Ok(Value::Bool(true));
        }
    }
    Ok(Value::Bool(false))
}

pub fn every(exec: &Executor, mut args: Vec<Value>) -> Result<Value, RuntimeError> {
    expect_args("every", &args, 2)?;
    let callback = callable_arg("every", &args, 1)?;
    let items = take_array("every", &mut args, 0)?;
    for (idx, item) in items.into_iter().enumerate() {
        let hit = exec
            .call_value(&callback, vec![item])
            .map_err(callback_error("every", idx))?;
        if !is_true(&hit) {
            return Ok(Value::Bool(false));
        }
    }
    Ok(Value::Bool(true))
}

fn natural_order(a: &Value, b: &Value) -> Result<Ordering, RuntimeError> {
    let ordering = match (a, b) {
        (Value::Int(x), Value::Int(y)) => Some(x.cmp(y)),
        (Value::Str(x), Value::Str(y)) => Some(x.cmp(y)),
        (Value::Int(_) | Value::Float(_), Value::Int(_) | Value::Float(_)) => {
            a.as_f64().zip(b.as_f64()).and_then(|(x, y)| x.partial_cmp(&y))
        }
        _ => None,
    };
    ordering.ok_or_else(|| {
        RuntimeError::type_mismatch(format!(
            "sort() cannot compare {} and {}",
            a.type_name(),
            b.type_name()
        ))
    })
}

/// Stable merge sort with a fallible comparison. A user comparator may be
/// inconsistent, so the standard library sort is not used.
fn merge_sort<F>(mut items: Vec<Value>, less: &mut F) -> Result<Vec<Value>, RuntimeError>
where
    F: FnMut(&Value, &Value) -> Result<bool, RuntimeError>,
{
    if items.len() <= 1 {
        return Ok(items);
    }
    let right = items.split_off(items.len() / 2);
    let left = merge_sort(items, less)?;
    let right = merge_sort(right, less)?;

    let mut out = Vec::with_capacity(left.len() + right.len());
    let mut left = left.into_iter().peekable();
    let mut right = right.into_iter().peekable();
    loop {
        let take_right = match (left.peek(), right.peek()) {
            (Some(a), Some(b)) => less(b, a)?,
            (Some(_), None) => false,
            (None, Some(_)) => true,
            (None, None) => break,
        };
        let next = if take_right { right.next() } else { left.next() };
        out.extend(next);
    }
    Ok(out)
}

/// `sort(xs)` or `sort(xs, cmp)` where `cmp(a, b)` returns a number
/// (negative when `a` sorts first) or a bool (`true` when `a` sorts first)
pub fn sort(exec: &Executor, mut args: Vec<Value>) -> Result<Value, RuntimeError> {
    expect_arg_range("sort", &args, 1, 2)?;
    let comparator = if args.len() == 2 {
        Some(callable_arg("sort", &args, 1)?)
    } else {
        None
    };
    let items = take_array("sort", &mut args, 0)?;

    let sorted = match comparator {
        None => merge_sort(items, &mut |a: &Value, b: &Value| {
            Ok(natural_order(a, b)? == Ordering::Less)
        })?,
        Some(cmp) => merge_sort(items, &mut |a: &Value, b: &Value| {
            match exec.call_value(&cmp, vec![a.clone(), b.clone()])? {
                Value::Bool(first) => Ok(first),
                Value::Int(n) => Ok(n < 0),
                Value::Float(n) => Ok(n < 0.0),
                other => Err(RuntimeError::type_mismatch(format!(
                    "sort() comparator must return a number or boolean, got {}",
                    other.type_name()
                ))),
            }
        })?,
    };
    Ok(Value::Array(sorted))
}

pub fn reverse(mut args: Vec<Value>) -> Result<Value, RuntimeError> {
    expect_args("reverse", &args, 1)?;
    let mut items = take_array("reverse", &mut args, 0)?;
    items.reverse();
    Ok(Value::Array(items))
}

/// Flatten one level
pub fn flat(mut args: Vec<Value>) -> Result<Value, RuntimeError> {
    expect_args("flat", &args, 1)?;
    let items = take_array("flat", &mut args, 0)?;
    let mut out = Vec::with_capacity(items.len());
    for item in items {
        match item {
            Value::Array(inner) => out.extend(inner),
            other => out.push(other),
        }
    }
    Ok(Value::Array(out))
}

/// `slice(xs, start, end)` with both bounds clamped to the array
pub fn slice(mut args: Vec<Value>) -> Result<Value, RuntimeError> {
    expect_args("slice", &args, 3)?;
    let start = int_arg("slice", &args, 1)?;
    let end = int_arg("slice", &args, 2)?;
    let mut items = take_array("slice", &mut args, 0)?;
    let len = items.len() as i64;
    let start = start.clamp(0, len) as usize;
    let end = end.clamp(0, len) as usize;
    if start >= end {
        return Ok(Value::Array(Vec::new()));
    }
    items.truncate(end);
    Ok(Value::Array(items.split_off(start)))
}

/// `range(end)`, `range(start, end)` or `range(start, end, step)`. The
/// element count is bounded by the loop iteration limit.
pub fn range(exec: &Executor, args: &[Value]) -> Result<Value, RuntimeError> {
    expect_arg_range("range", args, 1, 3)?;
    let (start, end) = if args.len() == 1 {
        (0, int_arg("range", args, 0)?)
    } else {
        (int_arg("range", args, 0)?, int_arg("range", args, 1)?)
    };
    let step = if args.len() == 3 {
        int_arg("range", args, 2)?
    } else {
        1
    };
    if step == 0 {
        return Err(RuntimeError::type_mismatch("range() step must not be zero"));
    }

    // Widened so the span of any two i64 values fits
    let span = i128::from(end) - i128::from(start);
    let step_wide = i128::from(step);
    let count = if span.signum() == step_wide.signum() {
        (span.abs() + step_wide.abs() - 1) / step_wide.abs()
    } else {
        0
    };
    let limit = exec.program().limits.max_loop_iterations;
    if count > limit as i128 {
        return Err(RuntimeError::IterationLimitExceeded(limit));
    }

    let mut out = Vec::with_capacity(count as usize);
    let mut current = start;
    for _ in 0..count {
        out.push(Value::Int(current));
        current = match current.checked_add(step) {
            Some(next) => next,
            None => break,
        };
    }
    Ok(Value::Array(out))
}

pub fn keys(args: &[Value]) -> Result<Value, RuntimeError> {
    expect_args("keys", args, 1)?;
    let obj = object_arg("keys", args, 0)?;
    Ok(Value::Array(obj.keys().map(|k| Value::str(k.as_str())).collect()))
}

pub fn values(mut args: Vec<Value>) -> Result<Value, RuntimeError> {
    expect_args("values", &args, 1)?;
    object_arg("values", &args, 0)?;
    match args.pop() {
        Some(Value::Object(obj)) => Ok(Value::Array(obj.into_values().collect())),
        _ => Ok(Value::Array(Vec::new())),
    }
}

pub fn has(args: &[Value]) -> Result<Value, RuntimeError> {
    expect_args("has", args, 2)?;
    let obj = object_arg("has", args, 0)?;
    let key = str_arg("has", args, 1)?;
    Ok(Value::Bool(obj.contains_key(key)))
}

/// Copy of the object with `key` set
pub fn set(mut args: Vec<Value>) -> Result<Value, RuntimeError> {
    expect_args("set", &args, 3)?;
    object_arg("set", &args, 0)?;
    let key = str_arg("set", &args, 1)?.to_string();
    let value = args.pop().unwrap_or(Value::Null);
    match args.swap_remove(0) {
        Value::Object(mut obj) => {
            obj.insert(key, value);
            Ok(Value::Object(obj))
        }
        other => Ok(other),
    }
}

/// Copy of the object without `key`
pub fn remove(mut args: Vec<Value>) -> Result<Value, RuntimeError> {
    expect_args("remove", &args, 2)?;
    object_arg("remove", &args, 0)?;
    let key = str_arg("remove", &args, 1)?.to_string();
    match args.swap_remove(0) {
        Value::Object(mut obj) => {
            obj.shift_remove(&key);
            Ok(Value::Object(obj))
        }
        other => Ok(other),
    }
}
