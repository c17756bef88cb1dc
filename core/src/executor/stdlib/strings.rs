//! String functions. Offsets are in characters, not bytes.

use super::{array_arg, expect_args, int_arg, str_arg};
use crate::executor::errors::RuntimeError;
use crate::executor::types::Value;

pub fn upper(args: &[Value]) -> Result<Value, RuntimeError> {
    expect_args("upper", args, 1)?;
    Ok(Value::Str(str_arg("upper", args, 0)?.to_uppercase()))
}

pub fn lower(args: &[Value]) -> Result<Value, RuntimeError> {
    expect_args("lower", args, 1)?;
    Ok(Value::Str(str_arg("lower", args, 0)?.to_lowercase()))
}

pub fn trim(args: &[Value]) -> Result<Value, RuntimeError> {
    expect_args("trim", args, 1)?;
    Ok(Value::str(str_arg("trim", args, 0)?.trim()))
}

pub fn split(args: &[Value]) -> Result<Value, RuntimeError> {
    expect_args("split", args, 2)?;
    let s = str_arg("split", args, 0)?;
    let sep = str_arg("split", args, 1)?;
    let parts = if sep.is_empty() {
        s.chars().map(|c| Value::Str(c.to_string())).collect()
    } else {
        s.split(sep).map(Value::str).collect()
    };
    Ok(Value::Array(parts))
}

pub fn join(args: &[Value]) -> Result<Value, RuntimeError> {
    expect_args("join", args, 2)?;
    let items = array_arg("join", args, 0)?;
    let sep = str_arg("join", args, 1)?;
    let parts: Vec<String> = items.iter().map(ToString::to_string).collect();
    Ok(Value::Str(parts.join(sep)))
}

pub fn contains(args: &[Value]) -> Result<Value, RuntimeError> {
    expect_args("contains", args, 2)?;
    if let Value::Array(items) = &args[0] {
        return Ok(Value::Bool(items.contains(&args[1])));
    }
    let s = str_arg("contains", args, 0)?;
    let needle = str_arg("contains", args, 1)?;
    Ok(Value::Bool(s.contains(needle)))
}

pub fn replace(args: &[Value]) -> Result<Value, RuntimeError> {
    expect_args("replace", args, 3)?;
    let s = str_arg("replace", args, 0)?;
    let from = str_arg("replace", args, 1)?;
    let to = str_arg("replace", args, 2)?;
    Ok(Value::Str(s.replace(from, to)))
}

pub fn substring(args: &[Value]) -> Result<Value, RuntimeError> {
    expect_args("substring", args, 3)?;
    let s = str_arg("substring", args, 0)?;
    let start = int_arg("substring", args, 1)?;
    let end = int_arg("substring", args, 2)?;
    if start < 0 || end < 0 {
        return Err(RuntimeError::type_mismatch("substring() indices must be non-negative"));
    }
    if start > end {
        return Err(RuntimeError::type_mismatch(
            "substring() start index must be less than or equal to end index",
        ));
    }
    let chars: Vec<char> = s.chars().collect();
    let end = (end as usize).min(chars.len());
    let start = (start as usize).min(end);
    Ok(Value::Str(chars[start..end].iter().collect()))
}

pub fn starts_with(args: &[Value]) -> Result<Value, RuntimeError> {
    expect_args("startsWith", args, 2)?;
    let s = str_arg("startsWith", args, 0)?;
    Ok(Value::Bool(s.starts_with(str_arg("startsWith", args, 1)?)))
}

pub fn ends_with(args: &[Value]) -> Result<Value, RuntimeError> {
    expect_args("endsWith", args, 2)?;
    let s = str_arg("endsWith", args, 0)?;
    Ok(Value::Bool(s.ends_with(str_arg("endsWith", args, 1)?)))
}

/// Character offset of the first occurrence, or -1
pub fn index_of(args: &[Value]) -> Result<Value, RuntimeError> {
    expect_args("indexOf", args, 2)?;
    if let Value::Array(items) = &args[0] {
        let pos = items.iter().position(|item| item == &args[1]);
        return Ok(Value::Int(pos.map_or(-1, |p| p as i64)));
    }
    let s = str_arg("indexOf", args, 0)?;
    let needle = str_arg("indexOf", args, 1)?;
    let index = s
        .find(needle)
        .map_or(-1, |byte| s[..byte].chars().count() as i64);
    Ok(Value::Int(index))
}

pub fn char_at(args: &[Value]) -> Result<Value, RuntimeError> {
    expect_args("charAt", args, 2)?;
    let s = str_arg("charAt", args, 0)?;
    let index = int_arg("charAt", args, 1)?;
    let len = s.chars().count();
    usize::try_from(index)
        .ok()
        .and_then(|i| s.chars().nth(i))
        .map(|c| Value::Str(c.to_string()))
        .ok_or(RuntimeError::IndexOutOfBounds { index, len })
}
