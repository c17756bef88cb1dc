//! Binary and unary operators
//!
//! One numeric rule applies to every operator: an Int/Float pair is promoted
//! to Float, Int/Int stays Int with checked arithmetic and truncating
//! division. `+` concatenates only when both sides are strings.

use std::cmp::Ordering;

use super::errors::RuntimeError;
use super::types::{BinOp, UnaryOp, Value};

enum Numeric {
    Ints(i64, i64),
    Floats(f64, f64),
}

fn numeric(left: &Value, right: &Value) -> Option<Numeric> {
    match (left, right) {
        (Value::Int(a), Value::Int(b)) => Some(Numeric::Ints(*a, *b)),
        _ => Some(Numeric::Floats(left.as_f64()?, right.as_f64()?)),
    }
}

fn unsupported(op: BinOp, left: &Value, right: &Value) -> RuntimeError {
    RuntimeError::type_mismatch(format!(
        "unsupported operand types for {}: {} and {}",
        op.symbol(),
        left.type_name(),
        right.type_name()
    ))
}

pub(super) fn expect_bool(op: &str, value: &Value) -> Result<bool, RuntimeError> {
    value.as_bool().ok_or_else(|| {
        RuntimeError::type_mismatch(format!(
            "operator {} requires bool operands, got {}",
            op,
            value.type_name()
        ))
    })
}

/// Apply a binary operator to two evaluated operands. `&&` and `||` are
/// short-circuited by the evaluator before reaching here.
pub(super) fn binary(op: BinOp, left: &Value, right: &Value) -> Result<Value, RuntimeError> {
    match op {
        BinOp::Eq => Ok(Value::Bool(left == right)),
        BinOp::Ne => Ok(Value::Bool(left != right)),
        BinOp::And => Ok(Value::Bool(
            expect_bool("&&", left)? && expect_bool("&&", right)?,
        )),
        BinOp::Or => Ok(Value::Bool(
            expect_bool("||", left)? || expect_bool("||", right)?,
        )),
        BinOp::Lt | BinOp::Le | BinOp::Gt | BinOp::Ge => compare(op, left, right),
        BinOp::Add => {
            if let (Value::Str(a), Value::Str(b)) = (left, right) {
                let mut joined = String::with_capacity(a.len() + b.len());
                joined.push_str(a);
                joined.push_str(b);
                return Ok(Value::Str(joined));
            }
            arithmetic(op, left, right)
        }
        BinOp::Sub | BinOp::Mul | BinOp::Div | BinOp::Mod => arithmetic(op, left, right),
    }
}

fn arithmetic(op: BinOp, left: &Value, right: &Value) -> Result<Value, RuntimeError> {
    let operands = numeric(left, right).ok_or_else(|| unsupported(op, left, right))?;
    match operands {
        Numeric::Ints(a, b) => {
            let result = match op {
                BinOp::Add => a.checked_add(b),
                BinOp::Sub => a.checked_sub(b),
                BinOp::Mul => a.checked_mul(b),
                BinOp::Div | BinOp::Mod if b == 0 => return Err(RuntimeError::DivisionByZero),
                BinOp::Div => a.checked_div(b),
                BinOp::Mod => a.checked_rem(b),
                _ => return Err(unsupported(op, left, right)),
            };
            result
                .map(Value::Int)
                .ok_or(RuntimeError::IntegerOverflow(op.symbol()))
        }
        Numeric::Floats(a, b) => {
            let result = match op {
                BinOp::Add => a + b,
                BinOp::Sub => a - b,
                BinOp::Mul => a * b,
                BinOp::Div | BinOp::Mod if b == 0.0 => return Err(RuntimeError::DivisionByZero),
                BinOp::Div => a / b,
                BinOp::Mod => a % b,
                _ => return Err(unsupported(op, left, right)),
            };
            Ok(Value::Float(result))
        }
    }
}

fn compare(op: BinOp, left: &Value, right: &Value) -> Result<Value, RuntimeError> {
    let ordering = match (left, right) {
        (Value::Str(a), Value::Str(b)) => Some(a.cmp(b)),
        _ => match numeric(left, right) {
            Some(Numeric::Ints(a, b)) => Some(a.cmp(&b)),
            Some(Numeric::Floats(a, b)) => a.partial_cmp(&b),
            None => return Err(unsupported(op, left, right)),
        },
    };
    // NaN compares false under every ordering operator
    let Some(ordering) = ordering else {
        return Ok(Value::Bool(false));
    };
    let result = match op {
        BinOp::Lt => ordering == Ordering::Less,
        BinOp::Le => ordering != Ordering::Greater,
        BinOp::Gt => ordering == Ordering::Greater,
        BinOp::Ge => ordering != Ordering::Less,
        _ => return Err(unsupported(op, left, right)),
    };
    Ok(Value::Bool(result))
}

pub(super) fn unary(op: UnaryOp, operand: &Value) -> Result<Value, RuntimeError> {
    match op {
        UnaryOp::Not => Ok(Value::Bool(!expect_bool("!", operand)?)),
        UnaryOp::Neg => match operand {
            Value::Int(n) => n
                .checked_neg()
                .map(Value::Int)
                .ok_or(RuntimeError::IntegerOverflow("-")),
            Value::Float(n) => Ok(Value::Float(-n)),
            other => Err(RuntimeError::type_mismatch(format!(
                "operator - requires a numeric operand, got {}",
                other.type_name()
            ))),
        },
    }
}
