//! Pattern matching

use std::sync::Arc;

use super::env::Environment;
use super::errors::RuntimeError;
use super::types::{Expr, MatchCase, Pattern, ResultValue, Value};
use super::Executor;

impl Executor {
    /// Cases are tried top to bottom in a fresh scope each. A guard that is
    /// not a bool, or that fails, aborts the whole match. No matching case
    /// yields null.
    pub(super) fn eval_match(
        &self,
        value: &Expr,
        cases: &[MatchCase],
        env: &Arc<Environment>,
    ) -> Result<Value, RuntimeError> {
        let subject = self.eval(value, env)?;
        for case in cases {
            let case_env = Environment::with_parent(env);
            if !self.match_pattern(&case.pattern, &subject, &case_env)? {
                continue;
            }
            if let Some(guard) = &case.guard {
                match self.eval(guard, &case_env)? {
                    Value::Bool(true) => {}
                    Value::Bool(false) => continue,
                    other => {
                        return Err(RuntimeError::type_mismatch(format!(
                            "match guard must evaluate to a bool, got {}",
                            other.type_name()
                        )))
                    }
                }
            }
            return self.eval(&case.body, &case_env);
        }
        Ok(Value::Null)
    }

    /// Test `value` against `pattern`, binding variables into `env`
    pub fn match_pattern(
        &self,
        pattern: &Pattern,
        value: &Value,
        env: &Arc<Environment>,
    ) -> Result<bool, RuntimeError> {
        match pattern {
            Pattern::Wildcard => Ok(true),
            Pattern::Var { name } => {
                env.bind(name.clone(), value.clone());
                Ok(true)
            }
            Pattern::Literal { value: literal } => Ok(&self.eval(literal, env)? == value),
            Pattern::Object { fields } => {
                let Value::Object(obj) = value else {
                    return Ok(false);
                };
                for field in fields {
                    let Some(field_value) = obj.get(&field.key) else {
                        return Ok(false);
                    };
                    match &field.pattern {
                        Some(sub) => {
                            if !self.match_pattern(sub, field_value, env)? {
                                return Ok(false);
                            }
                        }
                        None => env.bind(field.key.clone(), field_value.clone()),
                    }
                }
                Ok(true)
            }
            Pattern::Array { elements, rest } => {
                let Value::Array(items) = value else {
                    return Ok(false);
                };
                let fits = match rest {
                    Some(_) => items.len() >= elements.len(),
                    None => items.len() == elements.len(),
                };
                if !fits {
                    return Ok(false);
                }
                for (sub, item) in elements.iter().zip(items) {
                    if !self.match_pattern(sub, item, env)? {
                        return Ok(false);
                    }
                }
                if let Some(rest) = rest {
                    env.bind(rest.clone(), Value::Array(items[elements.len()..].to_vec()));
                }
                Ok(true)
            }
            Pattern::Ok { inner } => match value {
                Value::Result(ResultValue::Ok(payload)) => self.match_pattern(inner, payload, env),
                _ => Ok(false),
            },
            Pattern::Err { inner } => match value {
                Value::Result(ResultValue::Err(payload)) => self.match_pattern(inner, payload, env),
                _ => Ok(false),
            },
        }
    }
}
