//! Statement execution
//!
//! Every statement yields a [`Control`]. `Return` travels up to the nearest
//! body boundary ([`Executor::run_body`]); `Break` and `Continue` travel up to
//! the nearest loop. Failures travel separately as `Err`.

use std::sync::Arc;
use tracing::{debug, error};

use super::capability::{Capability, EVENT_SINK_BINDING};
use super::env::Environment;
use super::errors::RuntimeError;
use super::expressions::array_position;
use super::future::Future;
use super::types::{Control, Expr, MemberAccess, ResultValue, Stmt, SwitchCase, VarKind, Value};
use super::Executor;

/// One resolved segment of an assignment target
enum PathKey {
    Prop(String),
    Index(Value),
}

impl PathKey {
    fn describe(&self) -> String {
        match self {
            PathKey::Prop(name) => format!("'{}'", name),
            PathKey::Index(idx) => format!("[{}]", idx),
        }
    }
}

/// Write `value` at `keys` inside `target`, mutating containers in place
fn assign_path(target: &mut Value, keys: &[PathKey], value: Value) -> Result<(), RuntimeError> {
    let Some((first, rest)) = keys.split_first() else {
        *target = value;
        return Ok(());
    };

    let slot = match (first, target) {
        (PathKey::Prop(name), Value::Object(obj))
        | (PathKey::Index(Value::Str(name)), Value::Object(obj)) => {
            if rest.is_empty() {
                obj.insert(name.clone(), value);
                return Ok(());
            }
            obj.get_mut(name).ok_or_else(|| {
                RuntimeError::type_mismatch(format!(
                    "cannot assign through missing field '{}'",
                    name
                ))
            })?
        }
        (PathKey::Index(idx), Value::Array(items)) => {
            let pos = array_position(idx, items.len())?;
            &mut items[pos]
        }
        (key, other) => {
            return Err(RuntimeError::type_mismatch(format!(
                "cannot assign {} on {}",
                key.describe(),
                other.type_name()
            )))
        }
    };
    assign_path(slot, rest, value)
}

/// Loop bookkeeping for one body execution
enum Step {
    Next,
    Stop,
    Exit(Control),
}

fn step(control: Control, last: &mut Value) -> Step {
    match control {
        Control::Normal(value) => {
            *last = value;
            Step::Next
        }
        Control::Continue => Step::Next,
        Control::Break => Step::Stop,
        ret @ Control::Return(_) => Step::Exit(ret),
    }
}

fn expect_condition(what: &str, value: Value) -> Result<bool, RuntimeError> {
    match value {
        Value::Bool(b) => Ok(b),
        other => Err(RuntimeError::type_mismatch(format!(
            "{} condition must be a bool, got {}",
            what,
            other.type_name()
        ))),
    }
}

fn callee_name(expr: &Expr) -> String {
    match expr {
        Expr::Call { callee, .. } => callee_name(callee),
        Expr::Ident { name } => name.clone(),
        Expr::Member { property, .. } => property.clone(),
        _ => "expression".to_string(),
    }
}

fn body_result(control: Control) -> Result<Value, RuntimeError> {
    match control {
        Control::Normal(value) | Control::Return(value) => Ok(value),
        escaped @ (Control::Break | Control::Continue) => {
            error!(control = ?escaped, "loop control escaped its body");
            Err(RuntimeError::Internal(format!(
                "{:?} outside of a loop",
                escaped
            )))
        }
    }
}

impl Executor {
    /// Run statements in `env`, stopping at the first non-normal control
    pub fn exec_block(&self, stmts: &[Stmt], env: &Arc<Environment>) -> Result<Control, RuntimeError> {
        let mut last = Value::Null;
        for stmt in stmts {
            match self.exec_stmt(stmt, env)? {
                Control::Normal(value) => last = value,
                other => return Ok(other),
            }
        }
        Ok(Control::Normal(last))
    }

    fn exec_scoped(&self, stmts: &[Stmt], env: &Arc<Environment>) -> Result<Control, RuntimeError> {
        let child = Environment::with_parent(env);
        self.exec_block(stmts, &child)
    }

    /// Run a function, route, task or test body. A `return` ends it with its
    /// value; otherwise the value of the last statement is the result.
    pub(crate) fn run_body(&self, stmts: &[Stmt], env: &Arc<Environment>) -> Result<Value, RuntimeError> {
        body_result(self.exec_block(stmts, env)?)
    }

    /// [`Executor::run_body`] for an async body. Stops with a cancellation
    /// error at the first statement boundary after `handle` is cancelled.
    pub(crate) fn run_body_cancellable(
        &self,
        stmts: &[Stmt],
        env: &Arc<Environment>,
        handle: &Future,
    ) -> Result<Value, RuntimeError> {
        let mut last = Value::Null;
        for (idx, stmt) in stmts.iter().enumerate() {
            if handle.is_cancelled() {
                debug!(remaining = stmts.len() - idx, "async body cancelled");
                return Err(RuntimeError::Cancellation);
            }
            match self.exec_stmt(stmt, env)? {
                Control::Normal(value) => last = value,
                other => return body_result(other),
            }
        }
        Ok(last)
    }

    pub fn exec_stmt(&self, stmt: &Stmt, env: &Arc<Environment>) -> Result<Control, RuntimeError> {
        match stmt {
            Stmt::Declare {
                var_kind,
                name,
                ty,
                init,
            } => {
                let value = self.eval(init, env)?;
                if let Some(ty) = ty {
                    self.types()
                        .check_type(&value, ty, self.scope())
                        .map_err(|e| e.context(&format!("variable {}", name)))?;
                }
                match var_kind {
                    VarKind::Let => env.define(name.clone(), value.clone())?,
                    VarKind::Const => env.define_const(name.clone(), value.clone())?,
                }
                Ok(Control::Normal(value))
            }
            Stmt::Assign { var, path, value } => {
                let value = self.eval(value, env)?;
                self.assign(var, path, value.clone(), env)?;
                Ok(Control::Normal(value))
            }
            Stmt::Expr { expr } => Ok(Control::Normal(self.eval(expr, env)?)),
            Stmt::Return { value } => {
                let value = match value {
                    Some(expr) => self.eval(expr, env)?,
                    None => Value::Null,
                };
                Ok(Control::Return(value))
            }
            Stmt::If {
                test,
                then_s,
                else_s,
            } => {
                if expect_condition("if", self.eval(test, env)?)? {
                    self.exec_scoped(then_s, env)
                } else if let Some(else_s) = else_s {
                    self.exec_scoped(else_s, env)
                } else {
                    Ok(Control::Normal(Value::Null))
                }
            }
            Stmt::While { test, body } => self.exec_while(test, body, env),
            Stmt::For {
                key,
                value,
                iterable,
                body,
            } => self.exec_for(key.as_deref(), value, iterable, body, env),
            Stmt::Switch {
                value,
                cases,
                default,
            } => self.exec_switch(value, cases, default.as_deref(), env),
            Stmt::Break => Ok(Control::Break),
            Stmt::Continue => Ok(Control::Continue),
            Stmt::Assert { test, message } => {
                let outcome = self.eval(test, env)?;
                if matches!(outcome, Value::Bool(true)) {
                    return Ok(Control::Normal(Value::Null));
                }
                let msg = match message {
                    Some(expr) => self.eval(expr, env)?.to_string(),
                    None => format!("condition evaluated to {}", outcome),
                };
                Err(RuntimeError::AssertionFailure(msg))
            }
            Stmt::Validate { call } => self.exec_validate(call, env),
            Stmt::Yield { value, event_type } => {
                let value = self.eval(value, env)?;
                let sink = match env.get(EVENT_SINK_BINDING) {
                    Ok(Value::Capability(Capability::Events(sink))) => sink,
                    _ => {
                        return Err(RuntimeError::CapabilityUnavailable(
                            "yield requires an event sink".to_string(),
                        ))
                    }
                };
                sink.send_event(&value, event_type.as_deref())?;
                Ok(Control::Normal(Value::Null))
            }
            Stmt::Macro { name, .. } => Err(RuntimeError::Macro(format!(
                "macro {} was not expanded before execution",
                name
            ))),
        }
    }

    /// `x = v` rebinds; `x.a[i] = v` mutates the container bound to `x`
    fn assign(
        &self,
        var: &str,
        path: &[MemberAccess],
        value: Value,
        env: &Arc<Environment>,
    ) -> Result<(), RuntimeError> {
        if path.is_empty() {
            return env.set(var, value);
        }
        let mut keys = Vec::with_capacity(path.len());
        for segment in path {
            keys.push(match segment {
                MemberAccess::Prop { property } => PathKey::Prop(property.clone()),
                MemberAccess::Index { expr } => PathKey::Index(self.eval(expr, env)?),
            });
        }
        env.update(var, |root| assign_path(root, &keys, value))
    }

    /// The condition is evaluated in the enclosing scope so loop-carried
    /// variables persist; each iteration gets a fresh body scope.
    fn exec_while(&self, test: &Expr, body: &[Stmt], env: &Arc<Environment>) -> Result<Control, RuntimeError> {
        let limit = self.program().limits.max_loop_iterations;
        let mut iterations = 0usize;
        let mut last = Value::Null;
        while expect_condition("while", self.eval(test, env)?)? {
            iterations += 1;
            if iterations > limit {
                return Err(RuntimeError::IterationLimitExceeded(limit));
            }
            match step(self.exec_scoped(body, env)?, &mut last) {
                Step::Next => {}
                Step::Stop => break,
                Step::Exit(ret) => return Ok(ret),
            }
        }
        Ok(Control::Normal(last))
    }

    /// Arrays iterate in index order. Objects iterate their fields in an
    /// unspecified order; scripts must not depend on it.
    fn exec_for(
        &self,
        key: Option<&str>,
        value: &str,
        iterable: &Expr,
        body: &[Stmt],
        env: &Arc<Environment>,
    ) -> Result<Control, RuntimeError> {
        let entries: Vec<(Value, Value)> = match self.eval(iterable, env)? {
            Value::Array(items) => items
                .into_iter()
                .enumerate()
                .map(|(i, item)| (Value::Int(i as i64), item))
                .collect(),
            Value::Object(obj) => obj.into_iter().map(|(k, v)| (Value::Str(k), v)).collect(),
            other => {
                return Err(RuntimeError::type_mismatch(format!(
                    "cannot iterate over {}",
                    other.type_name()
                )))
            }
        };

        let mut last = Value::Null;
        for (entry_key, entry_value) in entries {
            let iter_env = Environment::with_parent(env);
            if let Some(key) = key {
                iter_env.bind(key, entry_key);
            }
            iter_env.bind(value, entry_value);
            match step(self.exec_block(body, &iter_env)?, &mut last) {
                Step::Next => {}
                Step::Stop => break,
                Step::Exit(ret) => return Ok(ret),
            }
        }
        Ok(Control::Normal(last))
    }

    /// First equal case wins; no fall-through
    fn exec_switch(
        &self,
        value: &Expr,
        cases: &[SwitchCase],
        default: Option<&[Stmt]>,
        env: &Arc<Environment>,
    ) -> Result<Control, RuntimeError> {
        let subject = self.eval(value, env)?;
        for case in cases {
            if self.eval(&case.value, env)? == subject {
                return self.exec_scoped(&case.body, env);
            }
        }
        match default {
            Some(body) => self.exec_scoped(body, env),
            None => Ok(Control::Normal(Value::Null)),
        }
    }

    /// `? check(input)`: false, an `Err` result or a failing call all
    /// become a validation failure
    fn exec_validate(&self, call: &Expr, env: &Arc<Environment>) -> Result<Control, RuntimeError> {
        match self.eval(call, env) {
            Ok(Value::Bool(false)) => Err(RuntimeError::validation(format!(
                "validation failed: {}",
                callee_name(call)
            ))),
            Ok(Value::Result(ResultValue::Err(reason))) => {
                Err(RuntimeError::validation(reason.to_string()))
            }
            Ok(value) => Ok(Control::Normal(value)),
            Err(err @ RuntimeError::ValidationFailure(_)) => Err(err),
            Err(err) => Err(RuntimeError::validation(err.to_string())),
        }
    }
}
