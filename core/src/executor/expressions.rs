//! Expression evaluation

use std::sync::Arc;
use tracing::trace;

use super::env::Environment;
use super::errors::RuntimeError;
use super::future;
use super::operators;
use super::stdlib;
use super::typeck::TypeScope;
use super::types::{
    BinOp, Closure, Expr, Field, FunctionDef, LambdaBody, Object, Stmt, Type, Value,
};
use super::Executor;

/// `value.property`. Missing object fields read as null.
pub(super) fn member(value: &Value, property: &str) -> Result<Value, RuntimeError> {
    match value {
        Value::Object(obj) => Ok(obj.get(property).cloned().unwrap_or(Value::Null)),
        Value::Capability(cap) => cap.member(property),
        Value::Array(items) if property == "length" => Ok(Value::Int(items.len() as i64)),
        Value::Str(s) if property == "length" => Ok(Value::Int(s.chars().count() as i64)),
        Value::Null => Err(RuntimeError::type_mismatch(format!(
            "cannot access property '{}' of null",
            property
        ))),
        other => Err(RuntimeError::type_mismatch(format!(
            "cannot access property '{}' on {}",
            property,
            other.type_name()
        ))),
    }
}

/// Position of `index` in an array of `len` elements
pub(super) fn array_position(index: &Value, len: usize) -> Result<usize, RuntimeError> {
    let Value::Int(i) = index else {
        return Err(RuntimeError::type_mismatch(format!(
            "array index must be an integer, got {}",
            index.type_name()
        )));
    };
    usize::try_from(*i)
        .ok()
        .filter(|pos| *pos < len)
        .ok_or(RuntimeError::IndexOutOfBounds { index: *i, len })
}

/// `value[index]`. Missing object keys read as null.
pub(super) fn index(value: &Value, index: &Value) -> Result<Value, RuntimeError> {
    match (value, index) {
        (Value::Array(items), _) => Ok(items[array_position(index, items.len())?].clone()),
        (Value::Object(obj), Value::Str(key)) => {
            Ok(obj.get(key).cloned().unwrap_or(Value::Null))
        }
        (Value::Object(_), other) => Err(RuntimeError::type_mismatch(format!(
            "object key must be a string, got {}",
            other.type_name()
        ))),
        (Value::Str(s), _) => {
            let len = s.chars().count();
            let pos = array_position(index, len)?;
            Ok(s.chars()
                .nth(pos)
                .map(|c| Value::Str(c.to_string()))
                .unwrap_or(Value::Null))
        }
        (other, _) => Err(RuntimeError::type_mismatch(format!(
            "cannot index into {}",
            other.type_name()
        ))),
    }
}

fn arity_error(owner: &str, params: &[Field], got: usize) -> RuntimeError {
    let required = params.iter().filter(|p| p.is_mandatory()).count();
    let expected = if required == params.len() {
        format!("{}", params.len())
    } else {
        format!("{} to {}", required, params.len())
    };
    RuntimeError::arity(format!(
        "{} expects {} arguments, got {}",
        owner, expected, got
    ))
}

impl Executor {
    pub fn eval(&self, expr: &Expr, env: &Arc<Environment>) -> Result<Value, RuntimeError> {
        match expr {
            Expr::LitInt { v } => Ok(Value::Int(*v)),
            Expr::LitFloat { v } => Ok(Value::Float(*v)),
            Expr::LitStr { v } => Ok(Value::Str(v.clone())),
            Expr::LitBool { v } => Ok(Value::Bool(*v)),
            Expr::LitNull => Ok(Value::Null),
            Expr::LitList { elements } => elements
                .iter()
                .map(|e| self.eval(e, env))
                .collect::<Result<Vec<_>, _>>()
                .map(Value::Array),
            Expr::LitObj { properties } => {
                let mut obj = Object::with_capacity(properties.len());
                for (key, value) in properties {
                    obj.insert(key.clone(), self.eval(value, env)?);
                }
                Ok(Value::Object(obj))
            }
            Expr::Ident { name } => self.lookup(name, env),
            Expr::Binary { op, left, right } => self.eval_binary(*op, left, right, env),
            Expr::Unary { op, operand } => operators::unary(*op, &self.eval(operand, env)?),
            Expr::Member {
                object,
                property,
                optional,
            } => {
                let receiver = self.eval(object, env)?;
                if *optional && receiver.is_null() {
                    return Ok(Value::Null);
                }
                member(&receiver, property)
            }
            Expr::Index { object, index: idx } => {
                let container = self.eval(object, env)?;
                let key = self.eval(idx, env)?;
                index(&container, &key)
            }
            Expr::Call {
                callee,
                type_args,
                args,
            } => self.eval_call(callee, type_args, args, None, env),
            Expr::Lambda { params, body } => Ok(Value::Closure(Arc::new(Closure {
                params: params.clone(),
                body: body.clone(),
                env: Arc::clone(env),
            }))),
            Expr::Match { value, cases } => self.eval_match(value, cases, env),
            Expr::Async { body } => Ok(self.eval_async(body, env)),
            Expr::Await { inner } => self.eval_await(inner, env),
            Expr::Pipe { left, right } => self.eval_pipe(left, right, env),
            Expr::Macro { name, .. } => Err(RuntimeError::Macro(format!(
                "macro {} was not expanded before execution",
                name
            ))),
        }
    }

    /// Bound names shadow builtins
    fn lookup(&self, name: &str, env: &Arc<Environment>) -> Result<Value, RuntimeError> {
        match env.get(name) {
            Err(RuntimeError::UndefinedBinding(_)) => {
                stdlib::lookup(name).ok_or_else(|| RuntimeError::UndefinedBinding(name.to_string()))
            }
            found => found,
        }
    }

    fn eval_binary(
        &self,
        op: BinOp,
        left: &Expr,
        right: &Expr,
        env: &Arc<Environment>,
    ) -> Result<Value, RuntimeError> {
        match op {
            BinOp::And => {
                let lhs = operators::expect_bool("&&", &self.eval(left, env)?)?;
                if !lhs {
                    return Ok(Value::Bool(false));
                }
                let rhs = operators::expect_bool("&&", &self.eval(right, env)?)?;
                Ok(Value::Bool(rhs))
            }
            BinOp::Or => {
                let lhs = operators::expect_bool("||", &self.eval(left, env)?)?;
                if lhs {
                    return Ok(Value::Bool(true));
                }
                let rhs = operators::expect_bool("||", &self.eval(right, env)?)?;
                Ok(Value::Bool(rhs))
            }
            _ => {
                let lhs = self.eval(left, env)?;
                let rhs = self.eval(right, env)?;
                operators::binary(op, &lhs, &rhs)
            }
        }
    }

    fn eval_args(
        &self,
        exprs: &[Expr],
        piped: Option<Value>,
        env: &Arc<Environment>,
    ) -> Result<Vec<Value>, RuntimeError> {
        let mut args = Vec::with_capacity(exprs.len() + usize::from(piped.is_some()));
        args.extend(piped);
        for expr in exprs {
            args.push(self.eval(expr, env)?);
        }
        Ok(args)
    }

    /// Evaluate a call. `piped` is the left side of `|>`, passed first.
    fn eval_call(
        &self,
        callee: &Expr,
        type_args: &[Type],
        arg_exprs: &[Expr],
        piped: Option<Value>,
        env: &Arc<Environment>,
    ) -> Result<Value, RuntimeError> {
        let Expr::Member {
            object,
            property,
            optional,
        } = callee
        else {
            let target = self.eval(callee, env)?;
            let args = self.eval_args(arg_exprs, piped, env)?;
            return self.call_typed(&target, type_args, args);
        };

        let receiver = self.eval(object, env)?;
        if *optional && receiver.is_null() {
            return Ok(Value::Null);
        }
        let args = self.eval_args(arg_exprs, piped, env)?;
        match &receiver {
            Value::Capability(cap) => cap.call_method(property, args),
            Value::Object(obj) => match obj.get(property) {
                Some(target) => self.call_typed(target, type_args, args),
                None => Err(RuntimeError::type_mismatch(format!(
                    "object has no method '{}'",
                    property
                ))),
            },
            other => Err(RuntimeError::type_mismatch(format!(
                "cannot call method '{}' on {}",
                property,
                other.type_name()
            ))),
        }
    }

    /// Call a function, closure or builtin value
    pub fn call_value(&self, callee: &Value, args: Vec<Value>) -> Result<Value, RuntimeError> {
        self.call_typed(callee, &[], args)
    }

    fn call_typed(
        &self,
        callee: &Value,
        type_args: &[Type],
        args: Vec<Value>,
    ) -> Result<Value, RuntimeError> {
        match callee {
            Value::Function(f) => self.call_function(f, type_args, args),
            Value::Closure(c) => self.call_closure(c, args),
            Value::Builtin(func) => stdlib::call_stdlib_func(self, *func, args),
            other => Err(RuntimeError::type_mismatch(format!(
                "value of type {} is not callable",
                other.type_name()
            ))),
        }
    }

    /// Invoke a declared function. Generic functions get a fresh type scope
    /// holding their own bindings, resolved through the caller's scope.
    pub fn call_function(
        &self,
        f: &Arc<FunctionDef>,
        type_args: &[Type],
        args: Vec<Value>,
    ) -> Result<Value, RuntimeError> {
        let exec = self.enter()?;
        let exec = if f.type_params.is_empty() {
            exec.with_scope(TypeScope::new())
        } else {
            let chosen: Vec<Type> = if type_args.is_empty() {
                self.types().infer_type_arguments(f, &args)?
            } else {
                type_args.iter().map(|t| self.scope.resolve(t)).collect()
            };
            let bindings = self.types().function_bindings(f, &chosen)?;
            exec.with_scope(TypeScope::new().extend(&bindings))
        };
        trace!(function = %f.name, depth = exec.depth, "call");

        let fn_env = Environment::with_parent(&self.program.globals);
        exec.bind_params(&format!("function {}", f.name), &f.params, args, &fn_env)?;
        let result = exec.run_body(&f.body, &fn_env)?;
        if let Some(ret) = &f.return_type {
            exec.types()
                .check_type(&result, ret, &exec.scope)
                .map_err(|e| e.context(&format!("return type mismatch in {}", f.name)))?;
        }
        Ok(result)
    }

    fn call_closure(&self, closure: &Closure, args: Vec<Value>) -> Result<Value, RuntimeError> {
        let exec = self.enter()?;
        let call_env = Environment::with_parent(&closure.env);
        exec.bind_params("lambda", &closure.params, args, &call_env)?;
        match &closure.body {
            LambdaBody::Expr { expr } => exec.eval(expr, &call_env),
            LambdaBody::Block { body } => exec.run_body(body, &call_env),
        }
    }

    /// Bind call arguments to parameters: excess arguments fail, omitted
    /// ones take their default (evaluated in the call scope) or null when
    /// optional. Every bound value is checked against its declared type.
    pub(super) fn bind_params(
        &self,
        owner: &str,
        params: &[Field],
        args: Vec<Value>,
        env: &Arc<Environment>,
    ) -> Result<(), RuntimeError> {
        let got = args.len();
        if got > params.len() {
            return Err(arity_error(owner, params, got));
        }
        let mut args = args.into_iter();
        for param in params {
            let value = match args.next() {
                Some(value) => value,
                None => match &param.default {
                    Some(default) => self.eval(default, env)?,
                    None if !param.required => {
                        env.bind(param.name.clone(), Value::Null);
                        continue;
                    }
                    None => return Err(arity_error(owner, params, got)),
                },
            };
            if let Some(ty) = &param.ty {
                self.types()
                    .check_type(&value, ty, &self.scope)
                    .map_err(|e| e.context(&format!("argument {} of {}", param.name, owner)))?;
            }
            env.bind(param.name.clone(), value);
        }
        Ok(())
    }

    /// Start `body` on another thread over a snapshot of `env`. Assignments
    /// inside the body stay local to it; cancelling the future stops the body
    /// between statements.
    fn eval_async(&self, body: &[Stmt], env: &Arc<Environment>) -> Value {
        let exec = self.clone();
        let captured = env.snapshot(&self.program().globals);
        let async_env = Environment::with_parent(&captured);
        let body = body.to_vec();
        trace!(statements = body.len(), "spawning async body");
        Value::Future(future::run_async(move |handle| {
            exec.run_body_cancellable(&body, &async_env, handle)
        }))
    }

    fn eval_await(&self, inner: &Expr, env: &Arc<Environment>) -> Result<Value, RuntimeError> {
        match self.eval(inner, env)? {
            Value::Future(f) => match self.program.await_timeout {
                Some(timeout) => f.wait_timeout(timeout),
                None => f.wait(),
            },
            other => Err(RuntimeError::type_mismatch(format!(
                "await requires a future, got {}",
                other.type_name()
            ))),
        }
    }

    /// `left |> f(args)` calls `f(left, args)`; `left |> f` calls `f(left)`
    fn eval_pipe(
        &self,
        left: &Expr,
        right: &Expr,
        env: &Arc<Environment>,
    ) -> Result<Value, RuntimeError> {
        let input = self.eval(left, env)?;
        match right {
            Expr::Call {
                callee,
                type_args,
                args,
            } => self.eval_call(callee, type_args, args, Some(input), env),
            other => {
                let target = self.eval(other, env)?;
                self.call_value(&target, vec![input])
            }
        }
    }
}
