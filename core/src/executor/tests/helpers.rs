//! Test helpers for executor tests
//!
//! Small AST constructors, a fresh executor per test, and in-memory
//! capability handlers.

use parking_lot::Mutex;
use serde_json::json;
use std::sync::Arc;

use crate::executor::capability::{Database, EventSink, Service, TableHandle};
use crate::executor::types::{
    BinOp, Expr, Field, LambdaBody, MatchCase, Module, Object, Pattern, Stmt, UnaryOp, VarKind,
};
use crate::executor::{Environment, Executor, Interpreter, Program, RuntimeError, Value};

/* ===================== Running ===================== */

pub fn executor() -> Executor {
    Executor::new(Arc::new(Program::default()))
}

/// Evaluate one expression in an empty scope
pub fn eval(expr: Expr) -> Result<Value, RuntimeError> {
    let exec = executor();
    let env = Environment::with_parent(&exec.program().globals);
    exec.eval(&expr, &env)
}

/// Run statements as a body in an empty scope
pub fn run(stmts: Vec<Stmt>) -> Result<Value, RuntimeError> {
    let exec = executor();
    let env = Environment::with_parent(&exec.program().globals);
    exec.run_body(&stmts, &env)
}

/// Run statements and hand back the scope they ran in
pub fn run_in(stmts: Vec<Stmt>) -> (Result<Value, RuntimeError>, Arc<Environment>) {
    let exec = executor();
    let env = Environment::with_parent(&exec.program().globals);
    let result = exec.run_body(&stmts, &env);
    (result, env)
}

/// Parse a module from its JSON AST items
pub fn module(items: serde_json::Value) -> Module {
    serde_json::from_value(json!({ "items": items })).expect("module JSON should deserialize")
}

pub fn load(items: serde_json::Value) -> Interpreter {
    let mut interp = Interpreter::new();
    interp
        .load_module(module(items))
        .expect("module should load");
    interp
}

pub fn obj(pairs: Vec<(&str, Value)>) -> Value {
    Value::Object(
        pairs
            .into_iter()
            .map(|(k, v)| (k.to_string(), v))
            .collect::<Object>(),
    )
}

/* ===================== Expressions ===================== */

pub fn int(v: i64) -> Expr {
    Expr::int(v)
}

pub fn float(v: f64) -> Expr {
    Expr::LitFloat { v }
}

pub fn s(v: &str) -> Expr {
    Expr::str(v)
}

pub fn boolean(v: bool) -> Expr {
    Expr::LitBool { v }
}

pub fn null() -> Expr {
    Expr::LitNull
}

pub fn ident(name: &str) -> Expr {
    Expr::ident(name)
}

pub fn list(elements: Vec<Expr>) -> Expr {
    Expr::LitList { elements }
}

pub fn object(props: Vec<(&str, Expr)>) -> Expr {
    Expr::LitObj {
        properties: props.into_iter().map(|(k, v)| (k.to_string(), v)).collect(),
    }
}

pub fn bin(op: BinOp, left: Expr, right: Expr) -> Expr {
    Expr::binary(op, left, right)
}

pub fn not(operand: Expr) -> Expr {
    Expr::Unary {
        op: UnaryOp::Not,
        operand: Box::new(operand),
    }
}

pub fn neg(operand: Expr) -> Expr {
    Expr::Unary {
        op: UnaryOp::Neg,
        operand: Box::new(operand),
    }
}

pub fn member(object: Expr, property: &str) -> Expr {
    Expr::Member {
        object: Box::new(object),
        property: property.to_string(),
        optional: false,
    }
}

pub fn optional_member(object: Expr, property: &str) -> Expr {
    Expr::Member {
        object: Box::new(object),
        property: property.to_string(),
        optional: true,
    }
}

pub fn index(object: Expr, idx: Expr) -> Expr {
    Expr::Index {
        object: Box::new(object),
        index: Box::new(idx),
    }
}

pub fn call(name: &str, args: Vec<Expr>) -> Expr {
    Expr::call(name, args)
}

pub fn method(object: Expr, name: &str, args: Vec<Expr>) -> Expr {
    Expr::Call {
        callee: Box::new(member(object, name)),
        type_args: Vec::new(),
        args,
    }
}

pub fn param(name: &str) -> Field {
    Field::new(name, None)
}

pub fn lambda(params: &[&str], body: Expr) -> Expr {
    Expr::Lambda {
        params: params.iter().map(|p| param(p)).collect(),
        body: LambdaBody::Expr {
            expr: Box::new(body),
        },
    }
}

pub fn lambda_block(params: &[&str], body: Vec<Stmt>) -> Expr {
    Expr::Lambda {
        params: params.iter().map(|p| param(p)).collect(),
        body: LambdaBody::Block { body },
    }
}

pub fn match_expr(value: Expr, cases: Vec<(Pattern, Option<Expr>, Expr)>) -> Expr {
    Expr::Match {
        value: Box::new(value),
        cases: cases
            .into_iter()
            .map(|(pattern, guard, body)| MatchCase {
                pattern,
                guard,
                body,
            })
            .collect(),
    }
}

pub fn async_block(body: Vec<Stmt>) -> Expr {
    Expr::Async { body }
}

pub fn await_expr(inner: Expr) -> Expr {
    Expr::Await {
        inner: Box::new(inner),
    }
}

pub fn pipe(left: Expr, right: Expr) -> Expr {
    Expr::Pipe {
        left: Box::new(left),
        right: Box::new(right),
    }
}

/* ===================== Statements ===================== */

pub fn let_(name: &str, init: Expr) -> Stmt {
    Stmt::Declare {
        var_kind: VarKind::Let,
        name: name.to_string(),
        ty: None,
        init,
    }
}

pub fn const_(name: &str, init: Expr) -> Stmt {
    Stmt::Declare {
        var_kind: VarKind::Const,
        name: name.to_string(),
        ty: None,
        init,
    }
}

pub fn assign(var: &str, value: Expr) -> Stmt {
    Stmt::Assign {
        var: var.to_string(),
        path: Vec::new(),
        value,
    }
}

pub fn expr(expr: Expr) -> Stmt {
    Stmt::Expr { expr }
}

pub fn ret(value: Expr) -> Stmt {
    Stmt::Return { value: Some(value) }
}

pub fn if_(test: Expr, then_s: Vec<Stmt>, else_s: Option<Vec<Stmt>>) -> Stmt {
    Stmt::If {
        test,
        then_s,
        else_s,
    }
}

pub fn while_(test: Expr, body: Vec<Stmt>) -> Stmt {
    Stmt::While { test, body }
}

pub fn for_(key: Option<&str>, value: &str, iterable: Expr, body: Vec<Stmt>) -> Stmt {
    Stmt::For {
        key: key.map(str::to_string),
        value: value.to_string(),
        iterable,
        body,
    }
}

/* ===================== Capabilities ===================== */

/// Table backed by a vector of objects with an `id` field
#[derive(Default)]
pub struct MemoryTable {
    pub rows: Mutex<Vec<Value>>,
}

impl MemoryTable {
    fn matches(row: &Value, filter: &Value) -> bool {
        match (row, filter) {
            (Value::Object(row), Value::Object(filter)) => {
                filter.iter().all(|(k, v)| row.get(k) == Some(v))
            }
            _ => false,
        }
    }

    fn id_of(row: &Value) -> Option<&Value> {
        match row {
            Value::Object(obj) => obj.get("id"),
            _ => None,
        }
    }
}

impl TableHandle for MemoryTable {
    fn get(&self, id: &Value) -> Result<Value, RuntimeError> {
        Ok(self
            .rows
            .lock()
            .iter()
            .find(|row| Self::id_of(row) == Some(id))
            .cloned()
            .unwrap_or(Value::Null))
    }

    fn find(&self, filter: &Value) -> Result<Value, RuntimeError> {
        Ok(Value::Array(
            self.rows
                .lock()
                .iter()
                .filter(|row| Self::matches(row, filter))
                .cloned()
                .collect(),
        ))
    }

    fn all(&self) -> Result<Value, RuntimeError> {
        Ok(Value::Array(self.rows.lock().clone()))
    }

    fn create(&self, record: Value) -> Result<Value, RuntimeError> {
        let mut rows = self.rows.lock();
        let mut record = match record {
            Value::Object(obj) => obj,
            other => {
                return Err(RuntimeError::type_mismatch(format!(
                    "create expects an object, got {}",
                    other.type_name()
                )))
            }
        };
        record
            .entry("id".to_string())
            .or_insert(Value::Int(rows.len() as i64 + 1));
        let record = Value::Object(record);
        rows.push(record.clone());
        Ok(record)
    }

    fn update(&self, id: &Value, changes: Value) -> Result<Value, RuntimeError> {
        let mut rows = self.rows.lock();
        let Some(Value::Object(row)) = rows.iter_mut().find(|row| Self::id_of(row) == Some(id))
        else {
            return Ok(Value::Null);
        };
        if let Value::Object(changes) = changes {
            row.extend(changes);
        }
        Ok(Value::Object(row.clone()))
    }

    fn delete(&self, id: &Value) -> Result<Value, RuntimeError> {
        let mut rows = self.rows.lock();
        let before = rows.len();
        rows.retain(|row| Self::id_of(row) != Some(id));
        Ok(Value::Bool(rows.len() < before))
    }

    fn count(&self, filter: Option<&Value>) -> Result<Value, RuntimeError> {
        let rows = self.rows.lock();
        let n = match filter {
            Some(filter) => rows.iter().filter(|row| Self::matches(row, filter)).count(),
            None => rows.len(),
        };
        Ok(Value::Int(n as i64))
    }
}

/// Database whose tables are all the same in-memory `users` table
#[derive(Default)]
pub struct MemoryDatabase {
    pub users: Arc<MemoryTable>,
}

impl Database for MemoryDatabase {
    fn table(&self, name: &str) -> Result<Arc<dyn TableHandle>, RuntimeError> {
        match name {
            "users" => Ok(self.users.clone()),
            other => Err(RuntimeError::UndefinedBinding(format!("table {}", other))),
        }
    }
}

/// Records every `yield`
#[derive(Default)]
pub struct RecordingSink {
    pub events: Mutex<Vec<(Value, Option<String>)>>,
}

impl EventSink for RecordingSink {
    fn send_event(&self, value: &Value, event_type: Option<&str>) -> Result<(), RuntimeError> {
        self.events
            .lock()
            .push((value.clone(), event_type.map(str::to_string)));
        Ok(())
    }
}

/// Service that echoes the method name and arguments back
pub struct EchoService;

impl Service for EchoService {
    fn call(&self, method: &str, args: Vec<Value>) -> Result<Value, RuntimeError> {
        Ok(obj(vec![
            ("method", Value::str(method)),
            ("args", Value::Array(args)),
        ]))
    }
}
