//! Injected capabilities
//!
//! Route and task bodies reach the outside world only through handlers the
//! embedder registers on the interpreter. Each handler implements one of the
//! traits below and method calls dispatch through a `match` on the trait
//! surface, so a script can never reach a method the trait does not expose.

use std::fmt;
use std::sync::Arc;

use super::errors::RuntimeError;
use super::types::Value;

/// Storage adapter injected as `Database`
pub trait Database: Send + Sync {
    /// Resolve `db.<name>`
    fn table(&self, name: &str) -> Result<Arc<dyn TableHandle>, RuntimeError>;
}

/// A single table or collection
pub trait TableHandle: Send + Sync {
    fn get(&self, id: &Value) -> Result<Value, RuntimeError>;
    fn find(&self, filter: &Value) -> Result<Value, RuntimeError>;
    fn all(&self) -> Result<Value, RuntimeError>;
    fn create(&self, record: Value) -> Result<Value, RuntimeError>;
    fn update(&self, id: &Value, changes: Value) -> Result<Value, RuntimeError>;
    fn delete(&self, id: &Value) -> Result<Value, RuntimeError>;
    fn count(&self, filter: Option<&Value>) -> Result<Value, RuntimeError>;
}

/// General-purpose handler for `Redis`, `MongoDB`, `LLM` and user capabilities
pub trait Service: Send + Sync {
    fn call(&self, method: &str, args: Vec<Value>) -> Result<Value, RuntimeError>;
}

/// Sink for `yield` in streaming routes
pub trait EventSink: Send + Sync {
    fn send_event(&self, value: &Value, event_type: Option<&str>) -> Result<(), RuntimeError>;
}

/// Reserved binding the executor reads for `yield`
pub const EVENT_SINK_BINDING: &str = "__event_sink";

#[derive(Clone)]
pub enum Capability {
    Database(Arc<dyn Database>),
    Table {
        name: String,
        handle: Arc<dyn TableHandle>,
    },
    Service {
        kind: String,
        handler: Arc<dyn Service>,
    },
    Events(Arc<dyn EventSink>),
}

impl Capability {
    pub fn kind(&self) -> &str {
        match self {
            Capability::Database(_) => "Database",
            Capability::Table { .. } => "Table",
            Capability::Service { kind, .. } => kind,
            Capability::Events(_) => "EventSink",
        }
    }

    pub fn same_as(&self, other: &Capability) -> bool {
        match (self, other) {
            (Capability::Database(a), Capability::Database(b)) => {
                std::ptr::addr_eq(Arc::as_ptr(a), Arc::as_ptr(b))
            }
            (Capability::Table { handle: a, .. }, Capability::Table { handle: b, .. }) => {
                std::ptr::addr_eq(Arc::as_ptr(a), Arc::as_ptr(b))
            }
            (Capability::Service { handler: a, .. }, Capability::Service { handler: b, .. }) => {
                std::ptr::addr_eq(Arc::as_ptr(a), Arc::as_ptr(b))
            }
            (Capability::Events(a), Capability::Events(b)) => {
                std::ptr::addr_eq(Arc::as_ptr(a), Arc::as_ptr(b))
            }
            _ => false,
        }
    }

    /// `capability.property`
    pub fn member(&self, property: &str) -> Result<Value, RuntimeError> {
        match self {
            Capability::Database(db) => Ok(Value::Capability(Capability::Table {
                name: property.to_string(),
                handle: db.table(property)?,
            })),
            other => Err(RuntimeError::type_mismatch(format!(
                "{} has no property '{}'",
                other.kind(),
                property
            ))),
        }
    }

    /// `capability.method(args...)`
    pub fn call_method(&self, method: &str, args: Vec<Value>) -> Result<Value, RuntimeError> {
        match self {
            Capability::Table { name, handle } => call_table(name, handle.as_ref(), method, args),
            Capability::Service { handler, .. } => handler.call(method, args),
            Capability::Events(sink) => match method {
                "send" | "sendEvent" => {
                    let value = args.first().cloned().unwrap_or(Value::Null);
                    let event_type = args.get(1).and_then(Value::as_str);
                    sink.send_event(&value, event_type)?;
                    Ok(Value::Null)
                }
                _ => Err(unknown_method("EventSink", method)),
            },
            Capability::Database(_) => Err(unknown_method("Database", method)),
        }
    }
}

fn call_table(
    table: &str,
    handle: &dyn TableHandle,
    method: &str,
    args: Vec<Value>,
) -> Result<Value, RuntimeError> {
    let argc = args.len();
    let expect = |n: usize| -> Result<(), RuntimeError> {
        if argc < n {
            return Err(RuntimeError::arity(format!(
                "{}.{} expects {} argument(s), got {}",
                table,
                method,
                n,
                argc
            )));
        }
        Ok(())
    };
    let mut args = args.into_iter();
    match method {
        "get" => {
            expect(1)?;
            handle.get(&args.next().unwrap_or(Value::Null))
        }
        "find" | "where" => {
            expect(1)?;
            handle.find(&args.next().unwrap_or(Value::Null))
        }
        "all" => handle.all(),
        "create" => {
            expect(1)?;
            handle.create(args.next().unwrap_or(Value::Null))
        }
        "update" => {
            expect(2)?;
            let id = args.next().unwrap_or(Value::Null);
            handle.update(&id, args.next().unwrap_or(Value::Null))
        }
        "delete" => {
            expect(1)?;
            handle.delete(&args.next().unwrap_or(Value::Null))
        }
        "count" => {
            let filter = args.next();
            handle.count(filter.as_ref())
        }
        _ => Err(unknown_method(table, method)),
    }
}

fn unknown_method(owner: &str, method: &str) -> RuntimeError {
    RuntimeError::type_mismatch(format!("{} has no method '{}'", owner, method))
}

impl fmt::Debug for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Capability::Table { name, .. } => write!(f, "Capability(Table {})", name),
            other => write!(f, "Capability({})", other.kind()),
        }
    }
}
