//! Execution engine
//!
//! An [`Executor`] evaluates expressions and runs statements against a
//! shared, read-only [`Program`] (type registry, global scope, limits). It is
//! cheap to clone: async bodies take their own copy onto another thread.
//!
//! Evaluation is split by concern:
//! - `expressions.rs` - expression evaluation and calls
//! - `operators.rs` - binary and unary operators
//! - `patterns.rs` - `match` and pattern binding
//! - `statements.rs` - statements and non-local control flow

pub mod capability;
pub mod env;
pub mod errors;
pub mod future;
pub mod interpreter;
pub mod macros;
pub mod stdlib;
pub mod typeck;
pub mod types;
pub mod validator;

mod expressions;
mod operators;
mod patterns;
mod statements;

#[cfg(test)]
mod tests;

use std::sync::Arc;
use std::time::Duration;

pub use capability::{Capability, Database, EventSink, Service, TableHandle, EVENT_SINK_BINDING};
pub use env::Environment;
pub use errors::RuntimeError;
pub use future::{Future, FutureState};
pub use interpreter::{
    Export, ImportKind, Interpreter, LoadedModule, Request, Response, TestResult,
};
pub use typeck::{TypeChecker, TypeScope};
pub use types::{Control, Module, Type, Value};

/// Hard ceilings that keep a runaway script from hanging or overflowing
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Limits {
    pub max_loop_iterations: usize,
    pub max_call_depth: usize,
    pub max_macro_depth: usize,
}

impl Default for Limits {
    fn default() -> Self {
        Self {
            max_loop_iterations: 1_000_000,
            max_call_depth: 256,
            max_macro_depth: 100,
        }
    }
}

/// Everything a loaded module shares across invocations
#[derive(Debug, Clone)]
pub struct Program {
    pub types: TypeChecker,
    /// Functions, constants and imports. Never written after load.
    pub globals: Arc<Environment>,
    pub limits: Limits,
    /// Applied to every `await` when set
    pub await_timeout: Option<Duration>,
}

impl Program {
    pub fn new(limits: Limits) -> Self {
        Self {
            types: TypeChecker::new(),
            globals: Environment::new_sealed(),
            limits,
            await_timeout: None,
        }
    }
}

impl Default for Program {
    fn default() -> Self {
        Self::new(Limits::default())
    }
}

#[derive(Debug, Clone)]
pub struct Executor {
    program: Arc<Program>,
    depth: usize,
    scope: TypeScope,
}

impl Executor {
    pub fn new(program: Arc<Program>) -> Self {
        Self {
            program,
            depth: 0,
            scope: TypeScope::new(),
        }
    }

    pub fn program(&self) -> &Arc<Program> {
        &self.program
    }

    pub fn types(&self) -> &TypeChecker {
        &self.program.types
    }

    pub fn scope(&self) -> &TypeScope {
        &self.scope
    }

    /// Executor for a nested call, one level deeper
    fn enter(&self) -> Result<Executor, RuntimeError> {
        let depth = self.depth + 1;
        if depth > self.program.limits.max_call_depth {
            return Err(RuntimeError::RecursionLimitExceeded(
                self.program.limits.max_call_depth,
            ));
        }
        Ok(Executor {
            program: Arc::clone(&self.program),
            depth,
            scope: self.scope.clone(),
        })
    }

    fn with_scope(mut self, scope: TypeScope) -> Executor {
        self.scope = scope;
        self
    }
}
