//! Core types for the executor

pub mod ast;
pub mod control;
pub mod ty;
pub mod values;

pub use ast::*;
pub use control::Control;
pub use ty::Type;
pub use values::{Closure, Object, ResultValue, Value};
