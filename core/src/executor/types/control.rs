//! Control flow types

use super::values::Value;

/// Outcome of executing a statement or statement list.
///
/// `Return` is consumed at the enclosing function, route, task or test
/// boundary. `Break` and `Continue` are consumed by the enclosing loop.
/// Genuine failures travel separately as `Err(RuntimeError)`.
#[derive(Debug, Clone)]
pub enum Control {
    Normal(Value),
    Return(Value),
    Break,
    Continue,
}

impl Control {
    pub fn is_normal(&self) -> bool {
        matches!(self, Control::Normal(_))
    }
}
