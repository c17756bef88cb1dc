//! Rule: Unreachable Code
//!
//! Warns about statements that follow a `return`, `break` or `continue` in
//! the same block. They parse fine but can never run.
//!
//! # Invalid
//!
//! ```text
//! fn f() {
//!     return 1
//!     log("never")   // unreachable
//! }
//! ```

use crate::executor::types::{Module, Stmt};

use super::super::{for_each_block, module_bodies, ValidationError, ValidationRule};

pub struct UnreachableCodeRule;

impl ValidationRule for UnreachableCodeRule {
    fn id(&self) -> &'static str {
        "unreachable-code"
    }

    fn description(&self) -> &'static str {
        "statements after return, break or continue never run"
    }

    fn validate(&self, module: &Module) -> Vec<ValidationError> {
        let mut warnings = Vec::new();
        for (location, body) in module_bodies(module) {
            for_each_block(body, false, &mut |block, _| {
                let exit = block.iter().position(|stmt| {
                    matches!(stmt, Stmt::Return { .. } | Stmt::Break | Stmt::Continue)
                });
                let Some(pos) = exit else {
                    return;
                };
                let dead = block.len() - pos - 1;
                if dead == 0 {
                    return;
                }
                let keyword = match block[pos] {
                    Stmt::Break => "break",
                    Stmt::Continue => "continue",
                    _ => "return",
                };
                warnings.push(ValidationError::warning(
                    &location,
                    format!("{} unreachable statement(s) after '{}'", dead, keyword),
                    self.id(),
                ));
            });
        }
        warnings
    }
}
