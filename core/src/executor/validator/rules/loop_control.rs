//! Rule: Loop Control
//!
//! Reports an error when `break` or `continue` appears where no enclosing
//! `while` or `for` can receive it. A lambda or async body starts a new
//! context, so a loop around the lambda does not count.
//!
//! # Valid
//!
//! ```text
//! for item in items { if item == 0 { break } }
//! while running { switch state { case 1: { continue } } }
//! ```
//!
//! # Invalid
//!
//! ```text
//! fn f() { break }
//! for x in xs { map(xs, (y) => { continue }) }
//! ```

use crate::executor::types::{Module, Stmt};

use super::super::{for_each_block, module_bodies, ValidationError, ValidationRule};

pub struct LoopControlRule;

impl ValidationRule for LoopControlRule {
    fn id(&self) -> &'static str {
        "loop-control"
    }

    fn description(&self) -> &'static str {
        "break and continue must appear inside a loop"
    }

    fn validate(&self, module: &Module) -> Vec<ValidationError> {
        let mut errors = Vec::new();
        for (location, body) in module_bodies(module) {
            for_each_block(body, false, &mut |block, in_loop| {
                if in_loop {
                    return;
                }
                for stmt in block {
                    let keyword = match stmt {
                        Stmt::Break => "break",
                        Stmt::Continue => "continue",
                        _ => continue,
                    };
                    errors.push(ValidationError::error(
                        &location,
                        format!("'{}' outside of a loop", keyword),
                        self.id(),
                    ));
                }
            });
        }
        errors
    }
}
