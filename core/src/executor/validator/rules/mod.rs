//! Validation Rules
//!
//! Each file in this module contains one validation rule:
//!
//! - `loop_control.rs` - `break`/`continue` outside of any loop
//! - `duplicate_param.rs` - a parameter name declared twice
//! - `unreachable_code.rs` - statements after `return`, `break` or `continue`

mod duplicate_param;
mod loop_control;
mod unreachable_code;

pub use duplicate_param::DuplicateParamRule;
pub use loop_control::LoopControlRule;
pub use unreachable_code::UnreachableCodeRule;
