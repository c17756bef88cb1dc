//! Rule: Duplicate Parameter
//!
//! Reports an error when a function, method, command or lambda declares the
//! same parameter name twice. The second binding would fail at call time.

use std::collections::HashSet;

use crate::executor::types::{Expr, Field, Module};

use super::super::{for_each_expr, module_bodies, module_params, ValidationError, ValidationRule};

pub struct DuplicateParamRule;

impl DuplicateParamRule {
    fn check(&self, location: &str, params: &[Field], errors: &mut Vec<ValidationError>) {
        let mut seen = HashSet::new();
        for param in params {
            if !seen.insert(param.name.as_str()) {
                errors.push(ValidationError::error(
                    location,
                    format!("parameter '{}' is declared more than once", param.name),
                    self.id(),
                ));
            }
        }
    }
}

impl ValidationRule for DuplicateParamRule {
    fn id(&self) -> &'static str {
        "duplicate-param"
    }

    fn description(&self) -> &'static str {
        "parameter names must be unique within one declaration"
    }

    fn validate(&self, module: &Module) -> Vec<ValidationError> {
        let mut errors = Vec::new();
        for (location, params) in module_params(module) {
            self.check(&location, params, &mut errors);
        }
        for (location, body) in module_bodies(module) {
            for_each_expr(body, &mut |expr| {
                if let Expr::Lambda { params, .. } = expr {
                    self.check(&format!("lambda in {}", location), params, &mut errors);
                }
            });
        }
        errors
    }
}
