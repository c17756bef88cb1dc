//! Semantic validation of loaded modules
//!
//! Runs after macro expansion and before registration to catch errors the
//! AST shape cannot rule out, such as `break` outside a loop.
//!
//! # Architecture
//!
//! 1. **ValidationRule trait** - each rule implements this trait
//! 2. **Validator** - collects and runs all rules
//! 3. **ValidationError** - the output of validation (errors, warnings)
//!
//! # Adding a New Rule
//!
//! 1. Create a new file in `validator/rules/`
//! 2. Implement `ValidationRule` for your struct
//! 3. Add it to the `Validator::new()` constructor

pub mod rules;

use crate::executor::types::{Expr, Field, Item, LambdaBody, MemberAccess, Module, Stmt};

// ============================================================================
// Validation Error Types
// ============================================================================

/// A problem found by semantic analysis
#[derive(Debug, Clone)]
pub struct ValidationError {
    /// The declaration the issue was found in, e.g. `function total`
    pub location: String,
    pub message: String,
    pub severity: Severity,
    /// Which rule produced this error
    pub rule_id: &'static str,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    /// Must be fixed; the module is rejected
    Error,
    /// Valid but probably a mistake
    Warning,
}

impl ValidationError {
    pub fn error(location: &str, message: impl Into<String>, rule_id: &'static str) -> Self {
        Self {
            location: location.to_string(),
            message: message.into(),
            severity: Severity::Error,
            rule_id,
        }
    }

    pub fn warning(location: &str, message: impl Into<String>, rule_id: &'static str) -> Self {
        Self {
            location: location.to_string(),
            message: message.into(),
            severity: Severity::Warning,
            rule_id,
        }
    }

    pub fn is_error(&self) -> bool {
        matches!(self.severity, Severity::Error)
    }
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let severity = match self.severity {
            Severity::Error => "error",
            Severity::Warning => "warning",
        };
        write!(
            f,
            "{} in {}: {} [{}]",
            severity, self.location, self.message, self.rule_id
        )
    }
}

impl std::error::Error for ValidationError {}

// ============================================================================
// ValidationRule Trait
// ============================================================================

/// Each rule checks one specific aspect of a module and must not depend on
/// the results of other rules.
pub trait ValidationRule: Send + Sync {
    /// Unique identifier, e.g. "loop-control"
    fn id(&self) -> &'static str;

    fn description(&self) -> &'static str;

    /// Issues found; empty means none
    fn validate(&self, module: &Module) -> Vec<ValidationError>;
}

// ============================================================================
// Validator - Runs All Rules
// ============================================================================

pub struct Validator {
    rules: Vec<Box<dyn ValidationRule>>,
}

impl Validator {
    pub fn new() -> Self {
        Self {
            rules: vec![
                // Error rules
                Box::new(rules::LoopControlRule),
                Box::new(rules::DuplicateParamRule),
                // Warning rules
                Box::new(rules::UnreachableCodeRule),
            ],
        }
    }

    pub fn validate(&self, module: &Module) -> Vec<ValidationError> {
        self.rules
            .iter()
            .flat_map(|rule| rule.validate(module))
            .collect()
    }

    pub fn rules(&self) -> impl Iterator<Item = (&'static str, &'static str)> + '_ {
        self.rules.iter().map(|r| (r.id(), r.description()))
    }
}

impl Default for Validator {
    fn default() -> Self {
        Self::new()
    }
}

// ============================================================================
// Public API
// ============================================================================

pub fn validate_module(module: &Module) -> Vec<ValidationError> {
    Validator::new().validate(module)
}

/// True when any issue is an error rather than a warning
pub fn has_errors(module: &Module) -> bool {
    validate_module(module).iter().any(ValidationError::is_error)
}

// ============================================================================
// AST Traversal Helpers
// ============================================================================

/// Every statement body in the module with a description of its owner
pub(crate) fn module_bodies(module: &Module) -> Vec<(String, &[Stmt])> {
    let mut bodies: Vec<(String, &[Stmt])> = Vec::new();
    for item in &module.items {
        match item {
            Item::Function(f) => bodies.push((format!("function {}", f.name), f.body.as_slice())),
            Item::TypeDef(def) => {
                for method in &def.methods {
                    bodies.push((format!("method {}.{}", def.name, method.name), method.body.as_slice()));
                }
            }
            Item::Route(r) => bodies.push((format!("route {} {}", r.method, r.path), r.body.as_slice())),
            Item::Command(c) => bodies.push((format!("command {}", c.name), c.body.as_slice())),
            Item::Cron(t) => bodies.push((format!("cron {}", t.name), t.body.as_slice())),
            Item::Event(h) => bodies.push((format!("event {}", h.event_type), h.body.as_slice())),
            Item::Queue(w) => bodies.push((format!("queue {}", w.queue), w.body.as_slice())),
            Item::Test(t) => bodies.push((format!("test {}", t.name), t.body.as_slice())),
            Item::Trait(_) | Item::Const(_) | Item::Macro(_) => {}
        }
    }
    bodies
}

/// Every declared parameter list in the module with its owner
pub(crate) fn module_params(module: &Module) -> Vec<(String, &[Field])> {
    let mut lists: Vec<(String, &[Field])> = Vec::new();
    for item in &module.items {
        match item {
            Item::Function(f) => lists.push((format!("function {}", f.name), f.params.as_slice())),
            Item::Command(c) => lists.push((format!("command {}", c.name), c.params.as_slice())),
            Item::TypeDef(def) => {
                for method in &def.methods {
                    lists.push((format!("method {}.{}", def.name, method.name), method.params.as_slice()));
                }
            }
            _ => {}
        }
    }
    lists
}

/// Expressions held directly by a statement
fn stmt_exprs(stmt: &Stmt) -> Vec<&Expr> {
    match stmt {
        Stmt::Declare { init, .. } => vec![init],
        Stmt::Assign { path, value, .. } => {
            let mut exprs: Vec<&Expr> = path
                .iter()
                .filter_map(|segment| match segment {
                    MemberAccess::Index { expr } => Some(expr),
                    MemberAccess::Prop { .. } => None,
                })
                .collect();
            exprs.push(value);
            exprs
        }
        Stmt::Expr { expr } => vec![expr],
        Stmt::Return { value } => value.iter().collect(),
        Stmt::If { test, .. } | Stmt::While { test, .. } => vec![test],
        Stmt::For { iterable, .. } => vec![iterable],
        Stmt::Switch { value, cases, .. } => {
            let mut exprs = vec![value];
            exprs.extend(cases.iter().map(|case| &case.value));
            exprs
        }
        Stmt::Assert { test, message } => {
            let mut exprs = vec![test];
            exprs.extend(message.iter());
            exprs
        }
        Stmt::Validate { call } => vec![call],
        Stmt::Yield { value, .. } => vec![value],
        Stmt::Macro { args, .. } => args.iter().collect(),
        Stmt::Break | Stmt::Continue => Vec::new(),
    }
}

/// Nested statement blocks, flagged when they are loop bodies
fn stmt_blocks(stmt: &Stmt) -> Vec<(&[Stmt], bool)> {
    match stmt {
        Stmt::If { then_s, else_s, .. } => {
            let mut blocks: Vec<(&[Stmt], bool)> = vec![(then_s.as_slice(), false)];
            if let Some(else_s) = else_s {
                blocks.push((else_s.as_slice(), false));
            }
            blocks
        }
        Stmt::While { body, .. } | Stmt::For { body, .. } => vec![(body.as_slice(), true)],
        Stmt::Switch { cases, default, .. } => {
            let mut blocks: Vec<(&[Stmt], bool)> =
                cases.iter().map(|case| (case.body.as_slice(), false)).collect();
            if let Some(default) = default {
                blocks.push((default.as_slice(), false));
            }
            blocks
        }
        _ => Vec::new(),
    }
}

/// Statement body owned by a lambda or async expression
fn expr_body(expr: &Expr) -> Option<&[Stmt]> {
    match expr {
        Expr::Lambda {
            body: LambdaBody::Block { body },
            ..
        }
        | Expr::Async { body } => Some(body.as_slice()),
        _ => None,
    }
}

/// Pre-order walk of an expression tree. Statement bodies of lambdas and
/// async blocks are not entered.
pub(crate) fn walk_expr<'a>(expr: &'a Expr, visit: &mut dyn FnMut(&'a Expr)) {
    visit(expr);
    match expr {
        Expr::LitList { elements } => elements.iter().for_each(|e| walk_expr(e, visit)),
        Expr::LitObj { properties } => properties.iter().for_each(|(_, e)| walk_expr(e, visit)),
        Expr::Binary { left, right, .. } | Expr::Pipe { left, right } => {
            walk_expr(left, visit);
            walk_expr(right, visit);
        }
        Expr::Unary { operand, .. } => walk_expr(operand, visit),
        Expr::Member { object, .. } => walk_expr(object, visit),
        Expr::Index { object, index } => {
            walk_expr(object, visit);
            walk_expr(index, visit);
        }
        Expr::Call { callee, args, .. } => {
            walk_expr(callee, visit);
            args.iter().for_each(|e| walk_expr(e, visit));
        }
        Expr::Lambda { params, body } => {
            for default in params.iter().filter_map(|p| p.default.as_ref()) {
                walk_expr(default, visit);
            }
            if let LambdaBody::Expr { expr } = body {
                walk_expr(expr, visit);
            }
        }
        Expr::Match { value, cases } => {
            walk_expr(value, visit);
            for case in cases {
                if let Some(guard) = &case.guard {
                    walk_expr(guard, visit);
                }
                walk_expr(&case.body, visit);
            }
        }
        Expr::Await { inner } => walk_expr(inner, visit),
        Expr::Macro { args, .. } => args.iter().for_each(|e| walk_expr(e, visit)),
        Expr::LitInt { .. }
        | Expr::LitFloat { .. }
        | Expr::LitStr { .. }
        | Expr::LitBool { .. }
        | Expr::LitNull
        | Expr::Ident { .. }
        | Expr::Async { .. } => {}
    }
}

/// Call `f` for `stmts` and every block nested in it, with whether the
/// block runs inside a loop. Lambda and async bodies start outside any loop.
pub(crate) fn for_each_block<'a>(
    stmts: &'a [Stmt],
    in_loop: bool,
    f: &mut dyn FnMut(&'a [Stmt], bool),
) {
    f(stmts, in_loop);
    for stmt in stmts {
        for (block, is_loop) in stmt_blocks(stmt) {
            for_each_block(block, in_loop || is_loop, f);
        }
        for expr in stmt_exprs(stmt) {
            walk_expr(expr, &mut |e| {
                if let Some(body) = expr_body(e) {
                    for_each_block(body, false, f);
                }
            });
        }
    }
}

/// Call `f` for every expression node reachable from `stmts`
pub(crate) fn for_each_expr<'a>(stmts: &'a [Stmt], f: &mut dyn FnMut(&'a Expr)) {
    for_each_block(stmts, false, &mut |block, _| {
        for stmt in block {
            for expr in stmt_exprs(stmt) {
                walk_expr(expr, f);
            }
        }
    });
}

#[cfg(test)]
mod tests;
