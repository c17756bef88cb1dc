//! Tests for the semantic validation system

use serde_json::json;

use super::*;

// ============================================================================
// Helper Functions
// ============================================================================

fn module(items: serde_json::Value) -> Module {
    serde_json::from_value(json!({ "items": items })).expect("module JSON should deserialize")
}

/// A module holding one function `f` with the given body
fn function(body: serde_json::Value) -> Module {
    module(json!([{ "t": "Function", "name": "f", "params": [], "body": body }]))
}

fn has_rule(errors: &[ValidationError], rule_id: &str) -> bool {
    errors.iter().any(|e| e.rule_id == rule_id)
}

fn for_rule<'a>(errors: &'a [ValidationError], rule_id: &str) -> Vec<&'a ValidationError> {
    errors.iter().filter(|e| e.rule_id == rule_id).collect()
}

fn truthy() -> serde_json::Value {
    json!({ "t": "LitBool", "v": true })
}

// ============================================================================
// Loop Control Tests
// ============================================================================

#[test]
fn test_break_outside_loop() {
    let errors = validate_module(&function(json!([{ "t": "Break" }])));

    let loop_errors = for_rule(&errors, "loop-control");
    assert_eq!(loop_errors.len(), 1);
    assert!(loop_errors[0].is_error());
    assert!(loop_errors[0].message.contains("'break'"));
    assert_eq!(loop_errors[0].location, "function f");
}

#[test]
fn test_break_inside_while_is_valid() {
    let errors = validate_module(&function(json!([
        { "t": "While", "test": truthy(), "body": [{ "t": "Break" }] }
    ])));
    assert!(!has_rule(&errors, "loop-control"));
}

#[test]
fn test_continue_in_switch_inside_for_is_valid() {
    let errors = validate_module(&function(json!([
        {
            "t": "For",
            "value": "x",
            "iterable": { "t": "Ident", "name": "xs" },
            "body": [{
                "t": "Switch",
                "value": { "t": "Ident", "name": "x" },
                "cases": [{ "value": { "t": "LitInt", "v": 1 }, "body": [{ "t": "Continue" }] }]
            }]
        }
    ])));
    assert!(!has_rule(&errors, "loop-control"));
}

#[test]
fn test_lambda_body_resets_loop_context() {
    let lambda = json!({
        "t": "Lambda",
        "params": [{ "name": "y" }],
        "body": { "t": "Block", "body": [{ "t": "Continue" }] }
    });
    let errors = validate_module(&function(json!([
        {
            "t": "While",
            "test": truthy(),
            "body": [{ "t": "Expr", "expr": lambda }]
        }
    ])));

    let loop_errors = for_rule(&errors, "loop-control");
    assert_eq!(loop_errors.len(), 1);
    assert!(loop_errors[0].message.contains("'continue'"));
}

#[test]
fn test_break_in_route_body() {
    let errors = validate_module(&module(json!([
        { "t": "Route", "path": "/x", "method": "GET", "body": [{ "t": "Break" }] }
    ])));
    let loop_errors = for_rule(&errors, "loop-control");
    assert_eq!(loop_errors.len(), 1);
    assert_eq!(loop_errors[0].location, "route GET /x");
}

// ============================================================================
// Duplicate Parameter Tests
// ============================================================================

#[test]
fn test_duplicate_function_param() {
    let errors = validate_module(&module(json!([
        {
            "t": "Function",
            "name": "add",
            "params": [{ "name": "a" }, { "name": "a" }],
            "body": []
        }
    ])));

    let dups = for_rule(&errors, "duplicate-param");
    assert_eq!(dups.len(), 1);
    assert!(dups[0].message.contains("'a'"));
}

#[test]
fn test_duplicate_lambda_param() {
    let lambda = json!({
        "t": "Lambda",
        "params": [{ "name": "x" }, { "name": "x" }],
        "body": { "t": "Expr", "expr": { "t": "Ident", "name": "x" } }
    });
    let errors = validate_module(&function(json!([{ "t": "Expr", "expr": lambda }])));

    let dups = for_rule(&errors, "duplicate-param");
    assert_eq!(dups.len(), 1);
    assert_eq!(dups[0].location, "lambda in function f");
}

#[test]
fn test_distinct_params_are_valid() {
    let errors = validate_module(&module(json!([
        {
            "t": "Command",
            "name": "greet",
            "params": [{ "name": "name" }, { "name": "greeting" }],
            "body": []
        }
    ])));
    assert!(errors.is_empty());
}

// ============================================================================
// Unreachable Code Tests
// ============================================================================

#[test]
fn test_statement_after_return_warns() {
    let module = function(json!([
        { "t": "Return", "value": { "t": "LitInt", "v": 1 } },
        { "t": "Expr", "expr": { "t": "LitInt", "v": 2 } }
    ]));
    let errors = validate_module(&module);

    let warnings = for_rule(&errors, "unreachable-code");
    assert_eq!(warnings.len(), 1);
    assert!(!warnings[0].is_error());
    assert!(warnings[0].message.contains("'return'"));
    assert!(!has_errors(&module));
}

#[test]
fn test_return_as_last_statement_is_fine() {
    let errors = validate_module(&function(json!([
        { "t": "Expr", "expr": { "t": "LitInt", "v": 2 } },
        { "t": "Return" }
    ])));
    assert!(!has_rule(&errors, "unreachable-code"));
}

// ============================================================================
// Validator Tests
// ============================================================================

#[test]
fn test_validator_lists_rules() {
    let validator = Validator::new();
    let ids: Vec<&str> = validator.rules().map(|(id, _)| id).collect();
    assert_eq!(ids, vec!["loop-control", "duplicate-param", "unreachable-code"]);
}

#[test]
fn test_display_format() {
    let err = ValidationError::error("function f", "'break' outside of a loop", "loop-control");
    assert_eq!(
        err.to_string(),
        "error in function f: 'break' outside of a loop [loop-control]"
    );
}

#[test]
fn test_macro_items_are_skipped() {
    let errors = validate_module(&module(json!([
        { "t": "Macro", "name": "m", "params": [], "body": [{ "t": "Break" }] }
    ])));
    assert!(errors.is_empty());
}
