/* ===================== Type Checking ===================== */

use pretty_assertions::assert_eq;
use serde_json::json;
use std::collections::HashMap;

use super::helpers::*;
use crate::executor::types::{Field, FunctionDef, TypeDef, TypeParam};
use crate::executor::{RuntimeError, Type, TypeChecker, TypeScope, Value};

fn type_def(value: serde_json::Value) -> TypeDef {
    serde_json::from_value(value).expect("type def JSON should deserialize")
}

/// type User { name: string, age: int, nickname?: string, role: string = "member" }
fn user_def() -> TypeDef {
    type_def(json!({
        "name": "User",
        "fields": [
            { "name": "name", "ty": { "t": "Str" } },
            { "name": "age", "ty": { "t": "Int" } },
            { "name": "nickname", "ty": { "t": "Str" }, "required": false },
            { "name": "role", "ty": { "t": "Str" }, "default": { "t": "LitStr", "v": "member" } }
        ]
    }))
}

/// type Result<T, E> { value: T, error: E? }
fn result_def() -> TypeDef {
    type_def(json!({
        "name": "Result",
        "type_params": [{ "name": "T" }, { "name": "E" }],
        "fields": [
            { "name": "value", "ty": { "t": "TypeParam", "name": "T" } },
            { "name": "error", "ty": { "t": "TypeParam", "name": "E" }, "required": false }
        ]
    }))
}

fn checker() -> TypeChecker {
    let mut tc = TypeChecker::new();
    tc.register_type(user_def());
    tc.register_type(result_def());
    tc
}

fn check(tc: &TypeChecker, value: &Value, ty: &Type) -> Result<(), RuntimeError> {
    tc.check_type(value, ty, &TypeScope::new())
}

#[test]
fn test_primitive_checks() {
    let tc = TypeChecker::new();
    assert!(check(&tc, &Value::Int(1), &Type::Int).is_ok());
    assert!(check(&tc, &Value::Int(1), &Type::Float).is_ok());
    assert!(check(&tc, &Value::Float(1.0), &Type::Int).is_err());
    assert!(check(&tc, &Value::str("x"), &Type::Str).is_ok());
    assert!(check(&tc, &Value::Bool(true), &Type::Any).is_ok());

    let err = check(&tc, &Value::str("x"), &Type::Int).unwrap_err();
    assert_eq!(err.to_string(), "type mismatch: expected int, got string");
}

#[test]
fn test_null_only_fits_optional() {
    let tc = TypeChecker::new();
    assert!(check(&tc, &Value::Null, &Type::Int).is_err());
    assert!(check(&tc, &Value::Null, &Type::optional(Type::Int)).is_ok());
    assert!(check(&tc, &Value::Int(3), &Type::optional(Type::Int)).is_ok());
}

#[test]
fn test_array_elements_checked() {
    let tc = TypeChecker::new();
    let ints = Value::Array(vec![Value::Int(1), Value::Int(2)]);
    assert!(check(&tc, &ints, &Type::array(Type::Int)).is_ok());

    let mixed = Value::Array(vec![Value::Int(1), Value::str("2")]);
    let err = check(&tc, &mixed, &Type::array(Type::Int)).unwrap_err();
    assert!(err.to_string().starts_with("array element 1:"));
}

#[test]
fn test_union_check() {
    let tc = TypeChecker::new();
    let int_or_str = Type::union(vec![Type::Int, Type::Str]);
    assert!(check(&tc, &Value::Int(1), &int_or_str).is_ok());
    assert!(check(&tc, &Value::str("a"), &int_or_str).is_ok());
    assert!(check(&tc, &Value::Bool(true), &int_or_str).is_err());
}

#[test]
fn test_types_compatible() {
    let tc = TypeChecker::new();
    assert!(!tc.types_compatible(&Type::array(Type::Int), &Type::array(Type::Str)));
    assert!(tc.types_compatible(&Type::array(Type::Int), &Type::array(Type::Float)));
    assert!(tc.types_compatible(&Type::Int, &Type::Float));
    assert!(!tc.types_compatible(&Type::Float, &Type::Int));

    let int_or_str = Type::union(vec![Type::Int, Type::Str]);
    assert!(tc.types_compatible(&Type::Int, &int_or_str));
    assert!(!tc.types_compatible(&Type::Bool, &int_or_str));
    assert!(tc.types_compatible(&Type::union(vec![Type::Int]), &Type::Int));
    assert!(!tc.types_compatible(&int_or_str, &Type::Int));

    assert!(tc.types_compatible(&Type::Str, &Type::optional(Type::Str)));
    assert!(tc.types_compatible(&Type::named("object"), &Type::named("User")));
    assert!(!tc.types_compatible(&Type::named("Team"), &Type::named("User")));
}

#[test]
fn test_validate_object() {
    let tc = checker();
    let user = Type::named("User");

    let ok = obj(vec![("name", Value::str("ada")), ("age", Value::Int(36))]);
    assert!(check(&tc, &ok, &user).is_ok());

    let missing = obj(vec![("name", Value::str("ada"))]);
    let err = check(&tc, &missing, &user).unwrap_err();
    assert_eq!(err.to_string(), "missing required field: age");

    let wrong = obj(vec![("name", Value::str("ada")), ("age", Value::str("old"))]);
    let err = check(&tc, &wrong, &user).unwrap_err();
    assert!(err.to_string().starts_with("field age:"));

    // Undeclared fields are allowed
    let extra = obj(vec![
        ("name", Value::str("ada")),
        ("age", Value::Int(1)),
        ("team", Value::str("x")),
    ]);
    assert!(check(&tc, &extra, &user).is_ok());

    assert!(check(&tc, &Value::Int(1), &user).is_err());
}

#[test]
fn test_instantiate_generic_type() {
    let tc = checker();
    let concrete = tc
        .instantiate_type(&result_def(), &[Type::Int, Type::Str])
        .unwrap();

    assert!(concrete.type_params.is_empty());
    let value: &Field = &concrete.fields[0];
    let error: &Field = &concrete.fields[1];
    assert_eq!(value.name, "value");
    assert_eq!(value.ty, Some(Type::Int));
    assert!(value.required);
    assert_eq!(error.name, "error");
    assert_eq!(error.ty, Some(Type::Str));
    assert!(!error.required);
    assert!(error.default.is_none());
}

#[test]
fn test_instantiate_keeps_defaults() {
    let tc = TypeChecker::new();
    let boxed = type_def(json!({
        "name": "Box",
        "type_params": [{ "name": "T" }],
        "fields": [{ "name": "item", "ty": { "t": "TypeParam", "name": "T" }, "default": { "t": "LitNull" } }]
    }));
    let concrete = tc.instantiate_type(&boxed, &[Type::Bool]).unwrap();
    assert_eq!(concrete.fields[0].ty, Some(Type::Bool));
    assert!(concrete.fields[0].default.is_some());
}

#[test]
fn test_instantiate_wrong_arity() {
    let tc = checker();
    let err = tc.instantiate_type(&result_def(), &[Type::Int]).unwrap_err();
    assert_eq!(err.to_string(), "type Result expects 2 type arguments, got 1");
}

#[test]
fn test_generic_object_check() {
    let tc = checker();
    let ty = Type::generic(Type::named("Result"), vec![Type::Int, Type::Str]);
    assert!(check(&tc, &obj(vec![("value", Value::Int(1))]), &ty).is_ok());
    assert!(check(&tc, &obj(vec![("value", Value::str("1"))]), &ty).is_err());
}

#[test]
fn test_type_param_resolved_through_scope() {
    let tc = TypeChecker::new();
    let t = Type::param("T");
    let mut bindings = HashMap::new();
    bindings.insert("T".to_string(), Type::Int);
    let scope = TypeScope::new().extend(&bindings);

    assert!(tc.check_type(&Value::Int(1), &t, &scope).is_ok());
    assert!(tc.check_type(&Value::str("x"), &t, &scope).is_err());
    // Unbound parameters accept anything
    assert!(tc.check_type(&Value::str("x"), &t, &TypeScope::new()).is_ok());
}

#[test]
fn test_scopes_are_independent() {
    let mut int_binding = HashMap::new();
    int_binding.insert("T".to_string(), Type::Int);
    let mut str_binding = HashMap::new();
    str_binding.insert("T".to_string(), Type::Str);

    let base = TypeScope::new();
    let a = base.extend(&int_binding);
    let b = base.extend(&str_binding);
    assert_eq!(a.lookup("T"), Some(&Type::Int));
    assert_eq!(b.lookup("T"), Some(&Type::Str));
    assert!(base.is_empty());
}

#[test]
fn test_satisfies_constraint() {
    let mut tc = TypeChecker::new();
    tc.register_trait(
        serde_json::from_value(json!({ "name": "Printable", "methods": [{ "name": "print" }] }))
            .unwrap(),
    );
    tc.register_type(type_def(json!({
        "name": "Doc",
        "traits": ["Printable"],
        "methods": [{ "name": "print", "body": [] }]
    })));

    let numeric = Type::named("Numeric");
    assert!(tc.satisfies_constraint(&Type::Int, &numeric));
    assert!(tc.satisfies_constraint(&Type::Float, &numeric));
    assert!(!tc.satisfies_constraint(&Type::Str, &numeric));
    assert!(tc.satisfies_constraint(&Type::Str, &Type::named("Comparable")));
    assert!(!tc.satisfies_constraint(&Type::Float, &Type::named("Hashable")));

    let printable = Type::named("Printable");
    assert!(tc.satisfies_constraint(&Type::named("Doc"), &printable));
    assert!(!tc.satisfies_constraint(&Type::Int, &printable));
}

#[test]
fn test_serializable_constraint() {
    let mut tc = TypeChecker::new();
    tc.register_type(type_def(json!({ "name": "Point", "fields": [] })));
    let serializable = Type::named("Serializable");

    assert!(tc.satisfies_constraint(&Type::Int, &serializable));
    assert!(tc.satisfies_constraint(&Type::array(Type::optional(Type::Str)), &serializable));
    assert!(tc.satisfies_constraint(&Type::named("Point"), &serializable));
    assert!(!tc.satisfies_constraint(&Type::named("Future"), &serializable));
    assert!(!tc.satisfies_constraint(&Type::array(Type::function(vec![], Type::Int)), &serializable));
}

#[test]
fn test_constraint_enforced_on_instantiation() {
    let tc = TypeChecker::new();
    let def = TypeDef {
        name: "Stats".to_string(),
        type_params: vec![TypeParam {
            name: "N".to_string(),
            constraint: Some(Type::named("Numeric")),
        }],
        fields: vec![],
        traits: vec![],
        methods: vec![],
    };
    assert!(tc.instantiate_type(&def, &[Type::Float]).is_ok());
    let err = tc.instantiate_type(&def, &[Type::Str]).unwrap_err();
    assert!(err.to_string().contains("does not satisfy constraint Numeric"));
}

#[test]
fn test_validate_trait_impl() {
    let mut tc = TypeChecker::new();
    tc.register_trait(
        serde_json::from_value(json!({ "name": "Shape", "methods": [{ "name": "area" }] }))
            .unwrap(),
    );

    let square = type_def(json!({
        "name": "Square",
        "traits": ["Shape"],
        "methods": [{ "name": "area", "body": [] }]
    }));
    assert!(tc.validate_trait_impl(&square).is_ok());

    let blob = type_def(json!({ "name": "Blob", "traits": ["Shape"] }));
    let err = tc.validate_trait_impl(&blob).unwrap_err();
    assert_eq!(
        err.to_string(),
        "type Blob does not implement method area required by trait Shape"
    );

    let ghost = type_def(json!({ "name": "Ghost", "traits": ["Haunted"] }));
    assert!(tc.validate_trait_impl(&ghost).is_err());

    let builtin = type_def(json!({ "name": "Num", "traits": ["Comparable"] }));
    assert!(tc.validate_trait_impl(&builtin).is_ok());
}

fn identity_fn() -> FunctionDef {
    serde_json::from_value(json!({
        "name": "first",
        "type_params": [{ "name": "T" }],
        "params": [{ "name": "xs", "ty": { "t": "Array", "elem": { "t": "TypeParam", "name": "T" } } }],
        "return_type": { "t": "TypeParam", "name": "T" },
        "body": [{
            "t": "Return",
            "value": {
                "t": "Index",
                "object": { "t": "Ident", "name": "xs" },
                "index": { "t": "LitInt", "v": 0 }
            }
        }]
    }))
    .unwrap()
}

#[test]
fn test_infer_type_arguments() {
    let tc = TypeChecker::new();
    let f = identity_fn();
    let args = vec![Value::Array(vec![Value::str("a"), Value::str("b")])];
    assert_eq!(tc.infer_type_arguments(&f, &args).unwrap(), vec![Type::Str]);

    let err = tc
        .infer_type_arguments(&f, &[Value::Array(vec![])])
        .unwrap_err();
    assert!(err.to_string().contains("could not infer type for type parameter T"));
}

#[test]
fn test_instantiate_function() {
    let tc = TypeChecker::new();
    let (concrete, bindings) = tc.instantiate_function(&identity_fn(), &[Type::Int]).unwrap();
    assert!(concrete.type_params.is_empty());
    assert_eq!(concrete.params[0].ty, Some(Type::array(Type::Int)));
    assert_eq!(concrete.return_type, Some(Type::Int));
    assert_eq!(bindings.get("T"), Some(&Type::Int));
}

#[test]
fn test_generic_function_call() {
    let interp = load(json!([{
        "t": "Function",
        "name": "first",
        "type_params": [{ "name": "T" }],
        "params": [{ "name": "xs", "ty": { "t": "Array", "elem": { "t": "TypeParam", "name": "T" } } }],
        "return_type": { "t": "TypeParam", "name": "T" },
        "body": [{
            "t": "Return",
            "value": {
                "t": "Index",
                "object": { "t": "Ident", "name": "xs" },
                "index": { "t": "LitInt", "v": 0 }
            }
        }]
    }]));

    let ints = Value::Array(vec![Value::Int(4), Value::Int(5)]);
    assert_eq!(interp.call_function("first", vec![ints]).unwrap(), Value::Int(4));

    // T is inferred from the first element, so a mixed array fails the element check
    let mixed = Value::Array(vec![Value::Int(4), Value::str("5")]);
    let err = interp.call_function("first", vec![mixed]).unwrap_err();
    assert_eq!(err.kind(), "TypeMismatch");
}

#[test]
fn test_explicit_type_arguments() {
    let exec = executor();
    let f = std::sync::Arc::new(identity_fn());
    let err = exec
        .call_function(&f, &[Type::Str], vec![Value::Array(vec![Value::Int(1)])])
        .unwrap_err();
    assert!(err.to_string().contains("argument xs of function first"));

    let ok = exec
        .call_function(&f, &[Type::Float], vec![Value::Array(vec![Value::Int(1)])])
        .unwrap();
    assert_eq!(ok, Value::Int(1));
}
