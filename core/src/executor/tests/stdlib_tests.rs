/* ===================== Strings ===================== */

use pretty_assertions::assert_eq;
use std::sync::Arc;

use super::helpers::*;
use crate::executor::types::{BinOp, Expr};
use crate::executor::{Environment, Executor, Limits, Program, RuntimeError, Value};

fn strs(items: &[&str]) -> Value {
    Value::Array(items.iter().map(|s| Value::str(*s)).collect())
}

fn ints(items: &[i64]) -> Value {
    Value::Array(items.iter().map(|n| Value::Int(*n)).collect())
}

fn int_list(items: &[i64]) -> Expr {
    list(items.iter().map(|n| int(*n)).collect())
}

fn call_ok(name: &str, args: Vec<Expr>) -> Value {
    eval(call(name, args)).unwrap_or_else(|e| panic!("{}() failed: {}", name, e))
}

#[test]
fn test_case_and_trim() {
    assert_eq!(call_ok("upper", vec![s("abc")]), Value::str("ABC"));
    assert_eq!(call_ok("lower", vec![s("AbC")]), Value::str("abc"));
    assert_eq!(call_ok("trim", vec![s("  x ")]), Value::str("x"));
}

#[test]
fn test_split_and_join() {
    assert_eq!(call_ok("split", vec![s("a,b,c"), s(",")]), strs(&["a", "b", "c"]));
    assert_eq!(call_ok("split", vec![s("ab"), s("")]), strs(&["a", "b"]));
    assert_eq!(
        call_ok("join", vec![list(vec![s("a"), int(1)]), s("-")]),
        Value::str("a-1")
    );
}

#[test]
fn test_search_functions() {
    assert_eq!(call_ok("contains", vec![s("hello"), s("ell")]), Value::Bool(true));
    assert_eq!(call_ok("contains", vec![int_list(&[1, 2]), int(3)]), Value::Bool(false));
    assert_eq!(call_ok("startsWith", vec![s("hello"), s("he")]), Value::Bool(true));
    assert_eq!(call_ok("endsWith", vec![s("hello"), s("lo")]), Value::Bool(true));
    assert_eq!(call_ok("indexOf", vec![s("héllo"), s("l")]), Value::Int(2));
    assert_eq!(call_ok("indexOf", vec![s("abc"), s("z")]), Value::Int(-1));
    assert_eq!(call_ok("indexOf", vec![int_list(&[5, 6]), int(6)]), Value::Int(1));
}

#[test]
fn test_replace_substring_char_at() {
    assert_eq!(
        call_ok("replace", vec![s("a-b-c"), s("-"), s("+")]),
        Value::str("a+b+c")
    );
    assert_eq!(call_ok("substring", vec![s("hello"), int(1), int(3)]), Value::str("el"));
    assert_eq!(call_ok("substring", vec![s("hi"), int(1), int(10)]), Value::str("i"));
    assert!(eval(call("substring", vec![s("hi"), int(2), int(1)])).is_err());
    assert_eq!(call_ok("charAt", vec![s("abc"), int(2)]), Value::str("c"));
    assert!(matches!(
        eval(call("charAt", vec![s("abc"), int(3)])),
        Err(RuntimeError::IndexOutOfBounds { index: 3, len: 3 })
    ));
}

#[test]
fn test_string_arg_errors() {
    let err = eval(call("upper", vec![int(1)])).unwrap_err();
    assert_eq!(
        err.to_string(),
        "upper() expects first argument to be a string, got int"
    );
    let err = eval(call("upper", vec![])).unwrap_err();
    assert_eq!(err.to_string(), "upper() expects 1 argument, got 0");
}

/* ===================== Conversion ===================== */

#[test]
fn test_length_and_to_string() {
    assert_eq!(call_ok("length", vec![s("héllo")]), Value::Int(5));
    assert_eq!(call_ok("length", vec![int_list(&[1, 2, 3])]), Value::Int(3));
    assert_eq!(call_ok("length", vec![object(vec![("a", int(1))])]), Value::Int(1));
    assert!(eval(call("length", vec![int(1)])).is_err());
    assert_eq!(call_ok("toString", vec![int(12)]), Value::str("12"));
    assert_eq!(call_ok("toString", vec![boolean(false)]), Value::str("false"));
}

#[test]
fn test_parse_numbers() {
    assert_eq!(call_ok("parseInt", vec![s(" 42 ")]), Value::Int(42));
    assert_eq!(call_ok("parseFloat", vec![s("2.5")]), Value::Float(2.5));
    let err = eval(call("parseInt", vec![s("4x")])).unwrap_err();
    assert!(err.to_string().starts_with("parseInt() failed to parse '4x'"));
}

#[test]
fn test_type_of() {
    assert_eq!(call_ok("typeOf", vec![int(1)]), Value::str("int"));
    assert_eq!(call_ok("typeOf", vec![s("x")]), Value::str("string"));
    assert_eq!(call_ok("typeOf", vec![null()]), Value::str("null"));
    assert_eq!(call_ok("typeOf", vec![int_list(&[])]), Value::str("array"));
}

/* ===================== Math ===================== */

#[test]
fn test_math() {
    assert_eq!(call_ok("abs", vec![int(-3)]), Value::Int(3));
    assert_eq!(call_ok("abs", vec![float(-1.5)]), Value::Float(1.5));
    assert_eq!(call_ok("min", vec![int(3), int(2)]), Value::Int(2));
    assert_eq!(call_ok("max", vec![int(3), float(4.5)]), Value::Float(4.5));
    assert_eq!(call_ok("floor", vec![float(2.7)]), Value::Int(2));
    assert_eq!(call_ok("ceil", vec![float(2.1)]), Value::Int(3));
    assert_eq!(call_ok("round", vec![float(2.5)]), Value::Int(3));
    assert_eq!(call_ok("round", vec![int(7)]), Value::Int(7));
    assert!(eval(call("abs", vec![s("x")])).is_err());
}

#[test]
fn test_random_int_in_range() {
    for _ in 0..50 {
        let Value::Int(n) = call_ok("randomInt", vec![int(1), int(3)]) else {
            panic!("expected int");
        };
        assert!((1..=3).contains(&n));
    }
    assert!(eval(call("randomInt", vec![int(3), int(1)])).is_err());
}

#[test]
fn test_generate_id_and_now() {
    let Value::Str(a) = call_ok("generateId", vec![]) else {
        panic!("expected string");
    };
    let Value::Str(b) = call_ok("generateId", vec![]) else {
        panic!("expected string");
    };
    assert_ne!(a, b);
    assert!(uuid::Uuid::parse_str(&a).is_ok());

    let Value::Int(now) = call_ok("now", vec![]) else {
        panic!("expected int");
    };
    assert!(now > 1_600_000_000);

    // time.now() resolves through the time namespace
    let Value::Int(via_namespace) = eval(method(ident("time"), "now", vec![])).unwrap() else {
        panic!("expected int");
    };
    assert!(via_namespace >= now);
}

/* ===================== Collections ===================== */

#[test]
fn test_append_does_not_mutate() {
    let (result, env) = run_in(vec![
        let_("xs", int_list(&[1])),
        let_("ys", call("append", vec![ident("xs"), int(2)])),
    ]);
    result.unwrap();
    assert_eq!(env.get("xs").unwrap(), ints(&[1]));
    assert_eq!(env.get("ys").unwrap(), ints(&[1, 2]));
}

#[test]
fn test_map_filter_reduce() {
    let doubled = call(
        "map",
        vec![int_list(&[1, 2, 3]), lambda(&["x"], bin(BinOp::Mul, ident("x"), int(2)))],
    );
    assert_eq!(eval(doubled).unwrap(), ints(&[2, 4, 6]));

    let evens = call(
        "filter",
        vec![
            int_list(&[1, 2, 3, 4]),
            lambda(&["x"], bin(BinOp::Eq, bin(BinOp::Mod, ident("x"), int(2)), int(0))),
        ],
    );
    assert_eq!(eval(evens).unwrap(), ints(&[2, 4]));

    let sum = call(
        "reduce",
        vec![
            int_list(&[1, 2, 3, 4]),
            lambda(&["acc", "x"], bin(BinOp::Add, ident("acc"), ident("x"))),
            int(0),
        ],
    );
    assert_eq!(eval(sum).unwrap(), Value::Int(10));
}

#[test]
fn test_map_with_builtin_value() {
    assert_eq!(
        eval(call("map", vec![list(vec![s("a"), s("b")]), ident("upper")])).unwrap(),
        strs(&["A", "B"])
    );
}

#[test]
fn test_callback_error_has_context() {
    let err = eval(call(
        "map",
        vec![int_list(&[1, 0]), lambda(&["x"], bin(BinOp::Div, int(1), ident("x")))],
    ))
    .unwrap_err();
    // Division by zero keeps its kind
    assert!(matches!(err, RuntimeError::DivisionByZero));

    let err = eval(call(
        "map",
        vec![int_list(&[1, 2]), lambda(&["x"], bin(BinOp::Add, ident("x"), s("!")))],
    ))
    .unwrap_err();
    assert!(err.to_string().starts_with("map() callback at index 0:"));
}

#[test]
fn test_find_some_every() {
    let gt = |n| lambda(&["x"], bin(BinOp::Gt, ident("x"), int(n)));
    assert_eq!(eval(call("find", vec![int_list(&[1, 5, 7]), gt(4)])).unwrap(), Value::Int(5));
    assert_eq!(eval(call("find", vec![int_list(&[1]), gt(4)])).unwrap(), Value::Null);
    assert_eq!(eval(call("some", vec![int_list(&[1, 5]), gt(4)])).unwrap(), Value::Bool(true));
    assert_eq!(eval(call("every", vec![int_list(&[1, 5]), gt(0)])).unwrap(), Value::Bool(true));
    assert_eq!(eval(call("every", vec![int_list(&[1, 5]), gt(1)])).unwrap(), Value::Bool(false));
}

#[test]
fn test_sort() {
    assert_eq!(call_ok("sort", vec![int_list(&[3, 1, 2])]), ints(&[1, 2, 3]));
    assert_eq!(
        call_ok("sort", vec![list(vec![s("b"), s("a")])]),
        strs(&["a", "b"])
    );

    // Descending with a numeric comparator
    let desc = lambda(&["a", "b"], bin(BinOp::Sub, ident("b"), ident("a")));
    assert_eq!(
        eval(call("sort", vec![int_list(&[1, 3, 2]), desc])).unwrap(),
        ints(&[3, 2, 1])
    );

    let err = eval(call("sort", vec![list(vec![int(1), s("a")])])).unwrap_err();
    assert!(err.to_string().contains("sort() cannot compare"));
}

#[test]
fn test_sort_is_stable() {
    let by_key = lambda(
        &["a", "b"],
        bin(BinOp::Lt, member(ident("a"), "k"), member(ident("b"), "k")),
    );
    let rows = list(vec![
        object(vec![("k", int(1)), ("id", s("first"))]),
        object(vec![("k", int(0)), ("id", s("zero"))]),
        object(vec![("k", int(1)), ("id", s("second"))]),
    ]);
    let sorted = eval(call("map", vec![
        call("sort", vec![rows, by_key]),
        lambda(&["r"], member(ident("r"), "id")),
    ]))
    .unwrap();
    assert_eq!(sorted, strs(&["zero", "first", "second"]));
}

#[test]
fn test_reverse_flat_slice_range() {
    assert_eq!(call_ok("reverse", vec![int_list(&[1, 2, 3])]), ints(&[3, 2, 1]));
    assert_eq!(
        call_ok("flat", vec![list(vec![int_list(&[1, 2]), int(3), int_list(&[4])])]),
        ints(&[1, 2, 3, 4])
    );
    assert_eq!(call_ok("slice", vec![int_list(&[1, 2, 3, 4]), int(1), int(3)]), ints(&[2, 3]));
    assert_eq!(call_ok("slice", vec![int_list(&[1, 2]), int(5), int(9)]), ints(&[]));
    assert_eq!(call_ok("range", vec![int(3)]), ints(&[0, 1, 2]));
    assert_eq!(call_ok("range", vec![int(1), int(4)]), ints(&[1, 2, 3]));
    assert_eq!(call_ok("range", vec![int(5), int(0), int(-2)]), ints(&[5, 3, 1]));
    assert!(eval(call("range", vec![int(0), int(5), int(0)])).is_err());
}

#[test]
fn test_range_bounded_by_loop_limit() {
    let err = eval(call("range", vec![int(0), int(10_000_000_000)])).unwrap_err();
    assert!(matches!(err, RuntimeError::IterationLimitExceeded(1_000_000)));
    let err = eval(call("range", vec![int(i64::MIN), int(i64::MAX)])).unwrap_err();
    assert!(matches!(err, RuntimeError::IterationLimitExceeded(_)));

    let exec = Executor::new(Arc::new(Program::new(Limits {
        max_loop_iterations: 10,
        ..Limits::default()
    })));
    let env = Environment::with_parent(&exec.program().globals);
    let ten = exec.eval(&call("range", vec![int(10)]), &env).unwrap();
    assert_eq!(ten, ints(&[0, 1, 2, 3, 4, 5, 6, 7, 8, 9]));
    let err = exec.eval(&call("range", vec![int(11)]), &env).unwrap_err();
    assert_eq!(err.to_string(), "loop exceeded maximum iterations (10)");
}

#[test]
fn test_object_functions() {
    let o = || object(vec![("a", int(1)), ("b", int(2))]);
    assert_eq!(call_ok("keys", vec![o()]), strs(&["a", "b"]));
    assert_eq!(call_ok("values", vec![o()]), ints(&[1, 2]));
    assert_eq!(call_ok("has", vec![o(), s("a")]), Value::Bool(true));
    assert_eq!(call_ok("has", vec![o(), s("z")]), Value::Bool(false));
    assert_eq!(
        call_ok("set", vec![o(), s("c"), int(3)]),
        obj(vec![("a", Value::Int(1)), ("b", Value::Int(2)), ("c", Value::Int(3))])
    );
    assert_eq!(
        call_ok("remove", vec![o(), s("a")]),
        obj(vec![("b", Value::Int(2))])
    );
}

/* ===================== Results ===================== */

#[test]
fn test_result_functions() {
    let ok = || call("Ok", vec![int(1)]);
    let err = || call("Err", vec![s("bad")]);

    assert_eq!(call_ok("isOk", vec![ok()]), Value::Bool(true));
    assert_eq!(call_ok("isErr", vec![err()]), Value::Bool(true));
    assert_eq!(call_ok("unwrap", vec![ok()]), Value::Int(1));
    assert_eq!(call_ok("unwrapOr", vec![err(), int(9)]), Value::Int(9));
    assert_eq!(call_ok("unwrapErr", vec![err()]), Value::str("bad"));

    let e = eval(call("unwrap", vec![err()])).unwrap_err();
    assert_eq!(e.to_string(), "unwrap() called on Err(bad)");
    assert!(eval(call("isOk", vec![int(1)])).is_err());
}

#[test]
fn test_result_json_rendering() {
    assert_eq!(
        call_ok("Ok", vec![int(1)]).to_json(),
        serde_json::json!({ "ok": 1 })
    );
    assert_eq!(
        call_ok("Err", vec![s("x")]).to_json(),
        serde_json::json!({ "err": "x" })
    );
}
