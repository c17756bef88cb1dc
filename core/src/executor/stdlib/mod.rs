//! Standard library function implementations
//!
//! Builtins are resolved by name only when the name is not bound in the
//! environment, so user definitions always shadow them. Each builtin is a
//! [`StdlibFunc`] variant that can also be passed around as a value.

pub mod collections;
pub mod convert;
pub mod futures;
pub mod math;
pub mod results;
pub mod strings;

use super::errors::RuntimeError;
use super::types::{Object, Value};
use super::Executor;

/* ===================== Standard Library Function Types ===================== */

/// Standard library function identifiers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StdlibFunc {
    // strings
    StrUpper,
    StrLower,
    StrTrim,
    StrSplit,
    StrJoin,
    StrContains,
    StrReplace,
    StrSubstring,
    StrStartsWith,
    StrEndsWith,
    StrIndexOf,
    StrCharAt,
    // conversion
    Length,
    ToString,
    ParseInt,
    ParseFloat,
    TypeOf,
    // math
    MathAbs,
    MathMin,
    MathMax,
    MathFloor,
    MathCeil,
    MathRound,
    RandomInt,
    GenerateId,
    TimeNow,
    // collections
    ListAppend,
    ListMap,
    ListFilter,
    ListReduce,
    ListFind,
    ListSome,
    ListEvery,
    ListSort,
    ListReverse,
    ListFlat,
    ListSlice,
    ListRange,
    ObjKeys,
    ObjValues,
    ObjHas,
    ObjSet,
    ObjRemove,
    // results
    ResultOk,
    ResultErr,
    ResultIsOk,
    ResultIsErr,
    ResultUnwrap,
    ResultUnwrapOr,
    ResultUnwrapErr,
    // futures
    FutureAll,
    FutureRace,
    FutureAny,
    FutureCancel,
    FutureAwaitTimeout,
    FutureIsCancelled,
}

const NAMES: &[(&str, StdlibFunc)] = &[
    ("upper", StdlibFunc::StrUpper),
    ("lower", StdlibFunc::StrLower),
    ("trim", StdlibFunc::StrTrim),
    ("split", StdlibFunc::StrSplit),
    ("join", StdlibFunc::StrJoin),
    ("contains", StdlibFunc::StrContains),
    ("replace", StdlibFunc::StrReplace),
    ("substring", StdlibFunc::StrSubstring),
    ("startsWith", StdlibFunc::StrStartsWith),
    ("endsWith", StdlibFunc::StrEndsWith),
    ("indexOf", StdlibFunc::StrIndexOf),
    ("charAt", StdlibFunc::StrCharAt),
    ("length", StdlibFunc::Length),
    ("toString", StdlibFunc::ToString),
    ("parseInt", StdlibFunc::ParseInt),
    ("parseFloat", StdlibFunc::ParseFloat),
    ("typeOf", StdlibFunc::TypeOf),
    ("abs", StdlibFunc::MathAbs),
    ("min", StdlibFunc::MathMin),
    ("max", StdlibFunc::MathMax),
    ("floor", StdlibFunc::MathFloor),
    ("ceil", StdlibFunc::MathCeil),
    ("round", StdlibFunc::MathRound),
    ("randomInt", StdlibFunc::RandomInt),
    ("generateId", StdlibFunc::GenerateId),
    ("now", StdlibFunc::TimeNow),
    ("append", StdlibFunc::ListAppend),
    ("map", StdlibFunc::ListMap),
    ("filter", StdlibFunc::ListFilter),
    ("reduce", StdlibFunc::ListReduce),
    ("find", StdlibFunc::ListFind),
    ("some", StdlibFunc::ListSome),
    ("every", StdlibFunc::ListEvery),
    ("sort", StdlibFunc::ListSort),
    ("reverse", StdlibFunc::ListReverse),
    ("flat", StdlibFunc::ListFlat),
    ("slice", StdlibFunc::ListSlice),
    ("range", StdlibFunc::ListRange),
    ("keys", StdlibFunc::ObjKeys),
    ("values", StdlibFunc::ObjValues),
    ("has", StdlibFunc::ObjHas),
    ("set", StdlibFunc::ObjSet),
    ("remove", StdlibFunc::ObjRemove),
    ("Ok", StdlibFunc::ResultOk),
    ("Err", StdlibFunc::ResultErr),
    ("isOk", StdlibFunc::ResultIsOk),
    ("isErr", StdlibFunc::ResultIsErr),
    ("unwrap", StdlibFunc::ResultUnwrap),
    ("unwrapOr", StdlibFunc::ResultUnwrapOr),
    ("unwrapErr", StdlibFunc::ResultUnwrapErr),
    ("all", StdlibFunc::FutureAll),
    ("race", StdlibFunc::FutureRace),
    ("any", StdlibFunc::FutureAny),
    ("cancel", StdlibFunc::FutureCancel),
    ("awaitTimeout", StdlibFunc::FutureAwaitTimeout),
    ("isCancelled", StdlibFunc::FutureIsCancelled),
];

impl StdlibFunc {
    pub fn from_name(name: &str) -> Option<Self> {
        NAMES
            .iter()
            .find(|(candidate, _)| *candidate == name)
            .map(|(_, func)| *func)
    }

    pub fn name(self) -> &'static str {
        NAMES
            .iter()
            .find(|(_, func)| *func == self)
            .map(|(name, _)| *name)
            .unwrap_or("<builtin>")
    }
}

/* ===================== Name Resolution ===================== */

/// Value for an unbound identifier, if it names a builtin or a builtin
/// namespace such as `time`
pub fn lookup(name: &str) -> Option<Value> {
    if name == "time" {
        let mut time = Object::new();
        time.insert("now".to_string(), Value::Builtin(StdlibFunc::TimeNow));
        return Some(Value::Object(time));
    }
    StdlibFunc::from_name(name).map(Value::Builtin)
}

/* ===================== Stdlib Dispatcher ===================== */

/// Call a standard library function. `exec` runs callbacks passed to the
/// higher-order collection functions.
pub fn call_stdlib_func(
    exec: &Executor,
    func: StdlibFunc,
    args: Vec<Value>,
) -> Result<Value, RuntimeError> {
    use StdlibFunc::*;
    match func {
        StrUpper => strings::upper(&args),
        StrLower => strings::lower(&args),
        StrTrim => strings::trim(&args),
        StrSplit => strings::split(&args),
        StrJoin => strings::join(&args),
        StrContains => strings::contains(&args),
        StrReplace => strings::replace(&args),
        StrSubstring => strings::substring(&args),
        StrStartsWith => strings::starts_with(&args),
        StrEndsWith => strings::ends_with(&args),
        StrIndexOf => strings::index_of(&args),
        StrCharAt => strings::char_at(&args),

        Length => convert::length(&args),
        ToString => convert::to_string(&args),
        ParseInt => convert::parse_int(&args),
        ParseFloat => convert::parse_float(&args),
        TypeOf => convert::type_of(&args),

        MathAbs => math::abs(&args),
        MathMin => math::min(&args),
        MathMax => math::max(&args),
        MathFloor => math::floor(&args),
        MathCeil => math::ceil(&args),
        MathRound => math::round(&args),
        RandomInt => math::random_int(&args),
        GenerateId => math::generate_id(&args),
        TimeNow => math::now(&args),

        ListAppend => collections::append(args),
        ListMap => collections::map(exec, args),
        ListFilter => collections::filter(exec, args),
        ListReduce => collections::reduce(exec, args),
        ListFind => collections::find(exec, args),
        ListSome => collections::some(exec, args),
        ListEvery => collections::every(exec, args),
        ListSort => collections::sort(exec, args),
        ListReverse => collections::reverse(args),
        ListFlat => collections::flat(args),
        ListSlice => collections::slice(args),
        ListRange => collections::range(exec, &args),
        ObjKeys => collections::keys(&args),
        ObjValues => collections::values(args),
        ObjHas => collections::has(&args),
        ObjSet => collections::set(args),
        ObjRemove => collections::remove(args),

        ResultOk => results::ok(args),
        ResultErr => results::err(args),
        ResultIsOk => results::is_ok(&args),
        ResultIsErr => results::is_err(&args),
        ResultUnwrap => results::unwrap(args),
        ResultUnwrapOr => results::unwrap_or(args),
        ResultUnwrapErr => results::unwrap_err(args),

        FutureAll => futures::all(args),
        FutureRace => futures::race(args),
        FutureAny => futures::any(args),
        FutureCancel => futures::cancel(&args),
        FutureAwaitTimeout => futures::await_timeout(&args),
        FutureIsCancelled => futures::is_cancelled(&args),
    }
}

/* ===================== Argument Helpers ===================== */

fn ordinal(idx: usize) -> &'static str {
    match idx {
        0 => "first",
        1 => "second",
        2 => "third",
        _ => "trailing",
    }
}

pub(crate) fn expect_args(name: &str, args: &[Value], n: usize) -> Result<(), RuntimeError> {
    if args.len() != n {
        let noun = if n == 1 { "argument" } else { "arguments" };
        return Err(RuntimeError::arity(format!(
            "{}() expects {} {}, got {}",
            name,
            n,
            noun,
            args.len()
        )));
    }
    Ok(())
}

pub(crate) fn expect_arg_range(
    name: &str,
    args: &[Value],
    min: usize,
    max: usize,
) -> Result<(), RuntimeError> {
    if args.len() < min || args.len() > max {
        return Err(RuntimeError::arity(format!(
            "{}() expects {}-{} arguments, got {}",
            name,
            min,
            max,
            args.len()
        )));
    }
    Ok(())
}

fn wrong_arg(name: &str, idx: usize, wanted: &str, got: &Value) -> RuntimeError {
    RuntimeError::type_mismatch(format!(
        "{}() expects {} argument to be {}, got {}",
        name,
        ordinal(idx),
        wanted,
        got.type_name()
    ))
}

pub(crate) fn str_arg<'a>(name: &str, args: &'a [Value], idx: usize) -> Result<&'a str, RuntimeError> {
    match &args[idx] {
        Value::Str(s) => Ok(s),
        other => Err(wrong_arg(name, idx, "a string", other)),
    }
}

pub(crate) fn int_arg(name: &str, args: &[Value], idx: usize) -> Result<i64, RuntimeError> {
    match &args[idx] {
        Value::Int(n) => Ok(*n),
        other => Err(wrong_arg(name, idx, "an integer", other)),
    }
}

pub(crate) fn array_arg<'a>(
    name: &str,
    args: &'a [Value],
    idx: usize,
) -> Result<&'a Vec<Value>, RuntimeError> {
    match &args[idx] {
        Value::Array(items) => Ok(items),
        other => Err(wrong_arg(name, idx, "an array", other)),
    }
}

pub(crate) fn object_arg<'a>(
    name: &str,
    args: &'a [Value],
    idx: usize,
) -> Result<&'a Object, RuntimeError> {
    match &args[idx] {
        Value::Object(obj) => Ok(obj),
        other => Err(wrong_arg(name, idx, "an object", other)),
    }
}

pub(crate) fn callable_arg(name: &str, args: &[Value], idx: usize) -> Result<Value, RuntimeError> {
    let value = &args[idx];
    if value.is_callable() {
        Ok(value.clone())
    } else {
        Err(wrong_arg(name, idx, "a function", value))
    }
}
