//! Declared types

use serde::{Deserialize, Serialize};
use std::fmt;

/// A declared type. Immutable once constructed; substitution builds new trees.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "t")]
pub enum Type {
    Int,
    Str,
    Bool,
    Float,
    /// Unknown or dynamic, e.g. the element type of an empty array
    Any,
    Array {
        elem: Box<Type>,
    },
    Optional {
        inner: Box<Type>,
    },
    Named {
        name: String,
    },
    Union {
        types: Vec<Type>,
    },
    Generic {
        base: Box<Type>,
        args: Vec<Type>,
    },
    TypeParam {
        name: String,
    },
    Function {
        params: Vec<Type>,
        ret: Box<Type>,
    },
}

impl Type {
    pub fn array(elem: Type) -> Self {
        Type::Array {
            elem: Box::new(elem),
        }
    }

    pub fn optional(inner: Type) -> Self {
        Type::Optional {
            inner: Box::new(inner),
        }
    }

    pub fn named(name: impl Into<String>) -> Self {
        Type::Named { name: name.into() }
    }

    pub fn param(name: impl Into<String>) -> Self {
        Type::TypeParam { name: name.into() }
    }

    pub fn union(types: Vec<Type>) -> Self {
        Type::Union { types }
    }

    pub fn generic(base: Type, args: Vec<Type>) -> Self {
        Type::Generic {
            base: Box::new(base),
            args,
        }
    }

    pub fn function(params: Vec<Type>, ret: Type) -> Self {
        Type::Function {
            params,
            ret: Box::new(ret),
        }
    }

    /// Name of the base type for `Named` and `Generic(Named, ..)`
    pub fn base_name(&self) -> Option<&str> {
        match self {
            Type::Named { name } => Some(name),
            Type::Generic { base, .. } => base.base_name(),
            _ => None,
        }
    }
}

fn join(types: &[Type], sep: &str) -> String {
    types
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(sep)
}

impl fmt::Display for Type {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Type::Int => f.write_str("int"),
            Type::Str => f.write_str("string"),
            Type::Bool => f.write_str("bool"),
            Type::Float => f.write_str("float"),
            Type::Any => f.write_str("any"),
            Type::Array { elem } if **elem == Type::Any => f.write_str("[]"),
            Type::Array { elem } => write!(f, "[{}]", elem),
            Type::Optional { inner } => write!(f, "{}?", inner),
            Type::Named { name } | Type::TypeParam { name } => f.write_str(name),
            Type::Union { types } if types.is_empty() => f.write_str("never"),
            Type::Union { types } => f.write_str(&join(types, " | ")),
            Type::Generic { base, args } if args.is_empty() => write!(f, "{}", base),
            Type::Generic { base, args } => write!(f, "{}<{}>", base, join(args, ", ")),
            Type::Function { params, ret } => write!(f, "({}) -> {}", join(params, ", "), ret),
        }
    }
}
