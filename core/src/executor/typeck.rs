//! Type checking
//!
//! Structural checks of runtime values against declared types, generic
//! instantiation and inference, and constraint/trait validation.
//!
//! # Generic scopes
//!
//! Type-parameter bindings never live on the checker. Every call that may
//! reference a type parameter takes a [`TypeScope`], an immutable frame that
//! the executor extends when it enters a generic function. Concurrent
//! invocations therefore never observe each other's bindings.

use std::collections::HashMap;
use std::sync::Arc;

use super::errors::RuntimeError;
use super::types::{
    Field, FunctionDef, Object, ResultValue, TraitDef, Type, TypeDef, TypeParam, Value,
};

/// Immutable type-parameter bindings for one generic call chain
#[derive(Debug, Clone, Default)]
pub struct TypeScope {
    bindings: Arc<HashMap<String, Type>>,
}

impl TypeScope {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn lookup(&self, name: &str) -> Option<&Type> {
        self.bindings.get(name)
    }

    pub fn is_empty(&self) -> bool {
        self.bindings.is_empty()
    }

    /// New frame with `bindings` layered over this one
    pub fn extend(&self, bindings: &HashMap<String, Type>) -> Self {
        let mut merged = (*self.bindings).clone();
        for (name, ty) in bindings {
            merged.insert(name.clone(), self.resolve(ty));
        }
        Self {
            bindings: Arc::new(merged),
        }
    }

    /// Replace every bound type parameter inside `ty`
    pub fn resolve(&self, ty: &Type) -> Type {
        if self.is_empty() {
            return ty.clone();
        }
        substitute(ty, &self.bindings)
    }
}

/// Rewrite every `TypeParam` named in `args`; unmatched parameters stay as
/// placeholders for an outer scope to resolve.
pub fn substitute(ty: &Type, args: &HashMap<String, Type>) -> Type {
    match ty {
        Type::TypeParam { name } => args.get(name).cloned().unwrap_or_else(|| ty.clone()),
        Type::Array { elem } => Type::array(substitute(elem, args)),
        Type::Optional { inner } => Type::optional(substitute(inner, args)),
        Type::Generic { base, args: type_args } => Type::generic(
            substitute(base, args),
            type_args.iter().map(|t| substitute(t, args)).collect(),
        ),
        Type::Function { params, ret } => Type::function(
            params.iter().map(|t| substitute(t, args)).collect(),
            substitute(ret, args),
        ),
        Type::Union { types } => Type::union(types.iter().map(|t| substitute(t, args)).collect()),
        _ => ty.clone(),
    }
}

fn substitute_fields(fields: &[Field], args: &HashMap<String, Type>) -> Vec<Field> {
    fields
        .iter()
        .map(|field| Field {
            name: field.name.clone(),
            ty: field.ty.as_ref().map(|t| substitute(t, args)),
            required: field.required,
            default: field.default.clone(),
        })
        .collect()
}

/// Runtime type of a value. Objects report `object`, which is compatible
/// with any named type; their structure is validated separately.
pub fn runtime_type(value: &Value) -> Type {
    match value {
        Value::Null => Type::Any,
        Value::Bool(_) => Type::Bool,
        Value::Int(_) => Type::Int,
        Value::Float(_) => Type::Float,
        Value::Str(_) => Type::Str,
        Value::Array(_) => Type::array(Type::Any),
        Value::Object(_) => Type::named("object"),
        Value::Function(f) => Type::function(vec![Type::Any; f.params.len()], Type::Any),
        Value::Closure(c) => Type::function(vec![Type::Any; c.params.len()], Type::Any),
        Value::Builtin(_) => Type::named("builtin"),
        Value::Result(_) => Type::named("Result"),
        Value::Future(_) => Type::named("Future"),
        Value::Capability(c) => Type::named(c.kind()),
    }
}

fn mismatch(expected: &Type, value: &Value) -> RuntimeError {
    let actual = match value {
        Value::Null => "null".to_string(),
        other => runtime_type(other).to_string(),
    };
    RuntimeError::type_mismatch(format!(
        "type mismatch: expected {}, got {}",
        expected, actual
    ))
}

const BUILTIN_CONSTRAINTS: [&str; 5] = ["Numeric", "Comparable", "Hashable", "Serializable", "Any"];

/// Registry of user types and traits. Built at module load, read-only after.
#[derive(Debug, Clone, Default)]
pub struct TypeChecker {
    type_defs: HashMap<String, Arc<TypeDef>>,
    traits: HashMap<String, TraitDef>,
}

impl TypeChecker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register_type(&mut self, def: TypeDef) {
        self.type_defs.insert(def.name.clone(), Arc::new(def));
    }

    pub fn register_trait(&mut self, def: TraitDef) {
        self.traits.insert(def.name.clone(), def);
    }

    pub fn type_def(&self, name: &str) -> Option<&Arc<TypeDef>> {
        self.type_defs.get(name)
    }

    pub fn trait_def(&self, name: &str) -> Option<&TraitDef> {
        self.traits.get(name)
    }

    pub fn type_defs(&self) -> impl Iterator<Item = &Arc<TypeDef>> {
        self.type_defs.values()
    }

    /// Check `value` against `expected`, validating objects against their
    /// TypeDef and arrays element by element.
    pub fn check_type(
        &self,
        value: &Value,
        expected: &Type,
        scope: &TypeScope,
    ) -> Result<(), RuntimeError> {
        match expected {
            Type::Any => Ok(()),
            Type::TypeParam { name } => match scope.lookup(name) {
                Some(bound) if bound != expected => self.check_type(value, bound, scope),
                _ => Ok(()),
            },
            Type::Optional { inner } => {
                if value.is_null() {
                    Ok(())
                } else {
                    self.check_type(value, inner, scope)
                }
            }
            Type::Union { types } => {
                if types
                    .iter()
                    .any(|member| self.check_type(value, member, scope).is_ok())
                {
                    Ok(())
                } else {
                    Err(mismatch(expected, value))
                }
            }
            _ if value.is_null() => Err(mismatch(expected, value)),
            Type::Array { elem } => {
                let Value::Array(items) = value else {
                    return Err(mismatch(expected, value));
                };
                for (i, item) in items.iter().enumerate() {
                    self.check_type(item, elem, scope)
                        .map_err(|e| e.context(&format!("array element {}", i)))?;
                }
                Ok(())
            }
            Type::Named { name } => self.check_named(value, expected, name, &[], scope),
            Type::Generic { base, args } => match base.base_name() {
                Some(name) => self.check_named(value, expected, name, args, scope),
                None => Err(mismatch(expected, value)),
            },
            Type::Function { .. } => {
                if value.is_callable() {
                    Ok(())
                } else {
                    Err(mismatch(expected, value))
                }
            }
            Type::Int | Type::Str | Type::Bool | Type::Float => {
                if self.types_compatible(&runtime_type(value), expected) {
                    Ok(())
                } else {
                    Err(mismatch(expected, value))
                }
            }
        }
    }

    fn check_named(
        &self,
        value: &Value,
        expected: &Type,
        name: &str,
        args: &[Type],
        scope: &TypeScope,
    ) -> Result<(), RuntimeError> {
        if let Some(def) = self.type_defs.get(name) {
            let Value::Object(obj) = value else {
                return Err(mismatch(expected, value));
            };
            if args.is_empty() {
                return self.validate_object(obj, def, scope);
            }
            let resolved: Vec<Type> = args.iter().map(|a| scope.resolve(a)).collect();
            let concrete = self.instantiate_type(def, &resolved)?;
            return self.validate_object(obj, &concrete, scope);
        }

        match value {
            Value::Result(result) if name == "Result" => {
                let (payload, slot, label) = match result {
                    ResultValue::Ok(v) => (v, 0, "Ok"),
                    ResultValue::Err(e) => (e, 1, "Err"),
                };
                match args.get(slot) {
                    Some(ty) => self
                        .check_type(payload, ty, scope)
                        .map_err(|e| e.context(label)),
                    None => Ok(()),
                }
            }
            Value::Object(_) if name == "object" => Ok(()),
            Value::Future(_) if name == "Future" => Ok(()),
            Value::Capability(c) if c.kind() == name => Ok(()),
            _ => Err(mismatch(expected, value)),
        }
    }

    /// Whether a value of type `actual` may be used where `expected` is declared
    pub fn types_compatible(&self, actual: &Type, expected: &Type) -> bool {
        match (actual, expected) {
            (Type::Any, _) | (_, Type::Any) => return true,
            (Type::Int, Type::Int)
            | (Type::Str, Type::Str)
            | (Type::Bool, Type::Bool)
            | (Type::Float, Type::Float)
            | (Type::Int, Type::Float) => return true,
            (Type::Array { elem: a }, Type::Array { elem: e }) => {
                return self.types_compatible(a, e)
            }
            (Type::Optional { inner: a }, Type::Optional { inner: e }) => {
                return self.types_compatible(a, e)
            }
            (Type::Named { name: a }, Type::Named { name: e }) => {
                return a == "object" || a == e
            }
            (Type::Named { name: a }, Type::Generic { .. }) if a == "object" => return true,
            (
                Type::Generic {
                    base: a_base,
                    args: a_args,
                },
                Type::Generic {
                    base: e_base,
                    args: e_args,
                },
            ) => {
                return self.types_compatible(a_base, e_base)
                    && a_args.len() == e_args.len()
                    && a_args
                        .iter()
                        .zip(e_args)
                        .all(|(a, e)| self.types_compatible(a, e))
            }
            (Type::TypeParam { name: a }, Type::TypeParam { name: e }) => return a == e,
            (_, Type::TypeParam { .. }) => return true,
            (
                Type::Function {
                    params: a_params,
                    ret: a_ret,
                },
                Type::Function {
                    params: e_params,
                    ret: e_ret,
                },
            ) => {
                return a_params.len() == e_params.len()
                    && a_params
                        .iter()
                        .zip(e_params)
                        .all(|(a, e)| self.types_compatible(a, e))
                    && self.types_compatible(a_ret, e_ret)
            }
            _ => {}
        }

        if let Type::Optional { inner } = expected {
            return self.types_compatible(actual, inner);
        }
        if let Type::Union { types } = expected {
            return types.iter().any(|member| self.types_compatible(actual, member));
        }
        if let Type::Union { types } = actual {
            return types.iter().all(|member| self.types_compatible(member, expected));
        }
        false
    }

    /// Required fields without defaults must be present; present declared
    /// fields must type-check. Undeclared fields are allowed.
    pub fn validate_object(
        &self,
        obj: &Object,
        def: &TypeDef,
        scope: &TypeScope,
    ) -> Result<(), RuntimeError> {
        for field in &def.fields {
            match obj.get(&field.name) {
                None if field.is_mandatory() => {
                    return Err(RuntimeError::type_mismatch(format!(
                        "missing required field: {}",
                        field.name
                    )));
                }
                Some(value) => {
                    if let Some(ty) = &field.ty {
                        self.check_type(value, ty, scope)
                            .map_err(|e| e.context(&format!("field {}", field.name)))?;
                    }
                }
                None => {}
            }
        }
        Ok(())
    }

    fn bind_type_params(
        &self,
        owner: &str,
        kind: &str,
        params: &[TypeParam],
        type_args: &[Type],
    ) -> Result<HashMap<String, Type>, RuntimeError> {
        if params.len() != type_args.len() {
            return Err(RuntimeError::type_mismatch(format!(
                "{} {} expects {} type arguments, got {}",
                kind,
                owner,
                params.len(),
                type_args.len()
            )));
        }
        for (param, arg) in params.iter().zip(type_args) {
            if let Some(constraint) = &param.constraint {
                if !self.satisfies_constraint(arg, constraint) {
                    return Err(RuntimeError::type_mismatch(format!(
                        "type argument {} does not satisfy constraint {} for {}",
                        arg, constraint, param.name
                    )));
                }
            }
        }
        Ok(params
            .iter()
            .zip(type_args)
            .map(|(param, arg)| (param.name.clone(), arg.clone()))
            .collect())
    }

    /// Concrete TypeDef for `def<type_args>`
    pub fn instantiate_type(&self, def: &TypeDef, type_args: &[Type]) -> Result<TypeDef, RuntimeError> {
        let bindings = self.bind_type_params(&def.name, "type", &def.type_params, type_args)?;
        Ok(TypeDef {
            name: def.name.clone(),
            type_params: Vec::new(),
            fields: substitute_fields(&def.fields, &bindings),
            traits: def.traits.clone(),
            methods: def.methods.clone(),
        })
    }

    /// Concrete function for `f<type_args>` plus the bindings used
    pub fn instantiate_function(
        &self,
        f: &FunctionDef,
        type_args: &[Type],
    ) -> Result<(FunctionDef, HashMap<String, Type>), RuntimeError> {
        let bindings = self.bind_type_params(&f.name, "function", &f.type_params, type_args)?;
        let concrete = FunctionDef {
            name: f.name.clone(),
            type_params: Vec::new(),
            params: substitute_fields(&f.params, &bindings),
            return_type: f.return_type.as_ref().map(|t| substitute(t, &bindings)),
            body: f.body.clone(),
        };
        Ok((concrete, bindings))
    }

    /// Type-parameter bindings for a call to `f<type_args>`. Calls use these
    /// with [`TypeScope::extend`] so the body is never cloned.
    pub fn function_bindings(
        &self,
        f: &FunctionDef,
        type_args: &[Type],
    ) -> Result<HashMap<String, Type>, RuntimeError> {
        self.bind_type_params(&f.name, "function", &f.type_params, type_args)
    }

    pub fn satisfies_constraint(&self, ty: &Type, constraint: &Type) -> bool {
        if let Type::Named { name } = constraint {
            let builtin = match name.as_str() {
                "Any" => Some(true),
                "Numeric" => Some(matches!(ty, Type::Int | Type::Float)),
                "Comparable" => Some(matches!(
                    ty,
                    Type::Int | Type::Str | Type::Bool | Type::Float
                )),
                "Hashable" => Some(matches!(ty, Type::Int | Type::Str | Type::Bool)),
                "Serializable" => Some(self.is_serializable(ty)),
                _ => None,
            };
            if let Some(ok) = builtin {
                return ok;
            }
            if self.traits.contains_key(name) {
                return self.implements_trait(ty, name);
            }
        }
        self.types_compatible(ty, constraint)
    }

    /// Plain data that survives a JSON round trip. Functions, futures and
    /// capabilities do not.
    fn is_serializable(&self, ty: &Type) -> bool {
        match ty {
            Type::Int | Type::Str | Type::Bool | Type::Float | Type::Any => true,
            Type::TypeParam { .. } => true,
            Type::Array { elem } => self.is_serializable(elem),
            Type::Optional { inner } => self.is_serializable(inner),
            Type::Union { types } => types.iter().all(|t| self.is_serializable(t)),
            Type::Generic { base, args } => {
                self.is_serializable(base) && args.iter().all(|t| self.is_serializable(t))
            }
            Type::Named { name } => {
                matches!(name.as_str(), "object" | "Result") || self.type_defs.contains_key(name)
            }
            Type::Function { .. } => false,
        }
    }

    fn implements_trait(&self, ty: &Type, trait_name: &str) -> bool {
        ty.base_name()
            .and_then(|name| self.type_defs.get(name))
            .map(|def| def.traits.iter().any(|t| t == trait_name))
            .unwrap_or(false)
    }

    /// Infer type arguments from the first value bound to each parameter
    /// declared as `T` or `[T]`.
    pub fn infer_type_arguments(
        &self,
        f: &FunctionDef,
        args: &[Value],
    ) -> Result<Vec<Type>, RuntimeError> {
        let mut inferred: HashMap<&str, Type> = HashMap::new();
        for (param, value) in f.params.iter().zip(args) {
            match &param.ty {
                Some(Type::TypeParam { name }) => {
                    inferred
                        .entry(name.as_str())
                        .or_insert_with(|| runtime_type(value));
                }
                Some(Type::Array { elem }) => {
                    if let (Type::TypeParam { name }, Value::Array(items)) = (elem.as_ref(), value) {
                        if let Some(first) = items.first() {
                            inferred
                                .entry(name.as_str())
                                .or_insert_with(|| runtime_type(first));
                        }
                    }
                }
                _ => {}
            }
        }

        f.type_params
            .iter()
            .map(|param| {
                inferred.get(param.name.as_str()).cloned().ok_or_else(|| {
                    RuntimeError::type_mismatch(format!(
                        "could not infer type for type parameter {}",
                        param.name
                    ))
                })
            })
            .collect()
    }

    /// Every trait a type declares must exist and be fully implemented
    pub fn validate_trait_impl(&self, def: &TypeDef) -> Result<(), RuntimeError> {
        for trait_name in &def.traits {
            if BUILTIN_CONSTRAINTS.contains(&trait_name.as_str()) {
                continue;
            }
            let Some(trait_def) = self.traits.get(trait_name) else {
                return Err(RuntimeError::type_mismatch(format!(
                    "type {} declares unknown trait {}",
                    def.name, trait_name
                )));
            };
            for sig in &trait_def.methods {
                if !def.methods.iter().any(|m| m.name == sig.name) {
                    return Err(RuntimeError::type_mismatch(format!(
                        "type {} does not implement method {} required by trait {}",
                        def.name, sig.name, trait_name
                    )));
                }
            }
        }
        Ok(())
    }
}
