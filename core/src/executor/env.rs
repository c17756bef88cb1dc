//! Lexical scopes
//!
//! An [`Environment`] is one frame of bindings plus a shared reference to its
//! parent. Frames are created per call, per loop iteration and per branch,
//! and dropped with the `Arc` that owns them. Interior locking lets async
//! bodies capture a scope and run on another thread.

use indexmap::IndexMap;
use parking_lot::RwLock;
use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;

use super::errors::RuntimeError;
use super::types::Value;

#[derive(Default)]
struct Frame {
    vars: IndexMap<String, Value>,
    constants: HashSet<String>,
    /// Every binding is read-only to `set`/`update`
    sealed: bool,
}

pub struct Environment {
    frame: RwLock<Frame>,
    parent: Option<Arc<Environment>>,
}

impl Environment {
    /// Create a root scope
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            frame: RwLock::new(Frame::default()),
            parent: None,
        })
    }

    /// Create a root scope whose bindings can be declared but never
    /// reassigned. Holds the module globals shared by every invocation.
    pub fn new_sealed() -> Arc<Self> {
        Arc::new(Self {
            frame: RwLock::new(Frame {
                sealed: true,
                ..Frame::default()
            }),
            parent: None,
        })
    }

    /// Create a child scope that can read and update `parent`
    pub fn with_parent(parent: &Arc<Environment>) -> Arc<Self> {
        Arc::new(Self {
            frame: RwLock::new(Frame::default()),
            parent: Some(Arc::clone(parent)),
        })
    }

    pub fn parent(&self) -> Option<&Arc<Environment>> {
        self.parent.as_ref()
    }

    /// Declare a new binding in this frame
    pub fn define(&self, name: impl Into<String>, value: Value) -> Result<(), RuntimeError> {
        let name = name.into();
        let mut frame = self.frame.write();
        if frame.vars.contains_key(&name) {
            return Err(RuntimeError::DuplicateBinding(name));
        }
        frame.vars.insert(name, value);
        Ok(())
    }

    /// Declare a binding that can never be reassigned
    pub fn define_const(&self, name: impl Into<String>, value: Value) -> Result<(), RuntimeError> {
        let name = name.into();
        let mut frame = self.frame.write();
        if frame.vars.contains_key(&name) {
            return Err(RuntimeError::DuplicateBinding(name));
        }
        frame.constants.insert(name.clone());
        frame.vars.insert(name, value);
        Ok(())
    }

    /// Bind without the duplicate check. Used for parameters and injected values.
    pub(crate) fn bind(&self, name: impl Into<String>, value: Value) {
        self.frame.write().vars.insert(name.into(), value);
    }

    pub fn get(&self, name: &str) -> Result<Value, RuntimeError> {
        self.resolve(name)
            .and_then(|env| env.frame.read().vars.get(name).cloned())
            .ok_or_else(|| RuntimeError::UndefinedBinding(name.to_string()))
    }

    /// Reassign the nearest existing binding
    pub fn set(&self, name: &str, value: Value) -> Result<(), RuntimeError> {
        self.update(name, |slot| {
            *slot = value;
            Ok(())
        })
    }

    /// Mutate the nearest existing binding in place
    pub fn update<R>(
        &self,
        name: &str,
        f: impl FnOnce(&mut Value) -> Result<R, RuntimeError>,
    ) -> Result<R, RuntimeError> {
        let owner = self
            .resolve(name)
            .ok_or_else(|| RuntimeError::UndefinedBinding(name.to_string()))?;
        let mut frame = owner.frame.write();
        if frame.sealed || frame.constants.contains(name) {
            return Err(RuntimeError::ConstantReassignment(name.to_string()));
        }
        match frame.vars.get_mut(name) {
            Some(slot) => f(slot),
            None => Err(RuntimeError::UndefinedBinding(name.to_string())),
        }
    }

    pub fn has(&self, name: &str) -> bool {
        self.resolve(name).is_some()
    }

    pub fn has_local(&self, name: &str) -> bool {
        self.frame.read().vars.contains_key(name)
    }

    pub fn is_constant(&self, name: &str) -> bool {
        self.resolve(name)
            .map(|env| env.frame.read().constants.contains(name))
            .unwrap_or(false)
    }

    /// Bindings declared in this frame only
    pub fn get_local(&self) -> IndexMap<String, Value> {
        self.frame.read().vars.clone()
    }

    /// Every visible binding; inner frames shadow outer ones
    pub fn get_all(&self) -> IndexMap<String, Value> {
        let mut all = match &self.parent {
            Some(parent) => parent.get_all(),
            None => IndexMap::new(),
        };
        for (name, value) in self.frame.read().vars.iter() {
            all.insert(name.clone(), value.clone());
        }
        all
    }

    /// Copy every binding visible from here, down to but excluding `root`,
    /// into one fresh frame under `root`. Constness is kept. Writes to the
    /// copy never reach the frames it was taken from.
    pub fn snapshot(&self, root: &Arc<Environment>) -> Arc<Self> {
        let mut chain = Vec::new();
        let mut env = Some(self);
        while let Some(current) = env {
            if std::ptr::eq(current, Arc::as_ptr(root)) {
                break;
            }
            chain.push(current);
            env = current.parent.as_deref();
        }

        let mut copy = Frame::default();
        for source in chain.iter().rev() {
            let frame = source.frame.read();
            for (name, value) in &frame.vars {
                if frame.constants.contains(name) {
                    copy.constants.insert(name.clone());
                } else {
                    copy.constants.remove(name);
                }
                copy.vars.insert(name.clone(), value.clone());
            }
        }
        Arc::new(Self {
            frame: RwLock::new(copy),
            parent: Some(Arc::clone(root)),
        })
    }

    fn resolve(&self, name: &str) -> Option<&Environment> {
        let mut env = Some(self);
        while let Some(current) = env {
            if current.frame.read().vars.contains_key(name) {
                return Some(current);
            }
            env = current.parent.as_deref();
        }
        None
    }
}

impl fmt::Debug for Environment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names: Vec<String> = self.frame.read().vars.keys().cloned().collect();
        f.debug_struct("Environment")
            .field("locals", &names)
            .field("has_parent", &self.parent.is_some())
            .finish()
    }
}
