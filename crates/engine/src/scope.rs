//! Lexical scoping (component C: "Scope" in spec.md §3).
//!
//! A scope holds a name→value mapping and a parent link. Resolution walks
//! parent links; assignment to an existing name mutates in the scope where
//! it was found; creation uses the explicit `declare`/`declareGlobal`
//! primitives. Function calls build a child scope parented at the
//! function's *captured* scope, not the caller's, to preserve lexical
//! closure semantics (Testable Property 2).

use std::{cell::RefCell, collections::HashMap, rc::Rc};

use crate::{
    error::{EngineError, ErrorKind},
    value::Value,
};

#[derive(Debug)]
pub struct ScopeInner {
    vars: HashMap<String, Value>,
    parent: Option<Scope>,
}

/// A reference-counted, mutable scope. Cloning a `Scope` shares the same
/// underlying bindings (needed so a closure's captured scope keeps
/// observing mutations made after the closure was created).
#[derive(Debug, Clone)]
pub struct Scope(Rc<RefCell<ScopeInner>>);

impl Scope {
    pub fn root() -> Self {
        Self(Rc::new(RefCell::new(ScopeInner { vars: HashMap::new(), parent: None })))
    }

    pub fn child_of(parent: &Scope) -> Self {
        Self(Rc::new(RefCell::new(ScopeInner { vars: HashMap::new(), parent: Some(parent.clone()) })))
    }

    pub fn ptr_eq(a: &Scope, b: &Scope) -> bool {
        Rc::ptr_eq(&a.0, &b.0)
    }

    /// Walks parent links looking up `name`. Returns `Value::Null` unwrapped
    /// -- callers that need resolution errors use [`Scope::resolve`].
    pub fn get(&self, name: &str) -> Option<Value> {
        let inner = self.0.borrow();
        if let Some(v) = inner.vars.get(name) {
            return Some(v.clone());
        }
        inner.parent.as_ref().and_then(|p| p.get(name))
    }

    pub fn resolve(&self, name: &str) -> Result<Value, EngineError> {
        self.get(name).ok_or_else(|| EngineError::new(ErrorKind::Resolution, format!("undefined variable '{name}'")))
    }

    /// `declare(name, value)`: creates or overwrites a binding in *this*
    /// (the current) scope.
    pub fn declare_local(&self, name: &str, value: Value) {
        self.0.borrow_mut().vars.insert(name.to_string(), value);
    }

    /// `declareGlobal(name, value)`: creates or overwrites a binding in the
    /// root scope, walking parent links to find it.
    pub fn declare_global(&self, name: &str, value: Value) {
        let mut current = self.clone();
        loop {
            let next = current.0.borrow().parent.clone();
            match next {
                Some(p) => current = p,
                None => break,
            }
        }
        current.0.borrow_mut().vars.insert(name.to_string(), value);
    }

    /// `setq(name, value)`: assigns to an existing binding, mutating in the
    /// scope where it was found. Falls back to declaring in the current
    /// scope if the name is unbound anywhere (a pragmatic choice since the
    /// source language has no separate "must already exist" assignment
    /// form).
    pub fn set(&self, name: &str, value: Value) {
        if self.assign_if_found(name, &value) {
            return;
        }
        self.declare_local(name, value);
    }

    fn assign_if_found(&self, name: &str, value: &Value) -> bool {
        let mut inner = self.0.borrow_mut();
        if inner.vars.contains_key(name) {
            inner.vars.insert(name.to_string(), value.clone());
            return true;
        }
        let parent = inner.parent.clone();
        drop(inner);
        match parent {
            Some(p) => p.assign_if_found(name, value),
            None => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn child_resolves_through_parent() {
        let root = Scope::root();
        root.declare_local("x", Value::Number(1.0));
        let child = Scope::child_of(&root);
        assert!(matches!(child.resolve("x"), Ok(Value::Number(n)) if n == 1.0));
    }

    #[test]
    fn set_mutates_in_owning_scope_not_current() {
        let root = Scope::root();
        root.declare_local("x", Value::Number(1.0));
        let child = Scope::child_of(&root);
        child.set("x", Value::Number(2.0));
        assert!(matches!(root.resolve("x"), Ok(Value::Number(n)) if n == 2.0));
    }

    #[test]
    fn declare_global_reaches_root_from_nested_scope() {
        let root = Scope::root();
        let mid = Scope::child_of(&root);
        let leaf = Scope::child_of(&mid);
        leaf.declare_global("g", Value::Bool(true));
        assert!(root.get("g").is_some());
        assert!(mid.get("g").is_some());
    }
}
