//! The evaluator's named host-object table (spec.md §3 "HostObject", §9
//! "Registration keys for credentials ... consolidates this to a single
//! 'named host object' namespace").
//!
//! A single namespace, keyed by string name, for every external resource a
//! script can reference: SQL connections, document-store clusters, key
//! vault handles, debugger subscriptions. The spec explicitly calls out a
//! source-level anti-pattern -- looking a name up in two different places
//! (`rt.objects` and `rt.GetVariable`) -- and asks implementers not to
//! replicate it; this table is the single place such lookups go.

use std::{cell::RefCell, collections::HashMap, fmt, rc::Rc};

use crate::error::{EngineError, ErrorKind};

/// A resource registered under a name in the object table. Implementors
/// provide a `close` capability invoked at session teardown (spec.md §4.8
/// "closes every named resource (invoking a `Close() error` capability
/// where present)").
pub trait HostResource: fmt::Debug {
    fn close(&self) -> Result<(), EngineError> {
        Ok(())
    }

    /// Single-key reflection hook backing `getProp`/`setProp` dispatch over
    /// `HostObject` (spec.md §4.4 "HostObject reflection"). Resources that
    /// expose no inspectable properties simply keep the default `None`/
    /// `false`.
    fn get_property(&self, _key: &str) -> Option<crate::value::Value> {
        None
    }

    fn set_property(&self, _key: &str, _value: crate::value::Value) -> bool {
        false
    }

    fn as_any(&self) -> &dyn std::any::Any;
}

#[derive(Debug, Clone)]
pub struct ObjectTable(Rc<RefCell<HashMap<String, Rc<dyn HostResource>>>>);

impl ObjectTable {
    pub fn new() -> Self {
        Self(Rc::new(RefCell::new(HashMap::new())))
    }

    pub fn register(&self, name: impl Into<String>, resource: Rc<dyn HostResource>) {
        self.0.borrow_mut().insert(name.into(), resource);
    }

    pub fn get(&self, name: &str) -> Option<Rc<dyn HostResource>> {
        self.0.borrow().get(name).cloned()
    }

    pub fn resolve(&self, name: &str) -> Result<Rc<dyn HostResource>, EngineError> {
        self.get(name).ok_or_else(|| EngineError::new(ErrorKind::Resolution, format!("no host object named '{name}'")))
    }

    pub fn remove(&self, name: &str) -> Option<Rc<dyn HostResource>> {
        self.0.borrow_mut().remove(name)
    }

    pub fn names(&self) -> Vec<String> {
        self.0.borrow().keys().cloned().collect()
    }

    /// Closes every registered resource, collecting (not short-circuiting
    /// on) individual failures, then clears the table (spec.md §4.8).
    pub fn close_all(&self) -> Vec<EngineError> {
        let resources: Vec<_> = self.0.borrow_mut().drain().map(|(_, v)| v).collect();
        let mut errors = Vec::new();
        for resource in resources {
            if let Err(e) = resource.close() {
                errors.push(e);
            }
        }
        errors
    }
}

impl Default for ObjectTable {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug)]
    struct Dummy;
    impl HostResource for Dummy {
        fn as_any(&self) -> &dyn std::any::Any {
            self
        }
    }

    #[test]
    fn register_and_resolve() {
        let table = ObjectTable::new();
        table.register("conn", Rc::new(Dummy));
        assert!(table.resolve("conn").is_ok());
        assert!(table.resolve("missing").is_err());
    }

    #[test]
    fn close_all_clears_table() {
        let table = ObjectTable::new();
        table.register("a", Rc::new(Dummy));
        table.register("b", Rc::new(Dummy));
        let errors = table.close_all();
        assert!(errors.is_empty());
        assert!(table.names().is_empty());
    }
}
