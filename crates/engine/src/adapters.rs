//! External Adapters (component J): the engine defines the shape of a SQL
//! and a document-store connection as traits only. No concrete driver
//! crate is a dependency of this crate; an embedder wires a real backend by
//! implementing these traits and registering the result in the evaluator's
//! [`crate::object_table::ObjectTable`] under a connection name. The `test`
//! submodule's in-memory implementations exist purely so the ETL pipeline
//! and its tests have something to drive end to end.

use std::{collections::HashMap, fmt, rc::Rc};

use crate::{error::EngineError, object_table::HostResource, value::DocumentInner};

/// A single result row: column name to value.
pub type SqlRow = HashMap<String, crate::value::Value>;

/// A SQL-shaped target an ETL job (or `sql.rs` builtins) can write batches
/// to. Transaction boundaries are explicit so a batch failure can roll back
/// without the caller re-deriving backend-specific semantics (spec.md
/// §4.7 "batch commit/rollback").
pub trait SqlTarget: fmt::Debug {
    fn begin(&self) -> Result<(), EngineError>;
    fn execute(&self, statement: &str, params: &[crate::value::Value]) -> Result<u64, EngineError>;
    fn query(&self, statement: &str, params: &[crate::value::Value]) -> Result<Vec<SqlRow>, EngineError>;
    fn commit(&self) -> Result<(), EngineError>;
    fn rollback(&self) -> Result<(), EngineError>;
}

/// A document-store target keyed by an opaque string key (spec.md §4.7
/// "upsert key generation").
pub trait DocumentTarget: fmt::Debug {
    fn upsert(&self, key: &str, document: &DocumentInner) -> Result<(), EngineError>;
    fn get(&self, key: &str) -> Result<Option<DocumentInner>, EngineError>;
    fn delete(&self, key: &str) -> Result<(), EngineError>;
}

/// A named entry in the evaluator's object table that carries either kind
/// of adapter, so script-facing built-ins can resolve a connection name to
/// the right trait object via a single `downcast_ref` regardless of which
/// kind was registered (spec.md §9 "single named host object namespace").
pub enum HostConnection {
    Sql(Rc<dyn SqlTarget>),
    Document(Rc<dyn DocumentTarget>),
}

impl fmt::Debug for HostConnection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Sql(t) => write!(f, "HostConnection::Sql({t:?})"),
            Self::Document(t) => write!(f, "HostConnection::Document({t:?})"),
        }
    }
}

impl HostResource for HostConnection {
    fn as_any(&self) -> &dyn std::any::Any {
        self
    }
}

/// No-op/in-memory reference implementations. Not wired to any real
/// backend; exist so the ETL pipeline has something concrete to drive in
/// tests without this crate depending on an actual driver crate.
pub mod test {
    use super::*;
    use std::sync::Mutex;

    #[derive(Debug, Default)]
    pub struct NoopSqlTarget {
        executed: Mutex<Vec<String>>,
    }

    impl NoopSqlTarget {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn executed_statements(&self) -> Vec<String> {
            self.executed.lock().unwrap().clone()
        }
    }

    impl SqlTarget for NoopSqlTarget {
        fn begin(&self) -> Result<(), EngineError> {
            Ok(())
        }

        fn execute(&self, statement: &str, _params: &[crate::value::Value]) -> Result<u64, EngineError> {
            self.executed.lock().unwrap().push(statement.to_string());
            Ok(1)
        }

        fn query(&self, _statement: &str, _params: &[crate::value::Value]) -> Result<Vec<SqlRow>, EngineError> {
            Ok(Vec::new())
        }

        fn commit(&self) -> Result<(), EngineError> {
            Ok(())
        }

        fn rollback(&self) -> Result<(), EngineError> {
            Ok(())
        }
    }

    #[derive(Debug, Default)]
    pub struct InMemoryDocumentTarget {
        store: Mutex<HashMap<String, DocumentInner>>,
    }

    impl InMemoryDocumentTarget {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn len(&self) -> usize {
            self.store.lock().unwrap().len()
        }

        pub fn is_empty(&self) -> bool {
            self.len() == 0
        }
    }

    impl crate::object_table::HostResource for NoopSqlTarget {
        fn as_any(&self) -> &dyn std::any::Any {
            self
        }
    }

    impl crate::object_table::HostResource for InMemoryDocumentTarget {
        fn as_any(&self) -> &dyn std::any::Any {
            self
        }
    }

    impl DocumentTarget for InMemoryDocumentTarget {
        fn upsert(&self, key: &str, document: &DocumentInner) -> Result<(), EngineError> {
            self.store.lock().unwrap().insert(
                key.to_string(),
                DocumentInner { data: document.data.clone(), cas: document.cas.clone(), meta: document.meta.clone() },
            );
            Ok(())
        }

        fn get(&self, key: &str) -> Result<Option<DocumentInner>, EngineError> {
            Ok(self
                .store
                .lock()
                .unwrap()
                .get(key)
                .map(|d| DocumentInner { data: d.data.clone(), cas: d.cas.clone(), meta: d.meta.clone() }))
        }

        fn delete(&self, key: &str) -> Result<(), EngineError> {
            self.store.lock().unwrap().remove(key);
            Ok(())
        }
    }

    #[cfg(test)]
    mod tests {
        use super::*;
        use crate::value::Json;

        #[test]
        fn document_target_upsert_get_delete_roundtrip() {
            let target = InMemoryDocumentTarget::new();
            let doc = DocumentInner { data: Json::String("x".into()), cas: None, meta: HashMap::new() };
            target.upsert("k1", &doc).unwrap();
            assert_eq!(target.len(), 1);
            assert!(target.get("k1").unwrap().is_some());
            target.delete("k1").unwrap();
            assert!(target.get("k1").unwrap().is_none());
        }

        #[test]
        fn sql_target_records_executed_statements() {
            let target = NoopSqlTarget::new();
            target.begin().unwrap();
            target.execute("insert into t values (1)", &[]).unwrap();
            target.commit().unwrap();
            assert_eq!(target.executed_statements().len(), 1);
        }
    }
}
