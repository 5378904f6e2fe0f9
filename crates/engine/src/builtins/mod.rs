//! Built-in function registry (component D).
//!
//! A process-lifetime mapping from function name to a handler, populated at
//! evaluator construction and grouped by concern -- one submodule per group,
//! each exposing a `register(table: &mut BuiltinTable)` function, mirroring
//! the teacher's one-file-per-builtin layout under its own `builtins/`
//! (`abs.rs`, `len.rs`, `print.rs`, ...) fed into one `Builtins` dispatch
//! table at construction time.

use std::collections::HashMap;

use crate::{eval::Evaluator, pos::SourcePos, scope::Scope, value::Value, error::EvalResult};

pub mod arithmetic;
pub mod container;
pub mod crypto;
pub mod debugger;
pub mod docstore;
pub mod etl;
pub mod file_io;
pub mod finance;
pub mod formats;
pub mod logic;
pub mod session;
pub mod sql;
pub mod string;
pub mod system;
pub mod tree;

/// A single built-in handler. Arguments have already been evaluated
/// left-to-right and had any [`Value::ScopeEntry`] envelope stripped.
pub type BuiltinFn = fn(&Evaluator, &Scope, Vec<Value>, &SourcePos) -> EvalResult<Value>;

#[derive(Default)]
pub struct BuiltinTable(HashMap<&'static str, BuiltinFn>);

impl BuiltinTable {
    pub fn register(&mut self, name: &'static str, handler: BuiltinFn) {
        self.0.insert(name, handler);
    }

    pub fn get(&self, name: &str) -> Option<BuiltinFn> {
        self.0.get(name).copied()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.0.contains_key(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &&'static str> {
        self.0.keys()
    }
}

/// Builds the registry in a fixed order, mirroring the teacher's
/// `Builtins`/`BuiltinsFunctions` construction pattern.
pub fn build_table() -> BuiltinTable {
    let mut table = BuiltinTable::default();
    arithmetic::register(&mut table);
    logic::register(&mut table);
    string::register(&mut table);
    container::register(&mut table);
    tree::register(&mut table);
    file_io::register(&mut table);
    formats::register(&mut table);
    sql::register(&mut table);
    docstore::register(&mut table);
    etl::register(&mut table);
    debugger::register(&mut table);
    session::register(&mut table);
    system::register(&mut table);
    crypto::register(&mut table);
    finance::register(&mut table);
    table
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn table_carries_every_polymorphic_op_named_in_the_contract_table() {
        let table = build_table();
        for name in [
            "length", "getAt", "setAt", "getProp", "setProp", "getAttribute", "setAttribute", "getMeta", "setMeta",
            "getAllMeta", "slice", "reverse", "contains", "indexOf", "split", "join", "apply", "clone",
        ] {
            assert!(table.contains(name), "missing builtin '{name}'");
        }
    }

    #[test]
    fn table_carries_every_finance_builtin() {
        let table = build_table();
        for name in [
            "pmt", "pv", "fv", "nper", "rate", "irr", "npv", "amortize", "balloon", "apr", "loanBalance",
            "depreciation", "interestOnlySchedule",
        ] {
            assert!(table.contains(name), "missing finance builtin '{name}'");
        }
    }
}
