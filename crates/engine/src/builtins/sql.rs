//! Script-facing SQL built-ins (component J), dispatching through the
//! [`crate::adapters::SqlTarget`] trait registered under a connection name
//! in the evaluator's object table. This crate never links a concrete SQL
//! driver; an embedder registers a [`crate::adapters::HostConnection::Sql`]
//! before a script can call any of these.

use std::collections::HashMap;

use crate::{
    adapters::HostConnection,
    builtins::BuiltinTable,
    error::{EngineError, ErrorKind, EvalResult, Flow},
    eval::Evaluator,
    pos::SourcePos,
    scope::Scope,
    tree::serializer::value_to_json,
    value::{Json, Value},
};

fn connection_name(args: &[Value], pos: &SourcePos) -> EvalResult<std::rc::Rc<str>> {
    match args.first() {
        Some(Value::String(s)) => Ok(s.clone()),
        other => Err(Flow::Error(
            EngineError::type_error(format!(
                "expected a connection name string, found {}",
                other.map(Value::type_name).unwrap_or("nothing")
            ))
            .with_pos(pos.clone()),
        )),
    }
}

fn resolve_sql(eval: &Evaluator, name: &str, pos: &SourcePos) -> EvalResult<std::rc::Rc<dyn crate::adapters::SqlTarget>> {
    let resource = eval.objects.resolve(name).map_err(|e| Flow::Error(e.with_pos(pos.clone())))?;
    match resource.as_any().downcast_ref::<HostConnection>() {
        Some(HostConnection::Sql(target)) => Ok(target.clone()),
        Some(HostConnection::Document(_)) => Err(Flow::Error(
            EngineError::new(ErrorKind::Validation, format!("'{name}' is a document-store connection, not a SQL connection")).with_pos(pos.clone()),
        )),
        None => Err(Flow::Error(EngineError::new(ErrorKind::Validation, format!("'{name}' is not a host connection")).with_pos(pos.clone()))),
    }
}

fn as_params(v: Option<&Value>) -> Vec<Value> {
    match v {
        Some(Value::Array(items)) => items.borrow().clone(),
        Some(Value::Null) | None => Vec::new(),
        Some(other) => vec![other.clone()],
    }
}

fn row_to_value(row: HashMap<String, Value>) -> Value {
    Value::map(row)
}

fn sql_begin(eval: &Evaluator, _scope: &Scope, args: Vec<Value>, pos: &SourcePos) -> EvalResult<Value> {
    let name = connection_name(&args, pos)?;
    let target = resolve_sql(eval, &name, pos)?;
    target.begin().map_err(|e| Flow::Error(e.with_pos(pos.clone())))?;
    Ok(Value::Bool(true))
}

fn sql_execute(eval: &Evaluator, _scope: &Scope, args: Vec<Value>, pos: &SourcePos) -> EvalResult<Value> {
    let name = connection_name(&args, pos)?;
    let target = resolve_sql(eval, &name, pos)?;
    let Some(Value::String(statement)) = args.get(1) else {
        return Err(Flow::Error(EngineError::type_error("sqlExecute: expected a statement string").with_pos(pos.clone())));
    };
    let params = as_params(args.get(2));
    let affected = target.execute(statement, &params).map_err(|e| Flow::Error(e.with_pos(pos.clone())))?;
    Ok(Value::Number(affected as f64))
}

fn sql_query(eval: &Evaluator, _scope: &Scope, args: Vec<Value>, pos: &SourcePos) -> EvalResult<Value> {
    let name = connection_name(&args, pos)?;
    let target = resolve_sql(eval, &name, pos)?;
    let Some(Value::String(statement)) = args.get(1) else {
        return Err(Flow::Error(EngineError::type_error("sqlQuery: expected a statement string").with_pos(pos.clone())));
    };
    let params = as_params(args.get(2));
    let rows = target.query(statement, &params).map_err(|e| Flow::Error(e.with_pos(pos.clone())))?;
    Ok(Value::array(rows.into_iter().map(row_to_value).collect()))
}

fn sql_commit(eval: &Evaluator, _scope: &Scope, args: Vec<Value>, pos: &SourcePos) -> EvalResult<Value> {
    let name = connection_name(&args, pos)?;
    let target = resolve_sql(eval, &name, pos)?;
    target.commit().map_err(|e| Flow::Error(e.with_pos(pos.clone())))?;
    Ok(Value::Bool(true))
}

fn sql_rollback(eval: &Evaluator, _scope: &Scope, args: Vec<Value>, pos: &SourcePos) -> EvalResult<Value> {
    let name = connection_name(&args, pos)?;
    let target = resolve_sql(eval, &name, pos)?;
    target.rollback().map_err(|e| Flow::Error(e.with_pos(pos.clone())))?;
    Ok(Value::Bool(true))
}

/// Flattens a row (a script `Map`) into a sorted `(column, json)` list so
/// generated statements are deterministic across runs (spec.md §4.7 "batch
/// writer"). Exposed for `builtins::etl` to reuse when writing batches.
pub(crate) fn row_columns(row: &Value) -> Vec<(String, Json)> {
    let mut columns: Vec<(String, Json)> = match row {
        Value::Map(m) => m.borrow().iter().map(|(k, v)| (k.clone(), value_to_json(v))).collect(),
        other => vec![("value".to_string(), value_to_json(other))],
    };
    columns.sort_by(|a, b| a.0.cmp(&b.0));
    columns
}

pub fn register(table: &mut BuiltinTable) {
    table.register("sqlBegin", sql_begin);
    table.register("sqlExecute", sql_execute);
    table.register("sqlQuery", sql_query);
    table.register("sqlCommit", sql_commit);
    table.register("sqlRollback", sql_rollback);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{adapters::test::NoopSqlTarget, config::EngineConfig, parser::parse_program};
    use std::rc::Rc;

    fn eval_with_sql() -> Evaluator {
        let eval = Evaluator::new(Rc::new(EngineConfig::default()));
        eval.objects.register("db", Rc::new(HostConnection::Sql(Rc::new(NoopSqlTarget::new()))));
        eval
    }

    #[test]
    fn execute_then_commit_roundtrips_through_noop_target() {
        let eval = eval_with_sql();
        let program = parse_program("test", r#"sqlBegin("db"); sqlExecute("db", "insert into t values (1)"); sqlCommit("db")"#).unwrap();
        assert!(matches!(eval.run(&program).unwrap(), Value::Bool(true)));
    }

    #[test]
    fn query_against_unregistered_connection_is_resolution_error() {
        let eval = Evaluator::new(Rc::new(EngineConfig::default()));
        let program = parse_program("test", r#"sqlQuery("missing", "select 1")"#).unwrap();
        assert!(eval.run(&program).is_err());
    }
}
