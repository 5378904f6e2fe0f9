//! Script-facing document-store built-ins (component J), dispatching
//! through the [`crate::adapters::DocumentTarget`] trait registered under a
//! connection name in the evaluator's object table (spec.md §4.7 "upsert
//! key generation").

use rand::{distributions::Alphanumeric, Rng};

use crate::{
    adapters::HostConnection,
    builtins::BuiltinTable,
    error::{EngineError, ErrorKind, EvalResult, Flow},
    eval::Evaluator,
    pos::SourcePos,
    scope::Scope,
    tree::serializer::value_to_json,
    value::{DocumentInner, Value},
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

fn resolve_docstore(eval: &Evaluator, name: &str, pos: &SourcePos) -> EvalResult<std::rc::Rc<dyn crate::adapters::DocumentTarget>> {
    let resource = eval.objects.resolve(name).map_err(|e| Flow::Error(e.with_pos(pos.clone())))?;
    match resource.as_any().downcast_ref::<HostConnection>() {
        Some(HostConnection::Document(target)) => Ok(target.clone()),
        Some(HostConnection::Sql(_)) => {
            Err(Flow::Error(EngineError::new(ErrorKind::Validation, format!("'{name}' is a SQL connection, not a document-store connection")).with_pos(pos.clone())))
        }
        None => Err(Flow::Error(EngineError::new(ErrorKind::Validation, format!("'{name}' is not a host connection")).with_pos(pos.clone()))),
    }
}

/// Key generation strategies a caller can request from `generateDocKey`.
/// `Random` is the default: a short lowercase-alphanumeric suffix, cheap and
/// collision-unlikely for the session lifetimes this engine targets.
pub(crate) enum KeyStrategy {
    Random,
    Uuid,
    Timestamp,
}

impl KeyStrategy {
    fn parse(s: &str) -> Self {
        match s {
            "uuid" => Self::Uuid,
            "timestamp" => Self::Timestamp,
            _ => Self::Random,
        }
    }
}

/// Generates a document key, optionally namespaced by `prefix` (e.g. a
/// table/category name) with a `/` separator, per the chosen strategy.
/// Exposed for `builtins::etl` to call when an ETL job's target document
/// store needs a key the script didn't supply explicitly.
pub(crate) fn generate_key(prefix: Option<&str>, strategy: KeyStrategy) -> String {
    let suffix = match strategy {
        KeyStrategy::Random => {
            rand::thread_rng().sample_iter(&Alphanumeric).take(10).map(char::from).map(|c| c.to_ascii_lowercase()).collect::<String>()
        }
        KeyStrategy::Uuid => uuid::Uuid::new_v4().to_string(),
        KeyStrategy::Timestamp => chrono::Utc::now().timestamp_nanos_opt().unwrap_or_default().to_string(),
    };
    match prefix {
        Some(p) if !p.is_empty() => format!("{p}/{suffix}"),
        _ => suffix,
    }
}

fn generate_doc_key(_eval: &Evaluator, _scope: &Scope, args: Vec<Value>, pos: &SourcePos) -> EvalResult<Value> {
    let prefix = match args.first() {
        Some(Value::String(s)) => Some(s.to_string()),
        Some(Value::Null) | None => None,
        Some(other) => return Err(Flow::Error(EngineError::type_error(format!("generateDocKey: expected a prefix string, found {}", other.type_name())).with_pos(pos.clone()))),
    };
    let strategy = match args.get(1) {
        Some(Value::String(s)) => KeyStrategy::parse(s),
        _ => KeyStrategy::Random,
    };
    Ok(Value::string(generate_key(prefix.as_deref(), strategy)))
}

fn doc_upsert(eval: &Evaluator, _scope: &Scope, args: Vec<Value>, pos: &SourcePos) -> EvalResult<Value> {
    let name = connection_name(&args, pos)?;
    let target = resolve_docstore(eval, &name, pos)?;
    let Some(Value::String(key)) = args.get(1) else {
        return Err(Flow::Error(EngineError::type_error("docUpsert: expected a key string").with_pos(pos.clone())));
    };
    let payload = args.get(2).cloned().unwrap_or(Value::Null);
    let inner = match &payload {
        Value::Document(doc) => doc.borrow().clone(),
        other => DocumentInner { data: value_to_json(other), cas: None, meta: Default::default() },
    };
    target.upsert(key, &inner).map_err(|e| Flow::Error(e.with_pos(pos.clone())))?;
    Ok(Value::Bool(true))
}

fn doc_get(eval: &Evaluator, _scope: &Scope, args: Vec<Value>, pos: &SourcePos) -> EvalResult<Value> {
    let name = connection_name(&args, pos)?;
    let target = resolve_docstore(eval, &name, pos)?;
    let Some(Value::String(key)) = args.get(1) else {
        return Err(Flow::Error(EngineError::type_error("docGet: expected a key string").with_pos(pos.clone())));
    };
    match target.get(key).map_err(|e| Flow::Error(e.with_pos(pos.clone())))? {
        Some(inner) => Ok(Value::document(inner.data)),
        None => Ok(Value::Null),
    }
}

fn doc_delete(eval: &Evaluator, _scope: &Scope, args: Vec<Value>, pos: &SourcePos) -> EvalResult<Value> {
    let name = connection_name(&args, pos)?;
    let target = resolve_docstore(eval, &name, pos)?;
    let Some(Value::String(key)) = args.get(1) else {
        return Err(Flow::Error(EngineError::type_error("docDelete: expected a key string").with_pos(pos.clone())));
    };
    target.delete(key).map_err(|e| Flow::Error(e.with_pos(pos.clone())))?;
    Ok(Value::Bool(true))
}

pub fn register(table: &mut BuiltinTable) {
    table.register("generateDocKey", generate_doc_key);
    table.register("docUpsert", doc_upsert);
    table.register("docGet", doc_get);
    table.register("docDelete", doc_delete);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{adapters::test::InMemoryDocumentTarget, config::EngineConfig, parser::parse_program};
    use std::rc::Rc;

    fn eval_with_docstore() -> Evaluator {
        let eval = Evaluator::new(Rc::new(EngineConfig::default()));
        eval.objects.register("docs", Rc::new(HostConnection::Document(Rc::new(InMemoryDocumentTarget::new()))));
        eval
    }

    #[test]
    fn upsert_then_get_roundtrips_a_map_payload() {
        let eval = eval_with_docstore();
        let program = parse_program(
            "test",
            r#"docUpsert("docs", "k1", map("name", "ada")); getProp(docGet("docs", "k1"), "name")"#,
        )
        .unwrap();
        assert!(matches!(eval.run(&program).unwrap(), Value::String(ref s) if &**s == "ada"));
    }

    #[test]
    fn delete_makes_a_later_get_return_null() {
        let eval = eval_with_docstore();
        let program = parse_program("test", r#"docUpsert("docs", "k1", "x"); docDelete("docs", "k1"); docGet("docs", "k1")"#).unwrap();
        assert!(matches!(eval.run(&program).unwrap(), Value::Null));
    }

    #[test]
    fn generated_key_carries_requested_prefix() {
        let key = generate_key(Some("orders"), KeyStrategy::Random);
        assert!(key.starts_with("orders/"));
    }
}
