//! JSON/YAML document built-ins (component D), independent of tree
//! snapshots (component E handles those via `saveTree`/`loadTree`).

use crate::{
    builtins::BuiltinTable,
    error::{EngineError, EvalResult, Flow},
    eval::Evaluator,
    pos::SourcePos,
    scope::Scope,
    tree::serializer::{json_to_value, value_to_json},
    value::{Json, Value},
};

fn to_json(_eval: &Evaluator, _scope: &Scope, args: Vec<Value>, pos: &SourcePos) -> EvalResult<Value> {
    let v = args.first().cloned().unwrap_or(Value::Null);
    let json = match &v {
        Value::Document(doc) => doc.borrow().data.clone(),
        other => value_to_json(other),
    };
    serde_json::to_string_pretty(&json)
        .map(Value::string)
        .map_err(|e| Flow::Error(EngineError::backend(format!("toJson: {e}")).with_pos(pos.clone())))
}

fn from_json(_eval: &Evaluator, _scope: &Scope, args: Vec<Value>, pos: &SourcePos) -> EvalResult<Value> {
    let Value::String(text) = args.first().cloned().unwrap_or(Value::Null) else {
        return Err(Flow::Error(EngineError::type_error("fromJson: expected a string").with_pos(pos.clone())));
    };
    let json: Json = serde_json::from_str(&text).map_err(|e| Flow::Error(EngineError::validation(format!("fromJson: {e}")).with_pos(pos.clone())))?;
    Ok(json_to_value(&json))
}

fn to_yaml(_eval: &Evaluator, _scope: &Scope, args: Vec<Value>, pos: &SourcePos) -> EvalResult<Value> {
    let v = args.first().cloned().unwrap_or(Value::Null);
    let json = match &v {
        Value::Document(doc) => doc.borrow().data.clone(),
        other => value_to_json(other),
    };
    serde_yaml::to_string(&json)
        .map(Value::string)
        .map_err(|e| Flow::Error(EngineError::backend(format!("toYaml: {e}")).with_pos(pos.clone())))
}

fn from_yaml(_eval: &Evaluator, _scope: &Scope, args: Vec<Value>, pos: &SourcePos) -> EvalResult<Value> {
    let Value::String(text) = args.first().cloned().unwrap_or(Value::Null) else {
        return Err(Flow::Error(EngineError::type_error("fromYaml: expected a string").with_pos(pos.clone())));
    };
    let json: Json = serde_yaml::from_str(&text).map_err(|e| Flow::Error(EngineError::validation(format!("fromYaml: {e}")).with_pos(pos.clone())))?;
    Ok(json_to_value(&json))
}

fn new_document(_eval: &Evaluator, _scope: &Scope, args: Vec<Value>, _pos: &SourcePos) -> EvalResult<Value> {
    let v = args.into_iter().next().unwrap_or(Value::Null);
    let json = match &v {
        Value::Document(doc) => doc.borrow().data.clone(),
        other => value_to_json(other),
    };
    Ok(Value::document(json))
}

fn document_data(_eval: &Evaluator, _scope: &Scope, args: Vec<Value>, pos: &SourcePos) -> EvalResult<Value> {
    match args.first() {
        Some(Value::Document(doc)) => Ok(json_to_value(&doc.borrow().data)),
        Some(other) => Err(Flow::Error(EngineError::type_error(format!("documentData: expected a document, found {}", other.type_name())).with_pos(pos.clone()))),
        None => Err(Flow::Error(EngineError::validation("documentData: missing argument").with_pos(pos.clone()))),
    }
}

fn document_cas(_eval: &Evaluator, _scope: &Scope, args: Vec<Value>, pos: &SourcePos) -> EvalResult<Value> {
    match args.first() {
        Some(Value::Document(doc)) => Ok(doc.borrow().cas.clone().map(Value::string).unwrap_or(Value::Null)),
        Some(other) => Err(Flow::Error(EngineError::type_error(format!("documentCas: expected a document, found {}", other.type_name())).with_pos(pos.clone()))),
        None => Err(Flow::Error(EngineError::validation("documentCas: missing argument").with_pos(pos.clone()))),
    }
}

fn set_document_cas(_eval: &Evaluator, _scope: &Scope, args: Vec<Value>, pos: &SourcePos) -> EvalResult<Value> {
    match (args.first(), args.get(1)) {
        (Some(Value::Document(doc)), Some(Value::String(cas))) => {
            doc.borrow_mut().cas = Some(cas.to_string());
            Ok(Value::Document(doc.clone()))
        }
        _ => Err(Flow::Error(EngineError::type_error("setDocumentCas: expected (document, string)").with_pos(pos.clone()))),
    }
}

pub fn register(table: &mut BuiltinTable) {
    table.register("toJson", to_json);
    table.register("fromJson", from_json);
    table.register("toYaml", to_yaml);
    table.register("fromYaml", from_yaml);
    table.register("newDocument", new_document);
    table.register("documentData", document_data);
    table.register("documentCas", document_cas);
    table.register("setDocumentCas", set_document_cas);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{config::EngineConfig, parser::parse_program};
    use std::rc::Rc;

    fn run(src: &str) -> Value {
        let program = parse_program("test", src).unwrap();
        let eval = Evaluator::new(Rc::new(EngineConfig::default()));
        eval.run(&program).unwrap()
    }

    #[test]
    fn json_roundtrip_preserves_map_shape() {
        let v = run(r#"declare(m, map("a", 1)); getProp(fromJson(toJson(m)), "a")"#);
        assert!(matches!(v, Value::Number(n) if n == 1.0));
    }

    #[test]
    fn document_data_reads_back_constructed_payload() {
        let v = run(r#"declare(d, newDocument(map("name", "x"))); getProp(documentData(d), "name")"#);
        assert!(matches!(v, Value::String(ref s) if &**s == "x"));
    }
}
