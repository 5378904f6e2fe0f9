//! Confined filesystem built-ins (component D, spec.md §6 "Paths").

use crate::{
    builtins::BuiltinTable,
    error::{EngineError, EvalResult, Flow},
    eval::Evaluator,
    paths::{self, Root},
    pos::SourcePos,
    scope::Scope,
    value::Value,
};

fn as_path_str(name: &str, v: &Value, pos: &SourcePos) -> EvalResult<std::rc::Rc<str>> {
    match v {
        Value::String(s) => Ok(s.clone()),
        other => Err(Flow::Error(EngineError::type_error(format!("{name}: expected a path string, found {}", other.type_name())).with_pos(pos.clone()))),
    }
}

fn read_file(eval: &Evaluator, _scope: &Scope, args: Vec<Value>, pos: &SourcePos) -> EvalResult<Value> {
    let path = as_path_str("readFile", args.first().unwrap_or(&Value::Null), pos)?;
    let resolved = paths::confine(&eval.config, Root::Data, &path).map_err(|e| Flow::Error(e.with_pos(pos.clone())))?;
    let text = std::fs::read_to_string(&resolved)
        .map_err(|e| Flow::Error(EngineError::backend(format!("reading {}: {e}", resolved.display())).with_pos(pos.clone())))?;
    Ok(Value::string(text))
}

fn write_file(eval: &Evaluator, _scope: &Scope, args: Vec<Value>, pos: &SourcePos) -> EvalResult<Value> {
    let path = as_path_str("writeFile", args.first().unwrap_or(&Value::Null), pos)?;
    let contents = args.get(1).cloned().unwrap_or(Value::Null).to_string();
    let resolved = paths::confine(&eval.config, Root::Data, &path).map_err(|e| Flow::Error(e.with_pos(pos.clone())))?;
    if let Some(parent) = resolved.parent() {
        std::fs::create_dir_all(parent)
            .map_err(|e| Flow::Error(EngineError::backend(format!("creating {}: {e}", parent.display())).with_pos(pos.clone())))?;
    }
    std::fs::write(&resolved, contents)
        .map_err(|e| Flow::Error(EngineError::backend(format!("writing {}: {e}", resolved.display())).with_pos(pos.clone())))?;
    Ok(Value::Bool(true))
}

fn append_file(eval: &Evaluator, _scope: &Scope, args: Vec<Value>, pos: &SourcePos) -> EvalResult<Value> {
    use std::io::Write;
    let path = as_path_str("appendFile", args.first().unwrap_or(&Value::Null), pos)?;
    let contents = args.get(1).cloned().unwrap_or(Value::Null).to_string();
    let resolved = paths::confine(&eval.config, Root::Data, &path).map_err(|e| Flow::Error(e.with_pos(pos.clone())))?;
    let mut file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(&resolved)
        .map_err(|e| Flow::Error(EngineError::backend(format!("opening {}: {e}", resolved.display())).with_pos(pos.clone())))?;
    file.write_all(contents.as_bytes())
        .map_err(|e| Flow::Error(EngineError::backend(format!("appending to {}: {e}", resolved.display())).with_pos(pos.clone())))?;
    Ok(Value::Bool(true))
}

fn file_exists(eval: &Evaluator, _scope: &Scope, args: Vec<Value>, pos: &SourcePos) -> EvalResult<Value> {
    let path = as_path_str("fileExists", args.first().unwrap_or(&Value::Null), pos)?;
    let resolved = paths::confine(&eval.config, Root::Data, &path).map_err(|e| Flow::Error(e.with_pos(pos.clone())))?;
    Ok(Value::Bool(resolved.exists()))
}

fn delete_file(eval: &Evaluator, _scope: &Scope, args: Vec<Value>, pos: &SourcePos) -> EvalResult<Value> {
    let path = as_path_str("deleteFile", args.first().unwrap_or(&Value::Null), pos)?;
    let resolved = paths::confine(&eval.config, Root::Data, &path).map_err(|e| Flow::Error(e.with_pos(pos.clone())))?;
    std::fs::remove_file(&resolved)
        .map_err(|e| Flow::Error(EngineError::backend(format!("deleting {}: {e}", resolved.display())).with_pos(pos.clone())))?;
    Ok(Value::Bool(true))
}

fn list_dir(eval: &Evaluator, _scope: &Scope, args: Vec<Value>, pos: &SourcePos) -> EvalResult<Value> {
    let path = as_path_str("listDir", args.first().unwrap_or(&Value::Null), pos)?;
    let resolved = paths::confine(&eval.config, Root::Data, &path).map_err(|e| Flow::Error(e.with_pos(pos.clone())))?;
    let entries = std::fs::read_dir(&resolved)
        .map_err(|e| Flow::Error(EngineError::backend(format!("listing {}: {e}", resolved.display())).with_pos(pos.clone())))?;
    let mut names = Vec::new();
    for entry in entries {
        let entry = entry.map_err(|e| Flow::Error(EngineError::backend(format!("reading directory entry: {e}")).with_pos(pos.clone())))?;
        names.push(Value::string(entry.file_name().to_string_lossy().into_owned()));
    }
    Ok(Value::array(names))
}

pub fn register(table: &mut BuiltinTable) {
    table.register("readFile", read_file);
    table.register("writeFile", write_file);
    table.register("appendFile", append_file);
    table.register("fileExists", file_exists);
    table.register("deleteFile", delete_file);
    table.register("listDir", list_dir);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{config::EngineConfig, parser::parse_program};
    use std::rc::Rc;

    #[test]
    fn write_then_read_roundtrips_under_confined_root() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = EngineConfig::default();
        config.data_root = dir.path().to_path_buf();
        let eval = Evaluator::new(Rc::new(config));

        let program = parse_program("test", r#"writeFile("a.txt", "hello")"#).unwrap();
        eval.run(&program).unwrap();

        let program = parse_program("test", r#"readFile("a.txt")"#).unwrap();
        assert!(matches!(eval.run(&program).unwrap(), Value::String(ref s) if &**s == "hello"));
    }

    #[test]
    fn traversal_outside_data_root_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = EngineConfig::default();
        config.data_root = dir.path().to_path_buf();
        let eval = Evaluator::new(Rc::new(config));
        let program = parse_program("test", r#"readFile("../../etc/passwd")"#).unwrap();
        assert!(eval.run(&program).is_err());
    }
}
