//! ETL pipeline (component G, spec.md §4.7): a field-mapping transform
//! applied to a streamed, batched CSV source, committed into a SQL or
//! document target with per-batch transaction semantics, per-row error
//! collection, archival on success, and job-status journaling.
//!
//! `createTransform` is a declaration special form (spec.md §4.3, §9):
//! its argument list is unevaluated AST, dispatched here from
//! [`crate::eval::Evaluator::eval_declare`] rather than through the normal
//! built-in table, because the per-field scripts it packages must stay as
//! closures rather than being executed at declaration time.

use std::collections::HashMap;

use crate::{
    adapters::HostConnection,
    ast::Node,
    builtins::{
        docstore::{generate_key, KeyStrategy},
        sql::row_columns,
        BuiltinTable,
    },
    config::EngineConfig,
    error::{EngineError, EvalResult, Flow},
    eval::Evaluator,
    function::FunctionDef,
    paths::{self, Root},
    pos::SourcePos,
    scope::Scope,
    tree::{
        arena::{NodeId, TreeKind},
        csv_node,
    },
    value::{DocumentInner, Value},
};

/// One resolved field mapping: spec.md §4.7 "named tree node holding an
/// ordered list of field mappings".
struct MappingDef {
    source_column: String,
    target_column: String,
    target_type: String,
    required: bool,
    default_value: String,
    program: Option<std::rc::Rc<FunctionDef>>,
    named_transform: Option<String>,
}

/// `mapField(sourceColumn, targetColumn, targetType, required, defaultValue, scriptOrName?)`
/// packages one field mapping as a `Map`, evaluated like any other built-in
/// call (its arguments, including a `func(...) { .. }` literal, are already
/// evaluated positional values by the time this runs).
fn map_field(_eval: &Evaluator, _scope: &Scope, args: Vec<Value>, pos: &SourcePos) -> EvalResult<Value> {
    let get_str = |i: usize, name: &str| -> EvalResult<String> {
        match args.get(i) {
            Some(Value::String(s)) => Ok(s.to_string()),
            other => Err(Flow::Error(EngineError::type_error(format!("mapField: argument {} ({name}) must be a string, found {}", i + 1, other.map(Value::type_name).unwrap_or("nothing"))).with_pos(pos.clone()))),
        }
    };
    let mut fields = HashMap::new();
    fields.insert("sourceColumn".to_string(), Value::string(get_str(0, "sourceColumn")?));
    fields.insert("targetColumn".to_string(), Value::string(get_str(1, "targetColumn")?));
    fields.insert("targetType".to_string(), Value::string(get_str(2, "targetType")?));
    let required = args.get(3).map(Value::truthy).unwrap_or(false);
    fields.insert("required".to_string(), Value::Bool(required));
    let default_value = match args.get(4) {
        Some(Value::String(s)) => s.to_string(),
        _ => String::new(),
    };
    fields.insert("defaultValue".to_string(), Value::string(default_value));
    match args.get(5) {
        Some(v @ Value::Function(_)) => {
            fields.insert("program".to_string(), v.clone());
        }
        Some(Value::String(name)) => {
            fields.insert("namedTransform".to_string(), Value::string(name.clone()));
        }
        _ => {}
    }
    Ok(Value::map(fields))
}

/// `createTransform(name, mapField(...), mapField(...), ...)`: builds a
/// tree node named `name` whose children are one node per mapping, and
/// binds `name` to it in the declaring scope (the binding itself happens in
/// `eval_declare`; this only builds the value).
pub fn create_transform(eval: &Evaluator, target: &str, rest: &[Node], scope: &Scope) -> EvalResult<Value> {
    let transform_id = eval.trees.new_node(target.to_string());
    for node in rest {
        let mapping = eval.eval_node(scope, node)?.unwrap_scope_entry();
        let Value::Map(fields) = mapping else {
            return Err(Flow::Error(EngineError::type_error("createTransform: each mapping must be produced by mapField(...)").with_pos(node.pos.clone())));
        };
        let fields = fields.borrow();
        let child = eval.trees.new_node("mapping");
        for (k, v) in fields.iter() {
            eval.trees.set_attribute(child, k, v.clone());
        }
        eval.trees.add_child(transform_id, child);
    }
    Ok(Value::TreeNode(eval.trees.clone(), transform_id))
}

fn read_mappings(eval: &Evaluator, transform_id: NodeId, pos: &SourcePos) -> EvalResult<Vec<MappingDef>> {
    let mut mappings = Vec::new();
    for child in eval.trees.children(transform_id) {
        let attrs = eval.trees.attributes(child);
        let get = |key: &str| attrs.get(key).cloned().unwrap_or(Value::Null);
        let as_string = |v: Value| match v {
            Value::String(s) => s.to_string(),
            _ => String::new(),
        };
        let program = match get("program") {
            Value::Function(f) => Some(f),
            _ => None,
        };
        let named_transform = match get("namedTransform") {
            Value::String(s) => Some(s.to_string()),
            _ => None,
        };
        mappings.push(MappingDef {
            source_column: as_string(get("sourceColumn")),
            target_column: as_string(get("targetColumn")),
            target_type: as_string(get("targetType")),
            required: get("required").truthy(),
            default_value: as_string(get("defaultValue")),
            program,
            named_transform,
        });
    }
    if mappings.is_empty() {
        return Err(Flow::Error(EngineError::validation("doETL: transform has no field mappings").with_pos(pos.clone())));
    }
    Ok(mappings)
}

fn apply_named_transform(name: &str, value: Value) -> Value {
    let s = value.to_string();
    match name {
        "trim" => Value::string(s.trim().to_string()),
        "upper" => Value::string(s.to_uppercase()),
        "lower" => Value::string(s.to_lowercase()),
        _ => Value::string(s),
    }
}

fn coerce_value(value: &Value, target_type: &str) -> Result<Value, String> {
    let text = value.to_string();
    match target_type.to_ascii_uppercase().as_str() {
        "INT" => match value {
            Value::Number(n) => Ok(Value::Number(n.trunc())),
            _ => text.trim().parse::<i64>().map(|n| Value::Number(n as f64)).map_err(|e| format!("cannot coerce '{text}' to INT: {e}")),
        },
        "DECIMAL" | "FLOAT" => match value {
            Value::Number(n) => Ok(Value::Number(*n)),
            _ => text.trim().parse::<f64>().map(Value::Number).map_err(|e| format!("cannot coerce '{text}' to DECIMAL: {e}")),
        },
        "VARCHAR" | "TEXT" | "STRING" => Ok(Value::string(text)),
        "DATETIME" | "TIMESTAMP" => {
            chrono::DateTime::parse_from_rfc3339(&text)
                .map(|dt| Value::string(dt.to_rfc3339()))
                .or_else(|_| text.trim().parse::<i64>().map(|secs| Value::string(chrono::DateTime::from_timestamp(secs, 0).map(|dt| dt.to_rfc3339()).unwrap_or(text.clone()))))
                .map_err(|e| format!("cannot coerce '{text}' to DATETIME: {e}"))
        }
        "BOOL" => match value {
            Value::Bool(b) => Ok(Value::Bool(*b)),
            _ => match text.trim().to_ascii_lowercase().as_str() {
                "true" | "1" | "yes" => Ok(Value::Bool(true)),
                "false" | "0" | "no" | "" => Ok(Value::Bool(false)),
                other => Err(format!("cannot coerce '{other}' to BOOL")),
            },
        },
        other => Err(format!("unknown target type '{other}'")),
    }
}

enum Target {
    Sql { conn: std::rc::Rc<dyn crate::adapters::SqlTarget>, table: String },
    Document { conn: std::rc::Rc<dyn crate::adapters::DocumentTarget> },
    Noop,
}

fn resolve_target(eval: &Evaluator, target_config: &HashMap<String, Value>, pos: &SourcePos) -> EvalResult<Target> {
    let kind = match target_config.get("kind") {
        Some(Value::String(s)) => s.to_string(),
        _ => "test".to_string(),
    };
    match kind.as_str() {
        "sql" => {
            let Some(Value::String(conn_name)) = target_config.get("connection") else {
                return Err(Flow::Error(EngineError::validation("doETL: sql target requires a 'connection' name").with_pos(pos.clone())));
            };
            let Some(Value::String(table)) = target_config.get("table") else {
                return Err(Flow::Error(EngineError::validation("doETL: sql target requires a 'table' name").with_pos(pos.clone())));
            };
            let resource = eval.objects.resolve(conn_name).map_err(|e| Flow::Error(e.with_pos(pos.clone())))?;
            match resource.as_any().downcast_ref::<HostConnection>() {
                Some(HostConnection::Sql(conn)) => Ok(Target::Sql { conn: conn.clone(), table: table.to_string() }),
                _ => Err(Flow::Error(EngineError::validation(format!("'{conn_name}' is not a SQL connection")).with_pos(pos.clone()))),
            }
        }
        "document" => {
            let Some(Value::String(conn_name)) = target_config.get("connection") else {
                return Err(Flow::Error(EngineError::validation("doETL: document target requires a 'connection' name").with_pos(pos.clone())));
            };
            let resource = eval.objects.resolve(conn_name).map_err(|e| Flow::Error(e.with_pos(pos.clone())))?;
            match resource.as_any().downcast_ref::<HostConnection>() {
                Some(HostConnection::Document(conn)) => Ok(Target::Document { conn: conn.clone() }),
                _ => Err(Flow::Error(EngineError::validation(format!("'{conn_name}' is not a document-store connection")).with_pos(pos.clone()))),
            }
        }
        _ => Ok(Target::Noop),
    }
}

/// Sources a key prefix from `table_name`/`type`/`category` columns on the
/// row, lowercased with spaces replaced by underscores (spec.md §4.7).
fn document_key_prefix(row: &HashMap<String, Value>) -> Option<String> {
    for key in ["table_name", "type", "category"] {
        if let Some(Value::String(s)) = row.get(key) {
            return Some(s.to_lowercase().replace(' ', "_"));
        }
    }
    None
}

fn insert_statement(table: &str, columns: &[(String, crate::value::Json)]) -> (String, Vec<Value>) {
    let names: Vec<&str> = columns.iter().map(|(k, _)| k.as_str()).collect();
    let placeholders: Vec<&str> = names.iter().map(|_| "?").collect();
    let statement = format!("INSERT INTO {table} ({}) VALUES ({})", names.join(", "), placeholders.join(", "));
    let params = columns.iter().map(|(_, v)| crate::tree::serializer::json_to_value(v)).collect();
    (statement, params)
}

struct RowOutcome {
    values: HashMap<String, Value>,
    errors: Vec<String>,
}

fn process_row(eval: &Evaluator, mappings: &[MappingDef], headers: &[String], row: &[String], row_index: usize) -> EvalResult<RowOutcome> {
    let mut values = HashMap::new();
    let mut errors = Vec::new();
    let source_row = Value::array(row.iter().map(|c| Value::string(c.clone())).collect());

    for mapping in mappings {
        let col_index = headers.iter().position(|h| h == &mapping.source_column);
        let raw = col_index.and_then(|i| row.get(i)).cloned().unwrap_or_default();
        let is_empty = raw.trim().is_empty();

        let mut is_default = false;
        let effective = if is_empty {
            if mapping.required {
                errors.push(format!("{}: required source column '{}' was empty", mapping.target_column, mapping.source_column));
                continue;
            }
            is_default = true;
            Value::string(mapping.default_value.clone())
        } else {
            Value::string(raw.clone())
        };

        let transformed = if let Some(func) = &mapping.program {
            let args = vec![
                effective,
                source_row.clone(),
                Value::string(mapping.source_column.clone()),
                Value::string(mapping.target_type.clone()),
                Value::string(mapping.target_column.clone()),
                Value::Bool(mapping.required),
                Value::string(mapping.default_value.clone()),
                Value::Number(row_index as f64),
                Value::Bool(is_empty),
                Value::Bool(is_default),
            ];
            match eval.call_function(func, args, &SourcePos::synthetic()) {
                Ok(v) => v,
                Err(Flow::Error(e)) => {
                    errors.push(format!("{}: {}", mapping.target_column, e.message));
                    continue;
                }
                Err(sentinel @ Flow::Sentinel(_)) => return Err(sentinel),
            }
        } else if let Some(name) = &mapping.named_transform {
            apply_named_transform(name, effective)
        } else {
            effective
        };

        match coerce_value(&transformed, &mapping.target_type) {
            Ok(v) => {
                values.insert(mapping.target_column.clone(), v);
            }
            Err(msg) => errors.push(format!("{}: {msg}", mapping.target_column)),
        }
    }

    Ok(RowOutcome { values, errors })
}

fn now_rfc3339() -> String {
    chrono::Utc::now().to_rfc3339()
}

fn append_batch_log(eval: &Evaluator, log_node: NodeId, batch_no: usize, row_count: usize, success: usize, errors: usize, row_errors: &[String], duration_ms: u128) {
    let mut entries = match eval.trees.get_attribute(log_node, "batches") {
        Value::Array(items) => items.borrow().clone(),
        _ => Vec::new(),
    };
    let mut entry = HashMap::new();
    entry.insert("batchNumber".to_string(), Value::Number(batch_no as f64));
    entry.insert("rowCount".to_string(), Value::Number(row_count as f64));
    entry.insert("successCount".to_string(), Value::Number(success as f64));
    entry.insert("errorCount".to_string(), Value::Number(errors as f64));
    entry.insert("durationMs".to_string(), Value::Number(duration_ms as f64));
    entry.insert("timestamp".to_string(), Value::string(now_rfc3339()));
    entry.insert("rowErrors".to_string(), Value::array(row_errors.iter().map(|e| Value::string(e.clone())).collect()));
    entries.push(Value::map(entry));
    eval.trees.set_attribute(log_node, "batches", Value::array(entries));

    let total_rows = match eval.trees.get_attribute(log_node, "totalRows") {
        Value::Number(n) => n,
        _ => 0.0,
    };
    let total_success = match eval.trees.get_attribute(log_node, "successCount") {
        Value::Number(n) => n,
        _ => 0.0,
    };
    let total_errors = match eval.trees.get_attribute(log_node, "errorCount") {
        Value::Number(n) => n,
        _ => 0.0,
    };
    eval.trees.set_attribute(log_node, "totalRows", Value::Number(total_rows + row_count as f64));
    eval.trees.set_attribute(log_node, "successCount", Value::Number(total_success + success as f64));
    eval.trees.set_attribute(log_node, "errorCount", Value::Number(total_errors + errors as f64));
}

/// `doETL(source, transform, targetConfig, clientId?)`: drives the whole
/// pipeline and returns `{status, rowsProcessed, rowsFailed, jobId,
/// archivePath}`.
fn do_etl(eval: &Evaluator, _scope: &Scope, args: Vec<Value>, pos: &SourcePos) -> EvalResult<Value> {
    let transform_id = match args.get(1) {
        Some(Value::TreeNode(arena, id)) if arena.same_arena(&eval.trees) => *id,
        _ => return Err(Flow::Error(EngineError::type_error("doETL: expected transform as the second argument (from createTransform)").with_pos(pos.clone()))),
    };
    let target_config = match args.get(2) {
        Some(Value::Map(m)) => m.borrow().clone(),
        _ => return Err(Flow::Error(EngineError::type_error("doETL: expected a target config map as the third argument").with_pos(pos.clone()))),
    };
    let client_id = args.get(3).cloned().unwrap_or(Value::Null);

    let job_id = format!("etl_job_{}", generate_key(None, KeyStrategy::Random));
    let root = eval.trees.new_node(job_id.clone());
    eval.trees.set_attribute(root, "jobId", Value::string(job_id.clone()));
    eval.trees.set_attribute(root, "clientId", client_id);
    eval.trees.set_attribute(root, "startTime", Value::string(now_rfc3339()));
    eval.trees.set_attribute(root, "status", Value::string("initializing"));
    if let Some(Value::String(table)) = target_config.get("table") {
        eval.trees.set_attribute(root, "tableName", Value::string(table.clone()));
    }

    let source_id = match args.first() {
        Some(Value::TreeNode(arena, id)) if arena.same_arena(&eval.trees) => *id,
        Some(Value::String(path)) => {
            let source_id = eval.trees.new_node_with_kind("source_data", TreeKind::Csv(Default::default()));
            let resolved = paths::confine(&eval.config, Root::Data, path).map_err(|e| Flow::Error(e.with_pos(pos.clone())))?;
            csv_node::load_from_file(&eval.trees, source_id, resolved, b',', true).map_err(|e| Flow::Error(e.with_pos(pos.clone())))?;
            source_id
        }
        _ => return Err(Flow::Error(EngineError::type_error("doETL: expected a CSV source path or tree node as the first argument").with_pos(pos.clone()))),
    };
    eval.trees.add_child(root, source_id);
    eval.trees.add_child(root, transform_id);

    let target_config_id = eval.trees.new_node_with_kind("target_config", TreeKind::Json);
    for (k, v) in &target_config {
        eval.trees.set_attribute(target_config_id, k, v.clone());
    }
    eval.trees.add_child(root, target_config_id);

    let log_id = eval.trees.new_node_with_kind("processing_log", TreeKind::Json);
    eval.trees.set_attribute(log_id, "batches", Value::array(Vec::new()));
    eval.trees.set_attribute(log_id, "totalRows", Value::Number(0.0));
    eval.trees.set_attribute(log_id, "successCount", Value::Number(0.0));
    eval.trees.set_attribute(log_id, "errorCount", Value::Number(0.0));
    eval.trees.add_child(root, log_id);

    eval.trees.set_attribute(root, "status", Value::string("processing"));

    let mappings = read_mappings(eval, transform_id, pos)?;
    let headers = csv_node::get_headers(&eval.trees, source_id).map_err(|e| Flow::Error(e.with_pos(pos.clone())))?;
    let target = resolve_target(eval, &target_config, pos)?;

    let mut row_index = 0usize;
    let mut batch_no = 0usize;
    let mut total_success = 0usize;
    let mut total_errors = 0usize;
    let mut first_err: Option<Flow> = None;

    let batch_size = eval.config.etl_batch_size.max(1);
    let stream_result = csv_node::stream_process(&eval.trees, source_id, batch_size, |rows| {
        let started = std::time::Instant::now();
        batch_no += 1;
        let mut batch_success = 0usize;
        let mut batch_errors = 0usize;
        let mut row_errors = Vec::new();
        let mut poisoned = false;

        if matches!(target, Target::Sql { .. }) {
            if let Target::Sql { conn, .. } = &target {
                if let Err(e) = conn.begin() {
                    return Err(e);
                }
            }
        }

        for row in rows {
            let outcome = match process_row(eval, &mappings, &headers, row, row_index) {
                Ok(o) => o,
                Err(flow) => {
                    first_err = Some(flow);
                    return Err(EngineError::backend("aborted by escaping control flow inside a field script"));
                }
            };
            row_index += 1;

            if !outcome.errors.is_empty() {
                row_errors.extend(outcome.errors.iter().map(|e| format!("row {row_index}: {e}")));
                batch_errors += 1;
                continue;
            }

            match &target {
                Target::Sql { conn, table } => {
                    let columns = row_columns(&Value::map(outcome.values));
                    let (statement, params) = insert_statement(table, &columns);
                    match conn.execute(&statement, &params) {
                        Ok(_) => batch_success += 1,
                        Err(e) => {
                            row_errors.push(format!("row {row_index}: {}", e.message));
                            batch_errors += 1;
                            poisoned = true;
                        }
                    }
                }
                Target::Document { conn } => {
                    let prefix = document_key_prefix(&outcome.values);
                    let key = generate_key(prefix.as_deref(), KeyStrategy::Random);
                    let json = crate::tree::serializer::value_to_json(&Value::map(outcome.values));
                    let doc = DocumentInner { data: json, cas: None, meta: HashMap::new() };
                    match conn.upsert(&key, &doc) {
                        Ok(()) => batch_success += 1,
                        Err(e) => {
                            row_errors.push(format!("row {row_index}: {}", e.message));
                            batch_errors += 1;
                        }
                    }
                }
                Target::Noop => batch_success += 1,
            }
        }

        if let Target::Sql { conn, .. } = &target {
            if poisoned {
                let _ = conn.rollback();
            } else if let Err(e) = conn.commit() {
                row_errors.push(format!("batch {batch_no} commit failed: {}", e.message));
                batch_errors += rows.len().saturating_sub(batch_success);
                batch_success = 0;
                let _ = conn.rollback();
            }
        }

        total_success += batch_success;
        total_errors += batch_errors;
        append_batch_log(eval, log_id, batch_no, rows.len(), batch_success, batch_errors, &row_errors, started.elapsed().as_millis());
        Ok(())
    });

    if let Some(flow) = first_err {
        eval.trees.set_attribute(root, "status", Value::string("failed"));
        eval.trees.set_attribute(root, "endTime", Value::string(now_rfc3339()));
        return Err(flow);
    }
    if let Err(e) = stream_result {
        eval.trees.set_attribute(root, "status", Value::string("failed"));
        eval.trees.set_attribute(root, "endTime", Value::string(now_rfc3339()));
        return Err(Flow::Error(e.with_pos(pos.clone())));
    }

    eval.trees.set_attribute(root, "endTime", Value::string(now_rfc3339()));
    eval.trees.set_attribute(root, "status", Value::string("completed"));

    let archive_path = archive_source(eval, source_id, &job_id);
    match &archive_path {
        Some(p) => eval.trees.set_attribute(root, "archivePath", Value::string(p.clone())),
        None => eval.trees.set_attribute(log_id, "archiveError", Value::string("failed to archive source file")),
    }

    eval.log(crate::log::Level::Info, "etl", &format!("etl.completed jobId={job_id} rowsProcessed={row_index} success={total_success} errors={total_errors}"));

    let mut result = HashMap::new();
    result.insert("jobId".to_string(), Value::string(job_id));
    result.insert("status".to_string(), Value::string("completed"));
    result.insert("rowsProcessed".to_string(), Value::Number(row_index as f64));
    result.insert("rowsSucceeded".to_string(), Value::Number(total_success as f64));
    result.insert("rowsFailed".to_string(), Value::Number(total_errors as f64));
    result.insert("archivePath".to_string(), archive_path.map(Value::string).unwrap_or(Value::Null));
    result.insert("jobNode".to_string(), Value::TreeNode(eval.trees.clone(), root));
    Ok(Value::map(result))
}

fn archive_source(eval: &Evaluator, source_id: NodeId, job_id: &str) -> Option<String> {
    let Value::String(source_path) = eval.trees.get_meta(source_id, "sourcePath") else { return None };
    let path = std::path::Path::new(&*source_path);
    let basename = path.file_name()?.to_string_lossy().into_owned();
    let dest = paths::confine(&eval.config, Root::Data, &format!("archive/{job_id}_{basename}")).ok()?;
    let parent = dest.parent()?;
    std::fs::create_dir_all(parent).ok()?;
    std::fs::rename(path, &dest).ok()?;
    Some(dest.display().to_string())
}

pub fn register(table: &mut BuiltinTable) {
    table.register("mapField", map_field);
    table.register("doETL", do_etl);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{adapters::test::NoopSqlTarget, config::EngineConfig, parser::parse_program};
    use std::{io::Write, rc::Rc};

    fn write_csv(dir: &tempfile::TempDir, name: &str, content: &str) -> String {
        let path = dir.path().join(name);
        let mut f = std::fs::File::create(&path).unwrap();
        f.write_all(content.as_bytes()).unwrap();
        name.to_string()
    }

    #[test]
    fn csv_to_sql_etl_inserts_every_row_and_completes() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = EngineConfig::default();
        config.data_root = dir.path().to_path_buf();
        let name = write_csv(&dir, "orders.csv", "id,amt\n1,10\n2,20\n3,30\n");

        let eval = Evaluator::new(Rc::new(config));
        let target = Rc::new(NoopSqlTarget::new());
        eval.objects.register("db", Rc::new(HostConnection::Sql(target.clone())));

        let program = parse_program(
            "test",
            &format!(
                r#"
                createTransform(t,
                    mapField("id", "id", "INT", true, ""),
                    mapField("amt", "amt", "DECIMAL", true, "0")
                );
                doETL("{name}", t, map("kind", "sql", "connection", "db", "table", "t"))
                "#
            ),
        )
        .unwrap();

        let result = eval.run(&program).unwrap();
        let Value::Map(fields) = result else { panic!("expected a map result") };
        let fields = fields.borrow();
        assert!(matches!(fields.get("status"), Some(Value::String(s)) if &**s == "completed"));
        assert!(matches!(fields.get("rowsProcessed"), Some(Value::Number(n)) if *n == 3.0));
        assert!(matches!(fields.get("archivePath"), Some(Value::String(_))));
        assert_eq!(target.executed_statements().len(), 3);
    }

    #[test]
    fn required_field_empty_fails_only_that_row() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = EngineConfig::default();
        config.data_root = dir.path().to_path_buf();
        let name = write_csv(&dir, "orders.csv", "id,amt\n1,10\n,20\n3,30\n");

        let eval = Evaluator::new(Rc::new(config));
        eval.objects.register("db", Rc::new(HostConnection::Sql(Rc::new(NoopSqlTarget::new()))));

        let program = parse_program(
            "test",
            &format!(
                r#"
                createTransform(t,
                    mapField("id", "id", "INT", true, ""),
                    mapField("amt", "amt", "DECIMAL", true, "0")
                );
                doETL("{name}", t, map("kind", "sql", "connection", "db", "table", "t"))
                "#
            ),
        )
        .unwrap();

        let result = eval.run(&program).unwrap();
        let Value::Map(fields) = result else { panic!("expected a map result") };
        let fields = fields.borrow();
        assert!(matches!(fields.get("rowsFailed"), Some(Value::Number(n)) if *n == 1.0));
        assert!(matches!(fields.get("rowsSucceeded"), Some(Value::Number(n)) if *n == 2.0));
    }
}
