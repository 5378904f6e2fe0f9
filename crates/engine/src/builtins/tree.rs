//! Tree navigation, CSV backing, and snapshot built-ins (component D, on
//! top of component E's arena/CSV/search/serializer primitives).

use crate::{
    builtins::BuiltinTable,
    config::TreeFormat,
    error::{EngineError, ErrorKind, EvalResult, Flow},
    eval::Evaluator,
    paths,
    pos::SourcePos,
    scope::Scope,
    tree::{
        csv_node,
        search::{self, SearchOp},
        serializer,
    },
    value::Value,
};

fn arg(args: &[Value], i: usize, name: &str, pos: &SourcePos) -> EvalResult<Value> {
    args.get(i).cloned().ok_or_else(|| Flow::Error(EngineError::validation(format!("{name}: missing argument {i}")).with_pos(pos.clone())))
}

fn as_tree_node(name: &str, v: &Value, pos: &SourcePos) -> EvalResult<(crate::tree::arena::TreeArena, crate::tree::arena::NodeId)> {
    match v {
        Value::TreeNode(arena, id) => Ok((arena.clone(), *id)),
        other => Err(Flow::Error(EngineError::type_error(format!("{name}: expected a tree node, found {}", other.type_name())).with_pos(pos.clone()))),
    }
}

fn as_string(name: &str, v: &Value, pos: &SourcePos) -> EvalResult<std::rc::Rc<str>> {
    match v {
        Value::String(s) => Ok(s.clone()),
        other => Err(Flow::Error(EngineError::type_error(format!("{name}: expected a string, found {}", other.type_name())).with_pos(pos.clone()))),
    }
}

fn new_tree(eval: &Evaluator, _scope: &Scope, args: Vec<Value>, pos: &SourcePos) -> EvalResult<Value> {
    let name = as_string("newTree", &arg(&args, 0, "newTree", pos)?, pos)?;
    let id = eval.trees.new_node(name.to_string());
    Ok(Value::TreeNode(eval.trees.clone(), id))
}

fn add_child(_eval: &Evaluator, _scope: &Scope, args: Vec<Value>, pos: &SourcePos) -> EvalResult<Value> {
    let (arena, parent) = as_tree_node("addChild", &arg(&args, 0, "addChild", pos)?, pos)?;
    let (child_arena, child) = as_tree_node("addChild", &arg(&args, 1, "addChild", pos)?, pos)?;
    if !arena.same_arena(&child_arena) {
        return Err(Flow::Error(EngineError::validation("addChild: parent and child belong to different forests").with_pos(pos.clone())));
    }
    arena.add_child(parent, child);
    Ok(Value::TreeNode(arena, parent))
}

fn remove_child(_eval: &Evaluator, _scope: &Scope, args: Vec<Value>, pos: &SourcePos) -> EvalResult<Value> {
    let (arena, parent) = as_tree_node("removeChild", &arg(&args, 0, "removeChild", pos)?, pos)?;
    let (_, child) = as_tree_node("removeChild", &arg(&args, 1, "removeChild", pos)?, pos)?;
    arena.remove_child(parent, child);
    Ok(Value::TreeNode(arena, parent))
}

fn get_parent(_eval: &Evaluator, _scope: &Scope, args: Vec<Value>, pos: &SourcePos) -> EvalResult<Value> {
    let (arena, id) = as_tree_node("getParent", &arg(&args, 0, "getParent", pos)?, pos)?;
    Ok(arena.parent(id).map(|p| Value::TreeNode(arena.clone(), p)).unwrap_or(Value::Null))
}

fn get_children(_eval: &Evaluator, _scope: &Scope, args: Vec<Value>, pos: &SourcePos) -> EvalResult<Value> {
    let (arena, id) = as_tree_node("getChildren", &arg(&args, 0, "getChildren", pos)?, pos)?;
    let children = arena.children(id).into_iter().map(|c| Value::TreeNode(arena.clone(), c)).collect();
    Ok(Value::array(children))
}

fn is_root(_eval: &Evaluator, _scope: &Scope, args: Vec<Value>, pos: &SourcePos) -> EvalResult<Value> {
    let (arena, id) = as_tree_node("isRoot", &arg(&args, 0, "isRoot", pos)?, pos)?;
    Ok(Value::Bool(arena.is_root(id)))
}

fn get_name(_eval: &Evaluator, _scope: &Scope, args: Vec<Value>, pos: &SourcePos) -> EvalResult<Value> {
    let (arena, id) = as_tree_node("getName", &arg(&args, 0, "getName", pos)?, pos)?;
    Ok(Value::string(arena.name(id)))
}

fn set_name(_eval: &Evaluator, _scope: &Scope, args: Vec<Value>, pos: &SourcePos) -> EvalResult<Value> {
    let (arena, id) = as_tree_node("setName", &arg(&args, 0, "setName", pos)?, pos)?;
    let name = as_string("setName", &arg(&args, 1, "setName", pos)?, pos)?;
    arena.set_name(id, name.to_string());
    Ok(Value::TreeNode(arena, id))
}

fn parse_search_op(v: Option<&Value>) -> SearchOp {
    v.and_then(|v| match v {
        Value::String(s) => SearchOp::parse(s),
        _ => None,
    })
    .unwrap_or(SearchOp::Eq)
}

fn tree_search_builtin(_eval: &Evaluator, _scope: &Scope, args: Vec<Value>, pos: &SourcePos) -> EvalResult<Value> {
    let (arena, root) = as_tree_node("treeSearch", &arg(&args, 0, "treeSearch", pos)?, pos)?;
    let attr = as_string("treeSearch", &arg(&args, 1, "treeSearch", pos)?, pos)?;
    let target = arg(&args, 2, "treeSearch", pos)?;
    let op = parse_search_op(args.get(3));
    let exists_only = args.get(4).map(Value::truthy).unwrap_or(false);
    let hits = search::tree_search(&arena, root, &attr, &target, op, exists_only);
    Ok(Value::array(hits.into_iter().map(|h| Value::TreeNode(arena.clone(), h)).collect()))
}

fn tree_find_builtin(_eval: &Evaluator, _scope: &Scope, args: Vec<Value>, pos: &SourcePos) -> EvalResult<Value> {
    let Value::Array(forest) = arg(&args, 0, "treeFind", pos)? else {
        return Err(Flow::Error(EngineError::type_error("treeFind: first argument must be an array of tree nodes").with_pos(pos.clone())));
    };
    let forest = forest.borrow();
    let mut arena = None;
    let mut ids = Vec::with_capacity(forest.len());
    for v in forest.iter() {
        let (a, id) = as_tree_node("treeFind", v, pos)?;
        arena.get_or_insert_with(|| a.clone());
        ids.push(id);
    }
    let Some(arena) = arena else { return Ok(Value::array(Vec::new())) };
    let attr = as_string("treeFind", &arg(&args, 1, "treeFind", pos)?, pos)?;
    let target = arg(&args, 2, "treeFind", pos)?;
    let op = parse_search_op(args.get(3));
    let hits = search::tree_find(&arena, &ids, &attr, &target, op);
    Ok(Value::array(hits.into_iter().map(|h| Value::TreeNode(arena.clone(), h)).collect()))
}

fn tree_walk_builtin(_eval: &Evaluator, _scope: &Scope, args: Vec<Value>, pos: &SourcePos) -> EvalResult<Value> {
    let (arena, root) = as_tree_node("treeWalk", &arg(&args, 0, "treeWalk", pos)?, pos)?;
    Ok(Value::array(search::walk(&arena, root)))
}

fn csv_load(eval: &Evaluator, _scope: &Scope, args: Vec<Value>, pos: &SourcePos) -> EvalResult<Value> {
    let path_str = as_string("csvLoad", &arg(&args, 0, "csvLoad", pos)?, pos)?;
    let delimiter = match args.get(1) {
        Some(Value::String(s)) => s.as_bytes().first().copied().unwrap_or(b','),
        _ => b',',
    };
    let has_header = args.get(2).map(Value::truthy).unwrap_or(true);

    let resolved = paths::confine(&eval.config, paths::Root::Data, &path_str).map_err(|e| Flow::Error(e.with_pos(pos.clone())))?;
    let id = eval.trees.new_node("source_data");
    csv_node::load_from_file(&eval.trees, id, resolved, delimiter, has_header)
        .map_err(|e| Flow::Error(e.with_pos(pos.clone())))?;
    Ok(Value::TreeNode(eval.trees.clone(), id))
}

fn csv_get_headers(_eval: &Evaluator, _scope: &Scope, args: Vec<Value>, pos: &SourcePos) -> EvalResult<Value> {
    let (arena, id) = as_tree_node("csvGetHeaders", &arg(&args, 0, "csvGetHeaders", pos)?, pos)?;
    let headers = csv_node::get_headers(&arena, id).map_err(|e| Flow::Error(e.with_pos(pos.clone())))?;
    Ok(Value::array(headers.into_iter().map(Value::string).collect()))
}

fn csv_get_row_count(_eval: &Evaluator, _scope: &Scope, args: Vec<Value>, pos: &SourcePos) -> EvalResult<Value> {
    let (arena, id) = as_tree_node("csvGetRowCount", &arg(&args, 0, "csvGetRowCount", pos)?, pos)?;
    let n = csv_node::get_row_count(&arena, id).map_err(|e| Flow::Error(e.with_pos(pos.clone())))?;
    Ok(Value::Number(n as f64))
}

fn csv_get_row(_eval: &Evaluator, _scope: &Scope, args: Vec<Value>, pos: &SourcePos) -> EvalResult<Value> {
    let (arena, id) = as_tree_node("csvGetRow", &arg(&args, 0, "csvGetRow", pos)?, pos)?;
    let index = match arg(&args, 1, "csvGetRow", pos)? {
        Value::Number(n) => n as usize,
        other => return Err(Flow::Error(EngineError::type_error(format!("csvGetRow: expected a numeric index, found {}", other.type_name())).with_pos(pos.clone()))),
    };
    let row = csv_node::get_row(&arena, id, index).map_err(|e| Flow::Error(e.with_pos(pos.clone())))?;
    Ok(row.map(|r| Value::array(r.into_iter().map(Value::string).collect())).unwrap_or(Value::Null))
}

fn csv_get_rows(_eval: &Evaluator, _scope: &Scope, args: Vec<Value>, pos: &SourcePos) -> EvalResult<Value> {
    let (arena, id) = as_tree_node("csvGetRows", &arg(&args, 0, "csvGetRows", pos)?, pos)?;
    let rows = csv_node::get_rows(&arena, id).map_err(|e| Flow::Error(e.with_pos(pos.clone())))?;
    Ok(Value::array(rows.into_iter().map(|r| Value::array(r.into_iter().map(Value::string).collect())).collect()))
}

/// `csvStreamProcess(node, chunkSize, visitor)`: invokes `visitor(batch)`
/// once per batch, where `batch` is an array of row arrays.
fn csv_stream_process(eval: &Evaluator, _scope: &Scope, args: Vec<Value>, pos: &SourcePos) -> EvalResult<Value> {
    let (arena, id) = as_tree_node("csvStreamProcess", &arg(&args, 0, "csvStreamProcess", pos)?, pos)?;
    let chunk_size = match arg(&args, 1, "csvStreamProcess", pos)? {
        Value::Number(n) => n as usize,
        other => return Err(Flow::Error(EngineError::type_error(format!("csvStreamProcess: expected a numeric chunk size, found {}", other.type_name())).with_pos(pos.clone()))),
    };
    let Value::Function(visitor) = arg(&args, 2, "csvStreamProcess", pos)? else {
        return Err(Flow::Error(EngineError::type_error("csvStreamProcess: third argument must be a function").with_pos(pos.clone())));
    };

    let mut first_err: Option<Flow> = None;
    let result = csv_node::stream_process(&arena, id, chunk_size.max(1), |batch| {
        let batch_value = Value::array(batch.iter().map(|row| Value::array(row.iter().cloned().map(Value::string).collect())).collect());
        match eval.call_function(&visitor, vec![batch_value], pos) {
            Ok(_) => Ok(()),
            Err(flow) => {
                let msg = flow.to_string();
                first_err = Some(flow);
                Err(EngineError::new(ErrorKind::Validation, msg))
            }
        }
    });

    match (result, first_err) {
        (Ok(()), _) => Ok(Value::Null),
        (Err(_), Some(flow)) => Err(flow),
        (Err(e), None) => Err(Flow::Error(e.with_pos(pos.clone()))),
    }
}

fn resolve_format(eval: &Evaluator, path: &str, explicit: Option<&Value>) -> TreeFormat {
    if let Some(Value::String(s)) = explicit {
        if let Some(fmt) = TreeFormat::from_extension(s) {
            return fmt;
        }
    }
    std::path::Path::new(path)
        .extension()
        .and_then(|e| e.to_str())
        .and_then(TreeFormat::from_extension)
        .unwrap_or(eval.config.default_tree_format)
}

fn save_tree(eval: &Evaluator, _scope: &Scope, args: Vec<Value>, pos: &SourcePos) -> EvalResult<Value> {
    let (arena, id) = as_tree_node("saveTree", &arg(&args, 0, "saveTree", pos)?, pos)?;
    let path_str = as_string("saveTree", &arg(&args, 1, "saveTree", pos)?, pos)?;
    let format = resolve_format(eval, &path_str, args.get(2));

    let resolved = paths::confine(&eval.config, paths::Root::Tree, &path_str).map_err(|e| Flow::Error(e.with_pos(pos.clone())))?;
    let bytes = serializer::serialize(&arena, id, format).map_err(|e| Flow::Error(e.with_pos(pos.clone())))?;
    std::fs::write(&resolved, bytes).map_err(|e| Flow::Error(EngineError::backend(format!("writing {}: {e}", resolved.display())).with_pos(pos.clone())))?;
    Ok(Value::Bool(true))
}

fn load_tree(eval: &Evaluator, _scope: &Scope, args: Vec<Value>, pos: &SourcePos) -> EvalResult<Value> {
    let path_str = as_string("loadTree", &arg(&args, 0, "loadTree", pos)?, pos)?;
    let format = resolve_format(eval, &path_str, args.get(1));

    let resolved = paths::confine(&eval.config, paths::Root::Tree, &path_str).map_err(|e| Flow::Error(e.with_pos(pos.clone())))?;
    let bytes = std::fs::read(&resolved).map_err(|e| Flow::Error(EngineError::backend(format!("reading {}: {e}", resolved.display())).with_pos(pos.clone())))?;
    let id = serializer::deserialize(&eval.trees, format, &bytes).map_err(|e| Flow::Error(e.with_pos(pos.clone())))?;
    Ok(Value::TreeNode(eval.trees.clone(), id))
}

pub fn register(table: &mut BuiltinTable) {
    table.register("newTree", new_tree);
    table.register("addChild", add_child);
    table.register("removeChild", remove_child);
    table.register("getParent", get_parent);
    table.register("getChildren", get_children);
    table.register("isRoot", is_root);
    table.register("getName", get_name);
    table.register("setName", set_name);
    table.register("treeSearch", tree_search_builtin);
    table.register("treeFind", tree_find_builtin);
    table.register("treeWalk", tree_walk_builtin);
    table.register("csvLoad", csv_load);
    table.register("csvGetHeaders", csv_get_headers);
    table.register("csvGetRowCount", csv_get_row_count);
    table.register("csvGetRow", csv_get_row);
    table.register("csvGetRows", csv_get_rows);
    table.register("csvStreamProcess", csv_stream_process);
    table.register("saveTree", save_tree);
    table.register("loadTree", load_tree);
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
    fn new_tree_children_roundtrip() {
        let v = run("declare(r, newTree(\"root\")); declare(c, newTree(\"c\")); addChild(r,c); length(getChildren(r))");
        assert!(matches!(v, Value::Number(n) if n == 1.0));
    }

    #[test]
    fn set_and_get_name() {
        let v = run(r#"declare(r, newTree("root")); setName(r, "renamed"); getName(r)"#);
        assert!(matches!(v, Value::String(ref s) if &**s == "renamed"));
    }

    #[test]
    fn tree_search_finds_attribute_match() {
        let v = run(
            r#"declare(r, newTree("root")); setAttribute(r, "status", "active"); length(treeSearch(r, "status", "active"))"#,
        );
        assert!(matches!(v, Value::Number(n) if n == 1.0));
    }
}
