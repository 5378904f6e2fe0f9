//! Polymorphic container built-ins (component D).
//!
//! Each op here dispatches on the runtime variant of its first argument
//! rather than requiring a single container type, per spec.md §4.4's
//! contract table (`length`, `getAt`, `setAt`, `getProp`/`setProp`,
//! `getAttribute`/`setAttribute`, `getMeta`/`setMeta`/`getAllMeta`,
//! `slice`/`reverse`/`contains`/`indexOf`, `split`/`join`, `apply`, `clone`).

use std::collections::HashMap;

use crate::{
    builtins::BuiltinTable,
    error::{EngineError, ErrorKind, EvalResult, Flow},
    eval::Evaluator,
    pos::SourcePos,
    scope::Scope,
    tree::serializer::{json_to_value, value_to_json},
    value::{Json, Value},
};

fn arg(args: &[Value], i: usize, name: &str, pos: &SourcePos) -> EvalResult<Value> {
    args.get(i).cloned().ok_or_else(|| {
        Flow::Error(EngineError::validation(format!("{name}: missing argument {i}")).with_pos(pos.clone()))
    })
}

fn as_index(name: &str, v: &Value, pos: &SourcePos) -> EvalResult<i64> {
    match v {
        Value::Number(n) => Ok(*n as i64),
        other => Err(Flow::Error(
            EngineError::type_error(format!("{name}: expected a numeric index, found {}", other.type_name())).with_pos(pos.clone()),
        )),
    }
}

fn array_ctor(_eval: &Evaluator, _scope: &Scope, args: Vec<Value>, _pos: &SourcePos) -> EvalResult<Value> {
    Ok(Value::array(args))
}

fn map_ctor(_eval: &Evaluator, _scope: &Scope, args: Vec<Value>, pos: &SourcePos) -> EvalResult<Value> {
    if args.len() % 2 != 0 {
        return Err(Flow::Error(EngineError::validation("map: expects an even number of key/value arguments").with_pos(pos.clone())));
    }
    let mut out = HashMap::new();
    let mut it = args.into_iter();
    while let (Some(k), Some(v)) = (it.next(), it.next()) {
        let Value::String(key) = k else {
            return Err(Flow::Error(EngineError::type_error("map: keys must be strings").with_pos(pos.clone())));
        };
        out.insert(key.to_string(), v);
    }
    Ok(Value::map(out))
}

fn length(_eval: &Evaluator, _scope: &Scope, args: Vec<Value>, pos: &SourcePos) -> EvalResult<Value> {
    let v = arg(&args, 0, "length", pos)?;
    let n = match &v {
        Value::Null => 0,
        // Scalars count as one element each (spec.md §4.4 contract table).
        Value::Number(_) | Value::Bool(_) => 1,
        Value::String(s) => s.chars().count(),
        Value::Array(items) => items.borrow().len(),
        Value::Map(items) => items.borrow().len(),
        Value::Document(doc) => match &doc.borrow().data {
            Json::Array(items) => items.len(),
            Json::Object(items) => items.len(),
            Json::String(s) => s.chars().count(),
            Json::Null => 0,
            Json::Bool(_) | Json::Number(_) => 1,
        },
        Value::TreeNode(arena, id) => arena.children(*id).len(),
        other => {
            return Err(Flow::Error(
                EngineError::type_error(format!("length: unsupported type {}", other.type_name())).with_pos(pos.clone()),
            ))
        }
    };
    Ok(Value::Number(n as f64))
}

/// `getAt` never errors on an out-of-range index -- it yields `Null`
/// (spec.md §4.4 contract table, §7 error taxonomy "Range: ... (`setAt`
/// only; `getAt` yields Null)", Testable Property 4: "never panics").
/// `setAt` is the one polymorphic op that raises `Range`.
fn get_at(_eval: &Evaluator, _scope: &Scope, args: Vec<Value>, pos: &SourcePos) -> EvalResult<Value> {
    let container = arg(&args, 0, "getAt", pos)?;
    let index = as_index("getAt", &arg(&args, 1, "getAt", pos)?, pos)?;
    match &container {
        Value::Array(items) => {
            let items = items.borrow();
            Ok(usize::try_from(index).ok().and_then(|i| items.get(i).cloned()).unwrap_or(Value::Null))
        }
        Value::String(s) => {
            let chars: Vec<char> = s.chars().collect();
            Ok(usize::try_from(index).ok().and_then(|i| chars.get(i)).map(|c| Value::string(c.to_string())).unwrap_or(Value::Null))
        }
        Value::TreeNode(arena, id) => {
            let children = arena.children(*id);
            Ok(usize::try_from(index).ok().and_then(|i| children.get(i).copied()).map(|child| Value::TreeNode(arena.clone(), child)).unwrap_or(Value::Null))
        }
        other => Err(Flow::Error(
            EngineError::type_error(format!("getAt: unsupported type {}", other.type_name())).with_pos(pos.clone()),
        )),
    }
}

/// Mutates an array in place; the only op the spec calls out a `Range`
/// error for (spec.md's error taxonomy note on `setAt`).
fn set_at(_eval: &Evaluator, _scope: &Scope, args: Vec<Value>, pos: &SourcePos) -> EvalResult<Value> {
    let container = arg(&args, 0, "setAt", pos)?;
    let index = as_index("setAt", &arg(&args, 1, "setAt", pos)?, pos)?;
    let value = arg(&args, 2, "setAt", pos)?;
    match &container {
        Value::Array(items) => {
            let mut items = items.borrow_mut();
            let i = usize::try_from(index).ok().filter(|i| *i < items.len()).ok_or_else(|| {
                Flow::Error(EngineError::new(ErrorKind::Range, format!("setAt: index {index} out of bounds")).with_pos(pos.clone()))
            })?;
            items[i] = value.clone();
            Ok(value)
        }
        other => Err(Flow::Error(
            EngineError::type_error(format!("setAt: unsupported type {}", other.type_name())).with_pos(pos.clone()),
        )),
    }
}

/// One step of a `getProp`/`setProp` dot-path: a map/object key, or an
/// array/children index (spec.md §4.4: "dot-path traversal (`a.b[2].c`)").
#[derive(Debug, Clone)]
enum PathSeg {
    Key(String),
    Index(usize),
}

/// Splits `a.b[2].c` into `[Key("a"), Key("b"), Index(2), Key("c")]`.
/// Malformed bracket groups (non-numeric or unterminated) are dropped
/// rather than erroring, consistent with the rest of the dot-path surface
/// failing soft (missing path reads as `Null`).
fn parse_path(path: &str) -> Vec<PathSeg> {
    let mut segs = Vec::new();
    for part in path.split('.') {
        let mut rest = part;
        match rest.find('[') {
            None => {
                if !rest.is_empty() {
                    segs.push(PathSeg::Key(rest.to_string()));
                }
            }
            Some(bracket) => {
                if bracket > 0 {
                    segs.push(PathSeg::Key(rest[..bracket].to_string()));
                }
                rest = &rest[bracket..];
                while let Some(open) = rest.strip_prefix('[') {
                    let Some(close) = open.find(']') else { break };
                    if let Ok(index) = open[..close].parse::<usize>() {
                        segs.push(PathSeg::Index(index));
                    }
                    rest = &open[close + 1..];
                }
            }
        }
    }
    segs
}

/// Reads one path segment off a live `Value`, dispatching on its variant
/// the way the rest of the polymorphic contract table does. `HostObject`
/// reflection only supports a single key (there is no generic nested
/// structure to recurse into).
fn get_segment(eval: &Evaluator, current: &Value, seg: &PathSeg) -> Value {
    match (current, seg) {
        (Value::Map(items), PathSeg::Key(k)) => items.borrow().get(k).cloned().unwrap_or(Value::Null),
        (Value::Document(doc), PathSeg::Key(k)) => match &doc.borrow().data {
            Json::Object(map) => map.get(k).map(json_to_value).unwrap_or(Value::Null),
            _ => Value::Null,
        },
        (Value::Document(doc), PathSeg::Index(i)) => match &doc.borrow().data {
            Json::Array(items) => items.get(*i).map(json_to_value).unwrap_or(Value::Null),
            _ => Value::Null,
        },
        (Value::TreeNode(arena, id), PathSeg::Key(k)) => arena.get_attribute(*id, k),
        (Value::TreeNode(arena, id), PathSeg::Index(i)) => {
            arena.children(*id).get(*i).map(|child| Value::TreeNode(arena.clone(), *child)).unwrap_or(Value::Null)
        }
        (Value::Array(items), PathSeg::Index(i)) => items.borrow().get(*i).cloned().unwrap_or(Value::Null),
        (Value::HostObject(handle), PathSeg::Key(k)) => {
            eval.objects.get(&handle.0).and_then(|res| res.get_property(k)).unwrap_or(Value::Null)
        }
        _ => Value::Null,
    }
}

fn get_path(eval: &Evaluator, root: &Value, segments: &[PathSeg]) -> Value {
    let mut current = root.clone();
    for seg in segments {
        current = get_segment(eval, &current, seg);
        if matches!(current, Value::Null) {
            return Value::Null;
        }
    }
    current
}

/// Writes one path segment into a live `Value`. Recurses for all but the
/// final segment, creating a `Map` (or, inside a `Document`, a JSON object/
/// array) in place of a missing or non-container intermediate -- spec.md
/// §4.4: "creates intermediates on write for Documents/Maps".
fn set_path(eval: &Evaluator, root: &Value, segments: &[PathSeg], value: Value) {
    let Some((head, rest)) = segments.split_first() else { return };
    match root {
        Value::Map(items) => {
            let Some(key) = (match head {
                PathSeg::Key(k) => Some(k.clone()),
                PathSeg::Index(_) => None,
            }) else {
                return;
            };
            if rest.is_empty() {
                items.borrow_mut().insert(key, value);
                return;
            }
            let child = items.borrow().get(&key).cloned();
            let child = match child {
                Some(existing @ (Value::Map(_) | Value::Document(_))) => existing,
                _ => {
                    let created = Value::map(HashMap::new());
                    items.borrow_mut().insert(key.clone(), created.clone());
                    created
                }
            };
            set_path(eval, &child, rest, value);
        }
        Value::Document(doc) => {
            let mut inner = doc.borrow_mut();
            set_json_path(&mut inner.data, segments, value);
        }
        Value::TreeNode(arena, id) => {
            let PathSeg::Key(key) = head else { return };
            if rest.is_empty() {
                arena.set_attribute(*id, key, value);
                return;
            }
            let child = match arena.get_attribute(*id, key) {
                existing @ (Value::Map(_) | Value::Document(_)) => existing,
                _ => {
                    let created = Value::map(HashMap::new());
                    arena.set_attribute(*id, key, created.clone());
                    created
                }
            };
            set_path(eval, &child, rest, value);
        }
        Value::HostObject(handle) => {
            if let PathSeg::Key(key) = head {
                if let Some(res) = eval.objects.get(&handle.0) {
                    res.set_property(key, value);
                }
            }
        }
        _ => {}
    }
}

/// `set_path`'s counterpart operating directly on a `Json` tree, since a
/// `Document`'s payload is JSON, not `Value` -- converting through `Value`
/// on every step would copy rather than mutate in place.
fn set_json_path(current: &mut Json, segments: &[PathSeg], value: Value) {
    let Some((head, rest)) = segments.split_first() else { return };
    match head {
        PathSeg::Key(key) => {
            if !matches!(current, Json::Object(_)) {
                *current = Json::Object(Default::default());
            }
            let Json::Object(map) = current else { unreachable!() };
            if rest.is_empty() {
                map.insert(key.clone(), value_to_json(&value));
                return;
            }
            let entry = map.entry(key.clone()).or_insert(Json::Null);
            set_json_path(entry, rest, value);
        }
        PathSeg::Index(index) => {
            if !matches!(current, Json::Array(_)) {
                *current = Json::Array(Vec::new());
            }
            let Json::Array(items) = current else { unreachable!() };
            while items.len() <= *index {
                items.push(Json::Null);
            }
            if rest.is_empty() {
                items[*index] = value_to_json(&value);
                return;
            }
            set_json_path(&mut items[*index], rest, value);
        }
    }
}

fn get_prop(eval: &Evaluator, _scope: &Scope, args: Vec<Value>, pos: &SourcePos) -> EvalResult<Value> {
    let container = arg(&args, 0, "getProp", pos)?;
    let Value::String(path) = arg(&args, 1, "getProp", pos)? else {
        return Err(Flow::Error(EngineError::type_error("getProp: path must be a string").with_pos(pos.clone())));
    };
    let segments = parse_path(&path);
    Ok(get_path(eval, &container, &segments))
}

fn set_prop(eval: &Evaluator, _scope: &Scope, args: Vec<Value>, pos: &SourcePos) -> EvalResult<Value> {
    let container = arg(&args, 0, "setProp", pos)?;
    let Value::String(path) = arg(&args, 1, "setProp", pos)? else {
        return Err(Flow::Error(EngineError::type_error("setProp: path must be a string").with_pos(pos.clone())));
    };
    let value = arg(&args, 2, "setProp", pos)?;
    let segments = parse_path(&path);
    if segments.is_empty() {
        return Err(Flow::Error(EngineError::validation("setProp: empty path").with_pos(pos.clone())));
    }
    match &container {
        Value::Map(_) | Value::Document(_) | Value::TreeNode(..) | Value::HostObject(_) => {
            set_path(eval, &container, &segments, value.clone());
            Ok(value)
        }
        other => Err(Flow::Error(
            EngineError::type_error(format!("setProp: unsupported type {}", other.type_name())).with_pos(pos.clone()),
        )),
    }
}

fn get_attribute(_eval: &Evaluator, _scope: &Scope, args: Vec<Value>, pos: &SourcePos) -> EvalResult<Value> {
    let container = arg(&args, 0, "getAttribute", pos)?;
    let Value::String(key) = arg(&args, 1, "getAttribute", pos)? else {
        return Err(Flow::Error(EngineError::type_error("getAttribute: key must be a string").with_pos(pos.clone())));
    };
    match &container {
        Value::TreeNode(arena, id) => Ok(arena.get_attribute(*id, &key)),
        Value::Map(items) => Ok(items.borrow().get(&*key).cloned().unwrap_or(Value::Null)),
        other => Err(Flow::Error(
            EngineError::type_error(format!("getAttribute: unsupported type {}", other.type_name())).with_pos(pos.clone()),
        )),
    }
}

fn set_attribute(_eval: &Evaluator, _scope: &Scope, args: Vec<Value>, pos: &SourcePos) -> EvalResult<Value> {
    let container = arg(&args, 0, "setAttribute", pos)?;
    let Value::String(key) = arg(&args, 1, "setAttribute", pos)? else {
        return Err(Flow::Error(EngineError::type_error("setAttribute: key must be a string").with_pos(pos.clone())));
    };
    let value = arg(&args, 2, "setAttribute", pos)?;
    match &container {
        Value::TreeNode(arena, id) => {
            arena.set_attribute(*id, &key, value.clone());
            Ok(value)
        }
        Value::Map(items) => {
            items.borrow_mut().insert(key.to_string(), value.clone());
            Ok(value)
        }
        other => Err(Flow::Error(
            EngineError::type_error(format!("setAttribute: unsupported type {}", other.type_name())).with_pos(pos.clone()),
        )),
    }
}

fn get_meta(_eval: &Evaluator, _scope: &Scope, args: Vec<Value>, pos: &SourcePos) -> EvalResult<Value> {
    let container = arg(&args, 0, "getMeta", pos)?;
    let Value::String(key) = arg(&args, 1, "getMeta", pos)? else {
        return Err(Flow::Error(EngineError::type_error("getMeta: key must be a string").with_pos(pos.clone())));
    };
    Ok(container.get_meta(&key))
}

fn set_meta(_eval: &Evaluator, _scope: &Scope, args: Vec<Value>, pos: &SourcePos) -> EvalResult<Value> {
    let container = arg(&args, 0, "setMeta", pos)?;
    let Value::String(key) = arg(&args, 1, "setMeta", pos)? else {
        return Err(Flow::Error(EngineError::type_error("setMeta: key must be a string").with_pos(pos.clone())));
    };
    let value = arg(&args, 2, "setMeta", pos)?;
    container.set_meta(&key, value.clone());
    Ok(value)
}

fn get_all_meta(_eval: &Evaluator, _scope: &Scope, args: Vec<Value>, pos: &SourcePos) -> EvalResult<Value> {
    let container = arg(&args, 0, "getAllMeta", pos)?;
    let meta = container.get_all_meta();
    Ok(Value::map(meta))
}

fn slice(_eval: &Evaluator, _scope: &Scope, args: Vec<Value>, pos: &SourcePos) -> EvalResult<Value> {
    let container = arg(&args, 0, "slice", pos)?;
    let start = as_index("slice", &arg(&args, 1, "slice", pos)?, pos)?.max(0) as usize;
    let end = as_index("slice", &arg(&args, 2, "slice", pos)?, pos)?.max(0) as usize;
    match &container {
        Value::Array(items) => {
            let items = items.borrow();
            let end = end.min(items.len());
            let start = start.min(end);
            Ok(Value::array(items[start..end].to_vec()))
        }
        Value::String(s) => {
            let chars: Vec<char> = s.chars().collect();
            let end = end.min(chars.len());
            let start = start.min(end);
            Ok(Value::string(chars[start..end].iter().collect::<String>()))
        }
        other => Err(Flow::Error(
            EngineError::type_error(format!("slice: unsupported type {}", other.type_name())).with_pos(pos.clone()),
        )),
    }
}

fn reverse(_eval: &Evaluator, _scope: &Scope, args: Vec<Value>, pos: &SourcePos) -> EvalResult<Value> {
    let container = arg(&args, 0, "reverse", pos)?;
    match &container {
        Value::Array(items) => {
            let mut out = items.borrow().clone();
            out.reverse();
            Ok(Value::array(out))
        }
        Value::String(s) => Ok(Value::string(s.chars().rev().collect::<String>())),
        other => Err(Flow::Error(
            EngineError::type_error(format!("reverse: unsupported type {}", other.type_name())).with_pos(pos.clone()),
        )),
    }
}

fn contains(_eval: &Evaluator, _scope: &Scope, args: Vec<Value>, pos: &SourcePos) -> EvalResult<Value> {
    let container = arg(&args, 0, "contains", pos)?;
    let needle = arg(&args, 1, "contains", pos)?;
    match &container {
        Value::Array(items) => Ok(Value::Bool(items.borrow().iter().any(|v| v.value_eq(&needle)))),
        Value::Map(items) => match &needle {
            Value::String(key) => Ok(Value::Bool(items.borrow().contains_key(&**key))),
            other => Err(Flow::Error(
                EngineError::type_error(format!("contains: map key must be a string, found {}", other.type_name())).with_pos(pos.clone()),
            )),
        },
        Value::String(s) => match &needle {
            Value::String(sub) => Ok(Value::Bool(s.contains(&**sub))),
            other => Err(Flow::Error(
                EngineError::type_error(format!("contains: expected a string needle, found {}", other.type_name())).with_pos(pos.clone()),
            )),
        },
        other => Err(Flow::Error(
            EngineError::type_error(format!("contains: unsupported type {}", other.type_name())).with_pos(pos.clone()),
        )),
    }
}

fn index_of(_eval: &Evaluator, _scope: &Scope, args: Vec<Value>, pos: &SourcePos) -> EvalResult<Value> {
    let container = arg(&args, 0, "indexOf", pos)?;
    let needle = arg(&args, 1, "indexOf", pos)?;
    match &container {
        Value::Array(items) => {
            let found = items.borrow().iter().position(|v| v.value_eq(&needle));
            Ok(Value::Number(found.map(|i| i as f64).unwrap_or(-1.0)))
        }
        Value::String(s) => match &needle {
            Value::String(sub) => {
                let found = s.find(&**sub).map(|byte_idx| s[..byte_idx].chars().count() as f64);
                Ok(Value::Number(found.unwrap_or(-1.0)))
            }
            other => Err(Flow::Error(
                EngineError::type_error(format!("indexOf: expected a string needle, found {}", other.type_name())).with_pos(pos.clone()),
            )),
        },
        other => Err(Flow::Error(
            EngineError::type_error(format!("indexOf: unsupported type {}", other.type_name())).with_pos(pos.clone()),
        )),
    }
}

fn split(_eval: &Evaluator, _scope: &Scope, args: Vec<Value>, pos: &SourcePos) -> EvalResult<Value> {
    let Value::String(subject) = arg(&args, 0, "split", pos)? else {
        return Err(Flow::Error(EngineError::type_error("split: expected a string").with_pos(pos.clone())));
    };
    let Value::String(sep) = arg(&args, 1, "split", pos)? else {
        return Err(Flow::Error(EngineError::type_error("split: separator must be a string").with_pos(pos.clone())));
    };
    let parts: Vec<Value> = if sep.is_empty() {
        subject.chars().map(|c| Value::string(c.to_string())).collect()
    } else {
        subject.split(&*sep).map(Value::string).collect()
    };
    Ok(Value::array(parts))
}

fn join(_eval: &Evaluator, _scope: &Scope, args: Vec<Value>, pos: &SourcePos) -> EvalResult<Value> {
    let Value::Array(items) = arg(&args, 0, "join", pos)? else {
        return Err(Flow::Error(EngineError::type_error("join: expected an array").with_pos(pos.clone())));
    };
    let Value::String(sep) = arg(&args, 1, "join", pos)? else {
        return Err(Flow::Error(EngineError::type_error("join: separator must be a string").with_pos(pos.clone())));
    };
    let joined = items.borrow().iter().map(|v| v.to_string()).collect::<Vec<_>>().join(&sep);
    Ok(Value::string(joined))
}

fn apply(eval: &Evaluator, _scope: &Scope, args: Vec<Value>, pos: &SourcePos) -> EvalResult<Value> {
    let Value::Function(func) = arg(&args, 0, "apply", pos)? else {
        return Err(Flow::Error(EngineError::type_error("apply: first argument must be a function").with_pos(pos.clone())));
    };
    let Value::Array(call_args) = arg(&args, 1, "apply", pos)? else {
        return Err(Flow::Error(EngineError::type_error("apply: second argument must be an array").with_pos(pos.clone())));
    };
    let call_args = call_args.borrow().clone();
    eval.call_function(&func, call_args, pos)
}

fn clone_builtin(_eval: &Evaluator, _scope: &Scope, args: Vec<Value>, pos: &SourcePos) -> EvalResult<Value> {
    Ok(arg(&args, 0, "clone", pos)?.deep_clone())
}

pub fn register(table: &mut BuiltinTable) {
    table.register("array", array_ctor);
    table.register("map", map_ctor);
    table.register("length", length);
    table.register("getAt", get_at);
    table.register("setAt", set_at);
    table.register("getProp", get_prop);
    table.register("setProp", set_prop);
    table.register("getAttribute", get_attribute);
    table.register("setAttribute", set_attribute);
    table.register("getMeta", get_meta);
    table.register("setMeta", set_meta);
    table.register("getAllMeta", get_all_meta);
    table.register("slice", slice);
    table.register("reverse", reverse);
    table.register("contains", contains);
    table.register("indexOf", index_of);
    table.register("split", split);
    table.register("join", join);
    table.register("apply", apply);
    table.register("clone", clone_builtin);
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
    fn get_and_set_at_roundtrip() {
        assert!(matches!(run("declare(a, array(1,2,3)); setAt(a,1,9); getAt(a,1)"), Value::Number(n) if n == 9.0));
    }

    #[test]
    fn set_at_out_of_bounds_is_range_error() {
        let program = parse_program("test", "declare(a, array(1)); setAt(a, 5, 1)").unwrap();
        let eval = Evaluator::new(Rc::new(EngineConfig::default()));
        let err = eval.run(&program).unwrap_err();
        assert!(matches!(err, Flow::Error(e) if matches!(e.kind, ErrorKind::Range)));
    }

    #[test]
    fn slice_and_join_roundtrip_a_string_split() {
        assert!(matches!(run(r#"join(split("a,b,c", ","), "-")"#), Value::String(ref s) if &**s == "a-b-c"));
    }

    #[test]
    fn apply_invokes_function_with_array_as_positional_args() {
        assert!(matches!(run("declare(f, func(a,b){ add(a,b) }); apply(f, array(2,3))"), Value::Number(n) if n == 5.0));
    }

    #[test]
    fn clone_is_deep_and_pointer_distinct() {
        assert!(matches!(run("declare(a, array(1,2)); equal(a, clone(a))"), Value::Bool(false)));
    }

    #[test]
    fn get_at_out_of_range_yields_null_never_errors() {
        assert!(matches!(run("getAt(array(1,2,3), 9)"), Value::Null));
        assert!(matches!(run("getAt(array(1,2,3), -1)"), Value::Null));
        assert!(matches!(run(r#"getAt("ab", 9)"#), Value::Null));
        assert!(matches!(run("declare(t, newTree(\"root\")); getAt(t, 9)"), Value::Null));
    }

    #[test]
    fn length_yields_one_for_scalars_and_counts_document_payloads() {
        assert!(matches!(run("length(1)"), Value::Number(n) if n == 1.0));
        assert!(matches!(run("length(true)"), Value::Number(n) if n == 1.0));
        assert!(matches!(run(r#"length(fromJson("[1,2,3,4]"))"#), Value::Number(n) if n == 4.0));
    }

    #[test]
    fn get_prop_traverses_a_dot_path_through_nested_maps_and_arrays() {
        let v = run(r#"declare(m, map("a", map("b", array(10,20,30)))); getProp(m, "a.b[1]")"#);
        assert!(matches!(v, Value::Number(n) if n == 20.0));
    }

    #[test]
    fn get_prop_missing_path_is_null() {
        assert!(matches!(run(r#"declare(m, map("a", 1)); getProp(m, "x.y.z")"#), Value::Null));
    }

    #[test]
    fn set_prop_creates_intermediate_maps_on_write() {
        let v = run(r#"declare(m, map()); setProp(m, "a.b.c", 42); getProp(m, "a.b.c")"#);
        assert!(matches!(v, Value::Number(n) if n == 42.0));
    }

    #[test]
    fn set_prop_creates_intermediates_inside_a_document() {
        let v = run(r#"declare(d, newDocument(map())); setProp(d, "a.b[2]", "x"); getProp(d, "a.b[2]")"#);
        assert!(matches!(v, Value::String(ref s) if &**s == "x"));
    }

    #[test]
    fn get_attribute_and_set_attribute_support_maps() {
        let v = run(r#"declare(m, map()); setAttribute(m, "k", 7); getAttribute(m, "k")"#);
        assert!(matches!(v, Value::Number(n) if n == 7.0));
    }
}
