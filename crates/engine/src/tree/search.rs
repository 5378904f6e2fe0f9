//! Forest-wide tree search and walk (`treeFind`, `treeSearch`, `treeWalk` --
//! spec.md §4.5 "Search semantics").
//!
//! Both search functions recurse through a node's attributes, its children,
//! and any array/map values embedded in an attribute -- so a node whose
//! `payload` attribute happens to be a `Map` containing the searched key is
//! still found, without requiring the caller to know the storage shape.

use std::collections::HashSet;

use crate::{
    tree::arena::{NodeId, TreeArena},
    value::{Json, Value},
};

/// Comparison operator for `treeFind`/`treeSearch` (spec.md §4.5).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SearchOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    Contains,
    StartsWith,
    EndsWith,
}

impl SearchOp {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "=" => Some(Self::Eq),
            "!=" => Some(Self::Ne),
            "<" => Some(Self::Lt),
            "<=" => Some(Self::Le),
            ">" => Some(Self::Gt),
            ">=" => Some(Self::Ge),
            "contains" => Some(Self::Contains),
            "startswith" => Some(Self::StartsWith),
            "endswith" => Some(Self::EndsWith),
            _ => None,
        }
    }
}

fn as_number(v: &Value) -> Option<f64> {
    match v {
        Value::Number(n) => Some(*n),
        _ => None,
    }
}

fn as_str(v: &Value) -> Option<String> {
    match v {
        Value::String(s) => Some(s.to_string()),
        _ => None,
    }
}

pub fn compare(value: &Value, target: &Value, op: SearchOp) -> bool {
    match op {
        SearchOp::Eq => value.value_eq(target),
        SearchOp::Ne => !value.value_eq(target),
        SearchOp::Lt | SearchOp::Le | SearchOp::Gt | SearchOp::Ge => match (as_number(value), as_number(target)) {
            (Some(a), Some(b)) => match op {
                SearchOp::Lt => a < b,
                SearchOp::Le => a <= b,
                SearchOp::Gt => a > b,
                SearchOp::Ge => a >= b,
                _ => unreachable!(),
            },
            _ => false,
        },
        SearchOp::Contains => match (as_str(value), as_str(target)) {
            (Some(a), Some(b)) => a.contains(&b),
            _ => false,
        },
        SearchOp::StartsWith => match (as_str(value), as_str(target)) {
            (Some(a), Some(b)) => a.starts_with(&b),
            _ => false,
        },
        SearchOp::EndsWith => match (as_str(value), as_str(target)) {
            (Some(a), Some(b)) => a.ends_with(&b),
            _ => false,
        },
    }
}

fn json_to_value(j: &Json) -> Value {
    match j {
        Json::Null => Value::Null,
        Json::Bool(b) => Value::Bool(*b),
        Json::Number(n) => Value::Number(*n),
        Json::String(s) => Value::string(s.clone()),
        Json::Array(items) => Value::array(items.iter().map(json_to_value).collect()),
        Json::Object(map) => {
            Value::map(map.iter().map(|(k, v)| (k.clone(), json_to_value(v))).collect())
        }
    }
}

/// `true` if `attr`/`target`/`op` matches somewhere inside `value`, drilling
/// into `Map`/`Array`/`Document` payloads.
fn value_has_match(value: &Value, attr: &str, target: &Value, op: SearchOp, exists_only: bool) -> bool {
    match value {
        Value::Map(m) => {
            let m = m.borrow();
            if let Some(v) = m.get(attr) {
                if exists_only || compare(v, target, op) {
                    return true;
                }
            }
            m.values().any(|v| value_has_match(v, attr, target, op, exists_only))
        }
        Value::Array(items) => items.borrow().iter().any(|v| value_has_match(v, attr, target, op, exists_only)),
        Value::Document(doc) => value_has_match(&json_to_value(&doc.borrow().data), attr, target, op, exists_only),
        _ => false,
    }
}

fn node_matches(arena: &TreeArena, node: NodeId, attr: &str, target: &Value, op: SearchOp, exists_only: bool) -> bool {
    let attrs = arena.attributes(node);
    if let Some(v) = attrs.get(attr) {
        if exists_only || compare(v, target, op) {
            return true;
        }
    }
    attrs.values().any(|v| value_has_match(v, attr, target, op, exists_only))
}

fn search_recursive(
    arena: &TreeArena,
    node: NodeId,
    attr: &str,
    target: &Value,
    op: SearchOp,
    exists_only: bool,
    out: &mut Vec<NodeId>,
) {
    if node_matches(arena, node, attr, target, op, exists_only) {
        out.push(node);
    }
    for child in arena.children(node) {
        search_recursive(arena, child, attr, target, op, exists_only, out);
    }
}

/// `treeSearch(root, attr, value, operator?, existsOnly?)`.
pub fn tree_search(
    arena: &TreeArena,
    root: NodeId,
    attr: &str,
    target: &Value,
    op: SearchOp,
    exists_only: bool,
) -> Vec<NodeId> {
    let mut out = Vec::new();
    search_recursive(arena, root, attr, target, op, exists_only, &mut out);
    out
}

/// `treeFind(forest, attrName, value, operator?)`: searches every root in
/// `forest`, deduplicating results by pointer identity (`NodeId` equality,
/// since all roots share one arena).
pub fn tree_find(
    arena: &TreeArena,
    forest: &[NodeId],
    attr: &str,
    target: &Value,
    op: SearchOp,
) -> Vec<NodeId> {
    let mut seen = HashSet::new();
    let mut out = Vec::new();
    for &root in forest {
        for hit in tree_search(arena, root, attr, target, op, false) {
            if seen.insert(hit) {
                out.push(hit);
            }
        }
    }
    out
}

/// `treeWalk(root, fn)`: enumerates the root, every child recursively, and
/// every nested attribute/array/map element, in the order a visitor should
/// be invoked.
pub fn walk(arena: &TreeArena, root: NodeId) -> Vec<Value> {
    let mut out = Vec::new();
    walk_node(arena, root, &mut out);
    out
}

fn walk_node(arena: &TreeArena, node: NodeId, out: &mut Vec<Value>) {
    out.push(Value::TreeNode(arena.clone(), node));
    for value in arena.attributes(node).into_values() {
        walk_value(&value, out);
    }
    for child in arena.children(node) {
        walk_node(arena, child, out);
    }
}

fn walk_value(value: &Value, out: &mut Vec<Value>) {
    out.push(value.clone());
    match value {
        Value::Array(items) => {
            for item in items.borrow().iter() {
                walk_value(item, out);
            }
        }
        Value::Map(m) => {
            for v in m.borrow().values() {
                walk_value(v, out);
            }
        }
        _ => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn search_finds_direct_attribute_match() {
        let arena = TreeArena::new();
        let root = arena.new_node("root");
        arena.set_attribute(root, "status", Value::string("active"));
        let hits = tree_search(&arena, root, "status", &Value::string("active"), SearchOp::Eq, false);
        assert_eq!(hits, vec![root]);
    }

    #[test]
    fn search_drills_into_embedded_map_attribute() {
        let arena = TreeArena::new();
        let root = arena.new_node("root");
        let mut nested = std::collections::HashMap::new();
        nested.insert("status".to_string(), Value::string("active"));
        arena.set_attribute(root, "payload", Value::map(nested));
        let hits = tree_search(&arena, root, "status", &Value::string("active"), SearchOp::Eq, false);
        assert_eq!(hits, vec![root]);
    }

    #[test]
    fn find_dedups_across_forest_by_identity() {
        let arena = TreeArena::new();
        let shared_child = arena.new_node("child");
        arena.set_attribute(shared_child, "k", Value::Number(1.0));
        let root_a = arena.new_node("a");
        let root_b = arena.new_node("b");
        arena.add_child(root_a, shared_child);
        // root_b does not own shared_child, so searching both roots from
        // independent references to the same forest still dedups by id.
        let forest = [root_a, root_b];
        let hits = tree_find(&arena, &forest, "k", &Value::Number(1.0), SearchOp::Eq);
        assert_eq!(hits, vec![shared_child]);
    }

    #[test]
    fn walk_visits_root_then_children_then_nested_array_elements() {
        let arena = TreeArena::new();
        let root = arena.new_node("root");
        arena.set_attribute(root, "tags", Value::array(vec![Value::string("x")]));
        let child = arena.new_node("child");
        arena.add_child(root, child);
        let items = walk(&arena, root);
        // root, its "tags" array, the "x" string inside it, then the child.
        assert_eq!(items.len(), 4);
    }
}
