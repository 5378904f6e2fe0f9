//! Tree node storage (component E), implemented as an arena plus indices
//! rather than owning pointers, per spec.md §9's design note on weak parent
//! edges: "Implement as an arena plus indices... Tree nodes must carry a
//! parent back-reference... but never own the parent."

use std::{cell::RefCell, collections::HashMap, rc::Rc};

use crate::{tree::csv_node::CsvBacking, value::Value};

/// Index into a [`TreeArena`]. Stable for the lifetime of the node; reused
/// only after the slot has been freed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(u32);

impl NodeId {
    fn new(index: usize) -> Self {
        Self(index.try_into().expect("tree arena exceeded u32::MAX nodes"))
    }

    fn index(self) -> usize {
        self.0 as usize
    }
}

/// Concrete backing-store shapes a node can carry (spec.md §3 "TreeNode").
#[derive(Debug, Clone, Default)]
pub enum TreeKind {
    #[default]
    Generic,
    Json,
    Map,
    Xml {
        namespace: Option<String>,
        is_comment: bool,
    },
    Csv(CsvBacking),
    Yaml,
    /// Named host object key for a SQL connection backing this node.
    Sql(String),
    /// Named host object key for a document-store cluster backing this node.
    DocumentDb(String),
}

#[derive(Debug)]
struct Slot {
    name: String,
    kind: TreeKind,
    attributes: HashMap<String, Value>,
    children: Vec<NodeId>,
    parent: Option<NodeId>,
    meta: HashMap<String, Value>,
}

#[derive(Debug, Default)]
struct ArenaInner {
    slots: Vec<Option<Slot>>,
    free: Vec<NodeId>,
}

/// Shared handle to the forest's backing storage. Clone is cheap (`Rc`
/// bump) and all clones observe the same nodes.
#[derive(Debug, Clone, Default)]
pub struct TreeArena(Rc<RefCell<ArenaInner>>);

impl TreeArena {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn same_arena(&self, other: &TreeArena) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }

    pub fn new_node(&self, name: impl Into<String>) -> NodeId {
        self.new_node_with_kind(name, TreeKind::Generic)
    }

    pub fn new_node_with_kind(&self, name: impl Into<String>, kind: TreeKind) -> NodeId {
        let slot = Slot { name: name.into(), kind, attributes: HashMap::new(), children: Vec::new(), parent: None, meta: HashMap::new() };
        let mut inner = self.0.borrow_mut();
        if let Some(id) = inner.free.pop() {
            inner.slots[id.index()] = Some(slot);
            id
        } else {
            inner.slots.push(Some(slot));
            NodeId::new(inner.slots.len() - 1)
        }
    }

    fn with_slot<T>(&self, id: NodeId, f: impl FnOnce(&Slot) -> T) -> T {
        let inner = self.0.borrow();
        let slot = inner.slots[id.index()].as_ref().expect("dangling NodeId");
        f(slot)
    }

    fn with_slot_mut<T>(&self, id: NodeId, f: impl FnOnce(&mut Slot) -> T) -> T {
        let mut inner = self.0.borrow_mut();
        let slot = inner.slots[id.index()].as_mut().expect("dangling NodeId");
        f(slot)
    }

    pub fn name(&self, id: NodeId) -> String {
        self.with_slot(id, |s| s.name.clone())
    }

    pub fn set_name(&self, id: NodeId, name: impl Into<String>) {
        self.with_slot_mut(id, |s| s.name = name.into());
    }

    pub fn kind(&self, id: NodeId) -> TreeKind {
        self.with_slot(id, |s| s.kind.clone())
    }

    pub fn set_kind(&self, id: NodeId, kind: TreeKind) {
        self.with_slot_mut(id, |s| s.kind = kind);
    }

    pub fn parent(&self, id: NodeId) -> Option<NodeId> {
        self.with_slot(id, |s| s.parent)
    }

    pub fn children(&self, id: NodeId) -> Vec<NodeId> {
        self.with_slot(id, |s| s.children.clone())
    }

    pub fn get_attribute(&self, id: NodeId, key: &str) -> Value {
        self.with_slot(id, |s| s.attributes.get(key).cloned().unwrap_or(Value::Null))
    }

    pub fn set_attribute(&self, id: NodeId, key: &str, value: Value) {
        self.with_slot_mut(id, |s| {
            s.attributes.insert(key.to_string(), value);
        });
    }

    pub fn attributes(&self, id: NodeId) -> HashMap<String, Value> {
        self.with_slot(id, |s| s.attributes.clone())
    }

    pub fn get_meta(&self, id: NodeId, key: &str) -> Value {
        self.with_slot(id, |s| s.meta.get(key).cloned().unwrap_or(Value::Null))
    }

    pub fn set_meta(&self, id: NodeId, key: &str, value: Value) {
        self.with_slot_mut(id, |s| {
            s.meta.insert(key.to_string(), value);
        });
    }

    pub fn get_all_meta(&self, id: NodeId) -> HashMap<String, Value> {
        self.with_slot(id, |s| s.meta.clone())
    }

    pub fn csv_backing(&self, id: NodeId) -> Option<CsvBacking> {
        self.with_slot(id, |s| match &s.kind {
            TreeKind::Csv(b) => Some(b.clone()),
            _ => None,
        })
    }

    pub fn set_csv_backing(&self, id: NodeId, backing: CsvBacking) {
        self.with_slot_mut(id, |s| s.kind = TreeKind::Csv(backing));
    }

    /// Adds `child` under `parent`, transferring ownership: if `child`
    /// already had a parent, it is detached from that parent's children
    /// list first (spec.md §3 "adding a node as a child transfers
    /// ownership to the parent").
    pub fn add_child(&self, parent: NodeId, child: NodeId) {
        if let Some(old_parent) = self.parent(child) {
            self.with_slot_mut(old_parent, |s| s.children.retain(|c| *c != child));
        }
        self.with_slot_mut(child, |s| s.parent = Some(parent));
        self.with_slot_mut(parent, |s| s.children.push(child));
    }

    pub fn remove_child(&self, parent: NodeId, child: NodeId) {
        self.with_slot_mut(parent, |s| s.children.retain(|c| *c != child));
        self.with_slot_mut(child, |s| s.parent = None);
    }

    /// Recursively clones the subtree rooted at `id`, returning the new
    /// root's id. The clone lives in the same arena, detached (no parent).
    pub fn deep_clone_node(&self, id: NodeId) -> NodeId {
        let (name, kind, attributes, meta, children) = self.with_slot(id, |s| {
            (s.name.clone(), s.kind.clone(), s.attributes.clone(), s.meta.clone(), s.children.clone())
        });
        let attributes = attributes.iter().map(|(k, v)| (k.clone(), v.deep_clone())).collect();
        let meta = meta.iter().map(|(k, v)| (k.clone(), v.deep_clone())).collect();
        let new_id = self.new_node_with_kind(name, kind);
        self.with_slot_mut(new_id, |s| {
            s.attributes = attributes;
            s.meta = meta;
        });
        for child in children {
            let cloned_child = self.deep_clone_node(child);
            self.add_child(new_id, cloned_child);
        }
        new_id
    }

    /// Releases a node and its subtree back to the free list. Callers must
    /// ensure no `Value::TreeNode` still references a freed id.
    pub fn free_subtree(&self, id: NodeId) {
        let children = self.children(id);
        for child in children {
            self.free_subtree(child);
        }
        let mut inner = self.0.borrow_mut();
        inner.slots[id.index()] = None;
        inner.free.push(id);
    }

    pub fn is_root(&self, id: NodeId) -> bool {
        self.parent(id).is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn add_child_transfers_ownership_from_old_parent() {
        let arena = TreeArena::new();
        let a = arena.new_node("a");
        let b = arena.new_node("b");
        let child = arena.new_node("child");
        arena.add_child(a, child);
        assert_eq!(arena.children(a), vec![child]);
        arena.add_child(b, child);
        assert_eq!(arena.children(a), Vec::<NodeId>::new());
        assert_eq!(arena.children(b), vec![child]);
        assert_eq!(arena.parent(child), Some(b));
    }

    #[test]
    fn deep_clone_is_recursive_and_detached() {
        let arena = TreeArena::new();
        let root = arena.new_node("root");
        let child = arena.new_node("child");
        arena.set_attribute(child, "k", Value::Number(1.0));
        arena.add_child(root, child);

        let clone = arena.deep_clone_node(root);
        assert!(arena.is_root(clone));
        assert_ne!(clone, root);
        let clone_children = arena.children(clone);
        assert_eq!(clone_children.len(), 1);
        assert_ne!(clone_children[0], child);
        assert_eq!(arena.get_attribute(clone_children[0], "k").type_name(), "number");
    }
}
