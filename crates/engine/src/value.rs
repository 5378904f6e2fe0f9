//! The polymorphic `Value` type (component A: Value Model).
//!
//! A tagged sum with scalar variants stored inline and container variants
//! stored behind `Rc<RefCell<..>>` so built-ins can mutate them in place and
//! so two references to "the same" array/map are pointer-comparable
//! (Testable Property 3: `clone(x) != x` but structurally identical).

use std::{cell::RefCell, collections::HashMap, fmt, rc::Rc};

use indexmap::IndexMap;

use crate::{
    function::FunctionDef,
    tree::arena::{NodeId, TreeArena},
};

/// A JSON-shaped scalar/array/object graph, used as the payload of a
/// [`Value::Document`]. Kept independent from the engine's own `Value` so
/// document payloads round-trip cleanly through `serde_json`.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(untagged)]
pub enum Json {
    Null,
    Bool(bool),
    Number(f64),
    String(String),
    Array(Vec<Json>),
    Object(IndexMap<String, Json>),
}

impl Json {
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Null => "null",
            Self::Bool(_) => "bool",
            Self::Number(_) => "number",
            Self::String(_) => "string",
            Self::Array(_) => "array",
            Self::Object(_) => "object",
        }
    }
}

/// A document born from (or destined for) a backend read/write: a JSON
/// payload plus a metadata map carrying CAS/expiry information, independent
/// of the payload so it round-trips on its own (spec.md §4.1).
#[derive(Debug, Clone)]
pub struct DocumentInner {
    pub data: Json,
    /// Change-and-swap fingerprint, kept as a decimal string to avoid
    /// precision loss across 64-bit boundaries (spec.md §3 invariants).
    pub cas: Option<String>,
    pub meta: HashMap<String, Value>,
}

pub type DocumentHandle = Rc<RefCell<DocumentInner>>;

/// A named host-managed resource, opaque to scripts, looked up by name in
/// the evaluator's object table (spec.md §3 "HostObject").
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostObjectRef(pub Rc<str>);

/// A named workflow: parameter names, optional lifecycle hooks, and an
/// ordered step list of functions (spec.md §3 "Plan").
#[derive(Debug)]
pub struct PlanDef {
    pub name: String,
    pub params: Vec<String>,
    pub trigger: Option<Rc<FunctionDef>>,
    pub guard: Option<Rc<FunctionDef>>,
    pub drop: Option<Rc<FunctionDef>>,
    pub steps: Vec<Rc<FunctionDef>>,
}

/// The core tagged value type flowing through the lexer, parser, evaluator,
/// and every built-in.
#[derive(Debug, Clone)]
pub enum Value {
    Null,
    Number(f64),
    Bool(bool),
    String(Rc<str>),
    Array(Rc<RefCell<Vec<Value>>>),
    /// Insertion order is not guaranteed to be preserved across mutation
    /// (spec.md §3), so a plain hash map is the honest representation.
    Map(Rc<RefCell<HashMap<String, Value>>>),
    Document(DocumentHandle),
    /// References a node owned by a [`TreeArena`]. The arena handle is
    /// carried alongside the id so a `Value::TreeNode` is self-sufficient:
    /// it does not need an `Evaluator` in scope to be inspected or cloned.
    TreeNode(TreeArena, NodeId),
    Function(Rc<FunctionDef>),
    HostObject(HostObjectRef),
    Plan(Rc<PlanDef>),
    /// Internal transport envelope wrapping a value at the moment it is
    /// bound into a scope. Built-in dispatch unwraps this automatically
    /// before invoking any handler, so no handler -- and no script -- ever
    /// observes it directly (spec.md §4.3, §9 "ScopeEntry unwrapping").
    ScopeEntry(Box<Value>),
}

impl Value {
    pub fn string(s: impl Into<Rc<str>>) -> Self {
        Self::String(s.into())
    }

    pub fn array(items: Vec<Value>) -> Self {
        Self::Array(Rc::new(RefCell::new(items)))
    }

    pub fn map(items: HashMap<String, Value>) -> Self {
        Self::Map(Rc::new(RefCell::new(items)))
    }

    pub fn document(data: Json) -> Self {
        Self::Document(Rc::new(RefCell::new(DocumentInner { data, cas: None, meta: HashMap::new() })))
    }

    /// Recursively strips [`Value::ScopeEntry`] wrappers.
    pub fn unwrap_scope_entry(self) -> Self {
        match self {
            Self::ScopeEntry(inner) => inner.unwrap_scope_entry(),
            other => other,
        }
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Null => "null",
            Self::Number(_) => "number",
            Self::Bool(_) => "bool",
            Self::String(_) => "string",
            Self::Array(_) => "array",
            Self::Map(_) => "map",
            Self::Document(_) => "document",
            Self::TreeNode(..) => "tree_node",
            Self::Function(_) => "function",
            Self::HostObject(_) => "host_object",
            Self::Plan(_) => "plan",
            Self::ScopeEntry(_) => "scope_entry",
        }
    }

    /// Truthiness (spec.md §4.3): `true`; nonzero number; nonempty string;
    /// everything else false, including `Null`.
    pub fn truthy(&self) -> bool {
        match self {
            Self::Null => false,
            Self::Bool(b) => *b,
            Self::Number(n) => *n != 0.0,
            Self::String(s) => !s.is_empty(),
            Self::ScopeEntry(inner) => inner.truthy(),
            Self::Array(_)
            | Self::Map(_)
            | Self::Document(_)
            | Self::TreeNode(..)
            | Self::Function(_)
            | Self::HostObject(_)
            | Self::Plan(_) => true,
        }
    }

    /// Variant-structural equality for scalars, pointer identity for
    /// containers/functions (spec.md §4.1).
    pub fn value_eq(&self, other: &Value) -> bool {
        match (self, other) {
            (Self::ScopeEntry(a), _) => a.value_eq(other),
            (_, Self::ScopeEntry(b)) => self.value_eq(b),
            (Self::Null, Self::Null) => true,
            (Self::Bool(a), Self::Bool(b)) => a == b,
            (Self::Number(a), Self::Number(b)) => a == b,
            (Self::String(a), Self::String(b)) => a == b,
            (Self::Array(a), Self::Array(b)) => Rc::ptr_eq(a, b),
            (Self::Map(a), Self::Map(b)) => Rc::ptr_eq(a, b),
            (Self::Document(a), Self::Document(b)) => Rc::ptr_eq(a, b),
            (Self::TreeNode(arena_a, id_a), Self::TreeNode(arena_b, id_b)) => {
                arena_a.same_arena(arena_b) && id_a == id_b
            }
            (Self::Function(a), Self::Function(b)) => Rc::ptr_eq(a, b),
            (Self::HostObject(a), Self::HostObject(b)) => a == b,
            (Self::Plan(a), Self::Plan(b)) => Rc::ptr_eq(a, b),
            _ => false,
        }
    }

    /// Deep clone by variant: containers and tree nodes recursively clone
    /// their children; `Function`/`HostObject` clone as shallow handles
    /// (spec.md §4.1).
    pub fn deep_clone(&self) -> Value {
        match self {
            Self::Null => Self::Null,
            Self::Number(n) => Self::Number(*n),
            Self::Bool(b) => Self::Bool(*b),
            Self::String(s) => Self::String(s.clone()),
            Self::Array(items) => {
                let cloned: Vec<Value> = items.borrow().iter().map(Value::deep_clone).collect();
                Self::array(cloned)
            }
            Self::Map(items) => {
                let cloned: HashMap<String, Value> =
                    items.borrow().iter().map(|(k, v)| (k.clone(), v.deep_clone())).collect();
                Self::map(cloned)
            }
            Self::Document(doc) => {
                let inner = doc.borrow();
                let meta = inner.meta.iter().map(|(k, v)| (k.clone(), v.deep_clone())).collect();
                Self::Document(Rc::new(RefCell::new(DocumentInner {
                    data: inner.data.clone(),
                    cas: inner.cas.clone(),
                    meta,
                })))
            }
            Self::TreeNode(arena, id) => {
                let new_id = arena.deep_clone_node(*id);
                Self::TreeNode(arena.clone(), new_id)
            }
            Self::Function(f) => Self::Function(f.clone()),
            Self::HostObject(h) => Self::HostObject(h.clone()),
            Self::Plan(p) => Self::Plan(p.clone()),
            Self::ScopeEntry(inner) => inner.deep_clone(),
        }
    }

    /// Metadata get/set/clear, operating on the separate metadata map so it
    /// round-trips independently of payload attributes (spec.md §4.1).
    pub fn get_meta(&self, key: &str) -> Value {
        match self {
            Self::Document(doc) => doc.borrow().meta.get(key).cloned().unwrap_or(Value::Null),
            Self::TreeNode(arena, id) => arena.get_meta(*id, key),
            Self::ScopeEntry(inner) => inner.get_meta(key),
            _ => Value::Null,
        }
    }

    pub fn set_meta(&self, key: &str, value: Value) {
        match self {
            Self::Document(doc) => {
                doc.borrow_mut().meta.insert(key.to_string(), value);
            }
            Self::TreeNode(arena, id) => arena.set_meta(*id, key, value),
            Self::ScopeEntry(inner) => inner.set_meta(key, value),
            _ => {}
        }
    }

    pub fn get_all_meta(&self) -> HashMap<String, Value> {
        match self {
            Self::Document(doc) => doc.borrow().meta.clone(),
            Self::TreeNode(arena, id) => arena.get_all_meta(*id),
            Self::ScopeEntry(inner) => inner.get_all_meta(),
            _ => HashMap::new(),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Null => f.write_str("null"),
            Self::Number(n) => {
                if n.fract() == 0.0 && n.abs() < 1e15 {
                    write!(f, "{}", *n as i64)
                } else {
                    let mut buf = ryu::Buffer::new();
                    f.write_str(buf.format(*n))
                }
            }
            Self::Bool(b) => write!(f, "{b}"),
            Self::String(s) => f.write_str(s),
            Self::Array(items) => {
                f.write_str("[")?;
                for (i, v) in items.borrow().iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{v}")?;
                }
                f.write_str("]")
            }
            Self::Map(_) => f.write_str("<map>"),
            Self::Document(_) => f.write_str("<document>"),
            Self::TreeNode(arena, id) => write!(f, "<tree:{}>", arena.name(*id)),
            Self::Function(func) => write!(f, "<function({})>", func.params.join(", ")),
            Self::HostObject(h) => write!(f, "<host:{}>", h.0),
            Self::Plan(p) => write!(f, "<plan:{}>", p.name),
            Self::ScopeEntry(inner) => write!(f, "{inner}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn truthy_rules() {
        assert!(!Value::Null.truthy());
        assert!(!Value::Number(0.0).truthy());
        assert!(Value::Number(1.0).truthy());
        assert!(!Value::string("").truthy());
        assert!(Value::string("x").truthy());
        assert!(Value::Bool(true).truthy());
        assert!(!Value::Bool(false).truthy());
    }

    #[test]
    fn array_clone_is_pointer_distinct_but_structurally_equal() {
        let original = Value::array(vec![Value::Number(1.0), Value::Number(2.0)]);
        let cloned = original.deep_clone();
        assert!(!original.value_eq(&cloned));
        let (Value::Array(a), Value::Array(b)) = (&original, &cloned) else { unreachable!() };
        assert_eq!(a.borrow().len(), b.borrow().len());
        for (x, y) in a.borrow().iter().zip(b.borrow().iter()) {
            assert!(x.value_eq(y));
        }
    }

    #[test]
    fn scope_entry_unwraps_transparently() {
        let wrapped = Value::ScopeEntry(Box::new(Value::Number(5.0)));
        assert!(wrapped.truthy());
        assert_eq!(wrapped.unwrap_scope_entry().type_name(), "number");
    }
}
