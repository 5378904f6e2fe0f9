//! Tree snapshot (de)serialization across JSON/YAML/XML/binary (component
//! E, spec.md §4.5 "Serialization").
//!
//! A node becomes a `{name, attributes, children}` shape for JSON/YAML; an
//! XML element whose tag is the node name, whose XML attributes are the
//! node's own attributes (stringified), and whose children are nested
//! elements, with a reserved `text` attribute carrying any attribute named
//! literally `text` so it doesn't collide with XML's own text-node concept.
//! Binary uses `postcard` over the same `NodeSnapshot` shape, optionally
//! gzip-wrapped via `flate2` (spec.md §9: "binary snapshot ... may be
//! gzip-compressed").

use std::collections::HashMap;
use std::io::{Read, Write};

use flate2::{read::GzDecoder, write::GzEncoder, Compression};

use crate::{
    config::TreeFormat,
    error::{EngineError, ErrorKind},
    tree::arena::{NodeId, TreeArena},
    value::{Json, Value},
};

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct NodeSnapshot {
    pub name: String,
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub attributes: HashMap<String, Json>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<NodeSnapshot>,
}

pub fn value_to_json(v: &Value) -> Json {
    match v {
        Value::Null => Json::Null,
        Value::Number(n) => Json::Number(*n),
        Value::Bool(b) => Json::Bool(*b),
        Value::String(s) => Json::String(s.to_string()),
        Value::Array(items) => Json::Array(items.borrow().iter().map(value_to_json).collect()),
        Value::Map(items) => {
            Json::Object(items.borrow().iter().map(|(k, v)| (k.clone(), value_to_json(v))).collect())
        }
        Value::Document(doc) => doc.borrow().data.clone(),
        // Non-data-shaped variants (tree nodes, functions, host objects,
        // plans) have no JSON projection; they are dropped from a snapshot
        // rather than erroring, since a tree attribute holding one of these
        // is already an authoring mistake the snapshot cannot repair.
        _ => Json::Null,
    }
}

pub fn json_to_value(j: &Json) -> Value {
    match j {
        Json::Null => Value::Null,
        Json::Bool(b) => Value::Bool(*b),
        Json::Number(n) => Value::Number(*n),
        Json::String(s) => Value::string(s.clone()),
        Json::Array(items) => Value::array(items.iter().map(json_to_value).collect()),
        Json::Object(map) => Value::map(map.iter().map(|(k, v)| (k.clone(), json_to_value(v))).collect()),
    }
}

pub fn build_snapshot(arena: &TreeArena, id: NodeId) -> NodeSnapshot {
    let attributes = arena.attributes(id).iter().map(|(k, v)| (k.clone(), value_to_json(v))).collect();
    let children = arena.children(id).into_iter().map(|child| build_snapshot(arena, child)).collect();
    NodeSnapshot { name: arena.name(id), attributes, children }
}

pub fn restore_snapshot(arena: &TreeArena, snapshot: &NodeSnapshot) -> NodeId {
    let id = arena.new_node(snapshot.name.clone());
    for (k, v) in &snapshot.attributes {
        arena.set_attribute(id, k, json_to_value(v));
    }
    for child in &snapshot.children {
        let child_id = restore_snapshot(arena, child);
        arena.add_child(id, child_id);
    }
    id
}

fn io_err(context: &str, e: impl std::fmt::Display) -> EngineError {
    EngineError::backend(format!("{context}: {e}"))
}

pub fn serialize(arena: &TreeArena, root: NodeId, format: TreeFormat) -> Result<Vec<u8>, EngineError> {
    let snapshot = build_snapshot(arena, root);
    match format {
        TreeFormat::Json => serde_json::to_vec_pretty(&snapshot).map_err(|e| io_err("encoding tree as json", e)),
        TreeFormat::Yaml => serde_yaml::to_string(&snapshot).map(String::into_bytes).map_err(|e| io_err("encoding tree as yaml", e)),
        TreeFormat::Xml => Ok(write_xml(&snapshot).into_bytes()),
        TreeFormat::Binary => {
            let bytes = postcard::to_allocvec(&snapshot).map_err(|e| io_err("encoding tree as binary", e))?;
            let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
            encoder.write_all(&bytes).map_err(|e| io_err("gzip-compressing tree snapshot", e))?;
            encoder.finish().map_err(|e| io_err("finishing tree snapshot gzip stream", e))
        }
    }
}

pub fn deserialize(arena: &TreeArena, format: TreeFormat, bytes: &[u8]) -> Result<NodeId, EngineError> {
    let snapshot = match format {
        TreeFormat::Json => serde_json::from_slice(bytes).map_err(|e| io_err("decoding json tree", e))?,
        TreeFormat::Yaml => serde_yaml::from_slice(bytes).map_err(|e| io_err("decoding yaml tree", e))?,
        TreeFormat::Xml => {
            let text = std::str::from_utf8(bytes).map_err(|e| io_err("decoding xml tree as utf-8", e))?;
            read_xml(text)?
        }
        TreeFormat::Binary => {
            let mut decoder = GzDecoder::new(bytes);
            let mut raw = Vec::new();
            decoder.read_to_end(&mut raw).map_err(|e| io_err("gunzipping tree snapshot", e))?;
            postcard::from_bytes(&raw).map_err(|e| io_err("decoding binary tree", e))?
        }
    };
    Ok(restore_snapshot(arena, &snapshot))
}

fn escape_xml(s: &str) -> String {
    s.replace('&', "&amp;").replace('<', "&lt;").replace('>', "&gt;").replace('"', "&quot;").replace('\'', "&apos;")
}

fn json_attr_to_string(j: &Json) -> String {
    match j {
        Json::Null => String::new(),
        Json::Bool(b) => b.to_string(),
        Json::Number(n) => {
            if n.fract() == 0.0 && n.abs() < 1e15 {
                (*n as i64).to_string()
            } else {
                n.to_string()
            }
        }
        Json::String(s) => s.clone(),
        other => serde_json::to_string(other).unwrap_or_default(),
    }
}

fn write_xml(snapshot: &NodeSnapshot) -> String {
    let mut out = String::new();
    write_xml_node(snapshot, &mut out);
    out
}

fn write_xml_node(node: &NodeSnapshot, out: &mut String) {
    out.push('<');
    out.push_str(&node.name);
    for (k, v) in &node.attributes {
        out.push(' ');
        out.push_str(&escape_xml(k));
        out.push_str("=\"");
        out.push_str(&escape_xml(&json_attr_to_string(v)));
        out.push('"');
    }
    if node.children.is_empty() {
        out.push_str("/>");
        return;
    }
    out.push('>');
    for child in &node.children {
        write_xml_node(child, out);
    }
    out.push_str("</");
    out.push_str(&node.name);
    out.push('>');
}

/// Parses the small subset of XML this engine writes: nested elements with
/// string-valued attributes, no mixed text content outside the reserved
/// `text` attribute.
fn read_xml(text: &str) -> Result<NodeSnapshot, EngineError> {
    use xml::reader::{EventReader, XmlEvent};

    let parser = EventReader::from_str(text);
    let mut stack: Vec<NodeSnapshot> = Vec::new();
    let mut root: Option<NodeSnapshot> = None;

    for event in parser {
        match event.map_err(|e| io_err("parsing xml tree", e))? {
            XmlEvent::StartElement { name, attributes, .. } => {
                let attrs = attributes
                    .into_iter()
                    .map(|a| (a.name.local_name, Json::String(a.value)))
                    .collect();
                stack.push(NodeSnapshot { name: name.local_name, attributes: attrs, children: Vec::new() });
            }
            XmlEvent::EndElement { .. } => {
                let finished = stack.pop().ok_or_else(|| EngineError::new(ErrorKind::Validation, "unbalanced xml tree"))?;
                match stack.last_mut() {
                    Some(parent) => parent.children.push(finished),
                    None => root = Some(finished),
                }
            }
            _ => {}
        }
    }
    root.ok_or_else(|| EngineError::new(ErrorKind::Validation, "xml tree had no root element"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn json_roundtrip_preserves_shape_and_attributes() {
        let arena = TreeArena::new();
        let root = arena.new_node("root");
        arena.set_attribute(root, "status", Value::string("active"));
        let child = arena.new_node("child");
        arena.set_attribute(child, "n", Value::Number(3.0));
        arena.add_child(root, child);

        let bytes = serialize(&arena, root, TreeFormat::Json).unwrap();
        let restored_arena = TreeArena::new();
        let restored = deserialize(&restored_arena, TreeFormat::Json, &bytes).unwrap();
        assert_eq!(restored_arena.name(restored), "root");
        assert_eq!(restored_arena.children(restored).len(), 1);
        assert!(matches!(restored_arena.get_attribute(restored, "status"), Value::String(ref s) if &**s == "active"));
    }

    #[test]
    fn xml_roundtrip_escapes_and_restores_attributes() {
        let arena = TreeArena::new();
        let root = arena.new_node("root");
        arena.set_attribute(root, "label", Value::string("a & b"));

        let bytes = serialize(&arena, root, TreeFormat::Xml).unwrap();
        let restored_arena = TreeArena::new();
        let restored = deserialize(&restored_arena, TreeFormat::Xml, &bytes).unwrap();
        assert!(matches!(restored_arena.get_attribute(restored, "label"), Value::String(ref s) if &**s == "a & b"));
    }

    #[test]
    fn binary_roundtrip_is_gzip_wrapped() {
        let arena = TreeArena::new();
        let root = arena.new_node("root");
        arena.set_attribute(root, "k", Value::Number(1.0));

        let bytes = serialize(&arena, root, TreeFormat::Binary).unwrap();
        // gzip magic bytes
        assert_eq!(&bytes[0..2], &[0x1f, 0x8b]);
        let restored_arena = TreeArena::new();
        let restored = deserialize(&restored_arena, TreeFormat::Binary, &bytes).unwrap();
        assert!(matches!(restored_arena.get_attribute(restored, "k"), Value::Number(n) if n == 1.0));
    }
}
