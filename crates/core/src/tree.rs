use std::fmt;
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::Path;

use indexmap::IndexMap;
use serde::ser::{SerializeMap, SerializeSeq, Serializer};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{AstSeqError, Result};

/// Key carrying the grammar tag in front-end AST JSON.
pub const NODE_TYPE_KEY: &str = "_nodetype";
/// Key carrying the origin coordinate (`file:line[:column]`) in front-end AST JSON.
pub const COORD_KEY: &str = "coord";
/// Names the slots of a node that hold no children, which plain AST JSON
/// cannot tell apart from empty literal lists.
pub const EMPTY_SLOTS_KEY: &str = "_empty_slots";

const STACK_RED_ZONE: usize = 64 * 1024;
const STACK_SEGMENT: usize = 1024 * 1024;

/// A primitive attribute value.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Scalar {
    Null,
    Bool(bool),
    Int(i64),
    Str(String),
}

impl fmt::Display for Scalar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Scalar::Null => f.write_str("null"),
            Scalar::Bool(value) => write!(f, "{value}"),
            Scalar::Int(value) => write!(f, "{value}"),
            Scalar::Str(value) => f.write_str(value),
        }
    }
}

impl From<bool> for Scalar {
    fn from(value: bool) -> Self {
        Scalar::Bool(value)
    }
}

impl From<i64> for Scalar {
    fn from(value: i64) -> Self {
        Scalar::Int(value)
    }
}

impl From<&str> for Scalar {
    fn from(value: &str) -> Self {
        Scalar::Str(value.to_string())
    }
}

impl From<String> for Scalar {
    fn from(value: String) -> Self {
        Scalar::Str(value)
    }
}

/// A non-node attribute: either a single literal or an ordered list of them
/// (e.g. the `quals` or `storage` lists of a C declaration).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Literal {
    One(Scalar),
    Many(Vec<Scalar>),
}

impl From<Scalar> for Literal {
    fn from(value: Scalar) -> Self {
        Literal::One(value)
    }
}

impl From<i64> for Literal {
    fn from(value: i64) -> Self {
        Literal::One(value.into())
    }
}

impl From<bool> for Literal {
    fn from(value: bool) -> Self {
        Literal::One(value.into())
    }
}

impl From<&str> for Literal {
    fn from(value: &str) -> Self {
        Literal::One(value.into())
    }
}

impl From<String> for Literal {
    fn from(value: String) -> Self {
        Literal::One(value.into())
    }
}

impl From<Vec<Scalar>> for Literal {
    fn from(value: Vec<Scalar>) -> Self {
        Literal::Many(value)
    }
}

/// One AST node. Children are owned; slots keep their declaration order.
///
/// Equality compares `scalars` and `slots` as maps (ordering of distinct keys
/// does not matter) while child order inside a slot does. Dropping and
/// [`TreeNode::node_count`] walk the tree without recursion; the derived
/// `Clone`, `PartialEq` and `Debug` still recurse once per level.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct TreeNode {
    pub node_type: String,
    pub scalars: IndexMap<String, Literal>,
    pub slots: IndexMap<String, Vec<TreeNode>>,
    pub source_span: Option<String>,
}

impl Drop for TreeNode {
    fn drop(&mut self) {
        let mut pending: Vec<TreeNode> = self.slots.drain(..).flat_map(|(_, nodes)| nodes).collect();
        while let Some(mut node) = pending.pop() {
            pending.extend(node.slots.drain(..).flat_map(|(_, nodes)| nodes));
        }
    }
}

impl TreeNode {
    pub fn new(node_type: impl Into<String>) -> Self {
        Self {
            node_type: node_type.into(),
            scalars: IndexMap::new(),
            slots: IndexMap::new(),
            source_span: None,
        }
    }

    pub fn with_scalar(mut self, key: impl Into<String>, value: impl Into<Literal>) -> Self {
        self.scalars.insert(key.into(), value.into());
        self
    }

    pub fn with_slot(mut self, slot: impl Into<String>, children: Vec<TreeNode>) -> Self {
        self.slots.insert(slot.into(), children);
        self
    }

    pub fn with_span(mut self, span: impl Into<String>) -> Self {
        self.source_span = Some(span.into());
        self
    }

    /// Number of nodes in this subtree, including `self`.
    pub fn node_count(&self) -> usize {
        let mut count = 0;
        let mut pending = vec![self];
        while let Some(node) = pending.pop() {
            count += 1;
            pending.extend(node.slots.values().flatten());
        }
        count
    }

    /// Builds a tree from the dictionary shape produced by pycparser-style
    /// front-ends: `_nodetype`, `coord`, literal attributes and child
    /// attributes holding either one object or a list of objects.
    ///
    /// An `_empty_slots` list (written by [`TreeNode::to_json`]) turns the
    /// named keys into empty slots instead of empty literal lists.
    pub fn from_json(value: &Value) -> Result<Self> {
        stacker::maybe_grow(STACK_RED_ZONE, STACK_SEGMENT, || Self::from_json_object(value))
    }

    fn from_json_object(value: &Value) -> Result<Self> {
        let object = value
            .as_object()
            .ok_or_else(|| AstSeqError::MalformedTree("expected a JSON object".to_string()))?;
        let node_type = match object.get(NODE_TYPE_KEY) {
            Some(Value::String(tag)) if !tag.is_empty() => tag.clone(),
            _ => {
                return Err(AstSeqError::MalformedTree(format!(
                    "node is missing a non-empty {NODE_TYPE_KEY}"
                )))
            }
        };
        let mut node = TreeNode::new(node_type);
        let mut empty_slots = Vec::new();
        for (key, field) in object {
            match key.as_str() {
                NODE_TYPE_KEY => continue,
                COORD_KEY => {
                    node.source_span = match field {
                        Value::Null => None,
                        Value::String(coord) => Some(coord.clone()),
                        other => {
                            return Err(AstSeqError::MalformedTree(format!(
                                "coord must be a string or null, got {other}"
                            )))
                        }
                    }
                }
                EMPTY_SLOTS_KEY => empty_slots = slot_names(field)?,
                _ => node.absorb_field(key, field)?,
            }
        }
        for slot in empty_slots {
            if node.scalars.get(&slot) == Some(&Literal::Many(Vec::new())) {
                node.scalars.shift_remove(&slot);
            }
            node.slots.entry(slot).or_default();
        }
        Ok(node)
    }

    fn absorb_field(&mut self, key: &str, field: &Value) -> Result<()> {
        match field {
            Value::Object(_) => {
                self.slots
                    .insert(key.to_string(), vec![TreeNode::from_json(field)?]);
            }
            Value::Array(items) => {
                let mut children = Vec::new();
                let mut literals = Vec::new();
                for item in items {
                    if item.is_object() {
                        children.push(TreeNode::from_json(item)?);
                    } else {
                        literals.push(scalar_from_json(key, item)?);
                    }
                }
                // Mixed lists are split: nodes become the slot, the rest stays literal.
                let has_children = !children.is_empty();
                if !literals.is_empty() || !has_children {
                    self.scalars
                        .insert(key.to_string(), Literal::Many(literals));
                }
                if has_children {
                    self.slots.insert(key.to_string(), children);
                }
            }
            other => {
                self.scalars
                    .insert(key.to_string(), Literal::One(scalar_from_json(key, other)?));
            }
        }
        Ok(())
    }

    /// Inverse of [`TreeNode::from_json`]. Slots are always emitted as arrays;
    /// a literal sharing a slot's key is written ahead of the child objects.
    pub fn to_json(&self) -> Result<Value> {
        Ok(serde_json::to_value(JsonNode(self))?)
    }

    /// Reads AST JSON of any nesting depth.
    pub fn load_json<P: AsRef<Path>>(path: P) -> Result<Self> {
        let text = fs::read_to_string(path)?;
        let mut deserializer = serde_json::Deserializer::from_str(&text);
        deserializer.disable_recursion_limit();
        let value = Value::deserialize(serde_stacker::Deserializer::new(&mut deserializer))?;
        let tree = deserializer
            .end()
            .map_err(AstSeqError::from)
            .and_then(|()| Self::from_json(&value));
        release_json(value);
        tree
    }

    pub fn save_json<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let mut writer = BufWriter::new(File::create(path)?);
        serde_json::to_writer_pretty(&mut writer, &JsonNode(self))?;
        writer.flush()?;
        Ok(())
    }
}

/// Serializes a node in front-end dictionary shape, growing the stack as
/// nesting deepens.
struct JsonNode<'a>(&'a TreeNode);

impl Serialize for JsonNode<'_> {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        stacker::maybe_grow(STACK_RED_ZONE, STACK_SEGMENT, || self.write_fields(serializer))
    }
}

impl JsonNode<'_> {
    fn write_fields<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let node = self.0;
        let mut map = serializer.serialize_map(None)?;
        map.serialize_entry(NODE_TYPE_KEY, &node.node_type)?;
        for (key, literal) in &node.scalars {
            if !node.slots.contains_key(key) {
                map.serialize_entry(key, literal)?;
            }
        }
        let mut empty_slots = Vec::new();
        for (slot, children) in &node.slots {
            if children.is_empty() {
                empty_slots.push(slot.as_str());
            }
            let items = JsonSlot {
                literal: node.scalars.get(slot),
                children,
            };
            map.serialize_entry(slot, &items)?;
        }
        if !empty_slots.is_empty() {
            map.serialize_entry(EMPTY_SLOTS_KEY, &empty_slots)?;
        }
        map.serialize_entry(COORD_KEY, &node.source_span)?;
        map.end()
    }
}

struct JsonSlot<'a> {
    literal: Option<&'a Literal>,
    children: &'a [TreeNode],
}

impl Serialize for JsonSlot<'_> {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let literals: &[Scalar] = match self.literal {
            Some(Literal::One(scalar)) => std::slice::from_ref(scalar),
            Some(Literal::Many(values)) => values,
            None => &[],
        };
        let mut seq = serializer.serialize_seq(Some(literals.len() + self.children.len()))?;
        for scalar in literals {
            seq.serialize_element(scalar)?;
        }
        for child in self.children {
            seq.serialize_element(&JsonNode(child))?;
        }
        seq.end()
    }
}

fn slot_names(field: &Value) -> Result<Vec<String>> {
    let invalid = || AstSeqError::MalformedTree(format!("{EMPTY_SLOTS_KEY} must be a list of names"));
    let items = field.as_array().ok_or_else(invalid)?;
    items
        .iter()
        .map(|item| item.as_str().map(str::to_string).ok_or_else(invalid))
        .collect()
}

/// Drops a parsed document one container at a time.
fn release_json(value: Value) {
    let mut pending = vec![value];
    while let Some(value) = pending.pop() {
        match value {
            Value::Array(items) => pending.extend(items),
            Value::Object(map) => pending.extend(map.into_iter().map(|(_, item)| item)),
            _ => {}
        }
    }
}

fn scalar_from_json(key: &str, value: &Value) -> Result<Scalar> {
    match value {
        Value::Null => Ok(Scalar::Null),
        Value::Bool(flag) => Ok(Scalar::Bool(*flag)),
        Value::String(text) => Ok(Scalar::Str(text.clone())),
        Value::Number(number) => number.as_i64().map(Scalar::Int).ok_or_else(|| {
            AstSeqError::MalformedTree(format!("attribute {key}: unsupported number {number}"))
        }),
        Value::Array(_) | Value::Object(_) => Err(AstSeqError::MalformedTree(format!(
            "attribute {key}: nested values are not literals"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn pycparser_fragment() -> Value {
        json!({
            "_nodetype": "FuncDef",
            "coord": "main.c:1:5",
            "decl": {
                "_nodetype": "Decl",
                "name": "main",
                "quals": [],
                "storage": ["static"],
                "coord": "main.c:1:5"
            },
            "param_decls": null,
            "body": {
                "_nodetype": "Compound",
                "coord": "main.c:2:1",
                "block_items": [
                    {"_nodetype": "Return", "coord": "main.c:3:5",
                     "expr": {"_nodetype": "Constant", "type": "int", "value": "0", "coord": null}}
                ]
            }
        })
    }

    #[test]
    fn imports_pycparser_dictionaries() {
        let tree = TreeNode::from_json(&pycparser_fragment()).unwrap();
        assert_eq!(tree.node_type, "FuncDef");
        assert_eq!(tree.source_span.as_deref(), Some("main.c:1:5"));
        assert_eq!(tree.scalars.get("param_decls"), Some(&Literal::One(Scalar::Null)));
        let slot_names: Vec<&str> = tree.slots.keys().map(String::as_str).collect();
        assert_eq!(slot_names, vec!["decl", "body"]);
        let decl = &tree.slots["decl"][0];
        assert_eq!(decl.scalars["quals"], Literal::Many(vec![]));
        assert_eq!(decl.scalars["storage"], Literal::Many(vec!["static".into()]));
        assert_eq!(tree.node_count(), 5);
    }

    #[test]
    fn export_reimports_to_same_tree() {
        let tree = TreeNode::from_json(&pycparser_fragment()).unwrap();
        let again = TreeNode::from_json(&tree.to_json().unwrap()).unwrap();
        assert_eq!(tree, again);
    }

    #[test]
    fn empty_slots_survive_export() {
        let tree = TreeNode::new("Compound")
            .with_scalar("quals", Literal::Many(vec![]))
            .with_slot("block_items", vec![]);
        let exported = tree.to_json().unwrap();
        assert_eq!(exported["block_items"], json!([]));
        assert_eq!(exported[EMPTY_SLOTS_KEY], json!(["block_items"]));
        let again = TreeNode::from_json(&exported).unwrap();
        assert_eq!(again, tree);
        assert_eq!(again.scalars["quals"], Literal::Many(vec![]));
    }

    fn if_chain(depth: usize) -> String {
        let mut text = String::new();
        for line in 1..=depth {
            text.push_str(&format!(
                r#"{{"_nodetype": "If", "coord": "deep.c:{}", "cond": {{"_nodetype": "ID", "name": "x"}}, "iffalse": "#,
                line
            ));
        }
        text.push_str(r#"{"_nodetype": "Break", "coord": null}"#);
        text.push_str(&"}".repeat(depth));
        text
    }

    #[test]
    fn deeply_nested_files_load_and_save() {
        let depth = 5_000;
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("deep.ast.json");
        fs::write(&path, if_chain(depth)).unwrap();

        let tree = TreeNode::load_json(&path).unwrap();
        assert_eq!(tree.node_count(), 2 * depth + 1);
        assert_eq!(tree.source_span.as_deref(), Some("deep.c:1"));

        let copy = dir.path().join("copy.ast.json");
        tree.save_json(&copy).unwrap();
        assert_eq!(TreeNode::load_json(&copy).unwrap().node_count(), 2 * depth + 1);
    }

    #[test]
    fn trailing_garbage_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.ast.json");
        fs::write(&path, r#"{"_nodetype": "ID"} {"#).unwrap();
        assert!(matches!(
            TreeNode::load_json(&path).unwrap_err(),
            AstSeqError::SerdeJson(_)
        ));
    }

    #[test]
    fn mixed_lists_are_split_between_slot_and_literal() {
        let tree = TreeNode::from_json(&json!({
            "_nodetype": "InitList",
            "exprs": ["raw", {"_nodetype": "ID", "name": "x"}]
        }))
        .unwrap();
        assert_eq!(tree.scalars["exprs"], Literal::Many(vec!["raw".into()]));
        assert_eq!(tree.slots["exprs"].len(), 1);
    }

    #[test]
    fn missing_node_type_is_malformed() {
        let err = TreeNode::from_json(&json!({"name": "x"})).unwrap_err();
        assert!(matches!(err, AstSeqError::MalformedTree(_)));
        let err = TreeNode::from_json(&json!({"_nodetype": "ID", "value": 1.5})).unwrap_err();
        assert!(matches!(err, AstSeqError::MalformedTree(_)));
    }

    #[test]
    fn literals_serialize_untagged() {
        let literal = Literal::Many(vec![Scalar::Int(3), Scalar::Null, "x".into()]);
        let text = serde_json::to_string(&literal).unwrap();
        assert_eq!(text, r#"[3,null,"x"]"#);
        let parsed: Literal = serde_json::from_str(&text).unwrap();
        assert_eq!(parsed, literal);
    }
}
