use std::fs::{self, File};
use std::path::Path;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::tree::Literal;

/// One flattened AST node. Children are referenced by `index`, never embedded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SequenceRecord {
    pub index: usize,
    pub node_type: String,
    #[serde(default)]
    pub scalars: IndexMap<String, Literal>,
    #[serde(default)]
    pub slot_refs: IndexMap<String, Vec<usize>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_span: Option<String>,
}

impl SequenceRecord {
    pub fn child_indices(&self) -> impl Iterator<Item = usize> + '_ {
        self.slot_refs.values().flatten().copied()
    }
}

/// A linearized tree: records ordered by `index`.
///
/// Serialized as a bare JSON array so a `.seq.json` file can be read without
/// knowing anything about this crate.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NodeSequence {
    records: Vec<SequenceRecord>,
}

impl NodeSequence {
    pub fn new(records: Vec<SequenceRecord>) -> Self {
        Self { records }
    }

    pub fn records(&self) -> &[SequenceRecord] {
        &self.records
    }

    pub fn into_records(self) -> Vec<SequenceRecord> {
        self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, SequenceRecord> {
        self.records.iter()
    }

    pub fn max_index(&self) -> Option<usize> {
        self.records.iter().map(|record| record.index).max()
    }

    pub fn save_json<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let mut file = File::create(path)?;
        serde_json::to_writer_pretty(&mut file, self)?;
        Ok(())
    }

    pub fn load_json<P: AsRef<Path>>(path: P) -> Result<Self> {
        let file = File::open(path)?;
        let sequence: NodeSequence = serde_json::from_reader(file)?;
        Ok(sequence)
    }
}

impl<'a> IntoIterator for &'a NodeSequence {
    type Item = &'a SequenceRecord;
    type IntoIter = std::slice::Iter<'a, SequenceRecord>;

    fn into_iter(self) -> Self::IntoIter {
        self.records.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tree::Scalar;
    use serde_json::json;

    #[test]
    fn interchange_shape_is_plain_json() {
        let mut scalars = IndexMap::new();
        scalars.insert("v".to_string(), Literal::One(Scalar::Int(1)));
        let mut slot_refs = IndexMap::new();
        slot_refs.insert("body".to_string(), vec![1, 2]);
        let sequence = NodeSequence::new(vec![SequenceRecord {
            index: 0,
            node_type: "Root".to_string(),
            scalars,
            slot_refs,
            source_span: None,
        }]);
        let value = serde_json::to_value(&sequence).unwrap();
        assert_eq!(
            value,
            json!([{
                "index": 0,
                "node_type": "Root",
                "scalars": {"v": 1},
                "slot_refs": {"body": [1, 2]}
            }])
        );
        let parsed: NodeSequence = serde_json::from_value(value).unwrap();
        assert_eq!(parsed, sequence);
        assert_eq!(parsed.max_index(), Some(0));
    }

    #[test]
    fn missing_maps_default_to_empty() {
        let parsed: NodeSequence =
            serde_json::from_str(r#"[{"index": 3, "node_type": "ID"}]"#).unwrap();
        assert!(parsed.records()[0].scalars.is_empty());
        assert_eq!(parsed.records()[0].child_indices().count(), 0);
    }
}
