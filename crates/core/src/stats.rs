use indexmap::IndexMap;
use rustc_hash::FxHashMap;
use serde::Serialize;

use crate::sequence::NodeSequence;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SequenceStats {
    pub records: usize,
    pub roots: usize,
    pub leaves: usize,
    pub max_depth: usize,
    pub slot_refs: usize,
    /// Node type histogram, most frequent first.
    pub node_types: IndexMap<String, usize>,
}

impl SequenceStats {
    pub fn measure(sequence: &NodeSequence) -> Self {
        let mut ordered: Vec<_> = sequence.iter().collect();
        ordered.sort_by_key(|record| record.index);

        let mut depth: FxHashMap<usize, usize> = FxHashMap::default();
        let mut roots = 0;
        let mut leaves = 0;
        let mut slot_refs = 0;
        let mut max_depth = 0;
        let mut node_types: IndexMap<String, usize> = IndexMap::new();
        for record in ordered {
            let own = match depth.get(&record.index) {
                Some(&d) => d,
                None => {
                    roots += 1;
                    0
                }
            };
            max_depth = max_depth.max(own);
            let mut children = 0;
            for child in record.child_indices() {
                depth.entry(child).or_insert(own + 1);
                children += 1;
            }
            if children == 0 {
                leaves += 1;
            }
            slot_refs += children;
            *node_types.entry(record.node_type.clone()).or_default() += 1;
        }
        node_types.sort_by(|ka, a, kb, b| b.cmp(a).then_with(|| ka.cmp(kb)));

        Self {
            records: sequence.len(),
            roots,
            leaves,
            max_depth,
            slot_refs,
            node_types,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::encoder::Encoder;
    use crate::tree::TreeNode;

    #[test]
    fn measures_shape_of_encoded_tree() {
        let tree = TreeNode::new("FileAST").with_slot(
            "ext",
            vec![
                TreeNode::new("Decl").with_slot("type", vec![TreeNode::new("TypeDecl")]),
                TreeNode::new("Decl"),
            ],
        );
        let stats = SequenceStats::measure(&Encoder::new().encode(&tree).unwrap());
        assert_eq!(stats.records, 4);
        assert_eq!(stats.roots, 1);
        assert_eq!(stats.leaves, 2);
        assert_eq!(stats.max_depth, 2);
        assert_eq!(stats.slot_refs, 3);
        assert_eq!(stats.node_types.get_index(0), Some((&"Decl".to_string(), &2)));
    }
}
