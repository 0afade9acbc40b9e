use indexmap::IndexMap;
use rustc_hash::{FxHashMap, FxHashSet};

use crate::error::{AstSeqError, Result};
use crate::sequence::{NodeSequence, SequenceRecord};
use crate::tree::TreeNode;

/// Rebuilds trees from linearized records.
#[derive(Debug, Default)]
pub struct Decoder;

impl Decoder {
    pub fn new() -> Self {
        Self
    }

    /// Decodes a sequence that must hold exactly one tree.
    pub fn decode(&self, sequence: &NodeSequence) -> Result<TreeNode> {
        let mut roots = self.decode_forest(sequence.records())?;
        match roots.len() {
            1 => Ok(roots.remove(0)),
            0 => Err(AstSeqError::MalformedSequence(
                "sequence contains no records".to_string(),
            )),
            n => Err(AstSeqError::MalformedSequence(format!(
                "sequence contains {n} unconnected roots"
            ))),
        }
    }

    /// Decodes every tree whose root is not referenced by another record,
    /// in ascending root index order.
    pub fn decode_forest(&self, records: &[SequenceRecord]) -> Result<Vec<TreeNode>> {
        let mut scope = DecodeScope::new(records)?;
        let mut order: Vec<usize> = scope.by_index.keys().copied().collect();
        order.sort_unstable();
        let mut roots = Vec::new();
        for index in order {
            if scope.visited.contains(&index) {
                continue;
            }
            scope.visited.insert(index);
            roots.push(scope.materialize(index)?);
        }
        Ok(roots)
    }
}

/// State owned by a single top-level decode call.
struct DecodeScope<'a> {
    by_index: FxHashMap<usize, &'a SequenceRecord>,
    visited: FxHashSet<usize>,
}

impl<'a> DecodeScope<'a> {
    fn new(records: &'a [SequenceRecord]) -> Result<Self> {
        let mut by_index = FxHashMap::default();
        by_index.reserve(records.len());
        for record in records {
            if by_index.insert(record.index, record).is_some() {
                return Err(AstSeqError::MalformedSequence(format!(
                    "more than one record claims index {}",
                    record.index
                )));
            }
        }
        Ok(Self {
            by_index,
            visited: FxHashSet::default(),
        })
    }

    /// Builds the node at `root`; the caller has already marked it visited.
    /// Children are assembled on an explicit stack, so depth is bounded only
    /// by memory.
    fn materialize(&mut self, root: usize) -> Result<TreeNode> {
        let record = self.by_index.get(&root).copied().ok_or_else(|| {
            AstSeqError::MalformedSequence(format!("record {root} is not part of the sequence"))
        })?;
        let mut stack = vec![BuildFrame::new(root, record)];
        let mut finished = None;
        while let Some(frame) = stack.last_mut() {
            if let Some(child) = frame.next_child() {
                let parent = frame.index;
                let record = self.claim(parent, child)?;
                stack.push(BuildFrame::new(child, record));
                continue;
            }
            if let Some(done) = stack.pop() {
                let node = done.into_node();
                match stack.last_mut() {
                    Some(parent) => parent.adopt(node),
                    None => finished = Some(node),
                }
            }
        }
        finished.ok_or_else(|| {
            AstSeqError::MalformedSequence(format!("record {root} did not resolve to a tree"))
        })
    }

    /// Marks `child` as referenced from `parent`.
    fn claim(&mut self, parent: usize, child: usize) -> Result<&'a SequenceRecord> {
        let record = self
            .by_index
            .get(&child)
            .copied()
            .ok_or(AstSeqError::DanglingReference {
                parent,
                index: child,
            })?;
        if !self.visited.insert(child) {
            return Err(AstSeqError::MalformedSequence(format!(
                "index {child} is referenced more than once (via record {parent})"
            )));
        }
        Ok(record)
    }
}

/// A record whose children are still being built.
struct BuildFrame<'a> {
    index: usize,
    record: &'a SequenceRecord,
    slot: usize,
    child: usize,
    slots: IndexMap<String, Vec<TreeNode>>,
}

impl<'a> BuildFrame<'a> {
    fn new(index: usize, record: &'a SequenceRecord) -> Self {
        let slots = record
            .slot_refs
            .iter()
            .map(|(slot, refs)| (slot.clone(), Vec::with_capacity(refs.len())))
            .collect();
        Self {
            index,
            record,
            slot: 0,
            child: 0,
            slots,
        }
    }

    fn next_child(&mut self) -> Option<usize> {
        while let Some((_, refs)) = self.record.slot_refs.get_index(self.slot) {
            if let Some(&child) = refs.get(self.child) {
                self.child += 1;
                return Some(child);
            }
            self.slot += 1;
            self.child = 0;
        }
        None
    }

    /// Appends a finished child to the slot that requested it.
    fn adopt(&mut self, node: TreeNode) {
        if let Some((_, children)) = self.slots.get_index_mut(self.slot) {
            children.push(node);
        }
    }

    fn into_node(self) -> TreeNode {
        TreeNode {
            node_type: self.record.node_type.clone(),
            scalars: self.record.scalars.clone(),
            slots: self.slots,
            source_span: self.record.source_span.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::encoder::Encoder;

    fn record(index: usize, node_type: &str, refs: &[(&str, &[usize])]) -> SequenceRecord {
        SequenceRecord {
            index,
            node_type: node_type.to_string(),
            scalars: IndexMap::new(),
            slot_refs: refs
                .iter()
                .map(|(slot, children)| (slot.to_string(), children.to_vec()))
                .collect(),
            source_span: None,
        }
    }

    #[test]
    fn dangling_reference_is_reported() {
        let sequence = NodeSequence::new(vec![record(0, "Root", &[("body", &[1, 7])]), record(1, "Leaf", &[])]);
        let err = Decoder::new().decode(&sequence).unwrap_err();
        assert!(matches!(
            err,
            AstSeqError::DanglingReference { parent: 0, index: 7 }
        ));
    }

    #[test]
    fn duplicate_index_is_malformed() {
        let sequence = NodeSequence::new(vec![record(0, "Root", &[]), record(0, "Other", &[])]);
        let err = Decoder::new().decode(&sequence).unwrap_err();
        assert!(matches!(err, AstSeqError::MalformedSequence(_)));
    }

    #[test]
    fn shared_child_and_cycles_are_rejected() {
        let shared = NodeSequence::new(vec![
            record(0, "Root", &[("a", &[1]), ("b", &[1])]),
            record(1, "Leaf", &[]),
        ]);
        assert!(matches!(
            Decoder::new().decode(&shared).unwrap_err(),
            AstSeqError::MalformedSequence(_)
        ));

        let cycle = NodeSequence::new(vec![
            record(0, "Root", &[("body", &[1])]),
            record(1, "Loop", &[("back", &[0])]),
        ]);
        assert!(matches!(
            Decoder::new().decode(&cycle).unwrap_err(),
            AstSeqError::MalformedSequence(_)
        ));
    }

    #[test]
    fn scan_order_does_not_matter() {
        let tree = TreeNode::new("Root").with_slot(
            "body",
            vec![
                TreeNode::new("If").with_slot("cond", vec![TreeNode::new("ID").with_scalar("name", "x")]),
                TreeNode::new("Return"),
            ],
        );
        let mut records = Encoder::new().encode(&tree).unwrap().into_records();
        records.reverse();
        let decoded = Decoder::new().decode(&NodeSequence::new(records)).unwrap();
        assert_eq!(decoded, tree);
    }

    #[test]
    fn visited_state_is_fresh_per_call() {
        let decoder = Decoder::new();
        let tree = TreeNode::new("Root").with_slot("body", vec![TreeNode::new("Leaf")]);
        let sequence = Encoder::new().encode(&tree).unwrap();
        let first = decoder.decode(&sequence).unwrap();
        let second = decoder.decode(&sequence).unwrap();
        assert_eq!(first, second);
        assert_eq!(second.slots["body"].len(), 1);
    }

    #[test]
    fn long_chains_decode_without_recursion() {
        let depth = 100_000;
        let records: Vec<SequenceRecord> = (0..depth)
            .map(|index| {
                if index + 1 < depth {
                    record(index, "Link", &[("next", &[index + 1])])
                } else {
                    record(index, "End", &[])
                }
            })
            .collect();
        let sequence = NodeSequence::new(records);
        let tree = Decoder::new().decode(&sequence).unwrap();
        assert_eq!(tree.node_count(), depth);
        assert_eq!(tree.slots["next"][0].node_type, "Link");
        assert_eq!(Encoder::new().encode(&tree).unwrap(), sequence);
    }

    #[test]
    fn broken_link_deep_in_a_chain_is_typed() {
        let depth = 50_000;
        let records: Vec<SequenceRecord> = (0..depth)
            .map(|index| record(index, "Link", &[("next", &[index + 1])]))
            .collect();
        let err = Decoder::new().decode(&NodeSequence::new(records)).unwrap_err();
        assert!(matches!(
            err,
            AstSeqError::DanglingReference { parent, index } if parent == depth - 1 && index == depth
        ));
    }

    #[test]
    fn forest_and_empty_sequences() {
        let forest = vec![record(0, "A", &[]), record(1, "B", &[])];
        let roots = Decoder::new().decode_forest(&forest).unwrap();
        assert_eq!(roots.len(), 2);
        assert!(Decoder::new()
            .decode(&NodeSequence::new(forest))
            .is_err());
        assert!(Decoder::new().decode(&NodeSequence::default()).is_err());
    }
}
