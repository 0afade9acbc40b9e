use indexmap::IndexMap;

use crate::error::{AstSeqError, Result};
use crate::sequence::{NodeSequence, SequenceRecord};
use crate::tree::TreeNode;

/// Flattens a [`TreeNode`] into a [`NodeSequence`].
///
/// Indices are assigned by a pre-order walk that reserves a contiguous
/// interval for every subtree: a child takes `counter + 1`, and the counter
/// then jumps to the highest index used inside that child before the next
/// sibling is visited. Parents therefore always precede their descendants and
/// sibling ranges never overlap.
#[derive(Debug, Clone, Default)]
pub struct Encoder {
    base: usize,
}

impl Encoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start numbering at `base` instead of zero.
    pub fn with_base(base: usize) -> Self {
        Self { base }
    }

    pub fn encode(&self, tree: &TreeNode) -> Result<NodeSequence> {
        let mut records = Vec::with_capacity(tree.node_count());
        walk(tree, self.base, &mut records)?;
        records.sort_by_key(|record| record.index);
        debug_assert!(
            records
                .iter()
                .enumerate()
                .all(|(position, record)| record.index == position + self.base),
            "record positions must match their indices"
        );
        Ok(NodeSequence::new(records))
    }
}

/// A node whose children are still being numbered.
struct WalkFrame<'t> {
    node: &'t TreeNode,
    index: usize,
    /// Highest index used so far inside this subtree.
    last: usize,
    slot: usize,
    child: usize,
    slot_refs: IndexMap<String, Vec<usize>>,
}

impl<'t> WalkFrame<'t> {
    fn enter(node: &'t TreeNode, index: usize) -> Result<Self> {
        if node.node_type.is_empty() {
            return Err(AstSeqError::MalformedTree(format!(
                "node at index {index} has an empty node_type"
            )));
        }
        let slot_refs = node
            .slots
            .iter()
            .map(|(slot, children)| (slot.clone(), Vec::with_capacity(children.len())))
            .collect();
        Ok(Self {
            node,
            index,
            last: index,
            slot: 0,
            child: 0,
            slot_refs,
        })
    }

    fn next_child(&mut self) -> Option<&'t TreeNode> {
        while let Some((_, children)) = self.node.slots.get_index(self.slot) {
            if let Some(child) = children.get(self.child) {
                self.child += 1;
                return Some(child);
            }
            self.slot += 1;
            self.child = 0;
        }
        None
    }

    fn into_record(self) -> SequenceRecord {
        SequenceRecord {
            index: self.index,
            node_type: self.node.node_type.clone(),
            scalars: self.node.scalars.clone(),
            slot_refs: self.slot_refs,
            source_span: self.node.source_span.clone(),
        }
    }
}

/// Emits the records for `root` and its subtree; returns the highest index used.
fn walk(root: &TreeNode, base: usize, out: &mut Vec<SequenceRecord>) -> Result<usize> {
    let mut stack = vec![WalkFrame::enter(root, base)?];
    let mut highest = base;
    while let Some(frame) = stack.last_mut() {
        if let Some(child) = frame.next_child() {
            let child_index = frame.last + 1;
            if let Some((_, refs)) = frame.slot_refs.get_index_mut(frame.slot) {
                refs.push(child_index);
            }
            stack.push(WalkFrame::enter(child, child_index)?);
            continue;
        }
        if let Some(done) = stack.pop() {
            highest = done.last;
            out.push(done.into_record());
            if let Some(parent) = stack.last_mut() {
                parent.last = highest;
            }
        }
    }
    Ok(highest)
}
