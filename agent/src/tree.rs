//! Operation history tree.
//!
//! Nodes live in an append-only arena; parent/child relations are plain
//! indices, which keeps the back-references cheap and avoids ownership
//! cycles. The accepted chain is strictly linear: each node holds at most
//! one `child`, and rejected alternatives hang off their parent in
//! `invalid_ops`. Nothing is ever deleted, so the full history stays
//! auditable.

use serde::{Deserialize, Serialize};

use crate::core::error::ChainConflictError;
use crate::core::reply::ActionProperty;
use crate::core::store::ChunkId;

/// Handle into the tree's node arena. Index 0 is the sentinel root.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct NodeId(usize);

impl NodeId {
    pub const ROOT: NodeId = NodeId(0);

    pub fn index(self) -> usize {
        self.0
    }
}

impl std::fmt::Display for NodeId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// One proposed operation and everything learned about it.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OperationNode {
    pub thought: String,
    pub action: String,
    pub property: Option<ActionProperty>,
    /// Set once the action has been executed.
    pub observation: Option<String>,
    /// Judged in the following iteration; `None` while pending.
    pub valid: Option<bool>,
    pub summary: String,
    pub lessons: String,
    /// Workspace diff snapshot taken after the action ran.
    pub code_change: String,
    /// Chunks this operation loaded or re-loaded into the context.
    pub touched: Vec<ChunkId>,
    /// Citation counts from this operation's thoughts, by chunk.
    pub referred: Vec<(ChunkId, u32)>,
    /// Weak back-reference; `None` only for the sentinel root.
    pub parent: Option<NodeId>,
    /// The accepted continuation, at most one.
    pub child: Option<NodeId>,
    /// Rejected alternative attempts, owned as a list, not part of the chain.
    pub invalid_ops: Vec<NodeId>,
    /// Rejected attempts since the last accepted child.
    pub consecutive_invalid: u32,
}

/// Fields known at proposal time.
#[derive(Debug, Clone, Default)]
pub struct NodeDraft {
    pub thought: String,
    pub action: String,
    pub property: Option<ActionProperty>,
    pub touched: Vec<ChunkId>,
    pub referred: Vec<(ChunkId, u32)>,
}

/// The operation history tree plus the global operation counter.
#[derive(Debug, Serialize, Deserialize)]
pub struct ReasoningTree {
    nodes: Vec<OperationNode>,
    n_operations: u64,
}

impl Default for ReasoningTree {
    fn default() -> Self {
        Self::new()
    }
}

impl ReasoningTree {
    pub fn new() -> Self {
        Self {
            nodes: vec![OperationNode::default()],
            n_operations: 0,
        }
    }

    /// Completed (judged) operations so far. Increments once per finalize.
    pub fn n_operations(&self) -> u64 {
        self.n_operations
    }

    pub fn node(&self, id: NodeId) -> &OperationNode {
        &self.nodes[id.0]
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Create an unfinalized node as a pending child candidate of `parent`.
    pub fn propose(&mut self, parent: NodeId, draft: NodeDraft) -> NodeId {
        let id = NodeId(self.nodes.len());
        self.nodes.push(OperationNode {
            thought: draft.thought,
            action: draft.action,
            property: draft.property,
            touched: draft.touched,
            referred: draft.referred,
            parent: Some(parent),
            ..OperationNode::default()
        });
        id
    }

    pub fn set_observation(&mut self, id: NodeId, observation: String) {
        self.nodes[id.0].observation = Some(observation);
    }

    pub fn set_code_change(&mut self, id: NodeId, diff: String) {
        self.nodes[id.0].code_change = diff;
    }

    /// Judge a pending node and count the completed operation.
    ///
    /// Valid nodes extend the chain from their parent (a second accepted
    /// child is a [`ChainConflictError`]) and reset the parent's rejection
    /// counter; invalid nodes join `invalid_ops` and bump it. Either way the
    /// attempt consumed a model call and an execution, so `n_operations`
    /// advances.
    pub fn finalize(
        &mut self,
        id: NodeId,
        valid: bool,
        summary: String,
        lessons: String,
    ) -> Result<(), ChainConflictError> {
        let parent = self.nodes[id.0]
            .parent
            .expect("sentinel root is never finalized");
        if valid && let Some(existing) = self.nodes[parent.0].child {
            return Err(ChainConflictError {
                parent: parent.0,
                existing: existing.0,
            });
        }

        let node = &mut self.nodes[id.0];
        node.valid = Some(valid);
        node.summary = summary;
        node.lessons = lessons;

        let parent_node = &mut self.nodes[parent.0];
        if valid {
            parent_node.child = Some(id);
            parent_node.consecutive_invalid = 0;
        } else {
            parent_node.invalid_ops.push(id);
            parent_node.consecutive_invalid += 1;
        }
        self.n_operations += 1;
        Ok(())
    }

    /// True when `parent` has accumulated exactly `m` consecutive rejections.
    ///
    /// Detection only: resolution is an injected strategy, and proposals
    /// against a dead-ended parent must be withheld by the caller.
    pub fn dead_end(&self, parent: NodeId, m: u32) -> bool {
        m > 0 && self.nodes[parent.0].consecutive_invalid == m
    }

    /// The unique node with no accepted child, following `.child` from root.
    pub fn frontier(&self) -> NodeId {
        let mut id = NodeId::ROOT;
        while let Some(child) = self.nodes[id.0].child {
            id = child;
        }
        id
    }

    /// Accepted chain root to frontier, excluding the sentinel.
    pub fn chain(&self) -> Vec<NodeId> {
        let mut ids = Vec::new();
        let mut id = NodeId::ROOT;
        while let Some(child) = self.nodes[id.0].child {
            ids.push(child);
            id = child;
        }
        ids
    }
}
