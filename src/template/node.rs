//! Template graph nodes.
//!
//! Nodes are identified by an immutable [`NodeId`] assigned when they are
//! added to a builder. Equality, hashing and edge storage all use that id, so
//! adding edges never changes how a node compares.

use crate::subtask::Subtask;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::sync::Arc;

/// Arena index of a node within its template
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct NodeId(pub(crate) usize);

impl NodeId {
    pub fn index(self) -> usize {
        self.0
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// How a split node's instances are ordered relative to each other
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SplitMethod {
    /// No ordering between the instances
    Parallel,
    /// Instances run strictly one after another, in sequence order
    Serial,
}

impl fmt::Display for SplitMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Parallel => write!(f, "PARALLEL"),
            Self::Serial => write!(f, "SERIAL"),
        }
    }
}

/// Fan-out over the sequence stored under `key` in the task context
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Split {
    pub key: String,
    pub method: SplitMethod,
}

/// Dependency edge: `to` may only start once `from` has succeeded
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Edge {
    pub from: NodeId,
    pub to: NodeId,
}

#[derive(Clone)]
pub struct Node {
    pub(crate) id: NodeId,
    pub(crate) subtask: Arc<dyn Subtask>,
    pub(crate) split: Option<Split>,
    pub(crate) upstreams: BTreeSet<NodeId>,
    pub(crate) downstreams: BTreeSet<NodeId>,
}

impl Node {
    pub(crate) fn new(id: NodeId, subtask: Arc<dyn Subtask>, split: Option<Split>) -> Self {
        Self {
            id,
            subtask,
            split,
            upstreams: BTreeSet::new(),
            downstreams: BTreeSet::new(),
        }
    }

    pub fn id(&self) -> NodeId {
        self.id
    }

    pub fn subtask(&self) -> &Arc<dyn Subtask> {
        &self.subtask
    }

    pub fn name(&self) -> &str {
        self.subtask.name()
    }

    pub fn split(&self) -> Option<&Split> {
        self.split.as_ref()
    }

    pub fn upstreams(&self) -> impl Iterator<Item = NodeId> + '_ {
        self.upstreams.iter().copied()
    }

    pub fn downstreams(&self) -> impl Iterator<Item = NodeId> + '_ {
        self.downstreams.iter().copied()
    }

    pub fn is_root(&self) -> bool {
        self.upstreams.is_empty()
    }

    pub fn is_leaf(&self) -> bool {
        self.downstreams.is_empty()
    }
}

impl PartialEq for Node {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for Node {}

impl std::hash::Hash for Node {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

impl fmt::Debug for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Node")
            .field("id", &self.id)
            .field("subtask", &self.subtask.name())
            .field("split", &self.split)
            .field("upstreams", &self.upstreams)
            .field("downstreams", &self.downstreams)
            .finish()
    }
}
