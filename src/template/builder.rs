//! Template assembly.
//!
//! ```rust
//! use ob_task_engine::template::{SplitMethod, TemplateBuilder};
//! # use ob_task_engine::{context::Context, subtask::{CancellationToken, Subtask}};
//! # use async_trait::async_trait;
//! # use std::sync::Arc;
//! # struct Step(&'static str);
//! # #[async_trait]
//! # impl Subtask for Step {
//! #     fn name(&self) -> &str { self.0 }
//! #     fn timeout_seconds(&self) -> u64 { 60 }
//! #     async fn run(&self, c: Context, _: CancellationToken) -> anyhow::Result<Context> { Ok(c) }
//! #     async fn rollback(&self, c: Context, _: CancellationToken) -> anyhow::Result<Context> { Ok(c) }
//! # }
//! let template = TemplateBuilder::new("add zone replicas")
//!     .and_then(Arc::new(Step("check cluster")))
//!     .and_then_split(Arc::new(Step("add replica")), "zone_names", SplitMethod::Parallel)
//!     .and_then(Arc::new(Step("refresh tenant")))
//!     .build();
//!
//! assert_eq!(template.len(), 3);
//! assert_eq!(template.edges().len(), 2);
//! ```

use super::node::{Edge, Node, NodeId, Split, SplitMethod};
use super::TemplateError;
use crate::subtask::Subtask;
use std::collections::{BTreeSet, VecDeque};
use std::sync::Arc;
use tracing::debug;

/// Immutable DAG of subtasks
#[derive(Debug, Clone)]
pub struct Template {
    name: String,
    nodes: Vec<Node>,
    prohibit_rollback: bool,
}

impl Template {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn nodes(&self) -> &[Node] {
        &self.nodes
    }

    pub fn node(&self, id: NodeId) -> Option<&Node> {
        self.nodes.get(id.0)
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Whether the whole task is declared non-reversible
    pub fn prohibit_rollback(&self) -> bool {
        self.prohibit_rollback
    }

    pub fn roots(&self) -> Vec<NodeId> {
        self.nodes
            .iter()
            .filter(|n| n.is_root())
            .map(Node::id)
            .collect()
    }

    pub fn edges(&self) -> Vec<Edge> {
        self.nodes
            .iter()
            .flat_map(|n| n.downstreams().map(move |to| Edge { from: n.id, to }))
            .collect()
    }

    /// Node ids in dependency order; ties broken by insertion order
    pub fn topological_order(&self) -> Vec<NodeId> {
        let mut in_degree: Vec<usize> = self.nodes.iter().map(|n| n.upstreams.len()).collect();
        let mut queue: VecDeque<NodeId> = self.roots().into_iter().collect();
        let mut order = Vec::with_capacity(self.nodes.len());

        while let Some(id) = queue.pop_front() {
            order.push(id);
            for next in self.nodes[id.0].downstreams() {
                in_degree[next.0] -= 1;
                if in_degree[next.0] == 0 {
                    queue.push_back(next);
                }
            }
        }

        order
    }
}

#[derive(Debug, Clone)]
pub struct TemplateBuilder {
    name: String,
    nodes: Vec<Node>,
    prohibit_rollback: bool,
}

impl TemplateBuilder {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            nodes: Vec::new(),
            prohibit_rollback: false,
        }
    }

    /// Add an unconnected node
    pub fn add_node(&mut self, subtask: Arc<dyn Subtask>) -> NodeId {
        self.push_node(subtask, None)
    }

    /// Add an unconnected fan-out node over the context sequence `split_key`
    pub fn add_split_node(
        &mut self,
        subtask: Arc<dyn Subtask>,
        split_key: impl Into<String>,
        method: SplitMethod,
    ) -> NodeId {
        self.push_node(
            subtask,
            Some(Split {
                key: split_key.into(),
                method,
            }),
        )
    }

    /// Add a dependency edge. Fails without touching the graph if the edge
    /// would create a cycle.
    pub fn add_edge(&mut self, from: NodeId, to: NodeId) -> Result<&mut Self, TemplateError> {
        self.check_node(from)?;
        self.check_node(to)?;

        if self.nodes[from.0].downstreams.contains(&to) {
            return Ok(self);
        }
        if from == to || self.reaches(to, from) {
            debug!(template = %self.name, %from, %to, "Rejected cyclic edge");
            return Err(TemplateError::CycleDetected {
                from: from.0,
                to: to.0,
            });
        }

        self.link(from, to);
        Ok(self)
    }

    /// Append a node downstream of the previously added one
    pub fn and_then(&mut self, subtask: Arc<dyn Subtask>) -> &mut Self {
        let previous = self.last_node();
        let id = self.add_node(subtask);
        self.chain(previous, id)
    }

    /// Append a fan-out node downstream of the previously added one
    pub fn and_then_split(
        &mut self,
        subtask: Arc<dyn Subtask>,
        split_key: impl Into<String>,
        method: SplitMethod,
    ) -> &mut Self {
        let previous = self.last_node();
        let id = self.add_split_node(subtask, split_key, method);
        self.chain(previous, id)
    }

    /// Mark the task built from this template as non-reversible
    pub fn prohibit_rollback(&mut self, prohibit: bool) -> &mut Self {
        self.prohibit_rollback = prohibit;
        self
    }

    /// The node the next `and_then` call will hang off
    pub fn last_node(&self) -> Option<NodeId> {
        self.nodes.last().map(Node::id)
    }

    pub fn build(&self) -> Template {
        Template {
            name: self.name.clone(),
            nodes: self.nodes.clone(),
            prohibit_rollback: self.prohibit_rollback,
        }
    }

    fn push_node(&mut self, subtask: Arc<dyn Subtask>, split: Option<Split>) -> NodeId {
        let id = NodeId(self.nodes.len());
        self.nodes.push(Node::new(id, subtask, split));
        id
    }

    fn chain(&mut self, previous: Option<NodeId>, id: NodeId) -> &mut Self {
        // A freshly added node has no downstreams, so this edge cannot close a cycle.
        if let Some(previous) = previous {
            self.link(previous, id);
        }
        self
    }

    fn link(&mut self, from: NodeId, to: NodeId) {
        self.nodes[from.0].downstreams.insert(to);
        self.nodes[to.0].upstreams.insert(from);
    }

    fn check_node(&self, id: NodeId) -> Result<(), TemplateError> {
        if id.0 < self.nodes.len() {
            Ok(())
        } else {
            Err(TemplateError::UnknownNode(id.0))
        }
    }

    /// Depth-first search along downstream links
    fn reaches(&self, start: NodeId, target: NodeId) -> bool {
        let mut visited = BTreeSet::new();
        let mut stack = vec![start];

        while let Some(id) = stack.pop() {
            if id == target {
                return true;
            }
            if visited.insert(id) {
                stack.extend(self.nodes[id.0].downstreams());
            }
        }

        false
    }
}
