//! # Task Templates
//!
//! A [`Template`] is the static description of an operation: a directed
//! acyclic graph of [`Node`]s, each wrapping one [`Subtask`](crate::subtask::Subtask).
//! Templates are assembled with a [`TemplateBuilder`], which rejects any edge
//! that would close a cycle before the edge is recorded, and are immutable once
//! built.
//!
//! A node may carry a [`Split`]: at submission time it is materialized into one
//! subtask instance per element of a context sequence, either all runnable at
//! once ([`SplitMethod::Parallel`]) or chained one after another
//! ([`SplitMethod::Serial`]).

pub mod builder;
pub mod node;

pub use builder::{Template, TemplateBuilder};
pub use node::{Edge, Node, NodeId, Split, SplitMethod};

use thiserror::Error;

/// Structural errors raised while assembling a template
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TemplateError {
    #[error("Edge {from} -> {to} would create a cycle")]
    CycleDetected { from: usize, to: usize },

    #[error("Node {0} does not belong to this template")]
    UnknownNode(usize),
}
