//! # Subtask Registry
//!
//! Resolution of persisted subtask kinds back to live implementations.

pub mod subtask_registry;

pub use subtask_registry::{RegistryStats, SubtaskRegistry};
