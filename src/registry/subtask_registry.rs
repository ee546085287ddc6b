//! # Subtask Registry
//!
//! Persisted [`SubtaskInstance`](crate::models::SubtaskInstance) rows only
//! remember the *kind* of work they represent. The registry maps each kind to
//! the shared [`Subtask`] implementation that workers invoke.
//!
//! Submitting a template registers all of its subtasks automatically. A
//! process that restarts with tasks still in flight must register its
//! templates (or individual subtasks) again before the coordinators start,
//! otherwise dispatching an unknown kind fails that instance.
//!
//! A kind is bound to one implementation for the life of the registry.
//! Registering a different implementation under a kind that is already taken
//! is rejected, since running tasks would otherwise dispatch foreign code.
//! Give such subtasks distinct [`Subtask::kind`]s.

use crate::error::{Result, TaskEngineError};
use crate::subtask::Subtask;
use crate::template::Template;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, warn};

/// Registry statistics
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegistryStats {
    pub total_subtasks: usize,
    pub kinds: Vec<String>,
}

#[derive(Default)]
pub struct SubtaskRegistry {
    subtasks: RwLock<HashMap<String, Arc<dyn Subtask>>>,
}

impl std::fmt::Debug for SubtaskRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SubtaskRegistry")
            .field("kinds", &self.stats().kinds)
            .finish()
    }
}

impl SubtaskRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register the implementation for its kind. Registering the same
    /// implementation again is a no-op.
    pub fn register(&self, subtask: Arc<dyn Subtask>) -> Result<()> {
        let mut subtasks = self.subtasks.write();
        Self::check_conflict(&subtasks, &subtask)?;
        Self::insert(&mut subtasks, subtask);
        Ok(())
    }

    /// Register every subtask referenced by the template. Nothing is
    /// registered if any node conflicts.
    pub fn register_template(&self, template: &Template) -> Result<()> {
        let mut subtasks = self.subtasks.write();
        let mut staged: HashMap<String, Arc<dyn Subtask>> = HashMap::new();
        for node in template.nodes() {
            let subtask = node.subtask();
            Self::check_conflict(&subtasks, subtask)?;
            Self::check_conflict(&staged, subtask)?;
            staged.insert(subtask.kind().to_string(), subtask.clone());
        }
        for subtask in staged.into_values() {
            Self::insert(&mut subtasks, subtask);
        }
        Ok(())
    }

    fn check_conflict(subtasks: &HashMap<String, Arc<dyn Subtask>>, subtask: &Arc<dyn Subtask>) -> Result<()> {
        match subtasks.get(subtask.kind()) {
            Some(existing) if !Arc::ptr_eq(existing, subtask) => {
                warn!(kind = %subtask.kind(), "Conflicting subtask implementation");
                Err(TaskEngineError::ConfigurationError(format!(
                    "subtask kind '{}' is already registered to a different implementation",
                    subtask.kind()
                )))
            }
            _ => Ok(()),
        }
    }

    fn insert(subtasks: &mut HashMap<String, Arc<dyn Subtask>>, subtask: Arc<dyn Subtask>) {
        let kind = subtask.kind().to_string();
        if subtasks.insert(kind.clone(), subtask).is_none() {
            debug!(kind = %kind, "Registered subtask implementation");
        }
    }

    pub fn get(&self, kind: &str) -> Option<Arc<dyn Subtask>> {
        self.subtasks.read().get(kind).cloned()
    }

    /// Resolve a kind or fail with [`TaskEngineError::SubtaskNotRegistered`]
    pub fn resolve(&self, kind: &str) -> Result<Arc<dyn Subtask>> {
        self.get(kind).ok_or_else(|| {
            warn!(kind = %kind, "No subtask implementation registered");
            TaskEngineError::SubtaskNotRegistered(kind.to_string())
        })
    }

    pub fn contains(&self, kind: &str) -> bool {
        self.subtasks.read().contains_key(kind)
    }

    pub fn stats(&self) -> RegistryStats {
        let subtasks = self.subtasks.read();
        let mut kinds: Vec<String> = subtasks.keys().cloned().collect();
        kinds.sort();
        RegistryStats {
            total_subtasks: kinds.len(),
            kinds,
        }
    }
}
