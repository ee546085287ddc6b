//! # Task Context
//!
//! The argument bag threaded through every subtask of a task. A context holds
//! two ordered namespaces: scalar string values and string sequences. Split
//! nodes read their fan-out sequence from the list namespace; each split
//! instance then sees its own element under the same key in the scalar
//! namespace.
//!
//! The context is persisted with its task, so a restarted process resumes with
//! the values produced by already-finished subtasks.

use crate::constants::context_keys;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Context {
    #[serde(default)]
    values: BTreeMap<String, String>,
    #[serde(default)]
    lists: BTreeMap<String, Vec<String>>,
}

impl Context {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert of a scalar value
    pub fn with(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.put(key, value);
        self
    }

    /// Builder-style insert of a sequence value
    pub fn with_list<I, S>(mut self, key: impl Into<String>, values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.put_list(key, values);
        self
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.values.get(key).map(String::as_str)
    }

    pub fn put(&mut self, key: impl Into<String>, value: impl Into<String>) -> Option<String> {
        self.values.insert(key.into(), value.into())
    }

    pub fn remove(&mut self, key: &str) -> Option<String> {
        self.values.remove(key)
    }

    pub fn get_list(&self, key: &str) -> Option<&[String]> {
        self.lists.get(key).map(Vec::as_slice)
    }

    pub fn put_list<I, S>(&mut self, key: impl Into<String>, values: I) -> Option<Vec<String>>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.lists
            .insert(key.into(), values.into_iter().map(Into::into).collect())
    }

    pub fn remove_list(&mut self, key: &str) -> Option<Vec<String>> {
        self.lists.remove(key)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.values.contains_key(key) || self.lists.contains_key(key)
    }

    pub fn values(&self) -> impl Iterator<Item = (&str, &str)> {
        self.values.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn lists(&self) -> impl Iterator<Item = (&str, &[String])> {
        self.lists.iter().map(|(k, v)| (k.as_str(), v.as_slice()))
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty() && self.lists.is_empty()
    }

    /// Overlay `other` onto this context. Entries present in `other` win;
    /// keys absent from `other` are kept.
    pub fn merge(&mut self, other: Context) {
        self.values.extend(other.values);
        self.lists.extend(other.lists);
    }

    /// Whether the task owning this context forbids rollback as a whole
    pub fn prohibit_rollback(&self) -> bool {
        self.get(context_keys::PROHIBIT_ROLLBACK)
            .is_some_and(|v| v.eq_ignore_ascii_case("true"))
    }

    pub fn set_prohibit_rollback(&mut self, prohibit: bool) {
        self.put(context_keys::PROHIBIT_ROLLBACK, prohibit.to_string());
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }

    pub fn from_json(json: &str) -> serde_json::Result<Self> {
        serde_json::from_str(json)
    }
}
