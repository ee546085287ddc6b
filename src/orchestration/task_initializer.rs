//! # Task Initializer
//!
//! Expands a [`Template`] into the subtask rows of a new task.
//!
//! Nodes are visited in topological order. Each node contributes a set of
//! *entry* instances (which depend on the node's upstreams) and *exit*
//! instances (on which the node's downstreams depend):
//!
//! - a plain node materializes one instance, which is both entry and exit;
//! - a PARALLEL split materializes one instance per element of its sequence,
//!   all of them entries and exits;
//! - a SERIAL split chains its instances in sequence order, so only the first
//!   is an entry and only the last is an exit;
//! - a split over an empty sequence materializes nothing, and its downstreams
//!   inherit its upstreams' exits.

use crate::context::Context;
use crate::error::{Result, TaskEngineError};
use crate::models::{NewSubtaskInstance, NewTaskInstance};
use crate::subtask::Subtask;
use crate::template::{Node, SplitMethod, Template};
use tracing::{debug, instrument};

pub struct TaskInitializer;

impl TaskInitializer {
    /// Build the creation request for a task. A template that prohibits
    /// rollback marks the task context accordingly.
    #[instrument(skip(template, context), fields(template = %template.name()))]
    pub fn build_new_task(
        task_type: &str,
        template: &Template,
        mut context: Context,
        creator: &str,
    ) -> Result<NewTaskInstance> {
        if template.prohibit_rollback() {
            context.set_prohibit_rollback(true);
        }

        let subtasks = Self::materialize(template, &context)?;

        debug!(
            template = %template.name(),
            node_count = template.len(),
            subtask_count = subtasks.len(),
            "Materialized template"
        );

        Ok(NewTaskInstance {
            task_type: task_type.to_string(),
            name: template.name().to_string(),
            creator: creator.to_string(),
            context,
            subtasks,
        })
    }

    /// Subtask rows in dependency order; every upstream index points at an
    /// earlier row
    pub fn materialize(template: &Template, context: &Context) -> Result<Vec<NewSubtaskInstance>> {
        let mut subtasks: Vec<NewSubtaskInstance> = Vec::new();
        let mut exits: Vec<Vec<usize>> = vec![Vec::new(); template.len()];

        for id in template.topological_order() {
            let node = template.node(id).ok_or_else(|| {
                TaskEngineError::Internal(format!("template node {id} vanished"))
            })?;

            let mut upstream_exits: Vec<usize> = node
                .upstreams()
                .flat_map(|upstream| exits[upstream.index()].iter().copied())
                .collect();
            upstream_exits.sort_unstable();
            upstream_exits.dedup();

            let node_exits = match node.split() {
                None => {
                    subtasks.push(new_subtask(node, None, upstream_exits));
                    vec![subtasks.len() - 1]
                }
                Some(split) => {
                    let values = context.get_list(&split.key).ok_or_else(|| {
                        TaskEngineError::InvalidContext(format!(
                            "split key '{}' of subtask '{}' is not a sequence in the context",
                            split.key,
                            node.name()
                        ))
                    })?;

                    if values.is_empty() {
                        upstream_exits
                    } else {
                        match split.method {
                            SplitMethod::Parallel => values
                                .iter()
                                .map(|value| {
                                    subtasks.push(new_subtask(
                                        node,
                                        Some(value),
                                        upstream_exits.clone(),
                                    ));
                                    subtasks.len() - 1
                                })
                                .collect(),
                            SplitMethod::Serial => {
                                let mut previous = upstream_exits;
                                for value in values {
                                    subtasks.push(new_subtask(node, Some(value), previous));
                                    previous = vec![subtasks.len() - 1];
                                }
                                previous
                            }
                        }
                    }
                }
            };

            exits[id.index()] = node_exits;
        }

        Ok(subtasks)
    }
}

fn new_subtask(node: &Node, split_value: Option<&String>, upstreams: Vec<usize>) -> NewSubtaskInstance {
    let subtask: &dyn Subtask = node.subtask().as_ref();
    NewSubtaskInstance {
        name: subtask.name().to_string(),
        kind: subtask.kind().to_string(),
        timeout_seconds: subtask.timeout_seconds(),
        retry_count: subtask.retry_count(),
        prohibit_rollback: subtask.prohibit_rollback(),
        split_key: split_value.and(node.split().map(|split| split.key.clone())),
        split_value: split_value.cloned(),
        upstreams,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::subtask::CancellationToken;
    use crate::template::TemplateBuilder;
    use async_trait::async_trait;
    use std::sync::Arc;

    struct Step(&'static str);

    #[async_trait]
    impl Subtask for Step {
        fn name(&self) -> &str {
            self.0
        }

        fn timeout_seconds(&self) -> u64 {
            10
        }

        async fn run(&self, context: Context, _cancel: CancellationToken) -> anyhow::Result<Context> {
            Ok(context)
        }

        async fn rollback(&self, context: Context, _cancel: CancellationToken) -> anyhow::Result<Context> {
            Ok(context)
        }
    }

    fn zones(method: SplitMethod) -> Template {
        TemplateBuilder::new("zones")
            .and_then(Arc::new(Step("prepare")))
            .and_then_split(Arc::new(Step("per zone")), "zone_names", method)
            .and_then(Arc::new(Step("finish")))
            .build()
    }

    #[test]
    fn test_parallel_split_fans_out_and_in() {
        let context = Context::new().with_list("zone_names", ["z1", "z2", "z3"]);
        let subtasks = TaskInitializer::materialize(&zones(SplitMethod::Parallel), &context).unwrap();

        assert_eq!(subtasks.len(), 5);
        for zone in &subtasks[1..4] {
            assert_eq!(zone.upstreams, vec![0]);
            assert_eq!(zone.split_key.as_deref(), Some("zone_names"));
        }
        assert_eq!(subtasks[4].upstreams, vec![1, 2, 3]);
        assert_eq!(subtasks[2].split_value.as_deref(), Some("z2"));
    }

    #[test]
    fn test_serial_split_chains_in_order() {
        let context = Context::new().with_list("zone_names", ["z1", "z2", "z3"]);
        let subtasks = TaskInitializer::materialize(&zones(SplitMethod::Serial), &context).unwrap();

        assert_eq!(subtasks[1].upstreams, vec![0]);
        assert_eq!(subtasks[2].upstreams, vec![1]);
        assert_eq!(subtasks[3].upstreams, vec![2]);
        assert_eq!(subtasks[4].upstreams, vec![3]);
    }

    #[test]
    fn test_empty_split_passes_dependencies_through() {
        let context = Context::new().with_list("zone_names", Vec::<String>::new());
        let subtasks = TaskInitializer::materialize(&zones(SplitMethod::Parallel), &context).unwrap();

        assert_eq!(subtasks.len(), 2);
        assert_eq!(subtasks[1].name, "finish");
        assert_eq!(subtasks[1].upstreams, vec![0]);
    }

    #[test]
    fn test_missing_split_key_is_invalid_context() {
        let context = Context::new().with("zone_names", "z1");
        let err = TaskInitializer::materialize(&zones(SplitMethod::Parallel), &context).unwrap_err();

        assert!(matches!(err, TaskEngineError::InvalidContext(_)));
    }

    #[test]
    fn test_prohibited_template_marks_context() {
        let mut builder = TemplateBuilder::new("drop tenant");
        builder.and_then(Arc::new(Step("drop"))).prohibit_rollback(true);

        let new_task =
            TaskInitializer::build_new_task("tenant", &builder.build(), Context::new(), "admin").unwrap();

        assert!(new_task.context.prohibit_rollback());
        assert_eq!(new_task.name, "drop tenant");
        assert_eq!(new_task.subtasks.len(), 1);
    }
}
