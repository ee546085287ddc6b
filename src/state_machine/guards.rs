use crate::error::{Result, TaskEngineError};
use crate::models::{SubtaskState, TaskInstance, TaskState};

/// Precondition checked against a locked entity before an operator mutation
pub trait StateGuard<T> {
    /// `Ok(())` if the mutation may proceed
    fn check(&self, entity: &T) -> Result<()>;

    /// Get a description of this guard for logging
    fn description(&self) -> &'static str;
}

/// Guard requiring the task to be in a given state
pub struct TaskInStateGuard {
    pub expected: TaskState,
}

impl StateGuard<TaskInstance> for TaskInStateGuard {
    fn check(&self, task: &TaskInstance) -> Result<()> {
        if task.state == self.expected {
            Ok(())
        } else {
            Err(TaskEngineError::InvalidTaskState {
                task_id: task.task_id,
                current_state: task.state,
                expected_state: self.expected,
            })
        }
    }

    fn description(&self) -> &'static str {
        "Task must be in the expected state"
    }
}

/// Guard rejecting forward-only requests while the task rolls back
pub struct NotRollingBackGuard {
    pub requested: &'static str,
}

impl StateGuard<TaskInstance> for NotRollingBackGuard {
    fn check(&self, task: &TaskInstance) -> Result<()> {
        if task.is_rolling_back() {
            Err(TaskEngineError::InvalidTaskOperation {
                task_id: task.task_id,
                operation: task.operation,
                requested: self.requested.to_string(),
            })
        } else {
            Ok(())
        }
    }

    fn description(&self) -> &'static str {
        "Task must not be rolling back"
    }
}

/// Guard requiring that no subtask invocation is still live
pub struct NoSubtasksExecutingGuard;

impl StateGuard<TaskInstance> for NoSubtasksExecutingGuard {
    fn check(&self, task: &TaskInstance) -> Result<()> {
        match task.executing_count() {
            0 => Ok(()),
            count => Err(TaskEngineError::SubtasksInFlight {
                task_id: task.task_id,
                count,
            }),
        }
    }

    fn description(&self) -> &'static str {
        "No subtask may be running or canceling"
    }
}

/// Guard enforcing both rollback prohibitions: the task-wide context flag and
/// the per-subtask flag of anything that has already been executed
pub struct RollbackAllowedGuard;

impl StateGuard<TaskInstance> for RollbackAllowedGuard {
    fn check(&self, task: &TaskInstance) -> Result<()> {
        if task.context.prohibit_rollback() {
            return Err(TaskEngineError::RollbackProhibited {
                task_id: task.task_id,
                reason: "task context prohibits rollback".to_string(),
            });
        }

        if let Some(subtask) = task
            .subtasks
            .iter()
            .find(|s| s.has_run() && s.prohibit_rollback)
        {
            return Err(TaskEngineError::RollbackProhibited {
                task_id: task.task_id,
                reason: format!(
                    "subtask {} '{}' has run and prohibits rollback",
                    subtask.subtask_id, subtask.name
                ),
            });
        }

        Ok(())
    }

    fn description(&self) -> &'static str {
        "Task and every executed subtask must allow rollback"
    }
}

/// Guard requiring one subtask of the task to be in a given state
pub struct SubtaskInStateGuard {
    pub subtask_id: i64,
    pub expected: SubtaskState,
}

impl StateGuard<TaskInstance> for SubtaskInStateGuard {
    fn check(&self, task: &TaskInstance) -> Result<()> {
        let subtask = task
            .subtask(self.subtask_id)
            .ok_or(TaskEngineError::SubtaskNotFound(self.subtask_id))?;

        if subtask.state == self.expected {
            Ok(())
        } else {
            Err(TaskEngineError::InvalidSubtaskState {
                subtask_id: self.subtask_id,
                current_state: subtask.state,
                expected_state: self.expected,
            })
        }
    }

    fn description(&self) -> &'static str {
        "Subtask must be in the expected state"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::context_keys;
    use crate::context::Context;
    use crate::models::{SubtaskInstance, SubtaskOperation, TaskOperation};
    use chrono::Utc;

    fn subtask(id: i64, state: SubtaskState, run_count: u32, prohibit: bool) -> SubtaskInstance {
        let now = Utc::now();
        SubtaskInstance {
            subtask_id: id,
            task_id: 1,
            name: format!("s{id}"),
            kind: format!("s{id}"),
            state,
            operation: SubtaskOperation::Execute,
            run_count,
            retry_count: 0,
            timeout_seconds: 5,
            prohibit_rollback: prohibit,
            split_key: None,
            split_value: None,
            manual: false,
            error_message: None,
            upstreams: vec![],
            downstreams: vec![],
            created_at: now,
            updated_at: now,
            started_at: None,
            finished_at: None,
        }
    }

    fn failed_task(subtasks: Vec<SubtaskInstance>) -> TaskInstance {
        let now = Utc::now();
        TaskInstance {
            task_id: 1,
            task_type: "test".to_string(),
            name: "test".to_string(),
            state: TaskState::Failed,
            operation: TaskOperation::Execute,
            creator: "tester".to_string(),
            context: Context::new(),
            created_at: now,
            updated_at: now,
            finished_at: Some(now),
            subtasks,
        }
    }

    #[test]
    fn test_rollback_prohibited_only_by_executed_subtasks() {
        let never_ran = failed_task(vec![
            subtask(1, SubtaskState::Failed, 1, false),
            subtask(2, SubtaskState::Pending, 0, true),
        ]);
        assert!(RollbackAllowedGuard.check(&never_ran).is_ok());

        let ran = failed_task(vec![subtask(1, SubtaskState::Successful, 1, true)]);
        assert!(matches!(
            RollbackAllowedGuard.check(&ran),
            Err(TaskEngineError::RollbackProhibited { task_id: 1, .. })
        ));
    }

    #[test]
    fn test_rollback_prohibited_by_context() {
        let mut task = failed_task(vec![]);
        task.context.put(context_keys::PROHIBIT_ROLLBACK, "true");

        assert!(RollbackAllowedGuard.check(&task).is_err());
    }

    #[test]
    fn test_state_guards() {
        let task = failed_task(vec![subtask(4, SubtaskState::Running, 1, false)]);

        assert!(TaskInStateGuard { expected: TaskState::Failed }.check(&task).is_ok());
        assert!(TaskInStateGuard { expected: TaskState::Running }.check(&task).is_err());
        assert_eq!(
            NoSubtasksExecutingGuard.check(&task),
            Err(TaskEngineError::SubtasksInFlight { task_id: 1, count: 1 })
        );
        assert_eq!(
            SubtaskInStateGuard { subtask_id: 9, expected: SubtaskState::Failed }.check(&task),
            Err(TaskEngineError::SubtaskNotFound(9))
        );
    }
}
