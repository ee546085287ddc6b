//! End-to-end scheduling scenarios over the in-memory store

mod common;

use common::*;
use ob_task_engine::constants::failure_messages;
use ob_task_engine::{
    Context, SplitMethod, SubtaskInstance, SubtaskOperation, SubtaskState, TaskEngine,
    TaskEngineError, TaskInstance, TaskOperation, TaskState, TemplateBuilder,
};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio_test::{assert_err, assert_ok};

#[tokio::test]
async fn test_failed_middle_subtask_halts_then_retry_completes() {
    let test = test_engine();
    let journal = Journal::new();
    let template = TemplateBuilder::new("a-b-c")
        .and_then(ScriptedSubtask::new("a", &journal).arc())
        .and_then(ScriptedSubtask::new("b", &journal).failing(1).arc())
        .and_then(ScriptedSubtask::new("c", &journal).arc())
        .build();

    let task = assert_ok!(
        test.engine
            .submit_task("test", &template, Context::new(), "tester")
            .await
    );
    assert_eq!(task.state, TaskState::Running);
    assert!(task.subtasks.iter().all(|s| s.state == SubtaskState::Pending));

    let failed = drive_until(&test.engine, task.task_id, is_terminal).await;
    assert_eq!(failed.state, TaskState::Failed);
    assert_eq!(subtask_named(&failed, "a").state, SubtaskState::Successful);
    let b = subtask_named(&failed, "b");
    assert_eq!(b.state, SubtaskState::Failed);
    assert_eq!(b.error_message.as_deref(), Some("b failed"));
    assert_eq!(subtask_named(&failed, "c").state, SubtaskState::Pending);
    assert_eq!(journal.count("start:c"), 0);

    let retried = assert_ok!(test.engine.retry_subtask(b.subtask_id).await);
    assert_eq!(retried.state, SubtaskState::Ready);
    assert_eq!(retried.operation, SubtaskOperation::Retry);

    let done = drive_until(&test.engine, task.task_id, is_terminal).await;
    assert_eq!(done.state, TaskState::Successful);
    assert!(done.subtasks.iter().all(|s| s.state == SubtaskState::Successful));
    assert_eq!(subtask_named(&done, "b").run_count, 2);
    // retry undoes the failed attempt before running again
    assert!(journal.position("rollback:b") < journal.position("end:b"));
    assert!(journal.position("end:b") < journal.position("start:c"));
    assert_eq!(done.context.get("c.done"), Some("true"));
}

#[tokio::test]
async fn test_parallel_split_completes_before_downstream() {
    let test = test_engine();
    let journal = Journal::new();
    let template = TemplateBuilder::new("parallel zones")
        .and_then_split(
            ScriptedSubtask::new("zone", &journal)
                .split_on("zone_names")
                .with_delay(Duration::from_millis(20))
                .arc(),
            "zone_names",
            SplitMethod::Parallel,
        )
        .and_then(ScriptedSubtask::new("refresh", &journal).arc())
        .build();
    let context = Context::new().with_list("zone_names", ["z1", "z2", "z3"]);

    let task = assert_ok!(test.engine.submit_task("test", &template, context, "tester").await);
    let zones: Vec<_> = task.subtasks.iter().filter(|s| s.name == "zone").collect();
    assert_eq!(zones.len(), 3);
    assert!(zones.iter().all(|z| z.upstreams.is_empty()));
    let refresh = subtask_named(&task, "refresh");
    assert_eq!(refresh.upstreams.len(), 3);

    let done = drive_until(&test.engine, task.task_id, is_terminal).await;
    assert_eq!(done.state, TaskState::Successful);

    let refresh_start = journal.position("start:refresh").unwrap();
    for zone in ["z1", "z2", "z3"] {
        assert!(journal.position(&format!("end:zone:{zone}")).unwrap() < refresh_start);
        assert_eq!(done.context.get(&format!("zone:{zone}.done")), Some("true"));
    }
    // the per-instance element never leaks into the task context
    assert_eq!(done.context.get("zone_names"), None);
}

#[tokio::test]
async fn test_serial_split_runs_one_after_another() {
    let test = test_engine();
    let journal = Journal::new();
    let zone = ScriptedSubtask::new("zone", &journal)
        .split_on("zone_names")
        .with_delay(Duration::from_millis(10))
        .arc();
    let template = TemplateBuilder::new("serial zones")
        .and_then_split(zone.clone(), "zone_names", SplitMethod::Serial)
        .build();
    let context = Context::new().with_list("zone_names", ["z1", "z2", "z3"]);

    let task = assert_ok!(test.engine.submit_task("test", &template, context, "tester").await);
    let ids: Vec<i64> = task.subtasks.iter().map(|s| s.subtask_id).collect();
    assert_eq!(task.subtasks[1].upstreams, vec![ids[0]]);
    assert_eq!(task.subtasks[2].upstreams, vec![ids[1]]);

    let done = drive_until(&test.engine, task.task_id, is_terminal).await;
    assert_eq!(done.state, TaskState::Successful);
    assert_eq!(zone.max_active(), 1);
    assert_eq!(
        journal.entries(),
        vec![
            "start:zone:z1",
            "end:zone:z1",
            "start:zone:z2",
            "end:zone:z2",
            "start:zone:z3",
            "end:zone:z3",
        ]
    );
}

#[tokio::test]
async fn test_concurrency_ceiling_limits_in_flight_subtasks() {
    let mut config = test_config();
    config.coordinator.task_concurrency = 2;
    let test = test_engine_with(config);
    let journal = Journal::new();
    let zone = ScriptedSubtask::new("zone", &journal)
        .with_delay(Duration::from_millis(15))
        .arc();
    let template = TemplateBuilder::new("wide")
        .and_then_split(zone.clone(), "zone_names", SplitMethod::Parallel)
        .build();
    let context = Context::new().with_list("zone_names", ["z1", "z2", "z3", "z4", "z5"]);

    let task = assert_ok!(test.engine.submit_task("test", &template, context, "tester").await);
    let done = drive_until(&test.engine, task.task_id, |t| {
        assert!(t.in_flight_count() <= 2, "ceiling exceeded: {}", t.in_flight_count());
        is_terminal(t)
    })
    .await;

    assert_eq!(done.state, TaskState::Successful);
    assert!(zone.max_active() <= 2);
}

#[tokio::test]
async fn test_cancel_is_only_accepted_while_running() {
    let test = test_engine();
    let journal = Journal::new();
    let template = TemplateBuilder::new("cancel")
        .and_then(ScriptedSubtask::new("first", &journal).arc())
        .and_then(ScriptedSubtask::new("long", &journal).blocking().arc())
        .build();

    let task = assert_ok!(test.engine.submit_task("test", &template, Context::new(), "tester").await);
    let long_id = subtask_named(&task, "long").subtask_id;

    // PENDING: rejected, nothing changes
    let before = assert_ok!(test.engine.get_task_instance(task.task_id).await);
    assert_err!(test.engine.cancel_subtask(long_id).await);
    assert_eq!(assert_ok!(test.engine.get_task_instance(task.task_id).await), before);

    let running = drive_until(&test.engine, task.task_id, |t| {
        subtask_named(t, "long").state == SubtaskState::Running
    })
    .await;
    // SUCCESSFUL: rejected as well
    let first_id = subtask_named(&running, "first").subtask_id;
    assert_err!(test.engine.cancel_subtask(first_id).await);

    let canceling = assert_ok!(test.engine.cancel_subtask(long_id).await);
    assert_eq!(canceling.state, SubtaskState::Canceling);

    let done = drive_until(&test.engine, task.task_id, is_terminal).await;
    let long = subtask_named(&done, "long");
    assert_eq!(done.state, TaskState::Failed);
    assert_eq!(long.state, SubtaskState::Failed);
    assert_eq!(long.operation, SubtaskOperation::Cancel);
    assert_eq!(long.error_message.as_deref(), Some(failure_messages::CANCELED));
}

#[tokio::test]
async fn test_rollback_runs_in_reverse_order() {
    let test = test_engine();
    let journal = Journal::new();
    let template = TemplateBuilder::new("reversible")
        .and_then(ScriptedSubtask::new("a", &journal).arc())
        .and_then(ScriptedSubtask::new("b", &journal).arc())
        .and_then(ScriptedSubtask::new("c", &journal).failing(1).arc())
        .and_then(ScriptedSubtask::new("d", &journal).arc())
        .build();

    let task = assert_ok!(test.engine.submit_task("test", &template, Context::new(), "tester").await);
    let failed = drive_until(&test.engine, task.task_id, is_terminal).await;
    assert_eq!(failed.state, TaskState::Failed);

    let rolling_back = assert_ok!(test.engine.rollback_task(task.task_id).await);
    assert_eq!(rolling_back.operation, TaskOperation::Rollback);
    let ready: Vec<&str> = rolling_back
        .subtasks
        .iter()
        .filter(|s| s.state == SubtaskState::Ready)
        .map(|s| s.name.as_str())
        .collect();
    assert_eq!(ready, vec!["c"]);

    let done = drive_until(&test.engine, task.task_id, is_terminal).await;
    assert_eq!(done.state, TaskState::Successful);
    assert_eq!(done.operation, TaskOperation::Rollback);
    for name in ["a", "b", "c"] {
        assert!(subtask_named(&done, name).is_rolled_back());
    }
    assert_eq!(subtask_named(&done, "d").state, SubtaskState::Pending);

    let rollbacks: Vec<String> = journal
        .entries()
        .into_iter()
        .filter(|e| e.starts_with("rollback:"))
        .collect();
    assert_eq!(rollbacks, vec!["rollback:c", "rollback:b", "rollback:a"]);
}

#[tokio::test]
async fn test_rollback_prohibited_by_executed_subtask() {
    let test = test_engine();
    let journal = Journal::new();
    let template = TemplateBuilder::new("one way")
        .and_then(ScriptedSubtask::new("irreversible", &journal).prohibiting_rollback().arc())
        .and_then(ScriptedSubtask::new("broken", &journal).failing(1).arc())
        .build();

    let task = assert_ok!(test.engine.submit_task("test", &template, Context::new(), "tester").await);
    let failed = drive_until(&test.engine, task.task_id, is_terminal).await;

    let err = assert_err!(test.engine.rollback_task(task.task_id).await);
    assert!(matches!(err, TaskEngineError::RollbackProhibited { .. }));
    assert!(!err.is_retryable());
    assert_eq!(assert_ok!(test.engine.get_task_instance(task.task_id).await), failed);
}

#[tokio::test]
async fn test_template_prohibit_rollback_marks_context() {
    let test = test_engine();
    let journal = Journal::new();
    let template = TemplateBuilder::new("locked")
        .and_then(ScriptedSubtask::new("broken", &journal).failing(1).arc())
        .prohibit_rollback(true)
        .build();

    let task = assert_ok!(test.engine.submit_task("test", &template, Context::new(), "tester").await);
    assert!(task.context.prohibit_rollback());
    drive_until(&test.engine, task.task_id, is_terminal).await;

    let err = assert_err!(test.engine.rollback_task(task.task_id).await);
    assert!(matches!(err, TaskEngineError::RollbackProhibited { .. }));
}

#[tokio::test]
async fn test_retry_task_after_failure() {
    let test = test_engine();
    let journal = Journal::new();
    let template = TemplateBuilder::new("retry")
        .and_then(ScriptedSubtask::new("a", &journal).arc())
        .and_then(ScriptedSubtask::new("b", &journal).failing(1).arc())
        .build();

    let task = assert_ok!(test.engine.submit_task("test", &template, Context::new(), "tester").await);
    drive_until(&test.engine, task.task_id, is_terminal).await;

    let retried = assert_ok!(test.engine.retry_task(task.task_id).await);
    assert_eq!(retried.state, TaskState::Running);
    assert_eq!(retried.operation, TaskOperation::Retry);
    assert_eq!(subtask_named(&retried, "a").state, SubtaskState::Successful);
    assert_eq!(subtask_named(&retried, "b").operation, SubtaskOperation::Retry);

    // a RUNNING task cannot be retried
    assert_err!(test.engine.retry_task(task.task_id).await);

    let done = drive_until(&test.engine, task.task_id, is_terminal).await;
    assert_eq!(done.state, TaskState::Successful);
    assert_eq!(journal.count("start:a"), 1);
}

#[tokio::test]
async fn test_skip_resolves_failed_subtask_without_running_it() {
    let test = test_engine();
    let journal = Journal::new();
    let template = TemplateBuilder::new("skip")
        .and_then(ScriptedSubtask::new("flaky", &journal).failing(5).arc())
        .and_then(ScriptedSubtask::new("after", &journal).arc())
        .build();

    let task = assert_ok!(test.engine.submit_task("test", &template, Context::new(), "tester").await);
    let failed = drive_until(&test.engine, task.task_id, is_terminal).await;
    let flaky_id = subtask_named(&failed, "flaky").subtask_id;

    let skipped = assert_ok!(test.engine.skip_subtask(flaky_id).await);
    assert_eq!(skipped.operation, SubtaskOperation::Skip);
    assert_eq!(skipped.state, SubtaskState::Ready);

    let done = drive_until(&test.engine, task.task_id, is_terminal).await;
    assert_eq!(done.state, TaskState::Successful);
    assert_eq!(subtask_named(&done, "flaky").run_count, 1);
    assert_eq!(journal.count("start:flaky"), 1);
    assert_eq!(journal.count("end:after"), 1);
}

#[tokio::test]
async fn test_automatic_retry_budget() {
    let test = test_engine();
    let journal = Journal::new();
    let template = TemplateBuilder::new("budget")
        .and_then(
            ScriptedSubtask::new("flaky", &journal)
                .failing(1)
                .with_retry_count(1)
                .arc(),
        )
        .build();

    let task = assert_ok!(test.engine.submit_task("test", &template, Context::new(), "tester").await);
    let done = drive_until(&test.engine, task.task_id, is_terminal).await;

    assert_eq!(done.state, TaskState::Successful);
    let flaky = subtask_named(&done, "flaky");
    assert_eq!(flaky.run_count, 2);
    assert_eq!(flaky.operation, SubtaskOperation::Retry);
    assert!(!flaky.manual);
}

#[tokio::test]
async fn test_timeout_fails_subtask() {
    let test = test_engine();
    let journal = Journal::new();
    let template = TemplateBuilder::new("slow")
        .and_then(
            ScriptedSubtask::new("slow", &journal)
                .with_timeout_seconds(1)
                .with_delay(Duration::from_secs(30))
                .arc(),
        )
        .build();

    let task = assert_ok!(test.engine.submit_task("test", &template, Context::new(), "tester").await);
    let done = drive_until(&test.engine, task.task_id, is_terminal).await;

    let slow = subtask_named(&done, "slow");
    assert_eq!(done.state, TaskState::Failed);
    assert_eq!(slow.error_message.as_deref(), Some("timed out after 1s"));
    assert_eq!(test.engine.pending_executions(), 0);
}

#[tokio::test]
async fn test_get_task_instance_is_idempotent() {
    let test = test_engine();
    let journal = Journal::new();
    let template = TemplateBuilder::new("snapshot")
        .and_then(ScriptedSubtask::new("a", &journal).arc())
        .build();

    let task = assert_ok!(
        test.engine
            .submit_task("test", &template, Context::new().with("k", "v"), "tester")
            .await
    );

    let first = serde_json::to_string(&test.engine.get_task_instance(task.task_id).await.unwrap()).unwrap();
    let second = serde_json::to_string(&test.engine.get_task_instance(task.task_id).await.unwrap()).unwrap();
    assert_eq!(first, second);
}

#[tokio::test]
async fn test_hooks_fire_on_terminal_states() {
    let test = test_engine();
    let journal = Journal::new();
    let task_hooks = Arc::new(AtomicUsize::new(0));
    let subtask_hooks = Arc::new(AtomicUsize::new(0));
    {
        let task_hooks = task_hooks.clone();
        test.engine.add_task_hook(Arc::new(move |task: &TaskInstance| {
            assert!(task.state.is_terminal());
            task_hooks.fetch_add(1, Ordering::SeqCst);
        }));
        let subtask_hooks = subtask_hooks.clone();
        test.engine.add_subtask_hook(Arc::new(move |subtask: &SubtaskInstance| {
            assert!(subtask.state.is_terminal());
            subtask_hooks.fetch_add(1, Ordering::SeqCst);
        }));
    }
    let template = TemplateBuilder::new("hooks")
        .and_then(ScriptedSubtask::new("a", &journal).arc())
        .and_then(ScriptedSubtask::new("b", &journal).arc())
        .build();

    let task = assert_ok!(test.engine.submit_task("test", &template, Context::new(), "tester").await);
    drive_until(&test.engine, task.task_id, is_terminal).await;

    assert_eq!(task_hooks.load(Ordering::SeqCst), 1);
    assert_eq!(subtask_hooks.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn test_missing_split_key_is_rejected() {
    let test = test_engine();
    let journal = Journal::new();
    let template = TemplateBuilder::new("split")
        .and_then_split(ScriptedSubtask::new("zone", &journal).arc(), "zone_names", SplitMethod::Parallel)
        .build();

    let err = assert_err!(test.engine.submit_task("test", &template, Context::new(), "tester").await);
    assert!(matches!(err, TaskEngineError::InvalidContext(_)));
    assert!(assert_ok!(test.engine.find_task_instances(TaskState::Running).await).is_empty());
}

#[tokio::test]
async fn test_background_loops_drive_task_to_completion() {
    let test = test_engine();
    let journal = Journal::new();
    let template = TemplateBuilder::new("background")
        .and_then(ScriptedSubtask::new("a", &journal).arc())
        .and_then(ScriptedSubtask::new("b", &journal).arc())
        .build();

    assert_ok!(test.engine.start());
    assert!(test.engine.is_running());
    assert_err!(test.engine.start());

    let task = assert_ok!(test.engine.submit_task("test", &template, Context::new(), "tester").await);
    let done = wait_until(&test.engine, task.task_id, is_terminal).await;
    assert_eq!(done.state, TaskState::Successful);

    test.engine.shutdown().await;
    assert!(!test.engine.is_running());
    assert!(test
        .metrics
        .samples
        .lock()
        .iter()
        .any(|(name, _)| name == "ready_subtask_worker"));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_late_commit_acknowledgement_does_not_lose_dispatch() {
    let engine = assert_ok!(TaskEngine::builder(Arc::new(SlowCommitStore::new(Duration::from_millis(30))))
        .with_config(test_config())
        .build());
    let journal = Journal::new();
    let template = TemplateBuilder::new("slow commit")
        .and_then(
            ScriptedSubtask::new("steady", &journal)
                .with_delay(Duration::from_millis(200))
                .arc(),
        )
        .build();

    assert_ok!(engine.start());
    let task = assert_ok!(engine.submit_task("test", &template, Context::new(), "tester").await);
    let done = wait_until(&engine, task.task_id, is_terminal).await;
    engine.shutdown().await;

    let steady = subtask_named(&done, "steady");
    assert_eq!(done.state, TaskState::Successful);
    assert_eq!(steady.state, SubtaskState::Successful);
    assert_eq!(steady.error_message, None);
    assert_eq!(steady.run_count, 1);
    assert_eq!(journal.count("end:steady"), 1);
    assert_eq!(engine.pending_executions(), 0);
}

#[tokio::test]
async fn test_cancel_reaches_only_the_targeted_split_instance() {
    let test = test_engine();
    let journal = Journal::new();
    let template = TemplateBuilder::new("zones")
        .and_then_split(
            ScriptedSubtask::new("zone", &journal)
                .split_on("zone_names")
                .with_delay(Duration::from_millis(300))
                .arc(),
            "zone_names",
            SplitMethod::Parallel,
        )
        .build();
    let context = Context::new().with_list("zone_names", ["z1", "z2", "z3"]);

    let task = assert_ok!(test.engine.submit_task("test", &template, context, "tester").await);
    let running = drive_until(&test.engine, task.task_id, |t| {
        t.subtasks.iter().all(|s| s.state == SubtaskState::Running)
    })
    .await;
    let z1 = running
        .subtasks
        .iter()
        .find(|s| s.split_value.as_deref() == Some("z1"))
        .expect("z1 instance");
    assert_ok!(test.engine.cancel_subtask(z1.subtask_id).await);

    let done = drive_until(&test.engine, task.task_id, is_terminal).await;
    assert_eq!(done.state, TaskState::Failed);
    for subtask in &done.subtasks {
        match subtask.split_value.as_deref() {
            Some("z1") => {
                assert_eq!(subtask.state, SubtaskState::Failed);
                assert_eq!(subtask.error_message.as_deref(), Some(failure_messages::CANCELED));
            }
            _ => {
                assert_eq!(subtask.state, SubtaskState::Successful);
                assert_eq!(subtask.error_message, None);
            }
        }
    }
    assert_eq!(journal.count("end:zone:z2"), 1);
    assert_eq!(journal.count("end:zone:z3"), 1);
    assert_eq!(journal.count("end:zone:z1"), 0);
}

#[tokio::test]
async fn test_timeout_cancels_only_the_expired_invocation() {
    let test = test_engine();
    let journal = Journal::new();
    // One implementation shared by both tasks
    let template = TemplateBuilder::new("watch")
        .and_then(
            ScriptedSubtask::new("watch", &journal)
                .blocking()
                .with_timeout_seconds(1)
                .arc(),
        )
        .build();

    let first = assert_ok!(test.engine.submit_task("test", &template, Context::new(), "tester").await);
    drive_until(&test.engine, first.task_id, |t| {
        subtask_named(t, "watch").state == SubtaskState::Running
    })
    .await;
    tokio::time::sleep(Duration::from_millis(500)).await;
    let second = assert_ok!(test.engine.submit_task("test", &template, Context::new(), "tester").await);

    let first_done = drive_until(&test.engine, first.task_id, is_terminal).await;
    assert_eq!(
        subtask_named(&first_done, "watch").error_message.as_deref(),
        Some("timed out after 1s")
    );

    // the second invocation kept running until its own deadline
    let second_now = assert_ok!(test.engine.get_task_instance(second.task_id).await);
    assert_eq!(subtask_named(&second_now, "watch").state, SubtaskState::Running);

    let second_done = drive_until(&test.engine, second.task_id, is_terminal).await;
    assert_eq!(
        subtask_named(&second_done, "watch").error_message.as_deref(),
        Some("timed out after 1s")
    );
}

#[tokio::test]
async fn test_manual_pool_is_not_starved_by_automatic_work() {
    let mut config = test_config();
    config.executor.auto_pool_size = 1;
    config.executor.manual_pool_size = 1;
    let test = test_engine_with(config);
    let journal = Journal::new();

    let flaky_template = TemplateBuilder::new("flaky")
        .and_then(ScriptedSubtask::new("flaky", &journal).failing(1).arc())
        .build();
    let flaky_task = assert_ok!(
        test.engine
            .submit_task("test", &flaky_template, Context::new(), "tester")
            .await
    );
    let failed = drive_until(&test.engine, flaky_task.task_id, is_terminal).await;
    assert_eq!(failed.state, TaskState::Failed);

    // occupy the only automatic slot
    let hog_template = TemplateBuilder::new("hog")
        .and_then(ScriptedSubtask::new("hog", &journal).blocking().arc())
        .build();
    let hog_task = assert_ok!(
        test.engine
            .submit_task("test", &hog_template, Context::new(), "tester")
            .await
    );
    drive_until(&test.engine, hog_task.task_id, |t| {
        subtask_named(t, "hog").state == SubtaskState::Running
    })
    .await;

    let flaky_id = subtask_named(&failed, "flaky").subtask_id;
    let retried = assert_ok!(test.engine.retry_subtask(flaky_id).await);
    assert!(retried.manual);

    let done = drive_until(&test.engine, flaky_task.task_id, is_terminal).await;
    assert_eq!(done.state, TaskState::Successful);
    assert_eq!(journal.count("end:flaky"), 1);

    let hog = assert_ok!(test.engine.get_task_instance(hog_task.task_id).await);
    assert_eq!(subtask_named(&hog, "hog").state, SubtaskState::Running);
}

#[tokio::test]
async fn test_same_subtask_name_with_other_implementation_is_rejected() {
    let test = test_engine();
    let first_journal = Journal::new();
    let second_journal = Journal::new();
    let first_template = TemplateBuilder::new("first")
        .and_then(
            ScriptedSubtask::new("step", &first_journal)
                .with_delay(Duration::from_millis(50))
                .arc(),
        )
        .build();
    let second_template = TemplateBuilder::new("second")
        .and_then(ScriptedSubtask::new("step", &second_journal).arc())
        .build();

    let first = assert_ok!(
        test.engine
            .submit_task("test", &first_template, Context::new(), "tester")
            .await
    );
    let err = assert_err!(
        test.engine
            .submit_task("test", &second_template, Context::new(), "tester")
            .await
    );
    assert!(matches!(err, TaskEngineError::ConfigurationError(_)));
    assert_eq!(
        assert_ok!(test.engine.find_task_instances(TaskState::Running).await).len(),
        1
    );

    // resubmitting the same template is fine
    let again = assert_ok!(
        test.engine
            .submit_task("test", &first_template, Context::new(), "tester")
            .await
    );

    for task_id in [first.task_id, again.task_id] {
        let done = drive_until(&test.engine, task_id, is_terminal).await;
        assert_eq!(done.state, TaskState::Successful);
    }
    assert_eq!(first_journal.count("end:step"), 2);
    assert!(second_journal.entries().is_empty());
}
