//! # PostgreSQL Task Store
//!
//! Tasks, subtasks and subtask edges live in three tables created by the
//! migrations under `migrations/`. A [`TaskLock`] is a database transaction
//! that holds `FOR UPDATE` row locks on the task row and every subtask row of
//! the task; committing the lock writes back only the rows that changed.

use super::{TaskLock, TaskStore};
use crate::config::DatabaseConfig;
use crate::context::Context;
use crate::error::{Result, TaskEngineError};
use crate::models::{NewTaskInstance, SubtaskInstance, SubtaskState, TaskInstance, TaskState};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::PgPoolOptions;
use sqlx::types::Json;
use sqlx::{FromRow, PgConnection, PgPool, Postgres, Transaction};
use std::collections::HashMap;
use tracing::{debug, info, instrument};

const TASK_COLUMNS: &str = "task_id, task_type, name, state, operation, creator, context, \
                            created_at, updated_at, finished_at";

const SUBTASK_COLUMNS: &str = "subtask_id, task_id, name, kind, state, operation, run_count, \
                               retry_count, timeout_seconds, prohibit_rollback, split_key, \
                               split_value, manual, error_message, created_at, updated_at, \
                               started_at, finished_at";

#[derive(Debug, FromRow)]
struct TaskRow {
    task_id: i64,
    task_type: String,
    name: String,
    state: String,
    operation: String,
    creator: String,
    context: Json<Context>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    finished_at: Option<DateTime<Utc>>,
}

#[derive(Debug, FromRow)]
struct SubtaskRow {
    subtask_id: i64,
    task_id: i64,
    name: String,
    kind: String,
    state: String,
    operation: String,
    run_count: i32,
    retry_count: i32,
    timeout_seconds: i64,
    prohibit_rollback: bool,
    split_key: Option<String>,
    split_value: Option<String>,
    manual: bool,
    error_message: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    started_at: Option<DateTime<Utc>>,
    finished_at: Option<DateTime<Utc>>,
}

fn corrupt(what: &str, value: String) -> TaskEngineError {
    TaskEngineError::DatabaseError(format!("Invalid {what} in database: {value}"))
}

impl TaskRow {
    fn into_instance(self, subtasks: Vec<SubtaskInstance>) -> Result<TaskInstance> {
        Ok(TaskInstance {
            task_id: self.task_id,
            task_type: self.task_type,
            name: self.name,
            state: self.state.parse().map_err(|e| corrupt("task state", e))?,
            operation: self
                .operation
                .parse()
                .map_err(|e| corrupt("task operation", e))?,
            creator: self.creator,
            context: self.context.0,
            created_at: self.created_at,
            updated_at: self.updated_at,
            finished_at: self.finished_at,
            subtasks,
        })
    }
}

impl SubtaskRow {
    fn into_instance(self) -> Result<SubtaskInstance> {
        Ok(SubtaskInstance {
            subtask_id: self.subtask_id,
            task_id: self.task_id,
            name: self.name,
            kind: self.kind,
            state: self.state.parse().map_err(|e| corrupt("subtask state", e))?,
            operation: self
                .operation
                .parse()
                .map_err(|e| corrupt("subtask operation", e))?,
            run_count: self.run_count.max(0) as u32,
            retry_count: self.retry_count.max(0) as u32,
            timeout_seconds: self.timeout_seconds.max(0) as u64,
            prohibit_rollback: self.prohibit_rollback,
            split_key: self.split_key,
            split_value: self.split_value,
            manual: self.manual,
            error_message: self.error_message,
            upstreams: Vec::new(),
            downstreams: Vec::new(),
            created_at: self.created_at,
            updated_at: self.updated_at,
            started_at: self.started_at,
            finished_at: self.finished_at,
        })
    }
}

/// Task store backed by PostgreSQL
#[derive(Debug, Clone)]
pub struct PgTaskStore {
    pool: PgPool,
}

impl PgTaskStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Open a pool from configuration
    pub async fn connect(config: &DatabaseConfig) -> Result<Self> {
        let url = config.url.as_deref().ok_or_else(|| {
            TaskEngineError::ConfigurationError("database.url is not set".to_string())
        })?;

        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .connect(url)
            .await?;

        info!(max_connections = config.max_connections, "Connected task store");
        Ok(Self { pool })
    }

    /// Apply the bundled schema migrations
    pub async fn migrate(&self) -> Result<()> {
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .map_err(|e| TaskEngineError::DatabaseError(format!("Migration failed: {e}")))
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

async fn load_task(conn: &mut PgConnection, task_id: i64, for_update: bool) -> Result<TaskInstance> {
    let lock_clause = if for_update { " FOR UPDATE" } else { "" };

    let row = sqlx::query_as::<_, TaskRow>(&format!(
        "SELECT {TASK_COLUMNS} FROM ob_task_instance WHERE task_id = $1{lock_clause}"
    ))
    .bind(task_id)
    .fetch_optional(&mut *conn)
    .await?
    .ok_or(TaskEngineError::TaskNotFound(task_id))?;

    let subtask_rows = sqlx::query_as::<_, SubtaskRow>(&format!(
        "SELECT {SUBTASK_COLUMNS} FROM ob_subtask_instance WHERE task_id = $1 \
         ORDER BY subtask_id{lock_clause}"
    ))
    .bind(task_id)
    .fetch_all(&mut *conn)
    .await?;

    let mut subtasks = subtask_rows
        .into_iter()
        .map(SubtaskRow::into_instance)
        .collect::<Result<Vec<_>>>()?;
    attach_links(conn, &mut subtasks).await?;

    row.into_instance(subtasks)
}

/// Fill in upstream and downstream ids from the edge table
async fn attach_links(conn: &mut PgConnection, subtasks: &mut [SubtaskInstance]) -> Result<()> {
    if subtasks.is_empty() {
        return Ok(());
    }

    let ids: Vec<i64> = subtasks.iter().map(|s| s.subtask_id).collect();
    let edges = sqlx::query_as::<_, (i64, i64)>(
        "SELECT from_subtask_id, to_subtask_id FROM ob_subtask_edge \
         WHERE from_subtask_id = ANY($1) OR to_subtask_id = ANY($1) \
         ORDER BY from_subtask_id, to_subtask_id",
    )
    .bind(&ids)
    .fetch_all(&mut *conn)
    .await?;

    let positions: HashMap<i64, usize> = ids.iter().enumerate().map(|(i, id)| (*id, i)).collect();
    for (from, to) in edges {
        if let Some(&i) = positions.get(&from) {
            subtasks[i].downstreams.push(to);
        }
        if let Some(&i) = positions.get(&to) {
            subtasks[i].upstreams.push(from);
        }
    }
    for subtask in subtasks.iter_mut() {
        subtask.upstreams.sort_unstable();
        subtask.downstreams.sort_unstable();
    }

    Ok(())
}

async fn update_task_row(conn: &mut PgConnection, task: &TaskInstance) -> Result<()> {
    sqlx::query(
        "UPDATE ob_task_instance SET state = $2, operation = $3, context = $4, \
         updated_at = $5, finished_at = $6 WHERE task_id = $1",
    )
    .bind(task.task_id)
    .bind(task.state.to_string())
    .bind(task.operation.to_string())
    .bind(Json(&task.context))
    .bind(task.updated_at)
    .bind(task.finished_at)
    .execute(&mut *conn)
    .await?;
    Ok(())
}

async fn update_subtask_row(conn: &mut PgConnection, subtask: &SubtaskInstance) -> Result<()> {
    sqlx::query(
        "UPDATE ob_subtask_instance SET state = $2, operation = $3, run_count = $4, \
         manual = $5, error_message = $6, updated_at = $7, started_at = $8, finished_at = $9 \
         WHERE subtask_id = $1",
    )
    .bind(subtask.subtask_id)
    .bind(subtask.state.to_string())
    .bind(subtask.operation.to_string())
    .bind(subtask.run_count as i32)
    .bind(subtask.manual)
    .bind(&subtask.error_message)
    .bind(subtask.updated_at)
    .bind(subtask.started_at)
    .bind(subtask.finished_at)
    .execute(&mut *conn)
    .await?;
    Ok(())
}

#[async_trait]
impl TaskStore for PgTaskStore {
    #[instrument(skip(self, new_task), fields(task_name = %new_task.name))]
    async fn create_task(&self, new_task: NewTaskInstance) -> Result<TaskInstance> {
        let mut tx = self.pool.begin().await?;

        let (task_id,): (i64,) = sqlx::query_as(
            "INSERT INTO ob_task_instance (task_type, name, state, operation, creator, context) \
             VALUES ($1, $2, $3, $4, $5, $6) RETURNING task_id",
        )
        .bind(&new_task.task_type)
        .bind(&new_task.name)
        .bind(TaskState::Running.to_string())
        .bind(crate::models::TaskOperation::Execute.to_string())
        .bind(&new_task.creator)
        .bind(Json(&new_task.context))
        .fetch_one(&mut *tx)
        .await?;

        let mut ids: Vec<i64> = Vec::with_capacity(new_task.subtasks.len());
        for (idx, subtask) in new_task.subtasks.iter().enumerate() {
            let (subtask_id,): (i64,) = sqlx::query_as(
                "INSERT INTO ob_subtask_instance (task_id, name, kind, state, operation, \
                 retry_count, timeout_seconds, prohibit_rollback, split_key, split_value) \
                 VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10) RETURNING subtask_id",
            )
            .bind(task_id)
            .bind(&subtask.name)
            .bind(&subtask.kind)
            .bind(SubtaskState::Pending.to_string())
            .bind(crate::models::SubtaskOperation::Execute.to_string())
            .bind(subtask.retry_count as i32)
            .bind(subtask.timeout_seconds as i64)
            .bind(subtask.prohibit_rollback)
            .bind(&subtask.split_key)
            .bind(&subtask.split_value)
            .fetch_one(&mut *tx)
            .await?;

            for &upstream in &subtask.upstreams {
                let from = *ids.get(upstream).ok_or_else(|| {
                    TaskEngineError::Internal(format!(
                        "subtask {idx} depends on later subtask {upstream}"
                    ))
                })?;
                sqlx::query(
                    "INSERT INTO ob_subtask_edge (task_id, from_subtask_id, to_subtask_id) \
                     VALUES ($1, $2, $3) ON CONFLICT DO NOTHING",
                )
                .bind(task_id)
                .bind(from)
                .bind(subtask_id)
                .execute(&mut *tx)
                .await?;
            }

            ids.push(subtask_id);
        }

        let task = load_task(&mut *tx, task_id, false).await?;
        tx.commit().await?;

        debug!(task_id, subtask_count = ids.len(), "Created task rows");
        Ok(task)
    }

    async fn get_task(&self, task_id: i64) -> Result<TaskInstance> {
        let mut conn = self.pool.acquire().await?;
        load_task(&mut *conn, task_id, false).await
    }

    async fn get_subtask(&self, subtask_id: i64) -> Result<SubtaskInstance> {
        let mut conn = self.pool.acquire().await?;

        let row = sqlx::query_as::<_, SubtaskRow>(&format!(
            "SELECT {SUBTASK_COLUMNS} FROM ob_subtask_instance WHERE subtask_id = $1"
        ))
        .bind(subtask_id)
        .fetch_optional(&mut *conn)
        .await?
        .ok_or(TaskEngineError::SubtaskNotFound(subtask_id))?;

        let mut subtasks = vec![row.into_instance()?];
        attach_links(&mut *conn, &mut subtasks).await?;
        Ok(subtasks.remove(0))
    }

    async fn find_task_ids_by_state(&self, state: TaskState) -> Result<Vec<i64>> {
        let ids = sqlx::query_scalar::<_, i64>(
            "SELECT task_id FROM ob_task_instance WHERE state = $1 ORDER BY task_id",
        )
        .bind(state.to_string())
        .fetch_all(&self.pool)
        .await?;
        Ok(ids)
    }

    async fn find_subtasks_by_state(&self, state: SubtaskState) -> Result<Vec<SubtaskInstance>> {
        let mut conn = self.pool.acquire().await?;

        let rows = sqlx::query_as::<_, SubtaskRow>(&format!(
            "SELECT {SUBTASK_COLUMNS} FROM ob_subtask_instance WHERE state = $1 \
             ORDER BY subtask_id"
        ))
        .bind(state.to_string())
        .fetch_all(&mut *conn)
        .await?;

        let mut subtasks = rows
            .into_iter()
            .map(SubtaskRow::into_instance)
            .collect::<Result<Vec<_>>>()?;
        attach_links(&mut *conn, &mut subtasks).await?;
        Ok(subtasks)
    }

    async fn lock_task(&self, task_id: i64) -> Result<Box<dyn TaskLock>> {
        let mut tx = self.pool.begin().await?;
        let original = load_task(&mut *tx, task_id, true).await?;
        let working = original.clone();
        Ok(Box::new(PgTaskLock {
            tx,
            original,
            working,
        }))
    }
}

struct PgTaskLock {
    tx: Transaction<'static, Postgres>,
    original: TaskInstance,
    working: TaskInstance,
}

#[async_trait]
impl TaskLock for PgTaskLock {
    fn task(&self) -> &TaskInstance {
        &self.working
    }

    fn task_mut(&mut self) -> &mut TaskInstance {
        &mut self.working
    }

    async fn commit(self: Box<Self>) -> Result<TaskInstance> {
        let PgTaskLock {
            mut tx,
            original,
            working,
        } = *self;

        let task_changed = working.state != original.state
            || working.operation != original.operation
            || working.context != original.context
            || working.finished_at != original.finished_at
            || working.updated_at != original.updated_at;
        if task_changed {
            update_task_row(&mut *tx, &working).await?;
        }

        let mut subtasks_changed = 0usize;
        for (before, after) in original.subtasks.iter().zip(&working.subtasks) {
            if before != after {
                update_subtask_row(&mut *tx, after).await?;
                subtasks_changed += 1;
            }
        }

        tx.commit().await?;

        debug!(
            task_id = working.task_id,
            task_changed, subtasks_changed, "Committed task lock"
        );
        Ok(working)
    }
}
