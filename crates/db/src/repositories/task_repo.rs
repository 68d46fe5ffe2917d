//! Repository for the `tasks` table.
//!
//! Status transitions use the `TaskStatus` enum from `models::status`;
//! no bare status literals appear in queries.

use sqlx::PgPool;

use modella_core::types::DbId;

use crate::models::status::TaskStatus;
use crate::models::task::{NewTask, Task};

/// Column list for `tasks` queries.
const COLUMNS: &str = "\
    id, project_id, step, status_id, \
    remote_task_id, remote_client_id, \
    input_params, result_url, result_asset_id, \
    progress_percent, error_message, \
    cost_time_secs, consume_money, consume_coins, third_party_cost, \
    created_at, started_at, completed_at";

/// Maximum page size for task listing.
const MAX_LIMIT: i64 = 100;

/// Default page size for task listing.
const DEFAULT_LIMIT: i64 = 50;

/// Provides CRUD operations for remote step tasks.
pub struct TaskRepo;

impl TaskRepo {
    /// Create a new pending task for a step invocation.
    pub async fn create(pool: &PgPool, input: &NewTask) -> Result<Task, sqlx::Error> {
        let query = format!(
            "INSERT INTO tasks (project_id, step, status_id, input_params) \
             VALUES ($1, $2, $3, $4) \
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, Task>(&query)
            .bind(input.project_id)
            .bind(input.step.as_str())
            .bind(TaskStatus::Pending.id())
            .bind(&input.input_params)
            .fetch_one(pool)
            .await
    }

    /// Move a pending task to `Queued` and stamp `started_at`.
    pub async fn begin(pool: &PgPool, id: DbId) -> Result<(), sqlx::Error> {
        sqlx::query("UPDATE tasks SET status_id = $2, started_at = NOW() WHERE id = $1")
            .bind(id)
            .bind(TaskStatus::Queued.id())
            .execute(pool)
            .await?;
        Ok(())
    }

    /// Record a successful remote submission and move to `Running`.
    pub async fn mark_running(
        pool: &PgPool,
        id: DbId,
        remote_task_id: &str,
        remote_client_id: Option<&str>,
    ) -> Result<(), sqlx::Error> {
        sqlx::query(
            "UPDATE tasks \
             SET status_id = $2, remote_task_id = $3, remote_client_id = $4 \
             WHERE id = $1",
        )
        .bind(id)
        .bind(TaskStatus::Running.id())
        .bind(remote_task_id)
        .bind(remote_client_id)
        .execute(pool)
        .await?;
        Ok(())
    }

    /// Update the progress percentage.
    pub async fn update_progress(pool: &PgPool, id: DbId, percent: i16) -> Result<(), sqlx::Error> {
        sqlx::query("UPDATE tasks SET progress_percent = $2 WHERE id = $1")
            .bind(id)
            .bind(percent)
            .execute(pool)
            .await?;
        Ok(())
    }

    /// Mark a task as succeeded with its result references.
    pub async fn complete(
        pool: &PgPool,
        id: DbId,
        result_url: Option<&str>,
        result_asset_id: Option<DbId>,
    ) -> Result<(), sqlx::Error> {
        sqlx::query(
            "UPDATE tasks \
             SET status_id = $2, result_url = $3, result_asset_id = $4, \
                 progress_percent = 100, completed_at = NOW() \
             WHERE id = $1",
        )
        .bind(id)
        .bind(TaskStatus::Succeeded.id())
        .bind(result_url)
        .bind(result_asset_id)
        .execute(pool)
        .await?;
        Ok(())
    }

    /// Mark a task as failed with an error message.
    pub async fn fail(pool: &PgPool, id: DbId, error: &str) -> Result<(), sqlx::Error> {
        sqlx::query(
            "UPDATE tasks \
             SET status_id = $2, error_message = $3, completed_at = NOW() \
             WHERE id = $1",
        )
        .bind(id)
        .bind(TaskStatus::Failed.id())
        .bind(error)
        .execute(pool)
        .await?;
        Ok(())
    }

    /// Record usage metrics reported by the remote API. Safe to call on
    /// terminal tasks; only the usage columns change.
    pub async fn update_usage(
        pool: &PgPool,
        id: DbId,
        cost_time_secs: Option<i32>,
        consume_money: Option<f64>,
        consume_coins: Option<i32>,
        third_party_cost: Option<f64>,
    ) -> Result<(), sqlx::Error> {
        sqlx::query(
            "UPDATE tasks \
             SET cost_time_secs = COALESCE($2, cost_time_secs), \
                 consume_money = COALESCE($3, consume_money), \
                 consume_coins = COALESCE($4, consume_coins), \
                 third_party_cost = COALESCE($5, third_party_cost) \
             WHERE id = $1",
        )
        .bind(id)
        .bind(cost_time_secs)
        .bind(consume_money)
        .bind(consume_coins)
        .bind(third_party_cost)
        .execute(pool)
        .await?;
        Ok(())
    }

    /// Find a task by its ID.
    pub async fn find_by_id(pool: &PgPool, id: DbId) -> Result<Option<Task>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM tasks WHERE id = $1");
        sqlx::query_as::<_, Task>(&query)
            .bind(id)
            .fetch_optional(pool)
            .await
    }

    /// Find the most recent task for a remote task ID (webhook path).
    pub async fn find_by_remote_id(
        pool: &PgPool,
        remote_task_id: &str,
    ) -> Result<Option<Task>, sqlx::Error> {
        let query = format!(
            "SELECT {COLUMNS} FROM tasks \
             WHERE remote_task_id = $1 \
             ORDER BY created_at DESC \
             LIMIT 1"
        );
        sqlx::query_as::<_, Task>(&query)
            .bind(remote_task_id)
            .fetch_optional(pool)
            .await
    }

    /// List a project's tasks, newest first.
    pub async fn list_by_project(
        pool: &PgPool,
        project_id: DbId,
        limit: Option<i64>,
        offset: Option<i64>,
    ) -> Result<Vec<Task>, sqlx::Error> {
        let limit = limit.unwrap_or(DEFAULT_LIMIT).min(MAX_LIMIT);
        let offset = offset.unwrap_or(0);
        let query = format!(
            "SELECT {COLUMNS} FROM tasks \
             WHERE project_id = $1 \
             ORDER BY created_at DESC \
             LIMIT $2 OFFSET $3"
        );
        sqlx::query_as::<_, Task>(&query)
            .bind(project_id)
            .bind(limit)
            .bind(offset)
            .fetch_all(pool)
            .await
    }

    /// Count queued/running tasks for a project. Used as the advisory
    /// pre-check before a pipeline start; the activation CAS on the
    /// project row is the actual guard.
    pub async fn active_count_for_project(
        pool: &PgPool,
        project_id: DbId,
    ) -> Result<i64, sqlx::Error> {
        sqlx::query_scalar::<_, i64>(
            "SELECT COUNT(*) FROM tasks WHERE project_id = $1 AND status_id IN ($2, $3)",
        )
        .bind(project_id)
        .bind(TaskStatus::Queued.id())
        .bind(TaskStatus::Running.id())
        .fetch_one(pool)
        .await
    }
}
