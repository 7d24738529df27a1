//! Task operations: enqueue, claim, dequeue, lifecycle, retention, stats.
//!
//! Every mutation is a single conditional `UPDATE ... WHERE` (or one
//! `INSERT`/`DELETE`), checked through `rows_affected()`. Mutual exclusion
//! for claims comes entirely from pushing the precondition into the row
//! update Postgres executes atomically. No client-side locks, no multi-row
//! transactions.

use crate::error::{Error, Result};
use crate::model::{NewTask, QueueStats, Status, Task, TaskId, TypeStatusCount};
use crate::queue::{TaskQueue, allowed_from};
use uuid::Uuid;

const TASK_COLUMNS: &str = "id, task_type, status, assigned_to, priority, \
     created_at, updated_at, completed_at, data, result";

impl TaskQueue for super::Db {
    async fn enqueue(&self, new: NewTask) -> Result<Task> {
        new.validate()?;
        let id = Uuid::new_v4();
        let now = chrono::Utc::now();
        let priority = new.clamped_priority();

        let row: TaskRow = sqlx::query_as(
            "INSERT INTO tasks (id, task_type, status, assigned_to, priority, data, created_at, updated_at)
             VALUES ($1, $2, 'pending', $3, $4, $5, $6, $6)
             RETURNING id, task_type, status, assigned_to, priority, created_at, updated_at, completed_at, data, result",
        )
        .bind(id)
        .bind(&new.task_type)
        .bind(&new.assigned_to)
        .bind(priority)
        .bind(&new.data)
        .bind(now)
        .fetch_one(&self.pool)
        .await?;

        tracing::info!(
            id = %TaskId(id),
            task_type = %new.task_type,
            priority,
            assigned_to = new.assigned_to.as_deref(),
            "task enqueued"
        );
        row.try_into_task()
    }

    async fn dequeue(
        &self,
        agent_id: Option<&str>,
        task_type: Option<&str>,
        limit: i64,
    ) -> Result<Vec<Task>> {
        // NULL-tolerant predicates keep this a single prepared statement for
        // every filter combination.
        let rows: Vec<TaskRow> = sqlx::query_as(&format!(
            "SELECT {TASK_COLUMNS} FROM tasks
             WHERE status = 'pending'
             AND ($1::text IS NULL OR assigned_to IS NULL OR assigned_to = $1)
             AND ($2::text IS NULL OR task_type = $2)
             ORDER BY priority DESC, created_at ASC
             LIMIT $3",
        ))
        .bind(agent_id)
        .bind(task_type)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        tracing::debug!(count = rows.len(), agent = agent_id, "dequeued candidates");
        rows.into_iter().map(TaskRow::try_into_task).collect()
    }

    async fn claim(&self, id: TaskId, agent_id: &str) -> Result<bool> {
        let rows_affected = sqlx::query(
            "UPDATE tasks
             SET status = 'running', assigned_to = $2, updated_at = now()
             WHERE id = $1 AND status = 'pending'
             AND (assigned_to IS NULL OR assigned_to = $2)",
        )
        .bind(id.0)
        .bind(agent_id)
        .execute(&self.pool)
        .await?
        .rows_affected();

        if rows_affected == 1 {
            tracing::info!(id = %id, agent = agent_id, "task claimed");
            Ok(true)
        } else {
            // Lost the race, task is terminal, targeted elsewhere, or gone.
            // Expected outcome, not an error.
            tracing::warn!(id = %id, agent = agent_id, "claim lost");
            Ok(false)
        }
    }

    async fn update_status(
        &self,
        id: TaskId,
        status: Status,
        result: Option<serde_json::Value>,
    ) -> Result<Task> {
        let froms: Vec<String> = match allowed_from(status) {
            Some(froms) => froms.iter().map(|s| s.to_string()).collect(),
            None => {
                let current = self.get(id).await?;
                return Err(Error::InvalidTransition {
                    from: current.status,
                    to: status,
                });
            }
        };

        let rows_affected = sqlx::query(
            "UPDATE tasks
             SET status = $2, result = $3, completed_at = now(), updated_at = now()
             WHERE id = $1 AND status = ANY($4)",
        )
        .bind(id.0)
        .bind(status.as_str())
        .bind(&result)
        .bind(&froms)
        .execute(&self.pool)
        .await?
        .rows_affected();

        if rows_affected == 0 {
            // Distinguish a missing task from an illegal transition.
            let current = self.get(id).await?;
            return Err(Error::InvalidTransition {
                from: current.status,
                to: status,
            });
        }

        tracing::info!(id = %id, status = %status, "task status updated");
        self.get(id).await
    }

    async fn get(&self, id: TaskId) -> Result<Task> {
        let row: Option<TaskRow> =
            sqlx::query_as(&format!("SELECT {TASK_COLUMNS} FROM tasks WHERE id = $1"))
                .bind(id.0)
                .fetch_optional(&self.pool)
                .await?;

        row.ok_or_else(|| Error::NotFound(id.to_string()))?.try_into_task()
    }

    async fn list_running(&self, agent_id: Option<&str>) -> Result<Vec<Task>> {
        let rows: Vec<TaskRow> = sqlx::query_as(&format!(
            "SELECT {TASK_COLUMNS} FROM tasks
             WHERE status = 'running'
             AND ($1::text IS NULL OR assigned_to = $1)
             ORDER BY created_at ASC",
        ))
        .bind(agent_id)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(TaskRow::try_into_task).collect()
    }

    async fn cleanup(&self, older_than_days: i32) -> Result<u64> {
        let deleted = sqlx::query(
            "DELETE FROM tasks
             WHERE status IN ('completed', 'failed', 'cancelled')
             AND completed_at < now() - make_interval(days => $1)",
        )
        .bind(older_than_days)
        .execute(&self.pool)
        .await?
        .rows_affected();

        tracing::info!(deleted, older_than_days, "cleaned up old tasks");
        Ok(deleted)
    }

    async fn stats(&self) -> Result<QueueStats> {
        let counts: Vec<(String, String, i64)> = sqlx::query_as(
            "SELECT task_type, status, COUNT(*) FROM tasks
             GROUP BY task_type, status
             ORDER BY task_type, status",
        )
        .fetch_all(&self.pool)
        .await?;

        let durations: Vec<(String, f64)> = sqlx::query_as(
            "SELECT task_type, AVG(EXTRACT(EPOCH FROM (completed_at - created_at)))::float8
             FROM tasks WHERE completed_at IS NOT NULL
             GROUP BY task_type",
        )
        .fetch_all(&self.pool)
        .await?;

        let (avg_wait,): (f64,) = sqlx::query_as(
            "SELECT COALESCE(AVG(EXTRACT(EPOCH FROM (now() - created_at)))::float8, 0)
             FROM tasks WHERE status = 'pending'",
        )
        .fetch_one(&self.pool)
        .await?;

        let mut stats = QueueStats {
            avg_wait_secs: avg_wait,
            avg_duration_secs: durations.into_iter().collect(),
            ..Default::default()
        };
        for (task_type, status, count) in counts {
            let status: Status = status.parse()?;
            match status {
                Status::Pending => stats.pending += count,
                Status::Running => stats.running += count,
                Status::Completed => stats.completed += count,
                Status::Failed => stats.failed += count,
                Status::Cancelled => {}
            }
            stats.by_type_status.push(TypeStatusCount {
                task_type,
                status,
                count,
            });
        }
        Ok(stats)
    }
}

/// Internal row type for sqlx::FromRow.
#[derive(sqlx::FromRow)]
struct TaskRow {
    id: Uuid,
    task_type: String,
    status: String,
    assigned_to: Option<String>,
    priority: i32,
    created_at: chrono::DateTime<chrono::Utc>,
    updated_at: chrono::DateTime<chrono::Utc>,
    completed_at: Option<chrono::DateTime<chrono::Utc>>,
    data: serde_json::Value,
    result: Option<serde_json::Value>,
}

impl TaskRow {
    fn try_into_task(self) -> Result<Task> {
        Ok(Task {
            id: TaskId(self.id),
            task_type: self.task_type,
            status: self.status.parse()?,
            assigned_to: self.assigned_to,
            priority: self.priority,
            created_at: self.created_at,
            updated_at: self.updated_at,
            completed_at: self.completed_at,
            data: self.data,
            result: self.result,
        })
    }
}
