//! In-memory queue backend.
//!
//! Same contracts as the Postgres backend, held in a mutex-guarded map.
//! Every operation takes the lock once, which gives the same single-task
//! atomicity a conditional row update gives. Used by the contract tests and
//! as a throwaway backend for local development.

use std::collections::HashMap;

use chrono::Utc;
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::model::{NewTask, QueueStats, Status, Task, TaskId, TypeStatusCount};
use crate::queue::{TaskQueue, allowed_from};

#[derive(Default)]
struct Inner {
    tasks: HashMap<Uuid, Task>,
    /// Insertion order, for deterministic FIFO tie-breaking when
    /// `created_at` timestamps collide.
    order: Vec<Uuid>,
}

/// In-memory [`TaskQueue`].
#[derive(Default)]
pub struct MemQueue {
    inner: Mutex<Inner>,
}

impl MemQueue {
    pub fn new() -> Self {
        Self::default()
    }
}

impl TaskQueue for MemQueue {
    async fn enqueue(&self, new: NewTask) -> Result<Task> {
        new.validate()?;
        let now = Utc::now();
        let task = Task {
            id: TaskId::new(),
            task_type: new.task_type.clone(),
            status: Status::Pending,
            assigned_to: new.assigned_to.clone(),
            priority: new.clamped_priority(),
            created_at: now,
            updated_at: now,
            completed_at: None,
            data: new.data.clone(),
            result: None,
        };

        let mut inner = self.inner.lock().await;
        inner.order.push(task.id.0);
        inner.tasks.insert(task.id.0, task.clone());
        tracing::info!(id = %task.id, task_type = %task.task_type, priority = task.priority, "task enqueued");
        Ok(task)
    }

    async fn dequeue(
        &self,
        agent_id: Option<&str>,
        task_type: Option<&str>,
        limit: i64,
    ) -> Result<Vec<Task>> {
        let inner = self.inner.lock().await;

        // Walk in insertion order so the stable sort below preserves FIFO
        // within a priority level.
        let mut candidates: Vec<Task> = inner
            .order
            .iter()
            .filter_map(|id| inner.tasks.get(id))
            .filter(|t| t.status == Status::Pending)
            .filter(|t| match (agent_id, &t.assigned_to) {
                (_, None) => true,
                (Some(agent), Some(assignee)) => assignee.as_str() == agent,
                (None, Some(_)) => true,
            })
            .filter(|t| task_type.is_none_or(|ty| t.task_type == ty))
            .cloned()
            .collect();

        candidates.sort_by(|a, b| {
            b.priority
                .cmp(&a.priority)
                .then(a.created_at.cmp(&b.created_at))
        });
        candidates.truncate(limit.max(0) as usize);
        Ok(candidates)
    }

    async fn claim(&self, id: TaskId, agent_id: &str) -> Result<bool> {
        let mut inner = self.inner.lock().await;
        let Some(task) = inner.tasks.get_mut(&id.0) else {
            return Ok(false);
        };

        let claimable = task.status == Status::Pending
            && task
                .assigned_to
                .as_deref()
                .is_none_or(|assignee| assignee == agent_id);
        if !claimable {
            tracing::warn!(id = %id, agent = agent_id, "claim lost");
            return Ok(false);
        }

        task.status = Status::Running;
        task.assigned_to = Some(agent_id.to_string());
        task.updated_at = Utc::now();
        tracing::info!(id = %id, agent = agent_id, "task claimed");
        Ok(true)
    }

    async fn update_status(
        &self,
        id: TaskId,
        status: Status,
        result: Option<serde_json::Value>,
    ) -> Result<Task> {
        let mut inner = self.inner.lock().await;
        let task = inner
            .tasks
            .get_mut(&id.0)
            .ok_or_else(|| Error::NotFound(id.to_string()))?;

        let froms = allowed_from(status).ok_or(Error::InvalidTransition {
            from: task.status,
            to: status,
        })?;
        if !froms.contains(&task.status) {
            return Err(Error::InvalidTransition {
                from: task.status,
                to: status,
            });
        }

        let now = Utc::now();
        task.status = status;
        task.result = result;
        task.updated_at = now;
        task.completed_at = Some(now);
        tracing::info!(id = %id, status = %status, "task status updated");
        Ok(task.clone())
    }

    async fn get(&self, id: TaskId) -> Result<Task> {
        let inner = self.inner.lock().await;
        inner
            .tasks
            .get(&id.0)
            .cloned()
            .ok_or_else(|| Error::NotFound(id.to_string()))
    }

    async fn list_running(&self, agent_id: Option<&str>) -> Result<Vec<Task>> {
        let inner = self.inner.lock().await;
        let mut running: Vec<Task> = inner
            .tasks
            .values()
            .filter(|t| t.status == Status::Running)
            .filter(|t| agent_id.is_none_or(|agent| t.assigned_to.as_deref() == Some(agent)))
            .cloned()
            .collect();
        running.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(running)
    }

    async fn cleanup(&self, older_than_days: i32) -> Result<u64> {
        let cutoff = Utc::now() - chrono::Duration::days(older_than_days as i64);
        let mut inner = self.inner.lock().await;

        let doomed: Vec<Uuid> = inner
            .tasks
            .values()
            .filter(|t| t.status.is_terminal())
            .filter(|t| t.completed_at.is_some_and(|done| done < cutoff))
            .map(|t| t.id.0)
            .collect();

        for id in &doomed {
            inner.tasks.remove(id);
        }
        inner.order.retain(|id| !doomed.contains(id));

        tracing::info!(deleted = doomed.len(), older_than_days, "cleaned up old tasks");
        Ok(doomed.len() as u64)
    }

    async fn stats(&self) -> Result<QueueStats> {
        let inner = self.inner.lock().await;
        let now = Utc::now();

        let mut counts: HashMap<(String, Status), i64> = HashMap::new();
        let mut durations: HashMap<String, (f64, i64)> = HashMap::new();
        let mut stats = QueueStats::default();
        let mut wait_sum = 0.0;

        for task in inner.tasks.values() {
            *counts
                .entry((task.task_type.clone(), task.status))
                .or_default() += 1;

            if let Some(done) = task.completed_at {
                let entry = durations.entry(task.task_type.clone()).or_default();
                entry.0 += (done - task.created_at).num_milliseconds() as f64 / 1000.0;
                entry.1 += 1;
            }

            match task.status {
                Status::Pending => {
                    stats.pending += 1;
                    wait_sum += (now - task.created_at).num_milliseconds() as f64 / 1000.0;
                }
                Status::Running => stats.running += 1,
                Status::Completed => stats.completed += 1,
                Status::Failed => stats.failed += 1,
                Status::Cancelled => {}
            }
        }

        stats.by_type_status = counts
            .into_iter()
            .map(|((task_type, status), count)| TypeStatusCount {
                task_type,
                status,
                count,
            })
            .collect();
        stats
            .by_type_status
            .sort_by(|a, b| (&a.task_type, a.status.as_str()).cmp(&(&b.task_type, b.status.as_str())));
        stats.avg_duration_secs = durations
            .into_iter()
            .map(|(ty, (sum, n))| (ty, sum / n as f64))
            .collect();
        if stats.pending > 0 {
            stats.avg_wait_secs = wait_sum / stats.pending as f64;
        }
        Ok(stats)
    }
}
