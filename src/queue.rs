//! The queue interface.
//!
//! A narrow surface over the task store: insert, conditional claim, ordered
//! candidate listing, terminal transitions, retention, statistics. Implemented
//! by [`crate::db::Db`] (Postgres) and [`crate::mem::MemQueue`] (in-memory),
//! so the claim/dequeue/lifecycle contracts can be tested without a database.

use crate::error::Result;
use crate::model::{NewTask, QueueStats, Status, Task, TaskId};

/// A persistent, shared task queue.
///
/// All mutations are single-task atomic writes; readers never observe
/// partial state. Contention on `claim` is an expected outcome (`Ok(false)`),
/// never an error. There is no lease on running tasks: a claimant that dies
/// mid-processing leaves its task running until it is cancelled externally.
pub trait TaskQueue: Send + Sync {
    /// Validate and insert a new task as pending.
    ///
    /// `task_type` must be non-empty and `data` non-empty, otherwise
    /// [`crate::Error::Validation`] and nothing is persisted. Priority is
    /// clamped into [1, 10].
    fn enqueue(&self, new: NewTask) -> impl Future<Output = Result<Task>> + Send;

    /// List pending candidates, best first.
    ///
    /// Ordered by `priority DESC, created_at ASC`. With `agent_id` set, only
    /// shared tasks and tasks assigned to that agent are visible; tasks
    /// assigned to another agent never appear. Read-only: two concurrent
    /// callers may see overlapping sets, and only `claim` decides ownership.
    fn dequeue(
        &self,
        agent_id: Option<&str>,
        task_type: Option<&str>,
        limit: i64,
    ) -> impl Future<Output = Result<Vec<Task>>> + Send;

    /// Atomically claim a pending task for `agent_id`.
    ///
    /// Succeeds iff the task is pending and either shared or already assigned
    /// to `agent_id`; the check and the write are one conditional update on
    /// the task row. Exactly one concurrent caller wins. Returns `Ok(false)`
    /// for a missing id, a running or terminal task, or a task assigned to a
    /// different agent.
    fn claim(&self, id: TaskId, agent_id: &str) -> impl Future<Output = Result<bool>> + Send;

    /// Move a task into a terminal status, recording an optional result.
    ///
    /// Valid transitions: running -> completed, running -> failed,
    /// pending|running -> cancelled. Anything else fails with
    /// [`crate::Error::InvalidTransition`] and leaves the task untouched.
    /// Sets `completed_at` on entry into the terminal status.
    fn update_status(
        &self,
        id: TaskId,
        status: Status,
        result: Option<serde_json::Value>,
    ) -> impl Future<Output = Result<Task>> + Send;

    /// Fetch a task by id. [`crate::Error::NotFound`] when absent.
    fn get(&self, id: TaskId) -> impl Future<Output = Result<Task>> + Send;

    /// Cancel a pending or running task. Cooperative: an agent already
    /// processing the task must notice the status change itself.
    fn cancel(&self, id: TaskId) -> impl Future<Output = Result<Task>> + Send {
        async move { self.update_status(id, Status::Cancelled, None).await }
    }

    /// List running tasks, oldest first, optionally for one agent.
    fn list_running(
        &self,
        agent_id: Option<&str>,
    ) -> impl Future<Output = Result<Vec<Task>>> + Send;

    /// Delete terminal tasks whose `completed_at` is older than
    /// `older_than_days`. Pending and running tasks are never deleted,
    /// regardless of age. Returns the number of rows removed.
    fn cleanup(&self, older_than_days: i32) -> impl Future<Output = Result<u64>> + Send;

    /// Read-only aggregation over the whole queue.
    fn stats(&self) -> impl Future<Output = Result<QueueStats>> + Send;
}

/// From-statuses permitted for a terminal transition to `to`.
///
/// Returns `None` when `to` is not a legal `update_status` target (only
/// terminal statuses are; pending and running are reached by enqueue and
/// claim respectively).
pub(crate) fn allowed_from(to: Status) -> Option<&'static [Status]> {
    match to {
        Status::Completed | Status::Failed => Some(&[Status::Running]),
        Status::Cancelled => Some(&[Status::Pending, Status::Running]),
        Status::Pending | Status::Running => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn allowed_from_matches_transition_table() {
        for to in [
            Status::Pending,
            Status::Running,
            Status::Completed,
            Status::Failed,
            Status::Cancelled,
        ] {
            match allowed_from(to) {
                Some(froms) => {
                    for from in froms {
                        assert!(from.can_transition_to(to), "{from} -> {to}");
                    }
                }
                None => assert!(!to.is_terminal()),
            }
        }
    }
}
