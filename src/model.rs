//! Core data model.
//!
//! A task is a unit of work shared between agent processes. It has identity,
//! an opaque JSON payload, priority, an optional target agent, and a
//! forward-only lifecycle status.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{Error, Result};

/// Priority bounds. Enqueue clamps into this range; 10 is most urgent.
pub const PRIORITY_MIN: i32 = 1;
pub const PRIORITY_MAX: i32 = 10;
pub const PRIORITY_DEFAULT: i32 = 5;

// ---------------------------------------------------------------------------
// Task
// ---------------------------------------------------------------------------

/// A unit of work tracked by the queue.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    /// Unique identifier. Never reused.
    pub id: TaskId,

    /// What kind of task this is (e.g., "debug", "consensus"). Opaque to the
    /// queue; used only for filtering and statistics grouping.
    pub task_type: String,

    /// Current lifecycle status.
    pub status: Status,

    /// Target agent. None means shared: any agent may claim it.
    /// Fixed to the winning agent once a claim succeeds.
    pub assigned_to: Option<String>,

    /// Priority in [1, 10]. Higher = more urgent.
    pub priority: i32,

    pub created_at: DateTime<Utc>,
    /// Advances on every mutation.
    pub updated_at: DateTime<Utc>,
    /// Set exactly once, on entry into a terminal status.
    pub completed_at: Option<DateTime<Utc>>,

    /// Task parameters. The queue never interprets these.
    pub data: serde_json::Value,

    /// Outcome payload. None until a terminal transition records one.
    pub result: Option<serde_json::Value>,
}

/// Newtype for task IDs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TaskId(pub Uuid);

impl TaskId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl std::fmt::Display for TaskId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // Short display: first 8 chars of UUID
        write!(f, "{}", &self.0.to_string()[..8])
    }
}

impl Default for TaskId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::str::FromStr for TaskId {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        s.parse::<Uuid>()
            .map(TaskId)
            .map_err(|_| Error::Validation(format!("invalid task id: {s}")))
    }
}

// ---------------------------------------------------------------------------
// Status
// ---------------------------------------------------------------------------

/// Lifecycle status of a task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Status {
    /// Enqueued, waiting to be claimed.
    Pending,
    /// Claimed by an agent, being processed.
    Running,
    /// Done successfully. Terminal.
    Completed,
    /// Processing failed. Terminal.
    Failed,
    /// Withdrawn before or during processing. Terminal.
    Cancelled,
}

impl Status {
    /// Can transition from self to `to`?
    ///
    /// Pending -> Running happens only through a claim; all other forward
    /// moves go through `update_status`. Terminal statuses never move.
    pub fn can_transition_to(self, to: Status) -> bool {
        use Status::*;
        matches!(
            (self, to),
            (Pending, Running)
                | (Pending, Cancelled)
                | (Running, Completed)
                | (Running, Failed)
                | (Running, Cancelled)
        )
    }

    /// Is this a terminal status?
    pub fn is_terminal(self) -> bool {
        matches!(self, Status::Completed | Status::Failed | Status::Cancelled)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Status::Pending => "pending",
            Status::Running => "running",
            Status::Completed => "completed",
            Status::Failed => "failed",
            Status::Cancelled => "cancelled",
        }
    }
}

impl std::fmt::Display for Status {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for Status {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "pending" => Ok(Status::Pending),
            "running" => Ok(Status::Running),
            "completed" => Ok(Status::Completed),
            "failed" => Ok(Status::Failed),
            "cancelled" => Ok(Status::Cancelled),
            _ => Err(Error::Validation(format!("unknown status: {s}"))),
        }
    }
}

// ---------------------------------------------------------------------------
// Builder
// ---------------------------------------------------------------------------

/// Builder for enqueueing tasks. The queue's public API for new work.
#[derive(Debug, Clone)]
pub struct NewTask {
    pub(crate) task_type: String,
    pub(crate) data: serde_json::Value,
    pub(crate) assigned_to: Option<String>,
    pub(crate) priority: i32,
}

impl NewTask {
    pub fn new(task_type: impl Into<String>, data: serde_json::Value) -> Self {
        Self {
            task_type: task_type.into(),
            data,
            assigned_to: None,
            priority: PRIORITY_DEFAULT,
        }
    }

    /// Target a specific agent. Only that agent can see and claim the task.
    pub fn assigned_to(mut self, agent_id: impl Into<String>) -> Self {
        self.assigned_to = Some(agent_id.into());
        self
    }

    pub fn priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    /// Reject unusable tasks before anything is persisted.
    pub fn validate(&self) -> Result<()> {
        if self.task_type.trim().is_empty() {
            return Err(Error::Validation("task_type must not be empty".into()));
        }
        let empty = match &self.data {
            serde_json::Value::Null => true,
            serde_json::Value::Object(map) => map.is_empty(),
            _ => false,
        };
        if empty {
            return Err(Error::Validation("data must not be empty".into()));
        }
        Ok(())
    }

    /// Priority forced into [1, 10].
    pub fn clamped_priority(&self) -> i32 {
        self.priority.clamp(PRIORITY_MIN, PRIORITY_MAX)
    }
}

// ---------------------------------------------------------------------------
// Statistics
// ---------------------------------------------------------------------------

/// Count of tasks for one (task_type, status) pair.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TypeStatusCount {
    pub task_type: String,
    pub status: Status,
    pub count: i64,
}

/// Read-only aggregation over the whole queue.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct QueueStats {
    /// Row counts per (task_type, status).
    pub by_type_status: Vec<TypeStatusCount>,

    /// Mean completed_at - created_at in seconds, per task_type, over rows
    /// that have reached a terminal status.
    pub avg_duration_secs: HashMap<String, f64>,

    pub pending: i64,
    pub running: i64,
    pub completed: i64,
    pub failed: i64,

    /// Mean age of pending tasks in seconds.
    pub avg_wait_secs: f64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn terminal_statuses_never_transition() {
        for from in [Status::Completed, Status::Failed, Status::Cancelled] {
            for to in [
                Status::Pending,
                Status::Running,
                Status::Completed,
                Status::Failed,
                Status::Cancelled,
            ] {
                assert!(!from.can_transition_to(to), "{from} -> {to} must be illegal");
            }
        }
    }

    #[test]
    fn status_round_trips_through_str() {
        for status in [
            Status::Pending,
            Status::Running,
            Status::Completed,
            Status::Failed,
            Status::Cancelled,
        ] {
            assert_eq!(status.as_str().parse::<Status>().unwrap(), status);
        }
    }

    #[test]
    fn validate_rejects_empty_task_type_and_data() {
        assert!(NewTask::new("", json!({"x": 1})).validate().is_err());
        assert!(NewTask::new("  ", json!({"x": 1})).validate().is_err());
        assert!(NewTask::new("debug", serde_json::Value::Null).validate().is_err());
        assert!(NewTask::new("debug", json!({})).validate().is_err());
        assert!(NewTask::new("debug", json!({"x": 1})).validate().is_ok());
    }

    #[test]
    fn priority_clamps_to_range() {
        assert_eq!(NewTask::new("t", json!({"x": 1})).priority(42).clamped_priority(), 10);
        assert_eq!(NewTask::new("t", json!({"x": 1})).priority(0).clamped_priority(), 1);
        assert_eq!(NewTask::new("t", json!({"x": 1})).priority(-3).clamped_priority(), 1);
        assert_eq!(NewTask::new("t", json!({"x": 1})).clamped_priority(), 5);
    }
}
