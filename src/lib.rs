//! # taskq
//!
//! Postgres-backed persistent task queue for multi-agent coordination.
//!
//! Many independent agent processes share one backlog of tasks: any of them
//! can enqueue work, list claimable candidates in priority order, and take
//! exclusive ownership of a task through an atomic claim. Tasks survive
//! process restarts; outcomes are recorded on terminal transitions and old
//! terminal rows are purged by retention.
//!
//! Mutual exclusion needs no coordinator: every invariant is enforced by a
//! single conditional row update in the store, so exactly one concurrent
//! claimant wins and nobody blocks.
//!
//! Known gap: there is no lease or heartbeat on running tasks. A claimant
//! that crashes mid-processing leaves its task running until it is cancelled
//! by hand; the queue does not reassign work away from a dead claimant.

pub mod config;
pub mod db;
pub mod error;
pub mod mem;
pub mod model;
pub mod queue;

pub use error::{Error, Result};
pub use model::{NewTask, QueueStats, Status, Task, TaskId};
pub use queue::TaskQueue;
