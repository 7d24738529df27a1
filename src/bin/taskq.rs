//! taskq CLI — operator interface to the shared task queue.

use clap::{Parser, Subcommand};
use secrecy::ExposeSecret;
use taskq::config::Config;
use taskq::db::Db;
use taskq::model::PRIORITY_DEFAULT;
use taskq::{NewTask, Status, Task, TaskId, TaskQueue};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "taskq", about = "Shared persistent task queue for agent processes")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Enqueue a new task
    Enqueue {
        /// Task type tag (e.g. "debug", "consensus")
        task_type: String,
        /// JSON task payload
        #[arg(long)]
        data: String,
        /// Assign the task to one agent; omit for a shared task
        #[arg(long)]
        assign: Option<String>,
        /// Priority 1-10, higher = more urgent
        #[arg(long, default_value_t = PRIORITY_DEFAULT)]
        priority: i32,
    },
    /// List claimable pending tasks, best first
    List {
        /// Agent asking: hides tasks assigned to other agents
        #[arg(long)]
        agent: Option<String>,
        /// Filter by task type
        #[arg(long, name = "type")]
        task_type: Option<String>,
        /// Maximum tasks to show
        #[arg(long, default_value_t = 20)]
        limit: i64,
    },
    /// Claim a pending task for an agent
    Claim {
        id: TaskId,
        agent: String,
    },
    /// Mark a running task completed
    Complete {
        id: TaskId,
        /// JSON result payload
        #[arg(long)]
        result: Option<String>,
    },
    /// Mark a running task failed
    Fail {
        id: TaskId,
        /// JSON result payload (e.g. error details)
        #[arg(long)]
        result: Option<String>,
    },
    /// Cancel a pending or running task
    Cancel { id: TaskId },
    /// Show a task
    Show { id: TaskId },
    /// List running tasks
    Running {
        /// Filter by claiming agent
        #[arg(long)]
        agent: Option<String>,
    },
    /// Show queue statistics
    Stats,
    /// Delete terminal tasks older than N days
    Cleanup {
        #[arg(long, default_value_t = 7)]
        days: i32,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    let config = Config::from_env()?;
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(config.log_level.clone())),
        )
        .init();

    let db = Db::connect(config.database_url.expose_secret()).await?;
    db.migrate().await?;

    match cli.command {
        Command::Enqueue {
            task_type,
            data,
            assign,
            priority,
        } => {
            let data: serde_json::Value = serde_json::from_str(&data)?;
            let mut new = NewTask::new(&task_type, data).priority(priority);
            if let Some(agent) = assign {
                new = new.assigned_to(agent);
            }
            let task = db.enqueue(new).await?;
            println!("Enqueued: {} (status: {})", task.id, task.status);
        }
        Command::List {
            agent,
            task_type,
            limit,
        } => {
            let tasks = db.dequeue(agent.as_deref(), task_type.as_deref(), limit).await?;
            print_tasks(&tasks)?;
        }
        Command::Claim { id, agent } => {
            if db.claim(id, &agent).await? {
                println!("Claimed: {id} by {agent}");
            } else {
                println!("Not claimed: {id} (already claimed, terminal, or assigned elsewhere)");
            }
        }
        Command::Complete { id, result } => {
            let task = db.update_status(id, Status::Completed, parse_result(result)?).await?;
            println!("Completed: {} at {}", task.id, task.completed_at.map_or_else(String::new, |t| t.to_rfc3339()));
        }
        Command::Fail { id, result } => {
            let task = db.update_status(id, Status::Failed, parse_result(result)?).await?;
            println!("Failed: {}", task.id);
        }
        Command::Cancel { id } => {
            let task = db.cancel(id).await?;
            println!("Cancelled: {}", task.id);
        }
        Command::Show { id } => {
            let task = db.get(id).await?;
            println!("{}", serde_json::to_string_pretty(&task)?);
        }
        Command::Running { agent } => {
            let tasks = db.list_running(agent.as_deref()).await?;
            print_tasks(&tasks)?;
        }
        Command::Stats => {
            let stats = db.stats().await?;
            println!("{}", serde_json::to_string_pretty(&stats)?);
        }
        Command::Cleanup { days } => {
            let deleted = db.cleanup(days).await?;
            println!("Deleted {deleted} tasks older than {days} days");
        }
    }

    Ok(())
}

fn parse_result(result: Option<String>) -> anyhow::Result<Option<serde_json::Value>> {
    Ok(match result {
        Some(json) => Some(serde_json::from_str(&json)?),
        None => None,
    })
}

fn print_tasks(tasks: &[Task]) -> anyhow::Result<()> {
    if tasks.is_empty() {
        println!("No tasks");
        return Ok(());
    }
    for task in tasks {
        println!(
            "{}  p{}  {:<9}  {:<12}  {}  {}",
            task.id,
            task.priority,
            task.status,
            task.assigned_to.as_deref().unwrap_or("-"),
            task.task_type,
            task.created_at.to_rfc3339(),
        );
    }
    Ok(())
}
