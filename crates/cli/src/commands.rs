use anyhow::bail;
use clap::Subcommand;
use kx_common::KxConfig;
use kx_locks::{LockManager, PriorityQueue};
use kx_storage::Store;
use std::sync::Arc;
use std::time::Duration;

#[derive(Subcommand)]
pub enum LockCommand {
    /// Acquire a lock, hold it for a while, then release it
    Acquire {
        name: String,

        /// Seconds to keep retrying while the lock is held elsewhere
        #[arg(long)]
        wait: Option<i64>,

        /// Lock lifetime in seconds
        #[arg(long)]
        expire: Option<i64>,

        /// Retry interval in microseconds
        #[arg(long)]
        poll_us: Option<u64>,

        /// Seconds to hold the lock before releasing it
        #[arg(long, default_value = "0")]
        hold_secs: u64,
    },
}

#[derive(Subcommand)]
pub enum QueueCommand {
    /// Add task ids to a queue
    Enqueue {
        name: String,

        #[arg(required = true)]
        ids: Vec<i64>,

        /// Seconds to wait for the queue lock
        #[arg(long, default_value = "5")]
        timeout: i64,

        /// Seconds before the tasks become eligible
        #[arg(long, default_value = "0")]
        delay: i64,
    },

    /// Print the earliest tasks as JSON lines without removing them
    Pop {
        name: String,

        #[arg(long, default_value = "10")]
        count: usize,

        #[arg(long, default_value = "5")]
        timeout: i64,
    },

    /// Acknowledge a task fetched with `pop`
    Dequeue {
        name: String,
        id: i64,
        score: i64,

        #[arg(long, default_value = "5")]
        timeout: i64,
    },
}

pub async fn run_lock(command: LockCommand, store: Arc<dyn Store>, config: &KxConfig) -> anyhow::Result<()> {
    match command {
        LockCommand::Acquire {
            name,
            wait,
            expire,
            poll_us,
            hold_secs,
        } => {
            let mut locks = LockManager::new(store);
            let acquired = locks
                .acquire(
                    &name,
                    wait.unwrap_or(config.lock.wait_timeout_secs),
                    expire.unwrap_or(config.lock.expire_secs),
                    poll_us.unwrap_or(config.lock.poll_interval_micros),
                )
                .await?;
            if !acquired {
                bail!("Lock {} is held elsewhere", name);
            }
            println!("acquired {} until {}", name, locks.expire_at(&name).unwrap_or_default());

            if hold_secs > 0 {
                tokio::time::sleep(Duration::from_secs(hold_secs)).await;
            }
            if !locks.is_held(&name).await? {
                tracing::warn!("Lock {} was lost while held", name);
            }
            locks.release(&name).await?;
            println!("released {}", name);
        }
    }
    Ok(())
}

pub async fn run_queue(command: QueueCommand, store: Arc<dyn Store>, config: &KxConfig) -> anyhow::Result<()> {
    let mut queue = PriorityQueue::new(LockManager::new(store), config.queue.clone());

    match command {
        QueueCommand::Enqueue {
            name,
            ids,
            timeout,
            delay,
        } => {
            let added = queue.enqueue(&name, &ids, timeout, delay).await?;
            println!("enqueued {} of {} ids into {}", added, ids.len(), name);
        }
        QueueCommand::Pop { name, count, timeout } => {
            for entry in queue.pop_batch(&name, count, timeout).await? {
                println!("{}", serde_json::to_string(&entry)?);
            }
        }
        QueueCommand::Dequeue {
            name,
            id,
            score,
            timeout,
        } => {
            if !queue.dequeue(&name, id, score, timeout).await? {
                bail!("Task {} in {} is gone or was re-enqueued (score no longer {})", id, name, score);
            }
            println!("dequeued {} from {}", id, name);
        }
    }
    Ok(())
}
