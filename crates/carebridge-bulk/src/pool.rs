//! Bounded worker pools executing job bodies.
//!
//! A pool is a FIFO queue of boxed futures drained by a fixed number of
//! tokio tasks. Submission never blocks; when every worker is busy the
//! queue simply backs up. One pool per job kind keeps export load from
//! starving imports and vice versa.

use std::sync::Arc;

use futures_util::future::BoxFuture;
use tokio::sync::{Mutex, mpsc};

/// A unit of work for the pool.
pub type Task = BoxFuture<'static, ()>;

/// Fixed-size pool of async workers fed by an unbounded FIFO queue.
///
/// Must be created inside a tokio runtime. Dropping the pool closes the
/// queue; workers finish their current task and exit.
pub struct WorkerPool {
    name: String,
    sender: mpsc::UnboundedSender<Task>,
}

impl WorkerPool {
    pub fn new(name: impl Into<String>, size: usize) -> Self {
        let name = name.into();
        let (sender, receiver) = mpsc::unbounded_channel::<Task>();
        let receiver = Arc::new(Mutex::new(receiver));

        for worker in 0..size.max(1) {
            let receiver = Arc::clone(&receiver);
            let pool = name.clone();
            tokio::spawn(async move {
                loop {
                    // Hold the receiver lock only while dequeuing, so idle
                    // workers contend for the next task, not for each other.
                    let task = { receiver.lock().await.recv().await };
                    match task {
                        Some(task) => task.await,
                        None => break,
                    }
                }
                tracing::debug!(pool = %pool, worker, "worker pool task exiting");
            });
        }

        Self { name, sender }
    }

    /// Enqueue a task. Never blocks.
    pub fn submit(&self, task: Task) {
        if self.sender.send(task).is_err() {
            tracing::error!(pool = %self.name, "worker pool queue closed, task dropped");
        }
    }
}
