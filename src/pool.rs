//! Bounded worker pool for fan-out stages.
//!
//! A stage submits a batch of independent tasks and waits for all of them;
//! returning from [`WorkerPool::run_batch`] is the barrier between stages.
//! Results come back in completion order, not submission order.

use futures::stream::{self, StreamExt};
use std::future::Future;

#[derive(Debug, Clone, Copy)]
pub struct WorkerPool {
    workers: usize,
}

impl WorkerPool {
    /// A pool running at most `workers` tasks at once (minimum 1)
    pub fn new(workers: usize) -> Self {
        Self {
            workers: workers.max(1),
        }
    }

    pub fn workers(&self) -> usize {
        self.workers
    }

    /// Run `task` over every item with at most `workers` in flight, and
    /// resolve once all of them have finished.
    pub async fn run_batch<I, F, Fut>(&self, items: I, task: F) -> Vec<Fut::Output>
    where
        I: IntoIterator,
        F: FnMut(I::Item) -> Fut,
        Fut: Future,
    {
        stream::iter(items.into_iter().map(task))
            .buffer_unordered(self.workers)
            .collect()
            .await
    }
}
