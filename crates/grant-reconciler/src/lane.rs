//! Single-lane task queue.
//!
//! All submissions come from one signing identity and reach the ledger one after the
//! other. A task starts only once the previous one has finished. Any task may stop
//! the lane.

use std::{future::Future, ops::ControlFlow};

use tracing::debug;

/// Executes tasks strictly one at a time.
#[derive(Debug)]
pub struct SingleLane {
    /// Name used in logs.
    name: &'static str,
    /// Tasks started since the lane was created.
    started: usize,
    /// Tasks that ran to their end.
    finished: usize,
}

impl SingleLane {
    /// An empty lane.
    #[must_use]
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            started: 0,
            finished: 0,
        }
    }

    /// Run `task` over `items` in order.
    ///
    /// Returns the break value of the task that stopped the lane, after which no
    /// further item is started, or `None` when every item was processed.
    pub async fn run<T, B, F, Fut>(
        &mut self, items: impl IntoIterator<Item = T>, mut task: F,
    ) -> Option<B>
    where
        F: FnMut(T) -> Fut,
        Fut: Future<Output = ControlFlow<B>>,
    {
        for item in items {
            self.started = self.started.saturating_add(1);
            let seq = self.started;
            debug!(lane = self.name, seq, "Task started");
            let flow = task(item).await;
            self.finished = self.finished.saturating_add(1);
            if let ControlFlow::Break(reason) = flow {
                debug!(lane = self.name, seq, "Lane stopped");
                return Some(reason);
            }
        }
        None
    }

    /// Number of tasks started so far.
    #[must_use]
    pub fn started(&self) -> usize {
        self.started
    }

    /// Number of tasks that ran to their end.
    #[must_use]
    pub fn finished(&self) -> usize {
        self.finished
    }
}
