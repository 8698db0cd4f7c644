// ABOUTME: Fixed-size worker pool for concurrent uploads.
// ABOUTME: A semaphore caps running jobs; errors surface on put() or collect().

use std::fmt;
use std::future::Future;
use std::sync::Arc;
use tokio::sync::{Semaphore, mpsc};
use tokio::task::JoinSet;

/// Runs at most `max_concurrency` jobs at a time.
///
/// Every job error is reported exactly once: either by a later [`put`]
/// call or by [`collect`]. Dropping the queue aborts jobs still running.
///
/// [`put`]: JobQueue::put
/// [`collect`]: JobQueue::collect
pub struct JobQueue<E> {
    slots: Arc<Semaphore>,
    tasks: JoinSet<()>,
    errors_tx: mpsc::UnboundedSender<E>,
    errors_rx: mpsc::UnboundedReceiver<E>,
}

impl<E> fmt::Debug for JobQueue<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("JobQueue")
            .field("available", &self.slots.available_permits())
            .field("in_flight", &self.tasks.len())
            .finish()
    }
}

impl<E: Send + 'static> JobQueue<E> {
    /// Create a queue; a capacity of zero is treated as one.
    pub fn new(max_concurrency: usize) -> Self {
        let (errors_tx, errors_rx) = mpsc::unbounded_channel();
        Self {
            slots: Arc::new(Semaphore::new(max_concurrency.max(1))),
            tasks: JoinSet::new(),
            errors_tx,
            errors_rx,
        }
    }

    /// Wait for a free slot and start `job` in the background.
    ///
    /// Returns the error of a job that finished since the previous call, so
    /// callers can stop scheduling early.
    pub async fn put<F>(&mut self, job: F) -> Result<(), E>
    where
        F: Future<Output = Result<(), E>> + Send + 'static,
    {
        let permit = Arc::clone(&self.slots)
            .acquire_owned()
            .await
            .expect("job queue semaphore is never closed");

        // Reap finished tasks so the join set does not grow unbounded.
        while self.tasks.try_join_next().is_some() {}

        let finished = self.errors_rx.try_recv().ok();

        let errors_tx = self.errors_tx.clone();
        self.tasks.spawn(async move {
            let _permit = permit;
            if let Err(e) = job.await {
                let _ = errors_tx.send(e);
            }
        });

        match finished {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    /// Wait for every job, then join all unreported errors.
    pub async fn collect(mut self) -> Result<(), JobErrors<E>> {
        let mut panicked = 0;
        while let Some(joined) = self.tasks.join_next().await {
            if let Err(e) = joined {
                tracing::error!("job terminated abnormally: {}", e);
                panicked += 1;
            }
        }

        let mut errors = Vec::new();
        while let Ok(e) = self.errors_rx.try_recv() {
            errors.push(e);
        }

        if errors.is_empty() && panicked == 0 {
            Ok(())
        } else {
            Err(JobErrors { errors, panicked })
        }
    }
}

/// Errors collected from every failed job.
#[derive(Debug)]
pub struct JobErrors<E> {
    pub errors: Vec<E>,
    /// Jobs that panicked or were aborted instead of returning.
    pub panicked: usize,
}

impl<E> JobErrors<E> {
    pub fn len(&self) -> usize {
        self.errors.len() + self.panicked
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<E: fmt::Display> fmt::Display for JobErrors<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut lines: Vec<String> = self.errors.iter().map(|e| e.to_string()).collect();
        if self.panicked > 0 {
            lines.push(format!("{} job(s) panicked", self.panicked));
        }
        write!(f, "{}", lines.join("\n"))
    }
}

impl<E: fmt::Debug + fmt::Display> std::error::Error for JobErrors<E> {}
