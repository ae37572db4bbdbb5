//! Background audit workers.
//!
//! A [`WorkerPool`] runs `jobs.workers` tokio tasks that share one channel
//! of audit ids. Each worker takes an id and runs the whole chain for that
//! audit (extraction, analysis, cleanup) before taking the next one, so
//! batches within an audit stay sequential while independent audits run
//! concurrently.

use anyhow::{anyhow, Result};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinSet;
use tracing::{debug, error, info};

use crate::config::JobsConfig;
use crate::pipeline::{AnalysisOrchestrator, AuditOutcome, ExtractionRetry};

const QUEUE_CAPACITY: usize = 256;

impl ExtractionRetry {
    pub fn from_config(config: &JobsConfig) -> Self {
        Self {
            max_attempts: config.max_attempts,
            backoff: Duration::from_secs(config.backoff_secs),
        }
    }
}

/// Cloneable handle for enqueueing audits.
#[derive(Clone)]
pub struct JobQueue {
    sender: mpsc::Sender<String>,
}

impl JobQueue {
    pub fn from_sender(sender: mpsc::Sender<String>) -> Self {
        Self { sender }
    }

    pub async fn enqueue(&self, audit_id: String) -> Result<()> {
        self.sender
            .send(audit_id)
            .await
            .map_err(|_| anyhow!("job queue is closed"))
    }
}

pub struct WorkerPool {
    queue: JobQueue,
    workers: JoinSet<()>,
}

impl WorkerPool {
    pub fn start(orchestrator: Arc<AnalysisOrchestrator>, config: &JobsConfig) -> Self {
        let (sender, receiver) = mpsc::channel(QUEUE_CAPACITY);
        let receiver = Arc::new(Mutex::new(receiver));
        let retry = ExtractionRetry::from_config(config);

        let mut workers = JoinSet::new();
        for worker in 0..config.workers.max(1) {
            let rx = Arc::clone(&receiver);
            let orchestrator = Arc::clone(&orchestrator);
            workers.spawn(async move { run_worker(worker, rx, orchestrator, retry).await });
        }
        info!(workers = config.workers.max(1), "worker pool started");

        Self {
            queue: JobQueue::from_sender(sender),
            workers,
        }
    }

    pub fn queue(&self) -> JobQueue {
        self.queue.clone()
    }

    /// Close the queue and wait for queued audits to finish.
    ///
    /// Handles obtained from [`queue`](Self::queue) keep the channel open
    /// until they are dropped.
    pub async fn shutdown(self) {
        let Self { queue, mut workers } = self;
        drop(queue);
        while let Some(result) = workers.join_next().await {
            if let Err(e) = result {
                error!(error = %e, "audit worker panicked");
            }
        }
    }
}

async fn run_worker(
    worker: usize,
    receiver: Arc<Mutex<mpsc::Receiver<String>>>,
    orchestrator: Arc<AnalysisOrchestrator>,
    retry: ExtractionRetry,
) {
    loop {
        let next = {
            let mut guard = receiver.lock().await;
            guard.recv().await
        };
        let Some(audit_id) = next else {
            debug!(worker, "worker terminating (channel closed)");
            break;
        };

        info!(worker, %audit_id, "worker picked up audit");
        match orchestrator.run_with_retry(&audit_id, retry).await {
            Ok(AuditOutcome::Completed { score, issues }) => {
                info!(worker, %audit_id, score, issues, "audit finished")
            }
            Ok(AuditOutcome::Failed { category }) => {
                info!(worker, %audit_id, category = category.as_str(), "audit finished with failure")
            }
            Err(e) => error!(worker, %audit_id, error = %e, "could not run audit"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retry_budget_from_config() {
        let retry = ExtractionRetry::from_config(&JobsConfig {
            workers: 2,
            max_attempts: 3,
            backoff_secs: 5,
        });
        assert_eq!(retry.max_attempts, 3);
        assert_eq!(retry.backoff, Duration::from_secs(5));
    }
}
