//! Background job queue for batch processing.
//!
//! Request handlers [`JobQueue::submit`] a job and return immediately. The
//! dispatcher task pulls jobs off a bounded channel and runs each one on the
//! blocking pool, with a semaphore capping how many run at once. Every job
//! ends with exactly one notification and resolves its [`JobTicket`].
//!
//! Once every [`JobQueue`] is dropped the dispatcher drains what is queued,
//! waits for running jobs, and its task finishes.

use std::sync::Arc;

use serde_json::Value;
use tokio::sync::{Semaphore, mpsc, oneshot};
use tokio::task::{JoinHandle, JoinSet};
use tracing::{debug, error, info, instrument, warn};

use keywordkit_core::{BatchRequest, SilentProgress, TopicClassifier, run_batch};
use keywordkit_shared::{BatchId, KeywordKitError, Result, ServerSettings};
use keywordkit_storage::BatchStore;

use crate::notify::{Destination, Notifier};
use crate::summary::{failure_message, success_message};

/// A unit of work: one pipeline run plus where to report it.
#[derive(Debug, Clone)]
pub struct Job {
    pub request: BatchRequest,
    pub destination: Destination,
}

/// How a job ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobOutcome {
    Completed { batch_id: BatchId },
    Failed { batch_id: BatchId },
}

/// Completion handle for a submitted job.
pub struct JobTicket {
    batch_id: BatchId,
    rx: oneshot::Receiver<JobOutcome>,
}

impl JobTicket {
    pub fn batch_id(&self) -> BatchId {
        self.batch_id
    }

    /// Wait for the job to finish. A job dropped without reporting counts
    /// as failed.
    pub async fn wait(self) -> JobOutcome {
        self.rx.await.unwrap_or(JobOutcome::Failed {
            batch_id: self.batch_id,
        })
    }
}

pub(crate) struct QueuedJob {
    job: Job,
    done: oneshot::Sender<JobOutcome>,
}

/// Cloneable sending side of the job queue.
#[derive(Clone)]
pub struct JobQueue {
    tx: mpsc::Sender<QueuedJob>,
}

impl JobQueue {
    pub(crate) fn bounded(capacity: usize) -> (Self, mpsc::Receiver<QueuedJob>) {
        let (tx, rx) = mpsc::channel(capacity);
        (Self { tx }, rx)
    }

    /// Enqueue `job` without waiting. Fails when the queue is full or the
    /// dispatcher has stopped.
    pub fn submit(&self, job: Job) -> Result<JobTicket> {
        let batch_id = job.request.id;
        let (done, rx) = oneshot::channel();

        self.tx
            .try_send(QueuedJob { job, done })
            .map_err(|e| match e {
                mpsc::error::TrySendError::Full(_) => {
                    KeywordKitError::Queue("job queue is full".into())
                }
                mpsc::error::TrySendError::Closed(_) => {
                    KeywordKitError::Queue("job queue is closed".into())
                }
            })?;

        debug!(%batch_id, "job queued");
        Ok(JobTicket { batch_id, rx })
    }
}

fn log_join(result: std::result::Result<(), tokio::task::JoinError>) {
    if let Err(e) = result {
        error!(error = %e, "job task ended abnormally");
    }
}

/// Shared collaborators every job needs.
#[derive(Clone)]
pub struct Dispatcher {
    pub classifier: Arc<TopicClassifier>,
    pub store: Arc<dyn BatchStore>,
    pub notifier: Arc<dyn Notifier>,
    pub settings: Arc<ServerSettings>,
}

impl Dispatcher {
    /// Start the dispatcher task. It runs until every [`JobQueue`] clone is
    /// dropped, the queue has drained, and every running job has finished.
    pub fn spawn(self, capacity: usize, workers: usize) -> (JobQueue, JoinHandle<()>) {
        let (queue, mut rx) = JobQueue::bounded(capacity);
        let limit = Arc::new(Semaphore::new(workers));

        let handle = tokio::spawn(async move {
            let mut running = JoinSet::new();
            while let Some(QueuedJob { job, done }) = rx.recv().await {
                while let Some(finished) = running.try_join_next() {
                    log_join(finished);
                }
                let Ok(permit) = Arc::clone(&limit).acquire_owned().await else {
                    break;
                };
                let dispatcher = self.clone();
                running.spawn(async move {
                    let outcome = dispatcher.process(job).await;
                    drop(permit);
                    let _ = done.send(outcome);
                });
            }
            debug!(running = running.len(), "job queue closed, waiting for running jobs");
            while let Some(finished) = running.join_next().await {
                log_join(finished);
            }
            debug!("dispatcher exiting");
        });

        (queue, handle)
    }

    /// Run one job to completion and notify the requester.
    #[instrument(skip_all, fields(batch_id = %job.request.id))]
    pub async fn process(&self, job: Job) -> JobOutcome {
        let batch_id = job.request.id;
        let classifier = Arc::clone(&self.classifier);
        let request = job.request;

        let result =
            tokio::task::spawn_blocking(move || run_batch(&request, &classifier, &SilentProgress))
                .await;

        let record = match result {
            Ok(Ok(record)) => record,
            Ok(Err(e)) => {
                error!(error = %e, "batch pipeline failed");
                self.send(&job.destination, &failure_message()).await;
                return JobOutcome::Failed { batch_id };
            }
            Err(e) => {
                error!(error = %e, "batch pipeline task aborted");
                self.send(&job.destination, &failure_message()).await;
                return JobOutcome::Failed { batch_id };
            }
        };

        let message = success_message(&record, &self.settings.download_url(&batch_id));

        if let Err(e) = self.store.put(batch_id, record) {
            error!(error = %e, "failed to store batch record");
            self.send(&job.destination, &failure_message()).await;
            return JobOutcome::Failed { batch_id };
        }

        self.send(&job.destination, &message).await;
        info!("batch completed");
        JobOutcome::Completed { batch_id }
    }

    async fn send(&self, destination: &Destination, message: &Value) {
        if let Err(e) = self.notifier.notify(destination, message).await {
            warn!(error = %e, "failed to notify requester");
        }
    }
}
