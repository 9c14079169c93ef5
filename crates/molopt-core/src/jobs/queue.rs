//! Background job queue.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, PoisonError, RwLock};
use std::time::Duration;

use chrono::Utc;
use tokio::sync::Semaphore;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::retry::RetryPolicy;
use super::types::{JobId, JobRequest, JobState, JobStatus};
use crate::config::JobsSection;
use crate::error::{CoreError, Result};
use crate::optimizer::MolecularOptimizer;

/// Runs optimization requests in the background.
///
/// At most `workers` jobs run at once. A job that fails with a system fault
/// is retried with exponential backoff; a job that fails because of its
/// input fails immediately. Finished jobs are dropped once they are older
/// than the result TTL.
#[derive(Debug)]
pub struct JobQueue {
    inner: Arc<QueueInner>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
    result_ttl: Duration,
}

/// Default time a finished job stays queryable.
const DEFAULT_RESULT_TTL: Duration = Duration::from_secs(3600);

#[derive(Debug)]
struct QueueInner {
    optimizer: Arc<MolecularOptimizer>,
    permits: Arc<Semaphore>,
    retry: RetryPolicy,
    time_limit: Duration,
    jobs: RwLock<HashMap<JobId, JobStatus>>,
    cancellation_tokens: RwLock<HashMap<JobId, CancellationToken>>,
    /// Finished jobs in the order they finished.
    retired: Mutex<VecDeque<(Instant, JobId)>>,
    root_token: CancellationToken,
}

/// Why an attempt stopped without a result.
enum AttemptError {
    Cancelled,
    Failed(CoreError),
}

impl JobQueue {
    /// Creates a queue running jobs on `optimizer`.
    pub fn new(optimizer: Arc<MolecularOptimizer>, section: &JobsSection) -> Self {
        Self::with_policy(optimizer, section.workers, section.retry_policy(), section.time_limit())
            .with_result_ttl(section.result_ttl())
    }

    /// Creates a queue with explicit limits.
    pub fn with_policy(
        optimizer: Arc<MolecularOptimizer>,
        workers: usize,
        retry: RetryPolicy,
        time_limit: Duration,
    ) -> Self {
        Self {
            inner: Arc::new(QueueInner {
                optimizer,
                permits: Arc::new(Semaphore::new(workers.max(1))),
                retry,
                time_limit,
                jobs: RwLock::new(HashMap::new()),
                cancellation_tokens: RwLock::new(HashMap::new()),
                retired: Mutex::new(VecDeque::new()),
                root_token: CancellationToken::new(),
            }),
            tasks: Mutex::new(Vec::new()),
            result_ttl: DEFAULT_RESULT_TTL,
        }
    }

    /// Sets how long finished jobs stay queryable.
    #[must_use]
    pub fn with_result_ttl(mut self, ttl: Duration) -> Self {
        self.result_ttl = ttl;
        self
    }

    /// Queues a request and returns its id.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn submit(&self, request: JobRequest) -> JobId {
        self.purge_finished();
        let id = JobId::new();
        let token = self.inner.root_token.child_token();

        self.inner.jobs_write().insert(id, JobStatus::queued(id));
        self.inner.tokens_write().insert(id, token.clone());
        info!(job_id = %id, kind = request.kind(), "Job submitted");

        let inner = Arc::clone(&self.inner);
        let handle = tokio::spawn(async move { inner.run(id, request, token).await });

        let mut tasks = self.tasks.lock().unwrap_or_else(PoisonError::into_inner);
        tasks.retain(|task| !task.is_finished());
        tasks.push(handle);
        id
    }

    /// Current status of a job, or `None` for an unknown or expired id.
    pub fn status(&self, id: JobId) -> Option<JobStatus> {
        self.purge_finished();
        self.inner.jobs_read().get(&id).cloned()
    }

    /// Every known job, oldest first.
    pub fn list(&self) -> Vec<JobStatus> {
        self.purge_finished();
        let mut jobs: Vec<JobStatus> = self.inner.jobs_read().values().cloned().collect();
        jobs.sort_by_key(|status| status.submitted_at);
        jobs
    }

    /// Cancels a queued or running job.
    ///
    /// # Returns
    /// `true` if the job was still outstanding, `false` if it is unknown or
    /// already finished.
    pub fn cancel(&self, id: JobId) -> bool {
        if !self.inner.finish(id, JobState::Cancelled, |status| {
            status.message = "Cancelled".to_string();
        }) {
            return false;
        }
        if let Some(token) = self.inner.tokens_read().get(&id) {
            token.cancel();
        }
        info!(job_id = %id, "Job cancelled");
        true
    }

    /// Jobs not yet finished.
    pub fn outstanding(&self) -> usize {
        self.inner.jobs_read().values().filter(|status| !status.state.is_terminal()).count()
    }

    /// Drops finished jobs older than the result TTL.
    ///
    /// # Returns
    /// Number of jobs dropped.
    pub fn purge_finished(&self) -> usize {
        let now = Instant::now();
        let mut expired = Vec::new();
        {
            let mut retired = self.inner.retired_lock();
            while let Some(&(finished, id)) = retired.front() {
                if now.duration_since(finished) < self.result_ttl {
                    break;
                }
                retired.pop_front();
                expired.push(id);
            }
        }
        if expired.is_empty() {
            return 0;
        }

        let mut jobs = self.inner.jobs_write();
        for id in &expired {
            jobs.remove(id);
        }
        drop(jobs);
        debug!(purged = expired.len(), "Purged finished jobs");
        expired.len()
    }

    /// Cancels every outstanding job and waits for the workers to stop.
    pub async fn shutdown(&self) {
        let ids: Vec<JobId> = self
            .inner
            .jobs_read()
            .iter()
            .filter(|(_, status)| !status.state.is_terminal())
            .map(|(id, _)| *id)
            .collect();
        for id in &ids {
            self.inner.finish(*id, JobState::Cancelled, |status| {
                status.message = "Cancelled by shutdown".to_string();
            });
        }
        self.inner.root_token.cancel();

        let tasks = std::mem::take(&mut *self.tasks.lock().unwrap_or_else(PoisonError::into_inner));
        for task in tasks {
            if let Err(e) = task.await {
                warn!(error = %e, "Job worker ended abnormally");
            }
        }
        info!(cancelled = ids.len(), "Job queue shut down");
    }
}

impl QueueInner {
    async fn run(&self, id: JobId, request: JobRequest, token: CancellationToken) {
        let permits = Arc::clone(&self.permits);
        let _permit = tokio::select! {
            permit = permits.acquire_owned() => match permit {
                Ok(permit) => permit,
                Err(_) => {
                    self.fail(id, "Job queue closed".to_string());
                    return;
                }
            },
            () = token.cancelled() => {
                self.forget(id);
                return;
            }
        };

        if !self.update(id, |status| {
            status.state = JobState::Running;
            status.message = "Started".to_string();
        }) {
            self.forget(id);
            return;
        }

        let mut attempts = 0;
        loop {
            attempts += 1;
            self.update(id, |status| status.attempts = attempts);
            debug!(job_id = %id, attempt = attempts, "Job attempt started");

            match self.attempt(id, &request, &token).await {
                Ok(result) => {
                    self.finish(id, JobState::Completed, |status| {
                        status.progress = 100.0;
                        status.message = "Completed".to_string();
                        status.result = Some(result);
                    });
                    info!(job_id = %id, attempts, "Job completed");
                    break;
                }
                Err(AttemptError::Cancelled) => break,
                Err(AttemptError::Failed(e)) if e.is_user_error() || !self.retry.should_retry(attempts) => {
                    error!(job_id = %id, attempts, error = %e, "Job failed");
                    self.fail(id, e.to_string());
                    break;
                }
                Err(AttemptError::Failed(e)) => {
                    let delay = self.retry.calculate_delay(attempts - 1);
                    warn!(job_id = %id, attempt = attempts, error = %e, delay_ms = delay.as_millis() as u64, "Job attempt failed, retrying");
                    self.update(id, |status| {
                        status.message = format!("Retrying after error: {}", e);
                    });
                    tokio::select! {
                        () = tokio::time::sleep(delay) => {}
                        () = token.cancelled() => break,
                    }
                }
            }
        }
        self.forget(id);
    }

    async fn attempt(
        &self,
        id: JobId,
        request: &JobRequest,
        token: &CancellationToken,
    ) -> std::result::Result<serde_json::Value, AttemptError> {
        tokio::select! {
            outcome = tokio::time::timeout(self.time_limit, self.execute(id, request)) => match outcome {
                Ok(result) => result.map_err(AttemptError::Failed),
                Err(_) => Err(AttemptError::Failed(CoreError::Job(format!(
                    "Attempt exceeded the time limit of {}s",
                    self.time_limit.as_secs()
                )))),
            },
            () = token.cancelled() => Err(AttemptError::Cancelled),
        }
    }

    async fn execute(&self, id: JobId, request: &JobRequest) -> Result<serde_json::Value> {
        let progress = |percent: f64, message: &str| {
            self.update(id, |status| {
                status.progress = percent.clamp(0.0, 100.0);
                status.message = message.to_string();
            });
        };

        let value = match request {
            JobRequest::Single { identifier, model, params } => {
                let report = self
                    .optimizer
                    .optimize_identifier_with_progress(identifier, *model, params, &progress)
                    .await?;
                serde_json::to_value(report)
            }
            JobRequest::Batch { identifiers, model, params } => {
                let report = self
                    .optimizer
                    .batch_optimize_with_progress(identifiers, *model, params, &progress)
                    .await?;
                serde_json::to_value(report)
            }
        };
        value.map_err(|e| CoreError::Job(format!("Failed to serialize result: {}", e)))
    }

    /// Applies `apply` to a job that has not finished. Returns whether it ran.
    fn update(&self, id: JobId, apply: impl FnOnce(&mut JobStatus)) -> bool {
        let mut jobs = self.jobs_write();
        match jobs.get_mut(&id) {
            Some(status) if !status.state.is_terminal() => {
                apply(status);
                true
            }
            _ => false,
        }
    }

    /// Moves an unfinished job into a terminal state. Returns whether it did.
    fn finish(&self, id: JobId, state: JobState, apply: impl FnOnce(&mut JobStatus)) -> bool {
        let finished = self.update(id, |status| {
            apply(status);
            status.state = state;
            status.finished_at = Some(Utc::now());
        });
        if finished {
            self.retired_lock().push_back((Instant::now(), id));
        }
        finished
    }

    fn fail(&self, id: JobId, error: String) {
        self.finish(id, JobState::Failed, |status| {
            status.message = "Failed".to_string();
            status.error = Some(error);
        });
    }

    fn forget(&self, id: JobId) {
        self.tokens_write().remove(&id);
    }

    fn jobs_read(&self) -> std::sync::RwLockReadGuard<'_, HashMap<JobId, JobStatus>> {
        self.jobs.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn jobs_write(&self) -> std::sync::RwLockWriteGuard<'_, HashMap<JobId, JobStatus>> {
        self.jobs.write().unwrap_or_else(PoisonError::into_inner)
    }

    fn retired_lock(&self) -> std::sync::MutexGuard<'_, VecDeque<(Instant, JobId)>> {
        self.retired.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn tokens_read(&self) -> std::sync::RwLockReadGuard<'_, HashMap<JobId, CancellationToken>> {
        self.cancellation_tokens.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn tokens_write(&self) -> std::sync::RwLockWriteGuard<'_, HashMap<JobId, CancellationToken>> {
        self.cancellation_tokens.write().unwrap_or_else(PoisonError::into_inner)
    }
}
