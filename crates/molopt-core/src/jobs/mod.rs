//! Asynchronous optimization jobs.
//!
//! The job queue is the second caller of the model cache, next to the
//! synchronous request path. Jobs move through
//! `queued -> running -> completed | failed | cancelled`.

mod queue;
mod retry;
mod types;

pub use queue::JobQueue;
pub use retry::RetryPolicy;
pub use types::{JobId, JobRequest, JobState, JobStatus};
