//! Job tracking and the bounded polling loop.
//!
//! Every wait in the crate goes through [`poll_until`]: connection
//! readiness, job completion, server-side load completion and namespace
//! teardown. There is no push/notify path.

use std::future::Future;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::store::GraphStore;
use crate::{Error, Result};

/// Opaque job identifier assigned by the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct JobId(pub u64);

impl std::fmt::Display for JobId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Lifecycle state of a job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum JobStatus {
    Queued,
    Running,
    Completed,
    Failed(String),
    Canceled,
}

impl JobStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::Failed(_) | JobStatus::Canceled)
    }
}

/// A job as reported by the store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Job {
    pub id: JobId,
    pub status: JobStatus,
    pub query: String,
    pub submitted_at: DateTime<Utc>,
}

impl Job {
    /// Turn a terminal failure into `Error::JobFailed`; pass anything else through.
    pub fn into_result(self) -> Result<Job> {
        match &self.status {
            JobStatus::Failed(reason) => Err(Error::JobFailed { id: self.id, reason: reason.clone() }),
            JobStatus::Canceled => Err(Error::JobFailed { id: self.id, reason: "canceled".into() }),
            _ => Ok(self),
        }
    }
}

// ============================================================================
// Polling
// ============================================================================

/// Fixed-interval, bounded polling parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollPolicy {
    pub interval: Duration,
    pub max_polls: u32,
}

impl Default for PollPolicy {
    fn default() -> Self {
        Self { interval: Duration::from_secs(1), max_polls: 600 }
    }
}

/// Probe until it yields `Some`, sleeping `policy.interval` between probes.
///
/// A probe error aborts the loop and propagates unchanged. After
/// `policy.max_polls` unsuccessful probes the loop fails with `Error::Timeout`.
pub async fn poll_until<T, F, Fut>(policy: PollPolicy, what: &str, mut probe: F) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<Option<T>>>,
{
    for attempt in 1..=policy.max_polls {
        if let Some(value) = probe().await? {
            return Ok(value);
        }
        if attempt < policy.max_polls {
            tokio::time::sleep(policy.interval).await;
        }
    }
    Err(Error::Timeout { what: what.to_string(), polls: policy.max_polls })
}

/// Block until job `id` reaches a terminal state.
pub async fn wait_for_job<S>(store: &S, id: JobId, policy: PollPolicy) -> Result<Job>
where
    S: GraphStore + ?Sized,
{
    let job = poll_until(policy, "job completion", move || async move {
        let job = store.job(id).await?;
        Ok(job.status.is_terminal().then_some(job))
    })
    .await?;
    tracing::debug!(job = %id, status = ?job.status, "job reached terminal state");
    job.into_result()
}
