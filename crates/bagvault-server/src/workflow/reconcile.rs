//! Workflow reconciliation loop
//!
//! A single periodic task that drives every dispatched job to a terminal
//! state. Each pass scans the reconcilable jobs (`Running`, plus `Unknown`
//! from a pass that could not reach the remote service) sequentially, so no
//! two passes ever reconcile the same job concurrently. The loop never
//! raises: every per-job error is caught and logged, and the job is left in
//! a state the next pass will pick up again.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::task::JoinHandle;
use tokio::time::{interval, sleep, MissedTickBehavior};
use tracing::{debug, error, info, instrument, warn};

use crate::error::IngestResult;
use crate::store::{JobStatus, JobStore, WorkflowJob};

use super::client::{ResultTarget, WorkflowClient};

/// Remote state strings with a defined terminal handling.
const REMOTE_SUCCESS: &str = "success";
const REMOTE_FAILED: &str = "failed";

/// Periodic reconciliation of dispatched workflow jobs
pub struct ReconciliationLoop {
    client: WorkflowClient,
    jobs: Arc<dyn JobStore>,
    result_target: ResultTarget,
    interval: Duration,
    first_delay: Duration,
}

impl ReconciliationLoop {
    pub fn new(
        client: WorkflowClient,
        jobs: Arc<dyn JobStore>,
        result_target: ResultTarget,
        interval: Duration,
        first_delay: Duration,
    ) -> Self {
        Self { client, jobs, result_target, interval, first_delay }
    }

    /// Run the loop until the task is aborted.
    pub fn spawn(self) -> JoinHandle<()> {
        tokio::spawn(async move {
            info!(
                interval_secs = self.interval.as_secs(),
                "reconciliation loop started"
            );
            sleep(self.first_delay).await;

            let mut ticker = interval(self.interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                ticker.tick().await;
                if let Err(e) = self.run_once().await {
                    error!(error = %e, "reconciliation pass failed");
                }
            }
        })
    }

    /// One reconciliation pass over all reconcilable jobs, sequentially.
    pub async fn run_once(&self) -> IngestResult<()> {
        let jobs = self.jobs.find_reconcilable().await?;
        if jobs.is_empty() {
            return Ok(());
        }
        debug!(count = jobs.len(), "reconciling jobs");

        for job in jobs {
            let id = job.id;
            if let Err(e) = self.reconcile_job(job).await {
                warn!(job = %id, error = %e, "could not persist reconciliation outcome");
            }
        }
        Ok(())
    }

    /// Reconcile one job against the remote service. Remote-contact errors
    /// mark the job `Unknown` for this cycle without touching workspace
    /// state; the returned error covers only local persistence.
    #[instrument(skip(self, job), fields(job = %job.id))]
    async fn reconcile_job(&self, mut job: WorkflowJob) -> IngestResult<()> {
        let Some(remote_id) = job.remote_job_id.clone() else {
            warn!("job has no remote id, marking failed");
            job.status = JobStatus::Failed;
            job.updated_at = Utc::now();
            return self.jobs.update(&job).await;
        };

        let state = match self.client.status(&remote_id).await {
            Ok(state) => state,
            Err(e) => {
                warn!(remote = %remote_id, error = %e, "remote status unavailable");
                job.status = JobStatus::Unknown;
                job.updated_at = Utc::now();
                return self.jobs.update(&job).await;
            },
        };

        match state.as_str() {
            REMOTE_SUCCESS => match self.client.push_result(&remote_id, &self.result_target).await {
                Ok(result_pid) => {
                    info!(remote = %remote_id, result = %result_pid, "workflow run succeeded");
                    job.result_pid = Some(result_pid);
                    self.release_workspace(&mut job).await;
                    job.status = JobStatus::Success;
                },
                Err(e) => {
                    // The result is still held remotely; retry next cycle.
                    warn!(remote = %remote_id, error = %e, "result push failed");
                    job.status = JobStatus::Unknown;
                },
            },
            REMOTE_FAILED => {
                info!(remote = %remote_id, "workflow run failed remotely");
                self.release_workspace(&mut job).await;
                job.status = JobStatus::Failed;
            },
            other => {
                debug!(remote = %remote_id, state = other, "workflow run still in progress");
                job.check_count += 1;
                job.status = JobStatus::Running;
            },
        }

        job.updated_at = Utc::now();
        self.jobs.update(&job).await
    }

    /// Delete the remote workspace at most once per job.
    async fn release_workspace(&self, job: &mut WorkflowJob) {
        if job.workspace_deleted {
            return;
        }
        let Some(handle) = job.workspace_handle.clone() else {
            return;
        };

        match self.client.delete_workspace(&handle).await {
            Ok(()) => job.workspace_deleted = true,
            Err(e) => {
                warn!(workspace = %handle, error = %e, "workspace delete failed");
            },
        }
    }
}
