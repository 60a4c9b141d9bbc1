//! Workflow submission
//!
//! Dispatches an already-archived work to the remote processor. Submission
//! is synchronous up to the point where the remote accepts the run; from
//! then on the job belongs to the reconciliation loop.

use std::sync::Arc;

use tracing::{info, instrument, warn};

use bagvault_common::types::StorageProfile;

use crate::error::{IngestError, IngestResult};
use crate::store::{JobStatus, JobStore, WorkflowJob};
use crate::vault::VaultClient;

use super::client::WorkflowClient;

/// Handles workflow submissions for archived works
pub struct WorkflowOrchestrator {
    client: WorkflowClient,
    vault: VaultClient,
    jobs: Arc<dyn JobStore>,
}

impl WorkflowOrchestrator {
    pub fn new(client: WorkflowClient, vault: VaultClient, jobs: Arc<dyn JobStore>) -> Self {
        Self { client, vault, jobs }
    }

    /// Submit one archived work for processing.
    ///
    /// Rejected when the user already has a run in `Running`, or when the
    /// archive is not disk-resident (neither online nor staged to the
    /// mirror tier); tape-resident works must be staged first. On success
    /// the job is persisted as `Running` with its remote job id.
    #[instrument(skip(self), fields(user = %username, pid = %source_pid))]
    pub async fn submit(
        &self,
        username: &str,
        source_pid: &str,
        input_file_grp: &str,
    ) -> IngestResult<WorkflowJob> {
        if self.jobs.has_running_for_user(username).await? {
            return Err(IngestError::JobAlreadyRunning { username: username.to_string() });
        }

        let storage_id = self.resolve_disk_resident(source_pid).await?;

        let mut job = WorkflowJob::new(username.to_string(), source_pid.to_string());
        self.jobs.insert(&job).await?;

        match self.dispatch(&mut job, &storage_id, source_pid, input_file_grp).await {
            Ok(()) => {
                info!(job = %job.id, remote = ?job.remote_job_id, "workflow run accepted");
                Ok(job)
            },
            Err(e) => {
                // The remote never accepted the run; release anything
                // created so far and record the terminal failure.
                if let Some(handle) = &job.workspace_handle {
                    if let Err(del) = self.client.delete_workspace(handle).await {
                        warn!(workspace = %handle, error = %del, "workspace cleanup failed");
                    } else {
                        job.workspace_deleted = true;
                    }
                }
                job.status = JobStatus::Failed;
                job.updated_at = chrono::Utc::now();
                if let Err(update) = self.jobs.update(&job).await {
                    warn!(job = %job.id, error = %update, "could not record failed submission");
                }
                Err(e)
            },
        }
    }

    async fn dispatch(
        &self,
        job: &mut WorkflowJob,
        storage_id: &str,
        source_pid: &str,
        input_file_grp: &str,
    ) -> IngestResult<()> {
        job.status = JobStatus::Preparing;
        job.updated_at = chrono::Utc::now();
        self.jobs.update(job).await?;

        let bytes = self.vault.export(storage_id).await?;
        let handle = self.client.upload_workspace(source_pid, bytes).await?;
        job.workspace_handle = Some(handle.clone());
        self.jobs.update(job).await?;

        let remote_id = self.client.run(&handle, input_file_grp).await?;
        job.remote_job_id = Some(remote_id);
        job.status = JobStatus::Running;
        job.updated_at = chrono::Utc::now();
        self.jobs.update(job).await?;

        Ok(())
    }

    /// The online copy if one exists, else the mirror-staged copy.
    async fn resolve_disk_resident(&self, pid: &str) -> IngestResult<String> {
        if let Some(id) = self.vault.resolve_storage_id(pid, StorageProfile::Online).await? {
            return Ok(id);
        }
        if let Some(id) = self.vault.resolve_storage_id(pid, StorageProfile::Mirror).await? {
            return Ok(id);
        }
        Err(IngestError::NotDiskResident(pid.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryJobStore;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn orchestrator(server: &MockServer, jobs: Arc<MemoryJobStore>) -> WorkflowOrchestrator {
        WorkflowOrchestrator::new(
            WorkflowClient::new(server.uri()).unwrap(),
            VaultClient::new(server.uri(), vec![]).unwrap(),
            jobs,
        )
    }

    fn search_hit(id: Option<&str>) -> ResponseTemplate {
        let hits: Vec<serde_json::Value> = id
            .map(|i| vec![serde_json::json!({"id": i})])
            .unwrap_or_default();
        ResponseTemplate::new(200).set_body_json(serde_json::json!({ "hits": hits }))
    }

    #[tokio::test]
    async fn test_submit_dispatches_and_records_running_job() {
        let server = MockServer::start().await;
        let jobs = Arc::new(MemoryJobStore::new());

        Mock::given(method("GET"))
            .and(path("/search"))
            .and(query_param("q", "21.11998/p1 AND profile:online"))
            .respond_with(search_hit(Some("arc-1")))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/archives/arc-1/export"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(b"zip".to_vec()))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/workspaces"))
            .respond_with(
                ResponseTemplate::new(201).set_body_json(serde_json::json!({"id": "ws-1"})),
            )
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/runs"))
            .respond_with(
                ResponseTemplate::new(202).set_body_json(serde_json::json!({"id": "job-9"})),
            )
            .expect(1)
            .mount(&server)
            .await;

        let job = orchestrator(&server, jobs.clone())
            .submit("alice", "21.11998/p1", "IMG")
            .await
            .unwrap();

        assert_eq!(job.status, JobStatus::Running);
        assert_eq!(job.remote_job_id.as_deref(), Some("job-9"));
        assert_eq!(job.workspace_handle.as_deref(), Some("ws-1"));

        let stored = jobs.find_by_id(job.id).await.unwrap().unwrap();
        assert_eq!(stored.status, JobStatus::Running);
    }

    #[tokio::test]
    async fn test_submit_rejected_while_user_has_running_job() {
        let server = MockServer::start().await;
        let jobs = Arc::new(MemoryJobStore::new());

        let mut running = WorkflowJob::new("alice".into(), "21.11998/p0".into());
        running.status = JobStatus::Running;
        jobs.insert(&running).await.unwrap();

        // No remote calls at all.
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(500))
            .expect(0)
            .mount(&server)
            .await;

        let err = orchestrator(&server, jobs.clone())
            .submit("alice", "21.11998/p1", "IMG")
            .await
            .unwrap_err();

        assert!(matches!(err, IngestError::JobAlreadyRunning { .. }));
        assert_eq!(jobs.find_reconcilable().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_submit_rejected_when_not_disk_resident() {
        let server = MockServer::start().await;
        let jobs = Arc::new(MemoryJobStore::new());

        // Neither online nor mirror knows the pid.
        Mock::given(method("GET"))
            .and(path("/search"))
            .respond_with(search_hit(None))
            .mount(&server)
            .await;

        let err = orchestrator(&server, jobs)
            .submit("alice", "21.11998/tape-only", "IMG")
            .await
            .unwrap_err();

        assert!(matches!(err, IngestError::NotDiskResident(_)));
    }

    #[tokio::test]
    async fn test_rejected_run_marks_job_failed_and_cleans_workspace() {
        let server = MockServer::start().await;
        let jobs = Arc::new(MemoryJobStore::new());

        Mock::given(method("GET"))
            .and(path("/search"))
            .respond_with(search_hit(Some("arc-1")))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/archives/arc-1/export"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(b"zip".to_vec()))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/workspaces"))
            .respond_with(
                ResponseTemplate::new(201).set_body_json(serde_json::json!({"id": "ws-1"})),
            )
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/runs"))
            .respond_with(ResponseTemplate::new(422))
            .mount(&server)
            .await;
        Mock::given(method("DELETE"))
            .and(path("/workspaces/ws-1"))
            .respond_with(ResponseTemplate::new(204))
            .expect(1)
            .mount(&server)
            .await;

        let err = orchestrator(&server, jobs.clone())
            .submit("alice", "21.11998/p1", "IMG")
            .await
            .unwrap_err();
        assert!(matches!(err, IngestError::RemoteStorage { status: 422, .. }));

        // The one persisted job ended up Failed with the workspace gone.
        assert!(jobs.find_reconcilable().await.unwrap().is_empty());
        assert!(!jobs.has_running_for_user("alice").await.unwrap());
    }
}
