//! Remote workflow processor client
//!
//! The processor receives a packaged workspace, runs a named file group
//! through its pipeline, and pushes the finished result back into this
//! system's import endpoint using credentials we hand it. This client only
//! speaks the protocol; submission policy and reconciliation live in the
//! orchestrator and the reconciliation loop.

use std::time::Duration;

use reqwest::multipart::{Form, Part};
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{debug, instrument};

use crate::error::{IngestError, IngestResult};

/// Default timeout for workflow service requests in seconds. Workspace
/// uploads can be large.
pub const DEFAULT_WORKFLOW_TIMEOUT_SECS: u64 = 300;

/// Import endpoint and credentials the processor uses to push a finished
/// result back into this system
#[derive(Debug, Clone, Serialize)]
pub struct ResultTarget {
    pub url: String,
    pub username: String,
    pub password: String,
}

#[derive(Deserialize)]
struct IdResponse {
    id: String,
}

#[derive(Deserialize)]
struct StateResponse {
    state: String,
}

#[derive(Deserialize)]
struct PidResponse {
    pid: String,
}

/// Client for the external workflow processing service
#[derive(Clone)]
pub struct WorkflowClient {
    client: Client,
    base_url: String,
}

impl WorkflowClient {
    pub fn new(base_url: String) -> IngestResult<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(DEFAULT_WORKFLOW_TIMEOUT_SECS))
            .build()?;

        Ok(Self { client, base_url })
    }

    /// Upload a packaged workspace, returning the remote workspace handle.
    #[instrument(skip(self, bytes), fields(size = bytes.len()))]
    pub async fn upload_workspace(&self, name: &str, bytes: Vec<u8>) -> IngestResult<String> {
        let part = Part::bytes(bytes)
            .file_name(format!("{name}.zip"))
            .mime_str("application/zip")?;
        let form = Form::new().part("workspace", part);

        let response = self
            .client
            .post(format!("{}/workspaces", self.base_url))
            .multipart(form)
            .send()
            .await?;

        let response = check(response, "upload_workspace")?;
        let body: IdResponse = response.json().await?;
        debug!(workspace = %body.id, "workspace uploaded");
        Ok(body.id)
    }

    /// Start a run over an uploaded workspace, returning the remote job id.
    #[instrument(skip(self))]
    pub async fn run(&self, workspace_id: &str, input_file_grp: &str) -> IngestResult<String> {
        let response = self
            .client
            .post(format!("{}/runs", self.base_url))
            .json(&json!({
                "workspace_id": workspace_id,
                "input_file_grp": input_file_grp,
            }))
            .send()
            .await?;

        let response = check(response, "run_workflow")?;
        let body: IdResponse = response.json().await?;
        debug!(job = %body.id, "workflow run started");
        Ok(body.id)
    }

    /// Current remote state of a run, as the service reports it.
    #[instrument(skip(self))]
    pub async fn status(&self, job_id: &str) -> IngestResult<String> {
        let response = self
            .client
            .get(format!("{}/runs/{job_id}", self.base_url))
            .send()
            .await?;

        let response = check(response, "job_status")?;
        let body: StateResponse = response.json().await?;
        Ok(body.state)
    }

    /// Tell the processor to push the finished result into this system.
    /// Returns the pid the import produced.
    #[instrument(skip(self, target))]
    pub async fn push_result(&self, job_id: &str, target: &ResultTarget) -> IngestResult<String> {
        let response = self
            .client
            .post(format!("{}/runs/{job_id}/result", self.base_url))
            .json(target)
            .send()
            .await?;

        let response = check(response, "push_result")?;
        let body: PidResponse = response.json().await?;
        debug!(pid = %body.pid, "workflow result pushed");
        Ok(body.pid)
    }

    /// Delete a remote workspace. Idempotent: a 404 is not an error.
    #[instrument(skip(self))]
    pub async fn delete_workspace(&self, workspace_id: &str) -> IngestResult<()> {
        let response = self
            .client
            .delete(format!("{}/workspaces/{workspace_id}", self.base_url))
            .send()
            .await?;

        if response.status() == StatusCode::NOT_FOUND {
            debug!(workspace_id, "workspace already gone");
            return Ok(());
        }
        check(response, "delete_workspace")?;
        Ok(())
    }
}

fn check(response: reqwest::Response, operation: &'static str) -> IngestResult<reqwest::Response> {
    let status = response.status();
    if status.is_success() {
        Ok(response)
    } else {
        Err(IngestError::RemoteStorage { status: status.as_u16(), operation })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn client(server: &MockServer) -> WorkflowClient {
        WorkflowClient::new(server.uri()).unwrap()
    }

    #[tokio::test]
    async fn test_upload_workspace_returns_handle() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/workspaces"))
            .respond_with(
                ResponseTemplate::new(201).set_body_json(serde_json::json!({"id": "ws-1"})),
            )
            .expect(1)
            .mount(&server)
            .await;

        let handle = client(&server)
            .upload_workspace("work-1", b"zipbytes".to_vec())
            .await
            .unwrap();
        assert_eq!(handle, "ws-1");
    }

    #[tokio::test]
    async fn test_run_and_status() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/runs"))
            .and(body_json(serde_json::json!({
                "workspace_id": "ws-1",
                "input_file_grp": "IMG",
            })))
            .respond_with(
                ResponseTemplate::new(202).set_body_json(serde_json::json!({"id": "job-1"})),
            )
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/runs/job-1"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(serde_json::json!({"state": "running"})),
            )
            .mount(&server)
            .await;

        let c = client(&server);
        let job_id = c.run("ws-1", "IMG").await.unwrap();
        assert_eq!(job_id, "job-1");
        assert_eq!(c.status("job-1").await.unwrap(), "running");
    }

    #[tokio::test]
    async fn test_push_result_carries_target_credentials() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/runs/job-1/result"))
            .and(body_json(serde_json::json!({
                "url": "http://archive/import",
                "username": "svc",
                "password": "secret",
            })))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(serde_json::json!({"pid": "21.11998/result"})),
            )
            .expect(1)
            .mount(&server)
            .await;

        let target = ResultTarget {
            url: "http://archive/import".into(),
            username: "svc".into(),
            password: "secret".into(),
        };
        let pid = client(&server).push_result("job-1", &target).await.unwrap();
        assert_eq!(pid, "21.11998/result");
    }

    #[tokio::test]
    async fn test_delete_workspace_tolerates_404() {
        let server = MockServer::start().await;

        Mock::given(method("DELETE"))
            .and(path("/workspaces/gone"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        client(&server).delete_workspace("gone").await.unwrap();
    }

    #[tokio::test]
    async fn test_failure_surfaces_status_and_operation() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        let err = client(&server).status("job-1").await.unwrap_err();
        assert!(err.is_transient());
        assert!(matches!(
            err,
            IngestError::RemoteStorage { status: 503, operation: "job_status" }
        ));
    }
}
