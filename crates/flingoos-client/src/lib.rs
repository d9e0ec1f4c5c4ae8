//! HTTP client for the external Session Manager API.
//!
//! Four operations mirroring the upstream REST surface. No retries: a failed
//! call surfaces immediately as a `ClientError` for the UI to display.

use std::time::Duration;

use serde::Deserialize;

use flingoos_core::errors::ClientError;
use flingoos_core::ids::SessionId;

const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Response to a session start request.
#[derive(Clone, Debug, Deserialize)]
pub struct StartResponse {
    pub session_id: SessionId,
    #[serde(default)]
    pub message: String,
}

/// Response to a session stop request.
#[derive(Clone, Debug, Deserialize)]
pub struct StopResponse {
    pub session_id: SessionId,
    #[serde(default)]
    pub message: String,
}

/// Upstream-reported session status.
#[derive(Clone, Debug, Deserialize)]
pub struct UpstreamStatus {
    pub session_active: bool,
    #[serde(default)]
    pub session_id: Option<SessionId>,
    #[serde(default)]
    pub has_workflow: bool,
}

/// Processed workflow payload as returned by the workflow-fetch endpoint.
#[derive(Clone, Debug, Deserialize)]
pub struct WorkflowPayload {
    pub workflow_id: String,
    pub title: String,
    #[serde(default)]
    pub productivity_score: f64,
    #[serde(default)]
    pub guide_markdown: String,
    #[serde(default)]
    pub source: Option<String>,
}

/// Client for the Session Manager REST API.
pub struct SessionManagerClient {
    base_url: String,
    client: reqwest::Client,
}

impl SessionManagerClient {
    pub fn new(base_url: impl Into<String>) -> Self {
        let base_url = base_url.into();
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            client: reqwest::Client::builder()
                .connect_timeout(CONNECT_TIMEOUT)
                .timeout(REQUEST_TIMEOUT)
                .build()
                .expect("failed to build HTTP client"),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// POST /api/session/start
    pub async fn start_session(&self) -> Result<StartResponse, ClientError> {
        let url = format!("{}/api/session/start", self.base_url);
        let resp = self.client.post(&url).send().await.map_err(network)?;
        decode(resp).await
    }

    /// POST /api/session/{id}/stop
    pub async fn stop_session(&self, session_id: &SessionId) -> Result<StopResponse, ClientError> {
        let url = format!("{}/api/session/{}/stop", self.base_url, session_id);
        let resp = self.client.post(&url).send().await.map_err(network)?;
        decode(resp).await
    }

    /// GET /api/session/status
    pub async fn status(&self) -> Result<UpstreamStatus, ClientError> {
        let url = format!("{}/api/session/status", self.base_url);
        let resp = self.client.get(&url).send().await.map_err(network)?;
        decode(resp).await
    }

    /// GET /api/session/{id}/workflow
    pub async fn workflow(&self, session_id: &SessionId) -> Result<WorkflowPayload, ClientError> {
        let url = format!("{}/api/session/{}/workflow", self.base_url, session_id);
        let resp = self.client.get(&url).send().await.map_err(network)?;
        decode(resp).await
    }
}

fn network(err: reqwest::Error) -> ClientError {
    ClientError::Network(err.to_string())
}

/// Check the status code and decode the JSON body.
async fn decode<T: serde::de::DeserializeOwned>(resp: reqwest::Response) -> Result<T, ClientError> {
    let status = resp.status();
    let body = resp.text().await.map_err(network)?;

    if !status.is_success() {
        tracing::warn!(status = status.as_u16(), "Session Manager returned an error");
        return Err(ClientError::from_status(status.as_u16(), body));
    }

    serde_json::from_str(&body).map_err(|e| ClientError::Upstream {
        status: status.as_u16(),
        body: format!("invalid response body: {e}"),
    })
}
