//! HTTP client for the RunningHub REST endpoints.
//!
//! Wraps task submission, status polling, cancellation, and file upload
//! using [`reqwest`]. The [`JobApi`] trait is the seam callers inject
//! so orchestration code never talks to a concrete client.

use async_trait::async_trait;
use serde::Deserialize;

use modella_core::step::StepKind;

use crate::apps::{build_node_inputs, AppConfig, JobParams};
use crate::response::{normalize_status, NormalizedStatus};

/// Submission statuses the server may report for an accepted task.
const ACCEPTED_STATUSES: [&str; 3] = ["RUNNING", "QUEUED", "SUCCESS"];

/// RunningHub connection settings, loaded from the environment.
#[derive(Debug, Clone)]
pub struct RunningHubConfig {
    /// API key used both as a Bearer token and in legacy body fields.
    pub api_key: String,
    /// Base URL, e.g. `https://www.runninghub.cn`.
    pub base_url: String,
    pub try_on_app_id: String,
    pub background_app_id: String,
    pub video_app_id: String,
    /// Optional global override for per-application polling deadlines.
    pub max_task_timeout_secs: Option<u64>,
}

impl RunningHubConfig {
    /// Load configuration from environment variables.
    ///
    /// | Env Var                      | Default                      |
    /// |------------------------------|------------------------------|
    /// | `RUNNINGHUB_API_KEY`         | empty                        |
    /// | `RUNNINGHUB_BASE_URL`        | `https://www.runninghub.cn`  |
    /// | `RUNNINGHUB_TRY_ON_APP_ID`   | empty                        |
    /// | `RUNNINGHUB_BACKGROUND_APP_ID` | empty                      |
    /// | `RUNNINGHUB_VIDEO_APP_ID`    | empty                        |
    /// | `MAX_TASK_TIMEOUT_SECS`      | unset (per-app defaults)     |
    pub fn from_env() -> Self {
        let var = |key: &str| std::env::var(key).unwrap_or_default();
        Self {
            api_key: var("RUNNINGHUB_API_KEY"),
            base_url: std::env::var("RUNNINGHUB_BASE_URL")
                .unwrap_or_else(|_| "https://www.runninghub.cn".into()),
            try_on_app_id: var("RUNNINGHUB_TRY_ON_APP_ID"),
            background_app_id: var("RUNNINGHUB_BACKGROUND_APP_ID"),
            video_app_id: var("RUNNINGHUB_VIDEO_APP_ID"),
            max_task_timeout_secs: std::env::var("MAX_TASK_TIMEOUT_SECS")
                .ok()
                .and_then(|v| v.parse().ok()),
        }
    }

    /// The application configuration for a step.
    pub fn app(&self, step: StepKind) -> AppConfig {
        let app_id = match step {
            StepKind::TryOn => &self.try_on_app_id,
            StepKind::Background => &self.background_app_id,
            StepKind::Video => &self.video_app_id,
        };
        AppConfig::new(step, app_id.clone())
    }

    /// Effective polling deadline for an application.
    pub fn task_timeout(&self, app: &AppConfig) -> std::time::Duration {
        self.max_task_timeout_secs
            .map(std::time::Duration::from_secs)
            .unwrap_or_else(|| app.timeout())
    }
}

/// Response returned by the task-creation endpoint.
///
/// A rejected submission still answers 200 with an empty `taskId` and
/// an `errorCode`/`errorMessage` pair, so acceptance is decided by
/// [`SubmitResponse::accepted`], not the HTTP status.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SubmitResponse {
    pub task_id: Option<String>,
    pub status: Option<String>,
    pub client_id: Option<String>,
    pub error_code: Option<String>,
    pub error_message: Option<String>,
    pub prompt_tips: Option<String>,
}

impl SubmitResponse {
    /// Accepted iff the server returned a non-empty task id AND a
    /// status from the accepted set. Any other combination is a
    /// submission failure and must not start polling.
    pub fn accepted(&self) -> bool {
        let has_id = self.task_id.as_deref().is_some_and(|id| !id.is_empty());
        let status_ok = self
            .status
            .as_deref()
            .is_some_and(|s| ACCEPTED_STATUSES.contains(&s));
        has_id && status_ok
    }
}

/// Errors from the RunningHub REST layer.
#[derive(Debug, thiserror::Error)]
pub enum RunningHubError {
    /// The HTTP request itself failed (network, DNS, TLS, etc.).
    #[error("HTTP request failed: {0}")]
    Request(#[from] reqwest::Error),

    /// RunningHub returned a non-2xx status code.
    #[error("RunningHub API error ({status}): {body}")]
    Api {
        /// HTTP status code.
        status: u16,
        /// Raw response body for debugging.
        body: String,
    },
}

/// The remote job API as the orchestration layer sees it.
#[async_trait]
pub trait JobApi: Send + Sync {
    /// Submit a job to an application. Check
    /// [`SubmitResponse::accepted`] before polling.
    async fn create_task(
        &self,
        app: &AppConfig,
        params: &JobParams,
        client_id: Option<String>,
    ) -> Result<SubmitResponse, RunningHubError>;

    /// Poll the status of a submitted task, normalized across wire
    /// shapes.
    async fn task_status(&self, task_id: &str) -> Result<NormalizedStatus, RunningHubError>;

    /// Ask the server to cancel a task. Best-effort: `Ok(false)` means
    /// the server declined.
    async fn cancel_task(&self, task_id: &str) -> Result<bool, RunningHubError>;

    /// Upload a file for use as a node input. Returns the server-side
    /// file reference (e.g. `api/xxxx.png`), or `None` when the server
    /// rejected the upload; callers must treat `None` as fatal for the
    /// job being built.
    async fn upload_file(
        &self,
        data: Vec<u8>,
        filename: &str,
    ) -> Result<Option<String>, RunningHubError>;
}

/// Concrete [`JobApi`] implementation over HTTP.
pub struct RunningHubClient {
    http: reqwest::Client,
    api_key: String,
    base_url: String,
}

impl RunningHubClient {
    pub fn new(config: &RunningHubConfig) -> Self {
        Self::with_client(reqwest::Client::new(), config)
    }

    /// Reuse an existing [`reqwest::Client`] (connection pooling).
    pub fn with_client(http: reqwest::Client, config: &RunningHubConfig) -> Self {
        Self {
            http,
            api_key: config.api_key.clone(),
            base_url: config.base_url.clone(),
        }
    }

    // ---- private helpers ----

    /// Ensure the response has a success status code, or produce an
    /// [`RunningHubError::Api`] with the status and body text.
    async fn ensure_success(
        response: reqwest::Response,
    ) -> Result<reqwest::Response, RunningHubError> {
        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "<unreadable body>".to_string());
            return Err(RunningHubError::Api {
                status: status.as_u16(),
                body,
            });
        }
        Ok(response)
    }

    /// Parse a successful JSON response body into the expected type.
    async fn parse_response<T: serde::de::DeserializeOwned>(
        response: reqwest::Response,
    ) -> Result<T, RunningHubError> {
        let response = Self::ensure_success(response).await?;
        Ok(response.json::<T>().await?)
    }
}

#[async_trait]
impl JobApi for RunningHubClient {
    async fn create_task(
        &self,
        app: &AppConfig,
        params: &JobParams,
        client_id: Option<String>,
    ) -> Result<SubmitResponse, RunningHubError> {
        let client_id = client_id.unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
        let node_inputs = build_node_inputs(app, params);

        let body = serde_json::json!({
            "nodeInfoList": node_inputs,
            "instanceType": "default",
            "usePersonalQueue": "false",
        });

        tracing::debug!(
            app_id = %app.app_id,
            step = %app.step,
            client_id = %client_id,
            inputs = node_inputs.len(),
            "Submitting task to RunningHub",
        );

        let response = self
            .http
            .post(format!(
                "{}/openapi/v2/run/ai-app/{}",
                self.base_url, app.app_id
            ))
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await?;

        Self::parse_response(response).await
    }

    async fn task_status(&self, task_id: &str) -> Result<NormalizedStatus, RunningHubError> {
        let body = serde_json::json!({
            "apiKey": self.api_key,
            "taskId": task_id,
        });

        let response = self
            .http
            .post(format!("{}/task/openapi/outputs", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await?;

        let raw: serde_json::Value = Self::parse_response(response).await?;
        Ok(normalize_status(&raw))
    }

    async fn cancel_task(&self, task_id: &str) -> Result<bool, RunningHubError> {
        let body = serde_json::json!({
            "apiKey": self.api_key,
            "taskId": task_id,
        });

        let response = self
            .http
            .post(format!("{}/openapi/v2/task/cancel", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await?;

        let raw: serde_json::Value = Self::parse_response(response).await?;
        Ok(raw.get("code").and_then(serde_json::Value::as_i64) == Some(0))
    }

    async fn upload_file(
        &self,
        data: Vec<u8>,
        filename: &str,
    ) -> Result<Option<String>, RunningHubError> {
        let part = reqwest::multipart::Part::bytes(data)
            .file_name(filename.to_owned())
            .mime_str(mime_for_filename(filename))
            .map_err(RunningHubError::Request)?;
        let form = reqwest::multipart::Form::new()
            .text("apiKey", self.api_key.clone())
            .part("file", part);

        let response = self
            .http
            .post(format!("{}/task/openapi/upload", self.base_url))
            .multipart(form)
            .send()
            .await?;

        let raw: serde_json::Value = Self::parse_response(response).await?;
        if raw.get("code").and_then(serde_json::Value::as_i64) == Some(0) {
            Ok(raw
                .get("data")
                .and_then(|data| data.get("fileName"))
                .and_then(serde_json::Value::as_str)
                .map(str::to_owned))
        } else {
            tracing::warn!(filename, "RunningHub rejected file upload");
            Ok(None)
        }
    }
}

/// Guess a mime type from the filename extension.
fn mime_for_filename(filename: &str) -> &'static str {
    let suffix = filename.rsplit('.').next().unwrap_or("").to_ascii_lowercase();
    match suffix.as_str() {
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        "webp" => "image/webp",
        "mp4" => "video/mp4",
        _ => "application/octet-stream",
    }
}
