//! Runway HTTP API client.

use async_trait::async_trait;
use secrecy::ExposeSecret;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::{RemoteBackend, RemoteTaskStatus};
use crate::config::RunwayConfig;
use crate::error::RemoteError;
use crate::jobs::request::GenerationSpec;

/// Body of `POST /image_to_video`.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct CreateTaskBody<'a> {
    model: &'a str,
    prompt_text: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    prompt_image: Option<&'a str>,
    duration: u32,
    ratio: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    seed: Option<u32>,
}

#[derive(Debug, Deserialize)]
struct CreateTaskResponse {
    id: String,
}

/// Body of `GET /tasks/{id}`.
#[derive(Debug, Deserialize)]
struct TaskResponse {
    status: String,
    #[serde(default)]
    output: Option<Value>,
    #[serde(default, alias = "failureReason", alias = "failure_reason")]
    failure: Option<String>,
}

/// Client for the Runway task API.
pub struct RunwayClient {
    config: RunwayConfig,
    client: reqwest::Client,
}

impl RunwayClient {
    pub fn new(config: RunwayConfig) -> Self {
        Self {
            config,
            client: reqwest::Client::new(),
        }
    }

    fn api_url(&self, path: &str) -> String {
        format!("{}/{path}", self.config.base_url.trim_end_matches('/'))
    }

    fn authorized(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        request
            .bearer_auth(self.config.api_key.expose_secret())
            .header("X-Runway-Version", &self.config.api_version)
    }

    /// Turn a non-success response into a [`RemoteError`].
    async fn check(response: reqwest::Response) -> Result<reqwest::Response, RemoteError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        if status == reqwest::StatusCode::UNAUTHORIZED || status == reqwest::StatusCode::FORBIDDEN {
            return Err(RemoteError::AuthFailed);
        }
        let body = response.text().await.unwrap_or_default();
        Err(RemoteError::Rejected {
            status: status.as_u16(),
            body,
        })
    }
}

#[async_trait]
impl RemoteBackend for RunwayClient {
    async fn submit(&self, spec: &GenerationSpec) -> Result<String, RemoteError> {
        let body = CreateTaskBody {
            model: spec.model.id(),
            prompt_text: &spec.prompt_text,
            prompt_image: spec.prompt_image.as_deref(),
            duration: spec.duration,
            ratio: &spec.ratio,
            seed: spec.seed,
        };

        let response = self
            .authorized(self.client.post(self.api_url("image_to_video")))
            .json(&body)
            .send()
            .await
            .map_err(|e| RemoteError::Network(e.to_string()))?;

        let created: CreateTaskResponse = Self::check(response)
            .await?
            .json()
            .await
            .map_err(|e| RemoteError::InvalidResponse(e.to_string()))?;

        tracing::info!(
            remote_task = %created.id,
            model = %spec.model,
            duration = spec.duration,
            "Remote generation task created"
        );
        Ok(created.id)
    }

    async fn query(&self, remote_handle: &str) -> Result<RemoteTaskStatus, RemoteError> {
        let response = self
            .authorized(
                self.client
                    .get(self.api_url(&format!("tasks/{remote_handle}"))),
            )
            .send()
            .await
            .map_err(|e| RemoteError::Network(e.to_string()))?;

        let task: TaskResponse = Self::check(response)
            .await?
            .json()
            .await
            .map_err(|e| RemoteError::InvalidResponse(e.to_string()))?;

        Ok(RemoteTaskStatus::from_parts(
            &task.status,
            task.output.as_ref(),
            task.failure,
        ))
    }
}

#[cfg(test)]
mod tests {
    use secrecy::SecretString;

    use super::*;
    use crate::jobs::pricing::ModelTier;

    fn client() -> RunwayClient {
        RunwayClient::new(RunwayConfig {
            api_key: SecretString::from("key_test"),
            base_url: "https://runway.test/v1/".to_string(),
            api_version: "2024-11-06".to_string(),
        })
    }

    #[test]
    fn api_url_joins_cleanly() {
        assert_eq!(
            client().api_url("tasks/abc"),
            "https://runway.test/v1/tasks/abc"
        );
    }

    #[test]
    fn create_body_uses_camel_case_and_skips_absent_fields() {
        let spec = GenerationSpec {
            prompt_text: "a cat".into(),
            prompt_image: None,
            duration: 5,
            ratio: "16:9".into(),
            seed: None,
            model: ModelTier::Gen3aTurbo,
        };
        let body = CreateTaskBody {
            model: spec.model.id(),
            prompt_text: &spec.prompt_text,
            prompt_image: spec.prompt_image.as_deref(),
            duration: spec.duration,
            ratio: &spec.ratio,
            seed: spec.seed,
        };
        let json = serde_json::to_value(&body).unwrap();
        assert_eq!(json["model"], "gen3a_turbo");
        assert_eq!(json["promptText"], "a cat");
        assert!(json.get("promptImage").is_none());
        assert!(json.get("seed").is_none());
    }

    #[test]
    fn task_response_accepts_failure_aliases() {
        let task: TaskResponse =
            serde_json::from_str(r#"{"status": "FAILED", "failureReason": "blocked"}"#).unwrap();
        assert_eq!(task.failure.as_deref(), Some("blocked"));

        let task: TaskResponse = serde_json::from_str(
            r#"{"id": "t1", "status": "SUCCEEDED", "output": ["https://x/video.mp4"]}"#,
        )
        .unwrap();
        assert_eq!(
            RemoteTaskStatus::from_parts(&task.status, task.output.as_ref(), task.failure),
            RemoteTaskStatus::Succeeded {
                output: Some("https://x/video.mp4".into())
            }
        );
    }
}
