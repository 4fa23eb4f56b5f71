use std::time::Duration;

use async_trait::async_trait;
use secrecy::ExposeSecret;
use serde::Serialize;
use serde_json::Value;

use goalrunner_core::config::AgentConfig;
use goalrunner_core::errors::AgentError;
use goalrunner_core::pipeline::{AgentMessage, AgentReply, AgentRun, GoalAgent};

/// HTTP client for the external automation agent service.
///
/// One POST per goal, bounded by the configured timeout. Retry policy is
/// deliberately absent: the agent may have already acted on the goal, so
/// re-sending is not safe.
pub struct HttpGoalAgent {
    http: reqwest::Client,
    endpoint_url: String,
    timeout_secs: u64,
}

#[derive(Serialize)]
struct AgentRequest<'a> {
    google_api_key: &'a str,
    youtube_pipedream_url: &'a str,
    drive_pipedream_url: Option<&'a str>,
    notion_pipedream_url: Option<&'a str>,
    user_goal: &'a str,
}

impl HttpGoalAgent {
    pub fn from_config(config: &AgentConfig) -> Result<Self, reqwest::Error> {
        Self::new(&config.endpoint_url, config.timeout_secs)
    }

    pub fn new(endpoint_url: &str, timeout_secs: u64) -> Result<Self, reqwest::Error> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout_secs.max(1)))
            .build()?;
        Ok(Self { http, endpoint_url: endpoint_url.to_string(), timeout_secs })
    }
}

#[async_trait]
impl GoalAgent for HttpGoalAgent {
    async fn run_goal(&self, run: &AgentRun) -> Result<AgentReply, AgentError> {
        let request = AgentRequest {
            google_api_key: run.api_key.expose_secret(),
            youtube_pipedream_url: &run.youtube_url,
            drive_pipedream_url: run.drive_url.as_deref(),
            notion_pipedream_url: run.notion_url.as_deref(),
            user_goal: &run.goal,
        };

        tracing::debug!(
            event_name = "agent.request.sent",
            endpoint_url = %self.endpoint_url,
            "dispatching goal to automation agent"
        );

        let response = self
            .http
            .post(&self.endpoint_url)
            .json(&request)
            .send()
            .await
            .map_err(|error| classify_send_error(&error, self.timeout_secs))?;

        let response = response
            .error_for_status()
            .map_err(|error| AgentError::Unreachable(error.to_string()))?;

        let body: Value = response
            .json()
            .await
            .map_err(|error| classify_body_error(&error, self.timeout_secs))?;

        parse_reply(&body)
    }
}

fn classify_send_error(error: &reqwest::Error, timeout_secs: u64) -> AgentError {
    if error.is_timeout() {
        AgentError::Timeout(timeout_secs)
    } else {
        AgentError::Unreachable(error.to_string())
    }
}

// The deadline can also fire mid-body, after the status line has arrived.
fn classify_body_error(error: &reqwest::Error, timeout_secs: u64) -> AgentError {
    if error.is_timeout() {
        AgentError::Timeout(timeout_secs)
    } else {
        AgentError::InvalidResponse(error.to_string())
    }
}

/// Extract the ordered message contents from an agent response body.
/// Anything that deviates from `{"messages": [{"content": ...}, ...]}` is
/// an invalid response, not a transport failure.
fn parse_reply(body: &Value) -> Result<AgentReply, AgentError> {
    let messages = body
        .get("messages")
        .ok_or_else(|| AgentError::InvalidResponse("missing `messages` field".to_string()))?;

    let entries = messages.as_array().ok_or_else(|| {
        AgentError::InvalidResponse("`messages` field is not an array".to_string())
    })?;

    let mut parsed = Vec::with_capacity(entries.len());
    for (index, entry) in entries.iter().enumerate() {
        let content = entry
            .get("content")
            .and_then(Value::as_str)
            .ok_or_else(|| {
                AgentError::InvalidResponse(format!(
                    "message at index {index} has no string `content` field"
                ))
            })?;
        parsed.push(AgentMessage { content: content.to_string() });
    }

    Ok(AgentReply { messages: parsed })
}
