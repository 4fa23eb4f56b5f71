//! Goal-execution pipeline: configuration gate, agent invocation, and
//! transactional journaling of results.
//!
//! The pipeline is stateless; every operation takes an already
//! authenticated [`UserId`] supplied by the caller. Collaborators are
//! abstracted behind [`AccountStore`] and [`GoalAgent`] so the web layer,
//! the SQL store, and the HTTP agent client stay swappable in tests.

use std::sync::Arc;

use async_trait::async_trait;
use secrecy::SecretString;
use serde::Deserialize;
use thiserror::Error;

use crate::domain::configuration::{
    AgentConfiguration, ConfigurationError, ConfigurationForm, ConfigurationUpdate,
    EndpointSnapshot,
};
use crate::domain::execution::RecordId;
use crate::domain::user::UserId;
use crate::errors::{AgentError, StoreError};

/// Persistence collaborator for configurations and the execution journal.
#[async_trait]
pub trait AccountStore: Send + Sync {
    async fn get_configuration(
        &self,
        user_id: UserId,
    ) -> Result<Option<AgentConfiguration>, StoreError>;

    /// Full replace-on-write; the previous row (if any) is superseded
    /// entirely.
    async fn upsert_configuration(
        &self,
        user_id: UserId,
        update: ConfigurationUpdate,
    ) -> Result<(), StoreError>;

    /// Append one journal row atomically. The store assigns the
    /// timestamp at write time so per-user ordering does not depend on
    /// caller clocks.
    async fn append_execution_record(
        &self,
        user_id: UserId,
        goal: &str,
        endpoints: &EndpointSnapshot,
        result: &str,
    ) -> Result<RecordId, StoreError>;
}

/// One goal invocation as handed to the external automation agent.
#[derive(Clone, Debug)]
pub struct AgentRun {
    pub goal: String,
    pub api_key: SecretString,
    pub youtube_url: String,
    pub drive_url: Option<String>,
    pub notion_url: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
pub struct AgentMessage {
    pub content: String,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct AgentReply {
    pub messages: Vec<AgentMessage>,
}

impl AgentReply {
    /// Normalize the reply into one opaque result string: message
    /// contents in received order, joined by a single newline. An empty
    /// sequence is a successful empty result, not a failure.
    pub fn joined_text(&self) -> String {
        self.messages
            .iter()
            .map(|message| message.content.as_str())
            .collect::<Vec<_>>()
            .join("\n")
    }
}

/// External automation agent. One fully blocking attempt per call; any
/// timeout is owned by the implementation.
#[async_trait]
pub trait GoalAgent: Send + Sync {
    async fn run_goal(&self, run: &AgentRun) -> Result<AgentReply, AgentError>;
}

/// Verdict of the configuration gate for a single user.
#[derive(Clone, Debug)]
pub enum GateDecision {
    Ready(AgentConfiguration),
    NotConfigured,
}

impl GateDecision {
    pub fn is_ready(&self) -> bool {
        matches!(self, GateDecision::Ready(_))
    }

    pub fn into_configuration(self) -> Option<AgentConfiguration> {
        match self {
            GateDecision::Ready(configuration) => Some(configuration),
            GateDecision::NotConfigured => None,
        }
    }
}

/// Outcome of a goal submission, shaped for direct display.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum PipelineOutcome {
    /// The gate found no configuration row; no agent call was made.
    NeedsConfiguration,
    Success {
        result_text: String,
    },
    Failure {
        message: String,
        detail: Option<String>,
    },
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum SaveConfigurationError {
    #[error(transparent)]
    Invalid(#[from] ConfigurationError),
    #[error(transparent)]
    Store(#[from] StoreError),
}

pub struct GoalPipeline {
    store: Arc<dyn AccountStore>,
    agent: Arc<dyn GoalAgent>,
}

impl GoalPipeline {
    pub fn new(store: Arc<dyn AccountStore>, agent: Arc<dyn GoalAgent>) -> Self {
        Self { store, agent }
    }

    /// Read-only gate check. Both entry points (post-login redirect and
    /// pre-submission re-check) go through this method so the verdict
    /// cannot diverge between them.
    pub async fn check_gate(&self, user_id: UserId) -> Result<GateDecision, StoreError> {
        let configuration = self.store.get_configuration(user_id).await?;
        Ok(match configuration {
            Some(configuration) => GateDecision::Ready(configuration),
            None => GateDecision::NotConfigured,
        })
    }

    /// Run one goal through gate -> invoke -> record. Every failure is
    /// converted into an outcome; this method never propagates an error
    /// past the pipeline boundary.
    pub async fn submit_goal(&self, user_id: UserId, goal: &str) -> PipelineOutcome {
        let goal = goal.trim();

        let decision = match self.check_gate(user_id).await {
            Ok(decision) => decision,
            Err(error) => {
                tracing::error!(
                    event_name = "pipeline.gate.lookup_failed",
                    user_id = %user_id,
                    error = %error,
                    "configuration lookup failed before invocation"
                );
                return unexpected_failure(error);
            }
        };

        let configuration = match decision {
            GateDecision::Ready(configuration) => configuration,
            GateDecision::NotConfigured => {
                tracing::info!(
                    event_name = "pipeline.gate.not_configured",
                    user_id = %user_id,
                    "goal submission short-circuited by configuration gate"
                );
                return PipelineOutcome::NeedsConfiguration;
            }
        };

        // The gate verdict comes first: an unconfigured account is told to
        // configure even when the goal text is also unusable.
        if goal.is_empty() {
            return PipelineOutcome::Failure {
                message: "Goal text must not be empty.".to_string(),
                detail: None,
            };
        }

        let run = AgentRun {
            goal: goal.to_string(),
            api_key: configuration.api_key.clone(),
            youtube_url: configuration.youtube_url.clone(),
            drive_url: configuration.drive_url.clone(),
            notion_url: configuration.notion_url.clone(),
        };

        match self.agent.run_goal(&run).await {
            Ok(reply) => {
                let result_text = reply.joined_text();
                let snapshot = configuration.endpoint_snapshot();
                // Journaling is best-effort relative to display: the agent
                // call already succeeded, so the user still gets their
                // result even if the record write fails.
                if let Err(error) = self
                    .store
                    .append_execution_record(user_id, goal, &snapshot, &result_text)
                    .await
                {
                    tracing::error!(
                        event_name = "pipeline.record.write_failed",
                        user_id = %user_id,
                        error = %error,
                        "execution record write failed after successful agent call"
                    );
                }
                PipelineOutcome::Success { result_text }
            }
            Err(error) => {
                tracing::warn!(
                    event_name = "pipeline.agent.failed",
                    user_id = %user_id,
                    error = %error,
                    "agent invocation failed; no record written"
                );
                PipelineOutcome::Failure {
                    message: agent_failure_message(&error).to_string(),
                    detail: Some(error.to_string()),
                }
            }
        }
    }

    /// Validate, normalize, and upsert one configuration row.
    pub async fn save_configuration(
        &self,
        user_id: UserId,
        form: ConfigurationForm,
    ) -> Result<(), SaveConfigurationError> {
        let update = form.into_update()?;
        self.store.upsert_configuration(user_id, update).await?;
        tracing::info!(
            event_name = "pipeline.configuration.saved",
            user_id = %user_id,
            "agent configuration replaced"
        );
        Ok(())
    }
}

fn agent_failure_message(error: &AgentError) -> &'static str {
    match error {
        AgentError::Unreachable(_) => {
            "The automation agent could not be reached. Check your endpoint URLs and try again."
        }
        AgentError::InvalidResponse(_) => {
            "The automation agent returned an unexpected response. Check your API key or URLs."
        }
        AgentError::Timeout(_) => {
            "The automation agent took too long to respond. Please try again."
        }
    }
}

fn unexpected_failure(error: StoreError) -> PipelineOutcome {
    PipelineOutcome::Failure {
        message: "An unexpected error occurred while running your goal.".to_string(),
        detail: Some(error.to_string()),
    }
}
