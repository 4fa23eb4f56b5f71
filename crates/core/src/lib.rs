pub mod config;
pub mod domain;
pub mod errors;
pub mod pipeline;

pub use domain::configuration::{
    AgentConfiguration, ConfigurationError, ConfigurationForm, ConfigurationUpdate,
    EndpointSnapshot,
};
pub use domain::execution::{ExecutionRecord, RecordId};
pub use domain::user::{User, UserId};
pub use errors::{AgentError, StoreError};
pub use pipeline::{
    AccountStore, AgentMessage, AgentReply, AgentRun, GateDecision, GoalAgent, GoalPipeline,
    PipelineOutcome, SaveConfigurationError,
};
