use thiserror::Error;

/// Failure modes of a single agent invocation. Exactly one attempt is
/// made per call; retries are not performed at this layer.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum AgentError {
    #[error("agent endpoint unreachable: {0}")]
    Unreachable(String),
    #[error("agent returned a structurally invalid response: {0}")]
    InvalidResponse(String),
    #[error("agent call exceeded the {0}s timeout")]
    Timeout(u64),
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum StoreError {
    #[error("username is already taken")]
    DuplicateUsername,
    #[error("store backend failure: {0}")]
    Backend(String),
}
