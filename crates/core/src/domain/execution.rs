use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::configuration::EndpointSnapshot;
use crate::domain::user::UserId;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordId(pub i64);

impl fmt::Display for RecordId {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(formatter, "{}", self.0)
    }
}

/// One journaled goal execution. Rows are append-only; the endpoint
/// snapshot and timestamp are fixed at write time.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ExecutionRecord {
    pub id: RecordId,
    pub user_id: UserId,
    pub goal: String,
    pub endpoints: EndpointSnapshot,
    pub result: Option<String>,
    pub timestamp: DateTime<Utc>,
}
