use secrecy::SecretString;
use thiserror::Error;

use crate::domain::user::UserId;

/// Per-user agent credentials and endpoint URLs.
///
/// A stored configuration always has a non-empty API key and YouTube
/// endpoint; the Drive and Notion endpoints are optional. Absence of the
/// whole row (not a flag) is what marks an account as "not configured".
#[derive(Clone, Debug)]
pub struct AgentConfiguration {
    pub user_id: UserId,
    pub api_key: SecretString,
    pub youtube_url: String,
    pub drive_url: Option<String>,
    pub notion_url: Option<String>,
}

impl AgentConfiguration {
    /// Capture the endpoint URLs as they are right now, for journaling
    /// alongside an execution result. Later edits to the configuration
    /// must never alter an already-written snapshot.
    pub fn endpoint_snapshot(&self) -> EndpointSnapshot {
        EndpointSnapshot {
            youtube_url: self.youtube_url.clone(),
            drive_url: self.drive_url.clone(),
            notion_url: self.notion_url.clone(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EndpointSnapshot {
    pub youtube_url: String,
    pub drive_url: Option<String>,
    pub notion_url: Option<String>,
}

/// Raw configuration form input as submitted by the user. Optional
/// endpoints carry an enable flag mirroring the form checkboxes: a
/// disabled endpoint is dropped regardless of any URL text left in the
/// field.
#[derive(Clone, Debug, Default)]
pub struct ConfigurationForm {
    pub api_key: String,
    pub youtube_url: String,
    pub drive_enabled: bool,
    pub drive_url: String,
    pub notion_enabled: bool,
    pub notion_url: String,
}

/// A validated, normalized configuration ready for a full replace-on-write
/// upsert. There are no partial-patch semantics.
#[derive(Clone, Debug)]
pub struct ConfigurationUpdate {
    pub api_key: SecretString,
    pub youtube_url: String,
    pub drive_url: Option<String>,
    pub notion_url: Option<String>,
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum ConfigurationError {
    #[error("api key must not be empty")]
    MissingApiKey,
    #[error("youtube endpoint URL must not be empty")]
    MissingYoutubeUrl,
}

impl ConfigurationForm {
    pub fn into_update(self) -> Result<ConfigurationUpdate, ConfigurationError> {
        let api_key = self.api_key.trim().to_string();
        if api_key.is_empty() {
            return Err(ConfigurationError::MissingApiKey);
        }

        let youtube_url = self.youtube_url.trim();
        if youtube_url.is_empty() {
            return Err(ConfigurationError::MissingYoutubeUrl);
        }

        Ok(ConfigurationUpdate {
            api_key: api_key.into(),
            youtube_url: ensure_scheme(youtube_url),
            drive_url: optional_endpoint(self.drive_enabled, &self.drive_url),
            notion_url: optional_endpoint(self.notion_enabled, &self.notion_url),
        })
    }
}

/// Prefix `https://` onto any URL that lacks an explicit scheme.
/// Already-schemed values pass through unchanged, so normalization is
/// idempotent.
pub fn ensure_scheme(url: &str) -> String {
    if url.starts_with("http://") || url.starts_with("https://") {
        url.to_string()
    } else {
        format!("https://{url}")
    }
}

fn optional_endpoint(enabled: bool, raw_url: &str) -> Option<String> {
    if !enabled {
        return None;
    }
    let trimmed = raw_url.trim();
    if trimmed.is_empty() {
        // Empty optional values are stored as absent, never as "".
        None
    } else {
        Some(ensure_scheme(trimmed))
    }
}
