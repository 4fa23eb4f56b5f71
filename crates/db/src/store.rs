use async_trait::async_trait;
use chrono::{DateTime, Utc};
use secrecy::ExposeSecret;
use sqlx::sqlite::SqliteRow;
use sqlx::Row;

use goalrunner_core::domain::configuration::{
    AgentConfiguration, ConfigurationUpdate, EndpointSnapshot,
};
use goalrunner_core::domain::execution::{ExecutionRecord, RecordId};
use goalrunner_core::domain::user::{User, UserId};
use goalrunner_core::errors::StoreError;
use goalrunner_core::pipeline::AccountStore;

use crate::DbPool;

/// SQLite-backed account store: user accounts, the per-user agent
/// configuration row, and the append-only execution journal.
pub struct SqlAccountStore {
    pool: DbPool,
}

impl SqlAccountStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    pub async fn create_user(&self, username: &str, password: &str) -> Result<User, StoreError> {
        let created_at = Utc::now();
        let result = sqlx::query(
            "INSERT INTO users (username, password, created_at) VALUES (?, ?, ?)",
        )
        .bind(username)
        .bind(password)
        .bind(created_at.to_rfc3339())
        .execute(&self.pool)
        .await
        .map_err(map_insert_error)?;

        Ok(User {
            id: UserId(result.last_insert_rowid()),
            username: username.to_string(),
            created_at,
        })
    }

    /// Credential check. Returns `None` both for an unknown username and
    /// for a wrong password, so callers cannot distinguish the two.
    pub async fn verify_login(
        &self,
        username: &str,
        password: &str,
    ) -> Result<Option<User>, StoreError> {
        let row = sqlx::query(
            "SELECT id, username, password, created_at FROM users WHERE username = ?",
        )
        .bind(username)
        .fetch_optional(&self.pool)
        .await
        .map_err(backend)?;

        let Some(row) = row else {
            return Ok(None);
        };

        let stored_password = row.get::<String, _>("password");
        if stored_password != password {
            return Ok(None);
        }

        Ok(Some(user_from_row(&row)?))
    }

    /// Most recent journal rows for one user, newest first. The id
    /// tiebreak keeps ordering stable for rows written within the same
    /// timestamp granularity.
    pub async fn list_execution_records(
        &self,
        user_id: UserId,
        limit: u32,
    ) -> Result<Vec<ExecutionRecord>, StoreError> {
        let rows = sqlx::query(
            "SELECT id, user_id, goal, youtube_url, drive_url, notion_url, result, timestamp
             FROM user_goals
             WHERE user_id = ?
             ORDER BY timestamp DESC, id DESC
             LIMIT ?",
        )
        .bind(user_id.0)
        .bind(i64::from(limit))
        .fetch_all(&self.pool)
        .await
        .map_err(backend)?;

        rows.iter().map(record_from_row).collect()
    }
}

#[async_trait]
impl AccountStore for SqlAccountStore {
    async fn get_configuration(
        &self,
        user_id: UserId,
    ) -> Result<Option<AgentConfiguration>, StoreError> {
        let row = sqlx::query(
            "SELECT user_id, google_api_key, youtube_url, drive_url, notion_url
             FROM user_config
             WHERE user_id = ?",
        )
        .bind(user_id.0)
        .fetch_optional(&self.pool)
        .await
        .map_err(backend)?;

        Ok(row.map(|row| AgentConfiguration {
            user_id: UserId(row.get::<i64, _>("user_id")),
            api_key: row.get::<String, _>("google_api_key").into(),
            youtube_url: row.get::<String, _>("youtube_url"),
            drive_url: row.get::<Option<String>, _>("drive_url"),
            notion_url: row.get::<Option<String>, _>("notion_url"),
        }))
    }

    async fn upsert_configuration(
        &self,
        user_id: UserId,
        update: ConfigurationUpdate,
    ) -> Result<(), StoreError> {
        // Whole-row replace; a previous row's optional endpoints never
        // leak into the new configuration.
        sqlx::query(
            "INSERT OR REPLACE INTO user_config
                (user_id, google_api_key, youtube_url, drive_url, notion_url, updated_at)
             VALUES (?, ?, ?, ?, ?, ?)",
        )
        .bind(user_id.0)
        .bind(update.api_key.expose_secret())
        .bind(&update.youtube_url)
        .bind(update.drive_url.as_deref())
        .bind(update.notion_url.as_deref())
        .bind(Utc::now().to_rfc3339())
        .execute(&self.pool)
        .await
        .map_err(backend)?;

        Ok(())
    }

    async fn append_execution_record(
        &self,
        user_id: UserId,
        goal: &str,
        endpoints: &EndpointSnapshot,
        result: &str,
    ) -> Result<RecordId, StoreError> {
        let inserted = sqlx::query(
            "INSERT INTO user_goals
                (user_id, goal, youtube_url, drive_url, notion_url, result, timestamp)
             VALUES (?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(user_id.0)
        .bind(goal)
        .bind(&endpoints.youtube_url)
        .bind(endpoints.drive_url.as_deref())
        .bind(endpoints.notion_url.as_deref())
        .bind(result)
        .bind(Utc::now().to_rfc3339())
        .execute(&self.pool)
        .await
        .map_err(backend)?;

        Ok(RecordId(inserted.last_insert_rowid()))
    }
}

fn user_from_row(row: &SqliteRow) -> Result<User, StoreError> {
    Ok(User {
        id: UserId(row.get::<i64, _>("id")),
        username: row.get::<String, _>("username"),
        created_at: parse_timestamp(&row.get::<String, _>("created_at"))?,
    })
}

fn record_from_row(row: &SqliteRow) -> Result<ExecutionRecord, StoreError> {
    Ok(ExecutionRecord {
        id: RecordId(row.get::<i64, _>("id")),
        user_id: UserId(row.get::<i64, _>("user_id")),
        goal: row.get::<String, _>("goal"),
        endpoints: EndpointSnapshot {
            youtube_url: row.get::<String, _>("youtube_url"),
            drive_url: row.get::<Option<String>, _>("drive_url"),
            notion_url: row.get::<Option<String>, _>("notion_url"),
        },
        result: row.get::<Option<String>, _>("result"),
        timestamp: parse_timestamp(&row.get::<String, _>("timestamp"))?,
    })
}

fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>, StoreError> {
    DateTime::parse_from_rfc3339(raw)
        .map(|value| value.with_timezone(&Utc))
        .map_err(|error| StoreError::Backend(format!("invalid stored timestamp `{raw}`: {error}")))
}

fn backend(error: sqlx::Error) -> StoreError {
    StoreError::Backend(error.to_string())
}

fn map_insert_error(error: sqlx::Error) -> StoreError {
    match &error {
        sqlx::Error::Database(db_error) if db_error.is_unique_violation() => {
            StoreError::DuplicateUsername
        }
        _ => backend(error),
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use async_trait::async_trait;
    use secrecy::ExposeSecret;

    use goalrunner_core::domain::configuration::ConfigurationForm;
    use goalrunner_core::errors::{AgentError, StoreError};
    use goalrunner_core::pipeline::{
        AccountStore, AgentMessage, AgentReply, AgentRun, GoalAgent, GoalPipeline, PipelineOutcome,
    };

    use super::SqlAccountStore;
    use crate::connect_with_settings;
    use crate::migrations::run_pending;

    struct CannedAgent {
        reply: Vec<&'static str>,
    }

    #[async_trait]
    impl GoalAgent for CannedAgent {
        async fn run_goal(&self, _run: &AgentRun) -> Result<AgentReply, AgentError> {
            Ok(AgentReply {
                messages: self
                    .reply
                    .iter()
                    .map(|content| AgentMessage { content: content.to_string() })
                    .collect(),
            })
        }
    }

    async fn store() -> SqlAccountStore {
        let pool = connect_with_settings("sqlite::memory:", 1, 30).await.expect("connect");
        run_pending(&pool).await.expect("run migrations");
        SqlAccountStore::new(pool)
    }

    fn full_form() -> ConfigurationForm {
        ConfigurationForm {
            api_key: "AIza-store-test".to_string(),
            youtube_url: "example.com/youtube".to_string(),
            drive_enabled: true,
            drive_url: "example.com/drive".to_string(),
            notion_enabled: true,
            notion_url: "example.com/notion".to_string(),
        }
    }

    #[tokio::test]
    async fn duplicate_username_is_reported_as_such() {
        let store = store().await;

        store.create_user("frodo", "pw1").await.expect("first user");
        let error = store.create_user("frodo", "pw2").await.expect_err("duplicate");

        assert_eq!(error, StoreError::DuplicateUsername);
    }

    #[tokio::test]
    async fn login_rejects_unknown_user_and_wrong_password_identically() {
        let store = store().await;
        store.create_user("sam", "correct").await.expect("create");

        let unknown = store.verify_login("nobody", "correct").await.expect("query");
        let wrong = store.verify_login("sam", "incorrect").await.expect("query");
        let right = store.verify_login("sam", "correct").await.expect("query");

        assert!(unknown.is_none());
        assert!(wrong.is_none());
        assert_eq!(right.expect("logged in").username, "sam");
    }

    #[tokio::test]
    async fn configuration_is_absent_until_first_save() {
        let store = store().await;
        let user = store.create_user("merry", "pw").await.expect("create");

        let configuration = store.get_configuration(user.id).await.expect("query");

        assert!(configuration.is_none());
    }

    #[tokio::test]
    async fn upsert_stores_normalized_urls_and_null_optionals() {
        let store = store().await;
        let user = store.create_user("pippin", "pw").await.expect("create");

        let update = ConfigurationForm { notion_enabled: false, ..full_form() }
            .into_update()
            .expect("valid form");
        store.upsert_configuration(user.id, update).await.expect("upsert");

        let configuration =
            store.get_configuration(user.id).await.expect("query").expect("configured");
        assert_eq!(configuration.api_key.expose_secret(), "AIza-store-test");
        assert_eq!(configuration.youtube_url, "https://example.com/youtube");
        assert_eq!(configuration.drive_url.as_deref(), Some("https://example.com/drive"));
        assert_eq!(configuration.notion_url, None);
    }

    #[tokio::test]
    async fn second_upsert_replaces_the_whole_row() {
        let store = store().await;
        let user = store.create_user("bilbo", "pw").await.expect("create");

        store
            .upsert_configuration(user.id, full_form().into_update().expect("valid"))
            .await
            .expect("first upsert");

        let replacement = ConfigurationForm {
            api_key: "rotated".to_string(),
            youtube_url: "other.example.com".to_string(),
            drive_enabled: false,
            notion_enabled: false,
            ..ConfigurationForm::default()
        }
        .into_update()
        .expect("valid");
        store.upsert_configuration(user.id, replacement).await.expect("second upsert");

        let configuration =
            store.get_configuration(user.id).await.expect("query").expect("configured");
        assert_eq!(configuration.api_key.expose_secret(), "rotated");
        assert_eq!(configuration.youtube_url, "https://other.example.com");
        assert_eq!(configuration.drive_url, None, "old drive endpoint must not survive");
        assert_eq!(configuration.notion_url, None);
    }

    #[tokio::test]
    async fn journal_lists_newest_first_with_store_assigned_timestamps() {
        let store = store().await;
        let user = store.create_user("gandalf", "pw").await.expect("create");
        let update = full_form().into_update().expect("valid");
        let snapshot_source = goalrunner_core::domain::configuration::AgentConfiguration {
            user_id: user.id,
            api_key: update.api_key.clone(),
            youtube_url: update.youtube_url.clone(),
            drive_url: update.drive_url.clone(),
            notion_url: update.notion_url.clone(),
        };
        let snapshot = snapshot_source.endpoint_snapshot();

        let first = store
            .append_execution_record(user.id, "first goal", &snapshot, "result one")
            .await
            .expect("append");
        let second = store
            .append_execution_record(user.id, "second goal", &snapshot, "result two")
            .await
            .expect("append");
        assert!(second.0 > first.0);

        let records = store.list_execution_records(user.id, 10).await.expect("list");
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].goal, "second goal");
        assert_eq!(records[1].goal, "first goal");
        assert!(records[0].timestamp >= records[1].timestamp);

        let limited = store.list_execution_records(user.id, 1).await.expect("list");
        assert_eq!(limited.len(), 1);
        assert_eq!(limited[0].goal, "second goal");
    }

    #[tokio::test]
    async fn journal_rows_are_scoped_per_user() {
        let store = store().await;
        let alice = store.create_user("alice", "pw").await.expect("create");
        let bob = store.create_user("bob", "pw").await.expect("create");
        let snapshot = goalrunner_core::domain::configuration::EndpointSnapshot {
            youtube_url: "https://example.com/youtube".to_string(),
            drive_url: None,
            notion_url: None,
        };

        store
            .append_execution_record(alice.id, "alice goal", &snapshot, "a")
            .await
            .expect("append");

        let alice_records = store.list_execution_records(alice.id, 10).await.expect("list");
        let bob_records = store.list_execution_records(bob.id, 10).await.expect("list");
        assert_eq!(alice_records.len(), 1);
        assert!(bob_records.is_empty());
    }

    #[tokio::test]
    async fn pipeline_journal_snapshot_survives_configuration_edits() {
        let store = Arc::new(store().await);
        let user = store.create_user("aragorn", "pw").await.expect("create");
        let agent = Arc::new(CannedAgent { reply: vec!["uploaded", "tagged"] });
        let pipeline = GoalPipeline::new(store.clone(), agent);

        pipeline.save_configuration(user.id, full_form()).await.expect("save");
        let outcome = pipeline.submit_goal(user.id, "publish the weekly video").await;
        assert_eq!(
            outcome,
            PipelineOutcome::Success { result_text: "uploaded\ntagged".to_string() }
        );

        // Rotating the endpoints afterwards must not rewrite history.
        let rotated = ConfigurationForm {
            youtube_url: "rotated.example.com".to_string(),
            drive_enabled: false,
            notion_enabled: false,
            ..full_form()
        };
        pipeline.save_configuration(user.id, rotated).await.expect("rotate");

        let records = store.list_execution_records(user.id, 10).await.expect("list");
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].goal, "publish the weekly video");
        assert_eq!(records[0].endpoints.youtube_url, "https://example.com/youtube");
        assert_eq!(records[0].endpoints.drive_url.as_deref(), Some("https://example.com/drive"));
        assert_eq!(records[0].result.as_deref(), Some("uploaded\ntagged"));
    }

    #[tokio::test]
    async fn unconfigured_pipeline_submission_writes_nothing() {
        let store = Arc::new(store().await);
        let user = store.create_user("boromir", "pw").await.expect("create");
        let agent = Arc::new(CannedAgent { reply: vec!["unused"] });
        let pipeline = GoalPipeline::new(store.clone(), agent);

        let outcome = pipeline.submit_goal(user.id, "do anything").await;

        assert_eq!(outcome, PipelineOutcome::NeedsConfiguration);
        assert!(store.list_execution_records(user.id, 10).await.expect("list").is_empty());
    }

    #[tokio::test]
    async fn foreign_user_ids_are_isolated_for_configuration() {
        let store = store().await;
        let alice = store.create_user("galadriel", "pw").await.expect("create");
        let bob = store.create_user("celeborn", "pw").await.expect("create");

        store
            .upsert_configuration(alice.id, full_form().into_update().expect("valid"))
            .await
            .expect("upsert");

        assert!(store.get_configuration(bob.id).await.expect("query").is_none());
        assert!(store.get_configuration(alice.id).await.expect("query").is_some());
    }
}
