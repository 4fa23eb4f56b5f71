//! Browser-facing routes: account signup and login, agent configuration,
//! goal submission, and the execution history dashboard.
//!
//! Endpoints:
//! - `GET  /`            — landing page (redirects to dashboard when logged in)
//! - `GET  /register` / `POST /register` — account creation
//! - `GET  /login`    / `POST /login`    — login; redirect is gated on configuration
//! - `GET  /logout`      — drop the session
//! - `GET  /dashboard`   — goal form plus recent execution history
//! - `GET  /config`   / `POST /config`   — view and replace the agent configuration
//! - `POST /generate`    — run one goal through the pipeline
//! - `GET  /help`        — setup instructions

use std::sync::Arc;

use axum::{
    extract::{Query, State},
    http::{header::SET_COOKIE, HeaderMap, StatusCode},
    response::{AppendHeaders, Html, IntoResponse, Redirect, Response},
    routing::{get, post},
    Form, Router,
};
use secrecy::ExposeSecret;
use serde::{Deserialize, Serialize};
use tera::{Context, Tera};
use tracing::{error, warn};

use goalrunner_core::domain::configuration::ConfigurationForm;
use goalrunner_core::domain::execution::ExecutionRecord;
use goalrunner_core::domain::user::User;
use goalrunner_core::errors::StoreError;
use goalrunner_core::pipeline::{GoalPipeline, PipelineOutcome, SaveConfigurationError};
use goalrunner_db::SqlAccountStore;

use crate::session::{self, Sessions};

const HISTORY_LIMIT: u32 = 20;
const LOGIN_FIRST: &str = "/login?notice=Please+log+in+first.";
const CONFIGURE_FIRST: &str =
    "/config?notice=Add+your+agent+configuration+to+start+running+goals.";

#[derive(Clone)]
pub struct AppState {
    store: Arc<SqlAccountStore>,
    pipeline: Arc<GoalPipeline>,
    sessions: Sessions,
    templates: Arc<Tera>,
}

#[derive(Debug, Deserialize)]
pub struct CredentialsForm {
    pub username: String,
    pub password: String,
}

#[derive(Debug, Default, Deserialize)]
pub struct ConfigFormInput {
    pub api_key: String,
    pub youtube_url: String,
    #[serde(default)]
    pub drive_enabled: Option<String>,
    #[serde(default)]
    pub drive_url: String,
    #[serde(default)]
    pub notion_enabled: Option<String>,
    #[serde(default)]
    pub notion_url: String,
}

#[derive(Debug, Deserialize)]
pub struct GoalForm {
    pub goal: String,
}

#[derive(Debug, Default, Deserialize)]
pub struct NoticeQuery {
    pub notice: Option<String>,
}

/// Row shape handed to the dashboard template.
#[derive(Debug, Serialize)]
struct RecordView {
    goal: String,
    result: String,
    timestamp: String,
    youtube_url: String,
    drive_url: Option<String>,
    notion_url: Option<String>,
}

impl From<ExecutionRecord> for RecordView {
    fn from(record: ExecutionRecord) -> Self {
        Self {
            goal: record.goal,
            result: record.result.unwrap_or_default(),
            timestamp: record.timestamp.format("%Y-%m-%d %H:%M UTC").to_string(),
            youtube_url: record.endpoints.youtube_url,
            drive_url: record.endpoints.drive_url,
            notion_url: record.endpoints.notion_url,
        }
    }
}

fn init_templates() -> Arc<Tera> {
    let mut tera = match Tera::new("templates/**/*.html") {
        Ok(t) => t,
        Err(e) => {
            warn!(error = %e, "failed to load templates from filesystem, using empty Tera instance");
            Tera::default()
        }
    };

    // Built-in fallbacks so the binary works without a templates directory.
    tera.add_raw_template("index.html", include_str!("../../../templates/index.html")).ok();
    tera.add_raw_template("register.html", include_str!("../../../templates/register.html")).ok();
    tera.add_raw_template("login.html", include_str!("../../../templates/login.html")).ok();
    tera.add_raw_template("dashboard.html", include_str!("../../../templates/dashboard.html")).ok();
    tera.add_raw_template("config.html", include_str!("../../../templates/config.html")).ok();
    tera.add_raw_template("generate.html", include_str!("../../../templates/generate.html")).ok();
    tera.add_raw_template("help.html", include_str!("../../../templates/help.html")).ok();

    Arc::new(tera)
}

pub fn router(store: Arc<SqlAccountStore>, pipeline: Arc<GoalPipeline>) -> Router {
    let state =
        AppState { store, pipeline, sessions: Sessions::default(), templates: init_templates() };

    Router::new()
        .route("/", get(index_page))
        .route("/register", get(register_page).post(register_submit))
        .route("/login", get(login_page).post(login_submit))
        .route("/logout", get(logout))
        .route("/dashboard", get(dashboard_page))
        .route("/config", get(config_page).post(config_submit))
        .route("/generate", post(generate_goal))
        .route("/help", get(help_page))
        .with_state(state)
}

fn render(state: &AppState, template: &str, context: &Context) -> Response {
    match state.templates.render(template, context) {
        Ok(body) => Html(body).into_response(),
        Err(err) => {
            error!(
                event_name = "web.template.render_failed",
                template = %template,
                error = %err,
                "template rendering failed"
            );
            (StatusCode::INTERNAL_SERVER_ERROR, Html("<h1>Internal error</h1>".to_string()))
                .into_response()
        }
    }
}

fn internal_error(err: StoreError) -> Response {
    error!(event_name = "web.store.failed", error = %err, "store operation failed");
    (StatusCode::INTERNAL_SERVER_ERROR, Html("<h1>Internal error</h1>".to_string()))
        .into_response()
}

fn base_context(notice: &NoticeQuery) -> Context {
    let mut context = Context::new();
    context.insert("notice", notice.notice.as_deref().unwrap_or(""));
    context.insert("error", "");
    context
}

async fn require_user(state: &AppState, headers: &HeaderMap) -> Result<User, Response> {
    state
        .sessions
        .resolve(headers)
        .await
        .ok_or_else(|| Redirect::to(LOGIN_FIRST).into_response())
}

async fn index_page(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(notice): Query<NoticeQuery>,
) -> Response {
    if state.sessions.resolve(&headers).await.is_some() {
        return Redirect::to("/dashboard").into_response();
    }
    render(&state, "index.html", &base_context(&notice))
}

async fn register_page(
    State(state): State<AppState>,
    Query(notice): Query<NoticeQuery>,
) -> Response {
    render(&state, "register.html", &base_context(&notice))
}

async fn register_submit(
    State(state): State<AppState>,
    Form(form): Form<CredentialsForm>,
) -> Response {
    let username = form.username.trim();
    if username.is_empty() || form.password.is_empty() {
        return register_error(&state, "Username and password must not be empty.");
    }

    match state.store.create_user(username, &form.password).await {
        Ok(user) => {
            tracing::info!(
                event_name = "web.account.created",
                user_id = %user.id,
                "account registered"
            );
            Redirect::to("/login?notice=Account+created.+Please+log+in.").into_response()
        }
        Err(StoreError::DuplicateUsername) => {
            register_error(&state, "That username is already taken.")
        }
        Err(err) => internal_error(err),
    }
}

fn register_error(state: &AppState, message: &str) -> Response {
    let mut context = base_context(&NoticeQuery::default());
    context.insert("error", message);
    render(state, "register.html", &context)
}

async fn login_page(State(state): State<AppState>, Query(notice): Query<NoticeQuery>) -> Response {
    render(&state, "login.html", &base_context(&notice))
}

async fn login_submit(
    State(state): State<AppState>,
    Form(form): Form<CredentialsForm>,
) -> Response {
    let user = match state.store.verify_login(form.username.trim(), &form.password).await {
        Ok(Some(user)) => user,
        Ok(None) => {
            let mut context = base_context(&NoticeQuery::default());
            context.insert("error", "Invalid username or password.");
            return render(&state, "login.html", &context);
        }
        Err(err) => return internal_error(err),
    };

    // The post-login destination depends on the configuration gate: an
    // unconfigured account goes straight to the configuration form.
    let destination = match state.pipeline.check_gate(user.id).await {
        Ok(decision) if decision.is_ready() => "/dashboard",
        Ok(_) => CONFIGURE_FIRST,
        Err(err) => return internal_error(err),
    };

    let token = state.sessions.create(user).await;
    (
        AppendHeaders([(SET_COOKIE, session::login_cookie(&token))]),
        Redirect::to(destination),
    )
        .into_response()
}

async fn logout(State(state): State<AppState>, headers: HeaderMap) -> Response {
    state.sessions.revoke(&headers).await;
    (AppendHeaders([(SET_COOKIE, session::logout_cookie())]), Redirect::to("/")).into_response()
}

async fn dashboard_page(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(notice): Query<NoticeQuery>,
) -> Response {
    let user = match require_user(&state, &headers).await {
        Ok(user) => user,
        Err(redirect) => return redirect,
    };

    let records = match state.store.list_execution_records(user.id, HISTORY_LIMIT).await {
        Ok(records) => records.into_iter().map(RecordView::from).collect::<Vec<_>>(),
        Err(err) => return internal_error(err),
    };

    let mut context = base_context(&notice);
    context.insert("username", &user.username);
    context.insert("records", &records);
    render(&state, "dashboard.html", &context)
}

async fn config_page(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(notice): Query<NoticeQuery>,
) -> Response {
    let user = match require_user(&state, &headers).await {
        Ok(user) => user,
        Err(redirect) => return redirect,
    };

    let mut context = base_context(&notice);
    match state.pipeline.check_gate(user.id).await {
        Ok(decision) => match decision.into_configuration() {
            Some(configuration) => {
                context.insert("api_key", configuration.api_key.expose_secret());
                context.insert("youtube_url", &configuration.youtube_url);
                context.insert("drive_enabled", &configuration.drive_url.is_some());
                context.insert("drive_url", configuration.drive_url.as_deref().unwrap_or(""));
                context.insert("notion_enabled", &configuration.notion_url.is_some());
                context.insert("notion_url", configuration.notion_url.as_deref().unwrap_or(""));
            }
            None => insert_empty_configuration(&mut context),
        },
        Err(err) => return internal_error(err),
    }
    render(&state, "config.html", &context)
}

fn insert_empty_configuration(context: &mut Context) {
    context.insert("api_key", "");
    context.insert("youtube_url", "");
    context.insert("drive_enabled", &false);
    context.insert("drive_url", "");
    context.insert("notion_enabled", &false);
    context.insert("notion_url", "");
}

async fn config_submit(
    State(state): State<AppState>,
    headers: HeaderMap,
    Form(input): Form<ConfigFormInput>,
) -> Response {
    let user = match require_user(&state, &headers).await {
        Ok(user) => user,
        Err(redirect) => return redirect,
    };

    let form = ConfigurationForm {
        api_key: input.api_key,
        youtube_url: input.youtube_url,
        drive_enabled: input.drive_enabled.is_some(),
        drive_url: input.drive_url,
        notion_enabled: input.notion_enabled.is_some(),
        notion_url: input.notion_url,
    };

    match state.pipeline.save_configuration(user.id, form.clone()).await {
        Ok(()) => Redirect::to("/dashboard?notice=Configuration+saved.").into_response(),
        Err(SaveConfigurationError::Invalid(reason)) => {
            // Re-render with the submitted values so nothing is lost.
            let mut context = base_context(&NoticeQuery::default());
            context.insert("error", &reason.to_string());
            context.insert("api_key", &form.api_key);
            context.insert("youtube_url", &form.youtube_url);
            context.insert("drive_enabled", &form.drive_enabled);
            context.insert("drive_url", &form.drive_url);
            context.insert("notion_enabled", &form.notion_enabled);
            context.insert("notion_url", &form.notion_url);
            render(&state, "config.html", &context)
        }
        Err(SaveConfigurationError::Store(err)) => internal_error(err),
    }
}

async fn generate_goal(
    State(state): State<AppState>,
    headers: HeaderMap,
    Form(form): Form<GoalForm>,
) -> Response {
    let user = match require_user(&state, &headers).await {
        Ok(user) => user,
        Err(redirect) => return redirect,
    };

    match state.pipeline.submit_goal(user.id, &form.goal).await {
        PipelineOutcome::NeedsConfiguration => Redirect::to(
            "/config?notice=Configure+your+agent+endpoints+before+running+goals.",
        )
        .into_response(),
        PipelineOutcome::Success { result_text } => {
            let mut context = base_context(&NoticeQuery::default());
            context.insert("goal", form.goal.trim());
            context.insert("result", &result_text);
            context.insert("detail", "");
            render(&state, "generate.html", &context)
        }
        PipelineOutcome::Failure { message, detail } => {
            let mut context = base_context(&NoticeQuery::default());
            context.insert("goal", form.goal.trim());
            context.insert("result", "");
            context.insert("error", &message);
            context.insert("detail", detail.as_deref().unwrap_or(""));
            render(&state, "generate.html", &context)
        }
    }
}

async fn help_page(State(state): State<AppState>) -> Response {
    render(&state, "help.html", &base_context(&NoticeQuery::default()))
}
