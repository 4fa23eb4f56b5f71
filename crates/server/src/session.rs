//! In-memory browser sessions keyed by an opaque cookie token.
//!
//! Sessions do not survive a restart; a restarted server simply asks the
//! user to log in again.

use std::collections::HashMap;
use std::sync::Arc;

use axum::http::header::COOKIE;
use axum::http::HeaderMap;
use tokio::sync::RwLock;
use uuid::Uuid;

use goalrunner_core::domain::user::User;

pub const SESSION_COOKIE: &str = "sid";

#[derive(Clone, Default)]
pub struct Sessions {
    inner: Arc<RwLock<HashMap<String, User>>>,
}

impl Sessions {
    pub async fn create(&self, user: User) -> String {
        let token = Uuid::new_v4().simple().to_string();
        self.inner.write().await.insert(token.clone(), user);
        token
    }

    pub async fn resolve(&self, headers: &HeaderMap) -> Option<User> {
        let token = cookie_token(headers)?;
        self.inner.read().await.get(&token).cloned()
    }

    pub async fn revoke(&self, headers: &HeaderMap) {
        if let Some(token) = cookie_token(headers) {
            self.inner.write().await.remove(&token);
        }
    }
}

pub fn login_cookie(token: &str) -> String {
    format!("{SESSION_COOKIE}={token}; Path=/; HttpOnly; SameSite=Lax")
}

pub fn logout_cookie() -> String {
    format!("{SESSION_COOKIE}=; Path=/; HttpOnly; SameSite=Lax; Max-Age=0")
}

fn cookie_token(headers: &HeaderMap) -> Option<String> {
    let raw = headers.get(COOKIE)?.to_str().ok()?;
    raw.split(';').find_map(|pair| {
        let (name, value) = pair.trim().split_once('=')?;
        if name == SESSION_COOKIE && !value.is_empty() {
            Some(value.to_string())
        } else {
            None
        }
    })
}
