//! Cookie sessions and the request extractors built on them.

use super::{
    AppContext,
    auth::{Role, UserRecord, to_hex},
    error::ApiError,
};
use axum::{
    extract::FromRequestParts,
    http::{HeaderMap, header, request::Parts},
};
use rand::Rng;
use std::{
    collections::HashMap,
    sync::{Arc, Mutex, PoisonError},
    time::{Duration, Instant},
};

pub const COOKIE: &str = "oradba_session";

#[derive(Debug, Clone)]
pub struct Session {
    pub username: String,
    pub role: Role,
    pub must_change_password: bool,
    last_seen: Instant,
}

/// In-memory sessions keyed by a random id, expired after `timeout` idle.
#[derive(Debug)]
pub struct SessionStore {
    timeout: Duration,
    sessions: Mutex<HashMap<String, Session>>,
}

impl SessionStore {
    #[must_use]
    pub fn new(timeout: Duration) -> Self {
        Self {
            timeout,
            sessions: Mutex::new(HashMap::new()),
        }
    }

    fn sessions(&self) -> std::sync::MutexGuard<'_, HashMap<String, Session>> {
        self.sessions.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Start a session for `user` and return its id.
    #[must_use]
    pub fn create(&self, user: &UserRecord) -> String {
        let mut bytes = [0u8; 32];
        rand::rng().fill(&mut bytes);
        let id = to_hex(&bytes);

        let mut sessions = self.sessions();
        let timeout = self.timeout;
        sessions.retain(|_, session| session.last_seen.elapsed() < timeout);
        sessions.insert(
            id.clone(),
            Session {
                username: user.username.clone(),
                role: user.role,
                must_change_password: user.must_change_password,
                last_seen: Instant::now(),
            },
        );
        id
    }

    /// Look up a live session and refresh its idle timer.
    #[must_use]
    pub fn touch(&self, id: &str) -> Option<Session> {
        let mut sessions = self.sessions();
        let expired = sessions
            .get(id)
            .is_some_and(|session| session.last_seen.elapsed() >= self.timeout);
        if expired {
            sessions.remove(id);
            return None;
        }
        sessions.get_mut(id).map(|session| {
            session.last_seen = Instant::now();
            session.clone()
        })
    }

    pub fn remove(&self, id: &str) {
        self.sessions().remove(id);
    }

    pub fn password_changed(&self, id: &str) {
        if let Some(session) = self.sessions().get_mut(id) {
            session.must_change_password = false;
        }
    }
}

#[must_use]
pub fn set_cookie(id: &str) -> String {
    format!("{COOKIE}={id}; HttpOnly; SameSite=Strict; Path=/")
}

#[must_use]
pub fn clear_cookie() -> String {
    format!("{COOKIE}=; HttpOnly; SameSite=Strict; Path=/; Max-Age=0")
}

/// Session id from the `Cookie` header.
#[must_use]
pub fn session_id(headers: &HeaderMap) -> Option<String> {
    headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(name, _)| *name == COOKIE)
        .map(|(_, id)| id.to_string())
        .filter(|id| !id.is_empty())
}

/// Any logged-in user, including one who still has to change the password.
#[derive(Debug, Clone)]
pub struct SessionUser {
    pub session_id: String,
    pub username: String,
    pub role: Role,
    pub must_change_password: bool,
}

impl FromRequestParts<Arc<AppContext>> for SessionUser {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppContext>,
    ) -> Result<Self, Self::Rejection> {
        let id = session_id(&parts.headers).ok_or(ApiError::Unauthorized)?;
        let session = state.sessions.touch(&id).ok_or(ApiError::Unauthorized)?;
        Ok(Self {
            session_id: id,
            username: session.username,
            role: session.role,
            must_change_password: session.must_change_password,
        })
    }
}

/// Logged-in user with a settled password.
#[derive(Debug, Clone)]
pub struct CurrentUser {
    pub username: String,
    pub role: Role,
}

impl FromRequestParts<Arc<AppContext>> for CurrentUser {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppContext>,
    ) -> Result<Self, Self::Rejection> {
        let user = SessionUser::from_request_parts(parts, state).await?;
        if user.must_change_password {
            return Err(ApiError::Forbidden("Password change required"));
        }
        Ok(Self {
            username: user.username,
            role: user.role,
        })
    }
}

#[derive(Debug, Clone)]
pub struct AdminUser {
    pub username: String,
}

impl FromRequestParts<Arc<AppContext>> for AdminUser {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppContext>,
    ) -> Result<Self, Self::Rejection> {
        let user = CurrentUser::from_request_parts(parts, state).await?;
        if user.role != Role::Admin {
            return Err(ApiError::Forbidden("Admin privileges required"));
        }
        Ok(Self {
            username: user.username,
        })
    }
}
