use std::fmt;
use std::sync::Arc;

use medicinna_types::Role;
use serde::Deserialize;
use tokio::sync::RwLock;

/// Logged-in user, as returned by `/auth/login`
#[derive(Clone, PartialEq, Deserialize)]
pub struct Session {
    pub token: String,
    #[serde(default)]
    pub role: Role,
    pub username: String,
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("token", &"<redacted>")
            .field("role", &self.role)
            .field("username", &self.username)
            .finish()
    }
}

/// Shared handle to the current session.
///
/// Starts empty; `begin` on login, `end` on logout.
#[derive(Clone, Default)]
pub struct SessionContext {
    inner: Arc<RwLock<Option<Session>>>,
}

impl SessionContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn begin(&self, session: Session) {
        tracing::info!("Session started for {} ({:?})", session.username, session.role);
        *self.inner.write().await = Some(session);
    }

    /// Tear down the session, returning what was there
    pub async fn end(&self) -> Option<Session> {
        let previous = self.inner.write().await.take();
        if let Some(session) = &previous {
            tracing::info!("Session ended for {}", session.username);
        }
        previous
    }

    pub async fn current(&self) -> Option<Session> {
        self.inner.read().await.clone()
    }

    pub async fn bearer(&self) -> Option<String> {
        self.inner
            .read()
            .await
            .as_ref()
            .map(|session| format!("Bearer {}", session.token))
    }

    pub async fn is_active(&self) -> bool {
        self.inner.read().await.is_some()
    }
}
