//! Authenticated session context handed to the engine at construction.
//!
//! Credentials are issued elsewhere. The engine only reads the bearer token
//! and the signed-in user's identity, and revokes the session when the
//! server rejects it.

use std::fmt;
use std::sync::Arc;

use tokio::sync::watch;

#[derive(Clone)]
pub struct Session {
    inner: Arc<SessionInner>,
}

struct SessionInner {
    token: String,
    user: String,
    revoked: watch::Sender<bool>,
}

impl Session {
    pub fn new(token: impl Into<String>, user: impl Into<String>) -> Self {
        let (revoked, _) = watch::channel(false);
        Self {
            inner: Arc::new(SessionInner {
                token: token.into(),
                user: user.into(),
                revoked,
            }),
        }
    }

    pub fn token(&self) -> &str {
        &self.inner.token
    }

    /// Identity of the signed-in user (the `creator` of notes they make).
    pub fn user(&self) -> &str {
        &self.inner.user
    }

    /// `Authorization` header value.
    pub fn bearer(&self) -> String {
        format!("Bearer {}", self.inner.token)
    }

    /// Invalidate the session. Idempotent; every clone observes it.
    pub fn revoke(&self) {
        self.inner.revoked.send_replace(true);
    }

    pub fn is_revoked(&self) -> bool {
        *self.inner.revoked.borrow()
    }

    /// Resolves once the session is revoked.
    pub async fn revoked(&self) {
        let mut rx = self.inner.revoked.subscribe();
        // The sender lives in `inner`, which `self` keeps alive.
        let _ = rx.wait_for(|revoked| *revoked).await;
    }
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("user", &self.inner.user)
            .field("token", &"[redacted]")
            .field("revoked", &self.is_revoked())
            .finish()
    }
}
