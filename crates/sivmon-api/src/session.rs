// Explicit session context
//
// The bearer token and the acting user travel together in a cheaply
// cloneable handle that is passed into every client and controller.
// Invalidation (on 401/403) is broadcast through a watch channel so a
// single global handler can force a re-login.

use std::sync::Arc;

use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tracing::warn;

use crate::models::Role;

/// The user the session acts as.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionUser {
    pub id: u64,
    pub username: String,
    pub role: Role,
}

/// Observable session state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionState {
    Active,
    Invalidated { reason: String },
}

/// Shared, explicitly threaded session.
///
/// Clones share the same token and state; invalidating one invalidates all.
#[derive(Clone)]
pub struct SessionContext {
    inner: Arc<SessionInner>,
}

struct SessionInner {
    token: SecretString,
    user: SessionUser,
    state: watch::Sender<SessionState>,
}

impl std::fmt::Debug for SessionContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionContext")
            .field("user", &self.inner.user)
            .field("state", &*self.inner.state.borrow())
            .finish_non_exhaustive()
    }
}

impl SessionContext {
    pub fn new(token: SecretString, user: SessionUser) -> Self {
        let (state, _) = watch::channel(SessionState::Active);
        Self {
            inner: Arc::new(SessionInner { token, user, state }),
        }
    }

    pub fn user(&self) -> &SessionUser {
        &self.inner.user
    }

    pub fn is_active(&self) -> bool {
        *self.inner.state.borrow() == SessionState::Active
    }

    /// `Authorization` header value, or `None` once invalidated.
    pub(crate) fn bearer(&self) -> Option<String> {
        self.is_active()
            .then(|| format!("Bearer {}", self.inner.token.expose_secret()))
    }

    /// Tear the session down. Idempotent: the first reason wins.
    pub fn invalidate(&self, reason: impl Into<String>) {
        let reason = reason.into();
        let changed = self.inner.state.send_if_modified(|state| {
            if *state == SessionState::Active {
                *state = SessionState::Invalidated {
                    reason: reason.clone(),
                };
                true
            } else {
                false
            }
        });
        if changed {
            warn!(user = %self.inner.user.username, %reason, "session invalidated");
        }
    }

    /// Subscribe to session state changes.
    pub fn subscribe(&self) -> watch::Receiver<SessionState> {
        self.inner.state.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn session() -> SessionContext {
        SessionContext::new(
            SecretString::from("tok".to_owned()),
            SessionUser {
                id: 7,
                username: "ana".into(),
                role: Role::Operator,
            },
        )
    }

    #[test]
    fn bearer_is_withheld_after_invalidation() {
        let s = session();
        assert_eq!(s.bearer().as_deref(), Some("Bearer tok"));
        s.invalidate("401");
        assert!(s.bearer().is_none());
        assert!(!s.is_active());
    }

    #[test]
    fn first_invalidation_reason_is_kept() {
        let s = session();
        let rx = s.subscribe();
        s.clone().invalidate("first");
        s.invalidate("second");
        assert_eq!(
            *rx.borrow(),
            SessionState::Invalidated {
                reason: "first".into()
            }
        );
    }
}
