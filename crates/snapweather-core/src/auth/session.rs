use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

/// Opaque bearer token issued by `/account/security/token`.
///
/// The contents are never inspected. `Debug` is redacted so tokens do not end
/// up in logs.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Token(String);

impl Token {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_inner(self) -> String {
        self.0
    }
}

impl fmt::Debug for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Token(<{} bytes>)", self.0.len())
    }
}

impl From<String> for Token {
    fn from(value: String) -> Self {
        Self(value)
    }
}

/// What the client currently knows about the signed-in user.
///
/// A present token only means "possibly authenticated": it is confirmed by the
/// next successful authenticated call, and dropped on the first 401/403.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "ts", derive(ts_rs::TS), ts(export))]
pub struct Session {
    #[serde(skip)]
    #[cfg_attr(feature = "ts", ts(skip))]
    pub token: Option<Token>,
    pub email: Option<String>,
    pub username: Option<String>,
}

impl Session {
    pub fn with_token(token: Token) -> Self {
        Self {
            token: Some(token),
            ..Self::default()
        }
    }

    pub fn has_token(&self) -> bool {
        self.token.is_some()
    }

    /// The user is signed in but has not picked a username yet
    pub fn needs_username(&self) -> bool {
        self.has_token() && self.username.is_none()
    }
}

/// Shared in-memory session.
///
/// Single writer (login, logout, teardown), many readers (every request reads
/// the token once before it is sent). Writes replace the token as a whole value.
/// Clone is cheap and every clone sees the same session.
#[derive(Clone, Default)]
pub struct SessionCell(Arc<RwLock<Session>>);

impl SessionCell {
    pub fn new(session: Session) -> Self {
        Self(Arc::new(RwLock::new(session)))
    }

    pub async fn snapshot(&self) -> Session {
        self.0.read().await.clone()
    }

    pub async fn token(&self) -> Option<Token> {
        self.0.read().await.token.clone()
    }

    /// Run `f` under the write lock.
    ///
    /// Anything that must change together with the session (the persisted
    /// token) belongs inside `f`.
    pub async fn update<R>(&self, f: impl FnOnce(&mut Session) -> R) -> R {
        let mut guard = self.0.write().await;
        f(&mut *guard)
    }

    /// Run `f` only if the session still holds `token`.
    ///
    /// Returns `None` when a logout or newer login replaced it.
    pub async fn update_if_token<R>(
        &self,
        token: &Token,
        f: impl FnOnce(&mut Session) -> R,
    ) -> Option<R> {
        let mut guard = self.0.write().await;
        if guard.token.as_ref() == Some(token) {
            Some(f(&mut *guard))
        } else {
            None
        }
    }
}
