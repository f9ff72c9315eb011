use thiserror::Error;

/// Top-level error type for the `sivmon-api` crate.
///
/// Covers transport, authentication, HTTP status, and decoding failures.
/// `sivmon-core` maps these into its own taxonomy (network, auth,
/// conflict, ...) and into per-camera error snapshots.
#[derive(Debug, Error)]
pub enum Error {
    // ── Authentication ──────────────────────────────────────────────
    /// The backend answered 401/403. The session has been invalidated.
    #[error("Unauthorized (HTTP {status}) -- session invalidated, re-login required")]
    Unauthorized { status: u16 },

    /// The session was already invalidated; no request was sent.
    #[error("Session invalidated -- re-login required")]
    SessionInvalidated,

    // ── Transport ───────────────────────────────────────────────────
    /// HTTP transport error (connection refused, DNS failure, etc.)
    #[error("HTTP transport error: {0}")]
    Transport(#[from] reqwest::Error),

    /// URL parsing error.
    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    /// Request timed out.
    #[error("Request timed out after {timeout_ms}ms")]
    Timeout { timeout_ms: u64 },

    /// TLS or client construction error.
    #[error("TLS error: {0}")]
    Tls(String),

    // ── HTTP ────────────────────────────────────────────────────────
    /// Non-success status other than 401/403.
    #[error("Backend error (HTTP {status}): {message}")]
    Http { status: u16, message: String },

    // ── Data ────────────────────────────────────────────────────────
    /// JSON deserialization failed, with the raw body for debugging.
    #[error("Deserialization error: {message}")]
    Deserialization { message: String, body: String },
}

impl Error {
    /// Returns `true` if this error ends the current session.
    pub fn is_auth_failure(&self) -> bool {
        matches!(self, Self::Unauthorized { .. } | Self::SessionInvalidated)
    }

    /// Returns `true` if this is a "not found" error.
    pub fn is_not_found(&self) -> bool {
        match self {
            Self::Transport(e) => e.status() == Some(reqwest::StatusCode::NOT_FOUND),
            Self::Http { status: 404, .. } => true,
            _ => false,
        }
    }
}
