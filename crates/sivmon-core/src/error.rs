// ── Core error types ──
//
// User-facing errors from sivmon-core. Consumers never see reqwest or
// serde failures directly: the `From<sivmon_api::Error>` impl folds
// transport-layer errors into the monitoring taxonomy.

use thiserror::Error;

/// Unified error type for the core crate.
#[derive(Debug, Error)]
pub enum CoreError {
    // ── Transport ────────────────────────────────────────────────────
    /// Transient failure reaching the backend.
    #[error("Network error: {message}")]
    Network { message: String },

    /// 401/403 or an already-invalidated session. Forces a re-login.
    #[error("Authentication failed: {message}")]
    Auth { message: String },

    // ── Incident commands ────────────────────────────────────────────
    /// Required fields missing; nothing was sent.
    #[error("Validation failed, missing: {}", fields.join(", "))]
    Validation { fields: Vec<String> },

    /// The target incident is already closed.
    #[error("Incident {incident_id} is closed and can no longer change")]
    StaleState { incident_id: u64 },

    /// The backend rejected an optimistic update; local state was rolled back.
    #[error("Backend rejected the change to incident {incident_id}: {message}")]
    Conflict { incident_id: u64, message: String },

    // ── Lookup ───────────────────────────────────────────────────────
    #[error("Not found: {entity} {identifier}")]
    NotFound { entity: String, identifier: String },

    // ── Configuration ────────────────────────────────────────────────
    #[error("Configuration error: {message}")]
    Config { message: String },

    // ── Internal ─────────────────────────────────────────────────────
    #[error("Internal error: {0}")]
    Internal(String),
}

impl CoreError {
    pub fn is_auth(&self) -> bool {
        matches!(self, Self::Auth { .. })
    }

    pub(crate) fn not_found(entity: &str, identifier: impl ToString) -> Self {
        Self::NotFound {
            entity: entity.to_owned(),
            identifier: identifier.to_string(),
        }
    }
}

// ── Conversion from transport-layer errors ───────────────────────────

impl From<sivmon_api::Error> for CoreError {
    fn from(err: sivmon_api::Error) -> Self {
        use sivmon_api::Error as E;
        if err.is_auth_failure() {
            return Self::Auth {
                message: err.to_string(),
            };
        }
        if err.is_not_found() {
            let identifier = match err {
                E::Http { message, .. } => message,
                other => other.to_string(),
            };
            return Self::NotFound {
                entity: "resource".into(),
                identifier,
            };
        }
        match err {
            E::Http { status, message } => Self::Network {
                message: format!("HTTP {status}: {message}"),
            },
            E::InvalidUrl(e) => Self::Config {
                message: format!("Invalid URL: {e}"),
            },
            E::Deserialization { message, body: _ } => {
                Self::Internal(format!("Deserialization error: {message}"))
            }
            other => Self::Network {
                message: other.to_string(),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unauthorized_maps_to_auth() {
        let err = CoreError::from(sivmon_api::Error::Unauthorized { status: 401 });
        assert!(err.is_auth());
        assert!(CoreError::from(sivmon_api::Error::SessionInvalidated).is_auth());
    }

    #[test]
    fn missing_resource_maps_to_not_found() {
        let err = CoreError::from(sivmon_api::Error::Http {
            status: 404,
            message: "Cámara no encontrada".into(),
        });
        match err {
            CoreError::NotFound { identifier, .. } => assert_eq!(identifier, "Cámara no encontrada"),
            other => panic!("expected NotFound, got: {other:?}"),
        }
        assert!(matches!(
            CoreError::from(sivmon_api::Error::Http {
                status: 503,
                message: "busy".into(),
            }),
            CoreError::Network { .. }
        ));
    }

    #[test]
    fn validation_lists_fields() {
        let err = CoreError::Validation {
            fields: vec!["type".into(), "camera".into()],
        };
        assert_eq!(err.to_string(), "Validation failed, missing: type, camera");
    }
}
