use serde::Serialize;

pub use sivmon_api::{Role, SessionUser};

/// Directory entry from `GET /api/users/`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct User {
    pub id: u64,
    pub username: String,
    pub role: Role,
}

impl From<sivmon_api::UserRecord> for User {
    fn from(rec: sivmon_api::UserRecord) -> Self {
        Self {
            id: rec.id,
            username: rec.username,
            role: rec.role,
        }
    }
}

/// Roles that see every incident regardless of status.
pub fn sees_all_incidents(role: &Role) -> bool {
    matches!(role, Role::Admin | Role::Supervisor)
}
