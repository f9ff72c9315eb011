// Wire models for the SIV backend.
//
// These mirror the JSON the backend emits, including its quirks:
// naive timestamps without an offset, `pista` sent either as a list or a
// single string, and `cerrado_por_id` vs `close_by_id` naming drift.
// `sivmon-core` converts them into domain types.

use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};

// ── Cameras ─────────────────────────────────────────────────────────

/// `GET /camera/{id}/status`
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct CameraStatus {
    pub status: String,
}

impl CameraStatus {
    pub fn is_online(&self) -> bool {
        self.status.eq_ignore_ascii_case("online")
    }
}

/// `GET /camera/{id}/status_full`
///
/// Everything except `status` is kept as raw JSON so new detector flags
/// reach the derivation rules without a client release.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct CameraStatusFull {
    pub status: String,
    #[serde(flatten)]
    pub metrics: serde_json::Map<String, serde_json::Value>,
}

impl CameraStatusFull {
    pub fn is_online(&self) -> bool {
        self.status.eq_ignore_ascii_case("online")
    }
}

// ── Users ───────────────────────────────────────────────────────────

/// Backend role names, normalized.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum Role {
    Admin,
    Supervisor,
    Operator,
    Other(String),
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Admin => f.write_str("admin"),
            Self::Supervisor => f.write_str("supervisor"),
            Self::Operator => f.write_str("operador"),
            Self::Other(raw) => f.write_str(raw),
        }
    }
}

impl From<String> for Role {
    fn from(raw: String) -> Self {
        match raw.trim().to_lowercase().as_str() {
            "admin" | "administrador" => Self::Admin,
            "supervisor" => Self::Supervisor,
            "operador" | "operator" => Self::Operator,
            _ => Self::Other(raw),
        }
    }
}

impl From<&str> for Role {
    fn from(raw: &str) -> Self {
        Self::from(raw.to_owned())
    }
}

impl From<Role> for String {
    fn from(role: Role) -> Self {
        role.to_string()
    }
}

/// `GET /api/users/` entry.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct UserRecord {
    pub id: u64,
    pub username: String,
    pub role: Role,
}

// ── Incidents ───────────────────────────────────────────────────────

/// `GET /api/incidentes/` entry and the body returned by every write.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct IncidentRecord {
    pub id: u64,
    #[serde(rename = "type")]
    pub kind: String,
    pub priority: String,
    pub status: String,
    #[serde(default)]
    pub camera: Option<String>,
    #[serde(default)]
    pub sector: Option<String>,
    #[serde(default, deserialize_with = "string_or_list")]
    pub pista: Vec<String>,
    #[serde(default, deserialize_with = "string_or_list")]
    pub trabajos_via: Vec<String>,
    #[serde(default)]
    pub observacion: Option<String>,
    #[serde(default)]
    pub ubicacion_via: Option<String>,
    #[serde(default)]
    pub senalizacion: Option<String>,
    #[serde(default)]
    pub start_date: Option<NaiveDate>,
    #[serde(default, deserialize_with = "flex::option_time")]
    pub start_time: Option<NaiveTime>,
    #[serde(default)]
    pub end_date: Option<NaiveDate>,
    #[serde(default, deserialize_with = "flex::option_time")]
    pub end_time: Option<NaiveTime>,
    #[serde(default, deserialize_with = "flex::option_datetime")]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub created_by_id: Option<u64>,
    #[serde(default, alias = "cerrado_por_id")]
    pub close_by_id: Option<u64>,
    #[serde(default, deserialize_with = "flex::option_datetime")]
    pub closed_at: Option<DateTime<Utc>>,
}

/// Body of `POST /api/incidentes/` and `PUT /api/incidentes/{id}/`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct IncidentPayload {
    #[serde(rename = "type", skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub priority: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub camera: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sector: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pista: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub trabajos_via: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub observacion: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ubicacion_via: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub senalizacion: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub start_date: Option<NaiveDate>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub start_time: Option<NaiveTime>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub end_date: Option<NaiveDate>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub end_time: Option<NaiveTime>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub created_by_id: Option<u64>,
}

/// Body of `PATCH /api/incidentes/cerrar/{id}/`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ClosePayload {
    pub close_by_id: u64,
    pub end_date: NaiveDate,
    pub end_time: NaiveTime,
}

// ── Lenient decoding helpers ────────────────────────────────────────

#[derive(Deserialize)]
#[serde(untagged)]
enum StringOrList {
    List(Vec<String>),
    One(String),
}

fn string_or_list<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Option::<StringOrList>::deserialize(deserializer)?;
    Ok(match raw {
        None => Vec::new(),
        Some(StringOrList::List(items)) => items,
        Some(StringOrList::One(joined)) => joined
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_owned)
            .collect(),
    })
}

mod flex {
    use chrono::{DateTime, NaiveDateTime, NaiveTime, Utc};
    use serde::{Deserialize, Deserializer};

    /// RFC 3339, or a naive `YYYY-MM-DDTHH:MM:SS[.f]` read as UTC.
    pub(super) fn option_datetime<'de, D>(
        deserializer: D,
    ) -> Result<Option<DateTime<Utc>>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let Some(raw) = Option::<String>::deserialize(deserializer)? else {
            return Ok(None);
        };
        if let Ok(dt) = DateTime::parse_from_rfc3339(&raw) {
            return Ok(Some(dt.with_timezone(&Utc)));
        }
        NaiveDateTime::parse_from_str(&raw, "%Y-%m-%dT%H:%M:%S%.f")
            .or_else(|_| NaiveDateTime::parse_from_str(&raw, "%Y-%m-%d %H:%M:%S%.f"))
            .map(|naive| Some(naive.and_utc()))
            .map_err(serde::de::Error::custom)
    }

    /// `HH:MM` or `HH:MM:SS[.f]`.
    pub(super) fn option_time<'de, D>(deserializer: D) -> Result<Option<NaiveTime>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let Some(raw) = Option::<String>::deserialize(deserializer)? else {
            return Ok(None);
        };
        NaiveTime::parse_from_str(&raw, "%H:%M:%S%.f")
            .or_else(|_| NaiveTime::parse_from_str(&raw, "%H:%M"))
            .map(Some)
            .map_err(serde::de::Error::custom)
    }
}
