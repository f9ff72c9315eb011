// ── Incident domain types ──
//
// Canonical incident entity plus the two command payloads that produce
// or change one: `IncidentDraft` (create) and `IncidentEdit` (partial
// update). Conversion to and from the wire shapes lives here so the
// store never touches raw JSON.

use std::collections::BTreeSet;

use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use serde::{Deserialize, Serialize};
use strum::{Display, EnumIter, EnumString};

use sivmon_api::{IncidentPayload, IncidentRecord};

use crate::error::CoreError;

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString, EnumIter,
)]
#[strum(ascii_case_insensitive)]
pub enum Priority {
    Alta,
    Media,
    Baja,
}

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString, EnumIter,
)]
#[strum(ascii_case_insensitive)]
pub enum IncidentStatus {
    Activo,
    Cerrado,
}

/// A road incident as the operator sees it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Incident {
    pub id: u64,
    pub kind: String,
    pub priority: Priority,
    pub status: IncidentStatus,
    pub camera: Option<String>,
    pub sector: Option<String>,
    pub pista: BTreeSet<String>,
    pub trabajos_via: BTreeSet<String>,
    pub observation: Option<String>,
    pub ubicacion_via: Option<String>,
    pub senalizacion: Option<String>,
    pub start_date: Option<NaiveDate>,
    pub start_time: Option<NaiveTime>,
    pub end_date: Option<NaiveDate>,
    pub end_time: Option<NaiveTime>,
    pub created_at: Option<DateTime<Utc>>,
    pub created_by: Option<u64>,
    pub created_by_name: Option<String>,
    pub closed_at: Option<DateTime<Utc>>,
    pub closed_by: Option<u64>,
    pub closed_by_name: Option<String>,
}

impl Incident {
    pub fn is_active(&self) -> bool {
        self.status == IncidentStatus::Activo
    }

    /// Date used for range filtering: creation, else the declared start.
    pub fn reference_date(&self) -> Option<NaiveDate> {
        self.created_at
            .map(|at| at.date_naive())
            .or(self.start_date)
    }
}

impl TryFrom<IncidentRecord> for Incident {
    type Error = CoreError;

    fn try_from(rec: IncidentRecord) -> Result<Self, Self::Error> {
        let priority = rec.priority.parse::<Priority>().map_err(|_| {
            CoreError::Internal(format!(
                "incident {} has unknown priority {:?}",
                rec.id, rec.priority
            ))
        })?;
        let status = rec.status.parse::<IncidentStatus>().map_err(|_| {
            CoreError::Internal(format!(
                "incident {} has unknown status {:?}",
                rec.id, rec.status
            ))
        })?;

        Ok(Self {
            id: rec.id,
            kind: rec.kind,
            priority,
            status,
            camera: rec.camera,
            sector: rec.sector,
            pista: rec.pista.into_iter().collect(),
            trabajos_via: rec.trabajos_via.into_iter().collect(),
            observation: rec.observacion,
            ubicacion_via: rec.ubicacion_via,
            senalizacion: rec.senalizacion,
            start_date: rec.start_date,
            start_time: rec.start_time,
            end_date: rec.end_date,
            end_time: rec.end_time,
            created_at: rec.created_at,
            created_by: rec.created_by_id,
            created_by_name: None,
            closed_at: rec.closed_at,
            closed_by: rec.close_by_id,
            closed_by_name: None,
        })
    }
}

// ── Commands ────────────────────────────────────────────────────────

/// Create-form input. Everything optional so validation can name what
/// is missing instead of failing on the first field.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IncidentDraft {
    pub kind: Option<String>,
    pub priority: Option<Priority>,
    pub camera: Option<String>,
    pub sector: Option<String>,
    pub pista: BTreeSet<String>,
    pub trabajos_via: BTreeSet<String>,
    pub observation: Option<String>,
    pub ubicacion_via: Option<String>,
    pub senalizacion: Option<String>,
    pub start_date: Option<NaiveDate>,
    pub start_time: Option<NaiveTime>,
}

impl IncidentDraft {
    /// Names of required fields that are absent or blank.
    pub fn missing_fields(&self) -> Vec<&'static str> {
        let blank = |v: &Option<String>| v.as_deref().is_none_or(|s| s.trim().is_empty());
        let mut missing = Vec::new();
        if blank(&self.kind) {
            missing.push("type");
        }
        if self.priority.is_none() {
            missing.push("priority");
        }
        if blank(&self.camera) {
            missing.push("camera");
        }
        if self.start_date.is_none() {
            missing.push("start_date");
        }
        if self.start_time.is_none() {
            missing.push("start_time");
        }
        missing
    }

    /// Validate and build the create payload. No I/O.
    pub fn into_payload(self, created_by: u64) -> Result<IncidentPayload, CoreError> {
        let missing = self.missing_fields();
        if !missing.is_empty() {
            return Err(CoreError::Validation {
                fields: missing.into_iter().map(str::to_owned).collect(),
            });
        }
        Ok(IncidentPayload {
            kind: self.kind.map(|k| k.trim().to_owned()),
            priority: self.priority.map(|p| p.to_string()),
            camera: self.camera,
            sector: self.sector,
            pista: Some(self.pista.into_iter().collect()),
            trabajos_via: Some(self.trabajos_via.into_iter().collect()),
            observacion: self.observation,
            ubicacion_via: self.ubicacion_via,
            senalizacion: self.senalizacion,
            start_date: self.start_date,
            start_time: self.start_time,
            status: Some(IncidentStatus::Activo.to_string()),
            created_by_id: Some(created_by),
            ..IncidentPayload::default()
        })
    }
}

/// Partial update. `None` leaves a field untouched.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IncidentEdit {
    pub kind: Option<String>,
    pub priority: Option<Priority>,
    pub camera: Option<String>,
    pub sector: Option<String>,
    pub pista: Option<BTreeSet<String>>,
    pub trabajos_via: Option<BTreeSet<String>>,
    pub observation: Option<String>,
    pub ubicacion_via: Option<String>,
    pub senalizacion: Option<String>,
    pub start_date: Option<NaiveDate>,
    pub start_time: Option<NaiveTime>,
}

impl IncidentEdit {
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }

    /// Fields that were set but blank; an edit cannot clear a required field.
    pub fn blank_required_fields(&self) -> Vec<&'static str> {
        let blank = |v: &Option<String>| v.as_deref().is_some_and(|s| s.trim().is_empty());
        let mut fields = Vec::new();
        if blank(&self.kind) {
            fields.push("type");
        }
        if blank(&self.camera) {
            fields.push("camera");
        }
        fields
    }

    /// Overlay this edit on a local copy.
    pub fn apply_to(&self, incident: &mut Incident) {
        if let Some(kind) = &self.kind {
            incident.kind.clone_from(kind);
        }
        if let Some(priority) = self.priority {
            incident.priority = priority;
        }
        if let Some(camera) = &self.camera {
            incident.camera = Some(camera.clone());
        }
        if let Some(sector) = &self.sector {
            incident.sector = Some(sector.clone());
        }
        if let Some(pista) = &self.pista {
            incident.pista.clone_from(pista);
        }
        if let Some(trabajos) = &self.trabajos_via {
            incident.trabajos_via.clone_from(trabajos);
        }
        if let Some(observation) = &self.observation {
            incident.observation = Some(observation.clone());
        }
        if let Some(ubicacion) = &self.ubicacion_via {
            incident.ubicacion_via = Some(ubicacion.clone());
        }
        if let Some(senalizacion) = &self.senalizacion {
            incident.senalizacion = Some(senalizacion.clone());
        }
        if self.start_date.is_some() {
            incident.start_date = self.start_date;
        }
        if self.start_time.is_some() {
            incident.start_time = self.start_time;
        }
    }

    pub fn to_payload(&self) -> IncidentPayload {
        IncidentPayload {
            kind: self.kind.clone(),
            priority: self.priority.map(|p| p.to_string()),
            camera: self.camera.clone(),
            sector: self.sector.clone(),
            pista: self.pista.as_ref().map(|s| s.iter().cloned().collect()),
            trabajos_via: self.trabajos_via.as_ref().map(|s| s.iter().cloned().collect()),
            observacion: self.observation.clone(),
            ubicacion_via: self.ubicacion_via.clone(),
            senalizacion: self.senalizacion.clone(),
            start_date: self.start_date,
            start_time: self.start_time,
            ..IncidentPayload::default()
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn record_converts_with_case_insensitive_enums() {
        let rec: IncidentRecord = serde_json::from_value(json!({
            "id": 5,
            "type": "Robo",
            "priority": "alta",
            "status": "ACTIVO",
            "pista": ["P2", "P1", "P2"]
        }))
        .unwrap();
        let incident = Incident::try_from(rec).unwrap();
        assert_eq!(incident.priority, Priority::Alta);
        assert_eq!(incident.status, IncidentStatus::Activo);
        assert_eq!(incident.pista.len(), 2);
    }

    #[test]
    fn unknown_status_is_rejected() {
        let rec: IncidentRecord = serde_json::from_value(json!({
            "id": 5, "type": "Robo", "priority": "Alta", "status": "Archivado"
        }))
        .unwrap();
        assert!(Incident::try_from(rec).is_err());
    }

    #[test]
    fn draft_reports_every_missing_field() {
        let draft = IncidentDraft {
            kind: Some("  ".into()),
            camera: Some("C1".into()),
            ..IncidentDraft::default()
        };
        assert_eq!(
            draft.missing_fields(),
            vec!["type", "priority", "start_date", "start_time"]
        );
        let err = draft.into_payload(7).unwrap_err();
        assert!(matches!(err, CoreError::Validation { ref fields } if fields.len() == 4));
    }

    #[test]
    fn valid_draft_becomes_active_payload() {
        let draft = IncidentDraft {
            kind: Some("Robo".into()),
            priority: Some(Priority::Alta),
            camera: Some("C1".into()),
            start_date: NaiveDate::from_ymd_opt(2025, 1, 1),
            start_time: NaiveTime::from_hms_opt(8, 0, 0),
            ..IncidentDraft::default()
        };
        let payload = draft.into_payload(7).unwrap();
        assert_eq!(payload.status.as_deref(), Some("Activo"));
        assert_eq!(payload.priority.as_deref(), Some("Alta"));
        assert_eq!(payload.created_by_id, Some(7));
    }

    #[test]
    fn edit_overlays_only_set_fields() {
        let rec: IncidentRecord = serde_json::from_value(json!({
            "id": 1, "type": "Robo", "priority": "Baja", "status": "Activo",
            "observacion": "inicial"
        }))
        .unwrap();
        let mut incident = Incident::try_from(rec).unwrap();
        let edit = IncidentEdit {
            priority: Some(Priority::Media),
            ..IncidentEdit::default()
        };
        edit.apply_to(&mut incident);
        assert_eq!(incident.priority, Priority::Media);
        assert_eq!(incident.observation.as_deref(), Some("inicial"));
        assert!(!edit.is_empty());
        assert!(IncidentEdit::default().is_empty());
    }
}
