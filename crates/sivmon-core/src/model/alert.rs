use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use super::{AlertType, ResourceId};

/// One entry in the alert log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AlertEvent {
    /// `{resource}-{millis}-{nonce}`; unique even for same-instant events.
    pub id: String,
    pub resource_id: ResourceId,
    pub alert_type: AlertType,
    pub occurred_at: DateTime<Utc>,
}

impl AlertEvent {
    pub fn new(resource_id: ResourceId, alert_type: AlertType, occurred_at: DateTime<Utc>) -> Self {
        let nonce = Uuid::new_v4().simple().to_string();
        let id = format!(
            "{resource_id}-{}-{}",
            occurred_at.timestamp_millis(),
            &nonce[..8]
        );
        Self {
            id,
            resource_id,
            alert_type,
            occurred_at,
        }
    }
}
