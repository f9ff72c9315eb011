// Incident endpoints

use reqwest::Method;

use crate::client::SivClient;
use crate::error::Error;
use crate::models::{ClosePayload, IncidentPayload, IncidentRecord};

impl SivClient {
    /// `GET {prefix}/incidentes/`
    pub async fn list_incidents(&self) -> Result<Vec<IncidentRecord>, Error> {
        self.get_json("/incidentes/").await
    }

    /// `POST {prefix}/incidentes/`
    pub async fn create_incident(&self, payload: &IncidentPayload) -> Result<IncidentRecord, Error> {
        self.send_json(Method::POST, "/incidentes/", payload)
            .await
    }

    /// `PUT {prefix}/incidentes/{id}/`
    pub async fn update_incident(
        &self,
        incident_id: u64,
        payload: &IncidentPayload,
    ) -> Result<IncidentRecord, Error> {
        self.send_json(
            Method::PUT,
            &format!("/incidentes/{incident_id}/"),
            payload,
        )
        .await
    }

    /// `PATCH {prefix}/incidentes/cerrar/{id}/`
    pub async fn close_incident(
        &self,
        incident_id: u64,
        payload: &ClosePayload,
    ) -> Result<IncidentRecord, Error> {
        self.send_json(
            Method::PATCH,
            &format!("/incidentes/cerrar/{incident_id}/"),
            payload,
        )
        .await
    }
}
