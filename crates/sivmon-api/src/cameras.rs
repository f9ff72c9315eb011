// Camera endpoints
//
// Heartbeat, full detector status, and fire-and-forget stream control.

use crate::client::SivClient;
use crate::error::Error;
use crate::models::{CameraStatus, CameraStatusFull};

impl SivClient {
    /// `GET {prefix}/camera/{id}/status` -- online/offline heartbeat only.
    pub async fn camera_status(&self, camera_id: &str) -> Result<CameraStatus, Error> {
        self.get_json(&format!("/camera/{camera_id}/status")).await
    }

    /// `GET {prefix}/camera/{id}/status_full` -- counts and detector flags.
    pub async fn camera_status_full(&self, camera_id: &str) -> Result<CameraStatusFull, Error> {
        self.get_json(&format!("/camera/{camera_id}/status_full"))
            .await
    }

    /// `POST {prefix}/camera/{id}/start`
    pub async fn start_camera(&self, camera_id: &str) -> Result<(), Error> {
        self.post_empty(&format!("/camera/{camera_id}/start")).await
    }

    /// `POST {prefix}/camera/{id}/stop`
    pub async fn stop_camera(&self, camera_id: &str) -> Result<(), Error> {
        self.post_empty(&format!("/camera/{camera_id}/stop")).await
    }
}
