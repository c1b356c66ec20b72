use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::fleet::domain::camera::{CameraDescriptor, CameraId};
use crate::fleet::domain::fleet_source::{CameraStatus, FleetSource};
use crate::shared::backend_client::BackendClient;
use crate::shared::source_error::SourceError;

const ROSTER_PATH: &str = "/api/cameras/active/list";

#[derive(Debug, Deserialize)]
struct RosterResponse {
    #[serde(default)]
    cameras: Vec<CameraDescriptor>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct StatusUpdate<'a> {
    status: &'a str,
    last_online: DateTime<Utc>,
}

/// Camera roster served by the backend.
pub struct HttpFleetSource {
    client: BackendClient,
    skip_local_devices: bool,
}

impl HttpFleetSource {
    pub fn new(client: BackendClient, skip_local_devices: bool) -> Self {
        Self {
            client,
            skip_local_devices,
        }
    }
}

impl FleetSource for HttpFleetSource {
    fn fetch_roster(&self) -> Result<Vec<CameraDescriptor>, SourceError> {
        let response: RosterResponse = self.client.get_json(ROSTER_PATH, &[])?;
        Ok(filter_roster(response.cameras, self.skip_local_devices))
    }

    fn report_status(
        &self,
        camera_id: &CameraId,
        status: CameraStatus,
        at: DateTime<Utc>,
    ) -> Result<(), SourceError> {
        let path = format!("/api/cameras/{}/status", camera_id.as_str());
        self.client.patch_json(
            &path,
            &StatusUpdate {
                status: status.as_str(),
                last_online: at,
            },
        )
    }
}

fn filter_roster(cameras: Vec<CameraDescriptor>, skip_local_devices: bool) -> Vec<CameraDescriptor> {
    cameras
        .into_iter()
        .filter(|cam| cam.active)
        .filter(|cam| {
            if cam.camera_id.as_str().is_empty() {
                log::warn!("Ignoring roster entry without cameraId");
                return false;
            }
            if skip_local_devices && cam.is_local_device() {
                log::info!("Skipping local device {}", cam.camera_id);
                return false;
            }
            true
        })
        .collect()
}
