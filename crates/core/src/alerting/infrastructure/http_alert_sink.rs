use serde::Serialize;

use crate::alerting::domain::alert_event::AlertEvent;
use crate::alerting::domain::alert_sink::{AlertSink, SinkError};
use crate::shared::backend_client::BackendClient;

const RECOGNITION_PATH: &str = "/api/recognition";

#[derive(Debug, Serialize)]
struct RecognitionPayload<'a> {
    encoding: &'a [f32],
    metadata: RecognitionMetadata<'a>,
}

#[derive(Debug, Serialize)]
struct RecognitionMetadata<'a> {
    camera_id: &'a str,
    camera_name: &'a str,
    camera_location: &'a str,
    timestamp: String,
    bbox: BboxDto,
    detection_confidence: f64,
    person_id: &'a str,
    person_name: &'a str,
    similarity: f64,
}

#[derive(Debug, Serialize)]
struct BboxDto {
    x1: i32,
    y1: i32,
    x2: i32,
    y2: i32,
}

impl<'a> RecognitionPayload<'a> {
    fn from_event(event: &'a AlertEvent) -> Self {
        let bbox = event.bounding_box;
        Self {
            encoding: event.query.as_ref().map(|p| p.as_slice()).unwrap_or(&[]),
            metadata: RecognitionMetadata {
                camera_id: event.camera_id.as_str(),
                camera_name: &event.camera_name,
                camera_location: &event.camera_location,
                timestamp: event.timestamp.to_rfc3339(),
                bbox: BboxDto {
                    x1: bbox.x1,
                    y1: bbox.y1,
                    x2: bbox.x2,
                    y2: bbox.y2,
                },
                detection_confidence: event.detection_confidence,
                person_id: event.identity_id.as_str(),
                person_name: &event.display_name,
                similarity: event.similarity,
            },
        }
    }
}

/// Posts alerts to the backend recognition endpoint.
///
/// The endpoint only takes encodings of one width; alerts whose query has
/// another width are refused without a request.
pub struct HttpAlertSink {
    client: BackendClient,
    encoding_dimension: usize,
}

impl HttpAlertSink {
    pub fn new(client: BackendClient, encoding_dimension: usize) -> Self {
        Self {
            client,
            encoding_dimension,
        }
    }

    pub fn accepts(&self, dimension: usize) -> bool {
        dimension == self.encoding_dimension
    }
}

impl AlertSink for HttpAlertSink {
    fn deliver(&self, event: &AlertEvent) -> Result<(), SinkError> {
        let dimension = event.query.as_ref().map_or(0, |p| p.dimension());
        if !self.accepts(dimension) {
            return Err(SinkError::Rejected(format!(
                "endpoint takes {}-d encodings, alert carries {dimension}-d",
                self.encoding_dimension
            )));
        }
        self.client
            .post_json(RECOGNITION_PATH, &RecognitionPayload::from_event(event))?;
        log::debug!(
            "Delivered alert for {} on {}",
            event.identity_id,
            event.camera_id
        );
        Ok(())
    }
}
