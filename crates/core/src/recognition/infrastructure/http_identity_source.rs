use serde::Deserialize;

use crate::recognition::domain::embedding::Embedding;
use crate::recognition::domain::identity::{IdentityId, IdentityRecord};
use crate::recognition::domain::registry_source::RegistrySource;
use crate::shared::backend_client::BackendClient;
use crate::shared::source_error::SourceError;

const PERSONS_PATH: &str = "/api/persons";

#[derive(Debug, Deserialize)]
struct PersonsResponse {
    #[serde(default)]
    persons: Vec<PersonDto>,
}

#[derive(Debug, Deserialize)]
struct PersonDto {
    #[serde(rename = "_id", default)]
    id: String,
    #[serde(default)]
    name: Option<String>,
    #[serde(rename = "faceEncodings", default)]
    face_encodings: Vec<FaceEncodingDto>,
}

#[derive(Debug, Deserialize)]
struct FaceEncodingDto {
    /// Kept loose so one malformed encoding does not fail the whole roster.
    #[serde(default)]
    encoding: serde_json::Value,
}

/// Loads actively-sought identities from the backend person registry.
pub struct HttpIdentitySource {
    client: BackendClient,
    status: String,
    limit: usize,
}

impl HttpIdentitySource {
    pub fn new(client: BackendClient, status: impl Into<String>, limit: usize) -> Self {
        Self {
            client,
            status: status.into(),
            limit,
        }
    }
}

impl RegistrySource for HttpIdentitySource {
    fn fetch(&self) -> Result<Vec<IdentityRecord>, SourceError> {
        let response: PersonsResponse = self.client.get_json(
            PERSONS_PATH,
            &[
                ("status", self.status.clone()),
                ("limit", self.limit.to_string()),
            ],
        )?;
        Ok(flatten_persons(response.persons))
    }

    fn name(&self) -> &str {
        "backend registry"
    }
}

/// Expands each person into one record per usable encoding.
fn flatten_persons(persons: Vec<PersonDto>) -> Vec<IdentityRecord> {
    let mut records = Vec::new();
    for person in persons {
        if person.id.is_empty() {
            log::warn!("Skipping person without an id");
            continue;
        }
        let name = person.name.unwrap_or_else(|| "Unknown".to_string());
        for encoding in &person.face_encodings {
            match parse_encoding(&encoding.encoding) {
                Some(values) => records.push(IdentityRecord::new(
                    IdentityId::new(person.id.clone()),
                    name.clone(),
                    Embedding::new(values),
                )),
                None => log::warn!("Invalid encoding for {name} ({})", person.id),
            }
        }
    }
    records
}

fn parse_encoding(value: &serde_json::Value) -> Option<Vec<f32>> {
    let items = value.as_array()?;
    if items.is_empty() {
        return None;
    }
    items
        .iter()
        .map(|v| v.as_f64().map(|f| f as f32))
        .collect()
}
