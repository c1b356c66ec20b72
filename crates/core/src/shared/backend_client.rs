use std::time::Duration;

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::shared::source_error::SourceError;

/// Thin JSON client for the surveillance backend.
///
/// Every request carries the client-wide timeout so a stalled backend
/// surfaces as a [`SourceError::Transport`] instead of wedging the caller.
#[derive(Clone)]
pub struct BackendClient {
    client: reqwest::blocking::Client,
    base_url: String,
}

impl BackendClient {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, SourceError> {
        let client = reqwest::blocking::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(SourceError::Client)?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }

    pub fn get_json<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, String)],
    ) -> Result<T, SourceError> {
        let url = self.url(path);
        let response = self
            .client
            .get(&url)
            .query(query)
            .send()
            .map_err(|e| SourceError::Transport {
                url: url.clone(),
                source: e,
            })?;
        let response = check_status(&url, response)?;
        response
            .json::<T>()
            .map_err(|e| SourceError::Decode { url, source: e })
    }

    pub fn post_json<B: Serialize + ?Sized>(&self, path: &str, body: &B) -> Result<(), SourceError> {
        let url = self.url(path);
        let response = self
            .client
            .post(&url)
            .json(body)
            .send()
            .map_err(|e| SourceError::Transport {
                url: url.clone(),
                source: e,
            })?;
        check_status(&url, response).map(|_| ())
    }

    pub fn patch_json<B: Serialize + ?Sized>(&self, path: &str, body: &B) -> Result<(), SourceError> {
        let url = self.url(path);
        let response = self
            .client
            .patch(&url)
            .json(body)
            .send()
            .map_err(|e| SourceError::Transport {
                url: url.clone(),
                source: e,
            })?;
        check_status(&url, response).map(|_| ())
    }
}

fn check_status(
    url: &str,
    response: reqwest::blocking::Response,
) -> Result<reqwest::blocking::Response, SourceError> {
    let status = response.status();
    if status.is_success() {
        Ok(response)
    } else {
        Err(SourceError::Status {
            url: url.to_string(),
            status: status.as_u16(),
        })
    }
}
