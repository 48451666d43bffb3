//! HTTP adapter for the cloud-storage upload service.
//!
//! Request contract:
//! - upload: `POST {base}/uploadFile/{name}`, multipart form with a single
//!   `file` part (`image/jpeg`); a 2xx answer carries `{"url": "..."}`
//! - delete: `DELETE {base}/deleteFile/{object}`, where `object` is the last
//!   path segment of the stored location
//!
//! A 413 status maps to [`StoreError::PayloadTooLarge`]. Each request is
//! bounded by the client-wide timeout.

use std::time::Duration;

use reqwest::blocking::{multipart, Client};
use reqwest::StatusCode;
use serde::Deserialize;

use super::{RemoteStore, StoreError};
use crate::config::StoreSettings;

#[derive(Debug, Deserialize)]
struct UploadResponse {
    #[serde(default)]
    url: Option<String>,
}

/// Blocking HTTP client for the upload service.
///
/// `reqwest::blocking::Client` is internally reference counted, so a single
/// `HttpStore` can be shared by every upload worker.
#[derive(Debug, Clone)]
pub struct HttpStore {
    client: Client,
    base_url: String,
    max_payload_bytes: Option<usize>,
}

impl HttpStore {
    /// Build a store rooted at `base_url` with a per-request `timeout`.
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, StoreError> {
        let parsed = reqwest::Url::parse(base_url)
            .map_err(|e| StoreError::Config(format!("invalid base url {base_url:?}: {e}")))?;
        if parsed.cannot_be_a_base() {
            return Err(StoreError::Config(format!(
                "base url {base_url:?} cannot carry paths"
            )));
        }

        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| StoreError::Config(e.to_string()))?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            max_payload_bytes: None,
        })
    }

    /// Build a store from the `[store]` config section.
    pub fn from_settings(settings: &StoreSettings) -> Result<Self, StoreError> {
        Ok(Self::new(&settings.base_url, settings.timeout())?
            .with_max_payload(settings.max_payload_bytes))
    }

    /// Reject payloads above `limit` locally, without a round trip.
    pub fn with_max_payload(mut self, limit: Option<usize>) -> Self {
        self.max_payload_bytes = limit;
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn upload_url(&self, name: &str) -> String {
        format!("{}/uploadFile/{}", self.base_url, name)
    }

    fn delete_url(&self, location: &str) -> Option<String> {
        let object = location
            .trim_end_matches('/')
            .rsplit('/')
            .next()
            .filter(|segment| !segment.is_empty())?;
        Some(format!("{}/deleteFile/{}", self.base_url, object))
    }
}

fn transport_error(err: reqwest::Error) -> StoreError {
    if err.is_timeout() {
        StoreError::Timeout
    } else {
        StoreError::Network(err.to_string())
    }
}

impl RemoteStore for HttpStore {
    fn upload(&self, bytes: &[u8], name: &str) -> Result<String, StoreError> {
        if let Some(limit) = self.max_payload_bytes {
            if bytes.len() > limit {
                return Err(StoreError::PayloadTooLarge { size: bytes.len() });
            }
        }

        let part = multipart::Part::bytes(bytes.to_vec())
            .file_name(name.to_string())
            .mime_str("image/jpeg")
            .map_err(|e| StoreError::Config(e.to_string()))?;
        let form = multipart::Form::new().part("file", part);

        let response = self
            .client
            .post(self.upload_url(name))
            .multipart(form)
            .send()
            .map_err(transport_error)?;

        let status = response.status();
        if status == StatusCode::PAYLOAD_TOO_LARGE {
            return Err(StoreError::PayloadTooLarge { size: bytes.len() });
        }
        if !status.is_success() {
            return Err(StoreError::Server {
                status: status.as_u16(),
            });
        }

        let body: UploadResponse = response.json().map_err(|e| {
            if e.is_timeout() {
                StoreError::Timeout
            } else {
                StoreError::InvalidResponse(e.to_string())
            }
        })?;

        body.url
            .filter(|url| !url.is_empty())
            .ok_or(StoreError::MissingLocation)
    }

    fn delete(&self, location: &str) -> Result<(), StoreError> {
        let url = self.delete_url(location).ok_or_else(|| {
            StoreError::Config(format!("cannot derive object name from {location:?}"))
        })?;

        let response = self.client.delete(url).send().map_err(transport_error)?;
        let status = response.status();
        if !status.is_success() {
            return Err(StoreError::Server {
                status: status.as_u16(),
            });
        }
        Ok(())
    }
}
