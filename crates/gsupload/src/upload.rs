//! Object uploads to a Cloud Storage bucket.
//!
//! Uses the XML API's simple `PUT /<bucket>/<object>` with the caller's
//! credentialed client.

use gsupload_auth::{AuthError, AuthorizedClient};
use reqwest::StatusCode;
use reqwest::header::{CONTENT_TYPE, USER_AGENT};
use tracing::info;

use crate::content_type;

/// Cloud Storage XML API endpoint.
pub const DEFAULT_STORAGE_URL: &str = "https://storage.googleapis.com";

const AGENT: &str = concat!("gsupload/", env!("CARGO_PKG_VERSION"));

/// Errors returned by [`Uploader::put`].
#[derive(Debug, thiserror::Error)]
pub enum UploadError {
    /// The request could not be authenticated or sent.
    #[error(transparent)]
    Transport(#[from] AuthError),

    /// Storage answered with a non-success status.
    #[error("storage returned {status}: {body}")]
    Status { status: StatusCode, body: String },
}

/// An object to store.
#[derive(Debug, Clone)]
pub struct StorageObject {
    pub bucket: String,
    /// Object name inside the bucket, e.g. `backups/2024/db.tar.gz`.
    pub path: String,
    pub bytes: Vec<u8>,
}

/// Uploads objects on behalf of one project.
pub struct Uploader {
    project_id: String,
    storage_url: String,
    client: AuthorizedClient,
}

impl Uploader {
    pub fn new(project_id: impl Into<String>, client: AuthorizedClient) -> Self {
        Self {
            project_id: project_id.into(),
            storage_url: DEFAULT_STORAGE_URL.to_string(),
            client,
        }
    }

    /// Point at a different storage endpoint (emulators, tests).
    #[must_use]
    pub fn with_storage_url(mut self, url: impl Into<String>) -> Self {
        self.storage_url = url.into();
        self
    }

    pub fn object_url(&self, object: &StorageObject) -> String {
        format!(
            "{}/{}/{}",
            self.storage_url.trim_end_matches('/'),
            object.bucket,
            object.path.trim_start_matches('/')
        )
    }

    /// Store `object`, replacing any object with the same name.
    pub async fn put(&self, object: &StorageObject) -> Result<(), UploadError> {
        let url = self.object_url(object);
        let content_type = content_type::guess(&object.path, &object.bytes);

        let request = self
            .client
            .put(&url)
            .header(USER_AGENT, AGENT)
            .header(CONTENT_TYPE, content_type)
            .header("x-goog-project-id", &self.project_id)
            .body(object.bytes.clone());
        let res = self.client.send(request).await?;

        let status = res.status();
        if !status.is_success() {
            let body = res.text().await.unwrap_or_default();
            return Err(UploadError::Status { status, body });
        }

        info!(
            bucket = %object.bucket,
            path = %object.path,
            bytes = object.bytes.len(),
            content_type,
            "object uploaded"
        );
        Ok(())
    }
}
