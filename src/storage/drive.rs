//! Google Drive v3 implementation of the object store
//!
//! Authenticates with an OAuth2 refresh token, minting short-lived access
//! tokens on demand and caching them until close to expiry. Folder creation
//! goes through the metadata endpoint; uploads use the multipart variant
//! (metadata JSON plus raw bytes in one `multipart/related` body).
//!
//! Endpoint bases are configurable so tests can point at a mock server.

use crate::config::StorageConfig;
use crate::error::{Result, StorageError};
use crate::storage::{FolderHandle, ObjectId, ObjectStore};
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tracing::{debug, info};

/// Folder MIME type in the Drive API
const FOLDER_MIME_TYPE: &str = "application/vnd.google-apps.folder";

/// Refresh the access token this long before its reported expiry
const TOKEN_EXPIRY_MARGIN: Duration = Duration::from_secs(30);

/// Boundary for multipart upload bodies
const UPLOAD_BOUNDARY: &str = "export_sync_upload_boundary";

#[derive(Clone)]
struct CachedToken {
    access_token: String,
    expires_at: Instant,
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
    expires_in: u64,
}

#[derive(Deserialize)]
struct FileResponse {
    id: String,
}

/// Google Drive object store
pub struct GoogleDriveStore {
    config: StorageConfig,
    client: reqwest::Client,
    token: Mutex<Option<CachedToken>>,
}

impl GoogleDriveStore {
    /// Create a store for the given OAuth client and endpoints
    pub fn new(config: StorageConfig) -> Self {
        Self {
            config,
            client: reqwest::Client::new(),
            token: Mutex::new(None),
        }
    }

    /// Return a valid access token, exchanging the refresh token if the
    /// cached one is absent or close to expiry
    async fn access_token(&self) -> Result<String> {
        let mut cached = self.token.lock().await;

        if let Some(token) = cached.as_ref()
            && token.expires_at > Instant::now() + TOKEN_EXPIRY_MARGIN
        {
            return Ok(token.access_token.clone());
        }

        debug!("exchanging refresh token for access token");
        let response = self
            .client
            .post(&self.config.token_url)
            .form(&[
                ("client_id", self.config.client_id.as_str()),
                ("client_secret", self.config.client_secret.as_str()),
                ("refresh_token", self.config.refresh_token.as_str()),
                ("grant_type", "refresh_token"),
            ])
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(StorageError::TokenExchange(format!("{status}: {body}")).into());
        }

        let token: TokenResponse = response
            .json()
            .await
            .map_err(|e| StorageError::TokenExchange(e.to_string()))?;

        let access_token = token.access_token.clone();
        *cached = Some(CachedToken {
            access_token: token.access_token,
            expires_at: Instant::now() + Duration::from_secs(token.expires_in),
        });

        Ok(access_token)
    }

    /// Assemble a `multipart/related` body: metadata JSON part plus media part
    fn multipart_body(metadata: &serde_json::Value, bytes: &[u8]) -> Vec<u8> {
        let mut body = Vec::with_capacity(bytes.len() + 512);
        body.extend_from_slice(
            format!(
                "--{UPLOAD_BOUNDARY}\r\n\
                 Content-Type: application/json; charset=UTF-8\r\n\r\n\
                 {metadata}\r\n\
                 --{UPLOAD_BOUNDARY}\r\n\
                 Content-Type: application/octet-stream\r\n\r\n"
            )
            .as_bytes(),
        );
        body.extend_from_slice(bytes);
        body.extend_from_slice(format!("\r\n--{UPLOAD_BOUNDARY}--").as_bytes());
        body
    }
}

#[async_trait]
impl ObjectStore for GoogleDriveStore {
    async fn create_folder(
        &self,
        name: &str,
        parent: Option<&FolderHandle>,
    ) -> Result<FolderHandle> {
        let token = self.access_token().await?;

        let mut metadata = json!({
            "name": name,
            "mimeType": FOLDER_MIME_TYPE,
        });
        if let Some(parent) = parent {
            metadata["parents"] = json!([parent.0]);
        }

        let response = self
            .client
            .post(format!("{}/files", self.config.api_base))
            .bearer_auth(&token)
            .query(&[("fields", "id")])
            .json(&metadata)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(StorageError::FolderCreate {
                name: name.to_string(),
                reason: format!("{status}: {body}"),
            }
            .into());
        }

        let file: FileResponse = response.json().await.map_err(|e| StorageError::FolderCreate {
            name: name.to_string(),
            reason: e.to_string(),
        })?;

        info!(name, folder_id = file.id, "remote folder created");
        Ok(FolderHandle(file.id))
    }

    async fn upload_object(
        &self,
        name: &str,
        bytes: Vec<u8>,
        parent: &FolderHandle,
    ) -> Result<ObjectId> {
        let token = self.access_token().await?;

        let metadata = json!({
            "name": name,
            "parents": [parent.0],
        });
        let size = bytes.len();
        let body = Self::multipart_body(&metadata, &bytes);

        let response = self
            .client
            .post(format!("{}/files", self.config.upload_base))
            .bearer_auth(&token)
            .query(&[("uploadType", "multipart"), ("fields", "id")])
            .header(
                reqwest::header::CONTENT_TYPE,
                format!("multipart/related; boundary={UPLOAD_BOUNDARY}"),
            )
            .body(body)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(StorageError::Upload {
                name: name.to_string(),
                reason: format!("{status}: {body}"),
            }
            .into());
        }

        let file: FileResponse = response.json().await.map_err(|e| StorageError::Upload {
            name: name.to_string(),
            reason: e.to_string(),
        })?;

        info!(name, object_id = file.id, size_bytes = size, "object uploaded");
        Ok(ObjectId(file.id))
    }
}
