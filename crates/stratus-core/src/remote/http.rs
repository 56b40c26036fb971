//! REST blob store client
//!
//! Endpoints, relative to the base URL:
//!
//! - `GET /folders?name=` and `POST /folders`
//! - `GET /files?name=&parent=` and `POST /files?name=&parent=`
//! - `GET|PUT /files/{id}/content` and `DELETE /files/{id}`
//!
//! Listings answer `{"folders": [...]}` / `{"files": [...]}`.

use std::time::Duration;

use reqwest::{Response, StatusCode};
use serde::de::DeserializeOwned;
use serde::Deserialize;

use super::{BlobError, BlobResult, BlobStore, RemoteFile, RemoteFolder};
use crate::util::{compact_text, normalize_base_url, normalize_text_option};
use crate::{Error, Result};

/// Default per-request timeout
pub const DEFAULT_HTTP_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Clone)]
pub struct HttpBlobStore {
    base_url: String,
    token: String,
    client: reqwest::Client,
}

impl std::fmt::Debug for HttpBlobStore {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        formatter
            .debug_struct("HttpBlobStore")
            .field("base_url", &self.base_url)
            .field("token", &"[REDACTED]")
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Deserialize)]
struct FolderList {
    #[serde(default)]
    folders: Vec<RemoteFolder>,
}

#[derive(Debug, Deserialize)]
struct FileList {
    #[serde(default)]
    files: Vec<RemoteFile>,
}

#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    error: Option<String>,
    message: Option<String>,
}

impl HttpBlobStore {
    pub fn new(base_url: impl Into<String>, token: impl Into<String>) -> Result<Self> {
        Self::with_timeout(base_url, token, DEFAULT_HTTP_TIMEOUT)
    }

    pub fn with_timeout(
        base_url: impl Into<String>,
        token: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self> {
        let base_url = normalize_base_url(&base_url.into()).ok_or_else(|| {
            Error::Config("remote URL must include http:// or https://".to_string())
        })?;
        let token = normalize_text_option(Some(token.into()))
            .ok_or_else(|| Error::Config("remote token must not be empty".to_string()))?;

        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|error| Error::Config(format!("failed to build HTTP client: {error}")))?;

        Ok(Self {
            base_url,
            token,
            client,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base_url)
    }

    fn file_url(&self, id: &str, suffix: &str) -> String {
        self.url(&format!("/files/{}{suffix}", urlencoding::encode(id)))
    }

    async fn send(&self, request: reqwest::RequestBuilder) -> BlobResult<Response> {
        let response = request
            .bearer_auth(&self.token)
            .header("Accept", "application/json")
            .send()
            .await
            .map_err(transport_error)?;

        if response.status().is_success() {
            return Ok(response);
        }

        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        Err(BlobError::Status {
            status: status.as_u16(),
            message: parse_api_error(status, &body),
        })
    }

    async fn json<T: DeserializeOwned>(&self, request: reqwest::RequestBuilder) -> BlobResult<T> {
        let response = self.send(request).await?;
        response.json::<T>().await.map_err(|error| {
            if error.is_decode() {
                BlobError::InvalidPayload(error.to_string())
            } else {
                transport_error(error)
            }
        })
    }
}

impl BlobStore for HttpBlobStore {
    async fn list_files(&self, name: &str, parent: &str) -> BlobResult<Vec<RemoteFile>> {
        let request = self
            .client
            .get(self.url("/files"))
            .query(&[("name", name), ("parent", parent)]);
        Ok(self.json::<FileList>(request).await?.files)
    }

    async fn create_file(
        &self,
        name: &str,
        parent: &str,
        mime_type: &str,
        body: Vec<u8>,
    ) -> BlobResult<RemoteFile> {
        let request = self
            .client
            .post(self.url("/files"))
            .query(&[("name", name), ("parent", parent)])
            .header("Content-Type", mime_type)
            .body(body);
        self.json(request).await
    }

    async fn update_file(&self, id: &str, body: Vec<u8>) -> BlobResult<RemoteFile> {
        let request = self
            .client
            .put(self.file_url(id, "/content"))
            .header("Content-Type", super::SNAPSHOT_MIME_TYPE)
            .body(body);
        self.json(request).await
    }

    async fn get_file_content(&self, id: &str) -> BlobResult<Vec<u8>> {
        let response = self
            .send(self.client.get(self.file_url(id, "/content")))
            .await?;
        let bytes = response.bytes().await.map_err(transport_error)?;
        Ok(bytes.to_vec())
    }

    async fn delete_file(&self, id: &str) -> BlobResult<()> {
        self.send(self.client.delete(self.file_url(id, ""))).await?;
        Ok(())
    }

    async fn create_folder(&self, name: &str) -> BlobResult<RemoteFolder> {
        let request = self
            .client
            .post(self.url("/folders"))
            .json(&serde_json::json!({ "name": name }));
        self.json(request).await
    }

    async fn list_folders(&self, name: &str) -> BlobResult<Vec<RemoteFolder>> {
        let request = self
            .client
            .get(self.url("/folders"))
            .query(&[("name", name)]);
        Ok(self.json::<FolderList>(request).await?.folders)
    }
}

fn transport_error(error: reqwest::Error) -> BlobError {
    match error.status() {
        Some(status) => BlobError::Status {
            status: status.as_u16(),
            message: error.to_string(),
        },
        None => BlobError::Transport(error.to_string()),
    }
}

fn parse_api_error(status: StatusCode, body: &str) -> String {
    if let Ok(payload) = serde_json::from_str::<ApiErrorBody>(body) {
        if let Some(message) = payload.message.or(payload.error) {
            return format!("{} ({})", compact_text(&message), status.as_u16());
        }
    }

    let trimmed = compact_text(body);
    if trimmed.is_empty() {
        format!("HTTP {}", status.as_u16())
    } else {
        format!("{} ({})", trimmed, status.as_u16())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn constructor_rejects_invalid_configuration() {
        assert!(HttpBlobStore::new("", "token").is_err());
        assert!(HttpBlobStore::new("files.example.com", "token").is_err());
        assert!(HttpBlobStore::new("https://files.example.com", "  ").is_err());
    }

    #[test]
    fn base_url_is_normalized() {
        let store = HttpBlobStore::new(" https://files.example.com/api/ ", "token").unwrap();
        assert_eq!(store.base_url(), "https://files.example.com/api");
        assert_eq!(
            store.file_url("a b/c", "/content"),
            "https://files.example.com/api/files/a%20b%2Fc/content"
        );
    }

    #[test]
    fn debug_redacts_token() {
        let store = HttpBlobStore::new("https://files.example.com", "secret-token").unwrap();
        let debug = format!("{store:?}");
        assert!(!debug.contains("secret-token"));
        assert!(debug.contains("[REDACTED]"));
    }

    #[test]
    fn parse_api_error_prefers_message_field() {
        assert_eq!(
            parse_api_error(StatusCode::FORBIDDEN, r#"{"message":"quota exceeded"}"#),
            "quota exceeded (403)"
        );
        assert_eq!(
            parse_api_error(StatusCode::BAD_GATEWAY, "upstream down"),
            "upstream down (502)"
        );
        assert_eq!(parse_api_error(StatusCode::NOT_FOUND, "  "), "HTTP 404");
    }

    #[test]
    fn listing_payloads_deserialize() {
        let files: FileList = serde_json::from_str(
            r#"{"files":[{"id":"f1","name":"stratus-backup.json","modifiedTime":"2024-05-01T10:00:00Z","size":42}]}"#,
        )
        .unwrap();
        assert_eq!(files.files[0].size, 42);

        let folders: FolderList = serde_json::from_str(r#"{}"#).unwrap();
        assert!(folders.folders.is_empty());
    }
}
