//! Client for the media service that stores message attachments

use crate::error::{AppError, AppResult};
use crate::models::ContentKind;
use async_trait::async_trait;
use bytes::Bytes;
use reqwest::Client;
use serde::Deserialize;
use std::time::Duration;
use tracing::{debug, info};

/// Object kind passed to the media service so it can pick a bucket and limits
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediaKind {
    Image,
    Video,
    Audio,
    File,
}

impl MediaKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            MediaKind::Image => "image",
            MediaKind::Video => "video",
            MediaKind::Audio => "audio",
            MediaKind::File => "file",
        }
    }

    /// `None` for text, which carries no attachments
    pub fn for_content(kind: ContentKind) -> Option<Self> {
        match kind {
            ContentKind::Text => None,
            ContentKind::Image => Some(MediaKind::Image),
            ContentKind::Video => Some(MediaKind::Video),
            ContentKind::Audio => Some(MediaKind::Audio),
            ContentKind::File => Some(MediaKind::File),
        }
    }
}

/// A stored media object
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct UploadedMedia {
    pub id: String,
    pub url: String,
}

#[async_trait]
pub trait MediaStore: Send + Sync {
    async fn upload(&self, kind: MediaKind, file_name: &str, bytes: Bytes)
        -> AppResult<UploadedMedia>;

    async fn delete(&self, id: &str) -> AppResult<()>;
}

pub struct HttpMediaClient {
    base_url: String,
    http_client: Client,
}

impl HttpMediaClient {
    pub fn new(base_url: &str, timeout: Duration) -> AppResult<Self> {
        let http_client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| AppError::Config(format!("failed to create HTTP client: {e}")))?;

        info!(base_url = %base_url, "media client initialized");

        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            http_client,
        })
    }
}

#[async_trait]
impl MediaStore for HttpMediaClient {
    async fn upload(
        &self,
        kind: MediaKind,
        file_name: &str,
        bytes: Bytes,
    ) -> AppResult<UploadedMedia> {
        let size = bytes.len();
        let response = self
            .http_client
            .post(format!("{}/api/v1/uploads", self.base_url))
            .query(&[("kind", kind.as_str()), ("file_name", file_name)])
            .header(reqwest::header::CONTENT_TYPE, "application/octet-stream")
            .body(bytes)
            .send()
            .await
            .map_err(|e| AppError::ServiceUnavailable(format!("media upload failed: {e}")))?;

        if !response.status().is_success() {
            return Err(AppError::ServiceUnavailable(format!(
                "media upload rejected with status {}",
                response.status()
            )));
        }

        let uploaded: UploadedMedia = response.json().await.map_err(|e| {
            AppError::ServiceUnavailable(format!("invalid media upload response: {e}"))
        })?;

        debug!(media_id = %uploaded.id, kind = kind.as_str(), size, "media uploaded");
        Ok(uploaded)
    }

    async fn delete(&self, id: &str) -> AppResult<()> {
        let response = self
            .http_client
            .delete(format!("{}/api/v1/uploads/{}", self.base_url, id))
            .send()
            .await
            .map_err(|e| AppError::ServiceUnavailable(format!("media delete failed: {e}")))?;

        // Already gone counts as deleted
        if response.status().is_success() || response.status() == reqwest::StatusCode::NOT_FOUND {
            debug!(media_id = %id, "media deleted");
            return Ok(());
        }
        Err(AppError::ServiceUnavailable(format!(
            "media delete rejected with status {}",
            response.status()
        )))
    }
}
