use crate::error::{AppError, AppResult};
use crate::models::{UserId, UserProfile};
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use std::collections::HashMap;
use std::time::Duration;

/// Read-only view of user profiles owned by the user service
#[async_trait]
pub trait ProfileDirectory: Send + Sync {
    /// Profiles for the ids that exist; unknown ids are simply absent
    async fn profiles(&self, ids: &[UserId]) -> AppResult<HashMap<UserId, UserProfile>>;
}

pub struct HttpProfileClient {
    base_url: String,
    http_client: Client,
}

#[derive(Debug, Deserialize)]
struct BatchResponse {
    users: Vec<UserProfile>,
}

impl HttpProfileClient {
    pub fn new(base_url: &str, timeout: Duration) -> AppResult<Self> {
        let http_client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| AppError::Config(format!("failed to create HTTP client: {e}")))?;
        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            http_client,
        })
    }
}

#[async_trait]
impl ProfileDirectory for HttpProfileClient {
    async fn profiles(&self, ids: &[UserId]) -> AppResult<HashMap<UserId, UserProfile>> {
        if ids.is_empty() {
            return Ok(HashMap::new());
        }
        let joined = ids
            .iter()
            .map(UserId::as_str)
            .collect::<Vec<_>>()
            .join(",");

        let response = self
            .http_client
            .get(format!("{}/api/v1/users/batch", self.base_url))
            .query(&[("ids", joined.as_str())])
            .send()
            .await
            .map_err(|e| AppError::ServiceUnavailable(format!("profile lookup failed: {e}")))?;

        if !response.status().is_success() {
            return Err(AppError::ServiceUnavailable(format!(
                "profile lookup rejected with status {}",
                response.status()
            )));
        }

        let batch: BatchResponse = response.json().await.map_err(|e| {
            AppError::ServiceUnavailable(format!("invalid profile lookup response: {e}"))
        })?;

        Ok(batch
            .users
            .into_iter()
            .map(|profile| (profile.id.clone(), profile))
            .collect())
    }
}
