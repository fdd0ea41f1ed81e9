//! beer-garden REST API 客户端
//! 拉取全量花园快照与单个请求，用于初始化和刷新合并器状态

use std::time::Duration;

use reqwest::Client;
use secrecy::{ExposeSecret, Secret};

use crate::config::UpstreamConfig;
use crate::error::{AppError, Result};
use crate::models::{Garden, Request};

/// 上游 API 客户端
#[derive(Clone)]
pub struct UpstreamClient {
    client: Client,
    base_url: String,
    token: Option<Secret<String>>,
}

impl UpstreamClient {
    /// 创建新的客户端
    pub fn new(config: &UpstreamConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            token: config.token.clone(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// 全量花园列表
    pub async fn list_gardens(&self) -> Result<Vec<Garden>> {
        let gardens: Vec<Garden> = self.get_json("/api/v1/gardens/").await?;
        tracing::debug!(count = gardens.len(), "Fetched garden snapshot");
        Ok(gardens)
    }

    /// 单个请求（含子请求）
    pub async fn get_request(&self, id: &str) -> Result<Request> {
        if id.is_empty() || id.contains('/') {
            return Err(AppError::BadRequest(format!("Invalid request id: {}", id)));
        }
        self.get_json(&format!("/api/v1/requests/{}", id)).await
    }

    async fn get_json<T: serde::de::DeserializeOwned>(&self, path: &str) -> Result<T> {
        let url = format!("{}{}", self.base_url, path);
        let mut request = self.client.get(&url);
        if let Some(token) = &self.token {
            request = request.bearer_auth(token.expose_secret());
        }

        let response = request.send().await?;

        let status = response.status();
        if status == reqwest::StatusCode::NOT_FOUND {
            return Err(AppError::NotFound);
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            tracing::warn!(url = %url, status = %status, "Upstream request failed");
            return Err(AppError::Upstream(format!("{} returned {}: {}", path, status, body)));
        }

        response
            .json::<T>()
            .await
            .map_err(|e| AppError::Upstream(format!("Failed to parse {} response: {}", path, e)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(base_url: &str) -> UpstreamConfig {
        UpstreamConfig {
            base_url: base_url.to_string(),
            events_url: None,
            token: None,
            request_timeout_secs: 5,
            refresh_interval_secs: 60,
        }
    }

    #[test]
    fn test_base_url_trailing_slash_trimmed() {
        let client = UpstreamClient::new(&config("http://localhost:2337/")).unwrap();
        assert_eq!(client.base_url(), "http://localhost:2337");
    }

    #[tokio::test]
    async fn test_get_request_rejects_path_ids() {
        let client = UpstreamClient::new(&config("http://localhost:2337")).unwrap();
        let result = client.get_request("../admin").await;
        assert!(matches!(result, Err(AppError::BadRequest(_))));
    }
}
