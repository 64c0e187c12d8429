use std::time::Duration;

use async_trait::async_trait;
use reqwest::{header::CONTENT_TYPE, Client};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::classify::RawResponse;
use crate::presets::{ArtifactSource, ArtifactSpec};

pub const DOWNLOAD_ROUTE: &str = "/preset_download_manager/download";
pub const SEARCH_ROUTE: &str = "/preset_download_manager/huggingface/search";

#[derive(Debug, Error)]
#[error("{0}")]
pub struct TransportError(pub String);

/// Issues exactly one download request for one artifact. Implementations do not
/// retry and do not interpret the response.
#[async_trait]
pub trait ArtifactDownloader: Send + Sync {
    async fn download(&self, spec: &ArtifactSpec) -> Result<RawResponse, TransportError>;
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DownloadRequest {
    pub save_path: String,
    pub hf_token: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub direct_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model_path: Option<String>,
}

impl From<&ArtifactSpec> for DownloadRequest {
    fn from(spec: &ArtifactSpec) -> Self {
        let (direct_url, model_id, model_path) = match &spec.source {
            ArtifactSource::Direct { direct_url } => (Some(direct_url.clone()), None, None),
            ArtifactSource::Repository {
                model_id,
                model_path,
            } => (None, Some(model_id.clone()), Some(model_path.clone())),
        };
        Self {
            save_path: spec.save_path.clone(),
            hf_token: spec.token().unwrap_or_default().to_string(),
            direct_url,
            model_id,
            model_path,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HubModel {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub model_id: Option<String>,
    #[serde(default)]
    pub downloads: Option<u64>,
    #[serde(default)]
    pub likes: Option<u64>,
    #[serde(default, alias = "pipeline_tag")]
    pub pipeline_tag: Option<String>,
}

impl HubModel {
    pub fn repo_id(&self) -> &str {
        self.id
            .as_deref()
            .or(self.model_id.as_deref())
            .unwrap_or_default()
    }
}

#[derive(Debug, Error)]
pub enum SearchError {
    #[error("model search request failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("model search failed with HTTP {status}: {message}")]
    Status { status: u16, message: String },
}

#[derive(Debug, Deserialize)]
struct SearchFailure {
    #[serde(default)]
    error: Option<String>,
}

#[derive(Debug, Clone)]
pub struct HttpArtifactClient {
    client: Client,
    server_url: String,
}

impl HttpArtifactClient {
    pub fn new(client: Client, server_url: &str) -> Self {
        Self {
            client,
            server_url: server_url.trim_end_matches('/').to_string(),
        }
    }

    pub fn build_http_client(connect_timeout: Duration) -> reqwest::Result<Client> {
        Client::builder().connect_timeout(connect_timeout).build()
    }

    fn url(&self, route: &str) -> String {
        format!("{}{route}", self.server_url)
    }

    pub async fn search_models(&self, query: &str, limit: u32) -> Result<Vec<HubModel>, SearchError> {
        let limit = limit.to_string();
        let response = self
            .client
            .get(self.url(SEARCH_ROUTE))
            .query(&[("q", query), ("limit", limit.as_str())])
            .send()
            .await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let message = serde_json::from_str::<SearchFailure>(&body)
                .ok()
                .and_then(|failure| failure.error)
                .unwrap_or(body);
            return Err(SearchError::Status {
                status: status.as_u16(),
                message,
            });
        }
        Ok(response.json().await?)
    }
}

#[async_trait]
impl ArtifactDownloader for HttpArtifactClient {
    async fn download(&self, spec: &ArtifactSpec) -> Result<RawResponse, TransportError> {
        let request = DownloadRequest::from(spec);
        let response = self
            .client
            .post(self.url(DOWNLOAD_ROUTE))
            .json(&request)
            .send()
            .await
            .map_err(|err| TransportError(err.to_string()))?;

        let status = response.status().as_u16();
        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .map(ToOwned::to_owned);

        // Headers arrived, so the server acted on the request. A body that cannot
        // be read is left for the classifier to treat as unconfirmed.
        let (content_type, body) = match response.text().await {
            Ok(body) => (content_type, body),
            Err(err) => {
                tracing::warn!(status, "failed reading download response body: {err}");
                (None, String::new())
            }
        };

        Ok(RawResponse {
            status,
            content_type,
            body,
        })
    }
}
