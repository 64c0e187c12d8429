use std::path::{Path, PathBuf};

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use thiserror::Error;

use super::types::PresetDocument;

pub const PRESETS_ROUTE: &str = "/preset_download_manager/presets";

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("preset store request failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("preset store returned HTTP {status}: {body}")]
    Status { status: u16, body: String },
    #[error("preset document could not be parsed: {0}")]
    Decode(#[from] serde_json::Error),
    #[error("preset file {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("preset store rejected the document: {0}")]
    Rejected(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SaveStatus {
    Saved,
    SavedWithWarning,
}

#[async_trait]
pub trait PresetStore: Send + Sync {
    async fn load(&self) -> Result<PresetDocument, StoreError>;
    async fn save(&self, document: &PresetDocument) -> Result<SaveStatus, StoreError>;
}

#[derive(Debug, Deserialize)]
struct SaveResponse {
    #[serde(default)]
    status: String,
    #[serde(default)]
    message: Option<String>,
}

fn interpret_save_response(response: SaveResponse) -> Result<SaveStatus, StoreError> {
    match response.status.as_str() {
        "success" => Ok(SaveStatus::Saved),
        "warning" => Ok(SaveStatus::SavedWithWarning),
        _ => Err(StoreError::Rejected(
            response
                .message
                .unwrap_or_else(|| "Error saving preset".to_string()),
        )),
    }
}

#[derive(Debug, Clone)]
pub struct HttpPresetStore {
    client: Client,
    endpoint: String,
}

impl HttpPresetStore {
    pub fn new(client: Client, server_url: &str) -> Self {
        Self {
            client,
            endpoint: format!("{}{}", server_url.trim_end_matches('/'), PRESETS_ROUTE),
        }
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

#[async_trait]
impl PresetStore for HttpPresetStore {
    async fn load(&self) -> Result<PresetDocument, StoreError> {
        let response = self.client.get(&self.endpoint).send().await?;
        let status = response.status();
        let body = response.text().await?;
        if !status.is_success() {
            return Err(StoreError::Status {
                status: status.as_u16(),
                body,
            });
        }
        let document = serde_json::from_str(&body)?;
        Ok(document)
    }

    async fn save(&self, document: &PresetDocument) -> Result<SaveStatus, StoreError> {
        let response = self
            .client
            .post(&self.endpoint)
            .json(document)
            .send()
            .await?;
        let status = response.status();
        let body = response.text().await?;
        if !status.is_success() {
            return Err(StoreError::Status {
                status: status.as_u16(),
                body,
            });
        }
        interpret_save_response(serde_json::from_str(&body)?)
    }
}

#[derive(Debug, Clone)]
pub struct FilePresetStore {
    path: PathBuf,
}

impl FilePresetStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn io_error(&self, source: std::io::Error) -> StoreError {
        StoreError::Io {
            path: self.path.clone(),
            source,
        }
    }
}

#[async_trait]
impl PresetStore for FilePresetStore {
    async fn load(&self) -> Result<PresetDocument, StoreError> {
        if !tokio::fs::try_exists(&self.path)
            .await
            .map_err(|err| self.io_error(err))?
        {
            let empty = PresetDocument::default();
            self.save(&empty).await?;
            return Ok(empty);
        }
        let bytes = tokio::fs::read(&self.path)
            .await
            .map_err(|err| self.io_error(err))?;
        Ok(serde_json::from_slice(&bytes)?)
    }

    async fn save(&self, document: &PresetDocument) -> Result<SaveStatus, StoreError> {
        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|err| self.io_error(err))?;
        }
        let serialized = serde_json::to_vec_pretty(document)?;
        tokio::fs::write(&self.path, serialized)
            .await
            .map_err(|err| self.io_error(err))?;
        Ok(SaveStatus::Saved)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::presets::types::{ArtifactSpec, Preset};
    use serde_json::json;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn sample_document() -> PresetDocument {
        PresetDocument {
            categories: vec![],
            presets: vec![Preset {
                id: "preset-1".into(),
                name: "SDXL".into(),
                category: "Image".into(),
                models: vec![ArtifactSpec::repository("org/sdxl", "sdxl.safetensors", "checkpoints")],
            }],
        }
    }

    #[tokio::test]
    async fn http_store_loads_document() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path(PRESETS_ROUTE))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "categories": [],
                "presets": [{
                    "id": "preset-1",
                    "name": "SDXL",
                    "category": "Image",
                    "models": [{
                        "model_id": "org/sdxl",
                        "model_path": "sdxl.safetensors",
                        "save_path": "checkpoints",
                        "hf_token": ""
                    }]
                }]
            })))
            .mount(&server)
            .await;

        let store = HttpPresetStore::new(Client::new(), &server.uri());
        let document = store.load().await.unwrap();
        assert_eq!(document, sample_document());
    }

    #[tokio::test]
    async fn http_store_maps_save_statuses() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path(PRESETS_ROUTE))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "status": "warning" })))
            .up_to_n_times(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path(PRESETS_ROUTE))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({ "status": "error", "message": "disk full" })),
            )
            .mount(&server)
            .await;

        let store = HttpPresetStore::new(Client::new(), &format!("{}/", server.uri()));
        let status = store.save(&sample_document()).await.unwrap();
        assert_eq!(status, SaveStatus::SavedWithWarning);

        let err = store.save(&sample_document()).await.unwrap_err();
        assert!(matches!(err, StoreError::Rejected(ref message) if message == "disk full"));
    }

    #[tokio::test]
    async fn http_store_surfaces_server_errors() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path(PRESETS_ROUTE))
            .respond_with(ResponseTemplate::new(503).set_body_string("unavailable"))
            .mount(&server)
            .await;

        let store = HttpPresetStore::new(Client::new(), &server.uri());
        let err = store.load().await.unwrap_err();
        assert!(matches!(err, StoreError::Status { status: 503, .. }));
    }

    #[tokio::test]
    async fn file_store_creates_missing_document() {
        let dir = tempfile::tempdir().unwrap();
        let store = FilePresetStore::new(dir.path().join("nested").join("presets.json"));

        let document = store.load().await.unwrap();
        assert!(document.presets.is_empty());
        assert!(store.path().exists());
    }

    #[tokio::test]
    async fn file_store_round_trips_and_keeps_unicode() {
        let dir = tempfile::tempdir().unwrap();
        let store = FilePresetStore::new(dir.path().join("presets.json"));
        let mut document = sample_document();
        document.presets[0].name = "Модели".into();

        store.save(&document).await.unwrap();
        let raw = std::fs::read_to_string(store.path()).unwrap();
        assert!(raw.contains("Модели"));
        assert_eq!(store.load().await.unwrap(), document);
    }

    #[tokio::test]
    async fn file_store_rejects_corrupt_document() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("presets.json");
        std::fs::write(&path, "{ not json").unwrap();

        let err = FilePresetStore::new(path).load().await.unwrap_err();
        assert!(matches!(err, StoreError::Decode(_)));
    }
}
