use std::collections::HashSet;
use std::sync::Arc;

use anyhow::{Context, Result};
use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;

use crate::download::{
    ArtifactDownloader, BatchError, BatchLimits, BatchResult, DownloadOrchestrator,
    HttpArtifactClient, HubModel,
};
use crate::presets::{
    FilePresetStore, HttpPresetStore, Preset, PresetCatalog, PresetDraft, PresetStore, SaveStatus,
};

use super::events::ProgressReporter;
use super::settings::ClientSettings;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum View {
    List,
    Editor { target: Option<String> },
}

#[derive(Debug, Clone)]
pub struct DownloadReport {
    pub scope: String,
    pub result: BatchResult,
}

impl DownloadReport {
    pub fn summary(&self) -> String {
        self.result.summary(&self.scope)
    }
}

pub struct AppState {
    catalog: PresetCatalog,
    orchestrator: DownloadOrchestrator,
    search: Option<HttpArtifactClient>,
    view: Mutex<View>,
    selection: Mutex<HashSet<String>>,
    active_batch: Mutex<Option<CancellationToken>>,
}

impl AppState {
    pub fn new(
        store: Arc<dyn PresetStore>,
        downloader: Arc<dyn ArtifactDownloader>,
        limits: BatchLimits,
    ) -> Self {
        Self {
            catalog: PresetCatalog::new(store),
            orchestrator: DownloadOrchestrator::new(downloader, limits),
            search: None,
            view: Mutex::new(View::List),
            selection: Mutex::new(HashSet::new()),
            active_batch: Mutex::new(None),
        }
    }

    pub fn from_settings(settings: &ClientSettings) -> Result<Self> {
        let http = HttpArtifactClient::build_http_client(settings.connect_timeout())
            .context("building http client failed")?;
        let client = HttpArtifactClient::new(http.clone(), &settings.server_url);
        let store: Arc<dyn PresetStore> = match &settings.presets_file {
            Some(path) => {
                tracing::info!("using local preset file {path:?}");
                Arc::new(FilePresetStore::new(path.clone()))
            }
            None => Arc::new(HttpPresetStore::new(http, &settings.server_url)),
        };
        let mut state = Self::new(store, Arc::new(client.clone()), settings.batch_limits());
        state.search = Some(client);
        Ok(state)
    }

    pub fn catalog(&self) -> &PresetCatalog {
        &self.catalog
    }

    pub fn view(&self) -> View {
        self.view.lock().clone()
    }

    pub fn begin_edit(&self, target: Option<String>) {
        *self.view.lock() = View::Editor { target };
    }

    pub fn close_editor(&self) {
        *self.view.lock() = View::List;
    }

    pub fn set_selected(&self, id: &str, selected: bool) {
        let mut guard = self.selection.lock();
        if selected {
            guard.insert(id.to_string());
        } else {
            guard.remove(id);
        }
    }

    pub fn clear_selection(&self) {
        self.selection.lock().clear();
    }

    pub fn selection(&self) -> Vec<String> {
        let mut ids: Vec<_> = self.selection.lock().iter().cloned().collect();
        ids.sort();
        ids
    }

    pub fn is_downloading(&self) -> bool {
        self.active_batch.lock().is_some()
    }

    pub fn cancel_active_batch(&self) -> bool {
        match self.active_batch.lock().as_ref() {
            Some(token) => {
                tracing::info!("cancelling active batch");
                token.cancel();
                true
            }
            None => false,
        }
    }

    pub async fn download_preset(
        &self,
        id: &str,
        reporter: &dyn ProgressReporter,
    ) -> Result<DownloadReport> {
        let guard = self.begin_batch()?;
        let preset = self.catalog.get(id).await?;
        let result = self
            .orchestrator
            .download_preset(&preset, reporter, guard.token())
            .await?;
        Ok(DownloadReport {
            scope: format!("preset \"{}\"", preset.label()),
            result,
        })
    }

    pub async fn download_selected(&self, reporter: &dyn ProgressReporter) -> Result<DownloadReport> {
        let guard = self.begin_batch()?;
        let ids = self.selection.lock().clone();
        let presets = self.catalog.resolve_selection(&ids).await?;
        let result = self
            .orchestrator
            .download_presets(&presets, reporter, guard.token())
            .await?;
        Ok(DownloadReport {
            scope: format!("{} preset(s)", presets.len()),
            result,
        })
    }

    pub async fn save_preset(&self, draft: PresetDraft) -> Result<(Preset, SaveStatus)> {
        let target = match self.view() {
            View::Editor { target } => target,
            View::List => None,
        };
        let saved = match target {
            Some(id) => self
                .catalog
                .update(&id, draft)
                .await
                .with_context(|| format!("updating preset {id}"))?,
            None => self.catalog.create(draft).await.context("creating preset")?,
        };
        self.close_editor();
        Ok(saved)
    }

    pub async fn delete_preset(&self, id: &str) -> Result<SaveStatus> {
        let status = self.catalog.delete(id).await?;
        self.selection.lock().remove(id);
        Ok(status)
    }

    pub async fn delete_selected(&self) -> Result<usize> {
        let ids = self.selection.lock().clone();
        let mut document = self.catalog.export_all().await?;
        let before = document.presets.len();
        document.presets.retain(|preset| !ids.contains(&preset.id));
        let removed = before - document.presets.len();
        if removed > 0 {
            self.catalog.replace_all(document).await?;
        }
        self.clear_selection();
        Ok(removed)
    }

    pub async fn import_json(&self, text: &str) -> Result<(usize, SaveStatus)> {
        Ok(self.catalog.import_json(text).await.context("import failed")?)
    }

    pub async fn export_json(&self) -> Result<String> {
        Ok(self.catalog.export_json().await?)
    }

    pub async fn apply_raw_edit(&self, text: &str) -> Result<SaveStatus> {
        let (count, status) = self
            .catalog
            .import_json(text)
            .await
            .context("raw edit rejected")?;
        tracing::info!(count, "raw preset document applied");
        Ok(status)
    }

    pub async fn search_models(&self, query: &str, limit: u32) -> Result<Vec<HubModel>> {
        let client = self
            .search
            .as_ref()
            .context("model search is not configured")?;
        Ok(client.search_models(query, limit).await?)
    }

    fn begin_batch(&self) -> Result<BatchGuard<'_>, BatchError> {
        let mut slot = self.active_batch.lock();
        if slot.is_some() {
            return Err(BatchError::Busy);
        }
        let token = CancellationToken::new();
        *slot = Some(token.clone());
        Ok(BatchGuard {
            slot: &self.active_batch,
            token,
        })
    }
}

struct BatchGuard<'a> {
    slot: &'a Mutex<Option<CancellationToken>>,
    token: CancellationToken,
}

impl BatchGuard<'_> {
    fn token(&self) -> &CancellationToken {
        &self.token
    }
}

impl Drop for BatchGuard<'_> {
    fn drop(&mut self) {
        self.slot.lock().take();
    }
}
