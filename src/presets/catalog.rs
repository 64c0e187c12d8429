use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;

use serde::Serialize;
use thiserror::Error;
use time::OffsetDateTime;

use super::store::{PresetStore, SaveStatus, StoreError};
use super::types::{ArtifactSource, ArtifactSpec, Preset, PresetDocument, DEFAULT_CATEGORY};

pub const EXPORT_FILE_NAME: &str = "custom-presets.json";

#[derive(Debug, Error)]
pub enum CatalogError {
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error("Preset not found: {0}")]
    NotFound(String),
    #[error("{0}")]
    Invalid(String),
    #[error("Invalid JSON: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("No presets found")]
    NothingSelected,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PresetDraft {
    pub name: String,
    pub category: String,
    pub models: Vec<ArtifactSpec>,
}

impl PresetDraft {
    fn into_preset(self, id: String) -> Preset {
        let category = self.category.trim();
        Preset {
            id,
            name: self.name.trim().to_string(),
            category: if category.is_empty() {
                DEFAULT_CATEGORY.to_string()
            } else {
                category.to_string()
            },
            models: self.models,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CatalogStats {
    pub categories: usize,
    pub presets: usize,
}

/// CRUD over the preset document. Each call loads the current document, edits
/// it in memory and writes the whole thing back; concurrent writers race and
/// the last write wins.
#[derive(Clone)]
pub struct PresetCatalog {
    store: Arc<dyn PresetStore>,
}

impl PresetCatalog {
    pub fn new(store: Arc<dyn PresetStore>) -> Self {
        Self { store }
    }

    pub async fn list(&self) -> Result<Vec<Preset>, CatalogError> {
        Ok(self.store.load().await?.presets)
    }

    pub async fn get(&self, id: &str) -> Result<Preset, CatalogError> {
        self.store
            .load()
            .await?
            .find(id)
            .cloned()
            .ok_or_else(|| CatalogError::NotFound(id.to_string()))
    }

    pub async fn create(&self, draft: PresetDraft) -> Result<(Preset, SaveStatus), CatalogError> {
        validate(&draft.name, &draft.models)?;
        let mut document = self.store.load().await?;
        let preset = draft.into_preset(next_preset_id(&document));
        document.presets.push(preset.clone());
        let status = self.store.save(&document).await?;
        tracing::info!(id = %preset.id, name = %preset.name, "created preset");
        Ok((preset, status))
    }

    pub async fn update(
        &self,
        id: &str,
        draft: PresetDraft,
    ) -> Result<(Preset, SaveStatus), CatalogError> {
        validate(&draft.name, &draft.models)?;
        let mut document = self.store.load().await?;
        let slot = document
            .presets
            .iter_mut()
            .find(|preset| preset.id == id)
            .ok_or_else(|| CatalogError::NotFound(id.to_string()))?;
        let preset = draft.into_preset(id.to_string());
        *slot = preset.clone();
        let status = self.store.save(&document).await?;
        tracing::info!(id, "updated preset");
        Ok((preset, status))
    }

    pub async fn upsert(&self, preset: Preset) -> Result<SaveStatus, CatalogError> {
        validate(&preset.name, &preset.models)?;
        let mut document = self.store.load().await?;
        match document.presets.iter_mut().find(|current| current.id == preset.id) {
            Some(existing) => *existing = preset,
            None => document.presets.push(preset),
        }
        Ok(self.store.save(&document).await?)
    }

    pub async fn delete(&self, id: &str) -> Result<SaveStatus, CatalogError> {
        let mut document = self.store.load().await?;
        let before = document.presets.len();
        document.presets.retain(|preset| preset.id != id);
        if document.presets.len() == before {
            return Err(CatalogError::NotFound(id.to_string()));
        }
        let status = self.store.save(&document).await?;
        tracing::info!(id, "deleted preset");
        Ok(status)
    }

    pub async fn replace_all(&self, mut document: PresetDocument) -> Result<SaveStatus, CatalogError> {
        let collapsed = document.dedupe_ids();
        if collapsed > 0 {
            tracing::warn!(collapsed, "duplicate preset ids collapsed, later entries kept");
        }
        Ok(self.store.save(&document).await?)
    }

    pub async fn export_all(&self) -> Result<PresetDocument, CatalogError> {
        Ok(self.store.load().await?)
    }

    pub async fn export_json(&self) -> Result<String, CatalogError> {
        let document = self.export_all().await?;
        Ok(serde_json::to_string_pretty(&document)?)
    }

    /// Replaces the collection with a raw JSON document. Nothing is written when
    /// parsing fails. The count is of presets stored, after duplicates collapse.
    pub async fn import_json(&self, text: &str) -> Result<(usize, SaveStatus), CatalogError> {
        let mut document: PresetDocument = serde_json::from_str(text)?;
        let collapsed = document.dedupe_ids();
        if collapsed > 0 {
            tracing::warn!(collapsed, "duplicate preset ids collapsed, later entries kept");
        }
        let count = document.presets.len();
        let status = self.replace_all(document).await?;
        tracing::info!(count, "imported presets");
        Ok((count, status))
    }

    pub async fn stats(&self) -> Result<CatalogStats, CatalogError> {
        let document = self.store.load().await?;
        let categories: HashSet<&str> = document
            .presets
            .iter()
            .map(|preset| preset.category.as_str())
            .filter(|category| !category.is_empty())
            .collect();
        Ok(CatalogStats {
            categories: categories.len(),
            presets: document.presets.len(),
        })
    }

    pub async fn grouped_by_category(&self) -> Result<BTreeMap<String, Vec<Preset>>, CatalogError> {
        let mut groups: BTreeMap<String, Vec<Preset>> = BTreeMap::new();
        for preset in self.list().await? {
            groups.entry(preset.category.clone()).or_default().push(preset);
        }
        Ok(groups)
    }

    pub async fn resolve_selection(&self, ids: &HashSet<String>) -> Result<Vec<Preset>, CatalogError> {
        if ids.is_empty() {
            return Err(CatalogError::NothingSelected);
        }
        let selected: Vec<Preset> = self
            .list()
            .await?
            .into_iter()
            .filter(|preset| ids.contains(&preset.id))
            .collect();
        if selected.is_empty() {
            return Err(CatalogError::NothingSelected);
        }
        Ok(selected)
    }
}

fn next_preset_id(document: &PresetDocument) -> String {
    let mut millis = OffsetDateTime::now_utc().unix_timestamp_nanos() / 1_000_000;
    loop {
        let candidate = format!("preset-{millis}");
        if document.find(&candidate).is_none() {
            return candidate;
        }
        millis += 1;
    }
}

pub fn validate(name: &str, models: &[ArtifactSpec]) -> Result<(), CatalogError> {
    if name.trim().is_empty() {
        return Err(CatalogError::Invalid("Preset name is required".into()));
    }
    for (index, model) in models.iter().enumerate() {
        let number = index + 1;
        match &model.source {
            ArtifactSource::Direct { direct_url } if direct_url.trim().is_empty() => {
                return Err(CatalogError::Invalid(format!(
                    "Model #{number}: Direct URL is required"
                )));
            }
            ArtifactSource::Repository { model_id, .. } if model_id.trim().is_empty() => {
                return Err(CatalogError::Invalid(format!(
                    "Model #{number}: HuggingFace Model ID is required"
                )));
            }
            _ => {}
        }
        if model.save_path.trim().is_empty() {
            return Err(CatalogError::Invalid(format!(
                "Model #{number}: Custom folder path is required"
            )));
        }
    }
    Ok(())
}
