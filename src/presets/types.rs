use serde::{Deserialize, Serialize};
use thiserror::Error;

pub const DEFAULT_CATEGORY: &str = "Uncategorized";
pub const LEGACY_SAVE_PATH: &str = "checkpoints";

pub const KNOWN_SAVE_FOLDERS: &[&str] = &[
    "checkpoints",
    "diffusion_models",
    "loras",
    "vae",
    "text_encoders",
    "upscale_models",
    "clip",
    "clip_vision",
    "controlnet",
    "embeddings",
    "hypernetworks",
    "diffusers",
    "onnx",
    "ipadapter",
    "gligen",
    "audio_encoders",
    "configs",
    "model_patches",
    "photomaker",
    "sams",
    "style_models",
    "unet",
    "vae_approx",
    "vibevoice",
];

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ModelSpecError {
    #[error("model entry has neither a direct_url nor a model_id")]
    MissingSource,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ArtifactSource {
    Direct { direct_url: String },
    Repository { model_id: String, model_path: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "RawArtifact", into = "RawArtifact")]
pub struct ArtifactSpec {
    pub source: ArtifactSource,
    pub save_path: String,
    pub hf_token: String,
}

impl ArtifactSpec {
    pub fn direct(url: impl Into<String>, save_path: impl Into<String>) -> Self {
        Self {
            source: ArtifactSource::Direct {
                direct_url: url.into(),
            },
            save_path: save_path.into(),
            hf_token: String::new(),
        }
    }

    pub fn repository(
        model_id: impl Into<String>,
        model_path: impl Into<String>,
        save_path: impl Into<String>,
    ) -> Self {
        Self {
            source: ArtifactSource::Repository {
                model_id: model_id.into(),
                model_path: model_path.into(),
            },
            save_path: save_path.into(),
            hf_token: String::new(),
        }
    }

    #[must_use]
    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.hf_token = token.into();
        self
    }

    #[must_use]
    pub fn label(&self) -> String {
        match &self.source {
            ArtifactSource::Direct { direct_url } => url_file_name(direct_url)
                .map(ToOwned::to_owned)
                .unwrap_or_else(|| "Direct URL".into()),
            ArtifactSource::Repository { model_id, .. } => model_id.clone(),
        }
    }

    #[must_use]
    pub fn token(&self) -> Option<&str> {
        let token = self.hf_token.trim();
        (!token.is_empty()).then_some(token)
    }

    #[must_use]
    pub fn uses_custom_folder(&self) -> bool {
        !KNOWN_SAVE_FOLDERS.contains(&self.save_path.as_str())
    }
}

fn url_file_name(url: &str) -> Option<&str> {
    let without_query = url.split(['?', '#']).next().unwrap_or(url);
    without_query
        .rsplit('/')
        .next()
        .filter(|segment| !segment.is_empty())
}

/// On-disk shape of a model entry. Both source fields may be present after a
/// raw edit; a non-empty `direct_url` wins.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct RawArtifact {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    direct_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    model_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    model_path: Option<String>,
    #[serde(default)]
    save_path: String,
    #[serde(default)]
    hf_token: String,
}

impl TryFrom<RawArtifact> for ArtifactSpec {
    type Error = ModelSpecError;

    fn try_from(raw: RawArtifact) -> Result<Self, Self::Error> {
        let direct_url = raw.direct_url.filter(|url| !url.trim().is_empty());
        let model_id = raw.model_id.filter(|id| !id.trim().is_empty());
        let source = match (direct_url, model_id) {
            (Some(direct_url), _) => ArtifactSource::Direct { direct_url },
            (None, Some(model_id)) => ArtifactSource::Repository {
                model_id,
                model_path: raw.model_path.unwrap_or_default(),
            },
            (None, None) => return Err(ModelSpecError::MissingSource),
        };
        Ok(Self {
            source,
            save_path: raw.save_path,
            hf_token: raw.hf_token,
        })
    }
}

impl From<ArtifactSpec> for RawArtifact {
    fn from(spec: ArtifactSpec) -> Self {
        let (direct_url, model_id, model_path) = match spec.source {
            ArtifactSource::Direct { direct_url } => (Some(direct_url), None, None),
            ArtifactSource::Repository {
                model_id,
                model_path,
            } => (None, Some(model_id), Some(model_path)),
        };
        Self {
            direct_url,
            model_id,
            model_path,
            save_path: spec.save_path,
            hf_token: spec.hf_token,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "RawPreset")]
pub struct Preset {
    pub id: String,
    pub name: String,
    pub category: String,
    pub models: Vec<ArtifactSpec>,
}

impl Preset {
    #[must_use]
    pub fn label(&self) -> &str {
        if self.name.trim().is_empty() {
            &self.id
        } else {
            &self.name
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawPreset {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub models: Option<Vec<ArtifactSpec>>,
    #[serde(default)]
    pub model_id: Option<String>,
    #[serde(default)]
    pub model_path: Option<String>,
    #[serde(default)]
    pub save_path: Option<String>,
    #[serde(default)]
    pub hf_token: Option<String>,
}

impl From<RawPreset> for Preset {
    fn from(raw: RawPreset) -> Self {
        normalize_preset(raw)
    }
}

/// Turns any stored preset shape into the current one. A `models` list always
/// wins; otherwise legacy single-model keys become a one element list.
#[must_use]
pub fn normalize_preset(raw: RawPreset) -> Preset {
    let category = raw
        .category
        .map(|category| category.trim().to_string())
        .filter(|category| !category.is_empty())
        .unwrap_or_else(|| DEFAULT_CATEGORY.to_string());

    let models = match raw.models {
        Some(models) => models,
        None => match raw.model_id.filter(|id| !id.trim().is_empty()) {
            Some(model_id) => vec![ArtifactSpec {
                source: ArtifactSource::Repository {
                    model_id,
                    model_path: raw.model_path.unwrap_or_default(),
                },
                save_path: raw
                    .save_path
                    .filter(|path| !path.is_empty())
                    .unwrap_or_else(|| LEGACY_SAVE_PATH.to_string()),
                hf_token: raw.hf_token.unwrap_or_default(),
            }],
            None => Vec::new(),
        },
    };

    Preset {
        id: raw.id,
        name: raw.name,
        category,
        models,
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PresetDocument {
    #[serde(default)]
    pub categories: Vec<serde_json::Value>,
    #[serde(default)]
    pub presets: Vec<Preset>,
}

impl PresetDocument {
    pub fn find(&self, id: &str) -> Option<&Preset> {
        self.presets.iter().find(|preset| preset.id == id)
    }

    pub fn dedupe_ids(&mut self) -> usize {
        let mut kept: Vec<Preset> = Vec::with_capacity(self.presets.len());
        let mut collapsed = 0;
        for preset in self.presets.drain(..) {
            if let Some(existing) = kept.iter_mut().find(|current| current.id == preset.id) {
                *existing = preset;
                collapsed += 1;
            } else {
                kept.push(preset);
            }
        }
        self.presets = kept;
        collapsed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn direct_label_uses_last_segment_without_query() {
        let spec = ArtifactSpec::direct(
            "https://example.com/files/model.safetensors?download=true",
            "checkpoints",
        );
        assert_eq!(spec.label(), "model.safetensors");

        let bare = ArtifactSpec::direct("https://example.com/files/", "loras");
        assert_eq!(bare.label(), "Direct URL");
    }

    #[test]
    fn repository_label_is_model_id() {
        let spec = ArtifactSpec::repository("org/model", "", "vae");
        assert_eq!(spec.label(), "org/model");
        assert!(!spec.uses_custom_folder());
    }

    #[test]
    fn non_empty_direct_url_wins_over_model_id() {
        let spec: ArtifactSpec = serde_json::from_value(json!({
            "direct_url": "https://example.com/a.bin",
            "model_id": "org/ignored",
            "save_path": "loras"
        }))
        .unwrap();
        assert!(matches!(spec.source, ArtifactSource::Direct { .. }));

        let spec: ArtifactSpec = serde_json::from_value(json!({
            "direct_url": "",
            "model_id": "org/used",
            "save_path": "loras"
        }))
        .unwrap();
        assert_eq!(spec.label(), "org/used");
    }

    #[test]
    fn entry_without_source_is_rejected() {
        let parsed = serde_json::from_value::<ArtifactSpec>(json!({ "save_path": "vae" }));
        assert!(parsed.is_err());
    }

    #[test]
    fn legacy_preset_is_normalized() {
        let preset: Preset = serde_json::from_value(json!({
            "id": "preset-1",
            "name": "Legacy",
            "model_id": "org/model",
            "model_path": "weights.safetensors"
        }))
        .unwrap();

        assert_eq!(preset.category, DEFAULT_CATEGORY);
        assert_eq!(preset.models.len(), 1);
        assert_eq!(preset.models[0].save_path, LEGACY_SAVE_PATH);
        assert_eq!(
            preset.models[0].source,
            ArtifactSource::Repository {
                model_id: "org/model".into(),
                model_path: "weights.safetensors".into(),
            }
        );
    }

    #[test]
    fn serialized_shape_matches_store_schema() {
        let spec = ArtifactSpec::repository("org/model", "", "unet").with_token("hf_x");
        let value = serde_json::to_value(&spec).unwrap();
        assert_eq!(
            value,
            json!({
                "model_id": "org/model",
                "model_path": "",
                "save_path": "unet",
                "hf_token": "hf_x"
            })
        );
    }

    #[test]
    fn dedupe_keeps_last_content_in_first_slot() {
        let mut document = PresetDocument {
            categories: vec![],
            presets: vec![
                preset("a", "first"),
                preset("b", "other"),
                preset("a", "second"),
            ],
        };
        assert_eq!(document.dedupe_ids(), 1);
        let names: Vec<_> = document.presets.iter().map(|p| p.name.as_str()).collect();
        assert_eq!(names, vec!["second", "other"]);
    }

    fn preset(id: &str, name: &str) -> Preset {
        Preset {
            id: id.into(),
            name: name.into(),
            category: DEFAULT_CATEGORY.into(),
            models: vec![],
        }
    }
}
