use std::{
    fs,
    path::{Path, PathBuf},
    time::Duration,
};

use anyhow::{Context, Result};
use directories::ProjectDirs;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use crate::download::BatchLimits;

const CONFIG_FILE: &str = "config.json";
pub const DEFAULT_SERVER_URL: &str = "http://127.0.0.1:8188";
pub const ENV_SERVER_URL: &str = "PDM_SERVER_URL";
pub const ENV_PRESETS_FILE: &str = "PDM_PRESETS_FILE";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ClientSettings {
    pub server_url: String,
    pub connect_timeout_secs: u64,
    pub artifact_timeout_secs: Option<u64>,
    pub batch_timeout_secs: Option<u64>,
    pub presets_file: Option<PathBuf>,
}

impl Default for ClientSettings {
    fn default() -> Self {
        Self {
            server_url: DEFAULT_SERVER_URL.into(),
            connect_timeout_secs: 10,
            artifact_timeout_secs: None,
            batch_timeout_secs: None,
            presets_file: None,
        }
    }
}

impl ClientSettings {
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    pub fn batch_limits(&self) -> BatchLimits {
        BatchLimits {
            artifact_timeout: self.artifact_timeout_secs.map(Duration::from_secs),
            batch_timeout: self.batch_timeout_secs.map(Duration::from_secs),
        }
    }

    pub fn with_overrides(mut self, lookup: impl Fn(&str) -> Option<String>) -> Self {
        let present = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());
        if let Some(url) = present(ENV_SERVER_URL) {
            self.server_url = url.trim().to_string();
        }
        if let Some(path) = present(ENV_PRESETS_FILE) {
            self.presets_file = Some(PathBuf::from(path.trim()));
        }
        self
    }
}

pub struct SettingsManager {
    path: PathBuf,
    inner: RwLock<ClientSettings>,
}

impl SettingsManager {
    pub fn new() -> Result<Self> {
        Self::with_path(resolve_config_path()?)
    }

    pub fn with_path(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let settings = load_settings(&path)?;
        Ok(Self {
            path,
            inner: RwLock::new(settings),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn read(&self) -> ClientSettings {
        self.inner.read().clone()
    }

    pub fn effective(&self) -> ClientSettings {
        self.read().with_overrides(|key| std::env::var(key).ok())
    }

    pub fn write(&self, settings: ClientSettings) -> Result<()> {
        let mut guard = self.inner.write();
        persist_settings(&self.path, &settings)?;
        *guard = settings;
        Ok(())
    }
}

fn resolve_config_path() -> Result<PathBuf> {
    let project_dirs = ProjectDirs::from("com", "PresetDownloads", "PresetDownloads")
        .context("missing project directories")?;
    let dir = project_dirs.config_dir();
    fs::create_dir_all(dir).context("creating config directory failed")?;
    Ok(dir.join(CONFIG_FILE))
}

fn load_settings(path: &Path) -> Result<ClientSettings> {
    if !path.exists() {
        return Ok(ClientSettings::default());
    }
    let bytes = fs::read(path).with_context(|| format!("failed reading {path:?}"))?;
    serde_json::from_slice(&bytes).context("config json could not be parsed")
}

fn persist_settings(path: &Path, settings: &ClientSettings) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).with_context(|| format!("create dir {parent:?}"))?;
    }
    let serialized =
        serde_json::to_vec_pretty(settings).context("serialize settings to json failed")?;
    fs::write(path, serialized).with_context(|| format!("write settings to {path:?}"))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_file_yields_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let manager = SettingsManager::with_path(dir.path().join(CONFIG_FILE)).unwrap();
        assert_eq!(manager.read(), ClientSettings::default());
        assert_eq!(manager.read().batch_limits(), BatchLimits::default());
    }

    #[test]
    fn write_then_reopen_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join(CONFIG_FILE);
        let manager = SettingsManager::with_path(&path).unwrap();
        let settings = ClientSettings {
            server_url: "http://gpu-box:8188".into(),
            artifact_timeout_secs: Some(900),
            ..ClientSettings::default()
        };
        manager.write(settings.clone()).unwrap();

        let reopened = SettingsManager::with_path(&path).unwrap();
        assert_eq!(reopened.read(), settings);
        assert_eq!(
            reopened.read().batch_limits().artifact_timeout,
            Some(Duration::from_secs(900))
        );
    }

    #[test]
    fn partial_file_fills_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(CONFIG_FILE);
        fs::write(&path, r#"{ "batchTimeoutSecs": 3600 }"#).unwrap();

        let settings = SettingsManager::with_path(&path).unwrap().read();
        assert_eq!(settings.server_url, DEFAULT_SERVER_URL);
        assert_eq!(settings.connect_timeout_secs, 10);
        assert_eq!(settings.batch_timeout_secs, Some(3600));
    }

    #[test]
    fn corrupt_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(CONFIG_FILE);
        fs::write(&path, "{ nope").unwrap();
        assert!(SettingsManager::with_path(&path).is_err());
    }

    #[test]
    fn overrides_replace_non_blank_values() {
        let settings = ClientSettings::default().with_overrides(|key| match key {
            ENV_SERVER_URL => Some(" http://other:9000 ".into()),
            ENV_PRESETS_FILE => Some("  ".into()),
            _ => None,
        });
        assert_eq!(settings.server_url, "http://other:9000");
        assert_eq!(settings.presets_file, None);
    }
}
