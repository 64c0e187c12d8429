mod catalog;
mod store;
mod types;

pub use catalog::{
    validate as validate_preset, CatalogError, CatalogStats, PresetCatalog, PresetDraft,
    EXPORT_FILE_NAME,
};
pub use store::{FilePresetStore, HttpPresetStore, PresetStore, SaveStatus, StoreError, PRESETS_ROUTE};
pub use types::{
    normalize_preset, ArtifactSource, ArtifactSpec, ModelSpecError, Preset, PresetDocument,
    RawPreset, DEFAULT_CATEGORY, KNOWN_SAVE_FOLDERS, LEGACY_SAVE_PATH,
};
