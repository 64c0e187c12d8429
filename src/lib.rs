pub mod core;
pub mod download;
pub mod presets;

pub use crate::core::app_state::{AppState, DownloadReport, View};
pub use crate::core::events::{ChannelReporter, ProgressReporter, TracingReporter};
pub use crate::core::settings::{ClientSettings, SettingsManager};
