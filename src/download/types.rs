use serde::Serialize;
use thiserror::Error;

use crate::presets::{ArtifactSpec, Preset};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum DownloadErrorKind {
    TransportFailure,
    HttpError,
    AmbiguousResponse,
    RemoteTimeout,
    RemoteConnectionIssue,
    RemoteGenericFailure,
    ClientTimeout,
    Cancelled,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "camelCase")]
pub enum DownloadOutcome {
    Success {
        path: Option<String>,
        message: Option<String>,
    },
    Error {
        kind: DownloadErrorKind,
        message: String,
    },
}

impl DownloadOutcome {
    #[must_use]
    pub fn is_success(&self) -> bool {
        matches!(self, DownloadOutcome::Success { .. })
    }

    pub fn error(kind: DownloadErrorKind, message: impl Into<String>) -> Self {
        DownloadOutcome::Error {
            kind,
            message: message.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchItem {
    pub preset_label: Option<String>,
    pub spec: ArtifactSpec,
}

impl BatchItem {
    pub fn new(spec: ArtifactSpec) -> Self {
        Self {
            preset_label: None,
            spec,
        }
    }

    pub fn from_preset(preset: &Preset, spec: ArtifactSpec) -> Self {
        Self {
            preset_label: Some(preset.label().to_string()),
            spec,
        }
    }

    #[must_use]
    pub fn artifact_label(&self) -> String {
        self.spec.label()
    }

    #[must_use]
    pub fn display_label(&self) -> String {
        match &self.preset_label {
            Some(preset) => format!("{} ({preset})", self.artifact_label()),
            None => self.artifact_label(),
        }
    }
}

pub fn flatten_presets<'a>(presets: impl IntoIterator<Item = &'a Preset>) -> Vec<BatchItem> {
    presets
        .into_iter()
        .flat_map(|preset| {
            preset
                .models
                .iter()
                .cloned()
                .map(move |spec| BatchItem::from_preset(preset, spec))
        })
        .collect()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum ArtifactState {
    Pending,
    Requested,
    Succeeded,
    Failed,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ArtifactReport {
    pub index: usize,
    pub artifact_label: String,
    pub preset_label: Option<String>,
    pub state: ArtifactState,
    pub outcome: Option<DownloadOutcome>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchFailure {
    pub artifact_label: String,
    pub preset_label: Option<String>,
    pub kind: DownloadErrorKind,
    pub message: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum BatchCompletion {
    Completed,
    Cancelled,
    DeadlineExceeded,
}

/// Tally of one batch run. `success_count + error_count` equals the number of
/// attempted artifacts; anything not attempted is counted in `skipped`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchResult {
    pub batch_id: String,
    pub total: usize,
    pub success_count: usize,
    pub error_count: usize,
    pub skipped: usize,
    pub completion: BatchCompletion,
    pub errors: Vec<BatchFailure>,
    pub artifacts: Vec<ArtifactReport>,
}

impl BatchResult {
    pub(crate) fn pending(batch_id: String, items: &[BatchItem]) -> Self {
        let artifacts = items
            .iter()
            .enumerate()
            .map(|(position, item)| ArtifactReport {
                index: position + 1,
                artifact_label: item.artifact_label(),
                preset_label: item.preset_label.clone(),
                state: ArtifactState::Pending,
                outcome: None,
            })
            .collect();
        Self {
            batch_id,
            total: items.len(),
            success_count: 0,
            error_count: 0,
            skipped: 0,
            completion: BatchCompletion::Completed,
            errors: Vec::new(),
            artifacts,
        }
    }

    pub(crate) fn mark_requested(&mut self, position: usize) {
        self.artifacts[position].state = ArtifactState::Requested;
    }

    pub(crate) fn record(&mut self, position: usize, outcome: DownloadOutcome) {
        let report = &mut self.artifacts[position];
        match &outcome {
            DownloadOutcome::Success { .. } => {
                report.state = ArtifactState::Succeeded;
                self.success_count += 1;
            }
            DownloadOutcome::Error { kind, message } => {
                report.state = ArtifactState::Failed;
                self.error_count += 1;
                self.errors.push(BatchFailure {
                    artifact_label: report.artifact_label.clone(),
                    preset_label: report.preset_label.clone(),
                    kind: *kind,
                    message: message.clone(),
                });
            }
        }
        report.outcome = Some(outcome);
    }

    pub(crate) fn finish(&mut self, completion: BatchCompletion) {
        self.skipped = self.total - self.attempted();
        self.completion = completion;
    }

    #[must_use]
    pub fn attempted(&self) -> usize {
        self.success_count + self.error_count
    }

    #[must_use]
    pub fn is_complete_success(&self) -> bool {
        self.error_count == 0 && self.skipped == 0
    }

    #[must_use]
    pub fn summary(&self, scope: &str) -> String {
        let mut text = if self.error_count == 0 {
            format!(
                "Successfully downloaded {} model(s) from {scope}",
                self.success_count
            )
        } else {
            let listed = self
                .errors
                .iter()
                .map(|failure| match &failure.preset_label {
                    Some(preset) => {
                        format!("{preset}/{}: {}", failure.artifact_label, failure.message)
                    }
                    None => format!("{}: {}", failure.artifact_label, failure.message),
                })
                .collect::<Vec<_>>()
                .join("; ");
            format!(
                "Downloaded {} of {} model(s). Errors: {listed}",
                self.success_count, self.total
            )
        };
        match self.completion {
            BatchCompletion::Completed => {}
            BatchCompletion::Cancelled => {
                text.push_str(&format!(" ({} skipped after cancel)", self.skipped));
            }
            BatchCompletion::DeadlineExceeded => {
                text.push_str(&format!(" ({} skipped, batch time limit reached)", self.skipped));
            }
        }
        text
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum BatchError {
    #[error("No models to download")]
    NothingToDownload,
    #[error("A download batch is already running")]
    Busy,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::presets::DEFAULT_CATEGORY;

    fn preset(id: &str, name: &str, urls: &[&str]) -> Preset {
        Preset {
            id: id.into(),
            name: name.into(),
            category: DEFAULT_CATEGORY.into(),
            models: urls
                .iter()
                .map(|url| ArtifactSpec::direct(*url, "checkpoints"))
                .collect(),
        }
    }

    #[test]
    fn flatten_keeps_preset_then_model_order() {
        let presets = vec![
            preset("p1", "First", &["https://h/a.bin", "https://h/b.bin"]),
            preset("p2", "", &["https://h/c.bin"]),
        ];
        let items = flatten_presets(&presets);
        let labels: Vec<_> = items.iter().map(BatchItem::display_label).collect();
        assert_eq!(labels, vec!["a.bin (First)", "b.bin (First)", "c.bin (p2)"]);
    }

    #[test]
    fn summary_lists_failures_with_presets() {
        let items = flatten_presets(&[preset("p1", "Pack", &["https://h/a.bin", "https://h/b.bin"])]);
        let mut result = BatchResult::pending("batch".into(), &items);
        result.record(0, DownloadOutcome::Success { path: Some("/m/a.bin".into()), message: None });
        result.record(1, DownloadOutcome::error(DownloadErrorKind::HttpError, "HTTP 500: boom"));
        result.finish(BatchCompletion::Completed);

        assert_eq!(result.attempted(), 2);
        assert!(!result.is_complete_success());
        assert_eq!(
            result.summary("preset \"Pack\""),
            "Downloaded 1 of 2 model(s). Errors: Pack/b.bin: HTTP 500: boom"
        );
    }

    #[test]
    fn summary_for_cancelled_batch_mentions_skipped() {
        let items = flatten_presets(&[preset("p", "P", &["https://h/a", "https://h/b"])]);
        let mut result = BatchResult::pending("batch".into(), &items);
        result.record(0, DownloadOutcome::Success { path: None, message: None });
        result.finish(BatchCompletion::Cancelled);

        assert_eq!(result.skipped, 1);
        assert_eq!(result.artifacts[1].state, ArtifactState::Pending);
        assert_eq!(
            result.summary("1 preset(s)"),
            "Successfully downloaded 1 model(s) from 1 preset(s) (1 skipped after cancel)"
        );
    }
}
