use crossbeam_channel::Sender;
use serde::Serialize;

use crate::download::BatchResult;

pub const EVENT_ARTIFACT_STARTED: &str = "artifact-started";
pub const EVENT_ARTIFACT_PROGRESS: &str = "artifact-progress";
pub const EVENT_BATCH_FINISHED: &str = "batch-finished";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ArtifactStarted {
    pub index: usize,
    pub total: usize,
    pub label: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub preset_label: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ArtifactProgress {
    pub index: usize,
    pub total: usize,
    pub label: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub save_path: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
}

/// Receives batch progress. Calls arrive in order from the task running the
/// batch; `on_start` for item `i + 1` always follows the outcome of item `i`.
pub trait ProgressReporter: Send + Sync {
    fn on_start(&self, event: &ArtifactStarted);
    fn on_progress(&self, event: &ArtifactProgress);
    fn on_finish(&self, result: &BatchResult);
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "event", content = "payload", rename_all = "kebab-case")]
pub enum BatchEvent {
    ArtifactStarted(ArtifactStarted),
    ArtifactProgress(ArtifactProgress),
    BatchFinished(BatchResult),
}

impl BatchEvent {
    pub fn name(&self) -> &'static str {
        match self {
            BatchEvent::ArtifactStarted(_) => EVENT_ARTIFACT_STARTED,
            BatchEvent::ArtifactProgress(_) => EVENT_ARTIFACT_PROGRESS,
            BatchEvent::BatchFinished(_) => EVENT_BATCH_FINISHED,
        }
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct TracingReporter;

impl ProgressReporter for TracingReporter {
    fn on_start(&self, event: &ArtifactStarted) {
        match &event.preset_label {
            Some(preset) => tracing::info!(
                "Downloading {}/{}: {} ({preset})",
                event.index,
                event.total,
                event.label
            ),
            None => tracing::info!("Downloading {}/{}: {}", event.index, event.total, event.label),
        }
    }

    fn on_progress(&self, event: &ArtifactProgress) {
        let path = event.save_path.as_deref().unwrap_or_default();
        match &event.note {
            Some(note) => tracing::info!("Saved {} to {path} ({note})", event.label),
            None => tracing::info!("Saved {} to {path}", event.label),
        }
    }

    fn on_finish(&self, result: &BatchResult) {
        if result.is_complete_success() {
            tracing::info!(batch = %result.batch_id, "{} of {} downloaded", result.success_count, result.total);
        } else {
            tracing::warn!(
                batch = %result.batch_id,
                failed = result.error_count,
                skipped = result.skipped,
                "{} of {} downloaded",
                result.success_count,
                result.total
            );
        }
    }
}

#[derive(Debug, Clone)]
pub struct ChannelReporter {
    tx: Sender<BatchEvent>,
}

impl ChannelReporter {
    pub fn new(tx: Sender<BatchEvent>) -> Self {
        Self { tx }
    }

    fn emit(&self, event: BatchEvent) {
        if self.tx.send(event).is_err() {
            tracing::debug!("progress receiver dropped");
        }
    }
}

impl ProgressReporter for ChannelReporter {
    fn on_start(&self, event: &ArtifactStarted) {
        self.emit(BatchEvent::ArtifactStarted(event.clone()));
    }

    fn on_progress(&self, event: &ArtifactProgress) {
        self.emit(BatchEvent::ArtifactProgress(event.clone()));
    }

    fn on_finish(&self, result: &BatchResult) {
        self.emit(BatchEvent::BatchFinished(result.clone()));
    }
}

#[cfg(test)]
#[derive(Debug, Default)]
pub(crate) struct RecordingReporter {
    events: parking_lot::Mutex<Vec<BatchEvent>>,
}

#[cfg(test)]
impl RecordingReporter {
    pub(crate) fn started_indices(&self) -> Vec<usize> {
        self.events
            .lock()
            .iter()
            .filter_map(|event| match event {
                BatchEvent::ArtifactStarted(started) => Some(started.index),
                _ => None,
            })
            .collect()
    }

    pub(crate) fn progress_paths(&self) -> Vec<String> {
        self.events
            .lock()
            .iter()
            .filter_map(|event| match event {
                BatchEvent::ArtifactProgress(progress) => progress.save_path.clone(),
                _ => None,
            })
            .collect()
    }

    pub(crate) fn finished(&self) -> Vec<BatchResult> {
        self.events
            .lock()
            .iter()
            .filter_map(|event| match event {
                BatchEvent::BatchFinished(result) => Some(result.clone()),
                _ => None,
            })
            .collect()
    }
}

#[cfg(test)]
impl ProgressReporter for RecordingReporter {
    fn on_start(&self, event: &ArtifactStarted) {
        self.events.lock().push(BatchEvent::ArtifactStarted(event.clone()));
    }

    fn on_progress(&self, event: &ArtifactProgress) {
        self.events.lock().push(BatchEvent::ArtifactProgress(event.clone()));
    }

    fn on_finish(&self, result: &BatchResult) {
        self.events.lock().push(BatchEvent::BatchFinished(result.clone()));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn channel_reporter_forwards_in_order() {
        let (tx, rx) = crossbeam_channel::unbounded();
        let reporter = ChannelReporter::new(tx);
        reporter.on_start(&ArtifactStarted {
            index: 1,
            total: 1,
            label: "a.bin".into(),
            preset_label: None,
        });
        reporter.on_progress(&ArtifactProgress {
            index: 1,
            total: 1,
            label: "a.bin".into(),
            save_path: Some("/m/a.bin".into()),
            note: None,
        });

        let names: Vec<_> = rx.try_iter().map(|event| event.name()).collect();
        assert_eq!(names, vec![EVENT_ARTIFACT_STARTED, EVENT_ARTIFACT_PROGRESS]);
    }

    #[test]
    fn dropped_receiver_is_ignored() {
        let (tx, rx) = crossbeam_channel::unbounded();
        drop(rx);
        ChannelReporter::new(tx).on_start(&ArtifactStarted {
            index: 1,
            total: 2,
            label: "x".into(),
            preset_label: Some("P".into()),
        });
    }

    #[test]
    fn event_payload_uses_camel_case() {
        let event = BatchEvent::ArtifactStarted(ArtifactStarted {
            index: 2,
            total: 3,
            label: "org/model".into(),
            preset_label: Some("SDXL".into()),
        });
        assert_eq!(
            serde_json::to_value(&event).unwrap(),
            json!({
                "event": "artifact-started",
                "payload": { "index": 2, "total": 3, "label": "org/model", "presetLabel": "SDXL" }
            })
        );
    }
}
