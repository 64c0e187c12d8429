use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::Instrument;
use uuid::Uuid;

use super::classify::{self, RawResult};
use super::client::ArtifactDownloader;
use super::types::{
    flatten_presets, BatchCompletion, BatchError, BatchItem, BatchResult, DownloadOutcome,
};
use crate::core::events::{ArtifactProgress, ArtifactStarted, ProgressReporter};
use crate::presets::{ArtifactSpec, Preset};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BatchLimits {
    pub artifact_timeout: Option<Duration>,
    pub batch_timeout: Option<Duration>,
}

pub struct DownloadOrchestrator {
    downloader: Arc<dyn ArtifactDownloader>,
    limits: BatchLimits,
}

impl DownloadOrchestrator {
    pub fn new(downloader: Arc<dyn ArtifactDownloader>, limits: BatchLimits) -> Self {
        Self { downloader, limits }
    }

    pub fn limits(&self) -> BatchLimits {
        self.limits
    }

    pub async fn download_preset(
        &self,
        preset: &Preset,
        reporter: &dyn ProgressReporter,
        cancel: &CancellationToken,
    ) -> Result<BatchResult, BatchError> {
        self.run_batch(flatten_presets([preset]), reporter, cancel)
            .await
    }

    pub async fn download_presets(
        &self,
        presets: &[Preset],
        reporter: &dyn ProgressReporter,
        cancel: &CancellationToken,
    ) -> Result<BatchResult, BatchError> {
        self.run_batch(flatten_presets(presets), reporter, cancel)
            .await
    }

    pub async fn run_batch(
        &self,
        items: Vec<BatchItem>,
        reporter: &dyn ProgressReporter,
        cancel: &CancellationToken,
    ) -> Result<BatchResult, BatchError> {
        if items.is_empty() {
            return Err(BatchError::NothingToDownload);
        }

        let batch_id = Uuid::new_v4().to_string();
        let span = tracing::info_span!("batch", id = %batch_id, total = items.len());
        let result = self
            .run_items(batch_id, &items, reporter, cancel)
            .instrument(span)
            .await;
        Ok(result)
    }

    async fn run_items(
        &self,
        batch_id: String,
        items: &[BatchItem],
        reporter: &dyn ProgressReporter,
        cancel: &CancellationToken,
    ) -> BatchResult {
        let total = items.len();
        let deadline = self.limits.batch_timeout.map(|limit| Instant::now() + limit);
        let mut result = BatchResult::pending(batch_id, items);
        let mut completion = BatchCompletion::Completed;

        for (position, item) in items.iter().enumerate() {
            if cancel.is_cancelled() {
                completion = BatchCompletion::Cancelled;
                break;
            }
            let remaining = deadline.map(|deadline| deadline.saturating_duration_since(Instant::now()));
            if remaining == Some(Duration::ZERO) {
                completion = BatchCompletion::DeadlineExceeded;
                break;
            }

            let index = position + 1;
            let label = item.artifact_label();
            reporter.on_start(&ArtifactStarted {
                index,
                total,
                label: label.clone(),
                preset_label: item.preset_label.clone(),
            });
            result.mark_requested(position);
            tracing::info!(index, total, artifact = %item.display_label(), "requesting download");

            let limit = tighter(self.limits.artifact_timeout, remaining);
            let outcome = self.attempt(&item.spec, limit, cancel).await;

            match &outcome {
                DownloadOutcome::Success { path, message } => {
                    tracing::info!(index, path = path.as_deref().unwrap_or(""), "download finished");
                    if let Some(path) = path {
                        reporter.on_progress(&ArtifactProgress {
                            index,
                            total,
                            label,
                            save_path: Some(path.clone()),
                            note: message.clone(),
                        });
                    }
                }
                DownloadOutcome::Error { kind, message } => {
                    tracing::warn!(index, ?kind, "download failed: {message}");
                }
            }
            result.record(position, outcome);
        }

        result.finish(completion);
        tracing::info!(
            succeeded = result.success_count,
            failed = result.error_count,
            skipped = result.skipped,
            "batch finished"
        );
        reporter.on_finish(&result);
        result
    }

    async fn attempt(
        &self,
        spec: &ArtifactSpec,
        limit: Option<Duration>,
        cancel: &CancellationToken,
    ) -> DownloadOutcome {
        let request = self.downloader.download(spec);
        let answered = tokio::select! {
            biased;
            _ = cancel.cancelled() => return classify::cancelled(),
            answered = within(limit, request) => answered,
        };

        match answered {
            Some(Ok(response)) => classify::classify(&RawResult::Response(response)),
            Some(Err(err)) => classify::classify(&RawResult::Transport {
                message: err.to_string(),
            }),
            None => classify::client_timeout(limit.unwrap_or_default()),
        }
    }
}

async fn within<F: Future>(limit: Option<Duration>, future: F) -> Option<F::Output> {
    match limit {
        Some(limit) => tokio::time::timeout(limit, future).await.ok(),
        None => Some(future.await),
    }
}

fn tighter(a: Option<Duration>, b: Option<Duration>) -> Option<Duration> {
    match (a, b) {
        (Some(a), Some(b)) => Some(a.min(b)),
        (a, b) => a.or(b),
    }
}
