mod classify;
mod client;
mod orchestrator;
mod types;

pub use classify::{classify, RawResponse, RawResult, BODY_PREVIEW_CHARS};
pub use client::{
    ArtifactDownloader, DownloadRequest, HttpArtifactClient, HubModel, SearchError,
    TransportError, DOWNLOAD_ROUTE, SEARCH_ROUTE,
};
pub use orchestrator::{BatchLimits, DownloadOrchestrator};
pub use types::{
    flatten_presets, ArtifactReport, ArtifactState, BatchCompletion, BatchError, BatchFailure,
    BatchItem, BatchResult, DownloadErrorKind, DownloadOutcome,
};
