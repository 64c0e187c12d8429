use std::time::Duration;

use serde::Deserialize;

use super::types::{DownloadErrorKind, DownloadOutcome};

pub const BODY_PREVIEW_CHARS: usize = 200;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RawResult {
    Transport { message: String },
    Response(RawResponse),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawResponse {
    pub status: u16,
    pub content_type: Option<String>,
    pub body: String,
}

#[derive(Debug, Deserialize)]
struct Acknowledgement {
    #[serde(default)]
    status: Option<String>,
    #[serde(default)]
    path: Option<String>,
    #[serde(default)]
    message: Option<String>,
}

pub fn classify(raw: &RawResult) -> DownloadOutcome {
    match raw {
        RawResult::Transport { message } => transport_failure(message),
        RawResult::Response(response) if !(200..300).contains(&response.status) => {
            http_error(response)
        }
        RawResult::Response(response) => classify_success_envelope(response),
    }
}

fn transport_failure(message: &str) -> DownloadOutcome {
    let message = message.trim();
    let text = if message.is_empty() {
        "Network error".to_string()
    } else {
        format!("Network error: {message}")
    };
    DownloadOutcome::error(DownloadErrorKind::TransportFailure, text)
}

fn http_error(response: &RawResponse) -> DownloadOutcome {
    DownloadOutcome::error(
        DownloadErrorKind::HttpError,
        format!("HTTP {}: {}", response.status, preview(&response.body)),
    )
}

fn classify_success_envelope(response: &RawResponse) -> DownloadOutcome {
    let content_type = response.content_type.as_deref().unwrap_or("");
    if !content_type.to_ascii_lowercase().contains("application/json") {
        let shown = if content_type.is_empty() {
            "a response without content type"
        } else {
            content_type
        };
        return DownloadOutcome::error(
            DownloadErrorKind::AmbiguousResponse,
            format!(
                "Server returned {shown} instead of JSON. File may have been downloaded successfully. \
                 Check the file location. Response preview: {}",
                preview(&response.body)
            ),
        );
    }

    let ack: Acknowledgement = match serde_json::from_str(&response.body) {
        Ok(ack) => ack,
        Err(_) => {
            return DownloadOutcome::error(
                DownloadErrorKind::AmbiguousResponse,
                format!(
                    "Server returned non-JSON response ({content_type}). File may have been \
                     downloaded successfully. Check the file location."
                ),
            );
        }
    };

    if ack.status.as_deref() == Some("success") {
        return DownloadOutcome::Success {
            path: ack.path.filter(|path| !path.is_empty()),
            message: ack.message.filter(|message| !message.is_empty()),
        };
    }

    remote_failure(ack.message.as_deref().unwrap_or("Unknown error"))
}

fn remote_failure(message: &str) -> DownloadOutcome {
    let lowered = message.to_lowercase();
    if ["timeout", "timed out", "time-out"]
        .iter()
        .any(|needle| lowered.contains(needle))
    {
        DownloadOutcome::error(
            DownloadErrorKind::RemoteTimeout,
            "Timeout: the download took too long. Try again, the download will resume where it stopped.",
        )
    } else if lowered.contains("connection") {
        DownloadOutcome::error(
            DownloadErrorKind::RemoteConnectionIssue,
            "Connection error: check your internet connection.",
        )
    } else {
        DownloadOutcome::error(DownloadErrorKind::RemoteGenericFailure, message)
    }
}

pub fn client_timeout(limit: Duration) -> DownloadOutcome {
    DownloadOutcome::error(
        DownloadErrorKind::ClientTimeout,
        format!(
            "No answer from the download service within {}s. The transfer may still be running; \
             downloading again will resume it.",
            limit.as_secs()
        ),
    )
}

pub fn cancelled() -> DownloadOutcome {
    DownloadOutcome::error(
        DownloadErrorKind::Cancelled,
        "Cancelled while waiting for the download service",
    )
}

fn preview(text: &str) -> String {
    text.chars().take(BODY_PREVIEW_CHARS).collect()
}
