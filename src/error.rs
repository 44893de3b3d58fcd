//! Error types for the edgequake-img2json library.
//!
//! Every stage of the pipeline fails fast with an [`AnalysisError`]. The
//! variants are grouped by the stage that produced them so a client reading
//! the JSON envelope can tell *where* the request died:
//!
//! * **Input** — `MissingInput`, `InvalidInputType`, `EmptyImageSet`. The
//!   client sent something we cannot turn into an image URL. Never retried.
//! * **Fetch** — `FetchFailed`. The image host was unreachable or answered
//!   non-2xx. Reported as a client error because the URL itself is usually
//!   the culprit.
//! * **Inference** — `InferenceFailed`. The vision model service failed.
//!
//! A model answer that is not valid JSON is *not* an error: it degrades to
//! [`crate::output::ExtractedResult::Unparsed`].

use serde_json::{json, Value};
use thiserror::Error;

/// All errors returned by the edgequake-img2json pipeline.
#[derive(Debug, Error)]
pub enum AnalysisError {
    // ── Input errors ──────────────────────────────────────────────────────
    /// No image reference was supplied, or it was blank after trimming.
    #[error("imageUrl missing{}", detail_suffix(.detail))]
    MissingInput { detail: Option<String> },

    /// The image reference had a JSON type we refuse to coerce.
    #[error("imageUrl must be a string, got {received}")]
    InvalidInputType { received: String },

    /// The request resolved to zero images.
    #[error("No images to analyse")]
    EmptyImageSet,

    // ── Fetch errors ──────────────────────────────────────────────────────
    /// Downloading an image failed (transport error or non-2xx status).
    #[error("Image fetch failed for '{url}': {}", fetch_reason(.status, .detail))]
    FetchFailed {
        url: String,
        status: Option<u16>,
        detail: Option<String>,
    },

    // ── Inference errors ──────────────────────────────────────────────────
    /// The vision model call failed.
    #[error("Gemini failed{}: {detail}", status_suffix(.status))]
    InferenceFailed { status: Option<u16>, detail: String },

    // ── Config errors ─────────────────────────────────────────────────────
    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // ── Catch-all ─────────────────────────────────────────────────────────
    /// Unexpected internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Coarse failure category, stable across versions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    MissingInput,
    InvalidInputType,
    EmptyImageSet,
    FetchError,
    InferenceError,
    InvalidConfig,
    Internal,
}

impl AnalysisError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            AnalysisError::MissingInput { .. } => ErrorKind::MissingInput,
            AnalysisError::InvalidInputType { .. } => ErrorKind::InvalidInputType,
            AnalysisError::EmptyImageSet => ErrorKind::EmptyImageSet,
            AnalysisError::FetchFailed { .. } => ErrorKind::FetchError,
            AnalysisError::InferenceFailed { .. } => ErrorKind::InferenceError,
            AnalysisError::InvalidConfig(_) => ErrorKind::InvalidConfig,
            AnalysisError::Internal(_) => ErrorKind::Internal,
        }
    }

    /// `true` for the defects a client can fix by changing its request.
    pub fn is_client_error(&self) -> bool {
        self.status_code() < 500
    }

    /// HTTP status the adapter should answer with.
    pub fn status_code(&self) -> u16 {
        match self.kind() {
            ErrorKind::MissingInput
            | ErrorKind::InvalidInputType
            | ErrorKind::EmptyImageSet
            | ErrorKind::FetchError => 400,
            ErrorKind::InferenceError | ErrorKind::InvalidConfig | ErrorKind::Internal => 500,
        }
    }

    /// JSON error envelope returned to the client.
    ///
    /// Always carries `error`; the other keys depend on the stage so the
    /// failure can be diagnosed without server logs.
    pub fn to_body(&self) -> Value {
        match self {
            AnalysisError::MissingInput { detail } => {
                let mut body = json!({ "error": "imageUrl missing" });
                if let Some(detail) = detail {
                    body["detail"] = json!(detail);
                }
                body
            }
            AnalysisError::InvalidInputType { received } => json!({
                "error": "imageUrl must be a string",
                "detail": format!("received {received}"),
                "receivedType": received,
            }),
            AnalysisError::EmptyImageSet => json!({
                "error": "No images to analyse",
                "detail": "imageUrls must contain at least one image URL",
            }),
            AnalysisError::FetchFailed {
                url,
                status,
                detail,
            } => {
                let mut body = json!({ "error": "Image fetch failed", "url": url });
                if let Some(status) = status {
                    body["status"] = json!(status);
                }
                if let Some(detail) = detail {
                    body["detail"] = json!(detail);
                }
                body
            }
            AnalysisError::InferenceFailed { status, detail } => {
                let mut body = json!({ "error": "Gemini failed", "detail": detail });
                if let Some(status) = status {
                    body["status"] = json!(status);
                }
                body
            }
            AnalysisError::InvalidConfig(_) | AnalysisError::Internal(_) => {
                json!({ "error": self.to_string() })
            }
        }
    }
}

fn detail_suffix(detail: &Option<String>) -> String {
    detail
        .as_deref()
        .map(|d| format!(": {d}"))
        .unwrap_or_default()
}

fn status_suffix(status: &Option<u16>) -> String {
    status.map(|s| format!(" (HTTP {s})")).unwrap_or_default()
}

fn fetch_reason(status: &Option<u16>, detail: &Option<String>) -> String {
    match (status, detail) {
        (Some(s), _) => format!("HTTP {s}"),
        (None, Some(d)) => d.clone(),
        (None, None) => "unknown error".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fetch_failed_display_with_status() {
        let e = AnalysisError::FetchFailed {
            url: "https://cdn.example.com/b.jpg".into(),
            status: Some(404),
            detail: None,
        };
        let msg = e.to_string();
        assert!(msg.contains("HTTP 404"), "got: {msg}");
        assert!(msg.contains("b.jpg"), "got: {msg}");
    }

    #[test]
    fn fetch_failed_body_names_url_and_status() {
        let e = AnalysisError::FetchFailed {
            url: "https://cdn.example.com/b.jpg".into(),
            status: Some(404),
            detail: None,
        };
        let body = e.to_body();
        assert_eq!(body["error"], "Image fetch failed");
        assert_eq!(body["url"], "https://cdn.example.com/b.jpg");
        assert_eq!(body["status"], 404);
        assert!(body.get("detail").is_none());
        assert_eq!(e.status_code(), 400);
    }

    #[test]
    fn transport_failure_body_has_detail_not_status() {
        let e = AnalysisError::FetchFailed {
            url: "https://nowhere.invalid/x.jpg".into(),
            status: None,
            detail: Some("dns error".into()),
        };
        let body = e.to_body();
        assert_eq!(body["detail"], "dns error");
        assert!(body.get("status").is_none());
    }

    #[test]
    fn invalid_input_type_reports_received_type() {
        let e = AnalysisError::InvalidInputType {
            received: "number".into(),
        };
        assert_eq!(e.kind(), ErrorKind::InvalidInputType);
        assert_eq!(e.to_body()["receivedType"], "number");
        assert!(e.is_client_error());
    }

    #[test]
    fn inference_failure_is_server_error() {
        let e = AnalysisError::InferenceFailed {
            status: Some(503),
            detail: "overloaded".into(),
        };
        assert_eq!(e.status_code(), 500);
        assert!(!e.is_client_error());
        let body = e.to_body();
        assert_eq!(body["detail"], "overloaded");
        assert_eq!(body["status"], 503);
        assert!(e.to_string().contains("HTTP 503"));
    }

    #[test]
    fn internal_body_only_has_error() {
        let body = AnalysisError::Internal("boom".into()).to_body();
        assert_eq!(body, json!({ "error": "Internal error: boom" }));
    }

    #[test]
    fn missing_input_detail_is_optional() {
        let bare = AnalysisError::MissingInput { detail: None };
        assert!(bare.to_body().get("detail").is_none());
        assert_eq!(bare.to_string(), "imageUrl missing");

        let with = AnalysisError::MissingInput {
            detail: Some("empty list".into()),
        };
        assert_eq!(with.to_body()["detail"], "empty list");
        assert_eq!(with.to_string(), "imageUrl missing: empty list");
    }
}
