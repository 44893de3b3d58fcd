//! Inference: send the assembled payload to Gemini `generateContent`.
//!
//! This module is intentionally thin. It owns the exact request wire shape
//! and HTTP error mapping, nothing else: the response is returned as raw JSON
//! and interpreted by [`crate::pipeline::postprocess`]. All prompt text lives
//! in [`crate::prompts`].
//!
//! ## Request Layout
//!
//! ```json
//! { "contents": [ { "parts": [ {"inlineData": …}, …, {"text": "…"} ] } ] }
//! ```
//!
//! `generationConfig` is only added when the caller configured a temperature
//! or JSON output; by default the body is exactly the shape above.
//!
//! There is no retry loop. A failed call surfaces as `InferenceFailed` with the
//! upstream status and body so the client can see what Gemini said.

use crate::config::AnalysisConfig;
use crate::error::AnalysisError;
use crate::pipeline::encode::{AnalysisRequestPayload, Part};
use serde::Serialize;
use serde_json::Value;
use std::time::{Duration, Instant};
use tracing::debug;

/// Top-level `generateContent` request body.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerateContentRequest {
    pub contents: Vec<Content>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub generation_config: Option<GenerationConfig>,
}

/// One conversational turn; this pipeline always sends exactly one.
#[derive(Debug, Serialize)]
pub struct Content {
    pub parts: Vec<Part>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerationConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response_mime_type: Option<String>,
}

/// Wrap the payload in the `generateContent` request envelope.
pub fn build_request(
    payload: AnalysisRequestPayload,
    config: &AnalysisConfig,
) -> GenerateContentRequest {
    GenerateContentRequest {
        contents: vec![Content {
            parts: payload.into_parts(),
        }],
        generation_config: build_generation_config(config),
    }
}

/// Build `generationConfig` from the analysis config, or None if nothing is set.
fn build_generation_config(config: &AnalysisConfig) -> Option<GenerationConfig> {
    if config.temperature.is_none() && !config.json_response {
        return None;
    }
    Some(GenerationConfig {
        temperature: config.temperature,
        response_mime_type: config
            .json_response
            .then(|| "application/json".to_string()),
    })
}

/// POST the payload to the configured model and return the decoded response.
///
/// # Errors
/// `InferenceFailed` on transport failure, non-2xx status (with the response
/// body as detail), or a 2xx body that is not JSON.
pub async fn generate(
    client: &reqwest::Client,
    payload: AnalysisRequestPayload,
    config: &AnalysisConfig,
) -> Result<Value, AnalysisError> {
    let start = Instant::now();
    let image_count = payload.image_count();
    let body = build_request(payload, config);

    let mut request = client
        .post(config.endpoint())
        .query(&[("key", config.api_key.as_str())])
        .json(&body);
    if let Some(secs) = config.api_timeout_secs {
        request = request.timeout(Duration::from_secs(secs));
    }

    debug!("Calling {} with {} image(s)", config.model, image_count);

    let response = request.send().await.map_err(|e| {
        let detail = match (e.is_timeout(), config.api_timeout_secs) {
            (true, Some(secs)) => format!("Gemini call timed out after {secs}s"),
            // reqwest embeds the URL (and with it the API key) in its Display.
            _ => e.without_url().to_string(),
        };
        AnalysisError::InferenceFailed {
            status: None,
            detail,
        }
    })?;

    let status = response.status();
    if !status.is_success() {
        let detail = match response.text().await {
            Ok(text) => text,
            Err(e) => format!("error body unreadable: {}", e.without_url()),
        };
        return Err(AnalysisError::InferenceFailed {
            status: Some(status.as_u16()),
            detail,
        });
    }

    let text = response
        .text()
        .await
        .map_err(|e| AnalysisError::InferenceFailed {
            status: Some(status.as_u16()),
            detail: e.without_url().to_string(),
        })?;

    let json: Value = serde_json::from_str(&text).map_err(|e| AnalysisError::InferenceFailed {
        status: Some(status.as_u16()),
        detail: format!("Response was not JSON ({e}): {text}"),
    })?;

    debug!("{} answered in {:?}", config.model, start.elapsed());
    Ok(json)
}
