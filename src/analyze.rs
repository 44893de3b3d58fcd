//! Pipeline orchestration: the public entry points.
//!
//! A request moves through a linear state machine and every stage either
//! advances it or ends it:
//!
//! ```text
//! Received → Normalized → Fetched(all) → Assembled → Inferred → Extracted → Done
//!                 │             │             │           │
//!                 └─────────────┴─────────────┴───────────┴──→ Failed(kind)
//! ```
//!
//! Nothing is retried and nothing outlives the call: a fresh HTTP client is
//! built per invocation, fetched images are dropped once encoded, and the only
//! shared input is the immutable [`AnalysisConfig`].

use crate::config::AnalysisConfig;
use crate::error::AnalysisError;
use crate::output::{AnalysisOutput, AnalysisStats, ExtractedResult};
use crate::pipeline::input::{self, AnalysisRequest};
use crate::pipeline::{encode, fetch, llm, postprocess};
use crate::progress::Stage;
use serde_json::Value;
use std::time::Instant;
use tracing::{debug, info, warn};

/// Analyse one image given a raw `imageUrl` value.
///
/// The value may be a string or a list (first element used); see
/// [`input::normalize_image_url`].
///
/// # Example
/// ```rust,no_run
/// use edgequake_img2json::{analyze_image, AnalysisConfig};
/// use serde_json::json;
///
/// # #[tokio::main]
/// # async fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let config = AnalysisConfig::from_env()?;
/// let result = analyze_image(&json!("//cdn.example.com/bag.jpg"), &config).await?;
/// println!("{}", serde_json::to_string_pretty(&result)?);
/// # Ok(())
/// # }
/// ```
pub async fn analyze_image(
    raw: &Value,
    config: &AnalysisConfig,
) -> Result<ExtractedResult, AnalysisError> {
    report(config, Stage::Received);
    let url = input::normalize_image_url(raw).map_err(|e| fail(config, e))?;
    run_pipeline(vec![url], config).await.map(|o| o.result)
}

/// Analyse several images of the same item given a raw `imageUrls` value.
///
/// All images go into a single model call, in input order.
pub async fn analyze_images(
    raw: &Value,
    config: &AnalysisConfig,
) -> Result<ExtractedResult, AnalysisError> {
    report(config, Stage::Received);
    let urls = input::normalize_image_set(raw).map_err(|e| fail(config, e))?;
    run_pipeline(urls, config).await.map(|o| o.result)
}

/// Analyse a parsed request body, dispatching on `imageUrls` / `imageUrl`.
///
/// This is what the HTTP adapter calls. Returns statistics alongside the
/// result for logging.
pub async fn analyze_request(
    request: &AnalysisRequest,
    config: &AnalysisConfig,
) -> Result<AnalysisOutput, AnalysisError> {
    report(config, Stage::Received);
    let urls = input::normalize_request(request)
        .map_err(|e| fail(config, e))?
        .into_urls();
    run_pipeline(urls, config).await
}

/// Synchronous wrapper around [`analyze_request`].
///
/// Creates a temporary tokio runtime internally.
pub fn analyze_request_sync(
    request: &AnalysisRequest,
    config: &AnalysisConfig,
) -> Result<AnalysisOutput, AnalysisError> {
    tokio::runtime::Runtime::new()
        .map_err(|e| AnalysisError::Internal(format!("Failed to create tokio runtime: {}", e)))?
        .block_on(analyze_request(request, config))
}

/// Run the stages after normalisation on an already-normalised URL set.
///
/// Also the entry point for callers that validated URLs themselves.
pub async fn run_pipeline(
    urls: Vec<String>,
    config: &AnalysisConfig,
) -> Result<AnalysisOutput, AnalysisError> {
    run_stages(urls, config).await.map_err(|e| fail(config, e))
}

async fn run_stages(
    urls: Vec<String>,
    config: &AnalysisConfig,
) -> Result<AnalysisOutput, AnalysisError> {
    let total_start = Instant::now();
    if urls.is_empty() {
        return Err(AnalysisError::EmptyImageSet);
    }
    report(config, Stage::Normalized);
    info!("Starting analysis: {} image(s), model {}", urls.len(), config.model);

    let client = build_client()?;

    // ── Step 1: Fetch ────────────────────────────────────────────────────
    let fetch_start = Instant::now();
    let images = fetch::fetch_all(&client, &urls, config).await?;
    let fetch_duration_ms = fetch_start.elapsed().as_millis() as u64;
    let image_count = images.len();
    let fetched_bytes: usize = images.iter().map(|i| i.bytes.len()).sum();
    report(config, Stage::Fetched);
    debug!(
        "Fetched {} image(s), {} bytes in {}ms",
        image_count, fetched_bytes, fetch_duration_ms
    );

    // ── Step 2: Assemble ─────────────────────────────────────────────────
    let payload =
        encode::assemble_payload(images, config.instruction_text().to_string()).await?;
    report(config, Stage::Assembled);

    // ── Step 3: Inference ────────────────────────────────────────────────
    let llm_start = Instant::now();
    let response = llm::generate(&client, payload, config).await?;
    let inference_duration_ms = llm_start.elapsed().as_millis() as u64;
    report(config, Stage::Inferred);

    // ── Step 4: Extract ──────────────────────────────────────────────────
    let extraction = postprocess::extract(&response);
    report(config, Stage::Extracted);

    if let Some(record) = extraction.result.record() {
        let missing = record.missing_fields(config.schema.fields());
        if !missing.is_empty() && config.instruction.is_none() {
            warn!("Model omitted expected field(s): {}", missing.join(", "));
        }
    }

    let stats = AnalysisStats {
        image_count,
        fetched_bytes,
        prompt_tokens: extraction.usage.prompt_tokens,
        output_tokens: extraction.usage.output_tokens,
        finish_reason: extraction.finish_reason,
        fetch_duration_ms,
        inference_duration_ms,
        total_duration_ms: total_start.elapsed().as_millis() as u64,
    };

    info!(
        "Analysis complete: {:?} result, {} tokens in / {} out, {}ms total",
        extraction.result.kind(),
        stats.prompt_tokens,
        stats.output_tokens,
        stats.total_duration_ms
    );
    report(config, Stage::Done);

    Ok(AnalysisOutput {
        result: extraction.result,
        stats,
    })
}

fn build_client() -> Result<reqwest::Client, AnalysisError> {
    reqwest::Client::builder()
        .user_agent(concat!("edgequake-img2json/", env!("CARGO_PKG_VERSION")))
        .build()
        .map_err(|e| AnalysisError::Internal(format!("HTTP client: {e}")))
}

fn report(config: &AnalysisConfig, stage: Stage) {
    if let Some(ref cb) = config.progress_callback {
        cb.on_stage(stage);
    }
}

/// Report the terminal `Failed` stage and hand the error back.
fn fail(config: &AnalysisConfig, err: AnalysisError) -> AnalysisError {
    warn!("Analysis failed: {}", err);
    report(config, Stage::Failed(err.kind()));
    err
}
