//! # edgequake-img2json
//!
//! Describe photographed second-hand items (brand, category, condition,
//! defects) as structured JSON using a Vision Language Model.
//!
//! ## Why this crate?
//!
//! Marketplace clients send image references in whatever shape their front
//! end produces: protocol-relative CDN links, bare S3 paths, one-element
//! arrays. Models, for their part, wrap their JSON in Markdown fences or answer
//! in prose. This crate owns both ends: it normalises the input into fetchable
//! URLs, and it turns the model's free text into either a parsed record or a
//! clearly-flagged raw-text fallback, never a confusing 500.
//!
//! ## Pipeline Overview
//!
//! ```text
//! request body
//!  │
//!  ├─ 1. Input    classify + repair image URLs (pure)
//!  ├─ 2. Fetch    download each image, input order preserved
//!  ├─ 3. Encode   base64 inline parts + one instruction part (spawn_blocking)
//!  ├─ 4. VLM      one Gemini generateContent call
//!  ├─ 5. Extract  first text part → strip fences → parse or fall back
//!  └─ 6. Output   ExtractedResult (Parsed | Unparsed) or AnalysisError
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use edgequake_img2json::{analyze_images, AnalysisConfig};
//! use serde_json::json;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     // API key from GEMINI_API (or GEMINI_API_KEY), read once.
//!     let config = AnalysisConfig::from_env()?;
//!     let result = analyze_images(
//!         &json!(["//cdn.example.com/front.jpg", "cdn.example.com/back.jpg"]),
//!         &config,
//!     )
//!     .await?;
//!     println!("{}", serde_json::to_string_pretty(&result)?);
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature  | Default | Description |
//! |----------|---------|-------------|
//! | `server` | on      | axum router + [`server::serve`] |
//! | `cli`    | on      | Enables the `img2json` binary (clap + anyhow + tracing-subscriber) |

// ── Modules ──────────────────────────────────────────────────────────────

pub mod analyze;
pub mod config;
pub mod error;
pub mod output;
pub mod pipeline;
pub mod progress;
pub mod prompts;
#[cfg(feature = "server")]
pub mod server;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use analyze::{
    analyze_image, analyze_images, analyze_request, analyze_request_sync, run_pipeline,
};
pub use config::{
    AnalysisConfig, AnalysisConfigBuilder, FetchPolicy, FetchStrategy, ResponseSchema,
};
pub use error::{AnalysisError, ErrorKind};
pub use output::{
    AnalysisOutput, AnalysisStats, ExtractedResult, ItemRecord, ResultKind, UnparsedOutput,
};
pub use pipeline::input::AnalysisRequest;
pub use progress::{AnalysisProgressCallback, NoopProgressCallback, ProgressCallback, Stage};
