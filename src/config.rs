//! Configuration types for image analysis.
//!
//! All pipeline behaviour is controlled through [`AnalysisConfig`], built via
//! its [`AnalysisConfigBuilder`] or loaded once from the environment with
//! [`AnalysisConfig::from_env`]. The config is immutable after `build()`;
//! servers wrap it in an `Arc` and share it across requests. It is the only
//! state shared between requests.
//!
//! Behaviour that differed between earlier handler revisions (fail-fast vs.
//! best-effort fetching, which JSON shape to ask the model for) is exposed
//! here as options instead of separate code paths.

use crate::error::AnalysisError;
use crate::progress::ProgressCallback;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Default Gemini model used for item analysis.
pub const DEFAULT_MODEL: &str = "gemini-2.5-pro";

/// Default Gemini REST base URL (without trailing slash).
pub const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";

/// Primary environment variable holding the Gemini API key.
pub const ENV_API_KEY: &str = "GEMINI_API";

/// Fallback environment variable for the API key.
pub const ENV_API_KEY_FALLBACK: &str = "GEMINI_API_KEY";

/// Configuration for an item-analysis pipeline.
///
/// # Example
/// ```rust
/// use edgequake_img2json::{AnalysisConfig, FetchStrategy, ResponseSchema};
///
/// let config = AnalysisConfig::builder()
///     .api_key("test-key")
///     .model("gemini-2.5-flash")
///     .schema(ResponseSchema::Condition)
///     .fetch_strategy(FetchStrategy::Concurrent { limit: 4 })
///     .build()
///     .unwrap();
/// assert_eq!(config.model, "gemini-2.5-flash");
/// ```
#[derive(Clone)]
pub struct AnalysisConfig {
    /// Gemini API key. Sent as the `key` query parameter; never logged.
    pub api_key: String,

    /// Model identifier, e.g. `gemini-2.5-pro`. Default: [`DEFAULT_MODEL`].
    pub model: String,

    /// REST base URL. Default: [`DEFAULT_BASE_URL`]. Tests point this at a mock server.
    pub base_url: String,

    /// Which JSON shape the model is asked to return. Default: [`ResponseSchema::Listing`].
    pub schema: ResponseSchema,

    /// Custom instruction text. If None, uses the prompt for `schema`.
    pub instruction: Option<String>,

    /// Sequential or concurrent image downloads. Default: sequential.
    pub fetch_strategy: FetchStrategy,

    /// What happens when one image of a batch fails. Default: fail-fast.
    pub fetch_policy: FetchPolicy,

    /// Sampling temperature. None leaves `generationConfig` out of the request.
    pub temperature: Option<f32>,

    /// Ask the model for `application/json` output via `responseMimeType`. Default: false.
    pub json_response: bool,

    /// Per-image download timeout in seconds. Default: none (host request bounds it).
    pub download_timeout_secs: Option<u64>,

    /// Inference call timeout in seconds. Default: none.
    pub api_timeout_secs: Option<u64>,

    /// Optional observer for pipeline stage transitions.
    pub progress_callback: Option<ProgressCallback>,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            model: DEFAULT_MODEL.to_string(),
            base_url: DEFAULT_BASE_URL.to_string(),
            schema: ResponseSchema::default(),
            instruction: None,
            fetch_strategy: FetchStrategy::default(),
            fetch_policy: FetchPolicy::default(),
            temperature: None,
            json_response: false,
            download_timeout_secs: None,
            api_timeout_secs: None,
            progress_callback: None,
        }
    }
}

impl fmt::Debug for AnalysisConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AnalysisConfig")
            .field("api_key", &"<redacted>")
            .field("model", &self.model)
            .field("base_url", &self.base_url)
            .field("schema", &self.schema)
            .field("instruction", &self.instruction.as_ref().map(|s| s.len()))
            .field("fetch_strategy", &self.fetch_strategy)
            .field("fetch_policy", &self.fetch_policy)
            .field("temperature", &self.temperature)
            .field("json_response", &self.json_response)
            .field("download_timeout_secs", &self.download_timeout_secs)
            .field("api_timeout_secs", &self.api_timeout_secs)
            .field(
                "progress_callback",
                &self
                    .progress_callback
                    .as_ref()
                    .map(|_| "<dyn AnalysisProgressCallback>"),
            )
            .finish()
    }
}

impl AnalysisConfig {
    /// Create a new builder for `AnalysisConfig`.
    pub fn builder() -> AnalysisConfigBuilder {
        AnalysisConfigBuilder {
            config: Self::default(),
        }
    }

    /// Load the configuration from process environment variables.
    ///
    /// Meant to be called once at start-up. Reads `GEMINI_API` (falling back to
    /// `GEMINI_API_KEY`), and optionally `IMG2JSON_MODEL`, `IMG2JSON_BASE_URL`
    /// and `IMG2JSON_SCHEMA`.
    pub fn from_env() -> Result<Self, AnalysisError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Same as [`from_env`](Self::from_env) but with an injectable lookup, so
    /// tests never touch the real process environment.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, AnalysisError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let non_empty = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

        let api_key = non_empty(ENV_API_KEY)
            .or_else(|| non_empty(ENV_API_KEY_FALLBACK))
            .ok_or_else(|| {
                AnalysisError::InvalidConfig(format!(
                    "No Gemini API key found. Set {ENV_API_KEY} (or {ENV_API_KEY_FALLBACK})."
                ))
            })?;

        let mut builder = Self::builder().api_key(api_key);
        if let Some(model) = non_empty("IMG2JSON_MODEL") {
            builder = builder.model(model);
        }
        if let Some(url) = non_empty("IMG2JSON_BASE_URL") {
            builder = builder.base_url(url);
        }
        if let Some(schema) = non_empty("IMG2JSON_SCHEMA") {
            builder = builder.schema(schema.parse()?);
        }
        builder.build()
    }

    /// The instruction text sent after the images.
    pub fn instruction_text(&self) -> &str {
        self.instruction
            .as_deref()
            .unwrap_or_else(|| self.schema.instruction())
    }

    /// `…/models/{model}:generateContent` for the configured model.
    pub fn endpoint(&self) -> String {
        format!(
            "{}/models/{}:generateContent",
            self.base_url.trim_end_matches('/'),
            self.model
        )
    }
}

/// Builder for [`AnalysisConfig`].
#[derive(Debug)]
pub struct AnalysisConfigBuilder {
    config: AnalysisConfig,
}

impl AnalysisConfigBuilder {
    pub fn api_key(mut self, key: impl Into<String>) -> Self {
        self.config.api_key = key.into();
        self
    }

    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.config.model = model.into();
        self
    }

    pub fn base_url(mut self, url: impl Into<String>) -> Self {
        self.config.base_url = url.into();
        self
    }

    pub fn schema(mut self, schema: ResponseSchema) -> Self {
        self.config.schema = schema;
        self
    }

    pub fn instruction(mut self, text: impl Into<String>) -> Self {
        self.config.instruction = Some(text.into());
        self
    }

    pub fn fetch_strategy(mut self, strategy: FetchStrategy) -> Self {
        self.config.fetch_strategy = strategy;
        self
    }

    pub fn fetch_policy(mut self, policy: FetchPolicy) -> Self {
        self.config.fetch_policy = policy;
        self
    }

    pub fn temperature(mut self, t: f32) -> Self {
        self.config.temperature = Some(t.clamp(0.0, 2.0));
        self
    }

    pub fn json_response(mut self, v: bool) -> Self {
        self.config.json_response = v;
        self
    }

    pub fn download_timeout_secs(mut self, secs: u64) -> Self {
        self.config.download_timeout_secs = Some(secs);
        self
    }

    pub fn api_timeout_secs(mut self, secs: u64) -> Self {
        self.config.api_timeout_secs = Some(secs);
        self
    }

    pub fn progress_callback(mut self, cb: ProgressCallback) -> Self {
        self.config.progress_callback = Some(cb);
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<AnalysisConfig, AnalysisError> {
        let c = &self.config;
        if c.api_key.trim().is_empty() {
            return Err(AnalysisError::InvalidConfig(format!(
                "API key must not be empty (set {ENV_API_KEY})"
            )));
        }
        if c.model.trim().is_empty() {
            return Err(AnalysisError::InvalidConfig(
                "Model name must not be empty".into(),
            ));
        }
        let lower = c.base_url.to_ascii_lowercase();
        if !lower.starts_with("http://") && !lower.starts_with("https://") {
            return Err(AnalysisError::InvalidConfig(format!(
                "Base URL must start with http:// or https://, got '{}'",
                c.base_url
            )));
        }
        if let FetchStrategy::Concurrent { limit: 0 } = c.fetch_strategy {
            return Err(AnalysisError::InvalidConfig(
                "Concurrent fetch limit must be ≥ 1".into(),
            ));
        }
        Ok(self.config)
    }
}

// ── Enums ────────────────────────────────────────────────────────────────

/// The JSON shape the model is instructed to produce.
///
/// | Schema | Fields |
/// |--------|--------|
/// | `Listing` | brand, product_type, model_name, condition, defects, summary (default) |
/// | `Condition` | brand, category, condition_summary, defects |
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResponseSchema {
    /// Detailed resale listing for a luxury bag. (default)
    #[default]
    Listing,
    /// Compact condition report for any luxury item.
    Condition,
}

impl ResponseSchema {
    /// Field names the model is asked to return.
    pub fn fields(&self) -> &'static [&'static str] {
        match self {
            ResponseSchema::Listing => &[
                "brand",
                "product_type",
                "model_name",
                "condition",
                "defects",
                "summary",
            ],
            ResponseSchema::Condition => &["brand", "category", "condition_summary", "defects"],
        }
    }

    /// Built-in instruction text for this schema.
    pub fn instruction(&self) -> &'static str {
        match self {
            ResponseSchema::Listing => crate::prompts::LISTING_PROMPT,
            ResponseSchema::Condition => crate::prompts::CONDITION_PROMPT,
        }
    }
}

impl FromStr for ResponseSchema {
    type Err = AnalysisError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "listing" => Ok(ResponseSchema::Listing),
            "condition" => Ok(ResponseSchema::Condition),
            other => Err(AnalysisError::InvalidConfig(format!(
                "Unknown response schema '{other}' (expected listing or condition)"
            ))),
        }
    }
}

/// How the images of one request are downloaded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FetchStrategy {
    /// One after another, in input order. (default)
    #[default]
    Sequential,
    /// Up to `limit` downloads in flight; results are still delivered in input order.
    Concurrent { limit: usize },
}

/// What happens when one image of a multi-image request cannot be fetched.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FetchPolicy {
    /// Abort the whole request on the first failure. (default)
    #[default]
    FailFast,
    /// Skip failed images; fail only if none could be fetched.
    BestEffort,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name| map.get(name).cloned()
    }

    #[test]
    fn defaults() {
        let config = AnalysisConfig::builder().api_key("k").build().unwrap();
        assert_eq!(config.model, DEFAULT_MODEL);
        assert_eq!(config.schema, ResponseSchema::Listing);
        assert_eq!(config.fetch_strategy, FetchStrategy::Sequential);
        assert_eq!(config.fetch_policy, FetchPolicy::FailFast);
        assert!(config.temperature.is_none());
        assert!(config.download_timeout_secs.is_none());
    }

    #[test]
    fn empty_api_key_rejected() {
        let err = AnalysisConfig::builder().build().unwrap_err();
        assert!(matches!(err, AnalysisError::InvalidConfig(_)));
    }

    #[test]
    fn bad_base_url_rejected() {
        let err = AnalysisConfig::builder()
            .api_key("k")
            .base_url("ftp://example.com")
            .build()
            .unwrap_err();
        assert!(err.to_string().contains("ftp://example.com"));
    }

    #[test]
    fn zero_concurrency_rejected() {
        let err = AnalysisConfig::builder()
            .api_key("k")
            .fetch_strategy(FetchStrategy::Concurrent { limit: 0 })
            .build()
            .unwrap_err();
        assert!(matches!(err, AnalysisError::InvalidConfig(_)));
    }

    #[test]
    fn endpoint_trims_trailing_slash() {
        let config = AnalysisConfig::builder()
            .api_key("k")
            .base_url("http://127.0.0.1:9999/v1beta/")
            .model("gemini-1.5-flash")
            .build()
            .unwrap();
        assert_eq!(
            config.endpoint(),
            "http://127.0.0.1:9999/v1beta/models/gemini-1.5-flash:generateContent"
        );
    }

    #[test]
    fn debug_redacts_api_key() {
        let config = AnalysisConfig::builder()
            .api_key("super-secret")
            .build()
            .unwrap();
        let dbg = format!("{config:?}");
        assert!(!dbg.contains("super-secret"));
        assert!(dbg.contains("<redacted>"));
    }

    #[test]
    fn from_lookup_prefers_primary_key() {
        let config = AnalysisConfig::from_lookup(lookup_from(&[
            ("GEMINI_API", "primary"),
            ("GEMINI_API_KEY", "fallback"),
        ]))
        .unwrap();
        assert_eq!(config.api_key, "primary");
    }

    #[test]
    fn from_lookup_uses_fallback_and_overrides() {
        let config = AnalysisConfig::from_lookup(lookup_from(&[
            ("GEMINI_API", "   "),
            ("GEMINI_API_KEY", "fallback"),
            ("IMG2JSON_MODEL", "gemini-1.5-flash"),
            ("IMG2JSON_SCHEMA", "Condition"),
        ]))
        .unwrap();
        assert_eq!(config.api_key, "fallback");
        assert_eq!(config.model, "gemini-1.5-flash");
        assert_eq!(config.schema, ResponseSchema::Condition);
    }

    #[test]
    fn from_lookup_without_key_fails() {
        let err = AnalysisConfig::from_lookup(lookup_from(&[])).unwrap_err();
        assert!(err.to_string().contains("GEMINI_API"));
    }

    #[test]
    fn instruction_override_wins() {
        let config = AnalysisConfig::builder()
            .api_key("k")
            .instruction("Just the brand please")
            .build()
            .unwrap();
        assert_eq!(config.instruction_text(), "Just the brand please");

        let default = AnalysisConfig::builder().api_key("k").build().unwrap();
        assert_eq!(default.instruction_text(), crate::prompts::LISTING_PROMPT);
    }

    #[test]
    fn schema_fields() {
        assert!(ResponseSchema::Listing.fields().contains(&"model_name"));
        assert!(ResponseSchema::Condition.fields().contains(&"condition_summary"));
        assert!("bogus".parse::<ResponseSchema>().is_err());
    }
}
