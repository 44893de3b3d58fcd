//! Response extraction: raw Gemini JSON → [`ExtractedResult`].
//!
//! Two pure steps, each independently testable:
//!
//! 1. [`extract_text`] walks `candidates[0].content.parts` to the first text
//!    part. Missing structure (safety-blocked prompts, empty candidates) yields
//!    an empty string instead of an error.
//! 2. [`strip_code_fences`] removes the ` ```json … ``` ` wrapper models add
//!    despite being told to return bare JSON, then [`parse_record`] attempts to
//!    read a JSON object.
//!
//! A parse failure is not an error. The cleaned text is returned as
//! [`ExtractedResult::Unparsed`] because the model's prose is still useful to
//! the caller.

use crate::output::{ExtractedResult, ItemRecord, UnparsedOutput};
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;
use tracing::{debug, warn};

/// Everything the extractor learned from one model response.
#[derive(Debug, Clone, PartialEq)]
pub struct Extraction {
    pub result: ExtractedResult,
    /// `candidates[0].finishReason`, e.g. `STOP` or `SAFETY`.
    pub finish_reason: Option<String>,
    /// `candidates.length`.
    pub candidate_count: usize,
    pub usage: TokenUsage,
}

/// Token counts from `usageMetadata`, zero when absent.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TokenUsage {
    pub prompt_tokens: u64,
    pub output_tokens: u64,
}

/// Run both extraction steps on a raw model response.
pub fn extract(response: &Value) -> Extraction {
    let text = extract_text(response);
    let finish_reason = response
        .pointer("/candidates/0/finishReason")
        .and_then(Value::as_str)
        .map(str::to_string);
    let candidate_count = response
        .get("candidates")
        .and_then(Value::as_array)
        .map_or(0, Vec::len);
    let usage = extract_usage(response);

    if text.is_empty() {
        warn!(
            "Model returned no text (finishReason: {})",
            finish_reason.as_deref().unwrap_or("none")
        );
    }

    Extraction {
        result: parse_model_text(&text),
        finish_reason,
        candidate_count,
        usage,
    }
}

/// Text of the first candidate's first text part, or `""` if absent.
pub fn extract_text(response: &Value) -> String {
    response
        .pointer("/candidates/0/content/parts")
        .and_then(Value::as_array)
        .and_then(|parts| {
            parts
                .iter()
                .find_map(|p| p.get("text").and_then(Value::as_str))
        })
        .unwrap_or_default()
        .to_string()
}

/// Strip fences, then try to parse a JSON object.
pub fn parse_model_text(text: &str) -> ExtractedResult {
    let cleaned = strip_code_fences(text);
    match parse_record(&cleaned) {
        Some(record) => {
            debug!("Parsed record with {} field(s)", record.as_map().len());
            ExtractedResult::Parsed(record)
        }
        None => {
            warn!("Model output is not a JSON object ({} chars)", cleaned.len());
            ExtractedResult::Unparsed(UnparsedOutput::new(cleaned))
        }
    }
}

/// Parse `text` as a JSON object. Arrays and scalars are not records.
pub fn parse_record(text: &str) -> Option<ItemRecord> {
    match serde_json::from_str::<Value>(text) {
        Ok(Value::Object(map)) => Some(ItemRecord::new(map)),
        _ => None,
    }
}

// ── Fence stripping ──────────────────────────────────────────────────────────

/// Whole text wrapped in one fence, with optional language tag.
static RE_OUTER_FENCE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?s)^```[A-Za-z0-9_+-]*[ \t]*\r?\n?(.*?)\r?\n?[ \t]*```$").unwrap()
});

/// First fenced block anywhere in the text (prose before/after).
static RE_INNER_FENCE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)```[A-Za-z0-9_+-]*[ \t]*\r?\n(.*?)\r?\n[ \t]*```").unwrap());

/// Remove Markdown code-fence markers and surrounding whitespace.
///
/// * ` ```json\n{…}\n``` ` → `{…}`
/// * `Here you go:\n```json\n{…}\n```\nThanks` → `{…}`
/// * Several fenced blocks → the first block's body.
/// * An unterminated opening fence is dropped.
/// * Text without fences is only trimmed.
pub fn strip_code_fences(input: &str) -> String {
    let trimmed = input.trim();

    // A body that still holds a fence line spans several blocks; take the first.
    if let Some(caps) = RE_OUTER_FENCE.captures(trimmed) {
        if !caps[1].contains("\n```") {
            return caps[1].trim().to_string();
        }
    }
    if let Some(caps) = RE_INNER_FENCE.captures(trimmed) {
        return caps[1].trim().to_string();
    }
    if let Some(rest) = trimmed.strip_prefix("```") {
        let body = rest
            .trim_start_matches(|c: char| c.is_ascii_alphanumeric() || "_+-".contains(c));
        return body.trim().to_string();
    }

    trimmed.to_string()
}

fn extract_usage(response: &Value) -> TokenUsage {
    let count = |key: &str| {
        response
            .pointer(&format!("/usageMetadata/{key}"))
            .and_then(Value::as_u64)
            .unwrap_or(0)
    };
    TokenUsage {
        prompt_tokens: count("promptTokenCount"),
        output_tokens: count("candidatesTokenCount"),
    }
}

// ── Tests ────────────────────────────────────────────────────────────────────
