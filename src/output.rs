//! Result types returned by the analysis pipeline.
//!
//! An analysis always ends in one of two successful shapes:
//!
//! * [`ExtractedResult::Parsed`] — the model answered with a JSON object; the
//!   object is returned as-is in an [`ItemRecord`].
//! * [`ExtractedResult::Unparsed`] — the model answered with prose (or broken
//!   JSON). The cleaned text is returned with a warning so the caller still
//!   gets the model's description.
//!
//! Both serialise to the JSON body the HTTP adapter sends with status 200.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Warning attached to every [`UnparsedOutput`].
pub const UNPARSED_WARNING: &str = "model output was not valid structured data";

/// A structured item description as returned by the model.
///
/// The field set depends on the configured
/// [`ResponseSchema`](crate::config::ResponseSchema) and on what the model
/// actually produced, so the record keeps the full JSON object and offers
/// typed getters for the well-known keys. Unknown keys are preserved.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ItemRecord(Map<String, Value>);

impl ItemRecord {
    pub fn new(fields: Map<String, Value>) -> Self {
        Self(fields)
    }

    pub fn brand(&self) -> Option<&str> {
        self.str_field("brand")
    }

    /// `product_type` (Listing schema) or `category` (Condition schema).
    pub fn product_type(&self) -> Option<&str> {
        self.str_field("product_type")
            .or_else(|| self.str_field("category"))
    }

    pub fn model_name(&self) -> Option<&str> {
        self.str_field("model_name")
    }

    /// `condition` (Listing schema) or `condition_summary` (Condition schema).
    pub fn condition(&self) -> Option<&str> {
        self.str_field("condition")
            .or_else(|| self.str_field("condition_summary"))
    }

    pub fn summary(&self) -> Option<&str> {
        self.str_field("summary")
    }

    /// Defects as strings. A single string is treated as a one-item list;
    /// non-string entries are skipped.
    pub fn defects(&self) -> Vec<&str> {
        match self.0.get("defects") {
            Some(Value::Array(items)) => items.iter().filter_map(Value::as_str).collect(),
            Some(Value::String(s)) if !s.trim().is_empty() => vec![s.as_str()],
            _ => Vec::new(),
        }
    }

    /// Raw access to any field.
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    /// Names from `expected` that are absent from the record.
    pub fn missing_fields<'a>(&self, expected: &[&'a str]) -> Vec<&'a str> {
        expected
            .iter()
            .copied()
            .filter(|k| !self.0.contains_key(*k))
            .collect()
    }

    pub fn as_map(&self) -> &Map<String, Value> {
        &self.0
    }

    pub fn into_value(self) -> Value {
        Value::Object(self.0)
    }

    fn str_field(&self, key: &str) -> Option<&str> {
        self.0.get(key).and_then(Value::as_str)
    }
}

/// Fallback envelope for model output that is not a JSON object.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UnparsedOutput {
    /// Model text after fence stripping and trimming.
    pub raw_text: String,
    /// Always `null`; kept so clients can test `parsed === null`.
    pub parsed: Option<Value>,
    pub warning: String,
}

impl UnparsedOutput {
    pub fn new(raw_text: impl Into<String>) -> Self {
        Self {
            raw_text: raw_text.into(),
            parsed: None,
            warning: UNPARSED_WARNING.to_string(),
        }
    }
}

/// Outcome of the response extractor.
///
/// Serialises untagged: a `Parsed` result is the record object itself, an
/// `Unparsed` result is `{ "rawText", "parsed": null, "warning" }`.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum ExtractedResult {
    Parsed(ItemRecord),
    Unparsed(UnparsedOutput),
}

/// Discriminant of [`ExtractedResult`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ResultKind {
    Parsed,
    Unparsed,
}

impl ExtractedResult {
    pub fn kind(&self) -> ResultKind {
        match self {
            ExtractedResult::Parsed(_) => ResultKind::Parsed,
            ExtractedResult::Unparsed(_) => ResultKind::Unparsed,
        }
    }

    pub fn is_parsed(&self) -> bool {
        matches!(self, ExtractedResult::Parsed(_))
    }

    pub fn record(&self) -> Option<&ItemRecord> {
        match self {
            ExtractedResult::Parsed(r) => Some(r),
            ExtractedResult::Unparsed(_) => None,
        }
    }

    pub fn warning(&self) -> Option<&str> {
        match self {
            ExtractedResult::Parsed(_) => None,
            ExtractedResult::Unparsed(u) => Some(&u.warning),
        }
    }
}

/// Per-request statistics, useful for logging and cost tracking.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisStats {
    /// Images sent to the model (after best-effort skipping).
    pub image_count: usize,
    /// Total downloaded bytes before base64.
    pub fetched_bytes: usize,
    pub prompt_tokens: u64,
    pub output_tokens: u64,
    /// `finishReason` of the first candidate, if any.
    pub finish_reason: Option<String>,
    pub fetch_duration_ms: u64,
    pub inference_duration_ms: u64,
    pub total_duration_ms: u64,
}

/// Result plus statistics for one pipeline run.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AnalysisOutput {
    pub result: ExtractedResult,
    pub stats: AnalysisStats,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn record(v: Value) -> ItemRecord {
        serde_json::from_value(v).unwrap()
    }

    #[test]
    fn getters_cover_both_schemas() {
        let listing = record(json!({
            "brand": "Chanel",
            "product_type": "shoulder bag",
            "model_name": "Classic Flap",
            "condition": "good",
            "defects": ["corner wear", "light scratches"],
            "summary": "Well kept."
        }));
        assert_eq!(listing.brand(), Some("Chanel"));
        assert_eq!(listing.product_type(), Some("shoulder bag"));
        assert_eq!(listing.condition(), Some("good"));
        assert_eq!(listing.defects(), vec!["corner wear", "light scratches"]);

        let condition = record(json!({
            "brand": "Hermès",
            "category": "tote",
            "condition_summary": "fair",
            "defects": "handle darkening"
        }));
        assert_eq!(condition.product_type(), Some("tote"));
        assert_eq!(condition.condition(), Some("fair"));
        assert_eq!(condition.defects(), vec!["handle darkening"]);
        assert!(condition.summary().is_none());
    }

    #[test]
    fn missing_fields_reports_absent_keys() {
        let r = record(json!({ "brand": "Gucci" }));
        assert_eq!(
            r.missing_fields(&["brand", "defects", "summary"]),
            vec!["defects", "summary"]
        );
    }

    #[test]
    fn parsed_serialises_as_bare_record() {
        let result = ExtractedResult::Parsed(record(json!({ "brand": "Gucci", "extra": 1 })));
        assert_eq!(
            serde_json::to_value(&result).unwrap(),
            json!({ "brand": "Gucci", "extra": 1 })
        );
        assert_eq!(result.kind(), ResultKind::Parsed);
        assert!(result.warning().is_none());
    }

    #[test]
    fn unparsed_serialises_as_envelope() {
        let result = ExtractedResult::Unparsed(UnparsedOutput::new("no idea"));
        assert_eq!(
            serde_json::to_value(&result).unwrap(),
            json!({
                "rawText": "no idea",
                "parsed": null,
                "warning": UNPARSED_WARNING
            })
        );
        assert!(result.record().is_none());
    }

    #[test]
    fn record_survives_reserialisation() {
        let r = record(json!({
            "brand": "Prada",
            "defects": [],
            "nested": { "a": [1, 2.5, null, true] }
        }));
        let text = serde_json::to_string(&r).unwrap();
        let back: ItemRecord = serde_json::from_str(&text).unwrap();
        assert_eq!(back, r);
    }
}
