//! Instruction prompts sent after the images in every analysis request.
//!
//! One prompt per [`crate::config::ResponseSchema`]. Each prompt ends with the
//! literal JSON skeleton the model should fill in; the extractor in
//! [`crate::pipeline::postprocess`] relies on the model answering with a single
//! JSON object, optionally wrapped in a fence.
//!
//! Callers can override the text via [`crate::config::AnalysisConfig::instruction`].

/// Detailed listing prompt (schema `Listing`, the default).
pub const LISTING_PROMPT: &str = r#"These photos show a pre-owned luxury bag. Analyse the brand, the product name, the product type and its condition (scratches, stains, dents, stretching, etc.) in detail, and return a single JSON object in exactly the following format, with no other text:

{
  "brand": "...",
  "product_type": "...",
  "model_name": "...",
  "condition": "...",
  "defects": ["..."],
  "summary": "..."
}"#;

/// Compact condition prompt (schema `Condition`).
pub const CONDITION_PROMPT: &str = r#"These photos show a pre-owned luxury item. Analyse the brand, the product category and its condition, and output only JSON in the following format:
{
  "brand": "",
  "category": "",
  "condition_summary": "",
  "defects": []
}"#;
