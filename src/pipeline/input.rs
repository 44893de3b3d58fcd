//! Input normalisation: turn loosely-typed client values into fetchable URLs.
//!
//! Clients send `imageUrl` as a string most of the time, but also as a
//! one-element array, an array of strings, or something else entirely
//! (a number, an object, `null`). Rather than coercing blindly, each raw value
//! is first classified into a [`RawImageRef`] and then handled by the
//! normaliser for that shape. Shapes we do not understand are rejected with the
//! JSON type we actually saw.
//!
//! Scheme repair covers the two partial forms seen in practice:
//! protocol-relative CDN links (`//cdn.example.com/x.jpg`) and bare host paths
//! (`s3.amazonaws.com/bucket/x.jpg`). Everything here is pure; no I/O.

use crate::error::AnalysisError;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Deserialize;
use serde_json::Value;
use std::fmt;

static RE_HTTP_SCHEME: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)^https?://").unwrap());

/// JSON type names reported in `InvalidInputType`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JsonType {
    Null,
    Boolean,
    Number,
    String,
    Array,
    Object,
}

impl JsonType {
    pub fn of(value: &Value) -> Self {
        match value {
            Value::Null => JsonType::Null,
            Value::Bool(_) => JsonType::Boolean,
            Value::Number(_) => JsonType::Number,
            Value::String(_) => JsonType::String,
            Value::Array(_) => JsonType::Array,
            Value::Object(_) => JsonType::Object,
        }
    }
}

impl fmt::Display for JsonType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            JsonType::Null => "null",
            JsonType::Boolean => "boolean",
            JsonType::Number => "number",
            JsonType::String => "string",
            JsonType::Array => "array",
            JsonType::Object => "object",
        })
    }
}

/// A client-supplied image reference, classified by shape.
#[derive(Debug, Clone, PartialEq)]
pub enum RawImageRef<'a> {
    /// A bare string.
    Text(&'a str),
    /// A list; only its first element is used.
    List(&'a [Value]),
    /// Anything else. Always rejected.
    Other(JsonType),
}

impl<'a> RawImageRef<'a> {
    pub fn classify(value: &'a Value) -> Self {
        match value {
            Value::String(s) => RawImageRef::Text(s),
            Value::Array(items) => RawImageRef::List(items),
            other => RawImageRef::Other(JsonType::of(other)),
        }
    }
}

/// Inbound request body as parsed by the HTTP adapter.
///
/// Both keys are optional and untyped on purpose: type checking happens in
/// [`normalize_request`] so the client gets a precise error instead of a
/// generic deserialisation failure.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct AnalysisRequest {
    #[serde(rename = "imageUrl", default)]
    pub image_url: Option<Value>,
    #[serde(rename = "imageUrls", default)]
    pub image_urls: Option<Value>,
}

/// Which entry operation a request maps to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RequestedImages {
    /// `imageUrl` was given.
    Single(String),
    /// `imageUrls` was given (1..N URLs, input order).
    Multiple(Vec<String>),
}

impl RequestedImages {
    pub fn into_urls(self) -> Vec<String> {
        match self {
            RequestedImages::Single(url) => vec![url],
            RequestedImages::Multiple(urls) => urls,
        }
    }
}

/// Normalise a single raw image reference into an absolute HTTP(S) URL.
///
/// 1. A list is replaced by its first element (empty list → `MissingInput`).
/// 2. The value must then be a string (else `InvalidInputType`).
/// 3. Whitespace is trimmed (empty → `MissingInput`).
/// 4. The scheme is repaired with [`repair_scheme`].
pub fn normalize_image_url(raw: &Value) -> Result<String, AnalysisError> {
    match RawImageRef::classify(raw) {
        RawImageRef::Text(s) => normalize_text(s),
        RawImageRef::List(items) => normalize_list(items),
        RawImageRef::Other(kind) => Err(invalid_type(kind)),
    }
}

/// Normalise an `imageUrls`-style value: a non-empty array of references.
///
/// Each element goes through [`normalize_image_url`]; order is preserved.
pub fn normalize_image_set(raw: &Value) -> Result<Vec<String>, AnalysisError> {
    let items = match raw {
        Value::Array(items) => items,
        other => {
            return Err(AnalysisError::InvalidInputType {
                received: JsonType::of(other).to_string(),
            })
        }
    };
    if items.is_empty() {
        return Err(AnalysisError::EmptyImageSet);
    }
    items.iter().map(normalize_image_url).collect()
}

/// Resolve a request body into normalised URLs.
///
/// `imageUrls` takes precedence when both keys are present. A key holding
/// `null` counts as absent.
pub fn normalize_request(req: &AnalysisRequest) -> Result<RequestedImages, AnalysisError> {
    let present = |v: &Option<Value>| v.as_ref().filter(|v| !v.is_null()).cloned();

    if let Some(urls) = present(&req.image_urls) {
        return normalize_image_set(&urls).map(RequestedImages::Multiple);
    }
    if let Some(url) = present(&req.image_url) {
        return normalize_image_url(&url).map(RequestedImages::Single);
    }
    Err(AnalysisError::MissingInput { detail: None })
}

/// Add a scheme to protocol-relative or scheme-less URLs.
///
/// * `//host/path` → `https://host/path`
/// * `host/path` or `/host/path` → `https://host/path`
/// * `http://…` / `https://…` (any case) → unchanged
pub fn repair_scheme(url: &str) -> String {
    if let Some(rest) = url.strip_prefix("//") {
        format!("https://{rest}")
    } else if !is_url(url) {
        format!("https://{}", url.trim_start_matches('/'))
    } else {
        url.to_string()
    }
}

/// Check if the input string already carries an HTTP(S) scheme.
pub fn is_url(input: &str) -> bool {
    RE_HTTP_SCHEME.is_match(input)
}

fn normalize_text(s: &str) -> Result<String, AnalysisError> {
    let trimmed = s.trim();
    if trimmed.is_empty() {
        return Err(AnalysisError::MissingInput { detail: None });
    }
    Ok(repair_scheme(trimmed))
}

fn normalize_list(items: &[Value]) -> Result<String, AnalysisError> {
    match items.first() {
        None => Err(AnalysisError::MissingInput {
            detail: Some("image list is empty".into()),
        }),
        Some(Value::String(s)) => normalize_text(s),
        Some(other) => Err(invalid_type(JsonType::of(other))),
    }
}

fn invalid_type(kind: JsonType) -> AnalysisError {
    AnalysisError::InvalidInputType {
        received: kind.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_is_url() {
        assert!(is_url("https://example.com/x.jpg"));
        assert!(is_url("HTTP://example.com/x.jpg"));
        assert!(!is_url("//example.com/x.jpg"));
        assert!(!is_url("example.com/x.jpg"));
        assert!(!is_url(""));
    }

    #[test]
    fn protocol_relative_gets_https() {
        assert_eq!(
            normalize_image_url(&json!("//cdn.example.com/x.jpg")).unwrap(),
            "https://cdn.example.com/x.jpg"
        );
    }

    #[test]
    fn bare_host_gets_https() {
        assert_eq!(
            normalize_image_url(&json!("cdn.example.com/x.jpg")).unwrap(),
            "https://cdn.example.com/x.jpg"
        );
        assert_eq!(
            normalize_image_url(&json!("/cdn.example.com/x.jpg")).unwrap(),
            "https://cdn.example.com/x.jpg"
        );
        // `//` is checked first, so a triple slash keeps one of them.
        assert_eq!(
            normalize_image_url(&json!("///cdn.example.com/x.jpg")).unwrap(),
            "https:///cdn.example.com/x.jpg"
        );
    }

    #[test]
    fn absolute_urls_are_identity() {
        for url in [
            "https://cdn.example.com/x.jpg",
            "http://cdn.example.com/x.jpg?w=400",
            "HTTPS://CDN.EXAMPLE.COM/X.JPG",
        ] {
            assert_eq!(normalize_image_url(&json!(url)).unwrap(), url);
        }
    }

    #[test]
    fn whitespace_is_trimmed() {
        assert_eq!(
            normalize_image_url(&json!("  https://a.example/x.jpg \n")).unwrap(),
            "https://a.example/x.jpg"
        );
    }

    #[test]
    fn one_element_list_matches_bare_string() {
        for url in ["https://a.example/x.jpg", "//a.example/x.jpg", "a.example/x.jpg"] {
            assert_eq!(
                normalize_image_url(&json!([url])).unwrap(),
                normalize_image_url(&json!(url)).unwrap()
            );
        }
    }

    #[test]
    fn list_uses_first_element_only() {
        assert_eq!(
            normalize_image_url(&json!(["https://a.example/1.jpg", 42])).unwrap(),
            "https://a.example/1.jpg"
        );
    }

    #[test]
    fn empty_inputs_are_missing() {
        for raw in [json!(""), json!("   "), json!([]), json!(["  "])] {
            let err = normalize_image_url(&raw).unwrap_err();
            assert!(
                matches!(err, AnalysisError::MissingInput { .. }),
                "{raw} gave {err:?}"
            );
        }
    }

    #[test]
    fn other_shapes_report_type() {
        let cases = [
            (json!(42), "number"),
            (json!(true), "boolean"),
            (json!(null), "null"),
            (json!({ "url": "https://a.example/x.jpg" }), "object"),
            (json!([7]), "number"),
            (json!([["https://a.example/x.jpg"]]), "array"),
        ];
        for (raw, expected) in cases {
            match normalize_image_url(&raw) {
                Err(AnalysisError::InvalidInputType { received }) => {
                    assert_eq!(received, expected, "for {raw}")
                }
                other => panic!("{raw}: expected InvalidInputType, got {other:?}"),
            }
        }
    }

    #[test]
    fn image_set_preserves_order() {
        let urls = normalize_image_set(&json!([
            "https://a.example/1.jpg",
            "//a.example/2.jpg",
            ["a.example/3.jpg"]
        ]))
        .unwrap();
        assert_eq!(
            urls,
            vec![
                "https://a.example/1.jpg",
                "https://a.example/2.jpg",
                "https://a.example/3.jpg"
            ]
        );
    }

    #[test]
    fn image_set_rejects_empty_and_non_arrays() {
        assert!(matches!(
            normalize_image_set(&json!([])),
            Err(AnalysisError::EmptyImageSet)
        ));
        assert!(matches!(
            normalize_image_set(&json!("https://a.example/x.jpg")),
            Err(AnalysisError::InvalidInputType { .. })
        ));
    }

    #[test]
    fn image_set_fails_on_any_bad_element() {
        let err = normalize_image_set(&json!(["https://a.example/1.jpg", ""])).unwrap_err();
        assert!(matches!(err, AnalysisError::MissingInput { .. }));
    }

    #[test]
    fn request_prefers_image_urls() {
        let req: AnalysisRequest = serde_json::from_value(json!({
            "imageUrl": "https://a.example/single.jpg",
            "imageUrls": ["https://a.example/multi.jpg"]
        }))
        .unwrap();
        assert_eq!(
            normalize_request(&req).unwrap(),
            RequestedImages::Multiple(vec!["https://a.example/multi.jpg".into()])
        );
    }

    #[test]
    fn request_single_and_missing() {
        let req: AnalysisRequest =
            serde_json::from_value(json!({ "imageUrl": ["//a.example/x.jpg"] })).unwrap();
        assert_eq!(
            normalize_request(&req).unwrap(),
            RequestedImages::Single("https://a.example/x.jpg".into())
        );

        let empty: AnalysisRequest = serde_json::from_value(json!({ "other": 1 })).unwrap();
        assert!(matches!(
            normalize_request(&empty),
            Err(AnalysisError::MissingInput { .. })
        ));

        let nulls: AnalysisRequest =
            serde_json::from_value(json!({ "imageUrl": null, "imageUrls": null })).unwrap();
        assert!(matches!(
            normalize_request(&nulls),
            Err(AnalysisError::MissingInput { .. })
        ));
    }
}
