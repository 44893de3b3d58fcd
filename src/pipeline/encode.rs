//! Payload assembly: fetched images + instruction → multimodal request parts.
//!
//! Gemini accepts images inline as base64 `inlineData` parts in the JSON body,
//! so no separate upload step is needed. The part order is fixed: every image
//! first, in input order, then exactly one text part carrying the instruction.
//!
//! Base64 encoding of multi-megabyte photos is CPU-bound, so it runs on the
//! blocking pool via `spawn_blocking`, keeping async workers free for other
//! requests. The buffers belong to this request alone.

use crate::error::AnalysisError;
use crate::pipeline::fetch::FetchedImage;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Base64 image payload for a Gemini `inlineData` part.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InlineData {
    pub mime_type: String,
    pub data: String,
}

/// One content part of a `generateContent` request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Part {
    InlineData {
        #[serde(rename = "inlineData")]
        inline_data: InlineData,
    },
    Text {
        text: String,
    },
}

impl Part {
    pub fn is_image(&self) -> bool {
        matches!(self, Part::InlineData { .. })
    }
}

/// Ordered request parts: N ≥ 1 images followed by one instruction.
///
/// Only constructible through [`assemble_payload`] /
/// [`assemble_payload_blocking`], which enforce the ordering invariant.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AnalysisRequestPayload {
    parts: Vec<Part>,
}

impl AnalysisRequestPayload {
    pub fn parts(&self) -> &[Part] {
        &self.parts
    }

    pub fn image_count(&self) -> usize {
        self.parts.len() - 1
    }

    pub fn into_parts(self) -> Vec<Part> {
        self.parts
    }
}

/// Encode one image as an `inlineData` part.
pub fn encode_image(image: &FetchedImage) -> Part {
    let data = STANDARD.encode(&image.bytes);
    debug!(
        "Encoded {} → {} bytes base64",
        image.source_url,
        data.len()
    );
    Part::InlineData {
        inline_data: InlineData {
            mime_type: image.mime_type.clone(),
            data,
        },
    }
}

/// Build the payload on the current thread.
///
/// # Errors
/// `EmptyImageSet` when `images` is empty.
pub fn assemble_payload_blocking(
    images: &[FetchedImage],
    instruction: &str,
) -> Result<AnalysisRequestPayload, AnalysisError> {
    if images.is_empty() {
        return Err(AnalysisError::EmptyImageSet);
    }

    let mut parts: Vec<Part> = images.iter().map(encode_image).collect();
    parts.push(Part::Text {
        text: instruction.to_string(),
    });

    Ok(AnalysisRequestPayload { parts })
}

/// Build the payload on the blocking thread pool, consuming the images.
pub async fn assemble_payload(
    images: Vec<FetchedImage>,
    instruction: String,
) -> Result<AnalysisRequestPayload, AnalysisError> {
    if images.is_empty() {
        return Err(AnalysisError::EmptyImageSet);
    }

    tokio::task::spawn_blocking(move || assemble_payload_blocking(&images, &instruction))
        .await
        .map_err(|e| AnalysisError::Internal(format!("Encode task panicked: {}", e)))?
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;
    use serde_json::json;

    fn image(bytes: &'static [u8], url: &str) -> FetchedImage {
        FetchedImage {
            mime_type: "image/jpeg".into(),
            bytes: Bytes::from_static(bytes),
            source_url: url.into(),
        }
    }

    #[test]
    fn images_precede_single_instruction() {
        let payload = assemble_payload_blocking(
            &[image(b"first", "a"), image(b"second", "b")],
            "describe",
        )
        .unwrap();

        let parts = payload.parts();
        assert_eq!(parts.len(), 3);
        assert!(parts[0].is_image());
        assert!(parts[1].is_image());
        assert_eq!(
            parts[2],
            Part::Text {
                text: "describe".into()
            }
        );
        assert_eq!(payload.image_count(), 2);

        match &parts[1] {
            Part::InlineData { inline_data } => {
                assert_eq!(STANDARD.decode(&inline_data.data).unwrap(), b"second");
            }
            other => panic!("unexpected part: {other:?}"),
        }
    }

    #[test]
    fn zero_images_is_error() {
        assert!(matches!(
            assemble_payload_blocking(&[], "describe"),
            Err(AnalysisError::EmptyImageSet)
        ));
    }

    #[test]
    fn parts_use_gemini_wire_names() {
        let payload = assemble_payload_blocking(&[image(b"hi", "a")], "go").unwrap();
        let value = serde_json::to_value(payload.parts()).unwrap();
        assert_eq!(
            value,
            json!([
                { "inlineData": { "mimeType": "image/jpeg", "data": "aGk=" } },
                { "text": "go" }
            ])
        );
    }

    #[tokio::test]
    async fn async_assembly_matches_blocking() {
        let images = vec![image(b"abc", "a")];
        let blocking = assemble_payload_blocking(&images, "x").unwrap();
        let threaded = assemble_payload(images, "x".into()).await.unwrap();
        assert_eq!(blocking, threaded);
    }

    #[tokio::test]
    async fn async_assembly_rejects_empty() {
        assert!(matches!(
            assemble_payload(Vec::new(), "x".into()).await,
            Err(AnalysisError::EmptyImageSet)
        ));
    }
}
