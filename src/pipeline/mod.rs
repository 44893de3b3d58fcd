//! Pipeline stages for image-to-JSON analysis.
//!
//! Each submodule implements exactly one transformation step, so each can be
//! tested without the others (and without a network for the pure ones).
//!
//! ## Data Flow
//!
//! ```text
//! input ──▶ fetch ──▶ encode ──▶ llm ──▶ postprocess
//! (URLs)    (bytes)   (base64)   (VLM)   (fences + JSON)
//! ```
//!
//! 1. [`input`]  — classify and normalise client-supplied image references
//! 2. [`fetch`]  — download each image; sequential or bounded-concurrent,
//!    always in input order
//! 3. [`encode`] — base64-wrap the images and append the instruction part;
//!    runs in `spawn_blocking`
//! 4. [`llm`]    — one `generateContent` POST; the only call to the model
//! 5. [`postprocess`] — pull the text out, strip fences, parse or fall back

pub mod encode;
pub mod fetch;
pub mod input;
pub mod llm;
pub mod postprocess;
