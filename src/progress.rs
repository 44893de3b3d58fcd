//! Progress-callback trait for pipeline stage events.
//!
//! Inject an [`Arc<dyn AnalysisProgressCallback>`] via
//! [`crate::config::AnalysisConfigBuilder::progress_callback`] to observe a
//! request moving through the linear state machine:
//!
//! ```text
//! Received → Normalized → Fetched → Assembled → Inferred → Extracted → Done
//!     └──────────┴───────────┴──────────┴───────────┴──────────→ Failed
//! ```
//!
//! The CLI uses this to drive its spinner; a server could forward the events
//! to metrics. The trait is `Send + Sync` because images may be fetched
//! concurrently.
//!
//! # Example
//!
//! ```rust
//! use edgequake_img2json::{AnalysisConfig, AnalysisProgressCallback, Stage};
//! use std::sync::{Arc, Mutex};
//!
//! struct Recorder(Mutex<Vec<Stage>>);
//!
//! impl AnalysisProgressCallback for Recorder {
//!     fn on_stage(&self, stage: Stage) {
//!         self.0.lock().unwrap().push(stage);
//!     }
//! }
//!
//! let config = AnalysisConfig::builder()
//!     .api_key("test-key")
//!     .progress_callback(Arc::new(Recorder(Mutex::new(Vec::new()))))
//!     .build()
//!     .unwrap();
//! ```

use crate::error::ErrorKind;
use std::fmt;
use std::sync::Arc;

/// One state of the analysis pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Received,
    Normalized,
    Fetched,
    Assembled,
    Inferred,
    Extracted,
    Done,
    Failed(ErrorKind),
}

impl Stage {
    /// `true` for `Done` and `Failed`.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Stage::Done | Stage::Failed(_))
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Stage::Received => f.write_str("received"),
            Stage::Normalized => f.write_str("normalized"),
            Stage::Fetched => f.write_str("fetched"),
            Stage::Assembled => f.write_str("assembled"),
            Stage::Inferred => f.write_str("inferred"),
            Stage::Extracted => f.write_str("extracted"),
            Stage::Done => f.write_str("done"),
            Stage::Failed(kind) => write!(f, "failed ({kind:?})"),
        }
    }
}

/// Called by the pipeline as a request advances.
///
/// All methods have default no-op implementations so callers only override
/// what they care about. `on_image_fetched` may be called from several tasks
/// at once when fetching concurrently.
pub trait AnalysisProgressCallback: Send + Sync {
    /// Called on every state transition, including the terminal one.
    fn on_stage(&self, stage: Stage) {
        let _ = stage;
    }

    /// Called once per downloaded image.
    ///
    /// # Arguments
    /// * `index` — 0-based position in the request
    /// * `total` — number of images in the request
    /// * `bytes` — size of the downloaded body
    fn on_image_fetched(&self, index: usize, total: usize, bytes: usize) {
        let _ = (index, total, bytes);
    }
}

/// A no-op implementation for callers that don't need progress events.
pub struct NoopProgressCallback;

impl AnalysisProgressCallback for NoopProgressCallback {}

/// Convenience alias matching the type stored in [`crate::config::AnalysisConfig`].
pub type ProgressCallback = Arc<dyn AnalysisProgressCallback>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    struct TrackingCallback {
        stages: Mutex<Vec<Stage>>,
        fetched_bytes: AtomicUsize,
    }

    impl AnalysisProgressCallback for TrackingCallback {
        fn on_stage(&self, stage: Stage) {
            self.stages.lock().unwrap().push(stage);
        }

        fn on_image_fetched(&self, _index: usize, _total: usize, bytes: usize) {
            self.fetched_bytes.fetch_add(bytes, Ordering::SeqCst);
        }
    }

    #[test]
    fn noop_callback_does_not_panic() {
        let cb = NoopProgressCallback;
        cb.on_stage(Stage::Received);
        cb.on_image_fetched(0, 1, 42);
        cb.on_stage(Stage::Failed(ErrorKind::FetchError));
    }

    #[test]
    fn tracking_callback_receives_events() {
        let tracker = TrackingCallback {
            stages: Mutex::new(Vec::new()),
            fetched_bytes: AtomicUsize::new(0),
        };
        tracker.on_stage(Stage::Received);
        tracker.on_image_fetched(0, 2, 100);
        tracker.on_image_fetched(1, 2, 50);
        tracker.on_stage(Stage::Done);

        assert_eq!(tracker.fetched_bytes.load(Ordering::SeqCst), 150);
        assert_eq!(
            *tracker.stages.lock().unwrap(),
            vec![Stage::Received, Stage::Done]
        );
    }

    #[test]
    fn terminal_stages() {
        assert!(Stage::Done.is_terminal());
        assert!(Stage::Failed(ErrorKind::Internal).is_terminal());
        assert!(!Stage::Inferred.is_terminal());
        assert_eq!(
            Stage::Failed(ErrorKind::FetchError).to_string(),
            "failed (FetchError)"
        );
    }
}
