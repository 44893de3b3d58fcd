//! Image download: normalised URL → [`FetchedImage`].
//!
//! The MIME type is always reported as `image/jpeg`, whatever the image host
//! declares. Gemini tolerates mislabelled PNG/WebP bodies, and trusting
//! arbitrary `Content-Type` headers (`application/octet-stream`,
//! `binary/octet-stream` from S3) rejects far more real images than it fixes.
//!
//! A batch is fetched either sequentially or with bounded concurrency. Both
//! return images in input order: the model relates defects to image position.

use crate::config::{AnalysisConfig, FetchPolicy, FetchStrategy};
use crate::error::AnalysisError;
use crate::progress::ProgressCallback;
use bytes::Bytes;
use futures::stream::{self, StreamExt, TryStreamExt};
use std::time::Duration;
use tracing::{debug, info, warn};

/// MIME type declared for every fetched image.
pub const DEFAULT_MIME_TYPE: &str = "image/jpeg";

/// One downloaded image, owned by a single pipeline invocation.
#[derive(Debug, Clone)]
pub struct FetchedImage {
    pub mime_type: String,
    pub bytes: Bytes,
    pub source_url: String,
}

/// Download a single image.
///
/// # Errors
/// `FetchFailed` with `detail` on transport failure (DNS, TLS, timeout,
/// truncated body) or with `status` on a non-2xx response.
pub async fn fetch_image(
    client: &reqwest::Client,
    url: &str,
    timeout_secs: Option<u64>,
) -> Result<FetchedImage, AnalysisError> {
    debug!("Fetching image: {}", url);

    let mut request = client.get(url);
    if let Some(secs) = timeout_secs {
        request = request.timeout(Duration::from_secs(secs));
    }

    let response = request
        .send()
        .await
        .map_err(|e| transport_error(url, e, timeout_secs))?;

    let status = response.status();
    if !status.is_success() {
        return Err(AnalysisError::FetchFailed {
            url: url.to_string(),
            status: Some(status.as_u16()),
            detail: None,
        });
    }

    let bytes = response
        .bytes()
        .await
        .map_err(|e| transport_error(url, e, timeout_secs))?;

    debug!("Fetched {} bytes from {}", bytes.len(), url);

    Ok(FetchedImage {
        mime_type: DEFAULT_MIME_TYPE.to_string(),
        bytes,
        source_url: url.to_string(),
    })
}

/// Download every URL according to the configured strategy and policy.
///
/// The returned images are in the same order as `urls`. With
/// [`FetchPolicy::FailFast`] the first failure (in input order) aborts the
/// batch; with [`FetchPolicy::BestEffort`] failed images are skipped and the
/// first failure is returned only if nothing could be fetched.
pub async fn fetch_all(
    client: &reqwest::Client,
    urls: &[String],
    config: &AnalysisConfig,
) -> Result<Vec<FetchedImage>, AnalysisError> {
    let total = urls.len();
    info!("Fetching {} image(s)", total);

    match config.fetch_strategy {
        FetchStrategy::Sequential => {
            let results = fetch_sequential(client, urls, config).await;
            collect_results(results, config.fetch_policy)
        }
        FetchStrategy::Concurrent { limit } => {
            fetch_concurrent(client, urls, config, limit.max(1)).await
        }
    }
}

/// Sequential fetch. Under fail-fast, stops issuing requests after the first failure.
async fn fetch_sequential(
    client: &reqwest::Client,
    urls: &[String],
    config: &AnalysisConfig,
) -> Vec<Result<FetchedImage, AnalysisError>> {
    let total = urls.len();
    let mut results = Vec::with_capacity(total);

    for (index, url) in urls.iter().enumerate() {
        let result = fetch_image(client, url, config.download_timeout_secs).await;
        report(&config.progress_callback, index, total, &result);
        let failed = result.is_err();
        results.push(result);
        if failed && config.fetch_policy == FetchPolicy::FailFast {
            break;
        }
    }

    results
}

/// Bounded-concurrency fetch. `buffered` yields in input order.
///
/// Under fail-fast the stream is dropped at the first error in input order,
/// cancelling in-flight downloads and never starting the rest.
async fn fetch_concurrent(
    client: &reqwest::Client,
    urls: &[String],
    config: &AnalysisConfig,
    limit: usize,
) -> Result<Vec<FetchedImage>, AnalysisError> {
    let total = urls.len();
    // Futures own their URL and client handle: borrowed captures fail the
    // higher-ranked `Send` check on axum handlers.
    let fetches = stream::iter(urls.iter().cloned().enumerate().map(|(index, url)| {
        let client = client.clone();
        let callback = config.progress_callback.clone();
        let timeout = config.download_timeout_secs;
        async move {
            let result = fetch_image(&client, &url, timeout).await;
            report(&callback, index, total, &result);
            result
        }
    }))
    .buffered(limit);

    match config.fetch_policy {
        FetchPolicy::FailFast => fetches.try_collect().await,
        FetchPolicy::BestEffort => {
            collect_results(fetches.collect().await, FetchPolicy::BestEffort)
        }
    }
}

fn collect_results(
    results: Vec<Result<FetchedImage, AnalysisError>>,
    policy: FetchPolicy,
) -> Result<Vec<FetchedImage>, AnalysisError> {
    match policy {
        FetchPolicy::FailFast => results.into_iter().collect(),
        FetchPolicy::BestEffort => {
            let mut images = Vec::with_capacity(results.len());
            let mut first_err = None;
            for result in results {
                match result {
                    Ok(img) => images.push(img),
                    Err(e) => {
                        warn!("Skipping image: {}", e);
                        first_err.get_or_insert(e);
                    }
                }
            }
            match (images.is_empty(), first_err) {
                (true, Some(e)) => Err(e),
                (true, None) => Err(AnalysisError::EmptyImageSet),
                (false, _) => Ok(images),
            }
        }
    }
}

fn report(
    callback: &Option<ProgressCallback>,
    index: usize,
    total: usize,
    result: &Result<FetchedImage, AnalysisError>,
) {
    if let (Some(cb), Ok(img)) = (callback, result) {
        cb.on_image_fetched(index, total, img.bytes.len());
    }
}

fn transport_error(url: &str, e: reqwest::Error, timeout_secs: Option<u64>) -> AnalysisError {
    let detail = match (e.is_timeout(), timeout_secs) {
        (true, Some(secs)) => format!("download timed out after {secs}s"),
        _ => e.to_string(),
    };
    AnalysisError::FetchFailed {
        url: url.to_string(),
        status: None,
        detail: Some(detail),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn image(url: &str) -> FetchedImage {
        FetchedImage {
            mime_type: DEFAULT_MIME_TYPE.into(),
            bytes: Bytes::from_static(b"\xff\xd8\xff"),
            source_url: url.into(),
        }
    }

    fn not_found(url: &str) -> AnalysisError {
        AnalysisError::FetchFailed {
            url: url.into(),
            status: Some(404),
            detail: None,
        }
    }

    #[test]
    fn fail_fast_returns_first_error() {
        let results = vec![Ok(image("a")), Err(not_found("b")), Err(not_found("c"))];
        match collect_results(results, FetchPolicy::FailFast) {
            Err(AnalysisError::FetchFailed { url, .. }) => assert_eq!(url, "b"),
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn best_effort_skips_failures_in_order() {
        let results = vec![Err(not_found("a")), Ok(image("b")), Ok(image("c"))];
        let images = collect_results(results, FetchPolicy::BestEffort).unwrap();
        let urls: Vec<_> = images.iter().map(|i| i.source_url.as_str()).collect();
        assert_eq!(urls, vec!["b", "c"]);
    }

    #[test]
    fn best_effort_all_failed_returns_first_error() {
        let results = vec![Err(not_found("a")), Err(not_found("b"))];
        match collect_results(results, FetchPolicy::BestEffort) {
            Err(AnalysisError::FetchFailed { url, .. }) => assert_eq!(url, "a"),
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[tokio::test]
    async fn unreachable_host_is_fetch_error_with_detail() {
        let client = reqwest::Client::new();
        // Port 9 (discard) on localhost is closed in test environments.
        let err = fetch_image(&client, "http://127.0.0.1:9/x.jpg", Some(5))
            .await
            .unwrap_err();
        match err {
            AnalysisError::FetchFailed {
                url,
                status,
                detail,
            } => {
                assert_eq!(url, "http://127.0.0.1:9/x.jpg");
                assert!(status.is_none());
                assert!(detail.is_some());
            }
            other => panic!("unexpected: {other:?}"),
        }
    }
}
