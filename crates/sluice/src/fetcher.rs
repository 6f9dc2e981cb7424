//! Concurrent segment retrieval with per-item retry and failure isolation.
//!
//! Every fetch task carries the index of its [`SegmentReference`]; completion
//! order is never meaningful. The fetch phase of a rendition ends only when
//! every reference has a terminal [`FetchResult`].

use std::path::{Path, PathBuf};
use std::sync::Arc;

use futures::StreamExt;
use futures::stream::FuturesUnordered;
use reqwest::Client;
use tokio::io::AsyncWriteExt;
use tokio_util::sync::CancellationToken;
use tracing::{debug, instrument, warn};
use url::Url;

use crate::config::FetcherConfig;
use crate::error::PipelineError;
use crate::manifest::SegmentReference;
use crate::retry::retry_with_backoff;
use crate::workspace::Workspace;

/// Terminal outcome of one segment fetch.
#[derive(Debug)]
pub enum FetchOutcome {
    Fetched { path: PathBuf, bytes: u64 },
    Failed(PipelineError),
}

/// One result per [`SegmentReference`], tagged with its original index.
/// Never dropped: the assembler accounts for every reference.
#[derive(Debug)]
pub struct FetchResult {
    pub index: usize,
    pub outcome: FetchOutcome,
}

impl FetchResult {
    pub fn is_fetched(&self) -> bool {
        matches!(self.outcome, FetchOutcome::Fetched { .. })
    }
}

pub struct SegmentFetcher {
    client: Client,
    config: Arc<FetcherConfig>,
}

impl SegmentFetcher {
    /// The HTTP client is injected so tests and concurrent runs can supply
    /// their own instance.
    pub fn new(client: Client, config: Arc<FetcherConfig>) -> Self {
        Self { client, config }
    }

    /// Fetch every referenced segment of one rendition to the workspace.
    ///
    /// Downloads run concurrently, capped at `fetch_concurrency` in-flight
    /// transfers (0 = unbounded). Returns once every reference has reached
    /// a terminal state; results arrive in completion order and carry their
    /// manifest index. A terminal failure cancels `token` so siblings stop
    /// scheduling new retries, but transfers already in flight finish.
    #[instrument(skip_all, fields(rendition = rendition_id, segments = references.len()))]
    pub async fn fetch_rendition(
        &self,
        rendition_id: &str,
        references: &[SegmentReference],
        workspace: &Workspace,
        token: &CancellationToken,
    ) -> Vec<FetchResult> {
        let limit = match self.config.fetch_concurrency {
            0 => usize::MAX,
            n => n,
        };

        let mut pending = references.iter().cloned();
        let mut in_flight = FuturesUnordered::new();
        let mut results = Vec::with_capacity(references.len());

        loop {
            while in_flight.len() < limit {
                let Some(reference) = pending.next() else {
                    break;
                };
                let dest = workspace.path_for(&reference.filename);
                in_flight.push(self.fetch_segment(reference, dest, token));
            }

            let Some(result) = in_flight.next().await else {
                break;
            };
            if let FetchOutcome::Failed(err) = &result.outcome {
                warn!(
                    rendition = rendition_id,
                    index = result.index,
                    error = %err,
                    "Segment fetch failed terminally"
                );
                // The rendition is doomed: stop scheduling new retries.
                token.cancel();
            }
            results.push(result);
        }

        results
    }

    async fn fetch_segment(
        &self,
        reference: SegmentReference,
        dest: PathBuf,
        token: &CancellationToken,
    ) -> FetchResult {
        let fetched = retry_with_backoff(&self.config.retry, token, |_| {
            self.transfer(&reference.url, &dest, "segment fetch")
        })
        .await;

        match fetched {
            Ok(bytes) => {
                debug!(index = reference.index, bytes, url = %reference.url, "Fetched segment");
                FetchResult {
                    index: reference.index,
                    outcome: FetchOutcome::Fetched { path: dest, bytes },
                }
            }
            Err(err) => FetchResult {
                index: reference.index,
                outcome: FetchOutcome::Failed(segment_failure(err, &reference.url)),
            },
        }
    }

    /// Streamed download with retry, for single resources (compressed
    /// manifest, media playlists, init blobs). Returns the byte count.
    /// Failures keep their transport error kind; only segment fetches are
    /// rewritten to `SegmentUnavailable`.
    pub async fn fetch_to_file(
        &self,
        url: &Url,
        dest: &Path,
        operation: &'static str,
    ) -> Result<u64, PipelineError> {
        let token = CancellationToken::new();
        retry_with_backoff(&self.config.retry, &token, |_| {
            self.transfer(url, dest, operation)
        })
        .await
    }

    /// One transfer attempt: stream the response body to `dest` chunk by
    /// chunk. The payload is never buffered wholly in memory. A body error
    /// mid-stream leaves a truncated file behind and counts as transient;
    /// the retry rewrites the file from the start.
    async fn transfer(
        &self,
        url: &Url,
        dest: &Path,
        operation: &'static str,
    ) -> Result<u64, PipelineError> {
        let response = self
            .client
            .get(url.clone())
            .timeout(self.config.segment_download_timeout)
            .send()
            .await
            .map_err(|e| classify_reqwest_error(e, url))?;

        let status = response.status();
        if !status.is_success() {
            // Retryability (5xx, 429) is decided by the error itself.
            return Err(PipelineError::http_status(status, url.as_str(), operation));
        }

        let mut file = tokio::fs::File::create(dest).await?;
        let mut stream = response.bytes_stream();
        let mut written = 0u64;
        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(|e| classify_reqwest_error(e, url))?;
            file.write_all(&chunk).await?;
            written += chunk.len() as u64;
        }
        file.flush().await?;

        Ok(written)
    }
}

/// Connect, timeout, request and body-read errors are worth another
/// attempt; redirect policy and builder errors are not.
fn classify_reqwest_error(e: reqwest::Error, url: &Url) -> PipelineError {
    if e.is_connect() || e.is_timeout() || e.is_request() || e.is_body() || e.is_decode() {
        PipelineError::Network { source: e }
    } else {
        PipelineError::segment_unavailable(url.as_str(), e.to_string())
    }
}

/// Final error of a segment fetch, whether terminal on the spot (4xx) or
/// a transient failure that survived the whole retry budget. Both surface
/// as `SegmentUnavailable`, carrying the offending URL.
fn segment_failure(err: PipelineError, url: &Url) -> PipelineError {
    match err {
        PipelineError::SegmentUnavailable { .. } | PipelineError::Cancelled => err,
        other => PipelineError::segment_unavailable(url.as_str(), other.to_string()),
    }
}
