use std::path::PathBuf;
use std::time::Duration;

use reqwest::Client;
use url::Url;

use crate::error::PipelineError;
use crate::retry::RetryPolicy;

pub const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/142.0.0.0 Safari/537.36";

/// File extension that marks a playlist line as a media segment reference.
pub const DEFAULT_SEGMENT_SUFFIX: &str = ".m4s";

/// Configuration for the segment fetcher and its HTTP client.
#[derive(Debug, Clone)]
pub struct FetcherConfig {
    /// Maximum concurrent segment downloads per rendition (0 = unbounded).
    pub fetch_concurrency: usize,

    /// Per-request timeout covering the whole segment transfer.
    pub segment_download_timeout: Duration,

    /// Connection timeout (time to establish the initial connection).
    pub connect_timeout: Duration,

    /// User agent string.
    pub user_agent: String,

    /// Maximum idle connections to keep per host. Higher values improve
    /// connection reuse when many segments come from the same origin.
    pub pool_max_idle_per_host: usize,

    /// Duration to keep idle connections alive before closing.
    pub pool_idle_timeout: Duration,

    /// Retry policy for transient transport failures.
    pub retry: RetryPolicy,
}

impl Default for FetcherConfig {
    fn default() -> Self {
        Self {
            fetch_concurrency: 8,
            segment_download_timeout: Duration::from_secs(30),
            connect_timeout: Duration::from_secs(10),
            user_agent: DEFAULT_USER_AGENT.to_owned(),
            pool_max_idle_per_host: 10,
            pool_idle_timeout: Duration::from_secs(30),
            retry: RetryPolicy::default(),
        }
    }
}

impl FetcherConfig {
    /// Build the HTTP client used by the pipeline.
    ///
    /// The client is constructed once and passed into every component that
    /// performs network I/O, so tests and concurrent runs can inject their
    /// own instance.
    pub fn http_client(&self) -> Result<Client, PipelineError> {
        Client::builder()
            .user_agent(&self.user_agent)
            .connect_timeout(self.connect_timeout)
            .pool_max_idle_per_host(self.pool_max_idle_per_host)
            .pool_idle_timeout(self.pool_idle_timeout)
            .build()
            .map_err(PipelineError::from)
    }
}

/// Per-run configuration for one pipeline pass.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// URL of the compressed master manifest.
    pub manifest_url: Url,

    /// Base content URL against which relative references resolve.
    pub base_url: Url,

    /// Staging directory for all run artifacts.
    pub workspace_dir: PathBuf,

    /// Rendition ids to process; empty means every rendition in the manifest.
    pub variants: Vec<String>,

    /// Suffix that marks playlist lines as segment references.
    pub segment_suffix: String,

    /// Command used to decompress the manifest, e.g. `["blurl", "-d"]`.
    /// The manifest path is appended as the final argument.
    pub decompress_command: Vec<String>,

    /// Path to the ffmpeg binary used for per-rendition remuxing.
    pub ffmpeg_path: String,

    /// Path to the MP4Box binary used for merging renditions.
    pub mp4box_path: String,

    /// Filename of the final merged deliverable inside the workspace.
    pub merged_output_name: String,

    pub fetcher: FetcherConfig,
}

impl PipelineConfig {
    pub fn new(manifest_url: Url, base_url: Url, workspace_dir: impl Into<PathBuf>) -> Self {
        Self {
            manifest_url,
            base_url,
            workspace_dir: workspace_dir.into(),
            variants: Vec::new(),
            segment_suffix: DEFAULT_SEGMENT_SUFFIX.to_owned(),
            decompress_command: vec!["blurl".to_owned(), "-d".to_owned()],
            ffmpeg_path: std::env::var("FFMPEG_PATH").unwrap_or_else(|_| "ffmpeg".to_owned()),
            mp4box_path: std::env::var("MP4BOX_PATH").unwrap_or_else(|_| "MP4Box".to_owned()),
            merged_output_name: "output_merged.mp4".to_owned(),
            fetcher: FetcherConfig::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_fetcher_config_is_bounded() {
        let config = FetcherConfig::default();
        assert!(config.fetch_concurrency > 0);
        assert!(config.retry.max_retries > 0);
    }

    #[test]
    fn http_client_builds_from_defaults() {
        let config = FetcherConfig::default();
        assert!(config.http_client().is_ok());
    }
}
