use reqwest::StatusCode;

#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error("run cancelled")]
    Cancelled,

    #[error("invalid URL `{input}`: {reason}")]
    InvalidUrl { input: String, reason: String },

    #[error("malformed manifest: {reason}")]
    ManifestMalformed { reason: String },

    #[error("manifest decompression failed: {detail}")]
    ManifestDecompressionFailed { detail: String },

    #[error("segment `{url}` unavailable: {reason}")]
    SegmentUnavailable { url: String, reason: String },

    #[error("rendition `{rendition}` incomplete, missing segment indices {missing:?}")]
    IncompleteRendition {
        rendition: String,
        missing: Vec<usize>,
    },

    #[error("duplicate segment index {index} in rendition `{rendition}`")]
    DuplicateSegmentIndex { rendition: String, index: usize },

    #[error("remux failed for rendition `{rendition}`: {detail}")]
    RemuxFailed { rendition: String, detail: String },

    #[error("merge failed: {detail}")]
    MergeFailed { detail: String },

    #[error("HTTP request failed: {source}")]
    Network {
        #[from]
        source: reqwest::Error,
    },

    #[error("request failed with HTTP {status} during {operation} for {url}")]
    HttpStatus {
        status: StatusCode,
        url: String,
        operation: &'static str,
    },

    #[error("I/O error: {source}")]
    Io {
        #[from]
        source: std::io::Error,
    },

    #[error("configuration error: {reason}")]
    Configuration { reason: String },

    #[error("internal error: {reason}")]
    Internal { reason: String },
}

impl PipelineError {
    pub fn invalid_url(input: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidUrl {
            input: input.into(),
            reason: reason.into(),
        }
    }

    pub fn manifest_malformed(reason: impl Into<String>) -> Self {
        Self::ManifestMalformed {
            reason: reason.into(),
        }
    }

    pub fn segment_unavailable(url: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::SegmentUnavailable {
            url: url.into(),
            reason: reason.into(),
        }
    }

    pub fn http_status(
        status: StatusCode,
        url: impl Into<String>,
        operation: &'static str,
    ) -> Self {
        Self::HttpStatus {
            status,
            url: url.into(),
            operation,
        }
    }

    pub fn configuration(reason: impl Into<String>) -> Self {
        Self::Configuration {
            reason: reason.into(),
        }
    }

    /// Whether the fetcher may retry the failed operation.
    ///
    /// Server errors and transport failures are transient; client errors
    /// (4xx), manifest defects and assembly failures are terminal.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Cancelled
            | Self::InvalidUrl { .. }
            | Self::ManifestMalformed { .. }
            | Self::ManifestDecompressionFailed { .. }
            | Self::SegmentUnavailable { .. }
            | Self::IncompleteRendition { .. }
            | Self::DuplicateSegmentIndex { .. }
            | Self::RemuxFailed { .. }
            | Self::MergeFailed { .. }
            | Self::Configuration { .. } => false,
            Self::HttpStatus { status, .. } => {
                status.is_server_error() || *status == StatusCode::TOO_MANY_REQUESTS
            }
            Self::Network { .. } | Self::Io { .. } | Self::Internal { .. } => true,
        }
    }
}
