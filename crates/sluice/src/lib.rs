//! Manifest-driven VOD segment retrieval and assembly engine.
//!
//! The pipeline retrieves a compressed master manifest, has an external
//! tool decompress it, fetches every referenced media segment concurrently
//! and reassembles them in manifest order before handing the ordered path
//! lists to the external remux and mux tools.

pub mod assembler;
pub mod config;
pub mod error;
pub mod fetcher;
pub mod manifest;
pub mod pipeline;
pub mod retry;
pub mod tools;
pub mod workspace;

// Re-exports for easier access
pub use assembler::{AssembledRendition, assemble};
pub use config::{FetcherConfig, PipelineConfig};
pub use error::PipelineError;
pub use fetcher::{FetchOutcome, FetchResult, SegmentFetcher};
pub use manifest::{Manifest, Rendition, SegmentReference};
pub use pipeline::Pipeline;
pub use retry::RetryPolicy;
pub use tools::{ManifestDecompressor, Muxer, Remuxer};
pub use workspace::Workspace;
