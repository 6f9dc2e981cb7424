//! Run orchestration: workspace normalization, manifest retrieval,
//! per-rendition fetch/assemble/remux, and the final merge.
//!
//! Renditions are processed sequentially; each rendition's fetch phase is
//! itself concurrent, so parallelizing across renditions would only trade
//! contention for wall-clock. A failing rendition never aborts its
//! siblings, but the run as a whole fails if any rendition is incomplete.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use reqwest::Client;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, instrument};

use crate::assembler;
use crate::config::PipelineConfig;
use crate::error::PipelineError;
use crate::fetcher::SegmentFetcher;
use crate::manifest::{self, Manifest, Rendition};
use crate::tools::{ManifestDecompressor, Muxer, Remuxer};
use crate::workspace::Workspace;

pub struct Pipeline {
    config: PipelineConfig,
    workspace: Workspace,
    fetcher: SegmentFetcher,
    decompressor: ManifestDecompressor,
    remuxer: Remuxer,
    muxer: Muxer,
}

impl Pipeline {
    pub fn new(config: PipelineConfig) -> Result<Self, PipelineError> {
        let client = config.fetcher.http_client()?;
        Self::with_client(config, client)
    }

    /// Build a pipeline around an externally constructed HTTP client.
    pub fn with_client(config: PipelineConfig, client: Client) -> Result<Self, PipelineError> {
        let workspace = Workspace::new(&config.workspace_dir);
        let fetcher = SegmentFetcher::new(client, Arc::new(config.fetcher.clone()));
        let decompressor = ManifestDecompressor::new(config.decompress_command.clone())?;
        let remuxer = Remuxer::new(config.ffmpeg_path.clone());
        let muxer = Muxer::new(config.mp4box_path.clone());
        Ok(Self {
            config,
            workspace,
            fetcher,
            decompressor,
            remuxer,
            muxer,
        })
    }

    /// Execute one full pass and return the path of the deliverable.
    ///
    /// Phase order is strict: the workspace is fully normalized before any
    /// fetch starts, and assembly waits on every fetch task of its
    /// rendition.
    pub async fn run(&self) -> Result<PathBuf, PipelineError> {
        self.workspace.prepare().await?;

        let manifest = self.retrieve_manifest().await?;
        let selected = manifest.select(&self.config.variants);
        if selected.is_empty() {
            return Err(PipelineError::manifest_malformed(format!(
                "variant selection {:?} matched no renditions",
                self.config.variants
            )));
        }

        let mut outputs = Vec::with_capacity(selected.len());
        let mut first_error: Option<PipelineError> = None;
        for rendition in selected {
            match self.process_rendition(rendition).await {
                Ok(output) => outputs.push(output),
                Err(err) => {
                    error!(rendition = %rendition.id, error = %err, "Rendition failed");
                    first_error.get_or_insert(err);
                }
            }
        }
        if let Some(err) = first_error {
            return Err(err);
        }

        if outputs.len() == 1 {
            // Nothing to merge: the single rendition output is the deliverable.
            let single = outputs.remove(0);
            info!(output = %single.display(), "Run complete");
            return Ok(single);
        }

        let merged = self.workspace.path_for(&self.config.merged_output_name);
        self.workspace.overwrite_if_exists(&merged).await?;
        let inputs: Vec<&Path> = outputs.iter().map(PathBuf::as_path).collect();
        self.muxer.merge(&inputs, &merged).await?;

        info!(output = %merged.display(), "Run complete");
        Ok(merged)
    }

    /// Download the compressed manifest, decompress it through the external
    /// tool and parse the structured result.
    async fn retrieve_manifest(&self) -> Result<Manifest, PipelineError> {
        let manifest_name = manifest::basename(&self.config.manifest_url)?;
        let manifest_path = self.workspace.path_for(&manifest_name);
        self.workspace.overwrite_if_exists(&manifest_path).await?;
        self.fetcher
            .fetch_to_file(&self.config.manifest_url, &manifest_path, "manifest fetch")
            .await?;

        let decompressed = manifest_path.with_extension("json");
        self.workspace.overwrite_if_exists(&decompressed).await?;
        self.decompressor.decompress(&manifest_path).await?;

        let text = tokio::fs::read_to_string(&decompressed).await?;
        Manifest::parse(&text, &self.config.base_url)
    }

    #[instrument(skip_all, fields(rendition = %rendition.id))]
    async fn process_rendition(&self, rendition: &Rendition) -> Result<PathBuf, PipelineError> {
        let init_url = rendition.init_url()?;
        let init_path = self.workspace.path_for(&manifest::basename(&init_url)?);
        self.fetcher
            .fetch_to_file(&init_url, &init_path, "init blob fetch")
            .await?;

        let playlist_url = rendition.playlist_url()?;
        let playlist_path = self.workspace.path_for(&manifest::basename(&playlist_url)?);
        self.fetcher
            .fetch_to_file(&playlist_url, &playlist_path, "playlist fetch")
            .await?;
        let playlist_text = tokio::fs::read_to_string(&playlist_path).await?;

        let references = manifest::parse_segment_references(
            &playlist_url,
            &playlist_text,
            &self.config.segment_suffix,
        )?;
        info!(segments = references.len(), "Fetching rendition segments");

        let token = CancellationToken::new();
        let results = self
            .fetcher
            .fetch_rendition(&rendition.id, &references, &self.workspace, &token)
            .await;

        let assembled = assembler::assemble(&rendition.id, init_path, results)?;

        let output = self
            .workspace
            .path_for(&format!("output_{}.mp4", rendition.id));
        self.workspace.overwrite_if_exists(&output).await?;
        self.remuxer.remux(&assembled, &output).await?;
        Ok(output)
    }
}
