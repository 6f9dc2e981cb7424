//! Adapters for the external collaborators: the manifest decompressor,
//! the ffmpeg remuxer and the MP4Box muxer.
//!
//! Each adapter only builds the invocation and validates the declared exit
//! status; it never interprets or repairs the tool's internal errors.

use std::path::Path;
use std::process::Output;

use tokio::process::Command;
use tracing::{debug, info};

use crate::assembler::AssembledRendition;
use crate::error::PipelineError;

/// Last stderr lines of a failed tool run, for error reporting.
fn exit_detail(output: &Output) -> String {
    let code = output
        .status
        .code()
        .map_or_else(|| "signal".to_string(), |c| c.to_string());
    let stderr = String::from_utf8_lossy(&output.stderr);
    let tail: Vec<&str> = stderr.lines().rev().take(5).collect();
    let tail: Vec<&str> = tail.into_iter().rev().collect();
    if tail.is_empty() {
        format!("exit code {code}")
    } else {
        format!("exit code {code}: {}", tail.join(" | "))
    }
}

async fn run_tool(program: &str, args: &[String]) -> Result<Output, PipelineError> {
    debug!(program, ?args, "Invoking external tool");
    let output = Command::new(program)
        .args(args)
        .env("LC_ALL", "C")
        .output()
        .await?;
    Ok(output)
}

/// Runs the opaque decompressor that turns a compressed manifest into its
/// structured sibling file.
#[derive(Debug, Clone)]
pub struct ManifestDecompressor {
    command: Vec<String>,
}

impl ManifestDecompressor {
    /// `command` is the program plus leading arguments; the manifest path
    /// is appended as the final argument.
    pub fn new(command: Vec<String>) -> Result<Self, PipelineError> {
        if command.is_empty() {
            return Err(PipelineError::configuration(
                "decompress command must name a program",
            ));
        }
        Ok(Self { command })
    }

    /// Decompress `manifest_path` in place. On any non-success signal the
    /// run aborts without parsing the possibly-absent output.
    pub async fn decompress(&self, manifest_path: &Path) -> Result<(), PipelineError> {
        let mut args: Vec<String> = self.command[1..].to_vec();
        args.push(manifest_path.display().to_string());

        let output = run_tool(&self.command[0], &args).await?;
        if !output.status.success() {
            return Err(PipelineError::ManifestDecompressionFailed {
                detail: exit_detail(&output),
            });
        }
        info!(manifest = %manifest_path.display(), "Manifest decompressed");
        Ok(())
    }
}

/// Invokes ffmpeg to concatenate an assembled rendition into one playable
/// file, copying streams without re-encoding.
#[derive(Debug, Clone)]
pub struct Remuxer {
    ffmpeg_path: String,
}

impl Remuxer {
    pub fn new(ffmpeg_path: impl Into<String>) -> Self {
        Self {
            ffmpeg_path: ffmpeg_path.into(),
        }
    }

    fn build_args(assembled: &AssembledRendition, output: &Path) -> Vec<String> {
        let concat = assembled
            .paths
            .iter()
            .map(|p| p.display().to_string())
            .collect::<Vec<_>>()
            .join("|");
        vec![
            "-y".to_string(),
            "-hide_banner".to_string(),
            "-loglevel".to_string(),
            "error".to_string(),
            "-i".to_string(),
            format!("concat:{concat}"),
            "-c".to_string(),
            "copy".to_string(),
            "-bsf:a".to_string(),
            "aac_adtstoasc".to_string(),
            output.display().to_string(),
        ]
    }

    pub async fn remux(
        &self,
        assembled: &AssembledRendition,
        output: &Path,
    ) -> Result<(), PipelineError> {
        let args = Self::build_args(assembled, output);
        let result = run_tool(&self.ffmpeg_path, &args).await?;
        if !result.status.success() {
            return Err(PipelineError::RemuxFailed {
                rendition: assembled.rendition_id.clone(),
                detail: exit_detail(&result),
            });
        }
        info!(
            rendition = %assembled.rendition_id,
            output = %output.display(),
            inputs = assembled.paths.len(),
            "Rendition remuxed"
        );
        Ok(())
    }
}

/// Invokes MP4Box to merge two or more rendition outputs into one
/// deliverable.
#[derive(Debug, Clone)]
pub struct Muxer {
    mp4box_path: String,
}

impl Muxer {
    pub fn new(mp4box_path: impl Into<String>) -> Self {
        Self {
            mp4box_path: mp4box_path.into(),
        }
    }

    fn build_args(inputs: &[&Path], output: &Path) -> Vec<String> {
        let mut args = Vec::with_capacity(inputs.len() * 2 + 2);
        for input in inputs {
            args.push("-add".to_string());
            args.push(input.display().to_string());
        }
        args.push("-new".to_string());
        args.push(output.display().to_string());
        args
    }

    pub async fn merge(&self, inputs: &[&Path], output: &Path) -> Result<(), PipelineError> {
        if inputs.len() < 2 {
            return Err(PipelineError::MergeFailed {
                detail: format!(
                    "merging requires at least two rendition outputs, got {}",
                    inputs.len()
                ),
            });
        }

        let args = Self::build_args(inputs, output);
        let result = run_tool(&self.mp4box_path, &args).await?;
        if !result.status.success() {
            return Err(PipelineError::MergeFailed {
                detail: exit_detail(&result),
            });
        }
        info!(output = %output.display(), inputs = inputs.len(), "Renditions merged");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn remux_args_concatenate_in_assembled_order() {
        let assembled = AssembledRendition {
            rendition_id: "variant_0".to_string(),
            paths: vec![
                PathBuf::from("init_0.mp4"),
                PathBuf::from("seg_0.m4s"),
                PathBuf::from("seg_1.m4s"),
            ],
        };
        let args = Remuxer::build_args(&assembled, Path::new("output_variant_0.mp4"));

        let concat_pos = args.iter().position(|a| a == "-i").unwrap() + 1;
        assert_eq!(args[concat_pos], "concat:init_0.mp4|seg_0.m4s|seg_1.m4s");
        assert!(args.contains(&"-y".to_string()));
        assert!(args.contains(&"copy".to_string()));
        assert!(args.contains(&"aac_adtstoasc".to_string()));
        assert_eq!(args.last().unwrap(), "output_variant_0.mp4");
    }

    #[test]
    fn mux_args_add_each_input_then_new_output() {
        let a = PathBuf::from("output_0.mp4");
        let b = PathBuf::from("output_5.mp4");
        let args = Muxer::build_args(&[a.as_path(), b.as_path()], Path::new("merged.mp4"));
        assert_eq!(
            args,
            vec!["-add", "output_0.mp4", "-add", "output_5.mp4", "-new", "merged.mp4"]
        );
    }

    #[tokio::test]
    async fn merge_requires_two_inputs() {
        let muxer = Muxer::new("MP4Box");
        let only = PathBuf::from("output_0.mp4");
        let err = muxer
            .merge(&[only.as_path()], Path::new("merged.mp4"))
            .await
            .unwrap_err();
        assert!(matches!(err, PipelineError::MergeFailed { .. }));
    }

    #[test]
    fn decompressor_rejects_empty_command() {
        let err = ManifestDecompressor::new(Vec::new()).unwrap_err();
        assert!(matches!(err, PipelineError::Configuration { .. }));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn decompressor_surfaces_nonzero_exit() {
        let decompressor = ManifestDecompressor::new(vec!["false".to_string()]).unwrap();
        let err = decompressor
            .decompress(Path::new("master.blurl"))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            PipelineError::ManifestDecompressionFailed { .. }
        ));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn decompressor_accepts_success_exit() {
        let decompressor = ManifestDecompressor::new(vec!["true".to_string()]).unwrap();
        decompressor
            .decompress(Path::new("master.blurl"))
            .await
            .unwrap();
    }
}
