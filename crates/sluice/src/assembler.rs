//! Orders fetched segments into the path list the external remux tool
//! consumes.
//!
//! The assembler performs no I/O and never touches media bytes. It only
//! establishes completeness and order: init blob first, then segments
//! strictly ascending by manifest index.

use std::path::PathBuf;

use crate::error::PipelineError;
use crate::fetcher::{FetchOutcome, FetchResult};

/// Ordered path list for one rendition, ready for remuxing.
/// Length is always `1 + segment count`: the init blob plus every segment.
#[derive(Debug, Clone)]
pub struct AssembledRendition {
    pub rendition_id: String,
    pub paths: Vec<PathBuf>,
}

/// Assemble the complete fetch result set of one rendition.
///
/// Fails with `IncompleteRendition` if any result is a failure or the
/// index sequence has a hole: a truncated stream would remux into a
/// superficially valid but corrupt file, which is worse than no output.
/// Fails with `DuplicateSegmentIndex` on index collisions, which can
/// only come from a parsing defect and must never be silently
/// deduplicated.
pub fn assemble(
    rendition_id: &str,
    init_path: PathBuf,
    results: Vec<FetchResult>,
) -> Result<AssembledRendition, PipelineError> {
    let mut missing: Vec<usize> = results
        .iter()
        .filter(|r| !r.is_fetched())
        .map(|r| r.index)
        .collect();
    if !missing.is_empty() {
        missing.sort_unstable();
        return Err(PipelineError::IncompleteRendition {
            rendition: rendition_id.to_string(),
            missing,
        });
    }

    let mut ordered: Vec<(usize, PathBuf)> = results
        .into_iter()
        .map(|r| match r.outcome {
            FetchOutcome::Fetched { path, .. } => (r.index, path),
            // Unreachable: failures were rejected above.
            FetchOutcome::Failed(_) => (r.index, PathBuf::new()),
        })
        .collect();
    ordered.sort_unstable_by_key(|(index, _)| *index);

    for window in ordered.windows(2) {
        if window[0].0 == window[1].0 {
            return Err(PipelineError::DuplicateSegmentIndex {
                rendition: rendition_id.to_string(),
                index: window[0].0,
            });
        }
    }

    // Indices start at 0 and must be contiguous; a hole means a segment
    // was never accounted for.
    let mut gaps = Vec::new();
    let mut expected = 0usize;
    for (index, _) in &ordered {
        gaps.extend(expected..*index);
        expected = index + 1;
    }
    if !gaps.is_empty() {
        return Err(PipelineError::IncompleteRendition {
            rendition: rendition_id.to_string(),
            missing: gaps,
        });
    }

    let mut paths = Vec::with_capacity(ordered.len() + 1);
    paths.push(init_path);
    paths.extend(ordered.into_iter().map(|(_, path)| path));

    Ok(AssembledRendition {
        rendition_id: rendition_id.to_string(),
        paths,
    })
}
