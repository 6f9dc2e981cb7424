//! Manifest parsing: the decompressed master envelope and per-rendition
//! media playlists.
//!
//! The master manifest is a JSON envelope listing rendition descriptors.
//! Media playlists are plain text; any line ending in the segment suffix
//! is a segment reference, everything else is ignored.

use serde::Deserialize;
use url::Url;

use crate::error::PipelineError;

/// One quality variant of the stream.
#[derive(Debug, Clone)]
pub struct Rendition {
    /// Stable identifier, e.g. `variant_0`.
    pub id: String,
    /// Base URL for resolving this rendition's relative references.
    pub base_url: Url,
    /// Relative reference to the media playlist.
    pub playlist: String,
    /// Relative reference to the initialization blob.
    pub init_blob: String,
}

impl Rendition {
    pub fn playlist_url(&self) -> Result<Url, PipelineError> {
        join(&self.base_url, &self.playlist)
    }

    pub fn init_url(&self) -> Result<Url, PipelineError> {
        join(&self.base_url, &self.init_blob)
    }
}

/// Parsed master manifest. Immutable once parsed.
#[derive(Debug, Clone)]
pub struct Manifest {
    pub renditions: Vec<Rendition>,
}

#[derive(Debug, Deserialize)]
struct MasterEnvelope {
    playlists: Vec<PlaylistEntry>,
}

#[derive(Debug, Deserialize)]
struct PlaylistEntry {
    id: String,
    playlist: String,
    init: String,
    #[serde(default)]
    base_url: Option<String>,
}

impl Manifest {
    /// Parse the decompressed master manifest.
    ///
    /// Fails with [`PipelineError::ManifestMalformed`] when the JSON is
    /// invalid, the `playlists` envelope is absent, or it lists no
    /// renditions. No partial manifest is ever acted upon.
    pub fn parse(text: &str, default_base: &Url) -> Result<Self, PipelineError> {
        let envelope: MasterEnvelope = serde_json::from_str(text)
            .map_err(|e| PipelineError::manifest_malformed(e.to_string()))?;

        if envelope.playlists.is_empty() {
            return Err(PipelineError::manifest_malformed(
                "playlist envelope lists no renditions",
            ));
        }

        let mut renditions = Vec::with_capacity(envelope.playlists.len());
        for entry in envelope.playlists {
            let base_url = match &entry.base_url {
                Some(base) => Url::parse(base)
                    .map_err(|e| PipelineError::invalid_url(base.clone(), e.to_string()))?,
                None => default_base.clone(),
            };
            renditions.push(Rendition {
                id: entry.id,
                base_url,
                playlist: entry.playlist,
                init_blob: entry.init,
            });
        }

        Ok(Self { renditions })
    }

    /// Renditions matching the requested variant ids, in manifest order.
    /// An empty selection keeps every rendition.
    pub fn select(&self, variants: &[String]) -> Vec<&Rendition> {
        if variants.is_empty() {
            return self.renditions.iter().collect();
        }
        self.renditions
            .iter()
            .filter(|r| variants.iter().any(|v| v == &r.id))
            .collect()
    }
}

/// One segment reference from a media playlist.
///
/// The index is the reference's position in the playlist. It determines
/// playback order and must survive concurrent fetching untouched.
#[derive(Debug, Clone)]
pub struct SegmentReference {
    pub index: usize,
    pub url: Url,
    pub filename: String,
}

/// Parse a media playlist into ordered segment references.
///
/// Lines ending in `suffix` become references, resolved against
/// `playlist_url`. All other lines are ignored. A playlist without the
/// `#EXTM3U` header is malformed.
pub fn parse_segment_references(
    playlist_url: &Url,
    text: &str,
    suffix: &str,
) -> Result<Vec<SegmentReference>, PipelineError> {
    let mut lines = text.lines().map(str::trim).filter(|l| !l.is_empty());
    match lines.next() {
        Some("#EXTM3U") => {}
        _ => {
            return Err(PipelineError::manifest_malformed(format!(
                "media playlist `{playlist_url}` is missing the #EXTM3U header"
            )));
        }
    }

    let mut references = Vec::new();
    for line in lines {
        if !line.ends_with(suffix) {
            continue;
        }
        let url = join(playlist_url, line)?;
        let filename = basename(&url)?;
        references.push(SegmentReference {
            index: references.len(),
            url,
            filename,
        });
    }

    Ok(references)
}

fn join(base: &Url, reference: &str) -> Result<Url, PipelineError> {
    base.join(reference)
        .map_err(|e| PipelineError::invalid_url(reference, e.to_string()))
}

/// Deterministic local filename for a fetched resource: the basename of
/// its URL path. Repeated runs overwrite instead of accumulating.
pub fn basename(url: &Url) -> Result<String, PipelineError> {
    url.path_segments()
        .and_then(|mut segments| segments.next_back())
        .filter(|s| !s.is_empty())
        .map(str::to_owned)
        .ok_or_else(|| PipelineError::invalid_url(url.as_str(), "URL has no filename component"))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base() -> Url {
        Url::parse("https://cdn.example.com/stream/").unwrap()
    }

    const MASTER: &str = r#"{
        "playlists": [
            { "id": "variant_0", "playlist": "variant_0.m3u8", "init": "init_0.mp4" },
            { "id": "variant_5", "playlist": "variant_5.m3u8", "init": "init_5.mp4" }
        ]
    }"#;

    #[test]
    fn parses_master_envelope_in_order() {
        let manifest = Manifest::parse(MASTER, &base()).unwrap();
        assert_eq!(manifest.renditions.len(), 2);
        assert_eq!(manifest.renditions[0].id, "variant_0");
        assert_eq!(manifest.renditions[1].id, "variant_5");
        assert_eq!(
            manifest.renditions[0].playlist_url().unwrap().as_str(),
            "https://cdn.example.com/stream/variant_0.m3u8"
        );
        assert_eq!(
            manifest.renditions[1].init_url().unwrap().as_str(),
            "https://cdn.example.com/stream/init_5.mp4"
        );
    }

    #[test]
    fn missing_envelope_is_malformed() {
        let err = Manifest::parse(r#"{ "streams": [] }"#, &base()).unwrap_err();
        assert!(matches!(err, PipelineError::ManifestMalformed { .. }));
    }

    #[test]
    fn invalid_json_is_malformed() {
        let err = Manifest::parse("not json", &base()).unwrap_err();
        assert!(matches!(err, PipelineError::ManifestMalformed { .. }));
    }

    #[test]
    fn empty_playlist_list_is_malformed() {
        let err = Manifest::parse(r#"{ "playlists": [] }"#, &base()).unwrap_err();
        assert!(matches!(err, PipelineError::ManifestMalformed { .. }));
    }

    #[test]
    fn per_rendition_base_url_overrides_default() {
        let text = r#"{
            "playlists": [
                { "id": "v0", "playlist": "v0.m3u8", "init": "init_v0.mp4",
                  "base_url": "https://other.example.com/alt/" }
            ]
        }"#;
        let manifest = Manifest::parse(text, &base()).unwrap();
        assert_eq!(
            manifest.renditions[0].playlist_url().unwrap().as_str(),
            "https://other.example.com/alt/v0.m3u8"
        );
    }

    #[test]
    fn select_keeps_manifest_order_and_filters() {
        let manifest = Manifest::parse(MASTER, &base()).unwrap();
        let all = manifest.select(&[]);
        assert_eq!(all.len(), 2);

        let some = manifest.select(&["variant_5".to_string()]);
        assert_eq!(some.len(), 1);
        assert_eq!(some[0].id, "variant_5");
    }

    #[test]
    fn playlist_lines_with_suffix_become_indexed_references() {
        let playlist_url = base().join("variant_0.m3u8").unwrap();
        let text = "#EXTM3U\n\
                    #EXT-X-VERSION:7\n\
                    #EXTINF:2.0,\n\
                    seg_0.m4s\n\
                    #EXTINF:2.0,\n\
                    seg_1.m4s\n\
                    #EXTINF:2.0,\n\
                    seg_2.m4s\n\
                    #EXT-X-ENDLIST\n";
        let refs = parse_segment_references(&playlist_url, text, ".m4s").unwrap();
        assert_eq!(refs.len(), 3);
        for (i, reference) in refs.iter().enumerate() {
            assert_eq!(reference.index, i);
            assert_eq!(reference.filename, format!("seg_{i}.m4s"));
            assert_eq!(
                reference.url.as_str(),
                format!("https://cdn.example.com/stream/seg_{i}.m4s")
            );
        }
    }

    #[test]
    fn non_matching_lines_are_ignored() {
        let playlist_url = base().join("variant_0.m3u8").unwrap();
        let text = "#EXTM3U\nseg_0.m4s\nREADME.txt\nseg_1.m4s\n";
        let refs = parse_segment_references(&playlist_url, text, ".m4s").unwrap();
        assert_eq!(refs.len(), 2);
        assert_eq!(refs[1].filename, "seg_1.m4s");
    }

    #[test]
    fn playlist_without_header_is_malformed() {
        let playlist_url = base().join("variant_0.m3u8").unwrap();
        let err = parse_segment_references(&playlist_url, "seg_0.m4s\n", ".m4s").unwrap_err();
        assert!(matches!(err, PipelineError::ManifestMalformed { .. }));
    }

    #[test]
    fn absolute_segment_urls_are_kept() {
        let playlist_url = base().join("variant_0.m3u8").unwrap();
        let text = "#EXTM3U\nhttps://edge.example.com/cdn/seg_9.m4s\n";
        let refs = parse_segment_references(&playlist_url, text, ".m4s").unwrap();
        assert_eq!(
            refs[0].url.as_str(),
            "https://edge.example.com/cdn/seg_9.m4s"
        );
        assert_eq!(refs[0].filename, "seg_9.m4s");
    }
}
