//! Sidecar subtitle discovery.

use cowatch_core::{Error, Result, SubtitleTrack};
use reqwest::Url;
use serde::Deserialize;
use tracing::debug;

use super::{ResolvedSource, SourceLoader};

/// Body of a subtitle manifest: either a bare list of tracks or an object
/// with a `tracks` list.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum SubtitleManifest {
    List(Vec<SubtitleTrack>),
    Wrapped { tracks: Vec<SubtitleTrack> },
}

impl SubtitleManifest {
    pub fn into_tracks(self) -> Vec<SubtitleTrack> {
        match self {
            SubtitleManifest::List(tracks) | SubtitleManifest::Wrapped { tracks } => tracks,
        }
    }
}

impl SourceLoader {
    /// Look for sidecar subtitles of `source`.
    ///
    /// A missing or malformed manifest just means there are no subtitles.
    pub async fn discover_subtitles(&self, source: &ResolvedSource) -> Vec<SubtitleTrack> {
        let Some(manifest_url) = source.subtitle_manifest.as_ref() else {
            return Vec::new();
        };

        match self.fetch_subtitles(manifest_url).await {
            Ok(tracks) => {
                debug!(
                    source = %source.requested,
                    count = tracks.len(),
                    "Discovered sidecar subtitles"
                );
                tracks
            }
            Err(e) => {
                debug!(source = %source.requested, error = %e, "No sidecar subtitles");
                Vec::new()
            }
        }
    }

    /// Fetch the manifest at `manifest_url` and return its tracks with
    /// `src` resolved against the manifest and routed for playback.
    pub async fn fetch_subtitles(&self, manifest_url: &Url) -> Result<Vec<SubtitleTrack>> {
        let fetch_url = self.route(manifest_url)?;

        let response = self
            .client()
            .get(fetch_url.clone())
            .send()
            .await
            .map_err(|e| Error::source(fetch_url.as_str(), e.to_string()))?;

        if !response.status().is_success() {
            return Err(Error::source(
                fetch_url.as_str(),
                format!("manifest request failed ({})", response.status()),
            ));
        }

        let manifest: SubtitleManifest = response
            .json()
            .await
            .map_err(|e| Error::source(fetch_url.as_str(), format!("invalid manifest: {e}")))?;

        let mut tracks = Vec::new();
        for mut track in manifest.into_tracks() {
            let upstream = match manifest_url.join(&track.src) {
                Ok(url) => url,
                Err(e) => {
                    debug!(src = %track.src, error = %e, "Skipping subtitle track with bad src");
                    continue;
                }
            };
            track.src = self.route(&upstream)?.into();
            tracks.push(track);
        }
        Ok(tracks)
    }
}
