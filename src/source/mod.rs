//! Source resolution.
//!
//! Turns the URL a room asked for into something the local engine can play:
//! the URL itself, a same-origin proxy for cross-origin media, a transcoding
//! manifest for containers engines cannot demux, or a pre-resolved adaptive
//! manifest for hosted video pages.

mod subtitles;

pub use subtitles::SubtitleManifest;

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::OnceLock;

use cowatch_core::config::SourceConfig;
use cowatch_core::{Error, Result};
use regex::Regex;
use reqwest::Url;

const HLS_MIME: &str = "application/x-mpegURL";

/// How a requested URL is delivered to the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceKind {
    Direct,
    Proxied,
    Transcoded,
    HostedManifest,
}

impl fmt::Display for SourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Direct => write!(f, "direct"),
            Self::Proxied => write!(f, "proxied"),
            Self::Transcoded => write!(f, "transcoded"),
            Self::HostedManifest => write!(f, "hosted-manifest"),
        }
    }
}

/// A requested source and where the engine should actually load it from.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedSource {
    /// The URL as the room knows it; this is the source identity.
    pub requested: String,
    /// Absolute URL handed to the engine.
    pub url: String,
    pub kind: SourceKind,
    pub mime_hint: Option<String>,
    /// Upstream location of the sidecar subtitle manifest, when one may exist.
    pub subtitle_manifest: Option<Url>,
}

/// Resolves requested URLs and discovers their sidecar subtitles.
pub struct SourceLoader {
    config: SourceConfig,
    base: Url,
    proxy_enabled: AtomicBool,
    client: reqwest::Client,
}

impl SourceLoader {
    pub fn new(config: SourceConfig) -> Result<Self> {
        let base = Url::parse(&config.base_url)
            .map_err(|e| Error::source(&config.base_url, format!("invalid base URL: {e}")))?;

        let client = reqwest::Client::builder()
            .timeout(config.request_timeout())
            .build()
            .unwrap_or_else(|e| {
                tracing::warn!("Failed to build HTTP client: {}", e);
                reqwest::Client::new()
            });

        Ok(Self {
            proxy_enabled: AtomicBool::new(config.proxy_enabled),
            config,
            base,
            client,
        })
    }

    /// Follow the server's proxy switch.
    pub fn set_proxy_enabled(&self, enabled: bool) {
        self.proxy_enabled.store(enabled, Ordering::Relaxed);
    }

    pub fn proxy_enabled(&self) -> bool {
        self.proxy_enabled.load(Ordering::Relaxed)
    }

    /// Resolve `requested` to a playable source. Never touches the network.
    pub fn resolve(&self, requested: &str) -> Result<ResolvedSource> {
        let upstream = self.absolute(requested)?;
        let cross_origin = !self.is_same_origin(&upstream);
        let proxying = self.proxy_enabled() && cross_origin;

        if proxying {
            if let Some(video_id) = hosted_video_id(&upstream) {
                let mut url = self.endpoint(&self.config.hosted_manifest_path)?;
                url.query_pairs_mut().append_pair("v", &video_id);
                return Ok(ResolvedSource {
                    requested: requested.to_string(),
                    url: url.into(),
                    kind: SourceKind::HostedManifest,
                    mime_hint: Some(HLS_MIME.into()),
                    subtitle_manifest: None,
                });
            }
        }

        let extension = extension_of(&upstream);
        let subtitle_manifest = self.subtitle_manifest_for(&upstream);

        let needs_transcode = self.config.transcode_enabled
            && extension.as_deref().is_some_and(|ext| {
                self.config
                    .transcode_extensions
                    .iter()
                    .any(|t| t.eq_ignore_ascii_case(ext))
            });
        if needs_transcode {
            let mut url = self.endpoint(&self.config.transcode_path)?;
            url.query_pairs_mut().append_pair("url", upstream.as_str());
            return Ok(ResolvedSource {
                requested: requested.to_string(),
                url: url.into(),
                kind: SourceKind::Transcoded,
                mime_hint: Some(HLS_MIME.into()),
                subtitle_manifest,
            });
        }

        let (url, kind) = if proxying {
            (self.proxied(&upstream)?, SourceKind::Proxied)
        } else {
            (upstream.clone(), SourceKind::Direct)
        };

        Ok(ResolvedSource {
            requested: requested.to_string(),
            url: url.into(),
            kind,
            mime_hint: extension.as_deref().and_then(mime_for_extension).map(str::to_string),
            subtitle_manifest,
        })
    }

    /// Route an upstream URL the way media from it would be fetched.
    pub fn route(&self, upstream: &Url) -> Result<Url> {
        if self.proxy_enabled() && !self.is_same_origin(upstream) {
            self.proxied(upstream)
        } else {
            Ok(upstream.clone())
        }
    }

    pub(crate) fn client(&self) -> &reqwest::Client {
        &self.client
    }

    fn absolute(&self, requested: &str) -> Result<Url> {
        let trimmed = requested.trim();
        if trimmed.is_empty() {
            return Err(Error::source(requested, "empty source URL"));
        }
        // Absolute inputs replace the base entirely.
        self.base
            .join(trimmed)
            .map_err(|e| Error::source(requested, e.to_string()))
    }

    fn is_same_origin(&self, url: &Url) -> bool {
        url.origin() == self.base.origin()
    }

    fn endpoint(&self, path: &str) -> Result<Url> {
        self.base
            .join(path)
            .map_err(|e| Error::source(path, format!("invalid endpoint: {e}")))
    }

    fn proxied(&self, upstream: &Url) -> Result<Url> {
        let mut url = self.endpoint(&self.config.proxy_path)?;
        url.query_pairs_mut().append_pair("url", upstream.as_str());
        Ok(url)
    }

    /// `dir/movie.mp4` → `dir/movie.subtitles.json`.
    fn subtitle_manifest_for(&self, upstream: &Url) -> Option<Url> {
        let file = upstream.path_segments()?.last()?.to_string();
        if file.is_empty() {
            return None;
        }
        let stem = match file.rfind('.') {
            Some(dot) if dot > 0 => &file[..dot],
            _ => file.as_str(),
        };
        let mut manifest = upstream.clone();
        manifest.set_query(None);
        manifest.set_fragment(None);
        manifest
            .path_segments_mut()
            .ok()?
            .pop()
            .push(&format!("{stem}{}", self.config.subtitle_manifest_suffix));
        Some(manifest)
    }
}

fn extension_of(url: &Url) -> Option<String> {
    let file = url.path_segments()?.last()?;
    let dot = file.rfind('.')?;
    let ext = &file[dot + 1..];
    (!ext.is_empty()).then(|| ext.to_ascii_lowercase())
}

/// MIME hint for a media file extension.
pub fn mime_for_extension(ext: &str) -> Option<&'static str> {
    Some(match ext {
        "m3u8" => HLS_MIME,
        "mpd" => "application/dash+xml",
        "mp4" | "m4v" => "video/mp4",
        "webm" => "video/webm",
        "mkv" => "video/x-matroska",
        "mov" => "video/quicktime",
        "mp3" => "audio/mpeg",
        "m4a" => "audio/mp4",
        "ogg" | "oga" => "audio/ogg",
        "wav" => "audio/wav",
        "flac" => "audio/flac",
        _ => return None,
    })
}

fn video_id_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"^[A-Za-z0-9_-]{11}$").expect("valid video id pattern"))
}

/// Video id of a recognized hosted video page URL.
pub fn hosted_video_id(url: &Url) -> Option<String> {
    let host = url.host_str()?.trim_start_matches("www.");
    let candidate = match host {
        "youtu.be" => url.path_segments()?.next()?.to_string(),
        "youtube.com" | "m.youtube.com" | "music.youtube.com" => {
            let mut segments = url.path_segments()?;
            match segments.next()? {
                "watch" => url
                    .query_pairs()
                    .find(|(k, _)| k == "v")
                    .map(|(_, v)| v.into_owned())?,
                "embed" | "shorts" | "live" => segments.next()?.to_string(),
                _ => return None,
            }
        }
        _ => return None,
    };
    video_id_pattern()
        .is_match(&candidate)
        .then_some(candidate)
}
