use async_trait::async_trait;
use reqwest::StatusCode;
use std::{path::Path, time::Duration};
use tracing::{debug, info, warn};
use url::Url;

use super::Resolver;
use crate::{
    audio::source::StreamLocation,
    cache::StreamCache,
    error::ResolveError,
    track::{Service, Track, TrackId},
};

/// Resolver for plain HTTP(S) streams and local audio files.
///
/// The query itself is the location: there is no catalogue to search.
pub struct DirectResolver {
    client: reqwest::Client,
    cache: StreamCache,
    /// Para estimar la duración de streams crudos según su tamaño
    bytes_per_second: Option<u64>,
}

impl DirectResolver {
    pub fn new(timeout: Duration, cache: StreamCache) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(concat!("open-radio/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self {
            client,
            cache,
            bytes_per_second: None,
        })
    }

    pub fn with_bytes_per_second(mut self, bytes_per_second: u64) -> Self {
        self.bytes_per_second = (bytes_per_second > 0).then_some(bytes_per_second);
        self
    }

    fn estimate_secs(&self, len: u64) -> Option<f64> {
        self.bytes_per_second
            .filter(|_| len > 0)
            .map(|bps| len as f64 / bps as f64)
    }

    /// Builds an unresolved track from a query without probing the stream.
    async fn identify(&self, query: &str) -> Result<Track, ResolveError> {
        let location =
            StreamLocation::parse(query).map_err(|_| ResolveError::NotFound(query.to_string()))?;

        match location {
            StreamLocation::Http(url) => {
                let title = title_from_url(&url);
                Ok(Track::new(
                    TrackId::new(Service::Direct, url.as_str()),
                    title,
                    url.as_str(),
                ))
            }
            StreamLocation::File(path) => {
                let is_file = tokio::fs::metadata(&path)
                    .await
                    .map(|m| m.is_file())
                    .unwrap_or(false);
                if !is_file {
                    return Err(ResolveError::NotFound(query.to_string()));
                }
                let path = tokio::fs::canonicalize(&path).await.unwrap_or(path);
                let location = path.display().to_string();
                Ok(Track::new(
                    TrackId::new(Service::Local, location.as_str()),
                    title_from_path(&path),
                    location,
                ))
            }
        }
    }

    async fn check_http(&self, track: &mut Track) -> Result<(), ResolveError> {
        let failed = |reason: String| ResolveError::Resolution {
            track: track.to_string(),
            reason,
        };

        let response = self
            .client
            .head(&track.url)
            .send()
            .await
            .map_err(|e| failed(e.to_string()))?;

        let status = response.status();
        // Algunos servidores de streams solo responden GET
        if !status.is_success() && status != StatusCode::METHOD_NOT_ALLOWED {
            return Err(failed(format!("HEAD returned {status}")));
        }

        if track.duration_secs <= 0.0 {
            if let Some(secs) = response.content_length().and_then(|len| self.estimate_secs(len)) {
                track.duration_secs = secs;
            }
        }
        let url = track.url.clone();
        track.set_stream_url(url);
        Ok(())
    }

    async fn check_file(&self, track: &mut Track) -> Result<(), ResolveError> {
        let path = match StreamLocation::parse(&track.url) {
            Ok(StreamLocation::File(path)) => path,
            _ => {
                return Err(ResolveError::Resolution {
                    track: track.to_string(),
                    reason: format!("'{}' is not a local path", track.url),
                })
            }
        };

        let metadata = tokio::fs::metadata(&path)
            .await
            .map_err(|e| ResolveError::Resolution {
                track: track.to_string(),
                reason: format!("{}: {e}", path.display()),
            })?;

        if track.duration_secs <= 0.0 {
            if let Some(secs) = self.estimate_secs(metadata.len()) {
                track.duration_secs = secs;
            }
        }
        track.set_stream_url(path.display().to_string());
        Ok(())
    }

    fn remember(&self, track: &Track) {
        let mut cached = track.clone();
        cached.play_count = 0;
        cached.last_played = None;
        self.cache.insert(track.id().key(), cached);
    }
}

#[async_trait]
impl Resolver for DirectResolver {
    async fn find_track(&self, query: &str) -> Result<Track, ResolveError> {
        let query = query.trim();
        if query.is_empty() {
            return Err(ResolveError::NotFound(String::new()));
        }

        let track = self.identify(query).await?;
        info!("🔍 Encontrado: {} ({})", track, track.id());
        self.resolve_stream(track).await
    }

    async fn resolve_stream(&self, mut track: Track) -> Result<Track, ResolveError> {
        if let Some(cached) = self.cache.get(&track.id().key()) {
            debug!("Stream en cache para {}", track.id());
            track.merge_no_override(&cached);
            if track.is_resolved() {
                return Ok(track);
            }
        }

        let checked = match track.id().service {
            Service::Direct => self.check_http(&mut track).await,
            Service::Local => self.check_file(&mut track).await,
        };
        if let Err(e) = checked {
            warn!("⚠️ {}", e);
            return Err(e);
        }

        self.remember(&track);
        debug!("Resuelto {} -> {}", track.id(), track.stream_url());
        Ok(track)
    }
}

fn title_from_path(path: &Path) -> String {
    path.file_stem()
        .map(|stem| stem.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

fn title_from_url(url: &Url) -> String {
    url.path_segments()
        .and_then(|segments| segments.filter(|s| !s.is_empty()).last())
        .map(|segment| title_from_path(Path::new(segment)))
        .or_else(|| url.host_str().map(str::to_string))
        .unwrap_or_else(|| url.to_string())
}
