use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// Servicio donde se encontró el track
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Service {
    /// Stream HTTP(S) directo
    Direct,
    /// Archivo en disco local
    Local,
}

impl fmt::Display for Service {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Service::Direct => write!(f, "direct"),
            Service::Local => write!(f, "local"),
        }
    }
}

/// Stable identity of a track: the service plus the service-specific id.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TrackId {
    pub service: Service,
    pub id: String,
}

impl TrackId {
    pub fn new(service: Service, id: impl Into<String>) -> Self {
        Self {
            service,
            id: id.into(),
        }
    }

    /// Key used by caches and the song store.
    pub fn key(&self) -> String {
        format!("{}:{}", self.service, self.id)
    }
}

impl fmt::Display for TrackId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.service, self.id)
    }
}

/// A playable item.
///
/// The identity is fixed at construction. The stream reference can be
/// filled in later by a resolver but is never replaced once set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Track {
    id: TrackId,
    pub title: String,
    pub artist: String,
    /// Página pública o ubicación de origen
    pub url: String,
    stream_url: String,
    pub duration_secs: f64,
    pub artwork_url: String,
    pub thumbnail_url: String,
    pub play_count: u32,
    pub last_played: Option<DateTime<Utc>>,
}

impl Track {
    pub fn new(id: TrackId, title: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            id,
            title: title.into(),
            artist: String::new(),
            url: url.into(),
            stream_url: String::new(),
            duration_secs: 0.0,
            artwork_url: String::new(),
            thumbnail_url: String::new(),
            play_count: 0,
            last_played: None,
        }
    }

    pub fn id(&self) -> &TrackId {
        &self.id
    }

    pub fn stream_url(&self) -> &str {
        &self.stream_url
    }

    pub fn is_resolved(&self) -> bool {
        !self.stream_url.is_empty()
    }

    pub fn duration(&self) -> Option<Duration> {
        (self.duration_secs > 0.0).then(|| Duration::from_secs_f64(self.duration_secs))
    }

    pub fn with_artist(mut self, artist: impl Into<String>) -> Self {
        self.artist = artist.into();
        self
    }

    pub fn with_stream_url(mut self, stream_url: impl Into<String>) -> Self {
        self.set_stream_url(stream_url);
        self
    }

    pub fn with_duration_secs(mut self, secs: f64) -> Self {
        self.duration_secs = secs;
        self
    }

    /// Fills the stream reference if it is still empty.
    ///
    /// Returns `false` when a reference was already present and was kept.
    pub fn set_stream_url(&mut self, stream_url: impl Into<String>) -> bool {
        if self.stream_url.is_empty() {
            self.stream_url = stream_url.into();
            true
        } else {
            false
        }
    }

    /// Copies every field that is empty on `self` from `other`.
    ///
    /// Identity is never touched. Play count and last-played follow the
    /// same rule: a zero or missing value is taken from `other`.
    pub fn merge_no_override(&mut self, other: &Track) {
        fn fill(dst: &mut String, src: &str) {
            if dst.is_empty() {
                dst.push_str(src);
            }
        }

        fill(&mut self.title, &other.title);
        fill(&mut self.artist, &other.artist);
        fill(&mut self.url, &other.url);
        fill(&mut self.stream_url, &other.stream_url);
        fill(&mut self.artwork_url, &other.artwork_url);
        fill(&mut self.thumbnail_url, &other.thumbnail_url);
        if self.duration_secs <= 0.0 {
            self.duration_secs = other.duration_secs;
        }
        if self.play_count == 0 {
            self.play_count = other.play_count;
        }
        if self.last_played.is_none() {
            self.last_played = other.last_played;
        }
    }

    /// Human readable length, e.g. `3m 25s`.
    pub fn display_duration(&self) -> String {
        match self.duration() {
            Some(d) => humantime::format_duration(Duration::from_secs(d.as_secs())).to_string(),
            None => "live".to_string(),
        }
    }
}

impl fmt::Display for Track {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.artist.is_empty() {
            write!(f, "{}", self.title)
        } else {
            write!(f, "{} - {}", self.artist, self.title)
        }
    }
}
