use async_trait::async_trait;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::{
    collections::{BTreeMap, HashSet},
    path::{Path, PathBuf},
};
use tokio::{fs, sync::Mutex};
use tracing::{debug, info};

use crate::{
    error::StorageError,
    track::{Track, TrackId},
};

const LIBRARY_FILE: &str = "library.json";

/// Persistent song library collaborator.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait SongStore: Send + Sync {
    /// Upserts `track` without overriding its populated fields and bumps its
    /// play count. Returns the new count.
    async fn record_playback(&self, track: &Track) -> Result<u32, StorageError>;

    /// Counts one request of `track` by `user_id`.
    async fn record_user_request(&self, track: &Track, user_id: &str) -> Result<(), StorageError>;

    /// Up to `n` distinct random tracks from the library.
    async fn random_tracks(&self, n: usize) -> Result<Vec<Track>, StorageError>;
}

/// Estructura del archivo de biblioteca en disco
#[derive(Debug, Default, Clone, Serialize, Deserialize)]
struct Library {
    songs: BTreeMap<String, Track>,
    /// usuario -> clave de pista -> solicitudes
    user_requests: BTreeMap<String, BTreeMap<String, u32>>,
}

/// Song store kept in a single JSON file under the data directory.
///
/// The whole library lives in memory; every write rewrites the file
/// through a temporary file so a crash never leaves it half written.
pub struct JsonSongStore {
    path: PathBuf,
    library: Mutex<Library>,
}

impl JsonSongStore {
    pub async fn open(data_dir: impl AsRef<Path>) -> Result<Self, StorageError> {
        let data_dir = data_dir.as_ref();
        fs::create_dir_all(data_dir).await?;

        let path = data_dir.join(LIBRARY_FILE);
        let library = match fs::read_to_string(&path).await {
            Ok(content) => serde_json::from_str(&content)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Library::default(),
            Err(e) => return Err(e.into()),
        };

        info!(
            "📁 Biblioteca cargada desde {} ({} canciones)",
            path.display(),
            library.songs.len()
        );
        Ok(Self {
            path,
            library: Mutex::new(library),
        })
    }

    pub async fn song(&self, id: &TrackId) -> Option<Track> {
        self.library.lock().await.songs.get(&id.key()).cloned()
    }

    pub async fn user_requests(&self, user_id: &str, id: &TrackId) -> u32 {
        self.library
            .lock()
            .await
            .user_requests
            .get(user_id)
            .and_then(|requests| requests.get(&id.key()))
            .copied()
            .unwrap_or(0)
    }

    pub async fn stats(&self) -> StorageStats {
        let library = self.library.lock().await;
        StorageStats {
            songs: library.songs.len(),
            users: library.user_requests.len(),
            total_plays: library.songs.values().map(|s| u64::from(s.play_count)).sum(),
            path: self.path.clone(),
        }
    }

    async fn save(&self, library: &Library) -> Result<(), StorageError> {
        let content = serde_json::to_string_pretty(library)?;
        let tmp = self.path.with_extension("json.tmp");
        fs::write(&tmp, content).await?;
        fs::rename(&tmp, &self.path).await?;
        Ok(())
    }
}

#[async_trait]
impl SongStore for JsonSongStore {
    async fn record_playback(&self, track: &Track) -> Result<u32, StorageError> {
        let key = track.id().key();
        let mut library = self.library.lock().await;

        let mut merged = track.clone();
        let previous = match library.songs.get(&key) {
            Some(stored) => {
                merged.merge_no_override(stored);
                stored.play_count
            }
            None => 0,
        };
        merged.play_count = previous.saturating_add(1);
        let count = merged.play_count;

        // la copia en memoria solo cambia si el archivo se guardó
        let mut next = library.clone();
        next.songs.insert(key, merged);
        self.save(&next).await?;
        *library = next;
        debug!("Reproducción #{} registrada: {}", count, track);
        Ok(count)
    }

    async fn record_user_request(&self, track: &Track, user_id: &str) -> Result<(), StorageError> {
        let mut library = self.library.lock().await;
        let mut next = library.clone();
        *next
            .user_requests
            .entry(user_id.to_string())
            .or_default()
            .entry(track.id().key())
            .or_default() += 1;
        self.save(&next).await?;
        *library = next;
        Ok(())
    }

    async fn random_tracks(&self, n: usize) -> Result<Vec<Track>, StorageError> {
        let library = self.library.lock().await;
        let songs: Vec<&Track> = library.songs.values().collect();
        if songs.is_empty() {
            return Err(StorageError::NoCandidates);
        }
        Ok(sample(&songs, n))
    }
}

/// Draws up to `n` distinct tracks, giving up after `n * 10` draws.
fn sample(songs: &[&Track], n: usize) -> Vec<Track> {
    let mut rng = rand::thread_rng();
    let mut picked = HashSet::new();
    let mut tracks = Vec::with_capacity(n.min(songs.len()));

    for _ in 0..n.saturating_mul(10) {
        if tracks.len() >= n || picked.len() == songs.len() {
            break;
        }
        let index = rng.gen_range(0..songs.len());
        if picked.insert(index) {
            tracks.push(songs[index].clone());
        }
    }
    tracks
}

/// Estadísticas de la biblioteca
#[derive(Debug)]
pub struct StorageStats {
    pub songs: usize,
    pub users: usize,
    pub total_plays: u64,
    pub path: PathBuf,
}

impl std::fmt::Display for StorageStats {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "📊 Library Stats:\n\
             📁 File: {}\n\
             🎵 Songs: {}\n\
             👤 Users: {}\n\
             ▶️ Total Plays: {}",
            self.path.display(),
            self.songs,
            self.users,
            self.total_plays
        )
    }
}
