use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::{collections::VecDeque, fmt, str::FromStr};
use tracing::debug;

use crate::track::Track;

/// Destino de un track que deja de sonar
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LoopMode {
    /// Los tracks retirados se descartan
    #[default]
    Off,
    /// El track retirado vuelve al inicio
    One,
    /// El track retirado vuelve al final
    Queue,
}

impl fmt::Display for LoopMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LoopMode::Off => write!(f, "off"),
            LoopMode::One => write!(f, "one"),
            LoopMode::Queue => write!(f, "queue"),
        }
    }
}

impl FromStr for LoopMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "off" | "none" => Ok(LoopMode::Off),
            "one" | "track" | "song" => Ok(LoopMode::One),
            "queue" | "all" => Ok(LoopMode::Queue),
            other => Err(format!("unknown loop mode '{other}'")),
        }
    }
}

/// FIFO of pending tracks.
///
/// The queue only stores tracks; what to push back when a track retires is
/// decided by the player.
#[derive(Debug, Default)]
pub struct PlaybackQueue {
    items: Mutex<VecDeque<Track>>,
}

impl PlaybackQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Agrega un track al final de la cola
    pub fn push(&self, track: Track) {
        debug!("➕ En cola: {}", track);
        self.items.lock().push_back(track);
    }

    /// Devuelve un track al inicio, delante de todo lo encolado
    pub fn push_front(&self, track: Track) {
        debug!("🔂 Reencolado al inicio: {}", track);
        self.items.lock().push_front(track);
    }

    /// Obtiene el siguiente track (FIFO)
    pub fn pop_next(&self) -> Option<Track> {
        self.items.lock().pop_front()
    }

    /// Copia de los tracks pendientes en orden de reproducción
    pub fn peek_all(&self) -> Vec<Track> {
        self.items.lock().iter().cloned().collect()
    }

    pub fn clear(&self) {
        let mut items = self.items.lock();
        if !items.is_empty() {
            debug!("🗑️ Cola limpiada ({} tracks)", items.len());
        }
        items.clear();
    }

    pub fn len(&self) -> usize {
        self.items.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.lock().is_empty()
    }
}
