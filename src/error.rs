//! Error types shared by the playback engine and its collaborators.
//!
//! Expected terminations (a manual stop, an exhausted queue) are not errors
//! and live in [`crate::audio::pipeline::PipelineOutcome`] and
//! [`crate::audio::events::PlayerEvent`] instead.

use thiserror::Error;

use crate::audio::player::PlayerState;

/// Errors returned by player and service commands.
#[derive(Debug, Error)]
pub enum PlayerError {
    #[error("not connected to a voice destination and none was supplied")]
    NotConnected,

    #[error("could not connect to voice destination {destination}: {reason}")]
    Connection { destination: String, reason: String },

    #[error("cannot {command} while {state}")]
    InvalidState {
        command: &'static str,
        state: PlayerState,
    },

    #[error(transparent)]
    Resolve(#[from] ResolveError),

    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error(transparent)]
    Pipeline(#[from] PipelineError),

    #[error("radio gave up after {attempts} unresolvable tracks")]
    RadioExhausted { attempts: usize },
}

/// Failures of the search / metadata collaborator.
#[derive(Debug, Clone, Error)]
pub enum ResolveError {
    #[error("no track found for '{0}'")]
    NotFound(String),

    #[error("could not resolve stream for {track}: {reason}")]
    Resolution { track: String, reason: String },
}

/// Failures of the song store collaborator.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("no candidate tracks in the library")]
    NoCandidates,

    #[error("storage I/O failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("storage data is corrupt: {0}")]
    Serde(#[from] serde_json::Error),
}

/// Terminal failure of a single pipeline run.
///
/// `Source` failures belong to the track (bad URL, truncated file).
/// `Transport` failures mean the voice link itself misbehaved.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PipelineError {
    #[error("audio source failed: {0}")]
    Source(String),

    #[error("voice transport failed: {0}")]
    Transport(String),
}

impl PipelineError {
    pub fn is_track_level(&self) -> bool {
        matches!(self, PipelineError::Source(_))
    }
}

pub type PlayerResult<T> = std::result::Result<T, PlayerError>;
