//! Track search and stream resolution.
//!
//! A [`Resolver`] turns a user query into a [`Track`] and fills in the
//! playable stream reference. Resolution never replaces fields that are
//! already populated on the incoming track.

pub mod direct;

use async_trait::async_trait;

use crate::{error::ResolveError, track::Track};

pub use direct::DirectResolver;

/// Search / metadata collaborator used by the radio service.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Resolver: Send + Sync {
    /// Finds a single track for `query`, resolved and ready to play.
    async fn find_track(&self, query: &str) -> Result<Track, ResolveError>;

    /// Fills the stream reference and duration of `track`.
    async fn resolve_stream(&self, track: Track) -> Result<Track, ResolveError>;
}
