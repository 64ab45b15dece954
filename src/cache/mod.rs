//! # Cache Module
//!
//! Time-bounded caching of resolved stream information.
//!
//! Resolving a stream (probing an HTTP endpoint, stat-ing a file) is slow
//! compared to a map lookup, and the same tracks come back often in radio
//! mode. The resolver keeps the tracks it resolved here, keyed by
//! [`TrackId::key`](crate::track::TrackId::key), and copies the cached stream
//! reference and duration into later requests without overriding fields the
//! request already carries.
//!
//! ## Configuration
//!
//! ```env
//! STREAM_CACHE_SIZE=500          # Maximum number of resolved tracks
//! STREAM_CACHE_TTL_SECS=86400    # Time-to-live in seconds (1 day)
//! ```

pub mod ttl_cache;

pub use ttl_cache::{CacheMetrics, TtlCache};

use crate::track::Track;

/// Resolved tracks keyed by track identity.
pub type StreamCache = TtlCache<String, Track>;
