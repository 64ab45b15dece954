//! # Audio Module
//!
//! Real-time playback engine: queue, state machine and the per-track frame
//! pipeline.
//!
//! ## Architecture
//!
//! ### [`player`] - Player State Machine
//! - Owns the queue, the now-playing slot and the running pipeline
//! - Serializes commands against pipeline completion
//! - Raises [`events::PlayerEvent`]s to subscribers
//!
//! ### [`queue`] - Playback Queue
//! - FIFO of pending tracks
//! - Loop modes applied to retiring tracks
//!
//! ### [`pipeline`] - Frame Pipeline
//! - [`source`] turns a stream reference into fixed-size frames
//! - [`sink`] writes them to the [`transport`] at real-time cadence
//! - Cancellation observed at every frame boundary
//!
//! ## Audio Format
//!
//! Frames are opaque byte blocks of `FRAME_SIZE` bytes sent every
//! `FRAME_DURATION_MS`. The defaults (3840 bytes every 20ms) match 48kHz
//! stereo 16-bit PCM.
//!
//! ## Example Usage
//!
//! ```rust,no_run
//! use open_radio::audio::{
//!     player::Player,
//!     source::StreamOpener,
//!     transport::{Destination, UdpTransport, VoiceConnection},
//! };
//! use open_radio::track::{Service, Track, TrackId};
//! use std::{sync::Arc, time::Duration};
//!
//! # async fn example() -> anyhow::Result<()> {
//! let connection = Arc::new(VoiceConnection::new(Arc::new(UdpTransport::default())));
//! let opener = Arc::new(StreamOpener::new(3840, 16384, Duration::from_secs(30))?);
//! let player = Player::new(connection, opener, Duration::from_millis(20));
//!
//! let track = Track::new(TrackId::new(Service::Local, "intro"), "Intro", "/music/intro.pcm")
//!     .with_stream_url("/music/intro.pcm");
//! player.play(track, Some(&Destination::new("127.0.0.1:5004"))).await?;
//!
//! player.pause().await?;
//! player.resume().await?;
//! player.skip().await?;
//! # Ok(())
//! # }
//! ```

pub mod events;
pub mod pipeline;
pub mod player;
pub mod queue;
pub mod sink;
pub mod source;
pub mod transport;

#[cfg(test)]
pub(crate) mod testing;
