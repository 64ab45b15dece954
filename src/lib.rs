//! Voice playback engine with a looping queue and an autonomous radio mode.
//!
//! [`radio::RadioService`] is the entry point for callers; it drives an
//! [`audio::player::Player`] and talks to the [`sources`] and [`storage`]
//! collaborators.

pub mod audio;
pub mod cache;
pub mod config;
pub mod error;
pub mod radio;
pub mod sources;
pub mod storage;
pub mod track;
