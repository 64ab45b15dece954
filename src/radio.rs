//! # Radio Service
//!
//! Caller-facing surface of the engine. Wraps a [`Player`] with track
//! search, play-count bookkeeping and the autonomous radio mode.
//!
//! While radio is on, every `QueueEmpty` raised by the player is answered
//! with a random track from the song store. Tracks whose stream cannot be
//! resolved are skipped and another one is drawn, up to a configured number
//! of attempts. When the store has nothing to offer, or the voice transport
//! itself fails, radio switches off and the error is handed to the error
//! subscribers.

use chrono::Utc;
use parking_lot::Mutex;
use serde::Serialize;
use std::sync::{Arc, Weak};
use tracing::{debug, error, info, warn};

use crate::{
    audio::{
        events::{EventBus, PlayerEvent, SubscriberId},
        player::{Player, PlayerStatus},
        queue::LoopMode,
        transport::Destination,
    },
    error::{PlayerError, PlayerResult, StorageError},
    sources::Resolver,
    storage::SongStore,
    track::Track,
};

/// Resultado de una solicitud de reproducción
#[derive(Debug, Clone, Serialize)]
pub struct PlayOutcome {
    pub track: Track,
    /// `None` si no se pudo registrar la reproducción
    pub play_count: Option<u32>,
}

struct RadioInner {
    player: Player,
    store: Arc<dyn SongStore>,
    resolver: Arc<dyn Resolver>,
    radio: Mutex<bool>,
    errors: EventBus<PlayerError>,
    max_attempts: usize,
    subscription: Mutex<Option<SubscriberId>>,
}

impl Drop for RadioInner {
    fn drop(&mut self) {
        if let Some(id) = self.subscription.lock().take() {
            self.player.unsubscribe(id);
        }
    }
}

#[derive(Clone)]
pub struct RadioService {
    inner: Arc<RadioInner>,
}

impl RadioService {
    pub fn new(
        player: Player,
        store: Arc<dyn SongStore>,
        resolver: Arc<dyn Resolver>,
        max_attempts: usize,
    ) -> Self {
        let inner = Arc::new(RadioInner {
            player,
            store,
            resolver,
            radio: Mutex::new(false),
            errors: EventBus::new(),
            max_attempts: max_attempts.max(1),
            subscription: Mutex::new(None),
        });

        let weak: Weak<RadioInner> = Arc::downgrade(&inner);
        let id = inner.player.subscribe(move |event| {
            if let Some(inner) = weak.upgrade() {
                RadioService { inner }.on_player_event(event);
            }
        });
        *inner.subscription.lock() = Some(id);

        Self { inner }
    }

    /// Finds `query`, records the request and queues the track.
    ///
    /// Without a `destination` the player must already be connected; this
    /// is checked before anything is searched.
    pub async fn play(
        &self,
        query: &str,
        user_id: Option<&str>,
        destination: Option<&Destination>,
    ) -> PlayerResult<PlayOutcome> {
        let player = &self.inner.player;
        if destination.is_none() && !player.is_connected() {
            return Err(PlayerError::NotConnected);
        }

        let mut track = self.inner.resolver.find_track(query).await?;
        if let Some(destination) = destination {
            player.connect(destination).await?;
        }

        track.last_played = Some(Utc::now());
        let play_count = match self.inner.store.record_playback(&track).await {
            Ok(count) => {
                track.play_count = count;
                Some(count)
            }
            Err(e) => {
                warn!("⚠️ No se pudo registrar la reproducción de {}: {}", track, e);
                None
            }
        };

        if let Some(user_id) = user_id {
            if let Err(e) = self.inner.store.record_user_request(&track, user_id).await {
                warn!("⚠️ No se pudo registrar la solicitud de {} por {}: {}", track, user_id, e);
            }
        }

        player.play(track.clone(), None).await?;
        Ok(PlayOutcome { track, play_count })
    }

    pub async fn pause(&self) -> PlayerResult<()> {
        self.inner.player.pause().await
    }

    pub async fn resume(&self) -> PlayerResult<()> {
        self.inner.player.resume().await
    }

    pub async fn skip(&self) -> PlayerResult<()> {
        self.inner.player.skip().await
    }

    /// Apaga la radio y detiene la reproducción. La cola se conserva.
    pub async fn stop(&self) {
        self.set_radio_flag(false);
        self.inner.player.stop().await;
    }

    /// Apaga la radio y sale del destino
    pub async fn disconnect(&self) {
        self.set_radio_flag(false);
        self.inner.player.disconnect().await;
    }

    pub fn set_loop(&self, mode: LoopMode) {
        self.inner.player.set_loop(mode);
    }

    /// Switches radio mode.
    ///
    /// Enabling while disconnected needs a `destination`. If nothing is
    /// playing, a random track is started right away. On any error radio is
    /// left off.
    pub async fn set_radio(&self, enabled: bool, destination: Option<&Destination>) -> PlayerResult<()> {
        self.set_radio_flag(enabled);
        if !enabled {
            return Ok(());
        }

        let result = self.start_radio(destination).await;
        if result.is_err() {
            self.set_radio_flag(false);
        }
        result
    }

    async fn start_radio(&self, destination: Option<&Destination>) -> PlayerResult<()> {
        let player = &self.inner.player;
        if !player.is_connected() {
            let destination = destination.ok_or(PlayerError::NotConnected)?;
            player.connect(destination).await?;
        }
        if player.now_playing().is_none() {
            self.play_random().await?;
        }
        Ok(())
    }

    pub fn radio_enabled(&self) -> bool {
        *self.inner.radio.lock()
    }

    pub fn status(&self) -> PlayerStatus {
        PlayerStatus {
            radio: self.radio_enabled(),
            ..self.inner.player.status()
        }
    }

    /// Hasta `n` tracks aleatorios de la biblioteca
    pub async fn random(&self, n: usize) -> PlayerResult<Vec<Track>> {
        Ok(self.inner.store.random_tracks(n).await?)
    }

    /// Registers a handler for failures that escape the engine: pipeline
    /// errors and radio giving up. Expected terminations are never sent.
    pub fn subscribe_errors<F>(&self, handler: F) -> SubscriberId
    where
        F: Fn(&PlayerError) + Send + Sync + 'static,
    {
        self.inner.errors.subscribe(handler)
    }

    pub fn unsubscribe_errors(&self, id: SubscriberId) -> bool {
        self.inner.errors.unsubscribe(id)
    }

    pub fn player(&self) -> &Player {
        &self.inner.player
    }

    /// Devuelve si el flag cambió
    fn set_radio_flag(&self, enabled: bool) -> bool {
        let mut radio = self.inner.radio.lock();
        let changed = *radio != enabled;
        *radio = enabled;
        if changed {
            if enabled {
                info!("📻 Radio activada");
            } else {
                info!("📻 Radio desactivada");
            }
        }
        changed
    }

    fn on_player_event(&self, event: &PlayerEvent) {
        match event {
            PlayerEvent::QueueEmpty if self.radio_enabled() => {
                let service = self.clone();
                tokio::spawn(async move { service.refill().await });
            }
            PlayerEvent::PipelineError(e) => {
                if e.is_track_level() {
                    warn!("⚠️ Track fallido: {}", e);
                } else {
                    error!("❌ Error del reproductor: {}", e);
                    self.set_radio_flag(false);
                }
                self.inner.errors.publish(&PlayerError::Pipeline(e.clone()));
            }
            _ => {}
        }
    }

    async fn refill(&self) {
        if !self.radio_enabled() {
            return;
        }
        if self.inner.player.now_playing().is_some() {
            debug!("Recarga de radio omitida, ya hay algo sonando");
            return;
        }

        if let Err(e) = self.play_random().await {
            self.set_radio_flag(false);
            error!("❌ La radio falló: {}", e);
            self.inner.errors.publish(&e);
        }
    }

    /// Sortea tracks hasta que uno se resuelve y lo encola
    async fn play_random(&self) -> PlayerResult<()> {
        let mut failures = 0;
        let track = loop {
            let candidate = self
                .inner
                .store
                .random_tracks(1)
                .await?
                .into_iter()
                .next()
                .ok_or(StorageError::NoCandidates)?;

            if candidate.is_resolved() {
                break candidate;
            }
            match self.inner.resolver.resolve_stream(candidate).await {
                Ok(track) => break track,
                Err(e) => {
                    failures += 1;
                    warn!(
                        "⚠️ Radio omitió un track sin stream ({}/{}): {}",
                        failures, self.inner.max_attempts, e
                    );
                    if failures >= self.inner.max_attempts {
                        return Err(PlayerError::RadioExhausted { attempts: failures });
                    }
                }
            }
        };

        info!("📻 Radio eligió: {}", track);
        self.inner.player.play(track, None).await
    }
}
