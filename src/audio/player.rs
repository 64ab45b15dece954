use parking_lot::Mutex as SyncMutex;
use serde::{Deserialize, Serialize};
use std::{fmt, sync::Arc, time::Duration};
use tokio::{
    sync::{watch, Mutex},
    task::JoinHandle,
};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::{
    events::{EventBus, PlayerEvent, SubscriberId},
    pipeline::{Pipeline, PipelineOutcome},
    queue::{LoopMode, PlaybackQueue},
    sink::FrameSink,
    source::SourceOpener,
    transport::{Destination, VoiceConnection},
};
use crate::{
    error::{PlayerError, PlayerResult},
    track::Track,
};

/// Ciclo de vida del reproductor
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PlayerState {
    /// Sin conexión, nada sonando
    Idle,
    Connecting,
    Playing,
    Paused,
    /// Conectado, sin pipeline activo
    Stopped,
}

impl fmt::Display for PlayerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            PlayerState::Idle => "idle",
            PlayerState::Connecting => "connecting",
            PlayerState::Playing => "playing",
            PlayerState::Paused => "paused",
            PlayerState::Stopped => "stopped",
        };
        f.write_str(name)
    }
}

/// Vista instantánea del reproductor
#[derive(Debug, Clone, Serialize)]
pub struct PlayerStatus {
    pub state: PlayerState,
    pub loop_mode: LoopMode,
    pub radio: bool,
    pub now_playing: Option<Track>,
    pub queue: Vec<Track>,
}

/// Motivo por el que un track deja de sonar
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Retirement {
    Completed,
    Skipped,
    Failed,
}

struct ActivePipeline {
    id: u64,
    cancel: CancellationToken,
    pause: watch::Sender<bool>,
}

impl ActivePipeline {
    fn stop(self) {
        self.cancel.cancel();
    }
}

struct PlayerCore {
    state: PlayerState,
    loop_mode: LoopMode,
    now_playing: Option<Track>,
    active: Option<ActivePipeline>,
    /// Most recently spawned pipeline task; the next one waits for it.
    last_task: Option<JoinHandle<()>>,
    next_id: u64,
}

struct PlayerInner {
    /// Serializes commands and completion handling.
    commands: Mutex<()>,
    core: SyncMutex<PlayerCore>,
    queue: PlaybackQueue,
    connection: Arc<VoiceConnection>,
    opener: Arc<dyn SourceOpener>,
    events: EventBus<PlayerEvent>,
    frame_duration: Duration,
}

/// The playback engine for one voice destination.
///
/// Commands are serialized against each other and against pipeline
/// completion. They only signal the running pipeline and never wait for
/// it to unwind; the next pipeline waits for the previous task to finish
/// before opening its source, so at most one runs at any time.
///
/// Event handlers run synchronously on the task that raised the event and
/// must not block.
#[derive(Clone)]
pub struct Player {
    inner: Arc<PlayerInner>,
}

impl Player {
    pub fn new(
        connection: Arc<VoiceConnection>,
        opener: Arc<dyn SourceOpener>,
        frame_duration: Duration,
    ) -> Self {
        Self {
            inner: Arc::new(PlayerInner {
                commands: Mutex::new(()),
                core: SyncMutex::new(PlayerCore {
                    state: PlayerState::Idle,
                    loop_mode: LoopMode::Off,
                    now_playing: None,
                    active: None,
                    last_task: None,
                    next_id: 0,
                }),
                queue: PlaybackQueue::new(),
                connection,
                opener,
                events: EventBus::new(),
                frame_duration,
            }),
        }
    }

    /// Connects (or moves) to a destination.
    ///
    /// On failure the lifecycle state is left as it was.
    pub async fn connect(&self, destination: &Destination) -> PlayerResult<()> {
        let _guard = self.inner.commands.lock().await;
        self.connect_locked(destination).await
    }

    async fn connect_locked(&self, destination: &Destination) -> PlayerResult<()> {
        if self.inner.connection.is_connected_to(destination) {
            return Ok(());
        }

        let previous = {
            let mut core = self.inner.core.lock();
            std::mem::replace(&mut core.state, PlayerState::Connecting)
        };

        let result = self.inner.connection.connect(destination).await;

        let mut core = self.inner.core.lock();
        core.state = match (&result, previous) {
            (Ok(()), PlayerState::Idle | PlayerState::Connecting) => PlayerState::Stopped,
            _ => previous,
        };
        if let Err(e) = &result {
            error!("❌ No se pudo conectar a {}: {}", destination, e);
        }
        result
    }

    /// Queues a track and starts playback if nothing is running.
    ///
    /// Without a `destination` the player must already be connected.
    pub async fn play(&self, track: Track, destination: Option<&Destination>) -> PlayerResult<()> {
        let _guard = self.inner.commands.lock().await;

        match destination {
            Some(destination) => self.connect_locked(destination).await?,
            None if !self.inner.connection.is_connected() => return Err(PlayerError::NotConnected),
            None => {}
        }

        info!("➕ Agregado a la cola: {}", track);
        self.inner.queue.push(track);

        let mut events = Vec::new();
        {
            let mut core = self.inner.core.lock();
            if core.active.is_none() {
                self.promote_next(&mut core, &mut events);
            }
        }
        self.publish(events);
        Ok(())
    }

    pub async fn pause(&self) -> PlayerResult<()> {
        let _guard = self.inner.commands.lock().await;
        let mut guard = self.inner.core.lock();
        let core = &mut *guard;
        match (core.state, core.active.as_ref()) {
            (PlayerState::Playing, Some(active)) => {
                active.pause.send_replace(true);
                core.state = PlayerState::Paused;
                info!("⏸️ Reproducción pausada");
                Ok(())
            }
            (state, _) => Err(PlayerError::InvalidState {
                command: "pause",
                state,
            }),
        }
    }

    pub async fn resume(&self) -> PlayerResult<()> {
        let _guard = self.inner.commands.lock().await;
        let mut guard = self.inner.core.lock();
        let core = &mut *guard;
        match (core.state, core.active.as_ref()) {
            (PlayerState::Paused, Some(active)) => {
                active.pause.send_replace(false);
                core.state = PlayerState::Playing;
                info!("▶️ Reproducción reanudada");
                Ok(())
            }
            (state, _) => Err(PlayerError::InvalidState {
                command: "resume",
                state,
            }),
        }
    }

    /// Salta a la siguiente canción
    pub async fn skip(&self) -> PlayerResult<()> {
        let _guard = self.inner.commands.lock().await;
        let mut events = Vec::new();
        {
            let mut core = self.inner.core.lock();
            let Some(active) = core.active.take() else {
                return Err(PlayerError::InvalidState {
                    command: "skip",
                    state: core.state,
                });
            };
            active.stop();

            if let Some(track) = core.now_playing.take() {
                info!("⏭️ Saltado: {}", track);
                self.retire(core.loop_mode, track, Retirement::Skipped);
            }
            if !self.promote_next(&mut core, &mut events) {
                self.exhausted(&mut core, &mut events);
            }
        }
        self.publish(events);
        Ok(())
    }

    /// Detiene la reproducción. La cola se conserva.
    pub async fn stop(&self) {
        let _guard = self.inner.commands.lock().await;
        let mut core = self.inner.core.lock();
        if let Some(active) = core.active.take() {
            active.stop();
        }
        core.now_playing = None;
        if core.state != PlayerState::Idle {
            core.state = PlayerState::Stopped;
        }
        info!("⏹️ Reproducción detenida ({} tracks en cola)", self.inner.queue.len());
    }

    /// Detiene la reproducción, limpia la cola y sale del destino
    pub async fn disconnect(&self) {
        let _guard = self.inner.commands.lock().await;
        {
            let mut core = self.inner.core.lock();
            if let Some(active) = core.active.take() {
                active.stop();
            }
            core.now_playing = None;
            core.state = PlayerState::Idle;
        }
        self.inner.queue.clear();
        self.inner.connection.disconnect().await;
    }

    pub fn set_loop(&self, mode: LoopMode) {
        self.inner.core.lock().loop_mode = mode;
        match mode {
            LoopMode::Off => info!("➡️ Loop desactivado"),
            LoopMode::One => info!("🔂 Repitiendo track actual"),
            LoopMode::Queue => info!("🔁 Repitiendo la cola"),
        }
    }

    pub fn state(&self) -> PlayerState {
        self.inner.core.lock().state
    }

    pub fn now_playing(&self) -> Option<Track> {
        self.inner.core.lock().now_playing.clone()
    }

    pub fn queue(&self) -> Vec<Track> {
        self.inner.queue.peek_all()
    }

    pub fn is_connected(&self) -> bool {
        self.inner.connection.is_connected()
    }

    pub fn destination(&self) -> Option<Destination> {
        self.inner.connection.destination()
    }

    pub fn status(&self) -> PlayerStatus {
        let core = self.inner.core.lock();
        PlayerStatus {
            state: core.state,
            loop_mode: core.loop_mode,
            radio: false,
            now_playing: core.now_playing.clone(),
            queue: self.inner.queue.peek_all(),
        }
    }

    pub fn subscribe<F>(&self, handler: F) -> SubscriberId
    where
        F: Fn(&PlayerEvent) + Send + Sync + 'static,
    {
        self.inner.events.subscribe(handler)
    }

    pub fn unsubscribe(&self, id: SubscriberId) -> bool {
        self.inner.events.unsubscribe(id)
    }

    fn publish(&self, events: Vec<PlayerEvent>) {
        for event in &events {
            self.inner.events.publish(event);
        }
    }

    /// Reencola el track retirado según el modo loop
    fn retire(&self, mode: LoopMode, track: Track, why: Retirement) {
        match (why, mode) {
            (Retirement::Completed, LoopMode::One) => self.inner.queue.push_front(track),
            (Retirement::Completed | Retirement::Skipped, LoopMode::Queue) => {
                self.inner.queue.push(track)
            }
            _ => debug!("Retirado {} ({:?}, loop {})", track, why, mode),
        }
    }

    fn exhausted(&self, core: &mut PlayerCore, events: &mut Vec<PlayerEvent>) {
        core.state = PlayerState::Stopped;
        info!("📭 Cola vacía");
        events.push(PlayerEvent::QueueEmpty);
    }

    /// Reproduce la siguiente canción en la cola
    fn promote_next(&self, core: &mut PlayerCore, events: &mut Vec<PlayerEvent>) -> bool {
        let Some(track) = self.inner.queue.pop_next() else {
            return false;
        };

        let id = core.next_id;
        core.next_id += 1;
        let cancel = CancellationToken::new();
        let (pause, paused) = watch::channel(false);
        let previous = core.last_task.take();

        let task = tokio::spawn(self.clone().drive(
            id,
            track.clone(),
            cancel.clone(),
            paused,
            previous,
        ));

        core.last_task = Some(task);
        core.active = Some(ActivePipeline { id, cancel, pause });
        core.now_playing = Some(track.clone());
        core.state = PlayerState::Playing;
        info!("🎵 Reproduciendo: {}", track);
        events.push(PlayerEvent::TrackStarted(track));
        true
    }

    async fn drive(
        self,
        id: u64,
        track: Track,
        cancel: CancellationToken,
        paused: watch::Receiver<bool>,
        previous: Option<JoinHandle<()>>,
    ) {
        if let Some(previous) = previous {
            if let Err(e) = previous.await {
                error!("La tarea del pipeline anterior falló: {}", e);
            }
        }

        let opened = tokio::select! {
            biased;
            _ = cancel.cancelled() => None,
            opened = self.inner.opener.open(&track) => Some(opened),
        };

        let outcome = match opened {
            None => PipelineOutcome::ManualStop,
            Some(Err(e)) => PipelineOutcome::Failed(e),
            Some(Ok(source)) => {
                let sink = FrameSink::new(self.inner.connection.clone(), self.inner.frame_duration);
                Pipeline::new(source, sink, cancel, paused).run().await
            }
        };

        self.finish(id, track, outcome).await;
    }

    /// Handles the end of pipeline `id`.
    async fn finish(&self, id: u64, track: Track, outcome: PipelineOutcome) {
        let _guard = self.inner.commands.lock().await;
        let mut events = Vec::new();
        {
            let mut core = self.inner.core.lock();
            let current = core.active.as_ref().is_some_and(|a| a.id == id);

            match &outcome {
                PipelineOutcome::Finished => debug!("✅ Terminado: {}", track),
                PipelineOutcome::ManualStop => debug!("Pipeline de {} detenido", track),
                PipelineOutcome::Failed(e) => warn!("❌ Falló la reproducción de {}: {}", track, e),
            }

            if !current {
                // skip, stop o disconnect ya retiraron este track
                events.push(match outcome {
                    PipelineOutcome::Failed(e) => PlayerEvent::PipelineError(e),
                    _ => PlayerEvent::ManualStop,
                });
            } else {
                core.active = None;
                core.now_playing = None;
                let why = match outcome {
                    PipelineOutcome::Finished => Retirement::Completed,
                    PipelineOutcome::ManualStop => {
                        events.push(PlayerEvent::ManualStop);
                        Retirement::Skipped
                    }
                    PipelineOutcome::Failed(e) => {
                        events.push(PlayerEvent::PipelineError(e));
                        Retirement::Failed
                    }
                };
                self.retire(core.loop_mode, track, why);

                if !self.inner.connection.is_connected() {
                    warn!("🔌 Enlace de voz perdido, la cola no avanza");
                    core.state = PlayerState::Idle;
                } else if !self.promote_next(&mut core, &mut events) {
                    self.exhausted(&mut core, &mut events);
                }
            }
        }
        self.publish(events);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::testing::*;
    use crate::error::PipelineError;
    use pretty_assertions::assert_eq;

    fn titles(tracks: &[Track]) -> Vec<String> {
        tracks.iter().map(|t| t.title.clone()).collect()
    }

    #[tokio::test(start_paused = true)]
    async fn test_plays_queue_to_exhaustion() {
        let transport = MemoryTransport::new();
        let opener = ScriptedOpener::new(3);
        let player = player(&transport, &opener);
        let mut events = record_events(&player);
        assert_eq!(player.state(), PlayerState::Idle);

        player.play(track("A"), Some(&room())).await.unwrap();
        player.play(track("B"), None).await.unwrap();

        assert_eq!(player.state(), PlayerState::Playing);
        assert_eq!(player.now_playing().map(|t| t.title), Some("A".into()));
        assert_eq!(titles(&player.queue()), vec!["B"]);

        wait_for(&mut events, |e| started(e) == Some("B")).await;
        assert_eq!(player.state(), PlayerState::Playing);
        assert_eq!(player.now_playing().map(|t| t.title), Some("B".into()));

        wait_for(&mut events, |e| *e == PlayerEvent::QueueEmpty).await;
        assert_eq!(player.state(), PlayerState::Stopped);
        assert!(player.now_playing().is_none());
        assert!(player.queue().is_empty());
        assert_eq!(transport.total_frames(), 6);
    }

    #[tokio::test(start_paused = true)]
    async fn test_play_requires_connection() {
        let player = player(&MemoryTransport::new(), &ScriptedOpener::new(3));

        let err = player.play(track("A"), None).await.unwrap_err();

        assert!(matches!(err, PlayerError::NotConnected));
        assert!(player.queue().is_empty());
        assert_eq!(player.state(), PlayerState::Idle);
    }

    #[tokio::test(start_paused = true)]
    async fn test_incoming_tracks_never_jump_the_queue() {
        let opener = ScriptedOpener::new(1_000);
        let player = player(&MemoryTransport::new(), &opener);

        player.play(track("A"), Some(&room())).await.unwrap();
        for name in ["B", "C", "D"] {
            player.play(track(name), None).await.unwrap();
        }

        assert_eq!(player.now_playing().map(|t| t.title), Some("A".into()));
        assert_eq!(titles(&player.queue()), vec!["B", "C", "D"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_loop_one_repeats_until_skipped() {
        let opener = ScriptedOpener::new(2);
        let player = player(&MemoryTransport::new(), &opener);
        let mut events = record_events(&player);
        player.set_loop(LoopMode::One);

        player.play(track("A"), Some(&room())).await.unwrap();
        player.play(track("B"), None).await.unwrap();

        let mut seen = Vec::new();
        while seen.len() < 4 {
            let event = wait_for(&mut events, |e| started(e).is_some()).await;
            seen.push(started(&event).unwrap_or_default().to_string());
        }
        assert_eq!(seen, vec!["A", "A", "A", "A"]);

        player.skip().await.unwrap();
        assert_eq!(player.now_playing().map(|t| t.title), Some("B".into()));
        assert!(player.queue().is_empty());
        player.disconnect().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_loop_off_drops_finished_track() {
        let opener = ScriptedOpener::new(2);
        opener.script("B", Script::Frames(1_000));
        let player = player(&MemoryTransport::new(), &opener);
        let mut events = record_events(&player);

        player.play(track("A"), Some(&room())).await.unwrap();
        player.play(track("B"), None).await.unwrap();
        wait_for(&mut events, |e| started(e) == Some("B")).await;

        assert!(player.queue().is_empty());
        player.disconnect().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_loop_queue_requeues_at_tail() {
        let opener = ScriptedOpener::new(2);
        let player = player(&MemoryTransport::new(), &opener);
        let mut events = record_events(&player);
        player.set_loop(LoopMode::Queue);

        player.play(track("A"), Some(&room())).await.unwrap();
        player.play(track("B"), None).await.unwrap();
        player.play(track("C"), None).await.unwrap();

        let mut seen = Vec::new();
        while seen.len() < 5 {
            let event = wait_for(&mut events, |e| started(e).is_some()).await;
            seen.push(started(&event).unwrap_or_default().to_string());
        }
        assert_eq!(seen, vec!["A", "B", "C", "A", "B"]);
        player.disconnect().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_skip_last_track_raises_one_queue_empty() {
        let opener = ScriptedOpener::new(1_000);
        let player = player(&MemoryTransport::new(), &opener);
        let mut events = record_events(&player);

        player.play(track("A"), Some(&room())).await.unwrap();
        player.skip().await.unwrap();

        assert_eq!(player.state(), PlayerState::Stopped);
        assert!(player.now_playing().is_none());

        let events = drain(&mut events).await;
        let queue_empty = events.iter().filter(|e| **e == PlayerEvent::QueueEmpty).count();
        let manual = events.iter().filter(|e| **e == PlayerEvent::ManualStop).count();
        assert_eq!(queue_empty, 1);
        assert_eq!(manual, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_skip_with_nothing_playing_is_rejected() {
        let player = player(&MemoryTransport::new(), &ScriptedOpener::new(3));
        player.connect(&room()).await.unwrap();

        let err = player.skip().await.unwrap_err();
        assert!(matches!(
            err,
            PlayerError::InvalidState {
                command: "skip",
                state: PlayerState::Stopped
            }
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_pause_and_resume() {
        let transport = MemoryTransport::new();
        let player = player(&transport, &ScriptedOpener::new(1_000));

        assert!(player.pause().await.is_err());
        player.play(track("A"), Some(&room())).await.unwrap();
        tokio::time::sleep(FRAME * 5).await;

        player.pause().await.unwrap();
        assert_eq!(player.state(), PlayerState::Paused);
        assert!(player.pause().await.is_err());

        tokio::time::sleep(FRAME * 2).await;
        let frozen = transport.total_frames();
        tokio::time::sleep(FRAME * 25).await;
        assert_eq!(transport.total_frames(), frozen);
        assert_eq!(player.now_playing().map(|t| t.title), Some("A".into()));
        player.disconnect().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_resume_continues_transmission() {
        let transport = MemoryTransport::new();
        let player = player(&transport, &ScriptedOpener::new(1_000));
        player.play(track("A"), Some(&room())).await.unwrap();

        assert!(player.resume().await.is_err());
        player.pause().await.unwrap();
        tokio::time::sleep(FRAME * 2).await;
        let frozen = transport.total_frames();

        player.resume().await.unwrap();
        assert_eq!(player.state(), PlayerState::Playing);
        tokio::time::sleep(FRAME * 10).await;
        assert!(transport.total_frames() > frozen);
        player.disconnect().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_keeps_queue() {
        let player = player(&MemoryTransport::new(), &ScriptedOpener::new(1_000));
        player.play(track("A"), Some(&room())).await.unwrap();
        player.play(track("B"), None).await.unwrap();

        player.stop().await;

        assert_eq!(player.state(), PlayerState::Stopped);
        assert!(player.now_playing().is_none());
        assert_eq!(titles(&player.queue()), vec!["B"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_disconnect_always_returns_to_idle() {
        let transport = MemoryTransport::new();
        let player = player(&transport, &ScriptedOpener::new(1_000));

        player.disconnect().await;
        assert_eq!(player.state(), PlayerState::Idle);

        player.play(track("A"), Some(&room())).await.unwrap();
        player.play(track("B"), None).await.unwrap();
        player.pause().await.unwrap();
        player.disconnect().await;

        assert_eq!(player.state(), PlayerState::Idle);
        assert!(player.queue().is_empty());
        assert!(player.now_playing().is_none());
        assert!(!player.is_connected());
        assert!(transport.open_links().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_track_is_reported_and_skipped() {
        let opener = ScriptedOpener::new(2);
        opener.script("A", Script::FailOpen);
        let player = player(&MemoryTransport::new(), &opener);
        let mut events = record_events(&player);
        player.set_loop(LoopMode::Queue);

        player.play(track("A"), Some(&room())).await.unwrap();
        player.play(track("B"), None).await.unwrap();

        let failure = wait_for(&mut events, |e| matches!(e, PlayerEvent::PipelineError(_))).await;
        assert_eq!(
            failure,
            PlayerEvent::PipelineError(PipelineError::Source("cannot open A".into()))
        );
        wait_for(&mut events, |e| started(e) == Some("B")).await;
        // los tracks fallidos no se repiten
        assert!(titles(&player.queue()).is_empty());
        wait_for(&mut events, |e| *e == PlayerEvent::QueueEmpty).await;
        assert_eq!(opener.opened(), vec!["A", "B"]);
        player.disconnect().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_at_most_one_pipeline_runs() {
        let opener = ScriptedOpener::new(1_000);
        let player = player(&MemoryTransport::new(), &opener);
        let mut events = record_events(&player);

        player.play(track("T0"), Some(&room())).await.unwrap();
        for i in 1..8 {
            player.play(track(&format!("T{i}")), None).await.unwrap();
        }
        for _ in 0..7 {
            player.skip().await.unwrap();
            tokio::time::sleep(FRAME / 4).await;
        }
        wait_for(&mut events, |e| started(e) == Some("T7")).await;
        tokio::time::sleep(FRAME * 10).await;

        assert_eq!(opener.max_active(), 1);
        assert_eq!(player.now_playing().map(|t| t.title), Some("T7".into()));
        player.disconnect().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_connect_failure_leaves_state_unchanged() {
        let transport = MemoryTransport::new();
        let bad = Destination::new("nowhere");
        transport.fail_connect(&bad);
        let player = player(&transport, &ScriptedOpener::new(3));

        let err = player.connect(&bad).await.unwrap_err();

        assert!(matches!(err, PlayerError::Connection { .. }));
        assert_eq!(player.state(), PlayerState::Idle);
    }

    #[tokio::test(start_paused = true)]
    async fn test_move_keeps_playing_on_new_destination() {
        let transport = MemoryTransport::new();
        let player = player(&transport, &ScriptedOpener::new(1_000));
        let other = Destination::new("room-2");

        player.play(track("A"), Some(&room())).await.unwrap();
        tokio::time::sleep(FRAME * 3).await;
        player.connect(&other).await.unwrap();
        let before = transport.total_frames();
        tokio::time::sleep(FRAME * 5).await;

        assert_eq!(player.state(), PlayerState::Playing);
        assert_eq!(player.destination(), Some(other.clone()));
        assert_eq!(transport.open_links(), vec![other]);
        assert!(transport.total_frames() > before);
        player.disconnect().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_slow_move_keeps_current_track() {
        let transport = MemoryTransport::new();
        let player = player(&transport, &ScriptedOpener::new(1_000));
        let mut events = record_events(&player);
        let other = Destination::new("room-2");

        player.play(track("A"), Some(&room())).await.unwrap();
        tokio::time::sleep(FRAME * 3).await;
        transport.delay_connects(FRAME * 3);
        player.connect(&other).await.unwrap();
        let before = transport.total_frames();
        tokio::time::sleep(FRAME * 5).await;

        let seen = drain(&mut events).await;
        assert!(
            seen.iter().all(|e| matches!(e, PlayerEvent::TrackStarted(_))),
            "{seen:?}"
        );
        assert_eq!(player.state(), PlayerState::Playing);
        assert_eq!(player.now_playing().map(|t| t.title), Some("A".into()));
        assert_eq!(transport.open_links(), vec![other]);
        assert!(transport.total_frames() > before);
        player.disconnect().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_lost_link_returns_to_idle_and_keeps_queue() {
        let transport = MemoryTransport::new();
        let player = player(&transport, &ScriptedOpener::new(1_000));
        let mut events = record_events(&player);

        player.play(track("A"), Some(&room())).await.unwrap();
        player.play(track("B"), None).await.unwrap();
        tokio::time::sleep(FRAME * 3).await;
        player.inner.connection.disconnect().await;

        wait_for(&mut events, |e| matches!(e, PlayerEvent::PipelineError(_))).await;
        assert_eq!(player.state(), PlayerState::Idle);
        assert!(!player.is_connected());
        assert!(player.now_playing().is_none());
        assert_eq!(titles(&player.queue()), vec!["B"]);

        let err = player.play(track("C"), None).await.unwrap_err();
        assert!(matches!(err, PlayerError::NotConnected));
    }
}
