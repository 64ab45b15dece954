//! In-memory doubles for engine tests.

use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::Mutex;
use std::{
    collections::{HashMap, HashSet},
    io,
    sync::{
        atomic::{AtomicBool, AtomicUsize, Ordering},
        Arc,
    },
    time::Duration,
};
use tokio::sync::mpsc;

use super::{
    events::PlayerEvent,
    player::Player,
    source::{FrameSource, SourceOpener},
    transport::{Destination, Transport, VoiceConnection, VoiceLink},
};
use crate::{
    error::PipelineError,
    track::{Service, Track, TrackId},
};

pub const FRAME: Duration = Duration::from_millis(20);

#[derive(Default)]
struct Links {
    connects: Vec<Destination>,
    links: Vec<Arc<MemoryLink>>,
    failing: HashSet<Destination>,
    connect_delay: Duration,
}

/// Transport that records frames instead of sending them.
#[derive(Default)]
pub struct MemoryTransport {
    state: Mutex<Links>,
    frames: Arc<AtomicUsize>,
    fail_writes: Arc<AtomicBool>,
}

impl MemoryTransport {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn fail_connect(&self, destination: &Destination) {
        self.state.lock().failing.insert(destination.clone());
    }

    /// Makes every later `connect` take `delay` before answering.
    pub fn delay_connects(&self, delay: Duration) {
        self.state.lock().connect_delay = delay;
    }

    pub fn fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    pub fn connects(&self) -> Vec<Destination> {
        self.state.lock().connects.clone()
    }

    pub fn open_links(&self) -> Vec<Destination> {
        self.state
            .lock()
            .links
            .iter()
            .filter(|l| l.open.load(Ordering::SeqCst))
            .map(|l| l.destination.clone())
            .collect()
    }

    pub fn total_frames(&self) -> usize {
        self.frames.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Transport for MemoryTransport {
    async fn connect(&self, destination: &Destination) -> io::Result<Arc<dyn VoiceLink>> {
        let delay = self.state.lock().connect_delay;
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }

        let mut state = self.state.lock();
        if state.failing.contains(destination) {
            return Err(io::Error::new(io::ErrorKind::ConnectionRefused, "refused"));
        }
        state.connects.push(destination.clone());
        let link = Arc::new(MemoryLink {
            destination: destination.clone(),
            open: AtomicBool::new(true),
            frames: self.frames.clone(),
            fail_writes: self.fail_writes.clone(),
        });
        state.links.push(link.clone());
        Ok(link as Arc<dyn VoiceLink>)
    }
}

pub struct MemoryLink {
    destination: Destination,
    open: AtomicBool,
    frames: Arc<AtomicUsize>,
    fail_writes: Arc<AtomicBool>,
}

#[async_trait]
impl VoiceLink for MemoryLink {
    async fn send_frame(&self, _frame: &[u8]) -> io::Result<()> {
        if !self.open.load(Ordering::SeqCst) {
            return Err(io::Error::new(io::ErrorKind::NotConnected, "closed"));
        }
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(io::Error::new(io::ErrorKind::BrokenPipe, "write failed"));
        }
        self.frames.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn is_open(&self) -> bool {
        self.open.load(Ordering::SeqCst)
    }

    async fn close(&self) {
        self.open.store(false, Ordering::SeqCst);
    }
}

/// What a scripted track does when played.
#[derive(Debug, Clone, Copy)]
pub enum Script {
    Frames(usize),
    FailAfter(usize),
    FailOpen,
}

#[derive(Default)]
struct Gauge {
    active: AtomicUsize,
    max_active: AtomicUsize,
}

struct ActiveGuard(Arc<Gauge>);

impl ActiveGuard {
    fn enter(gauge: Arc<Gauge>) -> Self {
        let now = gauge.active.fetch_add(1, Ordering::SeqCst) + 1;
        gauge.max_active.fetch_max(now, Ordering::SeqCst);
        Self(gauge)
    }
}

impl Drop for ActiveGuard {
    fn drop(&mut self) {
        self.0.active.fetch_sub(1, Ordering::SeqCst);
    }
}

pub struct ScriptedSource {
    emitted: usize,
    script: Script,
    _guard: Option<ActiveGuard>,
}

impl ScriptedSource {
    pub fn detached(script: Script) -> Self {
        Self {
            emitted: 0,
            script,
            _guard: None,
        }
    }
}

#[async_trait]
impl FrameSource for ScriptedSource {
    async fn next_frame(&mut self) -> io::Result<Option<Bytes>> {
        match self.script {
            Script::FailAfter(n) if self.emitted >= n => {
                Err(io::Error::new(io::ErrorKind::UnexpectedEof, "truncated stream"))
            }
            Script::Frames(n) if self.emitted >= n => Ok(None),
            _ => {
                self.emitted += 1;
                Ok(Some(Bytes::from_static(&[0u8; 16])))
            }
        }
    }
}

/// Opener that plays scripted tracks keyed by title and measures how many
/// sources are alive at once.
pub struct ScriptedOpener {
    default_frames: usize,
    scripts: Mutex<HashMap<String, Script>>,
    opened: Mutex<Vec<String>>,
    gauge: Arc<Gauge>,
}

impl ScriptedOpener {
    pub fn new(default_frames: usize) -> Arc<Self> {
        Arc::new(Self {
            default_frames,
            scripts: Mutex::new(HashMap::new()),
            opened: Mutex::new(Vec::new()),
            gauge: Arc::new(Gauge::default()),
        })
    }

    pub fn script(&self, title: &str, script: Script) {
        self.scripts.lock().insert(title.to_string(), script);
    }

    pub fn opened(&self) -> Vec<String> {
        self.opened.lock().clone()
    }

    pub fn max_active(&self) -> usize {
        self.gauge.max_active.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SourceOpener for ScriptedOpener {
    async fn open(&self, track: &Track) -> Result<Box<dyn FrameSource>, PipelineError> {
        self.opened.lock().push(track.title.clone());
        let script = self
            .scripts
            .lock()
            .get(&track.title)
            .copied()
            .unwrap_or(Script::Frames(self.default_frames));

        if let Script::FailOpen = script {
            return Err(PipelineError::Source(format!("cannot open {}", track.title)));
        }
        Ok(Box::new(ScriptedSource {
            emitted: 0,
            script,
            _guard: Some(ActiveGuard::enter(self.gauge.clone())),
        }))
    }
}

pub fn track(name: &str) -> Track {
    Track::new(TrackId::new(Service::Local, name), name, format!("mem://{name}"))
        .with_stream_url(format!("mem://{name}"))
}

pub fn room() -> Destination {
    Destination::new("room-1")
}

pub fn player(transport: &Arc<MemoryTransport>, opener: &Arc<ScriptedOpener>) -> Player {
    Player::new(
        Arc::new(VoiceConnection::new(transport.clone())),
        opener.clone(),
        FRAME,
    )
}

pub fn record_events(player: &Player) -> mpsc::UnboundedReceiver<PlayerEvent> {
    let (tx, rx) = mpsc::unbounded_channel();
    player.subscribe(move |event| {
        let _ = tx.send(event.clone());
    });
    rx
}

/// Waits (in virtual time) for the next event matching `pred`.
pub async fn wait_for<T, F>(rx: &mut mpsc::UnboundedReceiver<T>, mut pred: F) -> T
where
    F: FnMut(&T) -> bool,
{
    tokio::time::timeout(Duration::from_secs(60), async {
        loop {
            match rx.recv().await {
                Some(event) if pred(&event) => return event,
                Some(_) => continue,
                None => panic!("event channel closed"),
            }
        }
    })
    .await
    .expect("timed out waiting for event")
}

/// Lets pending work settle, then returns everything received.
pub async fn drain<T>(rx: &mut mpsc::UnboundedReceiver<T>) -> Vec<T> {
    tokio::time::sleep(FRAME * 10).await;
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    events
}

pub fn started(event: &PlayerEvent) -> Option<&str> {
    match event {
        PlayerEvent::TrackStarted(track) => Some(track.title.as_str()),
        _ => None,
    }
}
