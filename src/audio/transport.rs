//! Voice transport seam and the connection manager built on top of it.
//!
//! A [`Transport`] knows how to open a [`VoiceLink`] to a destination. The
//! [`VoiceConnection`] keeps at most one link alive and is what the rest of
//! the engine talks to.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::{
    fmt, io,
    net::SocketAddr,
    str::FromStr,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
};
use tokio::{net::UdpSocket, sync::watch};
use tracing::{debug, info, warn};

use crate::error::{PlayerError, PlayerResult};

/// Opaque identifier of a voice destination (channel, room, endpoint...).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Destination(String);

impl Destination {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Destination {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for Destination {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.is_empty() {
            return Err("destination cannot be empty".to_string());
        }
        Ok(Self::new(s))
    }
}

/// A live link able to carry encoded frames.
#[async_trait]
pub trait VoiceLink: Send + Sync {
    async fn send_frame(&self, frame: &[u8]) -> io::Result<()>;

    fn is_open(&self) -> bool;

    async fn close(&self);
}

/// Opens links to voice destinations.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn connect(&self, destination: &Destination) -> io::Result<Arc<dyn VoiceLink>>;
}

#[derive(Clone)]
struct ActiveLink {
    destination: Destination,
    link: Arc<dyn VoiceLink>,
}

/// Current link of a connection.
#[derive(Clone)]
enum LinkSlot {
    Empty,
    /// Old link torn down, new one being opened
    Moving,
    Ready(ActiveLink),
}

/// Owns the single active link of a player.
///
/// While a move is in progress, frame writes wait for the new link
/// instead of failing, so a running pipeline survives the move.
pub struct VoiceConnection {
    transport: Arc<dyn Transport>,
    slot: watch::Sender<LinkSlot>,
}

impl VoiceConnection {
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        let (slot, _) = watch::channel(LinkSlot::Empty);
        Self { transport, slot }
    }

    /// Connects to `destination`, tearing the previous link down first.
    ///
    /// Connecting to the destination that is already connected is a no-op.
    pub async fn connect(&self, destination: &Destination) -> PlayerResult<()> {
        if self.is_connected_to(destination) {
            debug!("Ya conectado a {}", destination);
            return Ok(());
        }

        if let LinkSlot::Ready(previous) = self.slot.send_replace(LinkSlot::Moving) {
            info!("🔌 Saliendo de {} para moverse a {}", previous.destination, destination);
            previous.link.close().await;
        }

        match self.transport.connect(destination).await {
            Ok(link) => {
                self.slot.send_replace(LinkSlot::Ready(ActiveLink {
                    destination: destination.clone(),
                    link,
                }));
                info!("🔊 Conectado a {}", destination);
                Ok(())
            }
            Err(e) => {
                self.slot.send_replace(LinkSlot::Empty);
                Err(PlayerError::Connection {
                    destination: destination.to_string(),
                    reason: e.to_string(),
                })
            }
        }
    }

    pub async fn disconnect(&self) {
        if let LinkSlot::Ready(previous) = self.slot.send_replace(LinkSlot::Empty) {
            previous.link.close().await;
            info!("👋 Desconectado de {}", previous.destination);
        }
    }

    fn active(&self) -> Option<ActiveLink> {
        match &*self.slot.borrow() {
            LinkSlot::Ready(active) => Some(active.clone()),
            _ => None,
        }
    }

    pub fn is_connected(&self) -> bool {
        self.active().is_some_and(|active| active.link.is_open())
    }

    pub fn is_connected_to(&self, destination: &Destination) -> bool {
        self.active()
            .is_some_and(|active| active.destination == *destination && active.link.is_open())
    }

    pub fn destination(&self) -> Option<Destination> {
        self.active().map(|active| active.destination)
    }

    /// Writes one frame through whatever link is current, waiting out a move.
    pub async fn send_frame(&self, frame: &[u8]) -> io::Result<()> {
        let mut slot = self.slot.subscribe();
        loop {
            let link = match &*slot.borrow_and_update() {
                LinkSlot::Ready(active) => Some(active.link.clone()),
                LinkSlot::Moving => None,
                LinkSlot::Empty => {
                    return Err(io::Error::new(
                        io::ErrorKind::NotConnected,
                        "no active voice link",
                    ))
                }
            };

            match link {
                Some(link) => return link.send_frame(frame).await,
                None => {
                    if slot.changed().await.is_err() {
                        return Err(io::Error::new(
                            io::ErrorKind::NotConnected,
                            "voice connection dropped",
                        ));
                    }
                }
            }
        }
    }
}

/// Sends every frame as one UDP datagram to `host:port` destinations.
pub struct UdpTransport {
    bind_addr: SocketAddr,
}

impl UdpTransport {
    pub fn new(bind_addr: SocketAddr) -> Self {
        Self { bind_addr }
    }
}

impl Default for UdpTransport {
    fn default() -> Self {
        Self::new(SocketAddr::from(([0, 0, 0, 0], 0)))
    }
}

#[async_trait]
impl Transport for UdpTransport {
    async fn connect(&self, destination: &Destination) -> io::Result<Arc<dyn VoiceLink>> {
        let target = tokio::net::lookup_host(destination.as_str())
            .await?
            .next()
            .ok_or_else(|| {
                io::Error::new(
                    io::ErrorKind::AddrNotAvailable,
                    format!("{} does not resolve to an address", destination),
                )
            })?;

        let socket = UdpSocket::bind(self.bind_addr).await?;
        socket.connect(target).await?;
        debug!("Enlace UDP {} -> {}", socket.local_addr()?, target);

        Ok(Arc::new(UdpLink {
            socket,
            open: AtomicBool::new(true),
        }))
    }
}

struct UdpLink {
    socket: UdpSocket,
    open: AtomicBool,
}

#[async_trait]
impl VoiceLink for UdpLink {
    async fn send_frame(&self, frame: &[u8]) -> io::Result<()> {
        if !self.open.load(Ordering::Acquire) {
            return Err(io::Error::new(io::ErrorKind::NotConnected, "link closed"));
        }
        let sent = self.socket.send(frame).await?;
        if sent != frame.len() {
            warn!("Escritura UDP parcial: {} de {} bytes", sent, frame.len());
        }
        Ok(())
    }

    fn is_open(&self) -> bool {
        self.open.load(Ordering::Acquire)
    }

    async fn close(&self) {
        self.open.store(false, Ordering::Release);
    }
}
