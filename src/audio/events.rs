use parking_lot::Mutex;
use std::{collections::BTreeMap, sync::Arc};
use tracing::debug;

use crate::{error::PipelineError, track::Track};

/// Events raised by the player towards its subscribers.
#[derive(Debug, Clone, PartialEq)]
pub enum PlayerEvent {
    /// A track was promoted to now playing and its pipeline spawned.
    TrackStarted(Track),
    /// Playback ran out of tracks and the player went to `Stopped`.
    QueueEmpty,
    /// A pipeline ended because it was skipped, stopped or disconnected.
    ManualStop,
    /// A pipeline ended with a failure.
    PipelineError(PipelineError),
}

/// Handle returned by [`EventBus::subscribe`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SubscriberId(u64);

pub type Handler<E> = Arc<dyn Fn(&E) + Send + Sync>;

struct Subscribers<E> {
    next_id: u64,
    handlers: BTreeMap<SubscriberId, Handler<E>>,
}

/// Synchronous fan-out of events to registered handlers.
///
/// Handlers run on the publishing task, in registration order. The
/// subscriber table is not locked while handlers run, so a handler may
/// subscribe or unsubscribe.
pub struct EventBus<E> {
    inner: Mutex<Subscribers<E>>,
}

impl<E> EventBus<E> {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Subscribers {
                next_id: 0,
                handlers: BTreeMap::new(),
            }),
        }
    }

    pub fn subscribe<F>(&self, handler: F) -> SubscriberId
    where
        F: Fn(&E) + Send + Sync + 'static,
    {
        let mut inner = self.inner.lock();
        let id = SubscriberId(inner.next_id);
        inner.next_id += 1;
        inner.handlers.insert(id, Arc::new(handler));
        debug!("Suscriptor {:?} registrado", id);
        id
    }

    pub fn unsubscribe(&self, id: SubscriberId) -> bool {
        self.inner.lock().handlers.remove(&id).is_some()
    }

    pub fn publish(&self, event: &E) {
        let handlers: Vec<Handler<E>> = self.inner.lock().handlers.values().cloned().collect();
        for handler in handlers {
            handler(event);
        }
    }

    pub fn len(&self) -> usize {
        self.inner.lock().handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<E> Default for EventBus<E> {
    fn default() -> Self {
        Self::new()
    }
}
