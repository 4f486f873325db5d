//! Fan-out of observations to registered observers.

use std::pin::Pin;
use std::sync::atomic::{AtomicU64, Ordering};
use std::task::{Context, Poll};

use futures_core::Stream;
use indexmap::IndexMap;
use log::{debug, trace};
use tokio::sync::mpsc;
use tokio::time::Instant;

use super::Observation;

/// Identifies a registered observer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ObserverId(u64);

static NEXT_OBSERVER_ID: AtomicU64 = AtomicU64::new(1);

impl ObserverId {
    fn next() -> Self {
        Self(NEXT_OBSERVER_ID.fetch_add(1, Ordering::Relaxed))
    }
}

/// An observation together with the instant it was emitted.
#[derive(Debug, Clone)]
pub struct Stamped {
    /// When the session emitted the observation.
    pub at: Instant,

    /// The observation itself.
    pub observation: Observation,
}

/// Where the bus delivers to.
#[derive(Debug)]
enum Sink {
    Plain(mpsc::UnboundedSender<Observation>),
    Stamped(mpsc::UnboundedSender<Stamped>),
}

impl Sink {
    /// False once the receiving end is gone.
    fn deliver(&self, at: Instant, observation: &Observation) -> bool {
        match self {
            Sink::Plain(tx) => tx.send(observation.clone()).is_ok(),
            Sink::Stamped(tx) => tx
                .send(Stamped {
                    at,
                    observation: observation.clone(),
                })
                .is_ok(),
        }
    }
}

/// Publisher side: delivers each observation to every registered observer.
///
/// Each observer has its own unbounded queue, so emitting never waits on a
/// slow reader. Observers whose receiving end was dropped are pruned on the
/// next emit.
#[derive(Debug, Default)]
pub struct EventBus {
    observers: IndexMap<ObserverId, Sink>,
    closed: bool,
}

impl EventBus {
    /// Create an empty bus.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an externally created sender.
    ///
    /// Registering on a closed bus drops the sender immediately, ending the
    /// observer's stream.
    pub fn add_observer(&mut self, sender: mpsc::UnboundedSender<Observation>) -> ObserverId {
        self.register(Sink::Plain(sender))
    }

    /// Register a sender that also receives the emission instant of each
    /// observation.
    pub fn add_stamped_observer(&mut self, sender: mpsc::UnboundedSender<Stamped>) -> ObserverId {
        self.register(Sink::Stamped(sender))
    }

    fn register(&mut self, sink: Sink) -> ObserverId {
        let id = ObserverId::next();
        if self.closed {
            debug!("bus: observer {:?} added after close, dropping", id);
            return id;
        }
        debug!("bus: observer {:?} added", id);
        self.observers.insert(id, sink);
        id
    }

    /// Register a new observer and return its receiving end.
    pub fn subscribe(&mut self) -> Observer {
        let (tx, rx) = mpsc::unbounded_channel();
        let id = self.add_observer(tx);
        Observer { id, rx }
    }

    /// Unregister an observer.
    ///
    /// The sender is dropped after it leaves the registry, so the observer
    /// sees everything emitted before this call and nothing after.
    pub fn remove_observer(&mut self, id: ObserverId) -> bool {
        let removed = self.observers.shift_remove(&id);
        if removed.is_some() {
            debug!("bus: observer {:?} removed", id);
        }
        removed.is_some()
    }

    /// Deliver an observation to every observer, in registration order.
    pub fn emit(&mut self, observation: Observation) {
        if self.observers.is_empty() {
            return;
        }
        trace!("bus: {}", observation);
        let at = Instant::now();
        self.observers.retain(|id, sink| {
            let alive = sink.deliver(at, &observation);
            if !alive {
                debug!("bus: observer {:?} went away, pruning", id);
            }
            alive
        });
    }

    /// Number of registered observers.
    pub fn len(&self) -> usize {
        self.observers.len()
    }

    /// Whether no observers are registered.
    pub fn is_empty(&self) -> bool {
        self.observers.is_empty()
    }

    /// Drop every observer and refuse new ones.
    pub fn close(&mut self) {
        if !self.closed {
            debug!("bus: closing with {} observers", self.observers.len());
        }
        self.closed = true;
        self.observers.clear();
    }
}

/// Receiving end of a subscription.
///
/// Yields observations in emission order and ends once the observer is
/// removed or the session closes.
#[derive(Debug)]
pub struct Observer {
    id: ObserverId,
    rx: mpsc::UnboundedReceiver<Observation>,
}

impl Observer {
    /// This observer's registration id.
    pub fn id(&self) -> ObserverId {
        self.id
    }

    /// Wait for the next observation.
    pub async fn recv(&mut self) -> Option<Observation> {
        self.rx.recv().await
    }

    /// Take the next observation if one is already queued.
    pub fn try_recv(&mut self) -> Option<Observation> {
        self.rx.try_recv().ok()
    }

    /// Drain everything currently queued.
    pub fn drain(&mut self) -> Vec<Observation> {
        std::iter::from_fn(|| self.try_recv()).collect()
    }
}

impl Stream for Observer {
    type Item = Observation;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.rx.poll_recv(cx)
    }
}
