// ── Typed event bus ──
//
// One bus per component, one payload enum per bus. Synchronous listeners
// run inline at emit time in registration order; async consumers get a
// broadcast receiver and see events in emission order.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use parking_lot::RwLock;
use tokio::sync::broadcast;
use tokio_stream::wrappers::BroadcastStream;

use crate::connectivity::ProbeOutcome;
use crate::mode::{EnterReason, HookPhase, SwitchOptions};
use crate::model::{ConnectivityVerdict, Mode};

const EVENT_CHANNEL_SIZE: usize = 256;

// ── Payloads ─────────────────────────────────────────────────────

/// Notifications published by the [`ModeController`](crate::ModeController).
#[derive(Debug, Clone, PartialEq)]
pub enum ModeEvent {
    /// A transition passed its guards and is about to run hooks.
    BeforeChange {
        from: Mode,
        to: Mode,
        options: SwitchOptions,
    },
    /// A transition completed.
    Changed {
        from: Mode,
        to: Mode,
        options: SwitchOptions,
    },
    /// A transition was refused by the connectivity guard.
    Blocked { mode: Mode, reason: EnterReason },
    /// A transition proceeds despite the backend being offline.
    Warning { mode: Mode, reason: EnterReason },
    /// The controller left a blocking mode because connectivity was lost.
    ForcedExit {
        from: Mode,
        to: Mode,
        verdict: ConnectivityVerdict,
    },
    /// An enter or exit hook failed; bookkeeping was rolled back.
    TransitionFailed {
        from: Mode,
        to: Mode,
        phase: HookPhase,
        message: String,
    },
}

/// Notifications published by the
/// [`ConnectivityMonitor`](crate::ConnectivityMonitor).
#[derive(Debug, Clone, PartialEq)]
pub enum ConnectivityEvent {
    VerdictChanged {
        previous: ConnectivityVerdict,
        current: ConnectivityVerdict,
    },
    Online,
    Offline,
    CheckStarted {
        profile: String,
    },
    CheckCompleted {
        outcome: ProbeOutcome,
        consecutive_failures: u32,
    },
    ProfileChanged {
        previous: String,
        current: String,
    },
    DelayedStartScheduled {
        delay: Duration,
        profile: Option<String>,
    },
}

// ── Bus ──────────────────────────────────────────────────────────

/// Handle returned by [`EventBus::listen`], used to remove the listener.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

type Listener<E> = Arc<dyn Fn(&E) + Send + Sync>;

/// In-process publish/subscribe channel scoped to one component instance.
pub struct EventBus<E: Clone + Send + 'static> {
    tx: broadcast::Sender<E>,
    listeners: RwLock<Vec<(ListenerId, Listener<E>)>>,
    next_id: AtomicU64,
}

impl<E: Clone + Send + 'static> EventBus<E> {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(EVENT_CHANNEL_SIZE);
        Self {
            tx,
            listeners: RwLock::new(Vec::new()),
            next_id: AtomicU64::new(1),
        }
    }

    /// Publish an event to every listener, then to every subscriber.
    ///
    /// Must not be called while holding component locks: listeners may
    /// call back into the component.
    pub fn emit(&self, event: E) {
        let listeners: Vec<Listener<E>> = self
            .listeners
            .read()
            .iter()
            .map(|(_, l)| Arc::clone(l))
            .collect();
        for listener in listeners {
            listener(&event);
        }
        // No receivers is fine.
        let _ = self.tx.send(event);
    }

    /// Register a synchronous listener.
    pub fn listen(&self, f: impl Fn(&E) + Send + Sync + 'static) -> ListenerId {
        let id = ListenerId(self.next_id.fetch_add(1, Ordering::Relaxed));
        let listener: Listener<E> = Arc::new(f);
        self.listeners.write().push((id, listener));
        id
    }

    /// Remove a listener. Returns `false` if it was not registered.
    pub fn unlisten(&self, id: ListenerId) -> bool {
        let mut listeners = self.listeners.write();
        let before = listeners.len();
        listeners.retain(|(lid, _)| *lid != id);
        listeners.len() != before
    }

    /// Subscribe to events emitted from now on.
    pub fn subscribe(&self) -> broadcast::Receiver<E> {
        self.tx.subscribe()
    }

    /// Subscribe as a `Stream`; lagged receivers yield an error item.
    pub fn stream(&self) -> BroadcastStream<E> {
        BroadcastStream::new(self.tx.subscribe())
    }
}

impl<E: Clone + Send + 'static> Default for EventBus<E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E: Clone + Send + 'static> std::fmt::Debug for EventBus<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventBus")
            .field("listeners", &self.listeners.read().len())
            .field("subscribers", &self.tx.receiver_count())
            .finish()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use parking_lot::Mutex;

    #[test]
    fn listeners_run_in_registration_order() {
        let bus: EventBus<u32> = EventBus::new();
        let seen = Arc::new(Mutex::new(Vec::new()));

        let s1 = Arc::clone(&seen);
        bus.listen(move |e| s1.lock().push(("first", *e)));
        let s2 = Arc::clone(&seen);
        bus.listen(move |e| s2.lock().push(("second", *e)));

        bus.emit(7);
        assert_eq!(*seen.lock(), vec![("first", 7), ("second", 7)]);
    }

    #[test]
    fn unlisten_stops_delivery() {
        let bus: EventBus<u32> = EventBus::new();
        let count = Arc::new(AtomicU64::new(0));
        let c = Arc::clone(&count);
        let id = bus.listen(move |_| {
            c.fetch_add(1, Ordering::SeqCst);
        });

        bus.emit(1);
        assert!(bus.unlisten(id));
        assert!(!bus.unlisten(id));
        bus.emit(2);
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn subscribers_see_emission_order() {
        let bus: EventBus<u32> = EventBus::new();
        let mut rx = bus.subscribe();
        bus.emit(1);
        bus.emit(2);
        assert_eq!(rx.recv().await.unwrap(), 1);
        assert_eq!(rx.recv().await.unwrap(), 2);
    }

    #[tokio::test]
    async fn stream_reports_lag_then_resumes() {
        use tokio_stream::StreamExt;
        use tokio_stream::wrappers::errors::BroadcastStreamRecvError;

        let bus: EventBus<usize> = EventBus::new();
        let mut stream = bus.stream();
        for i in 0..EVENT_CHANNEL_SIZE + 2 {
            bus.emit(i);
        }

        assert_eq!(
            stream.next().await.unwrap(),
            Err(BroadcastStreamRecvError::Lagged(2))
        );
        assert_eq!(stream.next().await.unwrap(), Ok(2));
    }

    #[test]
    fn listener_may_register_another_listener() {
        let bus: Arc<EventBus<u32>> = Arc::new(EventBus::new());
        let inner = Arc::clone(&bus);
        bus.listen(move |_| {
            inner.listen(|_| {});
        });
        bus.emit(1);
        assert_eq!(bus.listeners.read().len(), 2);
    }
}
