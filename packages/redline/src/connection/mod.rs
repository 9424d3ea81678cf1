//! Connection Manager
//!
//! Owns at most one transport connection per session and fans validated,
//! typed events out to subscribers.
//!
//! ## Lifecycle
//!
//! ```text
//! disconnected --connect--> connecting --open--> connected
//!      ^                        |                    |
//!      |                      fail                 close
//!      |                        v                    v
//!      +---- timer fires ---- disconnected (reconnect scheduled)
//!                               |
//!                        budget exhausted
//!                               v
//!                           abandoned
//! ```
//!
//! Reconnects use exponential backoff. The pending timer task's handle is the
//! single-flight guard: while it is live, further reconnect requests are
//! ignored. Only `disconnect` cancels it.

mod backoff;
mod registry;
#[cfg(test)]
pub(crate) mod testing;
mod transport;

pub use backoff::Backoff;
pub use registry::{Handler, HandlerId, Subscription};
pub use transport::{
    Connector, FrameSink, FrameStream, Transport, TransportError, TransportTarget, WsConnector,
};

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use futures::{SinkExt, StreamExt};
use serde::Serialize;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::credentials::CredentialProvider;
use crate::protocol::{ClientMessage, EventKind, ParseError, ServerEvent};
use registry::EventRegistry;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
    /// The reconnect budget ran out. Only an explicit `connect` leaves this state.
    Abandoned { attempts: u32 },
}

impl ConnectionState {
    pub fn is_connected(&self) -> bool {
        matches!(self, ConnectionState::Connected)
    }

    /// True while a connection is open or being opened.
    pub fn is_active(&self) -> bool {
        matches!(self, ConnectionState::Connecting | ConnectionState::Connected)
    }
}

/// Runtime connection settings.
#[derive(Debug, Clone)]
pub struct ConnectionConfig {
    /// Base URL; the document id is appended as the final path segment.
    pub endpoint: String,
    pub backoff: Backoff,
}

pub(crate) struct Shared {
    connector: Arc<dyn Connector>,
    credentials: Arc<dyn CredentialProvider>,
    config: ConnectionConfig,
    registry: EventRegistry,
    state: watch::Sender<ConnectionState>,
    inner: Mutex<Inner>,
}

#[derive(Default)]
struct Inner {
    document_id: Option<String>,
    should_reconnect: bool,
    attempts: u32,
    /// Bumped for every new connection and on disconnect; stale tasks compare
    /// against it before touching state.
    generation: u64,
    reconnect: Option<JoinHandle<()>>,
    cancel: Option<CancellationToken>,
    outbound: Option<mpsc::UnboundedSender<String>>,
}

/// Cheap-to-clone handle to one session's connection.
#[derive(Clone)]
pub struct ConnectionManager {
    shared: Arc<Shared>,
}

impl ConnectionManager {
    pub fn new(
        connector: impl Connector,
        credentials: impl CredentialProvider,
        config: ConnectionConfig,
    ) -> Self {
        Self {
            shared: Arc::new(Shared {
                connector: Arc::new(connector),
                credentials: Arc::new(credentials),
                config,
                registry: EventRegistry::default(),
                state: watch::Sender::new(ConnectionState::Disconnected),
                inner: Mutex::new(Inner::default()),
            }),
        }
    }

    pub fn state(&self) -> ConnectionState {
        *self.shared.state.borrow()
    }

    pub fn watch_state(&self) -> watch::Receiver<ConnectionState> {
        self.shared.state.subscribe()
    }

    pub fn document_id(&self) -> Option<String> {
        self.shared.lock().document_id.clone()
    }

    pub fn reconnect_attempts(&self) -> u32 {
        self.shared.lock().attempts
    }

    /// Open a connection for `document_id`.
    ///
    /// No-op while connecting or connected. Without a credential nothing is
    /// opened and no retry is scheduled. A pending reconnect timer is left
    /// running; it does nothing if it fires while this connection is active.
    /// Must be called inside a tokio runtime.
    pub fn connect(&self, document_id: &str) {
        let mut inner = self.shared.lock();
        let state = self.state();
        match state {
            ConnectionState::Connecting | ConnectionState::Connected => {
                debug!(document_id, ?state, "connect ignored; connection already in flight");
                return;
            }
            ConnectionState::Abandoned { .. } => inner.attempts = 0,
            ConnectionState::Disconnected => {}
        }
        inner.should_reconnect = true;
        inner.document_id = Some(document_id.to_string());
        self.shared.open(&mut inner);
    }

    /// Tear down the connection and stop reconnecting. Idempotent.
    pub fn disconnect(&self) {
        let mut inner = self.shared.lock();
        inner.should_reconnect = false;
        if let Some(timer) = inner.reconnect.take() {
            timer.abort();
        }
        if let Some(cancel) = inner.cancel.take() {
            cancel.cancel();
        }
        inner.outbound = None;
        inner.attempts = 0;
        inner.generation += 1;
        if let Some(document_id) = inner.document_id.take() {
            info!(document_id = %document_id, "disconnected");
        }
        self.shared.set_state(ConnectionState::Disconnected);
    }

    /// Send one message. Returns false (after logging) if not connected.
    ///
    /// Messages are never queued for a later connection.
    pub fn send(&self, message: &ClientMessage) -> bool {
        let inner = self.shared.lock();
        let Some(outbound) = inner.outbound.as_ref() else {
            warn!(kind = message.kind(), "not connected; dropping outbound message");
            return false;
        };
        let frame = match serde_json::to_string(message) {
            Ok(frame) => frame,
            Err(e) => {
                warn!(kind = message.kind(), error = %e, "failed to encode outbound message");
                return false;
            }
        };
        if outbound.send(frame).is_err() {
            warn!(kind = message.kind(), "connection writer gone; dropping outbound message");
            return false;
        }
        debug!(kind = message.kind(), "queued outbound message");
        true
    }

    pub fn subscribe<F>(&self, kind: EventKind, handler: F) -> Subscription
    where
        F: Fn(&ServerEvent) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        let id = self.shared.registry.subscribe(kind, handler);
        Subscription::new(kind, id, Arc::downgrade(&self.shared))
    }

    pub fn unsubscribe(&self, kind: EventKind, id: HandlerId) -> bool {
        self.shared.registry.unsubscribe(kind, id)
    }

    pub fn subscriber_count(&self, kind: EventKind) -> usize {
        self.shared.registry.handler_count(kind)
    }

    /// Subscribe to every event kind and funnel events into one channel, so a
    /// single owner can apply them in arrival order.
    pub fn event_stream(&self) -> EventStream {
        let (tx, rx) = mpsc::unbounded_channel();
        let subscriptions = EventKind::ALL
            .into_iter()
            .map(|kind| {
                let tx = tx.clone();
                self.subscribe(kind, move |event| {
                    tx.send(event.clone())
                        .map_err(|_| anyhow::anyhow!("event stream receiver dropped"))
                })
            })
            .collect();
        EventStream { rx, subscriptions }
    }
}

/// Receiving end of [`ConnectionManager::event_stream`].
pub struct EventStream {
    rx: mpsc::UnboundedReceiver<ServerEvent>,
    subscriptions: Vec<Subscription>,
}

impl EventStream {
    pub async fn recv(&mut self) -> Option<ServerEvent> {
        self.rx.recv().await
    }

    /// Detach from the connection manager.
    pub fn close(self) {
        for subscription in self.subscriptions {
            subscription.unsubscribe();
        }
    }
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn set_state(&self, state: ConnectionState) {
        let previous = self.state.send_replace(state);
        if previous != state {
            debug!(?previous, ?state, "connection state changed");
        }
    }

    /// Start a connection task for the associated document.
    fn open(self: &Arc<Self>, inner: &mut Inner) {
        let Some(document_id) = inner.document_id.clone() else {
            return;
        };
        let Some(token) = self.credentials.token().filter(|t| !t.is_empty()) else {
            warn!(document_id = %document_id, "no auth credential available; not connecting");
            inner.should_reconnect = false;
            self.set_state(ConnectionState::Disconnected);
            return;
        };

        inner.generation += 1;
        let generation = inner.generation;
        let cancel = CancellationToken::new();
        inner.cancel = Some(cancel.clone());
        self.set_state(ConnectionState::Connecting);

        let target = TransportTarget::new(&self.config.endpoint, &document_id, token);
        info!(document_id = %document_id, url = %target.url, generation, "connecting");
        tokio::spawn(Arc::clone(self).run(target, generation, cancel));
    }

    async fn run(
        self: Arc<Self>,
        target: TransportTarget,
        generation: u64,
        cancel: CancellationToken,
    ) {
        let connecting = self.connector.connect(target);
        let result = tokio::select! {
            _ = cancel.cancelled() => return,
            result = connecting => result,
        };
        let Transport { mut sink, mut stream } = match result {
            Ok(transport) => transport,
            Err(e) => {
                warn!(generation, error = %e, "connection attempt failed");
                self.handle_close(generation);
                return;
            }
        };

        let (outbound_tx, mut outbound_rx) = mpsc::unbounded_channel::<String>();
        if !self.handle_open(generation, outbound_tx) {
            let _ = sink.close().await;
            return;
        }

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    let _ = sink.close().await;
                    return;
                }
                Some(frame) = outbound_rx.recv() => {
                    if let Err(e) = sink.send(frame).await {
                        warn!(generation, error = %e, "failed to write frame");
                        break;
                    }
                }
                inbound = stream.next() => match inbound {
                    Some(Ok(frame)) => self.dispatch_frame(&frame),
                    Some(Err(e)) => {
                        warn!(generation, error = %e, "transport error");
                        break;
                    }
                    None => {
                        info!(generation, "connection closed by server");
                        break;
                    }
                },
            }
        }

        self.handle_close(generation);
    }

    fn handle_open(&self, generation: u64, outbound: mpsc::UnboundedSender<String>) -> bool {
        let mut inner = self.lock();
        if inner.generation != generation {
            debug!(generation, "discarding superseded connection");
            return false;
        }
        inner.attempts = 0;
        inner.outbound = Some(outbound);
        self.set_state(ConnectionState::Connected);
        info!(document_id = inner.document_id.as_deref(), "connected");
        true
    }

    fn handle_close(self: &Arc<Self>, generation: u64) {
        let mut inner = self.lock();
        if inner.generation != generation {
            debug!(generation, "ignoring close of superseded connection");
            return;
        }
        inner.outbound = None;
        inner.cancel = None;
        self.set_state(ConnectionState::Disconnected);
        if inner.should_reconnect {
            self.schedule_reconnect(&mut inner);
        }
    }

    fn schedule_reconnect(self: &Arc<Self>, inner: &mut Inner) {
        if inner.reconnect.as_ref().is_some_and(|timer| !timer.is_finished()) {
            debug!("reconnect already scheduled");
            return;
        }
        let attempt = inner.attempts + 1;
        let Some(delay) = self.config.backoff.delay(attempt) else {
            warn!(attempts = inner.attempts, "reconnect attempts exhausted; giving up");
            self.set_state(ConnectionState::Abandoned {
                attempts: inner.attempts,
            });
            return;
        };
        inner.attempts = attempt;
        info!(attempt, delay_ms = delay.as_millis() as u64, "scheduling reconnect");

        let shared = Arc::clone(self);
        inner.reconnect = Some(tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            shared.reconnect_now();
        }));
    }

    fn reconnect_now(self: &Arc<Self>) {
        let mut inner = self.lock();
        inner.reconnect = None;
        if !inner.should_reconnect || self.state.borrow().is_active() {
            return;
        }
        debug!(attempt = inner.attempts, "reconnect timer fired");
        self.open(&mut inner);
    }

    fn dispatch_frame(&self, frame: &str) {
        match ServerEvent::decode(frame) {
            Ok(event) => {
                debug!(event = %event.kind(), "received event");
                self.registry.dispatch(&event);
            }
            Err(ParseError::UnknownType(kind)) => {
                debug!(kind, "ignoring unknown event type");
            }
            Err(e) => warn!(error = %e, "dropping malformed frame"),
        }
    }
}
