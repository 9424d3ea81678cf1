//! In-memory connector for connection and session tests.

use std::io;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use futures::channel::mpsc as fmpsc;
use futures::future::{self, BoxFuture};
use futures::{FutureExt, SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio::time::Instant;
use tokio_tungstenite::tungstenite;

use super::{Connector, Transport, TransportError, TransportTarget};
use crate::protocol::ServerEvent;

/// Server side of one accepted mock connection. Dropping it closes the
/// connection from the server end.
pub(crate) struct MockServer {
    pub target: TransportTarget,
    frames: fmpsc::UnboundedSender<Result<String, TransportError>>,
    outbound: fmpsc::UnboundedReceiver<String>,
}

impl MockServer {
    pub fn push(&self, frame: impl Into<String>) {
        self.frames.unbounded_send(Ok(frame.into())).unwrap();
    }

    pub fn push_event(&self, event: &ServerEvent) {
        self.push(serde_json::to_string(event).unwrap());
    }

    /// Next frame the client wrote, or `None` once the client closed.
    pub async fn next_outbound(&mut self) -> Option<String> {
        self.outbound.next().await
    }
}

struct MockState {
    accept: AtomicBool,
    attempts: Mutex<Vec<Instant>>,
    servers: mpsc::UnboundedSender<MockServer>,
}

#[derive(Clone)]
pub(crate) struct MockConnector {
    state: Arc<MockState>,
}

impl MockConnector {
    fn with_accept(accept: bool) -> (Self, mpsc::UnboundedReceiver<MockServer>) {
        let (servers, rx) = mpsc::unbounded_channel();
        let connector = Self {
            state: Arc::new(MockState {
                accept: AtomicBool::new(accept),
                attempts: Mutex::new(Vec::new()),
                servers,
            }),
        };
        (connector, rx)
    }

    pub fn accepting() -> (Self, mpsc::UnboundedReceiver<MockServer>) {
        Self::with_accept(true)
    }

    pub fn refusing() -> (Self, mpsc::UnboundedReceiver<MockServer>) {
        Self::with_accept(false)
    }

    pub fn set_accept(&self, accept: bool) {
        self.state.accept.store(accept, Ordering::SeqCst);
    }

    pub fn attempt_times(&self) -> Vec<Instant> {
        self.state.attempts.lock().unwrap().clone()
    }
}

impl Connector for MockConnector {
    fn connect(
        &self,
        target: TransportTarget,
    ) -> BoxFuture<'static, Result<Transport, TransportError>> {
        self.state.attempts.lock().unwrap().push(Instant::now());
        if !self.state.accept.load(Ordering::SeqCst) {
            let refused = io::Error::from(io::ErrorKind::ConnectionRefused);
            return future::ready(Err(tungstenite::Error::Io(refused).into())).boxed();
        }

        let (frames_tx, frames_rx) = fmpsc::unbounded();
        let (outbound_tx, outbound_rx) = fmpsc::unbounded();
        let _ = self.state.servers.send(MockServer {
            target,
            frames: frames_tx,
            outbound: outbound_rx,
        });

        let sink = outbound_tx.sink_map_err(|_| TransportError::Closed);
        future::ready(Ok(Transport {
            sink: Box::pin(sink),
            stream: frames_rx.boxed(),
        }))
        .boxed()
    }
}
