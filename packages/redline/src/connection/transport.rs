//! Framed text transport used by the connection manager.
//!
//! A [`Connector`] opens one connection and hands back a sink/stream pair of
//! text frames. Production traffic goes through [`WsConnector`]; tests plug in
//! an in-memory connector.

use std::pin::Pin;

use futures::future::{self, BoxFuture};
use futures::stream::BoxStream;
use futures::{FutureExt, Sink, SinkExt, StreamExt};
use tokio_tungstenite::tungstenite;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::HeaderValue;
use tokio_tungstenite::tungstenite::http::header::AUTHORIZATION;

#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("invalid connection target: {0}")]
    InvalidTarget(String),

    #[error("websocket error: {0}")]
    WebSocket(#[from] tungstenite::Error),

    #[error("connection closed")]
    Closed,
}

/// Where to connect and with which bearer credential.
#[derive(Clone)]
pub struct TransportTarget {
    pub url: String,
    pub token: String,
}

impl std::fmt::Debug for TransportTarget {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransportTarget")
            .field("url", &self.url)
            .field("token", &"<redacted>")
            .finish()
    }
}

impl TransportTarget {
    pub fn new(endpoint: &str, document_id: &str, token: String) -> Self {
        Self {
            url: format!("{}/{}", endpoint.trim_end_matches('/'), document_id),
            token,
        }
    }
}

pub type FrameSink = Pin<Box<dyn Sink<String, Error = TransportError> + Send>>;
pub type FrameStream = BoxStream<'static, Result<String, TransportError>>;

/// An open connection: outbound frames go into `sink`, inbound come out of `stream`.
pub struct Transport {
    pub sink: FrameSink,
    pub stream: FrameStream,
}

pub trait Connector: Send + Sync + 'static {
    fn connect(
        &self,
        target: TransportTarget,
    ) -> BoxFuture<'static, Result<Transport, TransportError>>;
}

/// WebSocket connector backed by tokio-tungstenite.
#[derive(Debug, Default, Clone)]
pub struct WsConnector;

impl Connector for WsConnector {
    fn connect(
        &self,
        target: TransportTarget,
    ) -> BoxFuture<'static, Result<Transport, TransportError>> {
        async move {
            let mut request = target
                .url
                .as_str()
                .into_client_request()
                .map_err(|e| TransportError::InvalidTarget(e.to_string()))?;
            let bearer = HeaderValue::from_str(&format!("Bearer {}", target.token))
                .map_err(|e| TransportError::InvalidTarget(e.to_string()))?;
            request.headers_mut().insert(AUTHORIZATION, bearer);

            let (ws_stream, _) = tokio_tungstenite::connect_async(request).await?;
            let (ws_write, ws_read) = ws_stream.split();

            let sink = ws_write
                .with(|frame: String| {
                    future::ready(Ok::<_, tungstenite::Error>(Message::text(frame)))
                })
                .sink_map_err(TransportError::from);

            let stream = ws_read.filter_map(|msg| {
                future::ready(match msg {
                    Ok(Message::Text(text)) => Some(Ok(text.as_str().to_owned())),
                    Ok(Message::Binary(bytes)) => String::from_utf8(bytes.to_vec()).ok().map(Ok),
                    Ok(_) => None,
                    Err(tungstenite::Error::ConnectionClosed) => Some(Err(TransportError::Closed)),
                    Err(e) => Some(Err(e.into())),
                })
            });

            Ok(Transport {
                sink: Box::pin(sink),
                stream: stream.boxed(),
            })
        }
        .boxed()
    }
}
