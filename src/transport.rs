//! WebSocket transport with broadcast inbound delivery
//!
//! Owns exactly one message-oriented connection to the control server.
//! Inbound text frames are re-broadcast so that any number of logical
//! consumers (the handshake, the response correlator, push subscriptions)
//! each see every message; outbound frames are queued through a writer
//! pump. The transport knows nothing about framing or crypto.

use std::sync::Arc;

use futures::{SinkExt, StreamExt};
use tokio::sync::{broadcast, mpsc};
use tokio_tungstenite::tungstenite::protocol::Message;
use tokio_tungstenite::{connect_async_tls_with_config, Connector};
use tracing::{debug, warn};

use crate::error::{Error, Result};

/// The fixed control server endpoint. Overridable through
/// [`TransportConfig`] for development and tests only.
pub const DEFAULT_ENDPOINT: &str = "wss://control.groundlink.io:8443/ws";

/// Buffered messages per broadcast subscriber before it starts lagging.
const INBOUND_BUFFER: usize = 256;

/// Queued outbound frames before `send` applies backpressure.
const OUTBOUND_BUFFER: usize = 64;

/// Transport configuration.
#[derive(Debug, Clone)]
pub struct TransportConfig {
    /// WebSocket URL of the control server.
    pub url: String,
    /// Skip TLS certificate validation. Development only; production
    /// configurations must leave this off.
    pub accept_invalid_certs: bool,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            url: DEFAULT_ENDPOINT.into(),
            accept_invalid_certs: false,
        }
    }
}

enum Outbound {
    Frame(String),
    Shutdown,
}

/// One bidirectional message connection to the control server.
pub struct Transport {
    outbound_tx: mpsc::Sender<Outbound>,
    /// Prototype receiver; subscriptions are resubscribed from it. The only
    /// sender lives in the reader pump, so its exit closes every subscriber.
    inbound_rx: broadcast::Receiver<Arc<str>>,
}

impl Transport {
    /// Open the connection and start the reader/writer pumps.
    pub async fn connect(config: TransportConfig) -> Result<Self> {
        let connector = if config.accept_invalid_certs {
            let tls = native_tls::TlsConnector::builder()
                .danger_accept_invalid_certs(true)
                .build()
                .map_err(|e| Error::Connection(e.to_string()))?;
            Some(Connector::NativeTls(tls))
        } else {
            None
        };

        let (ws, _response) =
            connect_async_tls_with_config(&config.url, None, false, connector).await?;
        debug!(url = %config.url, "transport connected");

        let (mut sink, mut stream) = ws.split();
        let (outbound_tx, mut outbound_rx) = mpsc::channel::<Outbound>(OUTBOUND_BUFFER);
        let (inbound_tx, inbound_rx) = broadcast::channel::<Arc<str>>(INBOUND_BUFFER);

        // Writer pump: drains the outbound queue until shutdown or sink error.
        tokio::spawn(async move {
            while let Some(item) = outbound_rx.recv().await {
                match item {
                    Outbound::Frame(raw) => {
                        if let Err(e) = sink.send(Message::Text(raw)).await {
                            warn!("transport write failed: {}", e);
                            break;
                        }
                    }
                    Outbound::Shutdown => {
                        let _ = sink.send(Message::Close(None)).await;
                        let _ = sink.close().await;
                        break;
                    }
                }
            }
        });

        // Reader pump: re-broadcasts every text frame. Ends when the server
        // closes or the connection drops, which closes the broadcast channel
        // and terminates everything downstream.
        let broadcast_tx = inbound_tx;
        tokio::spawn(async move {
            while let Some(frame) = stream.next().await {
                match frame {
                    Ok(Message::Text(text)) => {
                        // Receiver count of zero just means nobody is
                        // listening right now; not an error.
                        let _ = broadcast_tx.send(Arc::from(text.as_str()));
                    }
                    Ok(Message::Close(_)) => {
                        debug!("server closed the connection");
                        break;
                    }
                    Ok(Message::Ping(_)) | Ok(Message::Pong(_)) => {}
                    Ok(other) => {
                        warn!("ignoring non-text frame: {:?}", other);
                    }
                    Err(e) => {
                        warn!("transport read failed: {}", e);
                        break;
                    }
                }
            }
        });

        Ok(Self {
            outbound_tx,
            inbound_rx,
        })
    }

    /// Queue one raw outbound message. Fails with a connection error once
    /// the writer pump has terminated.
    pub async fn send(&self, raw: String) -> Result<()> {
        self.outbound_tx
            .send(Outbound::Frame(raw))
            .await
            .map_err(|_| Error::Connection("connection is closed".into()))
    }

    /// Subscribe to the raw inbound stream. Every subscriber sees every
    /// message from this point on; subscriptions are independent and never
    /// drain each other.
    pub fn inbound(&self) -> broadcast::Receiver<Arc<str>> {
        self.inbound_rx.resubscribe()
    }

    /// Close the connection. Idempotent; a second call is a no-op.
    pub async fn close(&self) {
        let _ = self.outbound_tx.send(Outbound::Shutdown).await;
    }
}
