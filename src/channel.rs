//! Encrypted request/event bus over one transport
//!
//! Wraps a keyed [`Transport`]: outbound requests are serialized and
//! sealed, inbound raw frames are decoded exactly once by a single decode
//! task and re-broadcast to every subscriber: the response correlator and
//! all push subscriptions read the same pipeline. A frame that fails to
//! authenticate or parse is dropped and logged; the stream keeps running
//! for everyone else.

use std::sync::Arc;

use groundlink_shared::codec::{self, SealKey, WireFrame};
use groundlink_shared::{Inbound, Request};
use tokio::sync::broadcast;
use tracing::{debug, warn};

use crate::error::{Error, Result};
use crate::transport::Transport;

/// Buffered decoded messages per subscriber.
const DECODED_BUFFER: usize = 256;

/// The encrypted channel: the only writer and the only decoder on its
/// transport for the rest of the connection's life.
pub struct SecureChannel {
    transport: Transport,
    key: Arc<SealKey>,
    /// Prototype receiver; the only sender is owned by the decode task, so
    /// the decoded stream ends for every subscriber when the task does.
    decoded_rx: broadcast::Receiver<Inbound>,
}

impl SecureChannel {
    /// Wrap a connected transport with the handshake-derived key and start
    /// the decode task.
    pub fn new(transport: Transport, key: SealKey) -> Self {
        let key = Arc::new(key);
        let (decoded_tx, decoded_rx) = broadcast::channel::<Inbound>(DECODED_BUFFER);

        let mut raw_rx = transport.inbound();
        let task_key = key.clone();
        let task_tx = decoded_tx;
        tokio::spawn(async move {
            loop {
                match raw_rx.recv().await {
                    Ok(raw) => match decode_frame(&task_key, &raw) {
                        Ok(message) => {
                            let _ = task_tx.send(message);
                        }
                        Err(e) => {
                            // Scoped to this message; never delivered, never fatal.
                            warn!("dropping undecodable message: {}", e);
                        }
                    },
                    Err(broadcast::error::RecvError::Lagged(n)) => {
                        warn!("decode task lagged, {} raw messages lost", n);
                    }
                    Err(broadcast::error::RecvError::Closed) => {
                        debug!("transport closed, decode task ending");
                        break;
                    }
                }
            }
        });

        Self {
            transport,
            key,
            decoded_rx,
        }
    }

    /// Seal and transmit one request.
    pub async fn send(&self, request: &Request) -> Result<()> {
        let plaintext = serde_json::to_vec(request).map_err(codec::CodecError::from)?;
        let frame = codec::seal(&self.key, &plaintext)?;
        let raw = serde_json::to_string(&frame).map_err(codec::CodecError::from)?;
        self.transport.send(raw).await
    }

    /// Subscribe to the shared decoded stream.
    pub fn stream(&self) -> broadcast::Receiver<Inbound> {
        self.decoded_rx.resubscribe()
    }

    /// Close the wrapped transport; ends the decoded stream and every
    /// subscription with it.
    pub async fn close(&self) {
        self.transport.close().await;
    }
}

/// Decode one raw inbound message: sealed envelopes are opened with the
/// channel key, plaintext control messages pass through unmodified.
fn decode_frame(key: &SealKey, raw: &str) -> Result<Inbound> {
    match codec::classify(raw)? {
        WireFrame::Sealed(frame) => {
            let plaintext = codec::open(key, &frame)?;
            serde_json::from_slice(&plaintext)
                .map_err(|e| Error::Shape(format!("sealed payload is not a protocol message: {e}")))
        }
        WireFrame::Plain(value) => serde_json::from_value(value)
            .map_err(|e| Error::Shape(format!("plaintext frame is not a protocol message: {e}"))),
    }
}
