//! Loopback WebSocket servers for exercising the client end to end.

use std::sync::{Arc, Mutex};

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use futures::{SinkExt, StreamExt};
use groundlink_shared::codec::{self, SealKey, WireFrame};
use rand::rngs::OsRng;
use serde_json::Value;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::protocol::Message;
use tokio_tungstenite::{accept_async, WebSocketStream};
use x25519_dalek::{EphemeralSecret, PublicKey};

type Ws = WebSocketStream<TcpStream>;

async fn bind() -> (TcpListener, String) {
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind failed");
    let port = listener.local_addr().expect("no local addr").port();
    (listener, format!("ws://127.0.0.1:{port}"))
}

async fn accept_one(listener: TcpListener) -> Ws {
    let (stream, _) = listener.accept().await.expect("accept failed");
    accept_async(stream).await.expect("ws accept failed")
}

async fn next_text(ws: &mut Ws) -> Option<String> {
    while let Some(frame) = ws.next().await {
        match frame {
            Ok(Message::Text(text)) => return Some(text),
            Ok(Message::Close(_)) | Err(_) => return None,
            Ok(_) => continue,
        }
    }
    None
}

/// A server that waits for one inbound message, then plays back the given
/// raw frames. Knows nothing about the handshake or encryption.
pub(crate) async fn spawn_echo_server(messages: Vec<String>) -> (String, JoinHandle<()>) {
    let (listener, url) = bind().await;
    let handle = tokio::spawn(async move {
        let mut ws = accept_one(listener).await;
        if next_text(&mut ws).await.is_none() {
            return;
        }
        for message in messages {
            if ws.send(Message::Text(message)).await.is_err() {
                return;
            }
        }
        // Stay up so the connection outlives the assertions.
        while next_text(&mut ws).await.is_some() {}
    });
    (url, handle)
}

/// Run the server side of the key exchange on an accepted socket.
async fn server_handshake(ws: &mut Ws) -> SealKey {
    let hello = next_text(ws).await.expect("no client hello");
    let hello: Value = serde_json::from_str(&hello).expect("client hello is not JSON");
    assert_eq!(hello["action"], "dh_key_exchange");

    let client_key = hello["client_public_key"].as_str().expect("missing client key");
    let client_key: [u8; 32] = BASE64
        .decode(client_key)
        .expect("client key is not base64")
        .try_into()
        .expect("client key is not 32 bytes");

    let secret = EphemeralSecret::random_from_rng(OsRng);
    let public = PublicKey::from(&secret);
    let reply = serde_json::json!({ "server_public_key": BASE64.encode(public.as_bytes()) });
    ws.send(Message::Text(reply.to_string()))
        .await
        .expect("could not send server hello");

    SealKey::new(secret.diffie_hellman(&PublicKey::from(client_key)).to_bytes())
}

/// A server that completes the handshake, hands back its derived key, and
/// then just drains the socket.
pub(crate) async fn spawn_handshake_only_server() -> (String, oneshot::Receiver<SealKey>) {
    let (listener, url) = bind().await;
    let (key_tx, key_rx) = oneshot::channel();
    tokio::spawn(async move {
        let mut ws = accept_one(listener).await;
        let key = server_handshake(&mut ws).await;
        let _ = key_tx.send(key);
        while next_text(&mut ws).await.is_some() {}
    });
    (url, key_rx)
}

/// Frames queued by a [`MockServer`] handler ahead of its replies.
#[derive(Default)]
pub(crate) struct Push {
    items: Vec<PushItem>,
}

enum PushItem {
    Sealed(Value),
    Raw(String),
}

impl Push {
    /// Queue an event to be sealed with the channel key.
    pub(crate) fn push(&mut self, value: Value) {
        self.items.push(PushItem::Sealed(value));
    }

    /// Queue a raw frame sent exactly as given (plaintext or forged).
    pub(crate) fn push_raw(&mut self, raw: String) {
        self.items.push(PushItem::Raw(raw));
    }
}

/// A scripted control server: runs the key exchange, then feeds every
/// decrypted request to the handler. Whatever the handler queues via
/// [`Push`] goes out first, followed by its return values sealed as
/// responses.
pub(crate) struct MockServer {
    pub(crate) url: String,
    requests: Arc<Mutex<Vec<Value>>>,
}

impl MockServer {
    pub(crate) async fn spawn<F>(mut handler: F) -> Self
    where
        F: FnMut(Value, &mut Push) -> Vec<Value> + Send + 'static,
    {
        let (listener, url) = bind().await;
        let requests = Arc::new(Mutex::new(Vec::new()));
        let seen = requests.clone();

        tokio::spawn(async move {
            let mut ws = accept_one(listener).await;
            let key = server_handshake(&mut ws).await;

            while let Some(raw) = next_text(&mut ws).await {
                let request = match codec::classify(&raw) {
                    Ok(WireFrame::Sealed(frame)) => {
                        let plaintext = codec::open(&key, &frame).expect("client sent a bad frame");
                        serde_json::from_slice::<Value>(&plaintext).expect("request is not JSON")
                    }
                    Ok(WireFrame::Plain(value)) => {
                        panic!("unexpected plaintext after handshake: {value}")
                    }
                    Err(e) => panic!("unclassifiable client frame: {e}"),
                };
                seen.lock().unwrap().push(request.clone());

                let mut push = Push::default();
                let replies = handler(request, &mut push);

                for item in push.items {
                    let frame = match item {
                        PushItem::Sealed(value) => {
                            let frame = codec::seal(&key, value.to_string().as_bytes())
                                .expect("seal failed");
                            serde_json::to_string(&frame).expect("frame encode failed")
                        }
                        PushItem::Raw(raw) => raw,
                    };
                    if ws.send(Message::Text(frame)).await.is_err() {
                        return;
                    }
                }

                for reply in replies {
                    let frame =
                        codec::seal(&key, reply.to_string().as_bytes()).expect("seal failed");
                    let raw = serde_json::to_string(&frame).expect("frame encode failed");
                    if ws.send(Message::Text(raw)).await.is_err() {
                        return;
                    }
                }
            }
        });

        Self { url, requests }
    }

    /// Every decrypted request the server has seen, in arrival order.
    pub(crate) fn requests(&self) -> Arc<Mutex<Vec<Value>>> {
        self.requests.clone()
    }
}
