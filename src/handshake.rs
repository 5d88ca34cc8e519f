//! One-shot ephemeral key agreement
//!
//! Runs exactly once per connection, immediately after connect and before
//! any other traffic: the client sends its ephemeral X25519 public key and
//! the very first inbound message must be the server's. Nothing else may
//! read from the transport until this completes; a racing subscriber
//! would swallow the server key and corrupt the handshake.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use groundlink_shared::codec::SealKey;
use groundlink_shared::{Request, ServerHello};
use rand::rngs::OsRng;
use tracing::debug;
use x25519_dalek::{EphemeralSecret, PublicKey};

use crate::error::{Error, Result};
use crate::transport::Transport;

/// Perform the key exchange and derive the channel key.
///
/// Fatal on any deviation: a malformed first message or a dropped
/// connection means the whole connect sequence must be re-run.
pub async fn run(transport: &Transport) -> Result<SealKey> {
    // Subscribe before sending so the reply cannot be missed.
    let mut inbound = transport.inbound();

    let secret = EphemeralSecret::random_from_rng(OsRng);
    let public = PublicKey::from(&secret);

    let hello = Request::DhKeyExchange {
        client_public_key: BASE64.encode(public.as_bytes()),
    };
    let raw = serde_json::to_string(&hello)
        .map_err(|e| Error::Handshake(format!("could not encode client hello: {e}")))?;
    transport.send(raw).await?;

    let first = inbound
        .recv()
        .await
        .map_err(|_| Error::Handshake("connection closed before server key arrived".into()))?;

    let reply: ServerHello = serde_json::from_str(&first)
        .map_err(|e| Error::Handshake(format!("malformed server hello: {e}")))?;

    let server_key = decode_public_key(&reply.server_public_key)?;
    let shared = secret.diffie_hellman(&server_key);
    debug!("key exchange complete");

    Ok(SealKey::new(shared.to_bytes()))
}

fn decode_public_key(encoded: &str) -> Result<PublicKey> {
    let bytes = BASE64
        .decode(encoded)
        .map_err(|_| Error::Handshake("server public key is not valid base64".into()))?;
    let bytes: [u8; 32] = bytes
        .try_into()
        .map_err(|_| Error::Handshake("server public key must be 32 bytes".into()))?;
    Ok(PublicKey::from(bytes))
}
