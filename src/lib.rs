//! GroundLink client core
//!
//! The secure session channel for the GroundLink drone remote-control
//! client: one persistent TLS WebSocket to the control server, an
//! ephemeral X25519 key exchange, AES-256-GCM envelopes for everything
//! after it, and a single shared decrypted stream multiplexing command
//! responses with pushed telemetry and video events.
//!
//! Layering, leaf first: [`transport`] owns the connection, [`handshake`]
//! derives the channel key, [`channel`] turns the two into an encrypted
//! request/event bus, and [`session`] owns credentials and the command
//! surface on top. The wire contract lives in [`groundlink_shared`].

pub mod channel;
pub mod error;
pub mod handshake;
pub mod session;
pub mod store;
pub mod transport;

#[cfg(test)]
pub(crate) mod testutil;

pub use error::{Error, Result};
pub use session::{Session, TelemetryStream, VideoFrame, VideoStream};
pub use transport::{Transport, TransportConfig, DEFAULT_ENDPOINT};

pub use groundlink_shared as proto;
