//! Error taxonomy for the session channel

use groundlink_shared::codec::CodecError;
use thiserror::Error;

/// Errors surfaced to callers of the session channel.
#[derive(Error, Debug)]
pub enum Error {
    /// Endpoint unreachable, TLS failure, or I/O on a closed connection.
    /// The caller decides whether to re-run the full connect sequence.
    #[error("connection error: {0}")]
    Connection(String),

    /// Malformed or missing server public key on the first message. Fatal
    /// to the connection attempt; there is no partial recovery.
    #[error("handshake failed: {0}")]
    Handshake(String),

    /// AEAD failure. On decrypt this is scoped to the offending message
    /// and never tears down the shared stream.
    #[error("crypto failure: {0}")]
    Crypto(#[from] CodecError),

    /// A decrypted response carried a non-null `error` field. Terminal for
    /// that call; never retried automatically.
    #[error("server error: {0}")]
    Remote(String),

    /// A response arrived but did not have the shape the call requires
    /// (missing token field, push event in place of a reply, bad base64).
    #[error("malformed response: {0}")]
    Shape(String),

    /// The external credential store failed.
    #[error("credential store error: {0}")]
    Store(#[from] StoreError),

    /// An authenticated action was invoked without a logged-in session.
    #[error("not authenticated")]
    NotAuthenticated,
}

impl From<tokio_tungstenite::tungstenite::Error> for Error {
    fn from(err: tokio_tungstenite::tungstenite::Error) -> Self {
        Error::Connection(err.to_string())
    }
}

/// Failure inside a [`crate::store::CredentialStore`] implementation.
#[derive(Error, Debug)]
#[error("{0}")]
pub struct StoreError(pub String);

pub type Result<T> = std::result::Result<T, Error>;
