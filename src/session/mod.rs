//! Session: credential lifecycle and the call primitive
//!
//! The session is the sole owner of the secure channel and of credential
//! state. It is an explicit, constructed object: callers create one per
//! connection and pass it to whatever needs it; there is no process-wide
//! singleton.
//!
//! The wire protocol carries no correlation id, so request/response calls
//! on one session are serialized: a call gate ensures at most one
//! outstanding request, and the next message observed on the shared stream
//! is taken as that request's response. A push event arriving in that slot
//! (possible while subscriptions are live) surfaces as a shape error
//! rather than being misdelivered.

mod commands;
mod subscriptions;

pub use subscriptions::{TelemetryStream, VideoFrame, VideoStream};

use std::sync::Arc;

use groundlink_shared::{Inbound, Request, Response, TokenPair};
use serde::de::DeserializeOwned;
use serde_json::Value;
use tokio::sync::{broadcast, Mutex, RwLock};
use tracing::{info, warn};

use crate::channel::SecureChannel;
use crate::error::{Error, Result};
use crate::handshake;
use crate::store::{CredentialStore, KEY_ACCESS, KEY_REFRESH, KEY_SESSION_ID};
use crate::transport::{Transport, TransportConfig};

/// One authenticated control session over one connection.
pub struct Session {
    channel: SecureChannel,
    store: Arc<dyn CredentialStore>,
    access_token: RwLock<Option<String>>,
    /// Serializes request/response calls; see the module docs.
    call_gate: Mutex<()>,
}

impl Session {
    /// Open a fresh transport, run the key exchange, and wrap the secure
    /// channel. No credential state is touched; pair with [`Session::init`]
    /// or call `login`/`register` afterwards.
    pub async fn connect(config: TransportConfig, store: Arc<dyn CredentialStore>) -> Result<Self> {
        let transport = Transport::connect(config).await?;
        let key = handshake::run(&transport).await?;
        Ok(Self {
            channel: SecureChannel::new(transport, key),
            store,
            access_token: RwLock::new(None),
            call_gate: Mutex::new(()),
        })
    }

    /// Connect and resume a persisted session if one exists.
    ///
    /// Reloads stored tokens and immediately attempts a `refresh_token`
    /// call. Returns the session plus whether it is authenticated:
    /// - refresh succeeded: `true`;
    /// - the server rejected the refresh: every persisted credential is
    ///   wiped and the result is `false` (route to login);
    /// - nothing was stored: `false` without calling refresh. The channel
    ///   is opened in every case, since a subsequent login needs it.
    pub async fn init(
        config: TransportConfig,
        store: Arc<dyn CredentialStore>,
    ) -> Result<(Self, bool)> {
        let session = Self::connect(config, store).await?;

        let refresh_token = match session.store.get(KEY_REFRESH).await? {
            Some(token) => token,
            None => return Ok((session, false)),
        };

        match session
            .call_expect::<TokenPair>(Request::RefreshToken { refresh_token })
            .await
        {
            Ok(pair) => {
                session.store_tokens(pair).await?;
                info!("session resumed via token refresh");
                Ok((session, true))
            }
            Err(Error::Remote(message)) => {
                warn!("token refresh rejected ({}), clearing credentials", message);
                session.logout().await?;
                Ok((session, false))
            }
            Err(other) => Err(other),
        }
    }

    /// Create a new account; on success both tokens are set and persisted.
    pub async fn register(&self, username: &str, email: &str, password: &str) -> Result<()> {
        let pair = self
            .call_expect::<TokenPair>(Request::Register {
                username: username.into(),
                email: email.into(),
                password: password.into(),
            })
            .await?;
        self.store_tokens(pair).await
    }

    /// Authenticate; on success both tokens are set and persisted.
    pub async fn login(&self, email: &str, password: &str) -> Result<()> {
        let pair = self
            .call_expect::<TokenPair>(Request::Login {
                email: email.into(),
                password: password.into(),
            })
            .await?;
        self.store_tokens(pair).await
    }

    /// Erase all persisted credential and session state. Does not close
    /// the channel.
    pub async fn logout(&self) -> Result<()> {
        self.access_token.write().await.take();
        self.store.remove(KEY_ACCESS).await?;
        self.store.remove(KEY_REFRESH).await?;
        self.store.remove(KEY_SESSION_ID).await?;
        Ok(())
    }

    /// Whether an access token is currently held.
    pub async fn is_authenticated(&self) -> bool {
        self.access_token.read().await.is_some()
    }

    /// The persisted drone-session id, if a session is resumable.
    pub async fn resumable_session(&self) -> Result<Option<String>> {
        Ok(self.store.get(KEY_SESSION_ID).await?)
    }

    /// Close the underlying transport; every subscription and in-flight
    /// call terminates with it.
    pub async fn close(&self) {
        self.channel.close().await;
    }

    async fn store_tokens(&self, pair: TokenPair) -> Result<()> {
        self.store.put(KEY_ACCESS, &pair.access_token).await?;
        self.store.put(KEY_REFRESH, &pair.refresh_token).await?;
        *self.access_token.write().await = Some(pair.access_token);
        Ok(())
    }

    pub(crate) async fn require_token(&self) -> Result<String> {
        self.access_token
            .read()
            .await
            .clone()
            .ok_or(Error::NotAuthenticated)
    }

    pub(crate) fn channel(&self) -> &SecureChannel {
        &self.channel
    }

    /// The call primitive: send one request, take the next message on the
    /// shared stream as its response.
    pub(crate) async fn call(&self, request: Request) -> Result<Response> {
        let _outstanding = self.call_gate.lock().await;

        // Subscribe before sending so the reply cannot slip past.
        let mut stream = self.channel.stream();
        self.channel.send(&request).await?;

        loop {
            match stream.recv().await {
                Ok(Inbound::Response(response)) => {
                    return match response.error {
                        Some(message) => Err(Error::Remote(message)),
                        None => Ok(response),
                    };
                }
                Ok(Inbound::Event(_)) => {
                    // The documented ordering constraint was violated: a
                    // push event landed in this call's response slot.
                    return Err(Error::Shape(
                        "push event delivered in place of a response".into(),
                    ));
                }
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    warn!("response waiter lagged, {} messages lost", n);
                }
                Err(broadcast::error::RecvError::Closed) => {
                    return Err(Error::Connection("connection closed mid-call".into()));
                }
            }
        }
    }

    /// Call and deserialize the success fields into `T`. Missing or
    /// mis-typed fields are a shape error, never a partial success.
    pub(crate) async fn call_expect<T: DeserializeOwned>(&self, request: Request) -> Result<T> {
        let response = self.call(request).await?;
        serde_json::from_value(Value::Object(response.fields))
            .map_err(|e| Error::Shape(e.to_string()))
    }

    /// Call for actions whose success carries no result fields.
    pub(crate) async fn call_unit(&self, request: Request) -> Result<()> {
        self.call(request).await.map(|_| ())
    }
}
