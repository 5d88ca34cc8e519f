//! Operator CLI: connect, authenticate, and print telemetry.
//!
//! A development tool, not the product UI. Configuration comes from the
//! environment: `GROUNDLINK_URL` (defaults to the built-in endpoint),
//! `GROUNDLINK_INSECURE=1` to skip certificate validation against a dev
//! server, and `GROUNDLINK_EMAIL` / `GROUNDLINK_PASSWORD` for login when
//! no refresh token is stored.

use std::sync::Arc;

use anyhow::{bail, Context, Result};
use groundlink::store::MemoryStore;
use groundlink::{Session, TransportConfig, DEFAULT_ENDPOINT};
use tracing::{info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(EnvFilter::from_default_env().add_directive(tracing::Level::INFO.into()))
        .init();

    let config = TransportConfig {
        url: std::env::var("GROUNDLINK_URL").unwrap_or_else(|_| DEFAULT_ENDPOINT.into()),
        accept_invalid_certs: std::env::var("GROUNDLINK_INSECURE").is_ok_and(|v| v == "1"),
    };
    if config.accept_invalid_certs {
        warn!("certificate validation disabled (development mode)");
    }
    info!("connecting to {}", config.url);

    let store = Arc::new(MemoryStore::new());
    let (session, authenticated) = Session::init(config, store)
        .await
        .context("could not open the control channel")?;

    if !authenticated {
        let email = std::env::var("GROUNDLINK_EMAIL")
            .context("not authenticated and GROUNDLINK_EMAIL is unset")?;
        let password = std::env::var("GROUNDLINK_PASSWORD")
            .context("not authenticated and GROUNDLINK_PASSWORD is unset")?;
        session
            .login(&email, &password)
            .await
            .context("login failed")?;
        info!("logged in as {}", email);
    }

    if let Some(session_id) = session.resumable_session().await? {
        info!("resumable drone session found: {}", session_id);
    }

    let drones = session.list_registered_drones().await?;
    if drones.is_empty() {
        bail!("no drones registered to this account");
    }
    for drone in &drones {
        info!("registered drone: {} ({})", drone.drone_name, drone.drone_ip);
    }

    let session_id = session.connect_drone(&drones[0].drone_name).await?;
    info!("controlling {} (session {})", drones[0].drone_name, session_id);

    let mut telemetry = session.subscribe_telemetry().await?;
    info!("telemetry streaming; ctrl-c to stop");

    loop {
        tokio::select! {
            tick = telemetry.next() => {
                match tick {
                    // NED convention: altitude is -z.
                    Some(t) => info!(
                        "altitude {:.1} m, velocity ({:.1}, {:.1}) m/s",
                        -t.position.z_val, t.velocity.x_val, t.velocity.y_val
                    ),
                    None => {
                        warn!("connection closed");
                        break;
                    }
                }
            }
            _ = tokio::signal::ctrl_c() => {
                info!("shutting down");
                session.disconnect_drone().await.ok();
                session.close().await;
                break;
            }
        }
    }

    Ok(())
}
