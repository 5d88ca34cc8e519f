//! Drone and flight command surface
//!
//! One typed method per catalog action. Every method sends the current
//! access token, waits for its single correlated response, and surfaces a
//! server-side `error` as [`Error::Remote`].

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use groundlink_shared::{
    kmh_to_ms, CapturedFrame, DroneEntry, DroneRoster, Request, SessionInfo, SessionList,
    SessionOpened,
};
use tracing::info;

use super::Session;
use crate::error::{Error, Result};
use crate::store::KEY_SESSION_ID;

impl Session {
    /// List drones registered to this account.
    pub async fn list_registered_drones(&self) -> Result<Vec<DroneEntry>> {
        let token = self.require_token().await?;
        let roster: DroneRoster = self
            .call_expect(Request::ListRegisteredDrones { token })
            .await?;
        Ok(roster.drones)
    }

    /// Register a drone by name and address.
    pub async fn register_drone(&self, drone_name: &str, drone_ip: &str) -> Result<()> {
        let token = self.require_token().await?;
        self.call_unit(Request::RegisterDrone {
            token,
            drone_name: drone_name.into(),
            drone_ip: drone_ip.into(),
        })
        .await
    }

    /// Open a control session on a drone. The returned session id is
    /// persisted so an interrupted session can be detected at startup.
    pub async fn connect_drone(&self, drone_name: &str) -> Result<String> {
        let token = self.require_token().await?;
        let opened: SessionOpened = self
            .call_expect(Request::Connect {
                token,
                drone_name: drone_name.into(),
            })
            .await?;
        self.store
            .put(KEY_SESSION_ID, &opened.session_id)
            .await?;
        info!(session_id = %opened.session_id, drone = drone_name, "drone session opened");
        Ok(opened.session_id)
    }

    /// End the drone session and clear the persisted session id. The rest
    /// of the session state (tokens, channel) is untouched.
    pub async fn disconnect_drone(&self) -> Result<()> {
        let token = self.require_token().await?;
        self.call_unit(Request::Disconnect { token }).await?;
        self.store.remove(KEY_SESSION_ID).await?;
        Ok(())
    }

    pub async fn takeoff(&self, height_m: f64) -> Result<()> {
        let token = self.require_token().await?;
        self.call_unit(Request::Takeoff {
            token,
            height: height_m,
        })
        .await
    }

    /// Capture one still frame; returns the decoded JPEG bytes.
    pub async fn capture_frame(&self, overlay: bool) -> Result<Vec<u8>> {
        let token = self.require_token().await?;
        let captured: CapturedFrame = self
            .call_expect(Request::CaptureFrame { token, overlay })
            .await?;
        BASE64
            .decode(captured.image)
            .map_err(|_| Error::Shape("captured frame is not valid base64".into()))
    }

    /// Select a flight lane by click position in the camera frame.
    pub async fn choose_lane(&self, click_x: f64, click_y: f64) -> Result<()> {
        let token = self.require_token().await?;
        self.call_unit(Request::ChooseLane {
            token,
            click_x,
            click_y,
        })
        .await
    }

    /// Set cruise speed. Accepted in km/h; transmitted in m/s.
    pub async fn set_speed_kmh(&self, speed_kmh: f64) -> Result<()> {
        let token = self.require_token().await?;
        self.call_unit(Request::SetSpeed {
            token,
            speed: kmh_to_ms(speed_kmh),
        })
        .await
    }

    /// Set flight height in meters.
    pub async fn set_height(&self, height_m: f64) -> Result<()> {
        let token = self.require_token().await?;
        self.call_unit(Request::SetHeight {
            token,
            height: height_m,
        })
        .await
    }

    pub async fn start_fly(&self) -> Result<()> {
        let token = self.require_token().await?;
        self.call_unit(Request::StartFly { token }).await
    }

    pub async fn stop_fly(&self) -> Result<()> {
        let token = self.require_token().await?;
        self.call_unit(Request::StopFly { token }).await
    }

    pub async fn land(&self) -> Result<()> {
        let token = self.require_token().await?;
        self.call_unit(Request::Land { token }).await
    }

    /// List the account's active drone-control sessions.
    pub async fn list_current_sessions(&self) -> Result<Vec<SessionInfo>> {
        let token = self.require_token().await?;
        let list: SessionList = self
            .call_expect(Request::ListCurrentSessions { token })
            .await?;
        Ok(list.sessions)
    }

    /// Force-end a session by id (e.g. a stale lease from a crashed client).
    pub async fn end_session(&self, session_id: &str) -> Result<()> {
        let token = self.require_token().await?;
        self.call_unit(Request::EndSession {
            token,
            session_id: session_id.into(),
        })
        .await
    }
}
