//! GroundLink Shared Protocol Types
//!
//! This crate provides the wire contract for communication between the
//! operator client and the GroundLink control server: the request catalog,
//! server responses, pushed event shapes, and the AEAD envelope codec.

pub mod codec;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Requests sent from the client to the control server.
///
/// Every request serializes as `{"action": <name>, ...params}`. The
/// authenticated variants carry the current access token; `login`,
/// `register` and `refresh_token` are the only post-handshake actions that
/// do not.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum Request {
    /// Handshake opener; the only request sent unencrypted.
    DhKeyExchange { client_public_key: String },
    Register {
        username: String,
        email: String,
        password: String,
    },
    Login {
        email: String,
        password: String,
    },
    RefreshToken {
        refresh_token: String,
    },
    ListRegisteredDrones {
        token: String,
    },
    RegisterDrone {
        token: String,
        drone_name: String,
        drone_ip: String,
    },
    Connect {
        token: String,
        drone_name: String,
    },
    Takeoff {
        token: String,
        height: f64,
    },
    CaptureFrame {
        token: String,
        overlay: bool,
    },
    ChooseLane {
        token: String,
        click_x: f64,
        click_y: f64,
    },
    /// Speed is transmitted in m/s; see [`kmh_to_ms`].
    SetSpeed {
        token: String,
        speed: f64,
    },
    SetHeight {
        token: String,
        height: f64,
    },
    StartFly {
        token: String,
    },
    StopFly {
        token: String,
    },
    Land {
        token: String,
    },
    Disconnect {
        token: String,
    },
    ListCurrentSessions {
        token: String,
    },
    EndSession {
        token: String,
        session_id: String,
    },
    SubscribeTelemetry {
        token: String,
    },
    UnsubscribeTelemetry {
        token: String,
    },
    SubscribeVideo {
        token: String,
        overlay: bool,
    },
    UnsubscribeVideo {
        token: String,
    },
}

/// The server's plaintext reply to `dh_key_exchange`: the first message on
/// every connection, sent before any AEAD key exists.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServerHello {
    pub server_public_key: String,
}

/// Events pushed by the server after a matching subscribe request.
///
/// Pushed messages carry `{"event": <tag>, "data": {...}}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "snake_case")]
pub enum Event {
    Telemetry(Telemetry),
    VideoFrame(VideoFrameData),
}

/// One telemetry tick: position and velocity vectors.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Telemetry {
    #[serde(default)]
    pub position: Vector3,
    #[serde(default)]
    pub velocity: Vector3,
}

/// Axis components as the server names them (`x_val`/`y_val`/`z_val`).
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Vector3 {
    #[serde(default)]
    pub x_val: f64,
    #[serde(default)]
    pub y_val: f64,
    #[serde(default)]
    pub z_val: f64,
}

/// One video event as it appears on the wire: two independently
/// base64-encoded camera feeds. Both belong to the same instant and are
/// decoded together downstream.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VideoFrameData {
    pub frame: String,
    pub front_frame: String,
}

/// A decrypted command response: an optional `error` plus whatever result
/// fields the action produced.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Response {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(flatten)]
    pub fields: Map<String, Value>,
}

impl Response {
    /// Split into the result fields or the server's error message.
    pub fn into_result(self) -> Result<Map<String, Value>, String> {
        match self.error {
            Some(message) => Err(message),
            None => Ok(self.fields),
        }
    }
}

/// Every decrypted message observed on the shared stream: either a pushed
/// event (tagged `event`) or a command response.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Inbound {
    Event(Event),
    Response(Response),
}

impl Inbound {
    pub fn as_event(&self) -> Option<&Event> {
        match self {
            Inbound::Event(event) => Some(event),
            Inbound::Response(_) => None,
        }
    }
}

/// Success payload of `login`, `register` and `refresh_token`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: String,
}

/// One registered drone as returned by `list_registered_drones`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DroneEntry {
    pub drone_name: String,
    pub drone_ip: String,
}

/// Success payload of `list_registered_drones`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DroneRoster {
    pub drones: Vec<DroneEntry>,
}

/// Success payload of `connect`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionOpened {
    pub session_id: String,
}

/// Success payload of `capture_frame`: one base64 JPEG.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CapturedFrame {
    pub image: String,
}

/// One row of `list_current_sessions`. The server may attach additional
/// fields; they are preserved in `extra`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionInfo {
    pub session_id: String,
    #[serde(default)]
    pub status: String,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Success payload of `list_current_sessions`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionList {
    pub sessions: Vec<SessionInfo>,
}

/// Convert a caller-facing speed in km/h to the m/s the wire expects.
pub fn kmh_to_ms(speed_kmh: f64) -> f64 {
    speed_kmh * 1000.0 / 3600.0
}
