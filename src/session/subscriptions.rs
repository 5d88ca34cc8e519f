//! Telemetry and video push subscriptions
//!
//! A subscription is a standing filter over the shared decrypted stream:
//! the subscribe request is fire-and-forget (the "reply" is the event
//! stream itself), and the filtered listener is installed before the
//! request is sent so no early event is missed. Teardown must do both
//! halves, dropping the local listener and telling the server to stop
//! pushing, or it leaks one side or the other.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use groundlink_shared::{Event, Inbound, Request, Telemetry, VideoFrameData};
use tokio::sync::broadcast;
use tracing::warn;

use super::Session;
use crate::error::Result;

/// A standing telemetry listener. Dropping it removes the local filter;
/// use [`Session::unsubscribe_telemetry`] to also stop the server push.
pub struct TelemetryStream {
    rx: broadcast::Receiver<Inbound>,
}

impl TelemetryStream {
    /// Next telemetry tick, or `None` once the connection is closed.
    pub async fn next(&mut self) -> Option<Telemetry> {
        loop {
            match self.rx.recv().await {
                Ok(Inbound::Event(Event::Telemetry(telemetry))) => return Some(telemetry),
                Ok(_) => continue,
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    warn!("telemetry subscriber lagged, {} messages lost", n);
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }
}

/// One video event with both camera feeds decoded. Partial frames are
/// never delivered.
#[derive(Debug, Clone, PartialEq)]
pub struct VideoFrame {
    pub frame: Vec<u8>,
    pub front_frame: Vec<u8>,
}

/// A standing video listener; see [`TelemetryStream`] for teardown rules.
pub struct VideoStream {
    rx: broadcast::Receiver<Inbound>,
    overlay: bool,
}

impl VideoStream {
    /// Overlay setting this stream was subscribed with.
    pub fn overlay(&self) -> bool {
        self.overlay
    }

    /// Next decoded frame pair, or `None` once the connection is closed.
    pub async fn next(&mut self) -> Option<VideoFrame> {
        loop {
            match self.rx.recv().await {
                Ok(Inbound::Event(Event::VideoFrame(data))) => match decode_frame_pair(&data) {
                    Some(frame) => return Some(frame),
                    None => {
                        // Same policy as an unauthenticated envelope: drop
                        // the one bad event, keep the stream alive.
                        warn!("dropping video event with undecodable image data");
                    }
                },
                Ok(_) => continue,
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    warn!("video subscriber lagged, {} messages lost", n);
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }
}

/// Decode both camera feeds or neither.
fn decode_frame_pair(data: &VideoFrameData) -> Option<VideoFrame> {
    let frame = BASE64.decode(&data.frame).ok()?;
    let front_frame = BASE64.decode(&data.front_frame).ok()?;
    Some(VideoFrame { frame, front_frame })
}

impl Session {
    /// Start the telemetry push and return its listener.
    pub async fn subscribe_telemetry(&self) -> Result<TelemetryStream> {
        let token = self.require_token().await?;
        // Listener first, then the subscribe request: events may start
        // arriving the moment the server processes it.
        let rx = self.channel().stream();
        self.channel()
            .send(&Request::SubscribeTelemetry { token })
            .await?;
        Ok(TelemetryStream { rx })
    }

    /// Tear down a telemetry subscription: cancels the local listener and
    /// tells the server to stop pushing.
    pub async fn unsubscribe_telemetry(&self, stream: TelemetryStream) -> Result<()> {
        drop(stream);
        let token = self.require_token().await?;
        self.channel()
            .send(&Request::UnsubscribeTelemetry { token })
            .await
    }

    /// Start the video push (with or without the detection overlay) and
    /// return its listener.
    pub async fn subscribe_video(&self, overlay: bool) -> Result<VideoStream> {
        let token = self.require_token().await?;
        let rx = self.channel().stream();
        self.channel()
            .send(&Request::SubscribeVideo { token, overlay })
            .await?;
        Ok(VideoStream { rx, overlay })
    }

    /// Tear down a video subscription; both halves, as with telemetry.
    pub async fn unsubscribe_video(&self, stream: VideoStream) -> Result<()> {
        drop(stream);
        let token = self.require_token().await?;
        self.channel()
            .send(&Request::UnsubscribeVideo { token })
            .await
    }

    /// Switch the overlay setting: an explicit cancel-then-resubscribe
    /// transition, returning the replacement stream.
    pub async fn set_video_overlay(&self, stream: VideoStream, overlay: bool) -> Result<VideoStream> {
        self.unsubscribe_video(stream).await?;
        self.subscribe_video(overlay).await
    }
}
