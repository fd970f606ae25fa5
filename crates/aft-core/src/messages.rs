//! Wire protocol for the worker duplex channel.
//!
//! Every frame is a single JSON object. Inbound worker→host frames carry a
//! top-level `type` discriminator; outbound host→worker frames are command
//! envelopes of the form `{"command": "<name>"}`.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::error::{AftError, AftResult};

/// An inbound frame from the worker.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum WorkerMessage {
    /// Telemetry payload. Either section may be absent in a given frame.
    TrackingData { data: TrackingPayload },
    /// Advisory acknowledgment of a previously sent command.
    CommandResponse { command: String, status: String },
}

/// The `data` section of a `tracking_data` frame.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TrackingPayload {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gaze: Option<GazeReading>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub emotion: Option<EmotionReading>,
}

/// Raw gaze section as the worker emits it. Coordinates are normalized
/// to the unit square.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GazeReading {
    #[serde(rename = "GazeX")]
    pub gaze_x: f64,
    #[serde(rename = "GazeY")]
    pub gaze_y: f64,
}

/// Raw emotion section as the worker emits it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmotionReading {
    pub emotion: String,
    #[serde(default)]
    pub emotion_scores: HashMap<String, f64>,
    /// Confidence percentage for the primary emotion. Older workers omit
    /// this; the host derives it from the score table instead.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confidence: Option<f64>,
    #[serde(default)]
    pub face_detected: bool,
}

/// Well-known commands the host sends to the worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Command {
    StartTracking,
    StopTracking,
    Calibrate,
}

impl Command {
    pub fn name(&self) -> &'static str {
        match self {
            Command::StartTracking => "start_tracking",
            Command::StopTracking => "stop_tracking",
            Command::Calibrate => "calibrate",
        }
    }
}

impl std::fmt::Display for Command {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Outbound host→worker command envelope.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommandRequest {
    pub command: Command,
}

/// Encode an outbound command as a JSON text frame.
pub fn encode_command(command: Command) -> AftResult<String> {
    Ok(serde_json::to_string(&CommandRequest { command })?)
}

/// Decode an inbound text frame.
///
/// Unknown `type` discriminators and structurally invalid envelopes both
/// surface as [`AftError::MalformedFrame`]; the caller drops the frame and
/// the channel stays up.
pub fn decode_frame(text: &str) -> AftResult<WorkerMessage> {
    serde_json::from_str(text).map_err(|e| AftError::MalformedFrame(e.to_string()))
}
