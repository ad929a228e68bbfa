use serde::{Deserialize, Serialize};

pub const NO_FACE_MESSAGE: &str =
    "No face detected at all. Video might be too dark, too far, or heavily rotated.";
pub const ALIVE_MESSAGE: &str = "Liveness confirmed";
pub const STILL_MESSAGE: &str = "Face detected, but no movement.";

/// Outcome of one liveness run. Every outcome is a value; callers branch on
/// the variant (serialized as `status`) rather than handling errors.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum LivenessVerdict {
    /// The pipeline itself broke: unreadable video, decode or detector failure.
    Error { message: String },
    /// Frames were read but none contained a face.
    Fail { message: String, debug: String },
    /// At least one face was tracked. `is_alive` says whether it moved.
    Success {
        is_alive: bool,
        max_movement_pixels: f64,
        message: String,
        debug: String,
    },
}

impl LivenessVerdict {
    pub fn error(message: impl Into<String>) -> Self {
        LivenessVerdict::Error {
            message: message.into(),
        }
    }

    pub fn status(&self) -> &'static str {
        match self {
            LivenessVerdict::Error { .. } => "error",
            LivenessVerdict::Fail { .. } => "fail",
            LivenessVerdict::Success { .. } => "success",
        }
    }

    /// `Some` only for `Success`.
    pub fn is_alive(&self) -> Option<bool> {
        match self {
            LivenessVerdict::Success { is_alive, .. } => Some(*is_alive),
            _ => None,
        }
    }

    pub fn message(&self) -> &str {
        match self {
            LivenessVerdict::Error { message }
            | LivenessVerdict::Fail { message, .. }
            | LivenessVerdict::Success { message, .. } => message,
        }
    }
}
