/// Inter-frame center displacement (pixels) above which a face counts as moving.
/// Tuned on phone captures; deliberately not scaled by frame resolution.
pub const MOVEMENT_THRESHOLD_PX: f64 = 15.0;

pub const BLAZEFACE_MODEL_NAME: &str = "blazeface_short_range.onnx";

/// Minimum detector score for a face candidate to be kept.
pub const DEFAULT_FACE_CONFIDENCE: f64 = 0.5;

pub const VIDEO_EXTENSIONS: &[&str] = &["mp4", "mov", "m4v", "avi", "mkv", "webm", "3gp"];
