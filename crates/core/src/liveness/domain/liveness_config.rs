use crate::shared::constants::MOVEMENT_THRESHOLD_PX;

/// Read-only settings for a liveness run, fixed at construction.
#[derive(Clone, Debug, PartialEq)]
pub struct LivenessConfig {
    /// A displacement must be strictly greater than this to count as movement.
    pub movement_threshold: f64,
    /// Retry detection on ±90° rotated copies when the upright pass is empty.
    pub rotation_fallback: bool,
    /// Stop after this many frames. `None` reads the whole video.
    pub max_frames: Option<usize>,
}

impl Default for LivenessConfig {
    fn default() -> Self {
        Self {
            movement_threshold: MOVEMENT_THRESHOLD_PX,
            rotation_fallback: true,
            max_frames: None,
        }
    }
}
