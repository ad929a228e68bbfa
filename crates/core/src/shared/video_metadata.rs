use std::path::PathBuf;

#[derive(Clone, Debug, PartialEq)]
pub struct VideoMetadata {
    pub width: u32,
    pub height: u32,
    pub fps: f64,
    pub total_frames: usize,
    pub codec: String,
    pub source_path: Option<PathBuf>,
    /// Container display rotation in degrees (0, 90, 180 or 270).
    /// Reported for diagnostics only; decoded frames are never pre-rotated.
    pub rotation: i32,
}
