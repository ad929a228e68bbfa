use crate::shared::bounding_box::BoundingBox;
use crate::shared::frame::Frame;

/// Face detection capability: one frame in, zero or more boxes out, in the
/// coordinate space of the frame that was passed.
///
/// Implementations may keep scratch buffers between calls, hence `&mut self`,
/// but a result must depend only on the frame given.
pub trait FaceDetector: Send {
    fn detect(&mut self, frame: &Frame) -> Result<Vec<BoundingBox>, Box<dyn std::error::Error>>;
}
