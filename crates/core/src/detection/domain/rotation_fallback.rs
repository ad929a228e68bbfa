use crate::detection::domain::face_detector::FaceDetector;
use crate::shared::bounding_box::BoundingBox;
use crate::shared::frame::{Frame, Rotation};

/// Orientation of the frame in which faces were finally found.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Orientation {
    Upright,
    Clockwise90,
    CounterClockwise90,
}

impl Orientation {
    fn rotation(self) -> Option<Rotation> {
        match self {
            Orientation::Upright => None,
            Orientation::Clockwise90 => Some(Rotation::Clockwise90),
            Orientation::CounterClockwise90 => Some(Rotation::CounterClockwise90),
        }
    }
}

/// Attempt order. Each rotated attempt starts from the unrotated frame.
const ATTEMPTS: [Orientation; 3] = [
    Orientation::Upright,
    Orientation::Clockwise90,
    Orientation::CounterClockwise90,
];

/// Decorator that retries detection on quarter-turned copies of a frame.
///
/// Phone recordings often carry their orientation only as container
/// metadata, so raw decoded frames show the face lying on its side. When the
/// upright pass finds nothing, the frame is rotated 90° clockwise, then 90°
/// counter-clockwise, stopping at the first attempt that yields boxes.
///
/// Boxes are returned in the coordinate space of the rotated frame that
/// produced them; no mapping back to upright coordinates is done.
pub struct RotationFallbackDetector {
    inner: Box<dyn FaceDetector>,
    enabled: bool,
}

impl RotationFallbackDetector {
    pub fn new(inner: Box<dyn FaceDetector>) -> Self {
        Self {
            inner,
            enabled: true,
        }
    }

    /// With fallback disabled only the upright attempt runs.
    pub fn with_fallback(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    /// Runs the attempts in order and reports which one succeeded.
    ///
    /// When every attempt comes back empty the result is
    /// `(Orientation::Upright, [])`.
    pub fn detect_oriented(
        &mut self,
        frame: &Frame,
    ) -> Result<(Orientation, Vec<BoundingBox>), Box<dyn std::error::Error>> {
        let attempts = if self.enabled { &ATTEMPTS[..] } else { &ATTEMPTS[..1] };

        for &orientation in attempts {
            let boxes = match orientation.rotation() {
                None => self.inner.detect(frame)?,
                Some(rotation) => self.inner.detect(&frame.rotated(rotation)?)?,
            };
            if !boxes.is_empty() {
                if orientation != Orientation::Upright {
                    log::debug!(
                        "Frame {}: {} face(s) found after {:?} rotation",
                        frame.index(),
                        boxes.len(),
                        orientation
                    );
                }
                return Ok((orientation, boxes));
            }
        }

        Ok((Orientation::Upright, Vec::new()))
    }
}

impl FaceDetector for RotationFallbackDetector {
    fn detect(&mut self, frame: &Frame) -> Result<Vec<BoundingBox>, Box<dyn std::error::Error>> {
        self.detect_oriented(frame).map(|(_, boxes)| boxes)
    }
}
