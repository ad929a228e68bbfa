use crate::liveness::domain::liveness_verdict::{
    LivenessVerdict, ALIVE_MESSAGE, NO_FACE_MESSAGE, STILL_MESSAGE,
};
use crate::shared::bounding_box::Center;

/// Per-run accumulator for face-center displacement between frames.
///
/// Only the last seen center is kept. Frames without a face do not reset
/// it, so the next detected face is compared against the most recent one.
#[derive(Debug)]
pub struct MovementTracker {
    threshold: f64,
    previous_center: Option<Center>,
    max_movement: f64,
    movement_detected: bool,
    frames_read: usize,
    frames_with_face: usize,
}

impl MovementTracker {
    pub fn new(threshold: f64) -> Self {
        Self {
            threshold,
            previous_center: None,
            max_movement: 0.0,
            movement_detected: false,
            frames_read: 0,
            frames_with_face: 0,
        }
    }

    /// Records one decoded frame and the dominant face center found in it.
    ///
    /// Returns the displacement from the previous center, if there was one.
    pub fn record_frame(&mut self, center: Option<Center>) -> Option<f64> {
        self.frames_read += 1;

        let current = center?;
        self.frames_with_face += 1;

        let displacement = self.previous_center.map(|prev| current.distance_to(&prev));
        if let Some(distance) = displacement {
            self.max_movement = self.max_movement.max(distance);
            if distance > self.threshold {
                self.movement_detected = true;
            }
        }

        self.previous_center = Some(current);
        displacement
    }

    pub fn frames_read(&self) -> usize {
        self.frames_read
    }

    pub fn frames_with_face(&self) -> usize {
        self.frames_with_face
    }

    pub fn max_movement(&self) -> f64 {
        self.max_movement
    }

    pub fn movement_detected(&self) -> bool {
        self.movement_detected
    }

    pub fn debug_summary(&self) -> String {
        format!(
            "Processed {} frames. Found faces in {} frames.",
            self.frames_read, self.frames_with_face
        )
    }

    /// Classifies the run: `Fail` when no frame had a face, otherwise
    /// `Success` with the movement verdict.
    pub fn into_verdict(self) -> LivenessVerdict {
        let debug = self.debug_summary();

        if self.frames_with_face == 0 {
            return LivenessVerdict::Fail {
                message: NO_FACE_MESSAGE.to_string(),
                debug,
            };
        }

        let message = if self.movement_detected {
            ALIVE_MESSAGE
        } else {
            STILL_MESSAGE
        };

        LivenessVerdict::Success {
            is_alive: self.movement_detected,
            max_movement_pixels: self.max_movement,
            message: message.to_string(),
            debug,
        }
    }
}
