//! Video liveness checking: decide from a short clip whether the subject is
//! a live person by tracking how far their face moves between frames.

pub mod detection;
pub mod liveness;
pub mod pipeline;
pub mod shared;
pub mod video;
