pub mod face_detector;
pub mod rotation_fallback;
