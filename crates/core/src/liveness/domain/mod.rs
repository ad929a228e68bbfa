pub mod liveness_config;
pub mod liveness_verdict;
pub mod movement_tracker;
