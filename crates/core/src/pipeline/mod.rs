pub mod check_liveness_use_case;
pub mod infrastructure;
pub mod pipeline_logger;
