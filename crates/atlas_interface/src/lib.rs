pub mod errors;
pub mod log_targets;
pub mod store;
