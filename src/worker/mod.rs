pub mod executor;
pub mod signal;
