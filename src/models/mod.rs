pub mod message;
pub mod step;
pub mod task;
