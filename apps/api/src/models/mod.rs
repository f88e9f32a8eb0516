pub mod application;
pub mod job;
pub mod session;
pub mod task;
