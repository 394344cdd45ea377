pub mod decision;
pub mod job;
pub mod preference;
pub mod task;
