pub mod handlers;
pub mod queue;
pub mod submitter;
pub mod worker;
