pub mod handlers;
pub mod indeed;
pub mod ingestor;
pub mod scheduler;
pub mod source;
