pub mod handlers;
pub mod recorder;
pub mod store;
