// Service lifecycle and process entry point
pub mod service;

pub use service::*;
