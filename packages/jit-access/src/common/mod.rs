// Common types and utilities shared across the application

pub mod classifier;
pub mod errors;
pub mod types;

pub use errors::{ClassifiedError, ErrorKind, ObjectRef, ProviderError, StartupError};
pub use types::*;
