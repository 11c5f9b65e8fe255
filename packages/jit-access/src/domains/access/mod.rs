//! Access domain - grants and revokes just-in-time directory access
//!
//! Architecture:
//!   relay/listener → event queue → EventDispatcher → AttributeMutator → directory

pub mod actions;

pub use actions::*;
