// Active Roles just-in-time access - service core
//
// This crate watches Safeguard access request lifecycle events and flips an
// Active Directory attribute through Active Roles when access opens or closes.
// Architecture follows the kernel/domains split: remote clients behind Base*
// traits in kernel/, grant/revoke decisions in domains/access.

pub mod common;
pub mod config;
pub mod domains;
pub mod kernel;
pub mod server;

pub use config::*;
