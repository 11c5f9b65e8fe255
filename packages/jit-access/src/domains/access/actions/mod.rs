//! Access domain actions - entry-point business logic
//!
//! Called from the service lifecycle in `server::service`. Each action
//! talks to the remote systems only through an `AuthenticatedGateway`.

pub mod bootstrap;
pub mod dispatch;
pub mod mutate;

// Re-export for convenience
pub use bootstrap::{BootstrapOutcome, SubscriptionBootstrapper};
pub use dispatch::{DispatchError, DispatchOutcome, DispatchStats, EventDispatcher};
pub use mutate::AttributeMutator;
