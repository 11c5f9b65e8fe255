//! Kernel module - remote clients, transport plumbing and dependencies.

pub mod deps;
pub mod event_queue;
pub mod gateway;
pub mod ldap_directory;
pub mod relay;
pub mod test_dependencies;
pub mod traits;

pub use deps::{SafeguardAdapter, ServiceDeps};
pub use event_queue::{event_queue, EventReceiver, EventSender, PushedEvent, QueueClosed};
pub use gateway::AuthenticatedGateway;
pub use ldap_directory::{LdapDirectoryClient, LdapDirectoryOptions};
pub use relay::RelayListener;
pub use test_dependencies::TestDependencies;
pub use traits::*;
