// Trait definitions for dependency injection
//
// These are INFRASTRUCTURE traits only - no business logic.
// Grant/revoke decisions live in domains/access and consume these traits.
//
// Naming convention: Base* for trait names (e.g., BasePamClient, BaseDirectoryClient)

use std::time::Duration;

use async_trait::async_trait;

use crate::common::{AssetAccount, AuthenticatedUser, EventSubscription, ProviderError};
use crate::kernel::event_queue::EventSender;

// =============================================================================
// Credential Source Trait (Infrastructure - lazily refreshed sessions)
// =============================================================================

#[async_trait]
pub trait BaseCredentialSource: Send + Sync {
    /// Remaining lifetime of the current credential. Zero means expired or never obtained.
    async fn remaining_lifetime(&self) -> Result<Duration, ProviderError>;

    /// Obtain a fresh credential.
    async fn refresh(&self) -> Result<(), ProviderError>;
}

// =============================================================================
// Directory Client Trait (Infrastructure - Active Roles attribute access)
// =============================================================================

#[async_trait]
pub trait BaseDirectoryClient: BaseCredentialSource {
    /// Replace the value of `attribute` on the object at `object_dn`.
    async fn set_attribute(
        &self,
        object_dn: &str,
        attribute: &str,
        value: &str,
    ) -> Result<(), ProviderError>;

    /// Declared schema syntax (oMSyntax) of `attribute`; 0 if it is not in the schema.
    async fn attribute_schema_syntax(&self, attribute: &str) -> Result<u32, ProviderError>;
}

// =============================================================================
// PAM Client Trait (Infrastructure - Safeguard REST and push events)
// =============================================================================

#[async_trait]
pub trait BasePamClient: BaseCredentialSource {
    async fn asset_account(&self, account_id: &str) -> Result<AssetAccount, ProviderError>;

    async fn current_user(&self) -> Result<AuthenticatedUser, ProviderError>;

    async fn event_subscriptions(
        &self,
        user: &AuthenticatedUser,
    ) -> Result<Vec<EventSubscription>, ProviderError>;

    async fn create_event_subscription(
        &self,
        subscription: &EventSubscription,
    ) -> Result<(), ProviderError>;

    /// A persistent listener for pushed events. Not started.
    async fn event_listener(&self) -> Result<Box<dyn BaseEventListener>, ProviderError>;
}

// =============================================================================
// Event Listener Trait (Infrastructure - push transport)
// =============================================================================

/// Transport side of push delivery.
///
/// Handlers are queue senders: the transport only enqueues, it never runs
/// decision logic on its own threads.
#[async_trait]
pub trait BaseEventListener: Send + Sync {
    /// Route events named `event_name` into `sink`. Must be called before `start`.
    fn register_handler(&mut self, event_name: &str, sink: EventSender);

    async fn start(&mut self) -> Result<(), ProviderError>;

    async fn stop(&mut self) -> Result<(), ProviderError>;
}
