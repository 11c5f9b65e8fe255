//! Subscription bootstrap - identity check and push registration
//!
//! Runs once at startup, before any listener is opened.

use std::sync::Arc;

use tracing::{info, warn};

use crate::common::{
    AuthenticatedUser, EventSubscription, ObjectRef, StartupError, REQUIRED_ADMIN_ROLE,
};
use crate::kernel::{AuthenticatedGateway, BasePamClient};

/// Result of `ensure_subscription`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BootstrapOutcome {
    /// A matching subscription was already registered; nothing was written.
    Existing { subscription_id: Option<String> },
    Created,
}

pub struct SubscriptionBootstrapper {
    pam: Arc<AuthenticatedGateway<dyn BasePamClient>>,
}

impl SubscriptionBootstrapper {
    pub fn new(pam: Arc<AuthenticatedGateway<dyn BasePamClient>>) -> Self {
        Self { pam }
    }

    /// The running identity, provided it holds the Auditor admin role.
    pub async fn verify_identity(&self) -> Result<AuthenticatedUser, StartupError> {
        let user = self
            .pam
            .call(&ObjectRef::default(), |pam| pam.current_user())
            .await?;

        if !user.has_role(REQUIRED_ADMIN_ROLE) {
            return Err(StartupError::AuthorizationInsufficient {
                username: user.username,
                role: REQUIRED_ADMIN_ROLE.to_string(),
            });
        }

        let extra_roles: Vec<&str> = user
            .admin_roles
            .iter()
            .map(String::as_str)
            .filter(|role| *role != REQUIRED_ADMIN_ROLE)
            .collect();
        if !extra_roles.is_empty() {
            warn!(
                username = %user.username,
                roles = ?extra_roles,
                "Identity holds admin roles beyond {}; only {} is needed",
                REQUIRED_ADMIN_ROLE,
                REQUIRED_ADMIN_ROLE
            );
        }

        Ok(user)
    }

    /// Register the access request subscription for `user` unless one already exists.
    pub async fn ensure_subscription(
        &self,
        user: &AuthenticatedUser,
    ) -> Result<BootstrapOutcome, StartupError> {
        let existing = self
            .pam
            .call(&ObjectRef::default(), |pam| pam.event_subscriptions(user))
            .await?;

        if let Some(subscription) = existing
            .into_iter()
            .find(EventSubscription::is_access_request_subscription)
        {
            info!(
                subscription_id = subscription.id.as_deref().unwrap_or(""),
                "Access request subscription already registered"
            );
            return Ok(BootstrapOutcome::Existing {
                subscription_id: subscription.id,
            });
        }

        let subscription = EventSubscription::for_access_requests(user);
        self.pam
            .call(&ObjectRef::default(), |pam| {
                pam.create_event_subscription(&subscription)
            })
            .await?;

        info!(
            user_id = %user.id,
            events = subscription.events.len(),
            "Access request subscription created"
        );
        Ok(BootstrapOutcome::Created)
    }

    /// Verify the identity and make sure its subscription exists.
    pub async fn run(&self) -> Result<AuthenticatedUser, StartupError> {
        let user = self.verify_identity().await?;
        self.ensure_subscription(&user).await?;
        Ok(user)
    }
}
