//! Service dependencies (using traits for testability)
//!
//! This module provides the dependency container handed to the access domain.
//! Both remote systems sit behind trait abstractions so tests can swap in mocks.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use safeguard::{
    Credentials, EventName, EventSubscriber, SafeguardClient, SafeguardError, SafeguardOptions,
};

use crate::common::{
    AssetAccount, AuthenticatedUser, EventSpec, EventSubscription, ProviderError,
};
use crate::config::{Config, ConfigError, RelayToken, SafeguardAuth};
use crate::kernel::ldap_directory::{LdapDirectoryClient, LdapDirectoryOptions};
use crate::kernel::relay::RelayListener;
use crate::kernel::{BaseCredentialSource, BaseDirectoryClient, BaseEventListener, BasePamClient};

// =============================================================================
// SafeguardClient Adapter (implements BasePamClient trait)
// =============================================================================

/// Wrapper around SafeguardClient that implements BasePamClient
pub struct SafeguardAdapter {
    client: Arc<SafeguardClient>,
    relay_addr: SocketAddr,
    relay_token: Option<RelayToken>,
}

impl SafeguardAdapter {
    /// `relay_addr` is where the event relay listens for forwarded push events;
    /// `relay_token` is the secret the bridge must present there.
    pub fn new(
        client: Arc<SafeguardClient>,
        relay_addr: SocketAddr,
        relay_token: Option<RelayToken>,
    ) -> Self {
        Self {
            client,
            relay_addr,
            relay_token,
        }
    }
}

fn provider_error(error: SafeguardError) -> ProviderError {
    match error {
        SafeguardError::Api { status, message } => ProviderError::Http {
            status,
            detail: message,
        },
        SafeguardError::Http(e) => match e.status() {
            Some(status) => ProviderError::Http {
                status: status.as_u16(),
                detail: e.to_string(),
            },
            None => ProviderError::Unreachable(e.to_string()),
        },
        SafeguardError::Login(detail) | SafeguardError::Certificate(detail) => {
            ProviderError::Http {
                status: 401,
                detail,
            }
        }
        SafeguardError::Parse(detail) => ProviderError::Malformed(detail),
    }
}

fn subscription_from_wire(subscriber: EventSubscriber) -> EventSubscription {
    EventSubscription {
        id: Some(subscriber.id.to_string()),
        description: subscriber.description.unwrap_or_default(),
        subscription_type: subscriber.subscriber_type.unwrap_or_default(),
        user_id: subscriber.user_id.to_string(),
        events: subscriber
            .subscriptions
            .into_iter()
            .map(|e| EventSpec::new(e.name))
            .collect(),
    }
}

fn parse_id(field: &str, id: &str) -> Result<i64, ProviderError> {
    id.parse()
        .map_err(|_| ProviderError::Malformed(format!("{} is not a numeric id: {}", field, id)))
}

#[async_trait]
impl BaseCredentialSource for SafeguardAdapter {
    async fn remaining_lifetime(&self) -> Result<Duration, ProviderError> {
        let minutes = self
            .client
            .access_token_lifetime_remaining()
            .await
            .map_err(provider_error)?;
        Ok(Duration::from_secs(minutes * 60))
    }

    async fn refresh(&self) -> Result<(), ProviderError> {
        self.client
            .refresh_access_token()
            .await
            .map_err(provider_error)
    }
}

#[async_trait]
impl BasePamClient for SafeguardAdapter {
    async fn asset_account(&self, account_id: &str) -> Result<AssetAccount, ProviderError> {
        let account = self
            .client
            .get_asset_account(parse_id("AccountId", account_id)?)
            .await
            .map_err(provider_error)?;

        Ok(AssetAccount {
            id: account.id.to_string(),
            name: account.name,
            domain_name: account.domain_name,
            distinguished_name: account.distinguished_name.unwrap_or_default(),
            platform_type: account.platform_type.unwrap_or_default(),
        })
    }

    async fn current_user(&self) -> Result<AuthenticatedUser, ProviderError> {
        let me = self.client.get_me().await.map_err(provider_error)?;
        Ok(AuthenticatedUser {
            id: me.id.to_string(),
            username: me.user_name,
            admin_roles: me.admin_roles.into_iter().collect(),
        })
    }

    async fn event_subscriptions(
        &self,
        user: &AuthenticatedUser,
    ) -> Result<Vec<EventSubscription>, ProviderError> {
        let subscribers = self
            .client
            .get_event_subscribers(parse_id("UserId", &user.id)?)
            .await
            .map_err(provider_error)?;
        Ok(subscribers.into_iter().map(subscription_from_wire).collect())
    }

    async fn create_event_subscription(
        &self,
        subscription: &EventSubscription,
    ) -> Result<(), ProviderError> {
        let subscriber = EventSubscriber {
            id: 0,
            description: Some(subscription.description.clone()),
            subscriber_type: Some(subscription.subscription_type.clone()),
            user_id: parse_id("UserId", &subscription.user_id)?,
            subscriptions: subscription
                .events
                .iter()
                .map(|e| EventName {
                    name: e.name.clone(),
                })
                .collect(),
        };
        let created = self
            .client
            .create_event_subscriber(&subscriber)
            .await
            .map_err(provider_error)?;
        tracing::debug!(subscriber_id = created.id, "Event subscriber created");
        Ok(())
    }

    async fn event_listener(&self) -> Result<Box<dyn BaseEventListener>, ProviderError> {
        Ok(Box::new(RelayListener::new(
            self.relay_addr,
            self.relay_token.clone(),
        )))
    }
}

// =============================================================================
// ServiceDeps
// =============================================================================

/// Remote clients accessible to the access domain (using traits for testability)
#[derive(Clone)]
pub struct ServiceDeps {
    pub pam: Arc<dyn BasePamClient>,
    pub directory: Arc<dyn BaseDirectoryClient>,
}

impl ServiceDeps {
    pub fn new(pam: Arc<dyn BasePamClient>, directory: Arc<dyn BaseDirectoryClient>) -> Self {
        Self { pam, directory }
    }

    /// Production clients. Nothing is contacted yet; the first gateway call logs in.
    pub fn from_config(config: &Config) -> Result<Self, ConfigError> {
        let credentials = match &config.safeguard_auth {
            SafeguardAuth::Password { username, password } => Credentials::Password {
                username: username.clone(),
                password: password.clone(),
            },
            SafeguardAuth::CertificateFile { path, password } => {
                let pkcs12 = std::fs::read(path).map_err(|e| ConfigError {
                    key: "SAFEGUARD_CERTIFICATE_FILE",
                    reason: format!("could not be read ({}): {}", path.display(), e),
                })?;
                Credentials::Certificate {
                    pkcs12,
                    password: password.clone(),
                }
            }
        };

        let client = SafeguardClient::new(SafeguardOptions {
            appliance: config.safeguard_appliance.clone(),
            credentials,
            ignore_ssl: config.safeguard_ignore_ssl,
        })
        .map_err(|e| ConfigError {
            key: "SAFEGUARD_CERTIFICATE_FILE",
            reason: format!("is not usable: {}", e),
        })?;

        let pam = SafeguardAdapter::new(
            Arc::new(client),
            config.event_relay_addr,
            config.event_relay_token.clone(),
        );
        let directory = LdapDirectoryClient::new(LdapDirectoryOptions::from_config(config));

        Ok(Self::new(Arc::new(pam), Arc::new(directory)))
    }
}
