//! Event dispatcher - turns access request lifecycle events into flag writes
//!
//! One dispatcher consumes the event queue. Each event is handled to
//! completion before the next is received; a failed event is logged and
//! dropped, and the loop carries on.

use std::sync::Arc;

use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use super::mutate::AttributeMutator;
use crate::common::{AccessDecision, AccessRequestEvent, ClassifiedError, ObjectRef};
use crate::kernel::{AuthenticatedGateway, BasePamClient, EventReceiver, PushedEvent};

#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("Invalid {event} payload: {reason}")]
    InvalidPayload { event: String, reason: String },

    #[error("Account {account_id} has no distinguished name")]
    MissingDistinguishedName { account_id: String },

    #[error(transparent)]
    Provider(#[from] ClassifiedError),
}

/// What happened to a single event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DispatchOutcome {
    /// The flag was written.
    Applied {
        decision: AccessDecision,
        account_id: String,
        distinguished_name: String,
    },
    /// The account is not an Active Directory account.
    IgnoredPlatform {
        account_id: String,
        platform_type: String,
    },
    /// The event name is not one this integration acts on.
    IgnoredEvent { event_name: String },
}

/// Counters for one run of the dispatch loop.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DispatchStats {
    pub applied: usize,
    pub ignored: usize,
    pub failed: usize,
}

impl DispatchStats {
    pub fn handled(&self) -> usize {
        self.applied + self.ignored + self.failed
    }
}

pub struct EventDispatcher {
    pam: Arc<AuthenticatedGateway<dyn BasePamClient>>,
    mutator: AttributeMutator,
}

impl EventDispatcher {
    pub fn new(pam: Arc<AuthenticatedGateway<dyn BasePamClient>>, mutator: AttributeMutator) -> Self {
        Self { pam, mutator }
    }

    /// Handle one event. The decision comes from the name the event was delivered under.
    pub async fn handle(&self, event: &PushedEvent) -> Result<DispatchOutcome, DispatchError> {
        let Some(decision) = AccessDecision::for_event(&event.name) else {
            debug!(event = %event.name, "Ignoring unhandled event");
            return Ok(DispatchOutcome::IgnoredEvent {
                event_name: event.name.clone(),
            });
        };

        let payload: AccessRequestEvent =
            serde_json::from_str(&event.body).map_err(|e| DispatchError::InvalidPayload {
                event: event.name.clone(),
                reason: e.to_string(),
            })?;

        let account_id = payload.account_id;
        let account = self
            .pam
            .call(&ObjectRef::object(&account_id), |pam| {
                pam.asset_account(&account_id)
            })
            .await?;

        if !account.is_microsoft_ad() {
            debug!(
                event = %event.name,
                account_id = %account.id,
                platform_type = %account.platform_type,
                "Ignoring account that is not an Active Directory account"
            );
            return Ok(DispatchOutcome::IgnoredPlatform {
                account_id: account.id,
                platform_type: account.platform_type,
            });
        }

        if account.distinguished_name.is_empty() {
            return Err(DispatchError::MissingDistinguishedName {
                account_id: account.id,
            });
        }

        self.mutator
            .set_access_flag(&account.distinguished_name, decision)
            .await?;

        info!(
            event = %event.name,
            %decision,
            account = %account.name,
            domain = account.domain_name.as_deref().unwrap_or(""),
            distinguished_name = %account.distinguished_name,
            attribute = %self.mutator.attribute(),
            "Access flag updated"
        );

        Ok(DispatchOutcome::Applied {
            decision,
            account_id: account.id,
            distinguished_name: account.distinguished_name,
        })
    }

    /// Consume `events` until the queue closes or `shutdown` fires.
    ///
    /// Shutdown is only observed between events; an event being handled
    /// always runs to completion.
    pub async fn run(&self, mut events: EventReceiver, shutdown: CancellationToken) -> DispatchStats {
        let mut stats = DispatchStats::default();

        loop {
            let event = tokio::select! {
                biased;
                _ = shutdown.cancelled() => {
                    events.close();
                    break;
                }
                next = events.recv() => match next {
                    Some(event) => event,
                    None => break,
                },
            };

            match self.handle(&event).await {
                Ok(DispatchOutcome::Applied { .. }) => stats.applied += 1,
                Ok(_) => stats.ignored += 1,
                Err(e) => {
                    stats.failed += 1;
                    log_failure(&event, &e);
                }
            }
        }

        info!(
            applied = stats.applied,
            ignored = stats.ignored,
            failed = stats.failed,
            "Event dispatcher stopped"
        );
        stats
    }
}

fn log_failure(event: &PushedEvent, failure: &DispatchError) {
    match failure {
        DispatchError::Provider(e) => {
            let object_ref = e.object_ref.clone().unwrap_or_default();
            error!(
                event = %event.name,
                kind = %e.kind,
                object_dn = object_ref.object_dn.as_deref().unwrap_or(""),
                attribute = object_ref.attribute_name.as_deref().unwrap_or(""),
                value = object_ref.attribute_value.as_deref().unwrap_or(""),
                error = %e.message,
                "Failed to handle access request event"
            );
        }
        other => {
            error!(event = %event.name, error = %other, "Failed to handle access request event");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::{AssetAccount, ErrorKind, MICROSOFT_AD_PLATFORM};
    use crate::kernel::test_dependencies::{MockDirectoryClient, MockPamClient};

    const ATTRIBUTE: &str = "extensionAttribute1";

    fn account(id: &str, platform: &str) -> AssetAccount {
        AssetAccount {
            id: id.to_string(),
            name: "jdoe".to_string(),
            domain_name: Some("x.example".to_string()),
            distinguished_name: "CN=jdoe,OU=Users,DC=x".to_string(),
            platform_type: platform.to_string(),
        }
    }

    fn dispatcher(pam: MockPamClient, directory: Arc<MockDirectoryClient>) -> EventDispatcher {
        let pam: Arc<dyn BasePamClient> = Arc::new(pam);
        EventDispatcher::new(
            Arc::new(AuthenticatedGateway::new("safeguard", pam)),
            AttributeMutator::new(directory, ATTRIBUTE),
        )
    }

    #[tokio::test]
    async fn test_unhandled_event_name_is_ignored_without_lookup() {
        let directory = Arc::new(MockDirectoryClient::new());
        let dispatcher = dispatcher(MockPamClient::new(), directory.clone());

        let outcome = dispatcher
            .handle(&PushedEvent::new("AccessRequestPending", r#"{"AccountId": 1}"#))
            .await
            .unwrap();

        assert_eq!(
            outcome,
            DispatchOutcome::IgnoredEvent {
                event_name: "AccessRequestPending".to_string()
            }
        );
        assert!(directory.calls().is_empty());
    }

    #[tokio::test]
    async fn test_invalid_payload_is_rejected() {
        let directory = Arc::new(MockDirectoryClient::new());
        let dispatcher = dispatcher(MockPamClient::new(), directory);

        let err = dispatcher
            .handle(&PushedEvent::new("AccessRequestAvailable", "not json"))
            .await
            .unwrap_err();

        assert!(matches!(err, DispatchError::InvalidPayload { .. }));
    }

    #[tokio::test]
    async fn test_null_account_id_is_invalid_payload_without_lookup() {
        let pam = Arc::new(MockPamClient::new());
        let directory = Arc::new(MockDirectoryClient::new());
        let pam_dyn: Arc<dyn BasePamClient> = pam.clone();
        let dispatcher = EventDispatcher::new(
            Arc::new(AuthenticatedGateway::new("safeguard", pam_dyn)),
            AttributeMutator::new(directory.clone(), ATTRIBUTE),
        );

        let err = dispatcher
            .handle(&PushedEvent::new("AccessRequestAvailable", r#"{"AccountId": null}"#))
            .await
            .unwrap_err();

        assert!(matches!(err, DispatchError::InvalidPayload { .. }));
        assert_eq!(pam.call_count("asset_account"), 0);
        assert!(directory.calls().is_empty());
    }

    #[tokio::test]
    async fn test_missing_account_is_object_not_found() {
        let directory = Arc::new(MockDirectoryClient::new());
        let dispatcher = dispatcher(MockPamClient::new(), directory.clone());

        let err = dispatcher
            .handle(&PushedEvent::new("AccessRequestAvailable", r#"{"AccountId": 404}"#))
            .await
            .unwrap_err();

        match err {
            DispatchError::Provider(e) => assert_eq!(e.kind, ErrorKind::ObjectNotFound),
            other => panic!("unexpected error: {:?}", other),
        }
        assert!(directory.writes().is_empty());
    }

    #[tokio::test]
    async fn test_account_without_dn_is_reported() {
        let mut ad_account = account("9", MICROSOFT_AD_PLATFORM);
        ad_account.distinguished_name = String::new();
        let directory = Arc::new(MockDirectoryClient::new());
        let dispatcher = dispatcher(MockPamClient::new().with_account(ad_account), directory.clone());

        let err = dispatcher
            .handle(&PushedEvent::new("AccessRequestAvailable", r#"{"AccountId": "9"}"#))
            .await
            .unwrap_err();

        assert!(matches!(err, DispatchError::MissingDistinguishedName { .. }));
        assert!(directory.writes().is_empty());
    }

    #[tokio::test]
    async fn test_expired_pam_token_is_refreshed_before_lookup() {
        let pam = MockPamClient::new()
            .with_account(account("7", MICROSOFT_AD_PLATFORM))
            .with_lifetime(std::time::Duration::ZERO);
        let pam = Arc::new(pam);
        let directory = Arc::new(MockDirectoryClient::new());
        let pam_dyn: Arc<dyn BasePamClient> = pam.clone();
        let dispatcher = EventDispatcher::new(
            Arc::new(AuthenticatedGateway::new("safeguard", pam_dyn)),
            AttributeMutator::new(directory.clone(), ATTRIBUTE),
        );

        dispatcher
            .handle(&PushedEvent::new("AccessRequestExpired", r#"{"AccountId": 7}"#))
            .await
            .unwrap();

        let calls = pam.calls();
        let refresh = calls.iter().position(|c| c == "refresh").unwrap();
        let lookup = calls.iter().position(|c| c == "asset_account").unwrap();
        assert!(refresh < lookup);
        assert_eq!(directory.writes()[0].value, "false");
    }
}
