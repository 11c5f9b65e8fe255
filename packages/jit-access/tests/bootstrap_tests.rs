//! Identity verification and subscription registration.

mod common;

use std::sync::Arc;

use crate::common::{auditor, existing_subscription, user_with_roles};
use jit_access::common::{
    ErrorKind, EventSubscription, ProviderError, StartupError, ACCESS_REQUEST_EVENTS,
    SUBSCRIPTION_DESCRIPTION, SUBSCRIPTION_TYPE,
};
use jit_access::domains::access::{BootstrapOutcome, SubscriptionBootstrapper};
use jit_access::kernel::test_dependencies::MockPamClient;
use jit_access::kernel::{AuthenticatedGateway, BasePamClient};

fn bootstrapper(pam: Arc<MockPamClient>) -> SubscriptionBootstrapper {
    let pam: Arc<dyn BasePamClient> = pam;
    SubscriptionBootstrapper::new(Arc::new(AuthenticatedGateway::new("safeguard", pam)))
}

#[tokio::test]
async fn test_missing_subscription_is_created_with_six_events() {
    let pam = Arc::new(MockPamClient::new().with_user(auditor()));

    let user = bootstrapper(pam.clone()).run().await.unwrap();

    let created = pam.created_subscriptions();
    assert_eq!(created.len(), 1);
    let subscription = &created[0];
    assert_eq!(subscription.description, SUBSCRIPTION_DESCRIPTION);
    assert_eq!(subscription.subscription_type, SUBSCRIPTION_TYPE);
    assert_eq!(subscription.user_id, user.id);
    let names: Vec<&str> = subscription.events.iter().map(|e| e.name.as_str()).collect();
    assert_eq!(names, ACCESS_REQUEST_EVENTS);
}

#[tokio::test]
async fn test_bootstrap_is_idempotent() {
    let pam = Arc::new(MockPamClient::new().with_user(auditor()));
    let bootstrapper = bootstrapper(pam.clone());

    let user = bootstrapper.verify_identity().await.unwrap();
    assert_eq!(
        bootstrapper.ensure_subscription(&user).await.unwrap(),
        BootstrapOutcome::Created
    );
    assert!(matches!(
        bootstrapper.ensure_subscription(&user).await.unwrap(),
        BootstrapOutcome::Existing { .. }
    ));

    assert_eq!(pam.call_count("create_event_subscription"), 1);
}

#[tokio::test]
async fn test_existing_subscription_is_reused() {
    let pam = Arc::new(
        MockPamClient::new()
            .with_user(auditor())
            .with_subscription(existing_subscription(&auditor())),
    );

    bootstrapper(pam.clone()).run().await.unwrap();

    assert_eq!(pam.call_count("create_event_subscription"), 0);
}

#[tokio::test]
async fn test_other_subscriptions_do_not_count() {
    let mut unrelated = EventSubscription::for_access_requests(&auditor());
    unrelated.id = Some("9".to_string());
    unrelated.description = "PasswordChangeAlerts".to_string();
    let pam = Arc::new(
        MockPamClient::new()
            .with_user(auditor())
            .with_subscription(unrelated),
    );

    bootstrapper(pam.clone()).run().await.unwrap();

    assert_eq!(pam.created_subscriptions().len(), 1);
}

#[tokio::test]
async fn test_missing_auditor_role_fails_before_listing() {
    let pam = Arc::new(MockPamClient::new().with_user(user_with_roles(&["AssetAdmin"])));

    let err = bootstrapper(pam.clone()).run().await.unwrap_err();

    match err {
        StartupError::AuthorizationInsufficient { username, role } => {
            assert_eq!(username, "jit-svc");
            assert_eq!(role, "Auditor");
        }
        other => panic!("unexpected error: {:?}", other),
    }
    assert_eq!(pam.call_count("event_subscriptions"), 0);
    assert_eq!(pam.call_count("create_event_subscription"), 0);
}

#[tokio::test]
async fn test_extra_admin_roles_are_allowed() {
    let pam = Arc::new(
        MockPamClient::new().with_user(user_with_roles(&["Auditor", "GlobalAdmin", "UserAdmin"])),
    );

    let user = bootstrapper(pam).run().await.unwrap();

    assert!(user.has_role("GlobalAdmin"));
}

#[tokio::test]
async fn test_expired_token_is_refreshed_before_first_call() {
    let pam = Arc::new(
        MockPamClient::new()
            .with_user(auditor())
            .with_lifetime(std::time::Duration::ZERO),
    );

    bootstrapper(pam.clone()).verify_identity().await.unwrap();

    let calls = pam.calls();
    assert_eq!(calls[..3], ["remaining_lifetime", "remaining_lifetime", "refresh"]);
    assert_eq!(calls[3], "current_user");
}

#[tokio::test]
async fn test_listing_failure_is_classified() {
    let pam = Arc::new(MockPamClient::new().with_user(auditor()).fail(
        "event_subscriptions",
        ProviderError::Http {
            status: 403,
            detail: "forbidden".to_string(),
        },
    ));

    let err = bootstrapper(pam).run().await.unwrap_err();

    match err {
        StartupError::Provider(e) => assert_eq!(e.kind, ErrorKind::AccessDenied),
        other => panic!("unexpected error: {:?}", other),
    }
}
