//! Service lifecycle: startup validation, test mode, listening and stop.

mod common;

use crate::common::{ad_account, auditor, event_body, user_with_roles, TestHarness, JDOE_DN};
use jit_access::common::{ErrorKind, ProviderError, StartupError, ACCESS_REQUEST_EVENTS};
use jit_access::kernel::test_dependencies::{MockDirectoryClient, MockPamClient};
use jit_access::server::ServiceState;

#[tokio::test]
async fn test_service_starts_listening_with_all_handlers() {
    let mut harness = TestHarness::healthy(MockPamClient::new());
    assert_eq!(harness.service.state(), ServiceState::Uninitialized);

    let state = harness.service.start().await.unwrap();

    assert_eq!(state, ServiceState::Listening);
    let listener = harness.deps.pam.listener();
    assert!(listener.is_started());
    assert_eq!(listener.registered_events(), ACCESS_REQUEST_EVENTS);
}

#[tokio::test]
async fn test_test_mode_stops_before_listening() {
    let mut harness = TestHarness::new(
        MockPamClient::new().with_user(auditor()),
        MockDirectoryClient::new().with_attribute(common::ACCESS_ATTRIBUTE, 64),
        true,
    );

    let state = harness.service.start().await.unwrap();

    assert_eq!(state, ServiceState::TestStopped);
    assert_eq!(harness.deps.pam.call_count("event_listener"), 0);
    assert!(!harness.deps.pam.listener().is_started());
    // Bootstrap still ran.
    assert_eq!(harness.deps.pam.created_subscriptions().len(), 1);
}

#[tokio::test]
async fn test_missing_schema_attribute_fails_start() {
    let mut harness = TestHarness::new(
        MockPamClient::new().with_user(auditor()),
        MockDirectoryClient::new(),
        false,
    );

    let err = harness.service.start().await.unwrap_err();

    match err {
        StartupError::Provider(e) => assert_eq!(e.kind, ErrorKind::SchemaMissing),
        other => panic!("unexpected error: {:?}", other),
    }
    assert_eq!(harness.service.state(), ServiceState::FailedStart);
    assert_eq!(harness.deps.pam.call_count("current_user"), 0);
}

#[tokio::test]
async fn test_insufficient_role_fails_start() {
    let mut harness = TestHarness::new(
        MockPamClient::new().with_user(user_with_roles(&[])),
        MockDirectoryClient::new().with_attribute(common::ACCESS_ATTRIBUTE, 64),
        false,
    );

    let err = harness.service.start().await.unwrap_err();

    assert!(matches!(err, StartupError::AuthorizationInsufficient { .. }));
    assert_eq!(harness.service.state(), ServiceState::FailedStart);
    assert_eq!(harness.deps.pam.call_count("event_listener"), 0);
}

#[tokio::test]
async fn test_listener_start_failure_fails_start() {
    let mut harness = TestHarness::healthy(MockPamClient::new());
    harness
        .deps
        .pam
        .listener()
        .fail_start(ProviderError::Unreachable("relay port in use".to_string()));

    let err = harness.service.start().await.unwrap_err();

    match err {
        StartupError::Provider(e) => {
            assert_eq!(e.kind, ErrorKind::ProviderUnavailable);
            assert!(e.message.starts_with("Starting the event listener"));
        }
        other => panic!("unexpected error: {:?}", other),
    }
    assert_eq!(harness.service.state(), ServiceState::FailedStart);
}

#[tokio::test]
async fn test_stop_closes_listener_and_dispatcher() {
    let mut harness =
        TestHarness::healthy(MockPamClient::new().with_account(ad_account("42", JDOE_DN)));
    harness.service.start().await.unwrap();

    let listener = harness.deps.pam.listener();
    assert!(
        listener
            .push("AccessRequestAvailable", &event_body("AccessRequestAvailable", "42"))
            .await
    );

    let stats = harness.service.stop().await.unwrap();

    assert_eq!(harness.service.state(), ServiceState::Stopped);
    assert!(listener.is_stopped());
    assert!(stats.is_some());
    assert!(
        !listener
            .push("AccessRequestClosed", &event_body("AccessRequestClosed", "42"))
            .await,
        "no handler may accept events after stop"
    );
}

#[tokio::test]
async fn test_second_start_is_a_no_op() {
    let mut harness = TestHarness::healthy(MockPamClient::new());
    harness.service.start().await.unwrap();

    assert_eq!(harness.service.start().await.unwrap(), ServiceState::Listening);
    assert_eq!(harness.deps.pam.call_count("event_listener"), 1);
}

#[tokio::test]
async fn test_listener_stop_failure_still_stops_dispatcher() {
    let mut harness =
        TestHarness::healthy(MockPamClient::new().with_account(ad_account("42", JDOE_DN)));
    harness.service.start().await.unwrap();

    let listener = harness.deps.pam.listener();
    listener.fail_stop(ProviderError::Unreachable("relay task panicked".to_string()));

    let err = harness.service.stop().await.unwrap_err();

    assert_eq!(err, ProviderError::Unreachable("relay task panicked".to_string()));
    assert_eq!(harness.service.state(), ServiceState::Stopped);
    assert!(
        harness.service.wait().await.is_none(),
        "dispatcher must already be joined"
    );
    // The listener never closed its handlers, but nothing consumes the queue any more.
    assert!(
        !listener
            .push("AccessRequestAvailable", &event_body("AccessRequestAvailable", "42"))
            .await
    );
    assert!(harness.deps.directory.writes().is_empty());
}

#[tokio::test]
async fn test_start_after_failed_start_is_an_error() {
    let mut harness = TestHarness::new(
        MockPamClient::new().with_user(user_with_roles(&[])),
        MockDirectoryClient::new().with_attribute(common::ACCESS_ATTRIBUTE, 64),
        false,
    );
    harness.service.start().await.unwrap_err();

    let err = harness.service.start().await.unwrap_err();

    assert!(matches!(err, StartupError::NotStartable { ref state } if state == "failed_start"));
    assert_eq!(harness.service.state(), ServiceState::FailedStart);
    assert_eq!(harness.deps.pam.call_count("current_user"), 1);
}
