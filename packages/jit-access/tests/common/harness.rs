//! Test harness wiring the service to in-memory remote systems.

use jit_access::kernel::test_dependencies::{MockDirectoryClient, MockPamClient};
use jit_access::kernel::TestDependencies;
use jit_access::server::{AccessService, ServiceSettings};

use super::fixtures::{auditor, ACCESS_ATTRIBUTE, STRING_SYNTAX};

pub struct TestHarness {
    pub deps: TestDependencies,
    pub service: AccessService,
}

impl TestHarness {
    /// Service over the given mocks.
    pub fn new(pam: MockPamClient, directory: MockDirectoryClient, test_mode: bool) -> Self {
        init_tracing();
        let deps = TestDependencies::new(pam, directory);
        let service = AccessService::new(
            deps.deps(),
            ServiceSettings {
                access_attribute: ACCESS_ATTRIBUTE.to_string(),
                queue_capacity: 8,
                test_mode,
            },
        );
        Self { deps, service }
    }

    /// An Auditor identity and a directory that knows the access attribute.
    pub fn healthy(pam: MockPamClient) -> Self {
        Self::new(
            pam.with_user(auditor()),
            MockDirectoryClient::new().with_attribute(ACCESS_ATTRIBUTE, STRING_SYNTAX),
            false,
        )
    }
}

/// Respect RUST_LOG in tests. Run with: RUST_LOG=debug cargo test -- --nocapture
fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}
