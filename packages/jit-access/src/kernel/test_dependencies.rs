// TestDependencies - mock implementations for testing
//
// Provides in-memory remote clients that can be injected into ServiceDeps for tests.
// Every mock records its calls so tests can assert on order and count.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;

use super::{
    BaseCredentialSource, BaseDirectoryClient, BaseEventListener, BasePamClient, EventSender,
    PushedEvent, ServiceDeps,
};
use crate::common::{AssetAccount, AuthenticatedUser, EventSubscription, ProviderError};

/// Lifetime a mock credential has after a refresh.
const REFRESHED_LIFETIME: Duration = Duration::from_secs(3600);

// =============================================================================
// Mock Directory Client
// =============================================================================

/// An attribute write captured by the mock directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttributeWrite {
    pub object_dn: String,
    pub attribute: String,
    pub value: String,
}

pub struct MockDirectoryClient {
    lifetime: Mutex<Duration>,
    refresh_delay: Duration,
    refresh_failure: Mutex<Option<ProviderError>>,
    write_failures: Mutex<VecDeque<ProviderError>>,
    schema: Mutex<HashMap<String, u32>>,
    schema_failure: Mutex<Option<ProviderError>>,
    writes: Mutex<Vec<AttributeWrite>>,
    calls: Mutex<Vec<String>>,
    refreshes: AtomicUsize,
}

impl MockDirectoryClient {
    pub fn new() -> Self {
        Self {
            lifetime: Mutex::new(REFRESHED_LIFETIME),
            refresh_delay: Duration::ZERO,
            refresh_failure: Mutex::new(None),
            write_failures: Mutex::new(VecDeque::new()),
            schema: Mutex::new(HashMap::new()),
            schema_failure: Mutex::new(None),
            writes: Mutex::new(Vec::new()),
            calls: Mutex::new(Vec::new()),
            refreshes: AtomicUsize::new(0),
        }
    }

    pub fn with_lifetime(self, lifetime: Duration) -> Self {
        *self.lifetime.lock().unwrap() = lifetime;
        self
    }

    /// Make refresh take a while (to widen race windows in concurrency tests).
    pub fn with_refresh_delay(mut self, delay: Duration) -> Self {
        self.refresh_delay = delay;
        self
    }

    /// Register `attribute` in the schema with the given oMSyntax.
    pub fn with_attribute(self, attribute: &str, syntax: u32) -> Self {
        self.schema
            .lock()
            .unwrap()
            .insert(attribute.to_string(), syntax);
        self
    }

    pub fn fail_refresh(self, error: ProviderError) -> Self {
        *self.refresh_failure.lock().unwrap() = Some(error);
        self
    }

    /// Fail the next write with `error`. Queued failures are consumed in order.
    pub fn fail_next_write(self, error: ProviderError) -> Self {
        self.write_failures.lock().unwrap().push_back(error);
        self
    }

    pub fn fail_schema_lookup(self, error: ProviderError) -> Self {
        *self.schema_failure.lock().unwrap() = Some(error);
        self
    }

    /// Expire the current credential.
    pub fn expire(&self) {
        *self.lifetime.lock().unwrap() = Duration::ZERO;
    }

    /// Writes that reached the directory (failed writes are not recorded).
    pub fn writes(&self) -> Vec<AttributeWrite> {
        self.writes.lock().unwrap().clone()
    }

    /// Operation names in call order.
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    pub fn call_count(&self, operation: &str) -> usize {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|c| c.as_str() == operation)
            .count()
    }

    pub fn refresh_count(&self) -> usize {
        self.refreshes.load(Ordering::SeqCst)
    }

    fn record(&self, operation: &str) {
        self.calls.lock().unwrap().push(operation.to_string());
    }
}

impl Default for MockDirectoryClient {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl BaseCredentialSource for MockDirectoryClient {
    async fn remaining_lifetime(&self) -> Result<Duration, ProviderError> {
        self.record("remaining_lifetime");
        Ok(*self.lifetime.lock().unwrap())
    }

    async fn refresh(&self) -> Result<(), ProviderError> {
        self.record("refresh");
        if !self.refresh_delay.is_zero() {
            tokio::time::sleep(self.refresh_delay).await;
        }
        if let Some(error) = self.refresh_failure.lock().unwrap().clone() {
            return Err(error);
        }
        self.refreshes.fetch_add(1, Ordering::SeqCst);
        *self.lifetime.lock().unwrap() = REFRESHED_LIFETIME;
        Ok(())
    }
}

#[async_trait]
impl BaseDirectoryClient for MockDirectoryClient {
    async fn set_attribute(
        &self,
        object_dn: &str,
        attribute: &str,
        value: &str,
    ) -> Result<(), ProviderError> {
        self.record("set_attribute");
        if let Some(error) = self.write_failures.lock().unwrap().pop_front() {
            return Err(error);
        }
        self.writes.lock().unwrap().push(AttributeWrite {
            object_dn: object_dn.to_string(),
            attribute: attribute.to_string(),
            value: value.to_string(),
        });
        Ok(())
    }

    async fn attribute_schema_syntax(&self, attribute: &str) -> Result<u32, ProviderError> {
        self.record("attribute_schema_syntax");
        if let Some(error) = self.schema_failure.lock().unwrap().clone() {
            return Err(error);
        }
        Ok(self
            .schema
            .lock()
            .unwrap()
            .get(attribute)
            .copied()
            .unwrap_or(0))
    }
}

// =============================================================================
// Mock Event Listener
// =============================================================================

#[derive(Default)]
struct ListenerState {
    routes: Mutex<Vec<(String, EventSender)>>,
    started: AtomicBool,
    stopped: AtomicBool,
    start_failure: Mutex<Option<ProviderError>>,
    stop_failure: Mutex<Option<ProviderError>>,
}

/// Test-side handle onto the listener a `MockPamClient` hands out.
#[derive(Clone, Default)]
pub struct MockListenerHandle {
    state: Arc<ListenerState>,
}

impl MockListenerHandle {
    /// Event names with a registered handler, in registration order.
    pub fn registered_events(&self) -> Vec<String> {
        self.state
            .routes
            .lock()
            .unwrap()
            .iter()
            .map(|(name, _)| name.clone())
            .collect()
    }

    pub fn is_started(&self) -> bool {
        self.state.started.load(Ordering::SeqCst)
    }

    pub fn is_stopped(&self) -> bool {
        self.state.stopped.load(Ordering::SeqCst)
    }

    pub fn fail_start(&self, error: ProviderError) {
        *self.state.start_failure.lock().unwrap() = Some(error);
    }

    pub fn fail_stop(&self, error: ProviderError) {
        *self.state.stop_failure.lock().unwrap() = Some(error);
    }

    /// Deliver an event the way the transport would. Returns false if no handler
    /// is registered for `name` or the queue is closed.
    pub async fn push(&self, name: &str, body: &str) -> bool {
        let sink = self
            .state
            .routes
            .lock()
            .unwrap()
            .iter()
            .find(|(registered, _)| registered == name)
            .map(|(_, sink)| sink.clone());

        match sink {
            Some(sink) => sink.send(PushedEvent::new(name, body)).await.is_ok(),
            None => false,
        }
    }

    /// Drop every registered sender so the dispatcher's queue can close.
    pub fn disconnect(&self) {
        self.state.routes.lock().unwrap().clear();
    }
}

pub struct MockEventListener {
    state: Arc<ListenerState>,
}

#[async_trait]
impl BaseEventListener for MockEventListener {
    fn register_handler(&mut self, event_name: &str, sink: EventSender) {
        self.state
            .routes
            .lock()
            .unwrap()
            .push((event_name.to_string(), sink));
    }

    async fn start(&mut self) -> Result<(), ProviderError> {
        if let Some(error) = self.state.start_failure.lock().unwrap().clone() {
            return Err(error);
        }
        self.state.started.store(true, Ordering::SeqCst);
        Ok(())
    }

    async fn stop(&mut self) -> Result<(), ProviderError> {
        if let Some(error) = self.state.stop_failure.lock().unwrap().clone() {
            return Err(error);
        }
        self.state.stopped.store(true, Ordering::SeqCst);
        self.state.routes.lock().unwrap().clear();
        Ok(())
    }
}

// =============================================================================
// Mock PAM Client
// =============================================================================

pub struct MockPamClient {
    lifetime: Mutex<Duration>,
    refreshes: AtomicUsize,
    user: Mutex<Option<AuthenticatedUser>>,
    accounts: Mutex<HashMap<String, AssetAccount>>,
    subscriptions: Mutex<Vec<EventSubscription>>,
    created: Mutex<Vec<EventSubscription>>,
    failures: Mutex<HashMap<&'static str, ProviderError>>,
    listener: MockListenerHandle,
    calls: Mutex<Vec<String>>,
}

impl MockPamClient {
    pub fn new() -> Self {
        Self {
            lifetime: Mutex::new(REFRESHED_LIFETIME),
            refreshes: AtomicUsize::new(0),
            user: Mutex::new(None),
            accounts: Mutex::new(HashMap::new()),
            subscriptions: Mutex::new(Vec::new()),
            created: Mutex::new(Vec::new()),
            failures: Mutex::new(HashMap::new()),
            listener: MockListenerHandle::default(),
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn with_user(self, user: AuthenticatedUser) -> Self {
        *self.user.lock().unwrap() = Some(user);
        self
    }

    pub fn with_account(self, account: AssetAccount) -> Self {
        self.accounts
            .lock()
            .unwrap()
            .insert(account.id.clone(), account);
        self
    }

    /// Seed a subscription that already exists on the appliance.
    pub fn with_subscription(self, subscription: EventSubscription) -> Self {
        self.subscriptions.lock().unwrap().push(subscription);
        self
    }

    pub fn with_lifetime(self, lifetime: Duration) -> Self {
        *self.lifetime.lock().unwrap() = lifetime;
        self
    }

    /// Fail every call to `operation` (trait method name) with `error`.
    pub fn fail(self, operation: &'static str, error: ProviderError) -> Self {
        self.failures.lock().unwrap().insert(operation, error);
        self
    }

    pub fn listener(&self) -> MockListenerHandle {
        self.listener.clone()
    }

    pub fn created_subscriptions(&self) -> Vec<EventSubscription> {
        self.created.lock().unwrap().clone()
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    pub fn call_count(&self, operation: &str) -> usize {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|c| c.as_str() == operation)
            .count()
    }

    pub fn refresh_count(&self) -> usize {
        self.refreshes.load(Ordering::SeqCst)
    }

    fn record(&self, operation: &'static str) -> Result<(), ProviderError> {
        self.calls.lock().unwrap().push(operation.to_string());
        match self.failures.lock().unwrap().get(operation) {
            Some(error) => Err(error.clone()),
            None => Ok(()),
        }
    }
}

impl Default for MockPamClient {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl BaseCredentialSource for MockPamClient {
    async fn remaining_lifetime(&self) -> Result<Duration, ProviderError> {
        self.record("remaining_lifetime")?;
        Ok(*self.lifetime.lock().unwrap())
    }

    async fn refresh(&self) -> Result<(), ProviderError> {
        self.record("refresh")?;
        self.refreshes.fetch_add(1, Ordering::SeqCst);
        *self.lifetime.lock().unwrap() = REFRESHED_LIFETIME;
        Ok(())
    }
}

#[async_trait]
impl BasePamClient for MockPamClient {
    async fn asset_account(&self, account_id: &str) -> Result<AssetAccount, ProviderError> {
        self.record("asset_account")?;
        self.accounts
            .lock()
            .unwrap()
            .get(account_id)
            .cloned()
            .ok_or_else(|| ProviderError::Http {
                status: 404,
                detail: format!("AssetAccounts/{} not found", account_id),
            })
    }

    async fn current_user(&self) -> Result<AuthenticatedUser, ProviderError> {
        self.record("current_user")?;
        self.user
            .lock()
            .unwrap()
            .clone()
            .ok_or_else(|| ProviderError::Http {
                status: 401,
                detail: "no user configured".to_string(),
            })
    }

    async fn event_subscriptions(
        &self,
        user: &AuthenticatedUser,
    ) -> Result<Vec<EventSubscription>, ProviderError> {
        self.record("event_subscriptions")?;
        Ok(self
            .subscriptions
            .lock()
            .unwrap()
            .iter()
            .filter(|s| s.user_id == user.id)
            .cloned()
            .collect())
    }

    async fn create_event_subscription(
        &self,
        subscription: &EventSubscription,
    ) -> Result<(), ProviderError> {
        self.record("create_event_subscription")?;
        let mut stored = subscription.clone();
        let mut subscriptions = self.subscriptions.lock().unwrap();
        stored.id = Some(format!("{}", subscriptions.len() + 1));
        subscriptions.push(stored);
        self.created.lock().unwrap().push(subscription.clone());
        Ok(())
    }

    async fn event_listener(&self) -> Result<Box<dyn BaseEventListener>, ProviderError> {
        self.record("event_listener")?;
        Ok(Box::new(MockEventListener {
            state: self.listener.state.clone(),
        }))
    }
}

// =============================================================================
// TestDependencies
// =============================================================================

/// Mocks plus the `ServiceDeps` built from them.
pub struct TestDependencies {
    pub pam: Arc<MockPamClient>,
    pub directory: Arc<MockDirectoryClient>,
}

impl TestDependencies {
    pub fn new(pam: MockPamClient, directory: MockDirectoryClient) -> Self {
        Self {
            pam: Arc::new(pam),
            directory: Arc::new(directory),
        }
    }

    pub fn deps(&self) -> ServiceDeps {
        ServiceDeps::new(self.pam.clone(), self.directory.clone())
    }
}
