//! Service lifecycle.
//!
//! ```text
//! Uninitialized → Ready → TestStopped
//!                       → Listening → Stopped
//! any startup failure   → FailedStart
//! ```

use std::fmt;
use std::sync::Arc;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::common::classifier;
use crate::common::{ObjectRef, ProviderError, StartupError, ACCESS_REQUEST_EVENTS};
use crate::config::Config;
use crate::domains::access::{
    AttributeMutator, DispatchStats, EventDispatcher, SubscriptionBootstrapper,
};
use crate::kernel::{
    event_queue, AuthenticatedGateway, BaseEventListener, BasePamClient, ServiceDeps,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServiceState {
    Uninitialized,
    Ready,
    TestStopped,
    Listening,
    Stopped,
    FailedStart,
}

impl fmt::Display for ServiceState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ServiceState::Uninitialized => "uninitialized",
            ServiceState::Ready => "ready",
            ServiceState::TestStopped => "test_stopped",
            ServiceState::Listening => "listening",
            ServiceState::Stopped => "stopped",
            ServiceState::FailedStart => "failed_start",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone)]
pub struct ServiceSettings {
    pub access_attribute: String,
    pub queue_capacity: usize,
    /// Validate startup, then stop before opening the listener.
    pub test_mode: bool,
}

impl ServiceSettings {
    pub fn from_config(config: &Config, test_mode: bool) -> Self {
        Self {
            access_attribute: config.access_attribute.clone(),
            queue_capacity: config.event_queue_capacity,
            test_mode,
        }
    }
}

pub struct AccessService {
    deps: ServiceDeps,
    settings: ServiceSettings,
    state: ServiceState,
    listener: Option<Box<dyn BaseEventListener>>,
    dispatcher: Option<JoinHandle<DispatchStats>>,
    shutdown: CancellationToken,
}

impl AccessService {
    pub fn new(deps: ServiceDeps, settings: ServiceSettings) -> Self {
        Self {
            deps,
            settings,
            state: ServiceState::Uninitialized,
            listener: None,
            dispatcher: None,
            shutdown: CancellationToken::new(),
        }
    }

    pub fn state(&self) -> ServiceState {
        self.state
    }

    /// Validate both remote systems and, outside test mode, start listening.
    ///
    /// Returns the state reached: `TestStopped` or `Listening`.
    pub async fn start(&mut self) -> Result<ServiceState, StartupError> {
        match self.state {
            ServiceState::Uninitialized => {}
            ServiceState::FailedStart | ServiceState::Stopped => {
                return Err(StartupError::NotStartable {
                    state: self.state.to_string(),
                });
            }
            _ => {
                warn!(state = %self.state, "Service already started");
                return Ok(self.state);
            }
        }

        match self.initialize().await {
            Ok(()) => Ok(self.state),
            Err(e) => {
                error!(error = %e, "Service failed to start");
                self.state = ServiceState::FailedStart;
                Err(e)
            }
        }
    }

    async fn initialize(&mut self) -> Result<(), StartupError> {
        let mutator = AttributeMutator::new(
            self.deps.directory.clone(),
            self.settings.access_attribute.clone(),
        );
        mutator.validate_attribute().await?;

        let pam: Arc<AuthenticatedGateway<dyn BasePamClient>> =
            Arc::new(AuthenticatedGateway::new("safeguard", self.deps.pam.clone()));
        let user = SubscriptionBootstrapper::new(pam.clone()).run().await?;

        self.state = ServiceState::Ready;
        info!(username = %user.username, attribute = %mutator.attribute(), "Service ready");

        if self.settings.test_mode {
            self.state = ServiceState::TestStopped;
            info!("Test mode: stopping before listening for events");
            return Ok(());
        }

        let mut listener = pam
            .call(&ObjectRef::default(), |pam| pam.event_listener())
            .await?;

        let (sender, receiver) = event_queue(self.settings.queue_capacity);
        for event_name in ACCESS_REQUEST_EVENTS {
            listener.register_handler(event_name, sender.clone());
        }
        // Only the listener's handlers keep the queue open.
        drop(sender);

        listener.start().await.map_err(|e| {
            classifier::classify(&e, &ObjectRef::default())
                .while_doing("Starting the event listener")
        })?;

        let dispatcher = Arc::new(EventDispatcher::new(pam, mutator));
        let shutdown = self.shutdown.clone();
        self.dispatcher = Some(tokio::spawn(async move {
            dispatcher.run(receiver, shutdown).await
        }));
        self.listener = Some(listener);
        self.state = ServiceState::Listening;

        info!(events = ACCESS_REQUEST_EVENTS.len(), "Listening for access request events");
        Ok(())
    }

    /// Close the listener and the queue; the event in progress finishes first.
    ///
    /// The dispatcher is stopped even when the listener fails to close; that
    /// failure is returned once the service has reached `Stopped`.
    pub async fn stop(&mut self) -> Result<Option<DispatchStats>, ProviderError> {
        if self.state != ServiceState::Listening {
            return Ok(None);
        }

        let listener_result = match self.listener.take() {
            Some(mut listener) => listener.stop().await,
            None => Ok(()),
        };
        self.shutdown.cancel();

        let dispatcher_result = match self.dispatcher.take() {
            Some(task) => task.await.map(Some).map_err(|e| {
                ProviderError::Malformed(format!("event dispatcher task failed: {}", e))
            }),
            None => Ok(None),
        };

        self.state = ServiceState::Stopped;
        if let Err(e) = &listener_result {
            error!(error = %e, "Event listener failed to stop cleanly");
        }
        info!("Service stopped");

        listener_result?;
        dispatcher_result
    }

    /// Wait for the dispatcher to finish on its own (the listener closed the queue).
    pub async fn wait(&mut self) -> Option<DispatchStats> {
        let task = self.dispatcher.take()?;
        match task.await {
            Ok(stats) => {
                self.listener = None;
                self.state = ServiceState::Stopped;
                Some(stats)
            }
            Err(e) => {
                error!(error = %e, "Event dispatcher task failed");
                self.state = ServiceState::Stopped;
                None
            }
        }
    }
}
