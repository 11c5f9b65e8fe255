//! Authenticated call gateway.
//!
//! Every outbound call to a remote client goes through `AuthenticatedGateway`:
//! the credential's remaining lifetime is checked first and refreshed when
//! it has run out, then the call is issued. Provider failures come back as
//! `ClassifiedError`.
//!
//! Refresh is serialized behind an async mutex with a second lifetime check
//! inside the lock, so concurrent callers that all observe an expired
//! credential trigger a single refresh.

use std::future::Future;
use std::sync::Arc;

use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::common::classifier;
use crate::common::{ClassifiedError, ObjectRef, ProviderError};
use crate::kernel::BaseCredentialSource;

pub struct AuthenticatedGateway<C: ?Sized> {
    name: &'static str,
    client: Arc<C>,
    refresh_lock: Mutex<()>,
}

impl<C> AuthenticatedGateway<C>
where
    C: BaseCredentialSource + ?Sized,
{
    /// `name` identifies the remote system in logs ("safeguard", "active_roles").
    pub fn new(name: &'static str, client: Arc<C>) -> Self {
        Self {
            name,
            client,
            refresh_lock: Mutex::new(()),
        }
    }

    /// Refresh the credential if its lifetime has run out.
    pub async fn ensure_fresh(&self) -> Result<(), ProviderError> {
        if !self.client.remaining_lifetime().await?.is_zero() {
            return Ok(());
        }

        let _guard = self.refresh_lock.lock().await;
        // Another caller may have refreshed while we waited for the lock.
        if self.client.remaining_lifetime().await?.is_zero() {
            info!(remote = self.name, "Access token expired. Re-authenticating.");
            self.client.refresh().await?;
        } else {
            debug!(remote = self.name, "credential refreshed by a concurrent caller");
        }
        Ok(())
    }

    /// Issue `op` with a fresh credential, returning the raw provider failure.
    ///
    /// Used where the caller needs the unclassified failure (datatype
    /// conversion failures need a schema lookup before they can be classified).
    pub async fn invoke<'a, T, F, Fut>(&'a self, op: F) -> Result<T, ProviderError>
    where
        F: FnOnce(&'a C) -> Fut,
        Fut: Future<Output = Result<T, ProviderError>> + 'a,
    {
        self.ensure_fresh().await?;
        op(self.client.as_ref()).await
    }

    /// Issue `op` with a fresh credential; failures are classified against `context`.
    pub async fn call<'a, T, F, Fut>(
        &'a self,
        context: &ObjectRef,
        op: F,
    ) -> Result<T, ClassifiedError>
    where
        F: FnOnce(&'a C) -> Fut,
        Fut: Future<Output = Result<T, ProviderError>> + 'a,
    {
        if let Err(e) = self.ensure_fresh().await {
            return Err(classifier::classify(&e, context)
                .while_doing(&format!("Re-authenticating to {}", self.name)));
        }
        op(self.client.as_ref())
            .await
            .map_err(|e| classifier::classify(&e, context))
    }
}
