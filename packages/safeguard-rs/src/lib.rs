//! Minimal Safeguard for Privileged Passwords REST API client.
//!
//! Covers the slice of the appliance API needed to watch access requests:
//! rSTS login and token refresh, the current user, asset accounts, and
//! event subscriber registrations.
//!
//! # Example
//!
//! ```rust,ignore
//! use safeguard::{Credentials, SafeguardClient, SafeguardOptions};
//!
//! let client = SafeguardClient::new(SafeguardOptions {
//!     appliance: "safeguard.example.com".into(),
//!     credentials: Credentials::Password {
//!         username: "jit-auditor".into(),
//!         password: "secret".into(),
//!     },
//!     ignore_ssl: false,
//! })?;
//! client.refresh_access_token().await?;
//!
//! let me = client.get_me().await?;
//! println!("connected as {}", me.user_name);
//! ```

pub mod error;
pub mod types;

pub use error::{Result, SafeguardError};
pub use types::{AssetAccount, EventName, EventSubscriber, User};

use reqwest::{RequestBuilder, Response};
use serde::de::DeserializeOwned;
use tokio::sync::RwLock;

use types::{LoginRequest, LoginResponse, StsTokenResponse};

const API_VERSION: &str = "v3";

/// Header the appliance uses to report the remaining token lifetime in minutes.
const TOKEN_LIFETIME_HEADER: &str = "X-TokenLifetimeRemaining";

/// How the client authenticates to the appliance's rSTS.
#[derive(Clone)]
pub enum Credentials {
    /// Local provider username and password (resource owner grant).
    Password { username: String, password: String },
    /// PKCS#12 client certificate (client credentials grant).
    Certificate { pkcs12: Vec<u8>, password: String },
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Credentials::Password { username, .. } => f
                .debug_struct("Password")
                .field("username", username)
                .field("password", &"[REDACTED]")
                .finish(),
            Credentials::Certificate { .. } => f
                .debug_struct("Certificate")
                .field("pkcs12", &"[REDACTED]")
                .finish(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct SafeguardOptions {
    /// Appliance hostname or IP address.
    pub appliance: String,
    pub credentials: Credentials,
    /// Accept self-signed appliance certificates.
    pub ignore_ssl: bool,
}

pub struct SafeguardClient {
    client: reqwest::Client,
    options: SafeguardOptions,
    user_token: RwLock<Option<String>>,
}

impl SafeguardClient {
    /// Build a client without logging in.
    pub fn new(options: SafeguardOptions) -> Result<Self> {
        let mut builder =
            reqwest::Client::builder().danger_accept_invalid_certs(options.ignore_ssl);

        if let Credentials::Certificate { pkcs12, password } = &options.credentials {
            let identity = reqwest::Identity::from_pkcs12_der(pkcs12, password)
                .map_err(|e| SafeguardError::Certificate(e.to_string()))?;
            builder = builder.identity(identity);
        }

        Ok(Self {
            client: builder.build()?,
            options,
            user_token: RwLock::new(None),
        })
    }

    /// Obtain a fresh user token: rSTS token first, then exchange it at the core service.
    pub async fn refresh_access_token(&self) -> Result<()> {
        let sts_token = self.request_sts_token().await?;

        let resp = self
            .client
            .post(self.core_url("Token/LoginResponse"))
            .json(&LoginRequest {
                sts_access_token: &sts_token,
            })
            .send()
            .await?;
        let login: LoginResponse = read_json(resp).await?;

        match (login.status.as_str(), login.user_token) {
            ("Success", Some(token)) => {
                *self.user_token.write().await = Some(token);
                tracing::debug!(appliance = %self.options.appliance, "Safeguard user token refreshed");
                Ok(())
            }
            (status, _) => Err(SafeguardError::Login(format!(
                "token exchange returned status {}",
                status
            ))),
        }
    }

    async fn request_sts_token(&self) -> Result<String> {
        let body = match &self.options.credentials {
            Credentials::Password { username, password } => serde_json::json!({
                "grant_type": "password",
                "username": username,
                "password": password,
                "scope": "rsts:sts:primaryproviderid:local",
            }),
            Credentials::Certificate { .. } => serde_json::json!({
                "grant_type": "client_credentials",
                "scope": "rsts:sts:primaryproviderid:certificate",
            }),
        };

        let url = format!("https://{}/RSTS/oauth2/token", self.options.appliance);
        let resp = self.client.post(url).json(&body).send().await?;

        let status = resp.status();
        if !status.is_success() {
            let message = resp.text().await.unwrap_or_default();
            return Err(SafeguardError::Login(format!("rSTS returned {}: {}", status, message)));
        }

        let token: StsTokenResponse = resp
            .json()
            .await
            .map_err(|e| SafeguardError::Parse(e.to_string()))?;
        Ok(token.access_token)
    }

    /// Remaining user token lifetime in minutes. Zero when not logged in or expired.
    pub async fn access_token_lifetime_remaining(&self) -> Result<u64> {
        let Some(token) = self.user_token.read().await.clone() else {
            return Ok(0);
        };

        let resp = self
            .client
            .get(self.core_url("LoginMessage"))
            .bearer_auth(token)
            .header(TOKEN_LIFETIME_HEADER, "")
            .send()
            .await?;

        let status = resp.status();
        if status == reqwest::StatusCode::UNAUTHORIZED {
            return Ok(0);
        }
        if !status.is_success() {
            let message = resp.text().await.unwrap_or_default();
            return Err(SafeguardError::Api {
                status: status.as_u16(),
                message,
            });
        }

        let minutes = resp
            .headers()
            .get(TOKEN_LIFETIME_HEADER)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.trim().parse::<u64>().ok())
            .ok_or_else(|| {
                SafeguardError::Parse(format!("missing or invalid {} header", TOKEN_LIFETIME_HEADER))
            })?;
        Ok(minutes)
    }

    pub async fn get_me(&self) -> Result<User> {
        self.get_json("Me", &[]).await
    }

    pub async fn get_asset_account(&self, account_id: i64) -> Result<AssetAccount> {
        self.get_json(&format!("AssetAccounts/{}", account_id), &[])
            .await
    }

    /// Event subscribers registered for a user.
    pub async fn get_event_subscribers(&self, user_id: i64) -> Result<Vec<EventSubscriber>> {
        let filter = format!("UserId eq {}", user_id);
        self.get_json("EventSubscribers", &[("filter", filter.as_str())])
            .await
    }

    pub async fn create_event_subscriber(
        &self,
        subscriber: &EventSubscriber,
    ) -> Result<EventSubscriber> {
        let req = self.client.post(self.core_url("EventSubscribers"));
        let resp = self.authorize(req).await?.json(subscriber).send().await?;
        read_json(resp).await
    }

    async fn get_json<T: DeserializeOwned>(&self, endpoint: &str, query: &[(&str, &str)]) -> Result<T> {
        let req = self.client.get(self.core_url(endpoint)).query(query);
        let resp = self.authorize(req).await?.send().await?;
        read_json(resp).await
    }

    async fn authorize(&self, req: RequestBuilder) -> Result<RequestBuilder> {
        match self.user_token.read().await.as_deref() {
            Some(token) => Ok(req.bearer_auth(token)),
            None => Err(SafeguardError::Login("not logged in".to_string())),
        }
    }

    fn core_url(&self, endpoint: &str) -> String {
        format!(
            "https://{}/service/core/{}/{}",
            self.options.appliance, API_VERSION, endpoint
        )
    }
}

async fn read_json<T: DeserializeOwned>(resp: Response) -> Result<T> {
    let status = resp.status();
    if !status.is_success() {
        let message = resp.text().await.unwrap_or_default();
        return Err(SafeguardError::Api {
            status: status.as_u16(),
            message,
        });
    }

    resp.json::<T>()
        .await
        .map_err(|e| SafeguardError::Parse(e.to_string()))
}
