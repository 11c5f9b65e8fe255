use std::env;
use std::fmt;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use dotenvy::dotenv;
use subtle::ConstantTimeEq;
use thiserror::Error;

use crate::kernel::event_queue::DEFAULT_QUEUE_CAPACITY;

/// Default Active Roles consolidated schema container.
pub const DEFAULT_SCHEMA_DN: &str = "CN=Schema,CN=Application Configuration,CN=Configuration";

/// A required setting is absent or unusable.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Bad configuration. {key} {reason}")]
pub struct ConfigError {
    pub key: &'static str,
    pub reason: String,
}

impl ConfigError {
    fn missing(key: &'static str) -> Self {
        Self {
            key,
            reason: "must be set".to_string(),
        }
    }

    fn invalid(key: &'static str, reason: impl fmt::Display) -> Self {
        Self {
            key,
            reason: format!("is invalid: {}", reason),
        }
    }
}

/// How the service authenticates to Safeguard.
#[derive(Clone, PartialEq, Eq)]
pub enum SafeguardAuth {
    Password { username: String, password: String },
    CertificateFile { path: PathBuf, password: String },
}

impl fmt::Debug for SafeguardAuth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SafeguardAuth::Password { username, .. } => f
                .debug_struct("Password")
                .field("username", username)
                .finish_non_exhaustive(),
            SafeguardAuth::CertificateFile { path, .. } => f
                .debug_struct("CertificateFile")
                .field("path", path)
                .finish_non_exhaustive(),
        }
    }
}

/// Explicit bind credentials for Active Roles. Absent means the session stays
/// anonymous and every write depends on what the proxy grants anonymous callers.
#[derive(Clone, PartialEq, Eq)]
pub struct DirectoryCredentials {
    pub username: String,
    pub password: String,
}

impl fmt::Debug for DirectoryCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DirectoryCredentials")
            .field("username", &self.username)
            .finish_non_exhaustive()
    }
}

/// Shared secret the push bridge presents to the event relay.
#[derive(Clone, PartialEq, Eq)]
pub struct RelayToken(String);

impl RelayToken {
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    /// Constant-time comparison against a presented token.
    pub fn matches(&self, presented: &str) -> bool {
        let expected = self.0.as_bytes();
        let presented = presented.as_bytes();
        if expected.len() != presented.len() {
            return false;
        }
        expected.ct_eq(presented).into()
    }
}

impl fmt::Debug for RelayToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("RelayToken(..)")
    }
}

/// Application configuration loaded from environment variables
#[derive(Debug, Clone)]
pub struct Config {
    /// Directory attribute that carries the access flag.
    pub access_attribute: String,
    pub safeguard_appliance: String,
    pub safeguard_auth: SafeguardAuth,
    pub safeguard_ignore_ssl: bool,
    pub active_roles_url: String,
    pub active_roles_credentials: Option<DirectoryCredentials>,
    pub active_roles_schema_dn: String,
    pub active_roles_timeout: Duration,
    pub event_relay_addr: SocketAddr,
    /// Required whenever the relay listens beyond loopback.
    pub event_relay_token: Option<RelayToken>,
    pub event_queue_capacity: usize,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        // Load .env file if present (development)
        let _ = dotenv();

        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Load configuration through `lookup`. Empty values count as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let require = |key: &'static str| get(key).ok_or_else(|| ConfigError::missing(key));

        let access_attribute = require("ARSG_JIT_ACCESS_ATTRIBUTE")?;
        let safeguard_appliance = require("SAFEGUARD_APPLIANCE")?;

        let safeguard_auth = match (
            get("SAFEGUARD_CERTIFICATE_FILE"),
            get("SAFEGUARD_USERNAME"),
        ) {
            (Some(path), _) => SafeguardAuth::CertificateFile {
                path: PathBuf::from(path),
                password: get("SAFEGUARD_CERTIFICATE_PASSWORD").unwrap_or_default(),
            },
            (None, Some(username)) => SafeguardAuth::Password {
                username,
                password: require("SAFEGUARD_PASSWORD")?,
            },
            (None, None) => {
                return Err(ConfigError {
                    key: "SAFEGUARD_USERNAME",
                    reason: "or SAFEGUARD_CERTIFICATE_FILE must be set to authenticate to Safeguard"
                        .to_string(),
                })
            }
        };

        let active_roles_credentials = match get("ACTIVE_ROLES_USERNAME") {
            Some(username) => Some(DirectoryCredentials {
                username,
                password: require("ACTIVE_ROLES_PASSWORD")?,
            }),
            None => None,
        };

        let safeguard_ignore_ssl = match get("SAFEGUARD_IGNORE_SSL") {
            Some(v) => parse_bool(&v).ok_or_else(|| {
                ConfigError::invalid("SAFEGUARD_IGNORE_SSL", "expected true or false")
            })?,
            None => false,
        };

        let active_roles_timeout = match get("ACTIVE_ROLES_TIMEOUT_SECS") {
            Some(v) => Duration::from_secs(
                v.parse()
                    .map_err(|e| ConfigError::invalid("ACTIVE_ROLES_TIMEOUT_SECS", e))?,
            ),
            None => Duration::from_secs(30),
        };

        let event_relay_addr: SocketAddr = get("EVENT_RELAY_ADDR")
            .unwrap_or_else(|| "127.0.0.1:8686".to_string())
            .parse()
            .map_err(|e| ConfigError::invalid("EVENT_RELAY_ADDR", e))?;

        let event_relay_token = get("EVENT_RELAY_TOKEN").map(RelayToken::new);
        if event_relay_token.is_none() && !event_relay_addr.ip().is_loopback() {
            return Err(ConfigError {
                key: "EVENT_RELAY_TOKEN",
                reason: format!(
                    "must be set when EVENT_RELAY_ADDR ({}) is not a loopback address",
                    event_relay_addr
                ),
            });
        }

        let event_queue_capacity = match get("EVENT_QUEUE_CAPACITY") {
            Some(v) => match v.parse::<usize>() {
                Ok(0) => return Err(ConfigError::invalid("EVENT_QUEUE_CAPACITY", "must be at least 1")),
                Ok(n) => n,
                Err(e) => return Err(ConfigError::invalid("EVENT_QUEUE_CAPACITY", e)),
            },
            None => DEFAULT_QUEUE_CAPACITY,
        };

        Ok(Self {
            access_attribute,
            safeguard_appliance,
            safeguard_auth,
            safeguard_ignore_ssl,
            active_roles_url: get("ACTIVE_ROLES_URL")
                .unwrap_or_else(|| "ldap://localhost:389".to_string()),
            active_roles_credentials,
            active_roles_schema_dn: get("ACTIVE_ROLES_SCHEMA_DN")
                .unwrap_or_else(|| DEFAULT_SCHEMA_DN.to_string()),
            active_roles_timeout,
            event_relay_addr,
            event_relay_token,
            event_queue_capacity,
        })
    }
}

fn parse_bool(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" => Some(true),
        "false" | "0" | "no" => Some(false),
        _ => None,
    }
}
