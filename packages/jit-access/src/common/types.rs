// Common types used across the kernel and domain layers
//
// Remote clients return these types so that the domain never sees vendor
// wire shapes (see kernel/deps.rs for the Safeguard mapping).

use std::collections::BTreeSet;
use std::fmt;

use serde::{Deserialize, Deserializer};

/// Description tag identifying the subscription owned by this integration.
pub const SUBSCRIPTION_DESCRIPTION: &str = "ARSJITAccess";

/// Subscriber type for the appliance's persistent push transport.
pub const SUBSCRIPTION_TYPE: &str = "Signalr";

/// Minimum admin role the running identity must hold.
pub const REQUIRED_ADMIN_ROLE: &str = "Auditor";

/// Platform type of accounts this integration acts on.
pub const MICROSOFT_AD_PLATFORM: &str = "MicrosoftAD";

pub const ACCESS_REQUEST_AVAILABLE: &str = "AccessRequestAvailable";

/// Lifecycle events subscribed to and handled, in registration order.
pub const ACCESS_REQUEST_EVENTS: [&str; 6] = [
    ACCESS_REQUEST_AVAILABLE,
    "AccessRequestCancelled",
    "AccessRequestCheckedIn",
    "AccessRequestClosed",
    "AccessRequestExpired",
    "AccessRequestRevoked",
];

/// Payload of a pushed access request lifecycle event.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct AccessRequestEvent {
    #[serde(rename = "EventName", default)]
    pub event_name: String,
    #[serde(rename = "AccountId", deserialize_with = "required_id")]
    pub account_id: String,
    #[serde(rename = "AssetId", default, deserialize_with = "optional_id")]
    pub asset_id: String,
}

/// Ids arrive as JSON strings or numbers depending on the appliance version.
fn required_id<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    match serde_json::Value::deserialize(deserializer)? {
        serde_json::Value::String(s) if !s.trim().is_empty() => Ok(s),
        serde_json::Value::Number(n) => Ok(n.to_string()),
        other => Err(serde::de::Error::custom(format!(
            "expected a non-empty string or number id, got {}",
            other
        ))),
    }
}

/// Like `required_id`, but `null` reads as empty.
fn optional_id<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    match serde_json::Value::deserialize(deserializer)? {
        serde_json::Value::String(s) => Ok(s),
        serde_json::Value::Number(n) => Ok(n.to_string()),
        serde_json::Value::Null => Ok(String::new()),
        other => Err(serde::de::Error::custom(format!(
            "expected string or number id, got {}",
            other
        ))),
    }
}

/// An account on a managed asset, fetched fresh for every event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssetAccount {
    pub id: String,
    pub name: String,
    pub domain_name: Option<String>,
    pub distinguished_name: String,
    pub platform_type: String,
}

impl AssetAccount {
    pub fn is_microsoft_ad(&self) -> bool {
        self.platform_type == MICROSOFT_AD_PLATFORM
    }
}

/// The identity this process runs as on the PAM appliance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthenticatedUser {
    pub id: String,
    pub username: String,
    pub admin_roles: BTreeSet<String>,
}

impl AuthenticatedUser {
    pub fn has_role(&self, role: &str) -> bool {
        self.admin_roles.contains(role)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventSpec {
    pub name: String,
}

impl EventSpec {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

/// A persisted push registration on the PAM appliance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventSubscription {
    /// Assigned by the appliance; `None` before creation.
    pub id: Option<String>,
    pub description: String,
    pub subscription_type: String,
    pub user_id: String,
    pub events: Vec<EventSpec>,
}

impl EventSubscription {
    /// The subscription this integration owns for `user`.
    pub fn for_access_requests(user: &AuthenticatedUser) -> Self {
        Self {
            id: None,
            description: SUBSCRIPTION_DESCRIPTION.to_string(),
            subscription_type: SUBSCRIPTION_TYPE.to_string(),
            user_id: user.id.clone(),
            events: ACCESS_REQUEST_EVENTS.iter().map(|e| EventSpec::new(*e)).collect(),
        }
    }

    pub fn is_access_request_subscription(&self) -> bool {
        self.description == SUBSCRIPTION_DESCRIPTION
    }
}

/// Grant or revoke, decided from the event name alone.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccessDecision {
    Grant,
    Revoke,
}

impl AccessDecision {
    /// `None` for names outside the subscribed set.
    pub fn for_event(event_name: &str) -> Option<Self> {
        if event_name == ACCESS_REQUEST_AVAILABLE {
            Some(AccessDecision::Grant)
        } else if ACCESS_REQUEST_EVENTS.contains(&event_name) {
            Some(AccessDecision::Revoke)
        } else {
            None
        }
    }

    /// Attribute value written to the directory.
    pub fn flag_value(self) -> &'static str {
        match self {
            AccessDecision::Grant => "true",
            AccessDecision::Revoke => "false",
        }
    }
}

impl fmt::Display for AccessDecision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AccessDecision::Grant => write!(f, "grant"),
            AccessDecision::Revoke => write!(f, "revoke"),
        }
    }
}
