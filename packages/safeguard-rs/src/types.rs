use serde::{Deserialize, Serialize};

/// The authenticated user returned by `GET Me`.
#[derive(Debug, Clone, Deserialize)]
pub struct User {
    #[serde(rename = "Id")]
    pub id: i64,
    #[serde(rename = "UserName", alias = "Username", alias = "Name")]
    pub user_name: String,
    #[serde(rename = "AdminRoles", default)]
    pub admin_roles: Vec<String>,
}

/// An account on a managed asset.
#[derive(Debug, Clone, Deserialize)]
pub struct AssetAccount {
    #[serde(rename = "Id")]
    pub id: i64,
    #[serde(rename = "Name", default)]
    pub name: String,
    #[serde(rename = "DomainName", default)]
    pub domain_name: Option<String>,
    #[serde(rename = "DistinguishedName", default)]
    pub distinguished_name: Option<String>,
    #[serde(rename = "PlatformType", default)]
    pub platform_type: Option<String>,
}

/// A named event inside an event subscription.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventName {
    #[serde(rename = "Name", alias = "name")]
    pub name: String,
}

/// An event subscriber registration (`EventSubscribers` collection).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventSubscriber {
    #[serde(rename = "Id", default, skip_serializing_if = "is_unassigned")]
    pub id: i64,
    #[serde(rename = "Description", default)]
    pub description: Option<String>,
    #[serde(rename = "Type", default)]
    pub subscriber_type: Option<String>,
    #[serde(rename = "UserId", default)]
    pub user_id: i64,
    #[serde(rename = "Subscriptions", default)]
    pub subscriptions: Vec<EventName>,
}

fn is_unassigned(id: &i64) -> bool {
    *id == 0
}

/// rSTS token endpoint response.
#[derive(Debug, Deserialize)]
pub(crate) struct StsTokenResponse {
    pub access_token: String,
}

/// `Token/LoginResponse` body and response.
#[derive(Debug, Serialize)]
pub(crate) struct LoginRequest<'a> {
    #[serde(rename = "StsAccessToken")]
    pub sts_access_token: &'a str,
}

#[derive(Debug, Deserialize)]
pub(crate) struct LoginResponse {
    #[serde(rename = "Status")]
    pub status: String,
    #[serde(rename = "UserToken", default)]
    pub user_token: Option<String>,
}
