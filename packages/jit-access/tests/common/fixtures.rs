//! Test fixtures for the remote systems' data.

use std::collections::BTreeSet;

use jit_access::common::{
    AssetAccount, AuthenticatedUser, EventSubscription, MICROSOFT_AD_PLATFORM,
};

pub const ACCESS_ATTRIBUTE: &str = "extensionAttribute1";

/// oMSyntax of a Unicode string attribute.
pub const STRING_SYNTAX: u32 = 64;

pub const JDOE_DN: &str = "CN=jdoe,OU=Users,DC=x";

/// The identity the service runs as, holding exactly the roles given.
pub fn user_with_roles(roles: &[&str]) -> AuthenticatedUser {
    AuthenticatedUser {
        id: "12".to_string(),
        username: "jit-svc".to_string(),
        admin_roles: roles.iter().map(|r| r.to_string()).collect::<BTreeSet<_>>(),
    }
}

pub fn auditor() -> AuthenticatedUser {
    user_with_roles(&["Auditor"])
}

pub fn ad_account(id: &str, distinguished_name: &str) -> AssetAccount {
    AssetAccount {
        id: id.to_string(),
        name: "jdoe".to_string(),
        domain_name: Some("x.example".to_string()),
        distinguished_name: distinguished_name.to_string(),
        platform_type: MICROSOFT_AD_PLATFORM.to_string(),
    }
}

pub fn linux_account(id: &str) -> AssetAccount {
    AssetAccount {
        id: id.to_string(),
        name: "root".to_string(),
        domain_name: None,
        distinguished_name: String::new(),
        platform_type: "Linux".to_string(),
    }
}

/// The subscription as the appliance would report it after creation.
pub fn existing_subscription(user: &AuthenticatedUser) -> EventSubscription {
    let mut subscription = EventSubscription::for_access_requests(user);
    subscription.id = Some("3".to_string());
    subscription
}

/// Event body as pushed by the appliance.
pub fn event_body(event_name: &str, account_id: &str) -> String {
    serde_json::json!({
        "EventName": event_name,
        "AccountId": account_id,
        "AssetId": "1",
        "RequestId": "7-1-42-1",
    })
    .to_string()
}
