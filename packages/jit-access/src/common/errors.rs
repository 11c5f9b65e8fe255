//! Provider failures and the stable error taxonomy they classify into.
//!
//! `ProviderError` is what remote clients return at the trait boundary.
//! `ClassifiedError` is the only provider failure that leaves the gateway;
//! callers branch on its `kind`, never on `message`.

use std::fmt;

use thiserror::Error;

use crate::config::ConfigError;

/// Raw failure reported by a remote client.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProviderError {
    /// Directory provider failure carrying the provider's result code (an ADSI HRESULT).
    #[error("directory provider error 0x{code:08X}: {detail}")]
    Directory { code: u32, detail: String },

    /// Non-2xx answer from the PAM REST API.
    #[error("PAM API error ({status}): {detail}")]
    Http { status: u16, detail: String },

    /// The remote end could not be reached at all.
    #[error("connection failed: {0}")]
    Unreachable(String),

    /// The remote end answered with something we could not interpret.
    #[error("unexpected response: {0}")]
    Malformed(String),
}

impl ProviderError {
    pub fn directory(code: u32, detail: impl Into<String>) -> Self {
        ProviderError::Directory {
            code,
            detail: detail.into(),
        }
    }
}

/// Stable classification of provider failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    ProviderUnavailable,
    SchemaMissing,
    TypeMismatch,
    AccessDenied,
    ObjectNotFound,
    AuthenticationFailed,
    Unknown,
}

impl ErrorKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ErrorKind::ProviderUnavailable => "provider_unavailable",
            ErrorKind::SchemaMissing => "schema_missing",
            ErrorKind::TypeMismatch => "type_mismatch",
            ErrorKind::AccessDenied => "access_denied",
            ErrorKind::ObjectNotFound => "object_not_found",
            ErrorKind::AuthenticationFailed => "authentication_failed",
            ErrorKind::Unknown => "unknown",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The directory object a failed request was aimed at.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ObjectRef {
    pub object_dn: Option<String>,
    pub attribute_name: Option<String>,
    pub attribute_value: Option<String>,
}

impl ObjectRef {
    /// Context of an attribute write.
    pub fn write(dn: &str, attribute: &str, value: &str) -> Self {
        Self {
            object_dn: Some(dn.to_string()),
            attribute_name: Some(attribute.to_string()),
            attribute_value: Some(value.to_string()),
        }
    }

    /// Context of a schema lookup for an attribute.
    pub fn attribute(attribute: &str) -> Self {
        Self {
            attribute_name: Some(attribute.to_string()),
            ..Default::default()
        }
    }

    /// Context of a request addressed by object id or DN only.
    pub fn object(object: &str) -> Self {
        Self {
            object_dn: Some(object.to_string()),
            ..Default::default()
        }
    }

    pub fn is_empty(&self) -> bool {
        self.object_dn.is_none() && self.attribute_name.is_none() && self.attribute_value.is_none()
    }
}

impl fmt::Display for ObjectRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "objectDn: {}, attributeName: {}, attributeValue: {}",
            self.object_dn.as_deref().unwrap_or(""),
            self.attribute_name.as_deref().unwrap_or(""),
            self.attribute_value.as_deref().unwrap_or("")
        )
    }
}

/// A provider failure mapped into the taxonomy, with an operator-actionable message.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("[{kind}] {message}")]
pub struct ClassifiedError {
    pub kind: ErrorKind,
    pub message: String,
    pub object_ref: Option<ObjectRef>,
}

impl ClassifiedError {
    /// Build an error whose message ends with the object context, if any.
    pub fn new(kind: ErrorKind, summary: &str, object_ref: Option<ObjectRef>) -> Self {
        let message = match &object_ref {
            Some(r) if !r.is_empty() => format!("{} {}", summary, r),
            _ => summary.to_string(),
        };
        Self {
            kind,
            message,
            object_ref,
        }
    }

    /// Prefix the message with what was being attempted when this failure occurred.
    pub fn while_doing(mut self, activity: &str) -> Self {
        self.message = format!("{}: {}", activity, self.message);
        self
    }
}

/// Why the service could not reach the running state.
#[derive(Debug, Error)]
pub enum StartupError {
    #[error(transparent)]
    ConfigurationInvalid(#[from] ConfigError),

    #[error("Authorization insufficient. {username} must hold the {role} admin role.")]
    AuthorizationInsufficient { username: String, role: String },

    #[error(transparent)]
    Provider(#[from] ClassifiedError),

    #[error("Service cannot start from the {state} state.")]
    NotStartable { state: String },
}
