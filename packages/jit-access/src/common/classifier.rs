//! Maps provider failures into the `ErrorKind` taxonomy.
//!
//! Pure functions only. The one classification that needs more information
//! (datatype conversion failures) takes the schema syntax as an argument;
//! the caller performs the lookup.

use super::errors::{ClassifiedError, ErrorKind, ObjectRef, ProviderError};

/// ADSI provider not registered, or the object path is malformed.
pub const E_ADS_BAD_PATHNAME: u32 = 0x8000_5000;
/// Value could not be converted to the attribute's syntax, or the attribute is not in schema.
pub const E_ADS_CANT_CONVERT_DATATYPE: u32 = 0x8000_500C;
pub const E_ACCESS_DENIED: u32 = 0x8007_0005;
/// Active Roles: object not found.
pub const E_OBJECT_NOT_FOUND: u32 = 0x8004_1069;
/// Active Roles: username/password rejected.
pub const E_AUTHENTICATION_FAILED: u32 = 0x8004_1452;

/// Schema syntax reported for attributes that are not in the schema.
pub const SYNTAX_NOT_IN_SCHEMA: u32 = 0;

pub fn is_datatype_conversion_failure(error: &ProviderError) -> bool {
    matches!(
        error,
        ProviderError::Directory { code, .. } if *code == E_ADS_CANT_CONVERT_DATATYPE
    )
}

/// Classify a provider failure raised while working on `context`.
pub fn classify(error: &ProviderError, context: &ObjectRef) -> ClassifiedError {
    match error {
        ProviderError::Directory { code, .. } => classify_directory_code(*code, context),
        ProviderError::Http { status, detail } => classify_http_status(*status, detail, context),
        ProviderError::Unreachable(detail) => ClassifiedError::new(
            ErrorKind::ProviderUnavailable,
            &format!("Unable to reach the remote provider ({}).", detail),
            Some(context.clone()),
        ),
        ProviderError::Malformed(detail) => ClassifiedError::new(
            ErrorKind::Unknown,
            &format!("Unexpected response from the remote provider ({}).", detail),
            Some(context.clone()),
        ),
    }
}

fn classify_directory_code(code: u32, context: &ObjectRef) -> ClassifiedError {
    let (kind, summary) = match code {
        E_ADS_BAD_PATHNAME => (
            ErrorKind::ProviderUnavailable,
            "Unable to load the Active Roles directory provider. \
             Install the Active Roles ADSI Provider from the Active Roles installation media \
             on this computer, or check the configured directory address."
                .to_string(),
        ),
        E_ADS_CANT_CONVERT_DATATYPE => (
            ErrorKind::Unknown,
            "Attribute does not exist in schema or attempted to set/modify value using wrong value type."
                .to_string(),
        ),
        E_ACCESS_DENIED => (ErrorKind::AccessDenied, "Access Denied.".to_string()),
        E_OBJECT_NOT_FOUND => (ErrorKind::ObjectNotFound, "Object not found.".to_string()),
        E_AUTHENTICATION_FAILED => (
            ErrorKind::AuthenticationFailed,
            "Authentication failed. Invalid username or password.".to_string(),
        ),
        other => (
            ErrorKind::Unknown,
            format!("Unknown directory provider error 0x{:08X}.", other),
        ),
    };
    ClassifiedError::new(kind, &summary, Some(context.clone()))
}

fn classify_http_status(status: u16, detail: &str, context: &ObjectRef) -> ClassifiedError {
    let kind = match status {
        401 => ErrorKind::AuthenticationFailed,
        403 => ErrorKind::AccessDenied,
        404 => ErrorKind::ObjectNotFound,
        502..=504 => ErrorKind::ProviderUnavailable,
        _ => ErrorKind::Unknown,
    };
    let summary = if detail.is_empty() {
        format!("PAM API returned HTTP {}.", status)
    } else {
        format!("PAM API returned HTTP {}: {}", status, detail)
    };
    ClassifiedError::new(kind, &summary, Some(context.clone()))
}

/// Resolve a datatype conversion failure once the attribute's schema syntax is known.
pub fn classify_conversion_failure(schema_syntax: u32, context: &ObjectRef) -> ClassifiedError {
    if schema_syntax == SYNTAX_NOT_IN_SCHEMA {
        ClassifiedError::new(
            ErrorKind::SchemaMissing,
            "Attribute does not exist in schema.",
            Some(context.clone()),
        )
    } else {
        ClassifiedError::new(
            ErrorKind::TypeMismatch,
            &format!(
                "Can not set object attribute because the specified value is the wrong type. \
                 Make sure the type of the value matches the omSyntax of the attribute ({}).",
                schema_syntax
            ),
            Some(context.clone()),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write_context() -> ObjectRef {
        ObjectRef::write("CN=jdoe,OU=Users,DC=x", "extensionAttribute1", "true")
    }

    fn kind_of(code: u32) -> ErrorKind {
        classify(&ProviderError::directory(code, ""), &write_context()).kind
    }

    #[test]
    fn test_directory_codes_map_to_taxonomy() {
        assert_eq!(kind_of(0x8000_5000), ErrorKind::ProviderUnavailable);
        assert_eq!(kind_of(0x8007_0005), ErrorKind::AccessDenied);
        assert_eq!(kind_of(0x8004_1069), ErrorKind::ObjectNotFound);
        assert_eq!(kind_of(0x8004_1452), ErrorKind::AuthenticationFailed);
        assert_eq!(kind_of(0x8007_2030), ErrorKind::Unknown);
    }

    #[test]
    fn test_unknown_code_keeps_code_and_context_in_message() {
        let err = classify(&ProviderError::directory(0x8007_2030, "x"), &write_context());
        assert!(err.message.contains("0x80072030"));
        assert!(err.message.contains("objectDn: CN=jdoe,OU=Users,DC=x"));
        assert_eq!(err.object_ref, Some(write_context()));
    }

    #[test]
    fn test_conversion_failure_disambiguated_by_schema_syntax() {
        let missing = classify_conversion_failure(0, &write_context());
        assert_eq!(missing.kind, ErrorKind::SchemaMissing);

        let mismatch = classify_conversion_failure(64, &write_context());
        assert_eq!(mismatch.kind, ErrorKind::TypeMismatch);
        assert!(mismatch.message.contains("(64)"));
    }

    #[test]
    fn test_conversion_failure_detection() {
        assert!(is_datatype_conversion_failure(&ProviderError::directory(
            E_ADS_CANT_CONVERT_DATATYPE,
            ""
        )));
        assert!(!is_datatype_conversion_failure(&ProviderError::directory(
            E_ACCESS_DENIED,
            ""
        )));
        assert!(!is_datatype_conversion_failure(&ProviderError::Unreachable(
            "down".into()
        )));
    }

    #[test]
    fn test_http_statuses_map_to_taxonomy() {
        let ctx = ObjectRef::object("AssetAccounts/42");
        let kind = |status| {
            classify(
                &ProviderError::Http {
                    status,
                    detail: String::new(),
                },
                &ctx,
            )
            .kind
        };
        assert_eq!(kind(401), ErrorKind::AuthenticationFailed);
        assert_eq!(kind(403), ErrorKind::AccessDenied);
        assert_eq!(kind(404), ErrorKind::ObjectNotFound);
        assert_eq!(kind(503), ErrorKind::ProviderUnavailable);
        assert_eq!(kind(400), ErrorKind::Unknown);
    }

    #[test]
    fn test_transport_failures() {
        let ctx = ObjectRef::default();
        assert_eq!(
            classify(&ProviderError::Unreachable("refused".into()), &ctx).kind,
            ErrorKind::ProviderUnavailable
        );
        assert_eq!(
            classify(&ProviderError::Malformed("bad json".into()), &ctx).kind,
            ErrorKind::Unknown
        );
    }
}
