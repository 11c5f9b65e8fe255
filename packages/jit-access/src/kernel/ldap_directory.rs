//! Active Roles directory client over the Active Roles LDAP proxy.
//!
//! LDAP result codes are translated to the ADSI result codes the classifier
//! understands, so callers see the same taxonomy whichever way the directory
//! is reached.

use std::collections::HashSet;
use std::time::Duration;

use async_trait::async_trait;
use ldap3::{
    Ldap, LdapConnAsync, LdapConnSettings, LdapError, LdapResult, Mod, Scope, SearchEntry,
    SearchResult,
};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::common::classifier::{
    E_ACCESS_DENIED, E_ADS_BAD_PATHNAME, E_ADS_CANT_CONVERT_DATATYPE, E_AUTHENTICATION_FAILED,
    E_OBJECT_NOT_FOUND, SYNTAX_NOT_IN_SCHEMA,
};
use crate::common::ProviderError;
use crate::config::{Config, DirectoryCredentials};
use crate::kernel::{BaseCredentialSource, BaseDirectoryClient};

const LDAP_SUCCESS: u32 = 0;
const LDAP_NO_SUCH_ATTRIBUTE: u32 = 16;
const LDAP_UNDEFINED_ATTRIBUTE_TYPE: u32 = 17;
const LDAP_INVALID_ATTRIBUTE_SYNTAX: u32 = 21;
const LDAP_NO_SUCH_OBJECT: u32 = 32;
const LDAP_INVALID_CREDENTIALS: u32 = 49;
const LDAP_INSUFFICIENT_ACCESS: u32 = 50;

/// Facility bits for Win32 errors surfaced as HRESULTs.
const HRESULT_WIN32_FACILITY: u32 = 0x8007_2000;

/// Schema attribute holding an attribute's declared syntax.
const OM_SYNTAX: &str = "oMSyntax";

#[derive(Debug, Clone)]
pub struct LdapDirectoryOptions {
    /// `ldap://` or `ldaps://` address of the Active Roles LDAP proxy.
    pub url: String,
    /// `None` skips the bind; the session stays anonymous.
    pub credentials: Option<DirectoryCredentials>,
    /// Container holding `attributeSchema` objects.
    pub schema_dn: String,
    pub timeout: Duration,
}

impl LdapDirectoryOptions {
    pub fn from_config(config: &Config) -> Self {
        Self {
            url: config.active_roles_url.clone(),
            credentials: config.active_roles_credentials.clone(),
            schema_dn: config.active_roles_schema_dn.clone(),
            timeout: config.active_roles_timeout,
        }
    }

    pub fn is_anonymous(&self) -> bool {
        self.credentials.is_none()
    }
}

/// Directory client holding one bound LDAP session.
///
/// The session has no expiry of its own; it counts as expired once the
/// connection drops, and a refresh reconnects and rebinds.
pub struct LdapDirectoryClient {
    options: LdapDirectoryOptions,
    session: Mutex<Option<Ldap>>,
}

impl LdapDirectoryClient {
    /// Build a client without connecting. The first gateway call binds.
    pub fn new(options: LdapDirectoryOptions) -> Self {
        if options.is_anonymous() {
            warn!(
                url = %options.url,
                "ACTIVE_ROLES_USERNAME is not set; the Active Roles session will be anonymous and writes may be denied"
            );
        }
        Self {
            options,
            session: Mutex::new(None),
        }
    }

    async fn connect(&self) -> Result<Ldap, ProviderError> {
        let settings = LdapConnSettings::new().set_conn_timeout(self.options.timeout);

        debug!(url = %self.options.url, "Connecting to Active Roles");
        let (conn, mut ldap) = LdapConnAsync::with_settings(settings, &self.options.url)
            .await
            .map_err(|e| transport_error(&format!("connect to {}", self.options.url), e))?;

        tokio::spawn(async move {
            if let Err(e) = conn.drive().await {
                warn!(error = %e, "Active Roles connection driver error");
            }
        });

        if let Some(credentials) = &self.options.credentials {
            let result = ldap
                .with_timeout(self.options.timeout)
                .simple_bind(&credentials.username, &credentials.password)
                .await
                .map_err(|e| transport_error("bind", e))?;
            if result.rc != LDAP_SUCCESS {
                return Err(ProviderError::directory(
                    directory_code(result.rc),
                    format!("bind as {} failed: {}", credentials.username, result.text),
                ));
            }
        }

        info!(url = %self.options.url, "Active Roles connection established");
        Ok(ldap)
    }

    /// Clone of the current session, or an error if none is open.
    async fn session(&self) -> Result<Ldap, ProviderError> {
        self.session.lock().await.clone().ok_or_else(|| {
            ProviderError::directory(E_ADS_BAD_PATHNAME, "no open Active Roles session")
        })
    }

    /// Forget the session after a transport failure so the next call reconnects.
    async fn drop_session(&self) {
        self.session.lock().await.take();
    }

    async fn check(
        &self,
        operation: &str,
        outcome: Result<LdapResult, LdapError>,
    ) -> Result<(), ProviderError> {
        match outcome {
            Ok(result) if result.rc == LDAP_SUCCESS => Ok(()),
            Ok(result) => Err(ProviderError::directory(
                directory_code(result.rc),
                format!("{} failed with code {}: {}", operation, result.rc, result.text),
            )),
            Err(e) => {
                self.drop_session().await;
                Err(transport_error(operation, e))
            }
        }
    }
}

#[async_trait]
impl BaseCredentialSource for LdapDirectoryClient {
    async fn remaining_lifetime(&self) -> Result<Duration, ProviderError> {
        let mut session = self.session.lock().await;
        match session.as_mut() {
            Some(ldap) => Ok(if ldap.is_closed() {
                Duration::ZERO
            } else {
                Duration::MAX
            }),
            None => Ok(Duration::ZERO),
        }
    }

    async fn refresh(&self) -> Result<(), ProviderError> {
        let ldap = self.connect().await?;
        let previous = self.session.lock().await.replace(ldap);
        if let Some(mut previous) = previous {
            if let Err(e) = previous.unbind().await {
                debug!(error = %e, "Error unbinding previous Active Roles session");
            }
        }
        Ok(())
    }
}

#[async_trait]
impl BaseDirectoryClient for LdapDirectoryClient {
    async fn set_attribute(
        &self,
        object_dn: &str,
        attribute: &str,
        value: &str,
    ) -> Result<(), ProviderError> {
        let mut ldap = self.session().await?;
        let mods = vec![Mod::Replace(attribute, HashSet::from([value]))];

        debug!(object_dn, attribute, value, "Writing directory attribute");
        let outcome = ldap
            .with_timeout(self.options.timeout)
            .modify(object_dn, mods)
            .await;
        self.check("modify", outcome).await
    }

    async fn attribute_schema_syntax(&self, attribute: &str) -> Result<u32, ProviderError> {
        let mut ldap = self.session().await?;
        let filter = format!("(lDAPDisplayName={})", escape_filter_value(attribute));

        let outcome = ldap
            .with_timeout(self.options.timeout)
            .search(&self.options.schema_dn, Scope::OneLevel, &filter, vec![OM_SYNTAX])
            .await;
        let SearchResult(entries, result) = match outcome {
            Ok(found) => found,
            Err(e) => {
                self.drop_session().await;
                return Err(transport_error("schema search", e));
            }
        };
        if result.rc != LDAP_SUCCESS {
            return Err(ProviderError::directory(
                directory_code(result.rc),
                format!("schema search in {} failed: {}", self.options.schema_dn, result.text),
            ));
        }

        let syntax = entries
            .into_iter()
            .map(SearchEntry::construct)
            .find_map(|entry| {
                entry
                    .attrs
                    .get(OM_SYNTAX)
                    .and_then(|values| values.first())
                    .and_then(|v| v.parse::<u32>().ok())
            })
            .unwrap_or(SYNTAX_NOT_IN_SCHEMA);
        Ok(syntax)
    }
}

/// Translate an LDAP result code to the equivalent ADSI result code.
pub fn directory_code(rc: u32) -> u32 {
    match rc {
        LDAP_NO_SUCH_ATTRIBUTE | LDAP_UNDEFINED_ATTRIBUTE_TYPE | LDAP_INVALID_ATTRIBUTE_SYNTAX => {
            E_ADS_CANT_CONVERT_DATATYPE
        }
        LDAP_INSUFFICIENT_ACCESS => E_ACCESS_DENIED,
        LDAP_NO_SUCH_OBJECT => E_OBJECT_NOT_FOUND,
        LDAP_INVALID_CREDENTIALS => E_AUTHENTICATION_FAILED,
        other => HRESULT_WIN32_FACILITY | other,
    }
}

/// Connection, timeout and protocol failures all mean the provider is not usable.
fn transport_error(operation: &str, error: LdapError) -> ProviderError {
    match error {
        LdapError::LdapResult { result } => ProviderError::directory(
            directory_code(result.rc),
            format!("{} failed with code {}: {}", operation, result.rc, result.text),
        ),
        other => ProviderError::directory(
            E_ADS_BAD_PATHNAME,
            format!("{} failed: {}", operation, other),
        ),
    }
}

/// Escape special characters in LDAP filter values (RFC 4515).
fn escape_filter_value(value: &str) -> String {
    value
        .replace('\\', "\\5c")
        .replace('*', "\\2a")
        .replace('(', "\\28")
        .replace(')', "\\29")
        .replace('\0', "\\00")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_result_codes_translate_to_adsi_codes() {
        assert_eq!(directory_code(17), E_ADS_CANT_CONVERT_DATATYPE);
        assert_eq!(directory_code(21), E_ADS_CANT_CONVERT_DATATYPE);
        assert_eq!(directory_code(50), E_ACCESS_DENIED);
        assert_eq!(directory_code(32), E_OBJECT_NOT_FOUND);
        assert_eq!(directory_code(49), E_AUTHENTICATION_FAILED);
        assert_eq!(directory_code(53), 0x8007_2035);
    }

    #[test]
    fn test_filter_values_are_escaped() {
        assert_eq!(escape_filter_value("extensionAttribute1"), "extensionAttribute1");
        assert_eq!(escape_filter_value("a*)(b"), "a\\2a\\29\\28b");
    }

    fn config_with(extra: &[(&str, &str)]) -> Config {
        let mut vars = vec![
            ("ARSG_JIT_ACCESS_ATTRIBUTE", "extensionAttribute1"),
            ("SAFEGUARD_APPLIANCE", "sg.example.com"),
            ("SAFEGUARD_USERNAME", "jit-auditor"),
            ("SAFEGUARD_PASSWORD", "secret"),
        ];
        vars.extend_from_slice(extra);
        Config::from_lookup(|key| {
            vars.iter()
                .find(|(k, _)| *k == key)
                .map(|(_, v)| v.to_string())
        })
        .unwrap()
    }

    #[test]
    fn test_missing_directory_credentials_mean_anonymous_session() {
        let config = config_with(&[]);
        assert!(LdapDirectoryOptions::from_config(&config).is_anonymous());

        let config = config_with(&[
            ("ACTIVE_ROLES_USERNAME", "CN=svc,DC=x"),
            ("ACTIVE_ROLES_PASSWORD", "pw"),
        ]);
        assert!(!LdapDirectoryOptions::from_config(&config).is_anonymous());
    }

    #[tokio::test]
    async fn test_unconnected_client_reports_expired_session() {
        let client = LdapDirectoryClient::new(LdapDirectoryOptions {
            url: "ldap://localhost:389".to_string(),
            credentials: None,
            schema_dn: crate::config::DEFAULT_SCHEMA_DN.to_string(),
            timeout: Duration::from_secs(1),
        });
        assert_eq!(client.remaining_lifetime().await.unwrap(), Duration::ZERO);
    }

    #[tokio::test]
    async fn test_calls_without_session_are_provider_unavailable() {
        let client = LdapDirectoryClient::new(LdapDirectoryOptions {
            url: "ldap://localhost:389".to_string(),
            credentials: None,
            schema_dn: crate::config::DEFAULT_SCHEMA_DN.to_string(),
            timeout: Duration::from_secs(1),
        });
        let err = client
            .set_attribute("CN=jdoe,DC=x", "extensionAttribute1", "true")
            .await
            .unwrap_err();
        assert!(matches!(err, ProviderError::Directory { code, .. } if code == E_ADS_BAD_PATHNAME));
    }
}
