//! LDAP transport abstraction and its `ldap3` backend.

use adldap_core::{Error, ProviderConfig, Result};
use async_trait::async_trait;
use ldap3::{LdapConnAsync, LdapConnSettings, Scope, SearchEntry};
use native_tls::{Certificate, TlsConnector};
use std::collections::{HashMap, HashSet};
use std::fs;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::timeout;
use tracing::debug;

/// Represents the search scope for LDAP queries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SearchScope {
    /// Base object only.
    Base,
    /// One level below the base.
    OneLevel,
    /// Entire subtree.
    Subtree,
}

impl From<SearchScope> for Scope {
    fn from(scope: SearchScope) -> Self {
        match scope {
            SearchScope::Base => Scope::Base,
            SearchScope::OneLevel => Scope::OneLevel,
            SearchScope::Subtree => Scope::Subtree,
        }
    }
}

/// LDAP entry returned by a search.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LdapEntry {
    /// Distinguished name of the entry.
    pub dn: String,
    /// Attribute map (values preserve order from server).
    pub attributes: HashMap<String, Vec<String>>,
}

impl LdapEntry {
    /// Creates an entry without attributes.
    #[must_use]
    pub fn new(dn: impl Into<String>) -> Self {
        Self {
            dn: dn.into(),
            attributes: HashMap::new(),
        }
    }

    /// Adds values for an attribute.
    #[must_use]
    pub fn with_attribute<I, V>(mut self, attribute: impl Into<String>, values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<String>,
    {
        self.attributes.insert(
            attribute.into(),
            values.into_iter().map(Into::into).collect(),
        );
        self
    }

    /// Returns all values for the attribute; names are matched case-insensitively.
    #[must_use]
    pub fn values(&self, attribute: &str) -> Option<&[String]> {
        self.attributes
            .get(attribute)
            .or_else(|| {
                self.attributes
                    .iter()
                    .find(|(name, _)| name.eq_ignore_ascii_case(attribute))
                    .map(|(_, values)| values)
            })
            .map(Vec::as_slice)
    }

    /// Returns the first value of the attribute if present.
    #[must_use]
    pub fn first(&self, attribute: &str) -> Option<&str> {
        self.values(attribute)
            .and_then(|values| values.first().map(String::as_str))
    }
}

/// Attribute of an entry to be added.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirectoryAttribute {
    /// Attribute name.
    pub name: String,
    /// Attribute values.
    pub values: Vec<String>,
}

impl DirectoryAttribute {
    /// Creates an attribute with the given values.
    #[must_use]
    pub fn new<I, V>(name: impl Into<String>, values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<String>,
    {
        Self {
            name: name.into(),
            values: values.into_iter().map(Into::into).collect(),
        }
    }
}

/// A connected directory session.
///
/// Implementations perform exactly one protocol operation per call and report failures as
/// [`Error::Transport`] or [`Error::Timeout`]. Calls on one session are strictly sequential.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait LdapSession: Send {
    /// Authenticates the session.
    async fn simple_bind(&mut self, dn: &str, password: &str) -> Result<()>;
    /// Runs a search and returns the matching entries.
    async fn search(
        &mut self,
        base_dn: &str,
        scope: SearchScope,
        filter: &str,
        attributes: &[&'static str],
    ) -> Result<Vec<LdapEntry>>;
    /// Adds an entry.
    async fn add(&mut self, dn: &str, attributes: &[DirectoryAttribute]) -> Result<()>;
    /// Deletes an entry.
    async fn delete(&mut self, dn: &str) -> Result<()>;
    /// Closes the session.
    async fn unbind(&mut self) -> Result<()>;
}

/// Opens directory sessions.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait LdapConnector: Send + Sync {
    /// Establishes a new, unauthenticated session.
    async fn connect(&self) -> Result<Box<dyn LdapSession>>;
}

/// Real LDAP connector backed by `ldap3`.
pub struct RealLdapConnector {
    config: Arc<ProviderConfig>,
}

impl RealLdapConnector {
    /// Creates a new connector instance.
    #[must_use]
    pub fn new(config: Arc<ProviderConfig>) -> Self {
        Self { config }
    }
}

#[async_trait]
impl LdapConnector for RealLdapConnector {
    async fn connect(&self) -> Result<Box<dyn LdapSession>> {
        let url = self.config.parse_url()?;
        let settings = build_ldap_settings(&self.config)?;
        debug!(url = %url, "connecting to directory");

        let (conn, ldap) = LdapConnAsync::with_settings(settings, url.as_str())
            .await
            .map_err(|err| map_ldap_error("connect", err))?;
        ldap3::drive!(conn);

        Ok(Box::new(RealLdapSession {
            inner: ldap,
            operation_timeout: self.config.operation_timeout(),
        }))
    }
}

struct RealLdapSession {
    inner: ldap3::Ldap,
    operation_timeout: Duration,
}

async fn run<F, T>(limit: Duration, operation: &str, fut: F) -> Result<T>
where
    F: std::future::Future<Output = ldap3::result::Result<T>>,
{
    timeout(limit, fut)
        .await
        .map_err(|_| Error::Timeout(format!("directory {operation} timed out")))?
        .map_err(|err| map_ldap_error(operation, err))
}

#[async_trait]
impl LdapSession for RealLdapSession {
    async fn simple_bind(&mut self, dn: &str, password: &str) -> Result<()> {
        let result = run(
            self.operation_timeout,
            "bind",
            self.inner.simple_bind(dn, password),
        )
        .await?;
        result.success().map_err(|err| map_ldap_error("bind", err))?;
        Ok(())
    }

    async fn search(
        &mut self,
        base_dn: &str,
        scope: SearchScope,
        filter: &str,
        attributes: &[&'static str],
    ) -> Result<Vec<LdapEntry>> {
        let result = run(
            self.operation_timeout,
            "search",
            self.inner
                .search(base_dn, scope.into(), filter, attributes.to_vec()),
        )
        .await?;
        let (entries, _) = result
            .success()
            .map_err(|err| map_ldap_error("search", err))?;
        Ok(entries
            .into_iter()
            .map(SearchEntry::construct)
            .map(|entry| LdapEntry {
                dn: entry.dn,
                attributes: entry.attrs,
            })
            .collect())
    }

    async fn add(&mut self, dn: &str, attributes: &[DirectoryAttribute]) -> Result<()> {
        let attrs = attributes
            .iter()
            .map(|attribute| {
                (
                    attribute.name.clone(),
                    attribute.values.iter().cloned().collect::<HashSet<_>>(),
                )
            })
            .collect::<Vec<_>>();

        let result = run(self.operation_timeout, "add", self.inner.add(dn, attrs)).await?;
        result.success().map_err(|err| map_ldap_error("add", err))?;
        Ok(())
    }

    async fn delete(&mut self, dn: &str) -> Result<()> {
        let result = run(self.operation_timeout, "delete", self.inner.delete(dn)).await?;
        result
            .success()
            .map_err(|err| map_ldap_error("delete", err))?;
        Ok(())
    }

    async fn unbind(&mut self) -> Result<()> {
        run(self.operation_timeout, "unbind", self.inner.unbind()).await
    }
}

fn build_ldap_settings(config: &ProviderConfig) -> Result<LdapConnSettings> {
    let mut settings = LdapConnSettings::new().set_conn_timeout(config.connection_timeout());

    if !config.tls_verify {
        let connector = TlsConnector::builder()
            .danger_accept_invalid_certs(true)
            .build()
            .map_err(|err| {
                Error::ConfigError(format!("failed to construct TLS connector: {err}"))
            })?;
        settings = settings.set_connector(connector).set_no_tls_verify(true);
    } else if let Some(cert_path) = config.tls_ca_cert.as_ref() {
        let pem = fs::read(cert_path).map_err(|err| {
            Error::ConfigError(format!(
                "failed to read directory CA certificate {}: {err}",
                cert_path.display()
            ))
        })?;
        let certificate = Certificate::from_pem(&pem).map_err(|err| {
            Error::ConfigError(format!("invalid directory CA certificate: {err}"))
        })?;
        let connector = TlsConnector::builder()
            .add_root_certificate(certificate)
            .build()
            .map_err(|err| {
                Error::ConfigError(format!("failed to load directory CA certificate: {err}"))
            })?;
        settings = settings.set_connector(connector);
    }

    Ok(settings)
}

fn map_ldap_error(operation: &str, err: ldap3::LdapError) -> Error {
    match err {
        ldap3::LdapError::LdapResult { result } => Error::transport(
            operation,
            format!("result code {}: {}", result.rc, result.text),
        ),
        other => Error::transport(operation, other.to_string()),
    }
}
