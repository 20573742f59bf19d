//! Provider configuration.
//!
//! A [`ProviderConfig`] describes how to reach and authenticate against the directory and
//! which subtree the OU engine is authorized to manage. It can be built programmatically,
//! deserialized from a JSON configuration block, or read from `ADLDAP_*` environment
//! variables.

use crate::Error;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Deserializer};
use std::path::PathBuf;
use std::time::Duration;
use url::Url;
use validator::Validate;

/// Environment variable holding the directory URL.
pub const ENV_URL: &str = "ADLDAP_URL";
/// Environment variable holding the bind account.
pub const ENV_BIND_ACCOUNT: &str = "ADLDAP_BIND_ACCOUNT";
/// Environment variable holding the bind password.
pub const ENV_BIND_PASSWORD: &str = "ADLDAP_BIND_PASSWORD";
/// Environment variable holding the search base.
pub const ENV_SEARCH_BASE: &str = "ADLDAP_SEARCH_BASE";
/// Environment variable toggling TLS certificate verification.
pub const ENV_TLS_VERIFY: &str = "ADLDAP_TLS_VERIFY";

/// Default connection timeout (seconds).
pub const DEFAULT_CONNECTION_TIMEOUT_SECS: u64 = 10;
/// Default operation timeout (seconds).
pub const DEFAULT_OPERATION_TIMEOUT_SECS: u64 = 10;

/// Account used to bind to the directory.
#[derive(Debug, Clone)]
pub struct BindCredentials {
    account: String,
    password: SecretString,
}

impl BindCredentials {
    /// Create new bind credentials.
    #[must_use]
    pub fn new(account: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            account: account.into(),
            password: SecretString::from(password.into()),
        }
    }

    /// Bind principal (a DN or a `user@domain` name).
    #[must_use]
    pub fn account(&self) -> &str {
        &self.account
    }

    /// Bind password.
    #[must_use]
    pub fn password(&self) -> &str {
        self.password.expose_secret()
    }
}

/// Configuration for a provider session.
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct ProviderConfig {
    /// Directory URL (`ldap://` or `ldaps://`)
    #[validate(url)]
    pub url: String,

    /// Bind principal
    #[validate(length(min = 1))]
    pub bind_account: String,

    /// Bind password
    #[serde(deserialize_with = "deserialize_secret")]
    pub bind_password: SecretString,

    /// Authorized root of the managed subtree; discovered from the server when absent or
    /// blank
    #[serde(default, deserialize_with = "deserialize_search_base")]
    pub search_base: Option<String>,

    /// Whether to verify TLS certificates
    #[serde(default = "default_tls_verify")]
    pub tls_verify: bool,

    /// Optional path to custom CA certificate
    #[serde(default)]
    pub tls_ca_cert: Option<PathBuf>,

    /// Connection timeout in seconds
    #[validate(range(min = 1, max = 300))]
    #[serde(default = "default_connection_timeout_secs")]
    pub connection_timeout_secs: u64,

    /// Per-operation timeout in seconds
    #[validate(range(min = 1, max = 300))]
    #[serde(default = "default_operation_timeout_secs")]
    pub operation_timeout_secs: u64,
}

const fn default_tls_verify() -> bool {
    true
}

const fn default_connection_timeout_secs() -> u64 {
    DEFAULT_CONNECTION_TIMEOUT_SECS
}

const fn default_operation_timeout_secs() -> u64 {
    DEFAULT_OPERATION_TIMEOUT_SECS
}

fn deserialize_secret<'de, D>(deserializer: D) -> Result<SecretString, D::Error>
where
    D: Deserializer<'de>,
{
    String::deserialize(deserializer).map(SecretString::from)
}

fn deserialize_search_base<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Option::<String>::deserialize(deserializer).map(|base| base.and_then(non_blank))
}

fn non_blank(value: String) -> Option<String> {
    if value.trim().is_empty() {
        None
    } else {
        Some(value)
    }
}

impl ProviderConfig {
    /// Create a new provider configuration with required parameters.
    ///
    /// # Errors
    ///
    /// Returns an error if the URL is invalid or validation fails.
    pub fn new(
        url: impl Into<String>,
        bind_account: impl Into<String>,
        bind_password: impl Into<String>,
    ) -> Result<Self, Error> {
        let config = Self {
            url: url.into(),
            bind_account: bind_account.into(),
            bind_password: SecretString::from(bind_password.into()),
            search_base: None,
            tls_verify: default_tls_verify(),
            tls_ca_cert: None,
            connection_timeout_secs: DEFAULT_CONNECTION_TIMEOUT_SECS,
            operation_timeout_secs: DEFAULT_OPERATION_TIMEOUT_SECS,
        };
        config.check()?;
        Ok(config)
    }

    /// Parses a provider configuration block.
    ///
    /// # Errors
    ///
    /// Returns an error if the JSON is malformed or the result fails validation.
    pub fn from_json(json: &str) -> Result<Self, Error> {
        let config: Self = serde_json::from_str(json)?;
        config.check()?;
        Ok(config)
    }

    /// Reads the configuration from `ADLDAP_*` environment variables.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ConfigError`] when a required variable is missing.
    pub fn from_env() -> Result<Self, Error> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds the configuration from an arbitrary key lookup.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ConfigError`] when a required key is missing or a value is invalid.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, Error>
    where
        F: Fn(&str) -> Option<String>,
    {
        let required = |key: &str| {
            lookup(key)
                .filter(|value| !value.is_empty())
                .ok_or_else(|| Error::ConfigError(format!("{key} is not set")))
        };

        let mut config = Self::new(
            required(ENV_URL)?,
            required(ENV_BIND_ACCOUNT)?,
            required(ENV_BIND_PASSWORD)?,
        )?;

        if let Some(base) = lookup(ENV_SEARCH_BASE) {
            config = config.with_search_base(base);
        }

        if let Some(raw) = lookup(ENV_TLS_VERIFY) {
            let verify = match raw.to_ascii_lowercase().as_str() {
                "1" | "true" | "yes" => true,
                "0" | "false" | "no" => false,
                other => {
                    return Err(Error::ConfigError(format!(
                        "{ENV_TLS_VERIFY} must be a boolean, got `{other}`"
                    )))
                }
            };
            config = config.with_tls_verify(verify);
        }

        Ok(config)
    }

    /// Bind credentials from this configuration.
    #[must_use]
    pub fn credentials(&self) -> BindCredentials {
        BindCredentials {
            account: self.bind_account.clone(),
            password: self.bind_password.clone(),
        }
    }

    /// Set the search base. A blank value clears it so the base is discovered instead.
    #[must_use]
    pub fn with_search_base(mut self, search_base: impl Into<String>) -> Self {
        self.search_base = non_blank(search_base.into());
        self
    }

    /// Set whether to verify TLS certificates.
    #[must_use]
    pub const fn with_tls_verify(mut self, verify: bool) -> Self {
        self.tls_verify = verify;
        self
    }

    /// Set custom CA certificate path.
    #[must_use]
    pub fn with_ca_cert(mut self, path: PathBuf) -> Self {
        self.tls_ca_cert = Some(path);
        self
    }

    /// Overrides the connection timeout in seconds.
    #[must_use]
    pub const fn with_connection_timeout_secs(mut self, seconds: u64) -> Self {
        self.connection_timeout_secs = seconds;
        self
    }

    /// Overrides the operation timeout in seconds.
    #[must_use]
    pub const fn with_operation_timeout_secs(mut self, seconds: u64) -> Self {
        self.operation_timeout_secs = seconds;
        self
    }

    /// Connection timeout as a Duration.
    #[must_use]
    pub const fn connection_timeout(&self) -> Duration {
        Duration::from_secs(self.connection_timeout_secs)
    }

    /// Operation timeout as a Duration.
    #[must_use]
    pub const fn operation_timeout(&self) -> Duration {
        Duration::from_secs(self.operation_timeout_secs)
    }

    /// Parse the directory URL.
    ///
    /// # Errors
    ///
    /// Returns an error if the URL cannot be parsed or is not an LDAP URL.
    pub fn parse_url(&self) -> Result<Url, Error> {
        let url = Url::parse(&self.url)?;
        match url.scheme() {
            "ldap" | "ldaps" => Ok(url),
            other => Err(Error::ConfigError(format!(
                "unsupported directory URL scheme `{other}`"
            ))),
        }
    }

    fn check(&self) -> Result<(), Error> {
        self.validate()
            .map_err(|e| Error::ConfigError(format!("Invalid configuration: {e}")))?;
        self.parse_url()?;
        Ok(())
    }
}
