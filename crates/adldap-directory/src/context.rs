//! Session context shared by every OU operation.

use crate::dn::DistinguishedName;
use crate::session::{LdapConnector, LdapSession, RealLdapConnector, SearchScope};
use adldap_core::{Error, ProviderConfig, Result};
use std::sync::Arc;
use tracing::{info, instrument, warn};

const ROOT_DSE_ATTRIBUTES: &[&str] = &["defaultNamingContext", "namingContexts"];

/// An authenticated directory session bound to an authorized search base.
///
/// The context owns the connection; every operation borrows it mutably, so calls on one
/// context are serialized. The search base never changes after construction.
pub struct DirectoryContext {
    session: Box<dyn LdapSession>,
    search_base: DistinguishedName,
}

impl DirectoryContext {
    /// Wraps an already authenticated session.
    #[must_use]
    pub fn new(session: Box<dyn LdapSession>, search_base: DistinguishedName) -> Self {
        Self {
            session,
            search_base,
        }
    }

    /// Connects to the directory described by `config` using the `ldap3` backend.
    ///
    /// # Errors
    ///
    /// See [`DirectoryContext::connect`].
    pub async fn open(config: ProviderConfig) -> Result<Self> {
        let config = Arc::new(config);
        let connector = RealLdapConnector::new(Arc::clone(&config));
        Self::connect(&connector, &config).await
    }

    /// Connects, binds with the configured account and resolves the search base.
    ///
    /// When the configuration has no search base it is read from the RootDSE. The bound
    /// session is unbound again if the base cannot be resolved.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Transport`] when connecting or binding fails, and
    /// [`Error::InvalidRequest`] or [`Error::NotFound`] when the search base cannot be
    /// resolved.
    #[instrument(skip(connector, config), fields(url = %config.url))]
    pub async fn connect(connector: &dyn LdapConnector, config: &ProviderConfig) -> Result<Self> {
        let mut session = connector.connect().await?;
        let credentials = config.credentials();
        session
            .simple_bind(credentials.account(), credentials.password())
            .await?;

        let resolved = resolve_search_base(session.as_mut(), config).await;
        match resolved {
            Ok(search_base) => Ok(Self::new(session, search_base)),
            Err(err) => {
                if let Err(unbind_err) = session.unbind().await {
                    warn!(error = %unbind_err, "unbind after failed search base lookup failed");
                }
                Err(err)
            }
        }
    }

    /// The authorized root of the managed subtree.
    #[must_use]
    pub fn search_base(&self) -> &DistinguishedName {
        &self.search_base
    }

    pub(crate) fn session(&mut self) -> &mut dyn LdapSession {
        self.session.as_mut()
    }

    /// Unbinds and drops the session.
    ///
    /// # Errors
    ///
    /// Returns the transport error reported by the unbind.
    pub async fn close(mut self) -> Result<()> {
        self.session.unbind().await
    }
}

async fn resolve_search_base(
    session: &mut dyn LdapSession,
    config: &ProviderConfig,
) -> Result<DistinguishedName> {
    match config.search_base.as_deref() {
        Some(base) => Ok(DistinguishedName::parse(base)?),
        None => {
            let detected = detect_search_base(session).await?;
            info!(search_base = %detected, "detected search base");
            Ok(detected)
        }
    }
}

/// Reads the directory's default naming context from the RootDSE.
///
/// Falls back to the first advertised `namingContexts` value for servers that do not
/// publish `defaultNamingContext`.
///
/// # Errors
///
/// Returns [`Error::NotFound`] when the RootDSE advertises no naming context.
pub async fn detect_search_base(session: &mut dyn LdapSession) -> Result<DistinguishedName> {
    let entries = session
        .search("", SearchScope::Base, "(objectClass=*)", ROOT_DSE_ATTRIBUTES)
        .await?;

    let naming_context = match entries
        .iter()
        .find_map(|entry| entry.first("defaultNamingContext"))
    {
        Some(context) => context,
        None => {
            let fallback = entries
                .iter()
                .find_map(|entry| entry.first("namingContexts"))
                .ok_or_else(|| {
                    Error::NotFound("RootDSE does not advertise a naming context".to_string())
                })?;
            warn!(naming_context = %fallback, "no defaultNamingContext, using namingContexts");
            fallback
        }
    };

    Ok(DistinguishedName::parse(naming_context)?)
}
