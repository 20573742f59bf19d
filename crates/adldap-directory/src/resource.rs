//! Declarative resource wrapper around the OU engine.
//!
//! Maps a configuration block (`distinguished_name`, `create_parents`) onto create, read,
//! delete and import calls. Both attributes force replacement when they change; there is
//! no in-place update.

use crate::context::DirectoryContext;
use crate::dn::DistinguishedName;
use adldap_core::{Error, Result};
use serde::{Deserialize, Serialize};
use tracing::{error, instrument};
use validator::Validate;

/// Desired configuration of an organizational unit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Validate)]
#[serde(deny_unknown_fields)]
pub struct OrganizationalUnitConfig {
    /// DN of the unit to manage
    #[validate(length(min = 1))]
    pub distinguished_name: String,

    /// Whether missing ancestors may be created
    #[serde(default)]
    pub create_parents: bool,
}

impl OrganizationalUnitConfig {
    /// Creates a configuration block.
    #[must_use]
    pub fn new(distinguished_name: impl Into<String>, create_parents: bool) -> Self {
        Self {
            distinguished_name: distinguished_name.into(),
            create_parents,
        }
    }

    /// Parses and validates a configuration block.
    ///
    /// # Errors
    ///
    /// Returns an error if the JSON is malformed, a field is unknown, or the DN is invalid.
    pub fn from_json(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        config.dn()?;
        Ok(config)
    }

    /// The configured DN.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidRequest`] if the DN does not parse.
    pub fn dn(&self) -> Result<DistinguishedName> {
        Ok(DistinguishedName::parse(&self.distinguished_name)?)
    }
}

/// Recorded state of a managed organizational unit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrganizationalUnitState {
    /// Resource identifier; always the DN.
    pub id: String,
    /// DN of the unit.
    pub distinguished_name: String,
}

impl OrganizationalUnitState {
    fn from_dn(dn: &DistinguishedName) -> Self {
        Self {
            id: dn.to_string(),
            distinguished_name: dn.to_string(),
        }
    }
}

/// Lifecycle operations for organizational units on one directory context.
pub struct OrganizationalUnitResource<'a> {
    context: &'a mut DirectoryContext,
}

impl<'a> OrganizationalUnitResource<'a> {
    /// Binds the resource type to a directory context.
    #[must_use]
    pub fn new(context: &'a mut DirectoryContext) -> Self {
        Self { context }
    }

    /// Creates the unit described by `config` and returns its state.
    ///
    /// # Errors
    ///
    /// Propagates every error of [`DirectoryContext::create_ou`].
    #[instrument(skip(self, config), fields(dn = %config.distinguished_name))]
    pub async fn create(
        &mut self,
        config: &OrganizationalUnitConfig,
    ) -> Result<OrganizationalUnitState> {
        config.validate()?;
        let dn = config.dn()?;
        self.context
            .create_ou(&dn, config.create_parents)
            .await
            .map_err(report)?;
        Ok(OrganizationalUnitState::from_dn(&dn))
    }

    /// Refreshes state for the unit identified by `id`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotFound`] when the unit no longer exists.
    #[instrument(skip(self))]
    pub async fn read(&mut self, id: &str) -> Result<OrganizationalUnitState> {
        let dn = DistinguishedName::parse(id)?;
        if self.context.ou_exists(&dn).await.map_err(report)? {
            Ok(OrganizationalUnitState::from_dn(&dn))
        } else {
            Err(Error::NotFound(format!(
                "unable to import non-existent organizational unit \"{dn}\""
            )))
        }
    }

    /// Deletes the unit recorded in `state`; absent units are ignored.
    ///
    /// # Errors
    ///
    /// Propagates every error of [`DirectoryContext::delete_ou`].
    #[instrument(skip(self, state), fields(dn = %state.distinguished_name))]
    pub async fn delete(&mut self, state: &OrganizationalUnitState) -> Result<()> {
        let dn = DistinguishedName::parse(&state.distinguished_name)?;
        self.context.delete_ou(&dn).await.map_err(report)
    }

    /// Adopts an existing unit by DN.
    ///
    /// # Errors
    ///
    /// Same as [`OrganizationalUnitResource::read`].
    pub async fn import(&mut self, id: &str) -> Result<OrganizationalUnitState> {
        self.read(id).await
    }

    /// Returns true when moving from `current` to `desired` needs destroy-and-create.
    #[must_use]
    pub fn requires_replacement(
        current: &OrganizationalUnitConfig,
        desired: &OrganizationalUnitConfig,
    ) -> bool {
        current != desired
    }
}

fn report(err: Error) -> Error {
    if err.should_log() {
        error!(code = err.error_code(), error = %err, "organizational unit operation failed");
    }
    err
}
