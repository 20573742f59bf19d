//! Organizational unit management over LDAP.
//!
//! This crate provides DN path arithmetic, a pluggable LDAP session abstraction with an
//! `ldap3` backend, and the create/exists/delete engine for organizational units confined
//! to an authorized search base.

#![deny(missing_docs)]

mod context;
mod dn;
mod ou;
mod resource;
mod session;
#[cfg(test)]
mod testing;

pub use context::{detect_search_base, DirectoryContext};
pub use dn::{DistinguishedName, DistinguishedNameError, RelativeDistinguishedName};
pub use resource::{OrganizationalUnitConfig, OrganizationalUnitResource, OrganizationalUnitState};
pub use session::{
    DirectoryAttribute, LdapConnector, LdapEntry, LdapSession, RealLdapConnector, SearchScope,
};

/// Convenient result alias that reuses the core error type.
pub type Result<T> = adldap_core::Result<T>;
