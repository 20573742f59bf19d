//! In-memory directory used by unit tests.

use crate::context::DirectoryContext;
use crate::dn::DistinguishedName;
use crate::ou::organizational_unit_filter;
use crate::session::{DirectoryAttribute, LdapEntry, LdapSession, SearchScope};
use adldap_core::{Error, Result};
use async_trait::async_trait;
use std::sync::{Arc, Mutex, MutexGuard};

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Operation {
    Search(String),
    Add(String),
    Delete(String),
}

#[derive(Debug, Default)]
struct DirectoryState {
    entries: Vec<(String, Vec<DirectoryAttribute>)>,
    operations: Vec<Operation>,
    failing_add: Option<String>,
}

/// Cloneable handle to a shared in-memory tree; one clone goes into the context, the test
/// keeps another to inspect what was written.
#[derive(Debug, Clone, Default)]
pub(crate) struct FakeDirectory {
    state: Arc<Mutex<DirectoryState>>,
}

impl FakeDirectory {
    pub(crate) fn with_entries(dns: &[&str]) -> Self {
        let directory = Self::default();
        directory.lock().entries = dns
            .iter()
            .map(|dn| ((*dn).to_string(), Vec::new()))
            .collect();
        directory
    }

    pub(crate) fn context(&self, base: &str) -> DirectoryContext {
        DirectoryContext::new(
            Box::new(self.clone()),
            DistinguishedName::parse(base).unwrap(),
        )
    }

    pub(crate) fn fail_add_of(&self, dn: &str) {
        self.lock().failing_add = Some(dn.to_string());
    }

    pub(crate) fn clear_failure(&self) {
        self.lock().failing_add = None;
    }

    pub(crate) fn entries(&self) -> Vec<String> {
        self.lock()
            .entries
            .iter()
            .map(|(dn, _)| dn.clone())
            .collect()
    }

    pub(crate) fn attributes_of(&self, dn: &str) -> Option<Vec<DirectoryAttribute>> {
        self.lock()
            .entries
            .iter()
            .find(|(entry, _)| entry == dn)
            .map(|(_, attributes)| attributes.clone())
    }

    pub(crate) fn operations(&self) -> Vec<Operation> {
        self.lock().operations.clone()
    }

    pub(crate) fn adds(&self) -> Vec<String> {
        self.operations()
            .into_iter()
            .filter_map(|op| match op {
                Operation::Add(dn) => Some(dn),
                _ => None,
            })
            .collect()
    }

    pub(crate) fn deletes(&self) -> Vec<String> {
        self.operations()
            .into_iter()
            .filter_map(|op| match op {
                Operation::Delete(dn) => Some(dn),
                _ => None,
            })
            .collect()
    }

    fn lock(&self) -> MutexGuard<'_, DirectoryState> {
        self.state.lock().unwrap()
    }
}

fn result_error(operation: &str, code: u32, text: &str) -> Error {
    Error::transport(operation, format!("result code {code}: {text}"))
}

#[async_trait]
impl LdapSession for FakeDirectory {
    async fn simple_bind(&mut self, _dn: &str, _password: &str) -> Result<()> {
        Ok(())
    }

    async fn search(
        &mut self,
        _base_dn: &str,
        _scope: SearchScope,
        filter: &str,
        _attributes: &[&'static str],
    ) -> Result<Vec<LdapEntry>> {
        let mut state = self.lock();
        state.operations.push(Operation::Search(filter.to_string()));
        Ok(state
            .entries
            .iter()
            .filter(|(dn, _)| {
                DistinguishedName::parse(dn)
                    .map(|parsed| organizational_unit_filter(&parsed) == filter)
                    .unwrap_or(false)
            })
            .map(|(dn, _)| {
                LdapEntry::new(dn.clone()).with_attribute("distinguishedName", [dn.clone()])
            })
            .collect())
    }

    async fn add(&mut self, dn: &str, attributes: &[DirectoryAttribute]) -> Result<()> {
        let mut state = self.lock();
        state.operations.push(Operation::Add(dn.to_string()));
        if state.failing_add.as_deref() == Some(dn) {
            return Err(result_error("add", 53, "unwillingToPerform"));
        }
        if state.entries.iter().any(|(entry, _)| entry == dn) {
            return Err(result_error("add", 68, "entryAlreadyExists"));
        }
        state.entries.push((dn.to_string(), attributes.to_vec()));
        Ok(())
    }

    async fn delete(&mut self, dn: &str) -> Result<()> {
        let mut state = self.lock();
        state.operations.push(Operation::Delete(dn.to_string()));
        let suffix = format!(",{dn}");
        if state.entries.iter().any(|(entry, _)| entry.ends_with(&suffix)) {
            return Err(result_error("delete", 66, "notAllowedOnNonLeaf"));
        }
        let before = state.entries.len();
        state.entries.retain(|(entry, _)| entry != dn);
        if state.entries.len() == before {
            return Err(result_error("delete", 32, "noSuchObject"));
        }
        Ok(())
    }

    async fn unbind(&mut self) -> Result<()> {
        Ok(())
    }
}
