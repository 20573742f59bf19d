//! Organizational unit existence, creation and deletion.
//!
//! Every decision is taken from a fresh read of the directory. The check-then-write window
//! is not guarded; DN uniqueness in the directory is what rejects a concurrent duplicate.

use crate::context::DirectoryContext;
use crate::dn::DistinguishedName;
use crate::session::{DirectoryAttribute, SearchScope};
use adldap_core::{Error, Result};
use tracing::{debug, info, instrument};

const ORGANIZATIONAL_UNIT_CLASS: &str = "organizationalUnit";
const EXISTENCE_ATTRIBUTES: &[&str] = &["distinguishedName"];

impl DirectoryContext {
    /// Returns true when exactly one organizational unit with this DN exists under the
    /// search base.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Inconsistency`] when the search matches more than one entry, or the
    /// transport error of the search.
    #[instrument(skip(self, dn), fields(dn = %dn))]
    pub async fn ou_exists(&mut self, dn: &DistinguishedName) -> Result<bool> {
        let filter = organizational_unit_filter(dn);
        let base = self.search_base().to_string();
        debug!(base = %base, filter = %filter, "searching for organizational unit");

        let entries = self
            .session()
            .search(&base, SearchScope::Subtree, &filter, EXISTENCE_ATTRIBUTES)
            .await?;

        match entries.len() {
            0 => Ok(false),
            1 => Ok(true),
            n => Err(Error::Inconsistency(format!(
                "too many results ({n}) returned searching for DN \"{dn}\""
            ))),
        }
    }

    /// Creates an organizational unit.
    ///
    /// With `create_parents`, missing `OU=` ancestors between the search base and `dn` are
    /// created first, outermost first. Each level is checked against the search base and
    /// for prior existence before anything is written. Ancestors created before a failing
    /// add are left in place; repeating the call resumes from the first missing level.
    ///
    /// # Errors
    ///
    /// - [`Error::PolicyViolation`] if `dn` (or an ancestor to create) is outside the base
    /// - [`Error::AlreadyExists`] if `dn` is already present
    /// - [`Error::MissingParent`] if the parent is absent and `create_parents` is false
    /// - [`Error::InvalidRequest`] if an entry to create is not an `OU=` leaf
    /// - [`Error::Inconsistency`] or transport errors from the directory
    #[instrument(skip(self, dn), fields(dn = %dn))]
    pub async fn create_ou(&mut self, dn: &DistinguishedName, create_parents: bool) -> Result<()> {
        let mut pending = Vec::new();
        let mut current = dn.clone();

        loop {
            if !current.is_within(self.search_base()) {
                return Err(Error::PolicyViolation(format!(
                    "cannot create organizational unit \"{current}\" outside search base \"{}\"",
                    self.search_base()
                )));
            }

            if self.ou_exists(&current).await? {
                return Err(Error::AlreadyExists(format!(
                    "organizational unit \"{current}\" already exists"
                )));
            }

            let name = current.organizational_unit_name()?.to_string();
            let parent = current
                .parent()
                .filter(|parent| parent != self.search_base());
            pending.push((current, name));

            let Some(parent) = parent else {
                break;
            };
            if self.ou_exists(&parent).await? {
                break;
            }
            // Only reachable for the requested DN itself; ancestors are always auto-created.
            if !create_parents {
                return Err(Error::MissingParent(format!(
                    "parent for organizational unit \"{dn}\" does not exist"
                )));
            }

            debug!(parent = %parent, "parent organizational unit missing, creating it first");
            current = parent;
        }

        for (target, name) in pending.iter().rev() {
            self.add_organizational_unit(target, name).await?;
        }
        Ok(())
    }

    /// Deletes an organizational unit if it exists.
    ///
    /// Deleting an absent unit succeeds. Children are not touched; the directory decides
    /// whether a non-leaf unit may be removed and its error is returned unchanged.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Inconsistency`] or the transport error of the search or delete.
    #[instrument(skip(self, dn), fields(dn = %dn))]
    pub async fn delete_ou(&mut self, dn: &DistinguishedName) -> Result<()> {
        if !self.ou_exists(dn).await? {
            debug!("organizational unit not present, nothing to delete");
            return Ok(());
        }

        self.session().delete(dn.as_str()).await?;
        info!("organizational unit deleted");
        Ok(())
    }

    async fn add_organizational_unit(&mut self, dn: &DistinguishedName, name: &str) -> Result<()> {
        let attributes = [
            DirectoryAttribute::new("objectClass", [ORGANIZATIONAL_UNIT_CLASS]),
            DirectoryAttribute::new("ou", [name]),
        ];
        self.session().add(dn.as_str(), &attributes).await?;
        info!(dn = %dn, "organizational unit created");
        Ok(())
    }
}

/// Search filter matching exactly the organizational unit at `dn`.
pub(crate) fn organizational_unit_filter(dn: &DistinguishedName) -> String {
    format!(
        "(&(objectClass={ORGANIZATIONAL_UNIT_CLASS})(distinguishedName={}))",
        escape_filter_value(dn.as_str())
    )
}

fn escape_filter_value(value: &str) -> String {
    value
        .chars()
        .flat_map(|ch| match ch {
            '*' => "\\2a".chars().collect::<Vec<_>>(),
            '(' => "\\28".chars().collect(),
            ')' => "\\29".chars().collect(),
            '\\' => "\\5c".chars().collect(),
            '\0' => "\\00".chars().collect(),
            _ => vec![ch],
        })
        .collect::<String>()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::{LdapEntry, MockLdapSession};
    use crate::testing::{FakeDirectory, Operation};

    const BASE: &str = "DC=corp,DC=com";

    fn dn(input: &str) -> DistinguishedName {
        DistinguishedName::parse(input).unwrap()
    }

    fn mock_context(session: MockLdapSession) -> DirectoryContext {
        DirectoryContext::new(Box::new(session), dn(BASE))
    }

    #[test]
    fn filter_matches_class_and_dn() {
        assert_eq!(
            organizational_unit_filter(&dn("OU=Sales,DC=corp,DC=com")),
            "(&(objectClass=organizationalUnit)(distinguishedName=OU=Sales,DC=corp,DC=com))"
        );
    }

    #[test]
    fn filter_escapes_special_characters() {
        assert_eq!(
            organizational_unit_filter(&dn("OU=a*)(b\\,c,DC=com")),
            "(&(objectClass=organizationalUnit)(distinguishedName=OU=a\\2a\\29\\28b\\5c,c,DC=com))"
        );
    }

    #[tokio::test]
    async fn exists_searches_subtree_of_base() {
        let mut session = MockLdapSession::new();
        session
            .expect_search()
            .withf(|base, scope, filter, attributes| {
                base == BASE
                    && *scope == SearchScope::Subtree
                    && filter.contains("(distinguishedName=OU=Sales,DC=corp,DC=com)")
                    && attributes == ["distinguishedName"]
            })
            .times(1)
            .returning(|_, _, _, _| Ok(vec![LdapEntry::new("OU=Sales,DC=corp,DC=com")]));

        let mut context = mock_context(session);
        assert!(context
            .ou_exists(&dn("OU=Sales,DC=corp,DC=com"))
            .await
            .unwrap());
    }

    #[tokio::test]
    async fn exists_false_without_matches() {
        let mut session = MockLdapSession::new();
        session
            .expect_search()
            .returning(|_, _, _, _| Ok(Vec::new()));

        let mut context = mock_context(session);
        assert!(!context
            .ou_exists(&dn("OU=Sales,DC=corp,DC=com"))
            .await
            .unwrap());
    }

    #[tokio::test]
    async fn exists_rejects_ambiguous_results() {
        let mut session = MockLdapSession::new();
        session.expect_search().returning(|_, _, _, _| {
            Ok(vec![
                LdapEntry::new("OU=Sales,DC=corp,DC=com"),
                LdapEntry::new("OU=Sales,DC=corp,DC=com"),
            ])
        });

        let mut context = mock_context(session);
        let result = context.ou_exists(&dn("OU=Sales,DC=corp,DC=com")).await;
        assert!(matches!(result, Err(Error::Inconsistency(_))));
    }

    #[tokio::test]
    async fn exists_surfaces_search_failure() {
        let mut session = MockLdapSession::new();
        session
            .expect_search()
            .returning(|_, _, _, _| {
                Err(Error::transport("search", "result code 1: operationsError"))
            });

        let mut context = mock_context(session);
        let result = context.ou_exists(&dn("OU=Sales,DC=corp,DC=com")).await;
        assert!(matches!(result, Err(Error::Transport { .. })));
    }

    #[tokio::test]
    async fn create_directly_under_base() {
        let directory = FakeDirectory::default();
        let mut context = directory.context(BASE);

        context
            .create_ou(&dn("OU=Sales,DC=corp,DC=com"), false)
            .await
            .unwrap();

        assert_eq!(directory.adds(), vec!["OU=Sales,DC=corp,DC=com"]);
        let attributes = directory.attributes_of("OU=Sales,DC=corp,DC=com").unwrap();
        assert!(attributes.contains(&DirectoryAttribute::new(
            "objectClass",
            ["organizationalUnit"]
        )));
        assert!(attributes.contains(&DirectoryAttribute::new("ou", ["Sales"])));
    }

    #[tokio::test]
    async fn create_then_exists() {
        let directory = FakeDirectory::default();
        let mut context = directory.context(BASE);
        let target = dn("OU=Sales,DC=corp,DC=com");

        assert!(!context.ou_exists(&target).await.unwrap());
        context.create_ou(&target, false).await.unwrap();
        assert!(context.ou_exists(&target).await.unwrap());
    }

    #[tokio::test]
    async fn create_outside_base_writes_nothing() {
        let directory = FakeDirectory::default();
        let mut context = directory.context(BASE);

        let result = context.create_ou(&dn("OU=X,DC=evil"), true).await;

        assert!(matches!(result, Err(Error::PolicyViolation(_))));
        assert!(directory.operations().is_empty());
    }

    #[tokio::test]
    async fn create_existing_fails() {
        let directory = FakeDirectory::with_entries(&["OU=Sales,DC=corp,DC=com"]);
        let mut context = directory.context(BASE);

        let result = context.create_ou(&dn("OU=Sales,DC=corp,DC=com"), true).await;

        assert!(matches!(result, Err(Error::AlreadyExists(_))));
        assert!(directory.adds().is_empty());
    }

    #[tokio::test]
    async fn create_missing_parent_without_auto_create() {
        let directory = FakeDirectory::default();
        let mut context = directory.context(BASE);

        let result = context
            .create_ou(&dn("OU=Child,OU=Missing,DC=corp,DC=com"), false)
            .await;

        match result {
            Err(Error::MissingParent(message)) => {
                assert!(message.contains("OU=Child,OU=Missing,DC=corp,DC=com"));
            }
            other => panic!("expected MissingParent, got {other:?}"),
        }
        assert!(directory.adds().is_empty());
        assert!(directory.deletes().is_empty());
    }

    #[tokio::test]
    async fn create_with_existing_parent() {
        let directory = FakeDirectory::with_entries(&["OU=Parent,DC=corp,DC=com"]);
        let mut context = directory.context(BASE);

        context
            .create_ou(&dn("OU=Child,OU=Parent,DC=corp,DC=com"), false)
            .await
            .unwrap();

        assert_eq!(directory.adds(), vec!["OU=Child,OU=Parent,DC=corp,DC=com"]);
    }

    #[tokio::test]
    async fn create_parents_top_down() {
        let directory = FakeDirectory::default();
        let mut context = directory.context(BASE);
        let target = dn("OU=Child,OU=Missing,DC=corp,DC=com");

        context.create_ou(&target, true).await.unwrap();

        assert_eq!(
            directory.adds(),
            vec![
                "OU=Missing,DC=corp,DC=com",
                "OU=Child,OU=Missing,DC=corp,DC=com"
            ]
        );

        let retry = context.create_ou(&target, true).await;
        assert!(matches!(retry, Err(Error::AlreadyExists(ref m)) if m.contains("OU=Child")));
        assert_eq!(directory.adds().len(), 2);
    }

    #[tokio::test]
    async fn create_parents_only_where_missing() {
        let directory = FakeDirectory::with_entries(&["OU=A,DC=corp,DC=com"]);
        let mut context = directory.context(BASE);

        context
            .create_ou(&dn("OU=D,OU=C,OU=B,OU=A,DC=corp,DC=com"), true)
            .await
            .unwrap();

        assert_eq!(
            directory.adds(),
            vec![
                "OU=B,OU=A,DC=corp,DC=com",
                "OU=C,OU=B,OU=A,DC=corp,DC=com",
                "OU=D,OU=C,OU=B,OU=A,DC=corp,DC=com"
            ]
        );
    }

    #[tokio::test]
    async fn create_checks_every_level_before_writing() {
        let directory = FakeDirectory::default();
        let mut context = directory.context(BASE);

        context
            .create_ou(&dn("OU=Child,OU=Missing,DC=corp,DC=com"), true)
            .await
            .unwrap();

        let first_add = directory
            .operations()
            .iter()
            .position(|op| matches!(op, Operation::Add(_)))
            .unwrap();
        let searches_before_first_add = directory.operations()[..first_add]
            .iter()
            .filter(|op| matches!(op, Operation::Search(_)))
            .count();
        // child, parent of child, parent again as its own target
        assert_eq!(searches_before_first_add, 3);
    }

    #[tokio::test]
    async fn create_partial_failure_keeps_ancestors_and_retry_resumes() {
        let directory = FakeDirectory::default();
        directory.fail_add_of("OU=Child,OU=Missing,DC=corp,DC=com");
        let mut context = directory.context(BASE);
        let target = dn("OU=Child,OU=Missing,DC=corp,DC=com");

        let result = context.create_ou(&target, true).await;
        assert!(matches!(result, Err(Error::Transport { .. })));
        assert_eq!(directory.entries(), vec!["OU=Missing,DC=corp,DC=com"]);

        directory.clear_failure();
        context.create_ou(&target, true).await.unwrap();
        assert_eq!(
            directory.adds(),
            vec![
                "OU=Missing,DC=corp,DC=com",
                "OU=Child,OU=Missing,DC=corp,DC=com",
                "OU=Child,OU=Missing,DC=corp,DC=com"
            ]
        );
        assert_eq!(directory.entries().len(), 2);
    }

    #[tokio::test]
    async fn create_non_ou_leaf_is_rejected_before_writing() {
        let directory = FakeDirectory::default();
        let mut context = directory.context(BASE);

        let result = context
            .create_ou(&dn("CN=Service,OU=Missing,DC=corp,DC=com"), true)
            .await;

        assert!(matches!(result, Err(Error::InvalidRequest(_))));
        assert!(directory.adds().is_empty());
    }

    #[tokio::test]
    async fn create_parent_under_non_ou_container_is_rejected() {
        let directory = FakeDirectory::default();
        let mut context = directory.context(BASE);

        let result = context
            .create_ou(&dn("OU=Apps,CN=Users,DC=corp,DC=com"), true)
            .await;

        assert!(matches!(result, Err(Error::InvalidRequest(_))));
        assert!(directory.adds().is_empty());
    }

    #[tokio::test]
    async fn create_inconsistent_parent_lookup_writes_nothing() {
        let mut session = MockLdapSession::new();
        let mut sequence = mockall::Sequence::new();
        session
            .expect_search()
            .times(1)
            .in_sequence(&mut sequence)
            .returning(|_, _, _, _| Ok(Vec::new()));
        session
            .expect_search()
            .times(1)
            .in_sequence(&mut sequence)
            .returning(|_, _, _, _| {
                Ok(vec![
                    LdapEntry::new("OU=Parent,DC=corp,DC=com"),
                    LdapEntry::new("OU=Parent,DC=corp,DC=com"),
                ])
            });
        session.expect_add().never();

        let mut context = mock_context(session);
        let result = context
            .create_ou(&dn("OU=Child,OU=Parent,DC=corp,DC=com"), true)
            .await;
        assert!(matches!(result, Err(Error::Inconsistency(_))));
    }

    #[tokio::test]
    async fn delete_existing() {
        let directory = FakeDirectory::with_entries(&["OU=Sales,DC=corp,DC=com"]);
        let mut context = directory.context(BASE);

        context
            .delete_ou(&dn("OU=Sales,DC=corp,DC=com"))
            .await
            .unwrap();

        assert_eq!(directory.deletes(), vec!["OU=Sales,DC=corp,DC=com"]);
        assert!(directory.entries().is_empty());
    }

    #[tokio::test]
    async fn delete_twice_is_idempotent() {
        let directory = FakeDirectory::with_entries(&["OU=Sales,DC=corp,DC=com"]);
        let mut context = directory.context(BASE);
        let target = dn("OU=Sales,DC=corp,DC=com");

        context.delete_ou(&target).await.unwrap();
        context.delete_ou(&target).await.unwrap();

        assert_eq!(directory.deletes().len(), 1);
    }

    #[tokio::test]
    async fn delete_does_not_cascade() {
        let directory = FakeDirectory::with_entries(&[
            "OU=Parent,DC=corp,DC=com",
            "OU=Child,OU=Parent,DC=corp,DC=com",
        ]);
        let mut context = directory.context(BASE);

        let result = context.delete_ou(&dn("OU=Parent,DC=corp,DC=com")).await;

        assert!(
            matches!(result, Err(Error::Transport { ref message, .. }) if message.contains("66"))
        );
        assert_eq!(directory.entries().len(), 2);
    }
}
