//! Store identities and insertion-ordered identity sets

use hashlink::LinkedHashSet;
use serde::{Deserialize, Serialize};
use std::borrow::Borrow;
use std::fmt;

/// A principal name recognized by the document store's auth layer
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Identity(String);

impl Identity {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_inner(self) -> String {
        self.0
    }

    /// Whether the name can be stored as a store username.
    ///
    /// Rejects empty names and names carrying control characters. Quoting is
    /// handled by the compiler's serializer, so quotes and backslashes are fine.
    pub fn is_well_formed(&self) -> bool {
        !self.0.is_empty() && !self.0.chars().any(char::is_control)
    }
}

impl fmt::Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Identity {
    fn from(name: &str) -> Self {
        Self::new(name)
    }
}

impl From<String> for Identity {
    fn from(name: String) -> Self {
        Self(name)
    }
}

impl AsRef<str> for Identity {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

// Hash and Eq are derived from the inner String, so lookups by &str agree
impl Borrow<str> for Identity {
    fn borrow(&self) -> &str {
        &self.0
    }
}

/// A de-duplicated set of identities that remembers first-insertion order.
///
/// Order only affects how the set is rendered (owner first keeps generated
/// documents readable). Equality is plain set equality.
#[derive(Clone, Default)]
pub struct IdentitySet {
    inner: LinkedHashSet<Identity>,
}

impl IdentitySet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set holding a single identity
    pub fn with(identity: Identity) -> Self {
        let mut set = Self::new();
        set.insert(identity);
        set
    }

    /// Insert an identity, returning `false` if it was already present
    pub fn insert(&mut self, identity: Identity) -> bool {
        // `LinkedHashSet::insert` moves an existing entry to the back; `replace` keeps it in place
        self.inner.replace(identity).is_none()
    }

    pub fn extend<I: IntoIterator<Item = Identity>>(&mut self, identities: I) {
        for identity in identities {
            self.insert(identity);
        }
    }

    pub fn contains(&self, identity: &Identity) -> bool {
        self.inner.contains(identity)
    }

    /// Membership test by raw name
    pub fn contains_name(&self, name: &str) -> bool {
        self.inner.contains(name)
    }

    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Identity> {
        self.inner.iter()
    }

    /// Union of two sets; `self`'s order first, then new entries from `other`
    pub fn union(&self, other: &IdentitySet) -> IdentitySet {
        let mut merged = self.clone();
        merged.extend(other.iter().cloned());
        merged
    }

    pub fn is_superset(&self, other: &IdentitySet) -> bool {
        other.iter().all(|identity| self.contains(identity))
    }

    /// Names in insertion order
    pub fn names(&self) -> Vec<String> {
        self.inner.iter().map(|identity| identity.as_str().to_string()).collect()
    }
}

impl PartialEq for IdentitySet {
    fn eq(&self, other: &Self) -> bool {
        self.len() == other.len() && self.is_superset(other)
    }
}

impl Eq for IdentitySet {}

impl fmt::Debug for IdentitySet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.inner.iter()).finish()
    }
}

impl FromIterator<Identity> for IdentitySet {
    fn from_iter<I: IntoIterator<Item = Identity>>(iter: I) -> Self {
        let mut set = Self::new();
        set.extend(iter);
        set
    }
}

impl<'a> IntoIterator for &'a IdentitySet {
    type Item = &'a Identity;
    type IntoIter = hashlink::linked_hash_set::Iter<'a, Identity>;

    fn into_iter(self) -> Self::IntoIter {
        self.inner.iter()
    }
}

impl Serialize for IdentitySet {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_seq(self.inner.iter())
    }
}

impl<'de> Deserialize<'de> for IdentitySet {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let names = Vec::<Identity>::deserialize(deserializer)?;
        Ok(names.into_iter().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn set(names: &[&str]) -> IdentitySet {
        names.iter().map(|name| Identity::from(*name)).collect()
    }

    #[test]
    fn test_insert_deduplicates_and_keeps_first_position() {
        let mut users = set(&["alice", "bob"]);
        assert!(!users.insert(Identity::from("alice")));
        assert!(users.insert(Identity::from("carol")));
        assert_eq!(users.names(), vec!["alice", "bob", "carol"]);

        assert!(!users.insert(Identity::from("bob")));
        assert_eq!(users.names(), vec!["alice", "bob", "carol"]);
        assert_eq!(users.len(), 3);
    }

    #[test]
    fn test_contains_name() {
        let users = set(&["alice", "it's \"bob\""]);
        assert!(users.contains_name("alice"));
        assert!(users.contains_name("it's \"bob\""));
        assert!(!users.contains_name("Alice"));
        assert!(!users.contains_name(""));
        assert_eq!(users.contains_name("alice"), users.contains(&Identity::from("alice")));
    }

    #[test]
    fn test_equality_ignores_order() {
        assert_eq!(set(&["alice", "bob"]), set(&["bob", "alice"]));
        assert_ne!(set(&["alice"]), set(&["alice", "bob"]));
    }

    #[test]
    fn test_union_is_superset_of_both() {
        let readers = set(&["alice", "public"]);
        let writers = set(&["alice", "bob"]);
        let members = readers.union(&writers);

        assert_eq!(members.names(), vec!["alice", "public", "bob"]);
        assert!(members.is_superset(&readers));
        assert!(members.is_superset(&writers));
    }

    #[test]
    fn test_well_formed_identity() {
        assert!(Identity::from("alice").is_well_formed());
        assert!(Identity::from("o'brien\"x").is_well_formed());
        assert!(!Identity::from("").is_well_formed());
        assert!(!Identity::from("bad\nname").is_well_formed());
    }

    #[test]
    fn test_serializes_as_plain_list() {
        let json = serde_json::to_string(&set(&["alice", "bob"])).unwrap();
        assert_eq!(json, r#"["alice","bob"]"#);

        let parsed: IdentitySet = serde_json::from_str(r#"["bob","alice","bob"]"#).unwrap();
        assert_eq!(parsed, set(&["alice", "bob"]));
        assert_eq!(parsed.len(), 2);
    }
}
