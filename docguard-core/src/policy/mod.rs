//! Permission policies and their resolution into store user sets
//!
//! A [`PermissionPolicy`] says who may read, write and delete in a database
//! using three scopes (`private`, `users`, `public`) and DID lists. The
//! resolver turns it into concrete [`ResolvedUserSets`] for one owner and one
//! application namespace.
//!
//! ## Resolution rules
//!
//! - The owner is always in every set.
//! - `write: users` grants write to `writeList` and delete to `deleteList`.
//! - `write: public` grants write to the public identity and delete to
//!   `deleteList`, never to the public identity; the compiler then emits a
//!   delete-guard.
//! - `read: users` / `read: public` extend the read set likewise.
//! - `members = readUsers ∪ writeUsers`.

mod error;
mod identity;
mod resolver;
mod translate;

pub use error::{PolicyError, PolicyResult};
pub use identity::{Identity, IdentitySet};
pub use resolver::{resolve, ResolvedUserSets};
pub use translate::{validate_did, HashedDidTranslator, IdentityTranslator};

use serde::{Deserialize, Serialize};
use std::fmt;

/// Who may perform one class of operation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Scope {
    /// Owner only
    #[default]
    Private,
    /// Owner plus the users named in the matching list
    Users,
    /// Anyone, via the store's public identity
    Public,
}

impl Scope {
    pub fn as_str(&self) -> &'static str {
        match self {
            Scope::Private => "private",
            Scope::Users => "users",
            Scope::Public => "public",
        }
    }
}

impl fmt::Display for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Declarative permission policy for one database
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PermissionPolicy {
    pub read: Scope,
    pub write: Scope,
    pub read_list: Vec<String>,
    pub write_list: Vec<String>,
    pub delete_list: Vec<String>,
}

impl PermissionPolicy {
    /// Owner-only policy, same as an absent policy
    pub fn private() -> Self {
        Self::default()
    }

    pub fn with_read(mut self, scope: Scope) -> Self {
        self.read = scope;
        self
    }

    pub fn with_write(mut self, scope: Scope) -> Self {
        self.write = scope;
        self
    }

    pub fn with_read_list<I, S>(mut self, dids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.read_list = dids.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_write_list<I, S>(mut self, dids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.write_list = dids.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_delete_list<I, S>(mut self, dids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.delete_list = dids.into_iter().map(Into::into).collect();
        self
    }
}

/// Options accepted by provision and update calls
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseOptions {
    pub permissions: Option<PermissionPolicy>,
}

impl DatabaseOptions {
    pub fn with_permissions(permissions: PermissionPolicy) -> Self {
        Self { permissions: Some(permissions) }
    }
}
