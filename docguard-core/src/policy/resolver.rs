//! Policy resolution

use super::error::{PolicyError, PolicyResult};
use super::identity::{Identity, IdentitySet};
use super::translate::IdentityTranslator;
use super::{PermissionPolicy, Scope};
use serde::Serialize;

/// Concrete user sets derived from a policy
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResolvedUserSets {
    pub owner: Identity,
    /// Write scope the sets were resolved from; drives the delete-guard
    pub write_scope: Scope,
    pub write_users: IdentitySet,
    pub read_users: IdentitySet,
    pub delete_users: IdentitySet,
    pub members: IdentitySet,
}

impl ResolvedUserSets {
    /// Whether the compiled artifacts need a delete-guard
    pub fn requires_delete_guard(&self) -> bool {
        self.write_scope == Scope::Public
    }
}

/// Resolve `policy` for `owner` inside application `namespace`.
///
/// An absent policy is owner-only on every axis. DID lists are only
/// translated for axes whose scope is `users`, so a malformed list on a
/// `private` axis is ignored.
pub fn resolve(
    owner: &Identity,
    namespace: &str,
    policy: Option<&PermissionPolicy>,
    translator: &dyn IdentityTranslator,
    public: &Identity,
) -> PolicyResult<ResolvedUserSets> {
    if !owner.is_well_formed() {
        return Err(PolicyError::InvalidOwner(owner.to_string()));
    }
    if namespace.is_empty() {
        return Err(PolicyError::EmptyNamespace);
    }
    if !public.is_well_formed() {
        return Err(PolicyError::InvalidPublicIdentity(public.to_string()));
    }

    let default_policy = PermissionPolicy::default();
    let policy = policy.unwrap_or(&default_policy);

    let mut write_users = IdentitySet::with(owner.clone());
    let mut delete_users = IdentitySet::with(owner.clone());
    let mut read_users = IdentitySet::with(owner.clone());

    match policy.write {
        Scope::Private => {}
        Scope::Users => {
            write_users.extend(translate_checked(translator, &policy.write_list, namespace)?);
            delete_users.extend(translate_checked(translator, &policy.delete_list, namespace)?);
        }
        Scope::Public => {
            write_users.insert(public.clone());
            delete_users.extend(translate_checked(translator, &policy.delete_list, namespace)?);
        }
    }

    match policy.read {
        Scope::Private => {}
        Scope::Users => {
            read_users.extend(translate_checked(translator, &policy.read_list, namespace)?);
        }
        Scope::Public => {
            read_users.insert(public.clone());
        }
    }

    let members = read_users.union(&write_users);

    Ok(ResolvedUserSets {
        owner: owner.clone(),
        write_scope: policy.write,
        write_users,
        read_users,
        delete_users,
        members,
    })
}

fn translate_checked(
    translator: &dyn IdentityTranslator,
    dids: &[String],
    namespace: &str,
) -> PolicyResult<Vec<Identity>> {
    if dids.is_empty() {
        return Ok(Vec::new());
    }

    let identities = translator.translate(dids, namespace)?;
    if let Some(bad) = identities.iter().find(|identity| !identity.is_well_formed()) {
        return Err(PolicyError::Translation(format!(
            "translator produced unusable identity {:?}",
            bad.as_str()
        )));
    }
    Ok(identities)
}
