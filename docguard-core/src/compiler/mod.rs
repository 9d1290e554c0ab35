//! Artifact compiler
//!
//! Turns [`ResolvedUserSets`] into the documents the store enforces:
//!
//! ```text
//! ResolvedUserSets
//!       |
//!       +---> _security                          (SecurityDescriptor)
//!       +---> _design/only_permit_write_users    (write-guard)
//!       +---> _design/disable_public_delete      (delete-guard, write: public only)
//! ```
//!
//! Compilation is pure: it neither touches the store nor mutates its input,
//! and user lists are baked into the guard source at compile time.

mod guard;

pub use guard::{
    js_string_array, GuardDecision, GuardKind, GuardRule, ValidationArtifact,
    DELETE_DENIED_MESSAGE, WRITE_DENIED_MESSAGE,
};

use crate::policy::{IdentitySet, ResolvedUserSets};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Document id of the security descriptor
pub const SECURITY_DOC_ID: &str = "_security";

/// Document id of the write-guard
pub const WRITE_GUARD_ID: &str = "_design/only_permit_write_users";

/// Document id of the delete-guard
pub const DELETE_GUARD_ID: &str = "_design/disable_public_delete";

/// Names and roles of one security group
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SecurityGroup {
    pub names: Vec<String>,
    #[serde(default)]
    pub roles: Vec<String>,
}

/// Database security object: the owner administers, members may read
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SecurityDescriptor {
    pub admins: SecurityGroup,
    pub members: SecurityGroup,
}

impl SecurityDescriptor {
    pub fn new(owner: &str, members: &IdentitySet) -> Self {
        Self {
            admins: SecurityGroup { names: vec![owner.to_string()], roles: Vec::new() },
            members: SecurityGroup { names: members.names(), roles: Vec::new() },
        }
    }

    /// Document body as stored
    pub fn body(&self) -> Value {
        serde_json::json!(self)
    }
}

/// Everything compiled from one resolution
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompiledArtifacts {
    pub descriptor: SecurityDescriptor,
    pub write_guard: ValidationArtifact,
    pub delete_guard: Option<ValidationArtifact>,
}

impl CompiledArtifacts {
    /// Documents to install, keyed by id, in installation order
    pub fn documents(&self) -> Vec<(&'static str, Value)> {
        let mut documents = vec![
            (SECURITY_DOC_ID, self.descriptor.body()),
            (self.write_guard.id, self.write_guard.body()),
        ];
        if let Some(delete_guard) = &self.delete_guard {
            documents.push((delete_guard.id, delete_guard.body()));
        }
        documents
    }
}

/// Compile resolved user sets into store artifacts
pub fn compile(resolved: &ResolvedUserSets) -> CompiledArtifacts {
    let descriptor = SecurityDescriptor::new(resolved.owner.as_str(), &resolved.members);
    let write_guard =
        ValidationArtifact::new(WRITE_GUARD_ID, GuardRule::write(resolved.write_users.clone()));
    let delete_guard = resolved.requires_delete_guard().then(|| {
        ValidationArtifact::new(DELETE_GUARD_ID, GuardRule::delete(resolved.delete_users.clone()))
    });

    CompiledArtifacts { descriptor, write_guard, delete_guard }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::policy::{resolve, Identity, PermissionPolicy, PolicyResult, Scope};

    fn translator(dids: &[String], namespace: &str) -> PolicyResult<Vec<Identity>> {
        Ok(dids
            .iter()
            .map(|did| Identity::new(format!("alice_{namespace}_{}", did.trim_start_matches("did:"))))
            .collect())
    }

    fn compile_policy(policy: Option<&PermissionPolicy>) -> CompiledArtifacts {
        let resolved = resolve(
            &Identity::from("alice"),
            "app1",
            policy,
            &translator,
            &Identity::from("public"),
        )
        .unwrap();
        compile(&resolved)
    }

    #[test]
    fn test_private_policy_has_no_delete_guard() {
        let artifacts = compile_policy(None);

        assert!(artifacts.delete_guard.is_none());
        assert_eq!(artifacts.descriptor.admins.names, vec!["alice"]);
        assert_eq!(artifacts.descriptor.members.names, vec!["alice"]);
        assert_eq!(artifacts.write_guard.id, WRITE_GUARD_ID);
        assert!(artifacts.write_guard.evaluate(Some("alice"), false).is_allowed());
        assert!(!artifacts.write_guard.evaluate(Some("bob"), false).is_allowed());
        assert_eq!(artifacts.documents().len(), 2);
    }

    #[test]
    fn test_users_write_policy() {
        let policy = PermissionPolicy::default()
            .with_write(Scope::Users)
            .with_write_list(["did:bob"]);
        let artifacts = compile_policy(Some(&policy));

        assert!(artifacts.delete_guard.is_none());
        assert!(artifacts.write_guard.evaluate(Some("alice_app1_bob"), true).is_allowed());
        assert!(artifacts
            .write_guard
            .source
            .contains(r#"["alice","alice_app1_bob"]"#));
    }

    #[test]
    fn test_public_write_policy_adds_delete_guard() {
        let policy = PermissionPolicy::default().with_write(Scope::Public);
        let artifacts = compile_policy(Some(&policy));

        let delete_guard = artifacts.delete_guard.as_ref().expect("delete guard");
        assert_eq!(delete_guard.id, DELETE_GUARD_ID);

        // anyone may write through the public identity, only alice may delete
        assert!(artifacts.write_guard.evaluate(Some("public"), false).is_allowed());
        assert!(!delete_guard.evaluate(Some("public"), true).is_allowed());
        assert!(delete_guard.evaluate(Some("public"), false).is_allowed());
        assert!(delete_guard.evaluate(Some("alice"), true).is_allowed());

        let ids: Vec<_> = artifacts.documents().into_iter().map(|(id, _)| id).collect();
        assert_eq!(ids, vec![SECURITY_DOC_ID, WRITE_GUARD_ID, DELETE_GUARD_ID]);
    }

    #[test]
    fn test_public_write_delete_list_may_delete() {
        let policy = PermissionPolicy::default()
            .with_write(Scope::Public)
            .with_delete_list(["did:carol"]);
        let artifacts = compile_policy(Some(&policy));

        let delete_guard = artifacts.delete_guard.as_ref().expect("delete guard");
        assert!(delete_guard.evaluate(Some("alice_app1_carol"), true).is_allowed());
        assert!(delete_guard.evaluate(Some("alice"), true).is_allowed());
        assert!(!delete_guard.evaluate(Some("public"), true).is_allowed());
        assert!(delete_guard
            .source
            .contains("[\"alice\",\"alice_app1_carol\"].indexOf(userCtx.name) == -1 && newDoc._deleted"));
    }

    #[test]
    fn test_descriptor_body_shape() {
        let policy = PermissionPolicy::default().with_read(Scope::Public);
        let body = compile_policy(Some(&policy)).descriptor.body();

        assert_eq!(
            body,
            serde_json::json!({
                "admins": { "names": ["alice"], "roles": [] },
                "members": { "names": ["alice", "public"], "roles": [] }
            })
        );
    }

    #[test]
    fn test_compile_is_deterministic_and_leaves_input_untouched() {
        let policy = PermissionPolicy::default()
            .with_write(Scope::Public)
            .with_read(Scope::Users)
            .with_read_list(["did:x", "did:y"]);
        let resolved = resolve(
            &Identity::from("alice"),
            "app1",
            Some(&policy),
            &translator,
            &Identity::from("public"),
        )
        .unwrap();
        let snapshot = resolved.clone();

        assert_eq!(compile(&resolved), compile(&resolved));
        assert_eq!(resolved, snapshot);
    }
}
