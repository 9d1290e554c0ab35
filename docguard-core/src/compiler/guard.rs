//! Validation guards
//!
//! A guard is a `validate_doc_update` function the store runs on every write.
//! Each [`ValidationArtifact`] keeps the rule it was generated from next to the
//! generated source, so the accept/reject behavior can be checked in-process
//! without a JavaScript engine.

use crate::policy::IdentitySet;
use serde::Serialize;
use serde_json::{json, Value};

/// Message thrown by the write-guard
pub const WRITE_DENIED_MESSAGE: &str = "User is not permitted to write to database";

/// Message thrown by the delete-guard
pub const DELETE_DENIED_MESSAGE: &str = "User is not permitted to delete from database";

/// Which writes a guard inspects
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum GuardKind {
    /// Every write, deletions included
    Write,
    /// Deletions only
    Delete,
}

/// Outcome of evaluating a guard against a pending write
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GuardDecision {
    Allow,
    Deny(&'static str),
}

impl GuardDecision {
    pub fn is_allowed(&self) -> bool {
        matches!(self, GuardDecision::Allow)
    }
}

/// Accept/reject rule baked into a guard
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GuardRule {
    pub kind: GuardKind,
    pub allowed: IdentitySet,
}

impl GuardRule {
    pub fn write(allowed: IdentitySet) -> Self {
        Self { kind: GuardKind::Write, allowed }
    }

    pub fn delete(allowed: IdentitySet) -> Self {
        Self { kind: GuardKind::Delete, allowed }
    }

    /// Decide a pending write by `name` (`None` for anonymous requests).
    pub fn evaluate(&self, name: Option<&str>, deleting: bool) -> GuardDecision {
        let listed = name.is_some_and(|name| self.allowed.contains_name(name));
        match self.kind {
            GuardKind::Write if !listed => GuardDecision::Deny(WRITE_DENIED_MESSAGE),
            GuardKind::Delete if deleting && !listed => GuardDecision::Deny(DELETE_DENIED_MESSAGE),
            _ => GuardDecision::Allow,
        }
    }

    /// Render the rule as `validate_doc_update` source
    pub fn to_source(&self) -> String {
        let users = js_string_array(&self.allowed);
        match self.kind {
            GuardKind::Write => format!(
                "\n    function(newDoc, oldDoc, userCtx, secObj) {{\n        if ({users}.indexOf(userCtx.name) == -1) throw({{ unauthorized: '{WRITE_DENIED_MESSAGE}' }});\n}}"
            ),
            GuardKind::Delete => format!(
                "\n    function(newDoc, oldDoc, userCtx, secObj) {{\n        if ({users}.indexOf(userCtx.name) == -1 && newDoc._deleted) throw({{ unauthorized: '{DELETE_DENIED_MESSAGE}' }});\n}}"
            ),
        }
    }
}

/// A generated design document holding one guard
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationArtifact {
    pub id: &'static str,
    pub source: String,
    pub rule: GuardRule,
}

impl ValidationArtifact {
    pub fn new(id: &'static str, rule: GuardRule) -> Self {
        let source = rule.to_source();
        Self { id, source, rule }
    }

    /// Document body as stored
    pub fn body(&self) -> Value {
        json!({ "validate_doc_update": self.source })
    }

    pub fn evaluate(&self, name: Option<&str>, deleting: bool) -> GuardDecision {
        self.rule.evaluate(name, deleting)
    }
}

/// Serialize identities as a JavaScript array literal.
///
/// JSON string escaping covers quotes, backslashes and control characters.
/// U+2028 and U+2029 are legal inside JSON strings but terminate string
/// literals in pre-ES2019 engines, so they are escaped as well.
pub fn js_string_array(identities: &IdentitySet) -> String {
    let names: Vec<Value> = identities
        .iter()
        .map(|identity| Value::String(identity.as_str().to_string()))
        .collect();

    Value::Array(names)
        .to_string()
        .replace('\u{2028}', "\\u2028")
        .replace('\u{2029}', "\\u2029")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::policy::Identity;

    fn set(names: &[&str]) -> IdentitySet {
        names.iter().map(|name| Identity::from(*name)).collect()
    }

    /// Pull the embedded array literal back out of generated source
    fn embedded_list(source: &str) -> Vec<String> {
        let start = source.find("if (").unwrap() + 4;
        let end = source.find(".indexOf(userCtx.name)").unwrap();
        serde_json::from_str(&source[start..end]).unwrap()
    }

    #[test]
    fn test_write_guard_source() {
        let rule = GuardRule::write(set(&["alice", "bob"]));
        let source = rule.to_source();

        assert!(source.contains(r#"if (["alice","bob"].indexOf(userCtx.name) == -1) throw"#));
        assert!(source.contains(WRITE_DENIED_MESSAGE));
        assert!(!source.contains("_deleted"));
        assert!(source.trim_start().starts_with("function(newDoc, oldDoc, userCtx, secObj)"));
    }

    #[test]
    fn test_delete_guard_source() {
        let source = GuardRule::delete(set(&["alice"])).to_source();

        assert!(source.contains(r#"["alice"].indexOf(userCtx.name) == -1 && newDoc._deleted"#));
        assert!(source.contains(DELETE_DENIED_MESSAGE));
    }

    #[test]
    fn test_write_guard_decisions() {
        let rule = GuardRule::write(set(&["alice", "bob"]));

        assert!(rule.evaluate(Some("alice"), false).is_allowed());
        assert!(rule.evaluate(Some("bob"), true).is_allowed());
        assert_eq!(
            rule.evaluate(Some("mallory"), false),
            GuardDecision::Deny(WRITE_DENIED_MESSAGE)
        );
        assert!(!rule.evaluate(None, false).is_allowed());
    }

    #[test]
    fn test_delete_guard_only_inspects_deletions() {
        let rule = GuardRule::delete(set(&["alice"]));

        assert!(rule.evaluate(Some("mallory"), false).is_allowed());
        assert_eq!(
            rule.evaluate(Some("mallory"), true),
            GuardDecision::Deny(DELETE_DENIED_MESSAGE)
        );
        assert!(rule.evaluate(Some("alice"), true).is_allowed());
        assert!(!rule.evaluate(None, true).is_allowed());
    }

    #[test]
    fn test_hostile_identities_stay_inside_literal() {
        let hostile = [
            r#"x"].indexOf(0)); evil(); (["#,
            "back\\slash",
            "it's",
            "sep\u{2028}arator\u{2029}",
            "</script>",
        ];
        let source = GuardRule::write(set(&hostile)).to_source();

        assert!(!source.contains('\u{2028}'));
        assert!(!source.contains('\u{2029}'));
        assert_eq!(embedded_list(&source), hostile.to_vec());
    }

    /// The generated source and `evaluate` must reach the same decision for
    /// every kind, caller and operation.
    #[test]
    fn test_source_agrees_with_evaluate() {
        let allowed = set(&["alice", "it's \"bob\""]);
        let callers = [Some("alice"), Some("it's \"bob\""), Some("mallory"), Some(""), None];

        for rule in [GuardRule::write(allowed.clone()), GuardRule::delete(allowed.clone())] {
            let source = rule.to_source();
            let list = embedded_list(&source);
            let checks_deleted = source.contains("== -1 && newDoc._deleted)");

            assert_eq!(checks_deleted, rule.kind == GuardKind::Delete);
            assert_eq!(list, vec!["alice".to_string(), "it's \"bob\"".to_string()]);

            for name in callers {
                for deleting in [false, true] {
                    // userCtx.name is null for anonymous callers; indexOf(null) is -1
                    let listed = name.is_some_and(|name| list.iter().any(|entry| entry == name));
                    let thrown = !listed && (!checks_deleted || deleting);

                    assert_eq!(
                        thrown,
                        !rule.evaluate(name, deleting).is_allowed(),
                        "{:?} guard, caller {:?}, deleting {}",
                        rule.kind,
                        name,
                        deleting
                    );
                }
            }
        }
    }

    #[test]
    fn test_artifact_body_shape() {
        let artifact = ValidationArtifact::new("_design/test", GuardRule::write(set(&["alice"])));
        let body = artifact.body();

        assert_eq!(body["validate_doc_update"], Value::String(artifact.source.clone()));
        assert_eq!(body.as_object().unwrap().len(), 1);
    }
}
