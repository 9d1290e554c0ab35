//! DID to store-username translation
//!
//! Policies name principals by DID. The store only understands usernames, and
//! the same DID must map to a different username in each application
//! namespace so that grants in one application never leak into another.

use super::error::{PolicyError, PolicyResult};
use super::identity::Identity;
use sha2::{Digest, Sha256};

/// Maps DIDs scoped to an application namespace onto store identities.
///
/// Implementations must be all-or-nothing: either every DID translates or the
/// call fails.
pub trait IdentityTranslator: Send + Sync {
    fn translate(&self, dids: &[String], namespace: &str) -> PolicyResult<Vec<Identity>>;
}

impl<F> IdentityTranslator for F
where
    F: Fn(&[String], &str) -> PolicyResult<Vec<Identity>> + Send + Sync,
{
    fn translate(&self, dids: &[String], namespace: &str) -> PolicyResult<Vec<Identity>> {
        self(dids, namespace)
    }
}

/// Default translator: `"v" + hex(sha256(lowercase(did) + "/" + namespace))`
#[derive(Debug, Clone, Copy, Default)]
pub struct HashedDidTranslator;

impl HashedDidTranslator {
    pub fn new() -> Self {
        Self
    }

    /// Translate a single DID
    pub fn username_for(&self, did: &str, namespace: &str) -> PolicyResult<Identity> {
        validate_did(did)?;
        if namespace.is_empty() {
            return Err(PolicyError::EmptyNamespace);
        }

        let mut hasher = Sha256::new();
        hasher.update(did.to_lowercase().as_bytes());
        hasher.update(b"/");
        hasher.update(namespace.as_bytes());

        Ok(Identity::new(format!("v{}", hex::encode(hasher.finalize()))))
    }
}

impl IdentityTranslator for HashedDidTranslator {
    fn translate(&self, dids: &[String], namespace: &str) -> PolicyResult<Vec<Identity>> {
        dids.iter()
            .map(|did| self.username_for(did, namespace))
            .collect()
    }
}

/// Check that `did` has the `did:<method>:<method-specific-id>` shape
pub fn validate_did(did: &str) -> PolicyResult<()> {
    let malformed = |reason: &str| PolicyError::MalformedDid {
        did: did.to_string(),
        reason: reason.to_string(),
    };

    let rest = did
        .strip_prefix("did:")
        .ok_or_else(|| malformed("must start with \"did:\""))?;
    let (method, id) = rest
        .split_once(':')
        .ok_or_else(|| malformed("missing method-specific id"))?;

    if method.is_empty() {
        return Err(malformed("missing method"));
    }
    if !method
        .chars()
        .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit())
    {
        return Err(malformed("method must be lowercase alphanumeric"));
    }
    if id.is_empty() {
        return Err(malformed("missing method-specific id"));
    }
    if id.chars().any(|c| c.is_whitespace() || c.is_control()) {
        return Err(malformed("method-specific id contains whitespace or control characters"));
    }

    Ok(())
}
