//! Policy error types

use thiserror::Error;

/// Errors raised while resolving a permission policy.
///
/// Every variant is fatal for the call that produced it: a policy that
/// cannot be fully resolved never yields a partial user set.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PolicyError {
    /// Owner identity is empty or contains characters a store username cannot hold
    #[error("Invalid owner identity: {0}")]
    InvalidOwner(String),

    /// Application namespace is empty
    #[error("Application namespace must not be empty")]
    EmptyNamespace,

    /// A DID in one of the policy lists is malformed
    #[error("Malformed DID {did:?}: {reason}")]
    MalformedDid { did: String, reason: String },

    /// Identity translation failed for a reason other than DID syntax
    #[error("Identity translation failed: {0}")]
    Translation(String),

    /// The public identity is not usable
    #[error("Invalid public identity: {0}")]
    InvalidPublicIdentity(String),
}

pub type PolicyResult<T> = Result<T, PolicyError>;
