//! Error types for provisioning operations

use crate::policy::PolicyError;
use crate::store::StoreError;
use thiserror::Error;

/// Result type for provisioning operations
pub type ProvisionResult<T> = Result<T, ProvisionError>;

/// Errors that fail a provision, update or deprovision call
#[derive(Debug, Error)]
pub enum ProvisionError {
    /// Policy could not be resolved; nothing was written
    #[error("Policy error: {0}")]
    Policy(#[from] PolicyError),

    /// Database could not be created or destroyed
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    /// A permission document failed to apply under a strict failure policy
    #[error("Permissions not applied to {database} ({document_id}): {source}")]
    PermissionsNotApplied {
        database: String,
        document_id: String,
        #[source]
        source: StoreError,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = ProvisionError::PermissionsNotApplied {
            database: "userdb".to_string(),
            document_id: "_security".to_string(),
            source: StoreError::Transport("connection refused".to_string()),
        };
        assert_eq!(
            err.to_string(),
            "Permissions not applied to userdb (_security): Transport error: connection refused"
        );
    }

    #[test]
    fn test_error_conversions() {
        let err: ProvisionError = PolicyError::EmptyNamespace.into();
        assert!(matches!(err, ProvisionError::Policy(_)));

        let err: ProvisionError = StoreError::NotFound("x".to_string()).into();
        assert!(matches!(err, ProvisionError::Store(_)));
    }
}
