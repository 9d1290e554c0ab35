//! Outcome reports for provisioning calls

use super::upsert::{RetireOutcome, UpsertOutcome};
use crate::store::StoreError;
use serde::Serialize;

/// What happened to one permission document
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ArtifactStatus {
    Created,
    Updated,
    Converged,
    Removed,
    Absent,
    Failed,
    /// Not attempted because an earlier document failed
    Skipped,
}

impl From<UpsertOutcome> for ArtifactStatus {
    fn from(outcome: UpsertOutcome) -> Self {
        match outcome {
            UpsertOutcome::Created => Self::Created,
            UpsertOutcome::Updated => Self::Updated,
            UpsertOutcome::Converged => Self::Converged,
        }
    }
}

impl From<RetireOutcome> for ArtifactStatus {
    fn from(outcome: RetireOutcome) -> Self {
        match outcome {
            RetireOutcome::Removed => Self::Removed,
            RetireOutcome::Absent => Self::Absent,
            RetireOutcome::Converged => Self::Converged,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ArtifactReport {
    pub document_id: String,
    pub status: ArtifactStatus,
}

/// A permission document that could not be applied
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PermissionWarning {
    pub document_id: String,
    pub message: String,
    #[serde(skip)]
    pub error: StoreError,
}

/// Result of one permission pass over a database
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PermissionReport {
    pub database: String,
    pub artifacts: Vec<ArtifactReport>,
    pub warnings: Vec<PermissionWarning>,
}

impl PermissionReport {
    pub(crate) fn new(database: &str) -> Self {
        Self {
            database: database.to_string(),
            artifacts: Vec::new(),
            warnings: Vec::new(),
        }
    }

    pub(crate) fn record(&mut self, document_id: &str, status: ArtifactStatus) {
        self.artifacts.push(ArtifactReport {
            document_id: document_id.to_string(),
            status,
        });
    }

    pub(crate) fn record_failure(&mut self, document_id: &str, error: StoreError) {
        self.record(document_id, ArtifactStatus::Failed);
        self.warnings.push(PermissionWarning {
            document_id: document_id.to_string(),
            message: error.to_string(),
            error,
        });
    }

    /// True when every permission document reached its intended state
    pub fn is_complete(&self) -> bool {
        self.warnings.is_empty()
    }

    /// Status recorded for `document_id`, if it was part of the pass
    pub fn status_of(&self, document_id: &str) -> Option<ArtifactStatus> {
        self.artifacts
            .iter()
            .find(|artifact| artifact.document_id == document_id)
            .map(|artifact| artifact.status)
    }

    pub fn first_failure(&self) -> Option<&PermissionWarning> {
        self.warnings.first()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DatabaseStatus {
    Created,
    /// Database was already there; provision continued with permissions
    AlreadyExisted,
}

/// Result of a provision call
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProvisionReport {
    pub database_status: DatabaseStatus,
    pub permissions: PermissionReport,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DeprovisionOutcome {
    Destroyed,
    AlreadyAbsent,
}
