/*
    Provision subsystem - Per-database permission lifecycle

    provision(owner, db, app, options)
        resolve + compile     (PolicyError aborts, nothing written)
        create database       (AlreadyExists tolerated)
        apply permissions

    update(owner, db, app, options)
        resolve + compile
        apply permissions

    deprovision(db)
        destroy database      (NotFound tolerated)

    apply permissions walks the artifacts in a fixed order:

        _security -> write-guard -> delete-guard (install, or retire when stale)

    The first failure stops the pass and the remaining documents are reported
    as skipped. Whether that failure fails the call depends on the
    FailurePolicy configured for the operation.
*/

mod error;
mod report;
mod upsert;

pub use error::{ProvisionError, ProvisionResult};
pub use report::{
    ArtifactReport, ArtifactStatus, DatabaseStatus, DeprovisionOutcome, PermissionReport,
    PermissionWarning, ProvisionReport,
};
pub use upsert::{retire, upsert, RetireOutcome, UpsertOutcome};

use crate::compiler::{compile, CompiledArtifacts, DELETE_GUARD_ID};
use crate::config::{Config, PermissionConfig};
use crate::metrics::{
    record_counter, ARTIFACTS_APPLIED, ARTIFACTS_CONVERGED, ARTIFACTS_RETIRED, DATABASES_CREATED,
    DATABASES_DESTROYED, PERMISSIONS_FAILED,
};
use crate::policy::{
    resolve, DatabaseOptions, HashedDidTranslator, Identity, IdentityTranslator, PolicyResult,
};
use crate::store::{CouchClient, DocumentStore, StoreResult};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// What a call does when a permission document fails to apply
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailurePolicy {
    /// Log, report a warning and succeed
    BestEffort,
    /// Fail the call with `PermissionsNotApplied`
    Strict,
}

impl FailurePolicy {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::BestEffort => "best_effort",
            Self::Strict => "strict",
        }
    }
}

impl fmt::Display for FailurePolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FailurePolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "best_effort" | "best-effort" => Ok(Self::BestEffort),
            "strict" => Ok(Self::Strict),
            _ => Err(format!("Invalid failure policy: {}", s)),
        }
    }
}

/// Runtime settings for a [`Provisioner`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProvisionSettings {
    /// Store identity that stands for "anyone"
    pub public_user: Identity,
    pub provision_failure_policy: FailurePolicy,
    pub update_failure_policy: FailurePolicy,
}

impl Default for ProvisionSettings {
    fn default() -> Self {
        Self::from(&PermissionConfig::default())
    }
}

impl From<&PermissionConfig> for ProvisionSettings {
    fn from(config: &PermissionConfig) -> Self {
        Self {
            public_user: Identity::new(config.public_user.clone()),
            provision_failure_policy: config.provision_failure_policy,
            update_failure_policy: config.update_failure_policy,
        }
    }
}

impl ProvisionSettings {
    pub fn with_provision_failure_policy(mut self, policy: FailurePolicy) -> Self {
        self.provision_failure_policy = policy;
        self
    }

    pub fn with_update_failure_policy(mut self, policy: FailurePolicy) -> Self {
        self.update_failure_policy = policy;
        self
    }

    pub fn with_public_user(mut self, public_user: impl Into<Identity>) -> Self {
        self.public_user = public_user.into();
        self
    }
}

/// Per-database permission provisioner
///
/// Holds no per-database state; every call derives what to write from its
/// arguments, so concurrent calls for the same database converge.
pub struct Provisioner {
    store: Arc<dyn DocumentStore>,
    translator: Arc<dyn IdentityTranslator>,
    settings: ProvisionSettings,
}

impl Provisioner {
    pub fn new(
        store: Arc<dyn DocumentStore>,
        translator: Arc<dyn IdentityTranslator>,
        settings: ProvisionSettings,
    ) -> Self {
        Self { store, translator, settings }
    }

    /// CouchDB-backed provisioner using hashed DID usernames
    pub fn from_config(config: &Config) -> StoreResult<Self> {
        let store = CouchClient::new(&config.store)?;
        Ok(Self::new(
            Arc::new(store),
            Arc::new(HashedDidTranslator::new()),
            ProvisionSettings::from(&config.permissions),
        ))
    }

    pub fn settings(&self) -> &ProvisionSettings {
        &self.settings
    }

    /// Resolve and compile the artifacts for a database without touching the store
    pub fn compile(
        &self,
        owner: &str,
        app: &str,
        options: &DatabaseOptions,
    ) -> PolicyResult<CompiledArtifacts> {
        let resolved = resolve(
            &Identity::from(owner),
            app,
            options.permissions.as_ref(),
            self.translator.as_ref(),
            &self.settings.public_user,
        )?;
        debug!(
            owner,
            app,
            write_scope = %resolved.write_scope,
            members = resolved.members.len(),
            "Resolved permission policy"
        );
        Ok(compile(&resolved))
    }

    /// Create `db` for `owner` and install its permissions
    pub async fn provision(
        &self,
        owner: &str,
        db: &str,
        app: &str,
        options: &DatabaseOptions,
    ) -> ProvisionResult<ProvisionReport> {
        let artifacts = self.compile(owner, app, options)?;

        let database_status = match self.store.create_database(db).await {
            Ok(()) => {
                info!("Created database {} for {}", db, owner);
                record_counter(DATABASES_CREATED, 1);
                DatabaseStatus::Created
            }
            Err(err) if err.is_already_exists() => {
                debug!("Database {} already exists", db);
                DatabaseStatus::AlreadyExisted
            }
            Err(err) => return Err(err.into()),
        };

        let permissions = self.apply_permissions(db, &artifacts).await;
        Self::enforce(self.settings.provision_failure_policy, &permissions)?;

        Ok(ProvisionReport { database_status, permissions })
    }

    /// Recompute and reinstall the permissions of an existing database
    pub async fn update(
        &self,
        owner: &str,
        db: &str,
        app: &str,
        options: &DatabaseOptions,
    ) -> ProvisionResult<PermissionReport> {
        let artifacts = self.compile(owner, app, options)?;

        let permissions = self.apply_permissions(db, &artifacts).await;
        Self::enforce(self.settings.update_failure_policy, &permissions)?;

        info!("Updated permissions of {}", db);
        Ok(permissions)
    }

    /// Destroy `db`; a missing database is not an error
    pub async fn deprovision(&self, db: &str) -> ProvisionResult<DeprovisionOutcome> {
        match self.store.destroy_database(db).await {
            Ok(()) => {
                info!("Destroyed database {}", db);
                record_counter(DATABASES_DESTROYED, 1);
                Ok(DeprovisionOutcome::Destroyed)
            }
            Err(err) if err.is_not_found() => {
                debug!("Database {} already absent", db);
                Ok(DeprovisionOutcome::AlreadyAbsent)
            }
            Err(err) => Err(err.into()),
        }
    }

    /// Install compiled artifacts into `db`, retiring a stale delete-guard
    ///
    /// Never fails; store errors end up in the report.
    pub async fn apply_permissions(&self, db: &str, artifacts: &CompiledArtifacts) -> PermissionReport {
        let mut report = PermissionReport::new(db);
        let mut steps: Vec<(&'static str, Option<Value>)> = artifacts
            .documents()
            .into_iter()
            .map(|(id, body)| (id, Some(body)))
            .collect();
        if artifacts.delete_guard.is_none() {
            steps.push((DELETE_GUARD_ID, None));
        }

        let mut failed = false;
        for (id, body) in steps {
            if failed {
                report.record(id, ArtifactStatus::Skipped);
                continue;
            }

            let result = match &body {
                Some(body) => upsert(self.store.as_ref(), db, id, body)
                    .await
                    .map(ArtifactStatus::from),
                None => retire(self.store.as_ref(), db, id)
                    .await
                    .map(ArtifactStatus::from),
            };

            match result {
                Ok(status) => {
                    match status {
                        ArtifactStatus::Created | ArtifactStatus::Updated => {
                            record_counter(ARTIFACTS_APPLIED, 1)
                        }
                        ArtifactStatus::Converged => record_counter(ARTIFACTS_CONVERGED, 1),
                        ArtifactStatus::Removed => {
                            info!("Retired stale {} in {}", id, db);
                            record_counter(ARTIFACTS_RETIRED, 1)
                        }
                        _ => {}
                    }
                    debug!(db, id, ?status, "Applied permission document");
                    report.record(id, status);
                }
                Err(err) => {
                    warn!("Failed to apply {} to {}: {}", id, db, err);
                    record_counter(PERMISSIONS_FAILED, 1);
                    report.record_failure(id, err);
                    failed = true;
                }
            }
        }

        report
    }

    fn enforce(policy: FailurePolicy, report: &PermissionReport) -> ProvisionResult<()> {
        match (policy, report.first_failure()) {
            (FailurePolicy::Strict, Some(failure)) => Err(ProvisionError::PermissionsNotApplied {
                database: report.database.clone(),
                document_id: failure.document_id.clone(),
                source: failure.error.clone(),
            }),
            (FailurePolicy::BestEffort, Some(failure)) => {
                warn!(
                    "Permissions of {} incomplete, continuing: {} failed with {}",
                    report.database, failure.document_id, failure.message
                );
                Ok(())
            }
            (_, None) => Ok(()),
        }
    }
}

impl fmt::Debug for Provisioner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Provisioner")
            .field("settings", &self.settings)
            .finish_non_exhaustive()
    }
}
