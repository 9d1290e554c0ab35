//! Metrics for provisioning outcomes
//!
//! Uses the `metrics` facade only. Nothing is recorded until the embedding
//! process installs a recorder, so the library never binds a port itself.

use metrics::{counter, describe_counter};

pub const ARTIFACTS_APPLIED: &str = "docguard.artifacts.applied";
pub const ARTIFACTS_CONVERGED: &str = "docguard.artifacts.converged";
pub const ARTIFACTS_RETIRED: &str = "docguard.artifacts.retired";
pub const PERMISSIONS_FAILED: &str = "docguard.permissions.failed";
pub const DATABASES_CREATED: &str = "docguard.databases.created";
pub const DATABASES_DESTROYED: &str = "docguard.databases.destroyed";

/// Register metric descriptions with the installed recorder
pub fn init_metrics() {
    describe_counter!(ARTIFACTS_APPLIED, "Permission documents created or updated");
    describe_counter!(
        ARTIFACTS_CONVERGED,
        "Permission writes that lost a revision race to a concurrent writer"
    );
    describe_counter!(ARTIFACTS_RETIRED, "Stale delete-guards removed");
    describe_counter!(PERMISSIONS_FAILED, "Permission passes that stopped on a store failure");
    describe_counter!(DATABASES_CREATED, "Databases created by provision");
    describe_counter!(DATABASES_DESTROYED, "Databases destroyed by deprovision");
}

/// Record a counter metric
pub fn record_counter(name: &'static str, value: u64) {
    counter!(name).increment(value);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_recording_without_recorder_is_a_noop() {
        init_metrics();
        record_counter(ARTIFACTS_APPLIED, 1);
        record_counter(PERMISSIONS_FAILED, 2);
    }
}
