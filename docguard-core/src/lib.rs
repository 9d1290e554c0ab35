pub mod compiler;
pub mod config;
pub mod logging;
pub mod metrics;
pub mod policy;
pub mod provision;
pub mod store;

pub use compiler::{compile, CompiledArtifacts, SecurityDescriptor};
pub use config::Config;
pub use logging::{init_logging, LogLevel};
pub use policy::{DatabaseOptions, Identity, PermissionPolicy, Scope};
pub use provision::{FailurePolicy, ProvisionError, Provisioner, ProvisionSettings};
pub use store::{CouchClient, DocumentStore, MemoryStore, StoreError};
