/*
    Store subsystem - Document store client

    The provisioning core talks to the datastore only through the narrow
    DocumentStore trait:

        Provisioner
              |
              v
        DocumentStore (trait)
              |
              +---> CouchClient  (CouchDB over HTTP)
              |
              +---> MemoryStore  (in-process, revisioned, for tests)
*/

pub mod couch;
pub mod errors;
pub mod memory;

pub use couch::CouchClient;
pub use errors::{StoreError, StoreResult};
pub use memory::{MemoryStore, StoreOp};

use async_trait::async_trait;
use serde_json::{Map, Value};

/// A document as read from the store
#[derive(Debug, Clone, PartialEq)]
pub struct Document {
    pub id: String,
    /// Current revision token; `None` for unversioned documents such as `_security`
    pub rev: Option<String>,
    /// Body without the `_id` and `_rev` fields
    pub body: Map<String, Value>,
}

impl Document {
    /// Split a raw JSON document into id, revision and body
    pub fn from_value(id: &str, value: Value) -> StoreResult<Self> {
        let Value::Object(mut body) = value else {
            return Err(StoreError::InvalidResponse(format!(
                "document {id} is not a JSON object"
            )));
        };

        let rev = match body.remove("_rev") {
            Some(Value::String(rev)) => Some(rev),
            Some(other) => {
                return Err(StoreError::InvalidResponse(format!(
                    "document {id} has non-string _rev: {other}"
                )))
            }
            None => None,
        };
        body.remove("_id");

        Ok(Self { id: id.to_string(), rev, body })
    }

    /// Body as a JSON value
    pub fn to_value(&self) -> Value {
        Value::Object(self.body.clone())
    }
}

/// Narrow client contract the provisioning core depends on
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Create a database. Fails with `AlreadyExists` if it is already there.
    async fn create_database(&self, name: &str) -> StoreResult<()>;

    /// Destroy a database. Fails with `NotFound` if it does not exist.
    async fn destroy_database(&self, name: &str) -> StoreResult<()>;

    /// Read a document. Fails with `NotFound` if it does not exist.
    async fn get(&self, db: &str, id: &str) -> StoreResult<Document>;

    /// Write a document, optionally stamped with the revision it replaces.
    ///
    /// Fails with `Conflict` when the revision is stale or missing. Returns
    /// the new revision token when the store issues one.
    async fn insert(
        &self,
        db: &str,
        id: &str,
        body: &Value,
        rev: Option<&str>,
    ) -> StoreResult<Option<String>>;
}

/// Copy `body` and stamp it with `rev` when one is given
pub(crate) fn with_revision(body: &Value, rev: Option<&str>) -> StoreResult<Map<String, Value>> {
    let Value::Object(map) = body else {
        return Err(StoreError::InvalidDocument(format!(
            "expected a JSON object, got {body}"
        )));
    };

    let mut map = map.clone();
    if let Some(rev) = rev {
        map.insert("_rev".to_string(), Value::String(rev.to_string()));
    }
    Ok(map)
}
