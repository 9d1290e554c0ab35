//! In-memory DocumentStore
//!
//! Mirrors CouchDB's write rules closely enough to exercise the upsert
//! protocol:
//! - revisions are `N-<hash>` tokens bumped on every write
//! - writing a live document needs its current revision, otherwise `Conflict`
//! - `{"_deleted": true}` leaves a tombstone; a later write may recreate it
//! - `_security` is unversioned and always overwritten
//!
//! Faults can be queued per operation, and a competing write can be slipped
//! in ahead of the next insert to reproduce lost revision races.

use super::errors::{handle_poison, StoreError, StoreResult};
use super::{with_revision, Document, DocumentStore};
use async_trait::async_trait;
use serde_json::{Map, Value};
use sha2::{Digest, Sha256};
use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;

const SECURITY_ID: &str = "_security";

/// Store operation, used to target injected faults
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StoreOp {
    CreateDatabase,
    DestroyDatabase,
    Get,
    Insert,
}

#[derive(Debug, Clone)]
struct StoredDoc {
    generation: u64,
    rev: String,
    body: Map<String, Value>,
    deleted: bool,
}

#[derive(Debug, Default)]
struct Database {
    security: Map<String, Value>,
    docs: HashMap<String, StoredDoc>,
}

#[derive(Debug, Default)]
struct State {
    databases: HashMap<String, Database>,
    faults: VecDeque<(StoreOp, StoreError)>,
    races: HashMap<(String, String), Value>,
    writes: usize,
}

/// Revisioned in-process document store
#[derive(Debug, Default)]
pub struct MemoryStore {
    state: Mutex<State>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next call of `op` fail with `error`
    pub fn fail_next(&self, op: StoreOp, error: StoreError) {
        if let Ok(mut state) = self.state.lock() {
            state.faults.push_back((op, error));
        }
    }

    /// Before the next insert into `db`/`id`, apply a competing write of `body`
    pub fn race_next_insert(&self, db: &str, id: &str, body: Value) {
        if let Ok(mut state) = self.state.lock() {
            state.races.insert((db.to_string(), id.to_string()), body);
        }
    }

    pub fn database_exists(&self, name: &str) -> bool {
        self.state
            .lock()
            .map(|state| state.databases.contains_key(name))
            .unwrap_or(false)
    }

    /// Current live body of a document, `None` if absent or deleted
    pub fn document(&self, db: &str, id: &str) -> Option<Value> {
        let state = self.state.lock().ok()?;
        let database = state.databases.get(db)?;
        if id == SECURITY_ID {
            return Some(Value::Object(database.security.clone()));
        }
        database
            .docs
            .get(id)
            .filter(|doc| !doc.deleted)
            .map(|doc| Value::Object(doc.body.clone()))
    }

    /// Current revision of a document, tombstones included
    pub fn revision(&self, db: &str, id: &str) -> Option<String> {
        let state = self.state.lock().ok()?;
        state.databases.get(db)?.docs.get(id).map(|doc| doc.rev.clone())
    }

    /// Number of live documents in a database
    pub fn document_count(&self, db: &str) -> usize {
        self.state
            .lock()
            .ok()
            .and_then(|state| {
                state
                    .databases
                    .get(db)
                    .map(|database| database.docs.values().filter(|doc| !doc.deleted).count())
            })
            .unwrap_or(0)
    }

    /// Successful document writes so far
    pub fn write_count(&self) -> usize {
        self.state.lock().map(|state| state.writes).unwrap_or(0)
    }

    fn take_fault(state: &mut State, op: StoreOp) -> StoreResult<()> {
        match state.faults.iter().position(|(queued, _)| *queued == op) {
            Some(index) => match state.faults.remove(index) {
                Some((_, error)) => Err(error),
                None => Ok(()),
            },
            None => Ok(()),
        }
    }

    fn write(
        state: &mut State,
        db: &str,
        id: &str,
        body: Map<String, Value>,
        rev: Option<&str>,
    ) -> StoreResult<Option<String>> {
        let database = state
            .databases
            .get_mut(db)
            .ok_or_else(|| StoreError::NotFound(format!("Database does not exist: {db}")))?;

        if id == SECURITY_ID {
            database.security = body;
            state.writes += 1;
            return Ok(None);
        }

        let deleting = body.get("_deleted").and_then(Value::as_bool).unwrap_or(false);
        let generation = match database.docs.get(id) {
            Some(current) if !current.deleted => {
                if rev != Some(current.rev.as_str()) {
                    return Err(StoreError::Conflict("Document update conflict.".to_string()));
                }
                current.generation
            }
            Some(tombstone) => {
                if rev.is_some_and(|rev| rev != tombstone.rev) {
                    return Err(StoreError::Conflict("Document update conflict.".to_string()));
                }
                tombstone.generation
            }
            None => {
                if rev.is_some() || deleting {
                    return Err(StoreError::Conflict("Document update conflict.".to_string()));
                }
                0
            }
        };

        let mut stored = body;
        stored.remove("_rev");
        stored.remove("_id");
        stored.remove("_deleted");

        let generation = generation + 1;
        let rev = format!("{generation}-{}", content_hash(&stored, deleting));
        database.docs.insert(
            id.to_string(),
            StoredDoc { generation, rev: rev.clone(), body: stored, deleted: deleting },
        );
        state.writes += 1;

        Ok(Some(rev))
    }
}

fn content_hash(body: &Map<String, Value>, deleted: bool) -> String {
    let mut hasher = Sha256::new();
    hasher.update(Value::Object(body.clone()).to_string().as_bytes());
    hasher.update([u8::from(deleted)]);
    hex::encode(&hasher.finalize()[..16])
}

#[async_trait]
impl DocumentStore for MemoryStore {
    async fn create_database(&self, name: &str) -> StoreResult<()> {
        tokio::task::yield_now().await;
        let mut state = self.state.lock().map_err(handle_poison)?;
        Self::take_fault(&mut state, StoreOp::CreateDatabase)?;

        if state.databases.contains_key(name) {
            return Err(StoreError::AlreadyExists(name.to_string()));
        }
        state.databases.insert(name.to_string(), Database::default());
        Ok(())
    }

    async fn destroy_database(&self, name: &str) -> StoreResult<()> {
        tokio::task::yield_now().await;
        let mut state = self.state.lock().map_err(handle_poison)?;
        Self::take_fault(&mut state, StoreOp::DestroyDatabase)?;

        state
            .databases
            .remove(name)
            .map(|_| ())
            .ok_or_else(|| StoreError::NotFound(format!("Database does not exist: {name}")))
    }

    async fn get(&self, db: &str, id: &str) -> StoreResult<Document> {
        tokio::task::yield_now().await;
        let mut state = self.state.lock().map_err(handle_poison)?;
        Self::take_fault(&mut state, StoreOp::Get)?;

        let database = state
            .databases
            .get(db)
            .ok_or_else(|| StoreError::NotFound(format!("Database does not exist: {db}")))?;

        if id == SECURITY_ID {
            return Ok(Document { id: id.to_string(), rev: None, body: database.security.clone() });
        }

        match database.docs.get(id) {
            Some(doc) if !doc.deleted => Ok(Document {
                id: id.to_string(),
                rev: Some(doc.rev.clone()),
                body: doc.body.clone(),
            }),
            Some(_) => Err(StoreError::NotFound("deleted".to_string())),
            None => Err(StoreError::NotFound("missing".to_string())),
        }
    }

    async fn insert(
        &self,
        db: &str,
        id: &str,
        body: &Value,
        rev: Option<&str>,
    ) -> StoreResult<Option<String>> {
        tokio::task::yield_now().await;
        let body = with_revision(body, None)?;
        let mut state = self.state.lock().map_err(handle_poison)?;
        Self::take_fault(&mut state, StoreOp::Insert)?;

        if let Some(competing) = state.races.remove(&(db.to_string(), id.to_string())) {
            let competing = with_revision(&competing, None)?;
            let current = state
                .databases
                .get(db)
                .and_then(|database| database.docs.get(id))
                .filter(|doc| !doc.deleted)
                .map(|doc| doc.rev.clone());
            Self::write(&mut state, db, id, competing, current.as_deref())?;
        }

        Self::write(&mut state, db, id, body, rev)
    }
}
