/*
    upsert.rs - Idempotent document installation

    Fetch -> (Insert-new | Insert-with-revision) -> done

    A revision conflict on the write means another writer updated the
    document between our fetch and our write. Every writer installs a
    document compiled from the same inputs, so the conflict is reported as
    convergence instead of an error.
*/

use crate::store::{DocumentStore, StoreError, StoreResult};
use serde::Serialize;
use serde_json::{json, Value};
use tracing::{debug, warn};

/// Result of a successful upsert
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum UpsertOutcome {
    /// Written without a revision precondition
    Created,
    /// Written over the fetched revision
    Updated,
    /// A concurrent writer got there first
    Converged,
}

/// Result of a successful retire
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RetireOutcome {
    /// Document was replaced by a deletion tombstone
    Removed,
    /// Nothing to remove
    Absent,
    /// A concurrent writer changed the document first
    Converged,
}

/// Install `body` under `id`, replacing whatever revision is current
pub async fn upsert(
    store: &dyn DocumentStore,
    db: &str,
    id: &str,
    body: &Value,
) -> StoreResult<UpsertOutcome> {
    // unversioned documents such as `_security` take the insert-new path
    let rev = match store.get(db, id).await {
        Ok(current) => current.rev,
        Err(err) if err.is_not_found() => None,
        Err(err) => return Err(err),
    };

    debug!(db, id, rev = rev.as_deref(), "Writing document");

    match store.insert(db, id, body, rev.as_deref()).await {
        Ok(_) if rev.is_some() => Ok(UpsertOutcome::Updated),
        Ok(_) => Ok(UpsertOutcome::Created),
        Err(err) if err.is_conflict() => {
            warn!(db, id, "Lost revision race, treating as converged: {}", err);
            Ok(UpsertOutcome::Converged)
        }
        Err(err) => Err(err),
    }
}

/// Remove `id` by writing a deletion tombstone over its current revision
pub async fn retire(store: &dyn DocumentStore, db: &str, id: &str) -> StoreResult<RetireOutcome> {
    let rev = match store.get(db, id).await {
        Ok(current) => current.rev.ok_or_else(|| {
            StoreError::InvalidResponse(format!("{id} has no revision and cannot be deleted"))
        })?,
        Err(err) if err.is_not_found() => return Ok(RetireOutcome::Absent),
        Err(err) => return Err(err),
    };

    debug!(db, id, rev = rev.as_str(), "Deleting document");

    match store.insert(db, id, &json!({ "_deleted": true }), Some(&rev)).await {
        Ok(_) => Ok(RetireOutcome::Removed),
        Err(err) if err.is_conflict() => {
            warn!(db, id, "Lost revision race while deleting, treating as converged: {}", err);
            Ok(RetireOutcome::Converged)
        }
        Err(err) => Err(err),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{MemoryStore, StoreOp};
    use serde_json::json;
    use std::sync::Arc;

    async fn store_with_db() -> MemoryStore {
        let store = MemoryStore::new();
        store.create_database("db").await.unwrap();
        store
    }

    #[tokio::test]
    async fn test_upsert_creates_then_updates() {
        let store = store_with_db().await;

        let first = upsert(&store, "db", "doc", &json!({ "v": 1 })).await.unwrap();
        let second = upsert(&store, "db", "doc", &json!({ "v": 2 })).await.unwrap();

        assert_eq!(first, UpsertOutcome::Created);
        assert_eq!(second, UpsertOutcome::Updated);
        assert_eq!(store.document("db", "doc"), Some(json!({ "v": 2 })));
        assert_eq!(store.document_count("db"), 1);
    }

    #[tokio::test]
    async fn test_repeated_upsert_is_idempotent() {
        let store = store_with_db().await;
        let body = json!({ "validate_doc_update": "function() {}" });

        upsert(&store, "db", "_design/guard", &body).await.unwrap();
        upsert(&store, "db", "_design/guard", &body).await.unwrap();

        assert_eq!(store.document("db", "_design/guard"), Some(body));
        assert_eq!(store.document_count("db"), 1);
    }

    #[tokio::test]
    async fn test_unversioned_document_is_overwritten() {
        let store = store_with_db().await;

        let first = upsert(&store, "db", "_security", &json!({ "admins": { "names": ["a"] } }))
            .await
            .unwrap();
        let second = upsert(&store, "db", "_security", &json!({ "admins": { "names": ["b"] } }))
            .await
            .unwrap();

        assert_eq!(first, UpsertOutcome::Created);
        assert_eq!(second, UpsertOutcome::Created);
        assert_eq!(
            store.document("db", "_security"),
            Some(json!({ "admins": { "names": ["b"] } }))
        );
    }

    #[tokio::test]
    async fn test_conflict_is_benign() {
        let store = store_with_db().await;
        upsert(&store, "db", "doc", &json!({ "v": 1 })).await.unwrap();

        store.race_next_insert("db", "doc", json!({ "v": "theirs" }));
        let outcome = upsert(&store, "db", "doc", &json!({ "v": "ours" })).await.unwrap();

        assert_eq!(outcome, UpsertOutcome::Converged);
        assert_eq!(store.document("db", "doc"), Some(json!({ "v": "theirs" })));
        assert_eq!(store.document_count("db"), 1);
    }

    #[tokio::test]
    async fn test_conflict_on_create_is_benign() {
        let store = store_with_db().await;

        store.race_next_insert("db", "doc", json!({ "v": "theirs" }));
        let outcome = upsert(&store, "db", "doc", &json!({ "v": "ours" })).await.unwrap();

        assert_eq!(outcome, UpsertOutcome::Converged);
        assert_eq!(store.document_count("db"), 1);
    }

    #[tokio::test]
    async fn test_fetch_failure_is_fatal() {
        let store = store_with_db().await;
        store.fail_next(StoreOp::Get, StoreError::Transport("timed out".to_string()));

        let err = upsert(&store, "db", "doc", &json!({})).await.unwrap_err();
        assert!(matches!(err, StoreError::Transport(_)));
        assert_eq!(store.write_count(), 0);
    }

    #[tokio::test]
    async fn test_write_failure_is_fatal() {
        let store = store_with_db().await;
        store.fail_next(
            StoreOp::Insert,
            StoreError::Http {
                status: 403,
                error: "forbidden".to_string(),
                reason: "nope".to_string(),
            },
        );

        let err = upsert(&store, "db", "doc", &json!({})).await.unwrap_err();
        assert!(matches!(err, StoreError::Http { status: 403, .. }));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_upserts_converge() {
        let store = Arc::new(store_with_db().await);
        upsert(store.as_ref(), "db", "doc", &json!({ "v": 0 })).await.unwrap();

        let bodies = [json!({ "v": "a" }), json!({ "v": "b" })];
        let tasks: Vec<_> = bodies
            .iter()
            .cloned()
            .map(|body| {
                let store = store.clone();
                tokio::spawn(async move { upsert(store.as_ref(), "db", "doc", &body).await })
            })
            .collect();

        for task in futures::future::join_all(tasks).await {
            assert!(task.unwrap().is_ok());
        }

        let stored = store.document("db", "doc").unwrap();
        assert!(bodies.contains(&stored));
        assert_eq!(store.document_count("db"), 1);
    }

    #[tokio::test]
    async fn test_interleaved_upserts_one_converges() {
        let store = store_with_db().await;
        upsert(&store, "db", "doc", &json!({ "v": 0 })).await.unwrap();

        // both fetch the same revision before either writes
        let body_a = json!({ "v": "a" });
        let body_b = json!({ "v": "b" });
        let (a, b) = tokio::join!(
            upsert(&store, "db", "doc", &body_a),
            upsert(&store, "db", "doc", &body_b),
        );
        let outcomes = [a.unwrap(), b.unwrap()];

        assert!(outcomes.contains(&UpsertOutcome::Updated));
        assert!(outcomes.contains(&UpsertOutcome::Converged));
        let stored = store.document("db", "doc").unwrap();
        assert!(stored == json!({ "v": "a" }) || stored == json!({ "v": "b" }));
    }

    #[tokio::test]
    async fn test_retire() {
        let store = store_with_db().await;

        assert_eq!(retire(&store, "db", "guard").await.unwrap(), RetireOutcome::Absent);

        upsert(&store, "db", "guard", &json!({ "v": 1 })).await.unwrap();
        assert_eq!(retire(&store, "db", "guard").await.unwrap(), RetireOutcome::Removed);
        assert!(store.document("db", "guard").is_none());

        assert_eq!(retire(&store, "db", "guard").await.unwrap(), RetireOutcome::Absent);
    }

    #[tokio::test]
    async fn test_retire_conflict_is_benign() {
        let store = store_with_db().await;
        upsert(&store, "db", "guard", &json!({ "v": 1 })).await.unwrap();

        store.race_next_insert("db", "guard", json!({ "v": 2 }));
        assert_eq!(retire(&store, "db", "guard").await.unwrap(), RetireOutcome::Converged);
    }
}
