//! The transactional document store abstraction and its in-memory backend

use crate::path::DocPath;
use async_trait::async_trait;
use convene_types::{StudyError, StudyResult};
use serde_json::Value;
use std::collections::BTreeMap;
use tokio::sync::RwLock;
use tracing::{debug, trace};

/// Max retries for an optimistic read-modify-write before giving up.
const MAX_UPDATE_ATTEMPTS: usize = 16;

/// Mutation applied inside [`DocumentStore::update`]. Receives the current
/// document (if any) and returns its replacement. Must be pure: it may run
/// more than once when the write races.
pub type Mutator<'a> = &'a mut (dyn FnMut(Option<Value>) -> StudyResult<Value> + Send);

/// Abstract transactional document store.
///
/// All core persistence is expressed through these primitives; backends
/// must make `update` serializable per document (concurrent read-modify-
/// writes never clobber each other) and `write_batch` all-or-nothing.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    async fn read(&self, path: &DocPath) -> StudyResult<Option<Value>>;

    /// Write a document. With `merge`, objects merge recursively
    /// (new fields overlay, missing fields persist); otherwise the
    /// document is replaced.
    async fn write(&self, path: &DocPath, data: Value, merge: bool) -> StudyResult<()>;

    /// Atomic read-modify-write. Retried automatically on conflict;
    /// contention is invisible to callers.
    async fn update(&self, path: &DocPath, mutate: Mutator<'_>) -> StudyResult<Value>;

    /// Atomically write several documents, all or nothing.
    async fn write_batch(&self, writes: Vec<(DocPath, Value)>) -> StudyResult<()>;

    /// Direct children of a collection path.
    async fn list(&self, prefix: &DocPath) -> StudyResult<Vec<(DocPath, Value)>>;

    /// Delete a document and everything beneath it.
    async fn delete_tree(&self, prefix: &DocPath) -> StudyResult<()>;
}

/// Recursive object merge: maps merge key-wise, everything else replaces.
pub fn merge_value(existing: &mut Value, incoming: Value) {
    match (existing, incoming) {
        (Value::Object(existing), Value::Object(incoming)) => {
            for (key, value) in incoming {
                match existing.get_mut(&key) {
                    Some(slot) => merge_value(slot, value),
                    None => {
                        existing.insert(key, value);
                    }
                }
            }
        }
        (slot, incoming) => *slot = incoming,
    }
}

#[derive(Clone, Debug)]
struct VersionedDoc {
    version: u64,
    data: Value,
}

/// In-memory [`DocumentStore`] for development and tests.
///
/// Documents carry a version counter; `update` runs an optimistic
/// compare-and-swap loop against it.
#[derive(Debug, Default)]
pub struct MemoryStore {
    docs: RwLock<BTreeMap<DocPath, VersionedDoc>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl DocumentStore for MemoryStore {
    async fn read(&self, path: &DocPath) -> StudyResult<Option<Value>> {
        Ok(self.docs.read().await.get(path).map(|doc| doc.data.clone()))
    }

    async fn write(&self, path: &DocPath, data: Value, merge: bool) -> StudyResult<()> {
        let mut docs = self.docs.write().await;
        match docs.get_mut(path) {
            Some(doc) => {
                if merge {
                    merge_value(&mut doc.data, data);
                } else {
                    doc.data = data;
                }
                doc.version += 1;
            }
            None => {
                docs.insert(path.clone(), VersionedDoc { version: 0, data });
            }
        }
        Ok(())
    }

    async fn update(&self, path: &DocPath, mutate: Mutator<'_>) -> StudyResult<Value> {
        for attempt in 0..MAX_UPDATE_ATTEMPTS {
            let snapshot = {
                let docs = self.docs.read().await;
                docs.get(path).map(|doc| (doc.version, doc.data.clone()))
            };

            let next = mutate(snapshot.as_ref().map(|(_, data)| data.clone()))?;

            let mut docs = self.docs.write().await;
            let current_version = docs.get(path).map(|doc| doc.version);
            let snapshot_version = snapshot.as_ref().map(|(version, _)| *version);
            if current_version == snapshot_version {
                let version = current_version.map(|v| v + 1).unwrap_or(0);
                docs.insert(
                    path.clone(),
                    VersionedDoc {
                        version,
                        data: next.clone(),
                    },
                );
                trace!(%path, version, "update committed");
                return Ok(next);
            }

            debug!(%path, attempt, "update conflict, retrying");
        }

        Err(StudyError::Store(format!(
            "update contention at {path} exceeded {MAX_UPDATE_ATTEMPTS} attempts"
        )))
    }

    async fn write_batch(&self, writes: Vec<(DocPath, Value)>) -> StudyResult<()> {
        // A single write-lock section makes the batch atomic.
        let mut docs = self.docs.write().await;
        for (path, data) in writes {
            match docs.get_mut(&path) {
                Some(doc) => {
                    doc.data = data;
                    doc.version += 1;
                }
                None => {
                    docs.insert(path, VersionedDoc { version: 0, data });
                }
            }
        }
        Ok(())
    }

    async fn list(&self, prefix: &DocPath) -> StudyResult<Vec<(DocPath, Value)>> {
        Ok(self
            .docs
            .read()
            .await
            .iter()
            .filter(|(path, _)| path.is_child_of(prefix))
            .map(|(path, doc)| (path.clone(), doc.data.clone()))
            .collect())
    }

    async fn delete_tree(&self, prefix: &DocPath) -> StudyResult<()> {
        let mut docs = self.docs.write().await;
        docs.retain(|path, _| path != prefix && !path.is_under(prefix));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::Arc;

    fn path(segments: &[&str]) -> DocPath {
        let mut path = DocPath::root(segments[0]);
        for segment in &segments[1..] {
            path = path.child(*segment);
        }
        path
    }

    #[tokio::test]
    async fn merge_write_overlays_nested_fields() {
        let store = MemoryStore::new();
        let doc = path(&["experiments", "e", "answers", "a"]);

        store
            .write(&doc, json!({"answers": {"0": "sextant"}}), true)
            .await
            .unwrap();
        store
            .write(&doc, json!({"answers": {"1": "mirror"}}), true)
            .await
            .unwrap();

        let data = store.read(&doc).await.unwrap().unwrap();
        // Cumulative: both field-level writes survive.
        assert_eq!(data["answers"]["0"], "sextant");
        assert_eq!(data["answers"]["1"], "mirror");
    }

    #[tokio::test]
    async fn replace_write_drops_old_fields() {
        let store = MemoryStore::new();
        let doc = path(&["d"]);

        store.write(&doc, json!({"a": 1}), false).await.unwrap();
        store.write(&doc, json!({"b": 2}), false).await.unwrap();

        let data = store.read(&doc).await.unwrap().unwrap();
        assert!(data.get("a").is_none());
        assert_eq!(data["b"], 2);
    }

    #[tokio::test]
    async fn concurrent_updates_lose_no_increments() {
        let store = Arc::new(MemoryStore::new());
        let doc = path(&["counters", "c"]);
        store.write(&doc, json!({"n": 0}), false).await.unwrap();

        let mut handles = Vec::new();
        for _ in 0..16 {
            let store = Arc::clone(&store);
            let doc = doc.clone();
            handles.push(tokio::spawn(async move {
                store
                    .update(&doc, &mut |prev| {
                        let mut data = prev.unwrap_or_else(|| json!({"n": 0}));
                        let n = data["n"].as_u64().unwrap_or(0);
                        data["n"] = json!(n + 1);
                        Ok(data)
                    })
                    .await
                    .unwrap();
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        let data = store.read(&doc).await.unwrap().unwrap();
        assert_eq!(data["n"], 16);
    }

    #[tokio::test]
    async fn mutator_errors_abort_the_update() {
        let store = MemoryStore::new();
        let doc = path(&["d"]);
        store.write(&doc, json!({"locked": true}), false).await.unwrap();

        let err = store
            .update(&doc, &mut |_| Err(StudyError::DuplicateVote))
            .await
            .unwrap_err();
        assert!(matches!(err, StudyError::DuplicateVote));

        let data = store.read(&doc).await.unwrap().unwrap();
        assert_eq!(data["locked"], true);
    }

    #[tokio::test]
    async fn delete_tree_removes_the_subtree_only() {
        let store = MemoryStore::new();
        store
            .write_batch(vec![
                (path(&["experiments", "e1"]), json!({})),
                (path(&["experiments", "e1", "stages", "s"]), json!({})),
                (path(&["experiments", "e2"]), json!({})),
            ])
            .await
            .unwrap();

        store.delete_tree(&path(&["experiments", "e1"])).await.unwrap();

        assert!(store.read(&path(&["experiments", "e1"])).await.unwrap().is_none());
        assert!(store
            .read(&path(&["experiments", "e1", "stages", "s"]))
            .await
            .unwrap()
            .is_none());
        assert!(store.read(&path(&["experiments", "e2"])).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn list_returns_direct_children() {
        let store = MemoryStore::new();
        store
            .write_batch(vec![
                (path(&["c", "a"]), json!(1)),
                (path(&["c", "b"]), json!(2)),
                (path(&["c", "b", "nested", "d"]), json!(3)),
            ])
            .await
            .unwrap();

        let children = store.list(&path(&["c"])).await.unwrap();
        assert_eq!(children.len(), 2);
    }
}
