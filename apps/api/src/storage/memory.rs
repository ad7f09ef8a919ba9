//! In-process artifact store for tests and single-host development.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use bytes::Bytes;

use super::{ArtifactStore, StoreError};

#[derive(Debug, Default)]
pub struct MemoryArtifactStore {
    objects: Mutex<BTreeMap<String, Bytes>>,
    /// Number of upcoming calls that fail with `Unavailable`.
    outages: AtomicU32,
    /// Number of upcoming calls that fail with `Rejected`.
    rejections: AtomicU32,
    puts: AtomicU32,
}

impl MemoryArtifactStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes the next `calls` operations fail as if the store were down.
    pub fn fail_next(&self, calls: u32) {
        self.outages.store(calls, Ordering::SeqCst);
    }

    /// Makes the next `calls` operations fail as if access were denied.
    pub fn reject_next(&self, calls: u32) {
        self.rejections.store(calls, Ordering::SeqCst);
    }

    /// Total successful `put` calls, overwrites included.
    pub fn put_count(&self) -> u32 {
        self.puts.load(Ordering::SeqCst)
    }

    fn check_outage(&self, key: &str) -> Result<(), StoreError> {
        if take_one(&self.rejections) {
            return Err(StoreError::Rejected {
                key: key.to_string(),
                status: 403,
                message: "simulated access denied".to_string(),
            });
        }
        if take_one(&self.outages) {
            return Err(StoreError::Unavailable {
                key: key.to_string(),
                message: "simulated outage".to_string(),
            });
        }
        Ok(())
    }

    fn objects(&self) -> std::sync::MutexGuard<'_, BTreeMap<String, Bytes>> {
        // A poisoned map still holds consistent whole-object writes.
        self.objects.lock().unwrap_or_else(|e| e.into_inner())
    }
}

fn take_one(counter: &AtomicU32) -> bool {
    counter
        .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
        .is_ok()
}

#[async_trait]
impl ArtifactStore for MemoryArtifactStore {
    async fn put(&self, key: &str, bytes: Bytes, _content_type: &str) -> Result<(), StoreError> {
        self.check_outage(key)?;
        self.objects().insert(key.to_string(), bytes);
        self.puts.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Bytes, StoreError> {
        self.check_outage(key)?;
        self.objects()
            .get(key)
            .cloned()
            .ok_or_else(|| StoreError::NotFound {
                key: key.to_string(),
            })
    }

    async fn list(&self, prefix: &str) -> Result<Vec<String>, StoreError> {
        self.check_outage(prefix)?;
        Ok(self
            .objects()
            .keys()
            .filter(|k| k.starts_with(prefix))
            .cloned()
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_put_get_overwrite() {
        let store = MemoryArtifactStore::new();
        store.put("a/b", Bytes::from_static(b"1"), "text/plain").await.unwrap();
        store.put("a/b", Bytes::from_static(b"2"), "text/plain").await.unwrap();
        assert_eq!(store.get("a/b").await.unwrap(), Bytes::from_static(b"2"));
        assert_eq!(store.put_count(), 2);
    }

    #[tokio::test]
    async fn test_missing_key_is_not_found() {
        let store = MemoryArtifactStore::new();
        let err = store.get("nope").await.unwrap_err();
        assert!(matches!(err, StoreError::NotFound { .. }));
        assert!(!err.is_transient());
    }

    #[tokio::test]
    async fn test_simulated_outage_is_transient_and_bounded() {
        let store = MemoryArtifactStore::new();
        store.fail_next(1);
        let err = store.list("").await.unwrap_err();
        assert!(err.is_transient());
        assert!(store.list("").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_simulated_rejection_is_terminal() {
        let store = MemoryArtifactStore::new();
        store.reject_next(1);
        let err = store.put("a", Bytes::new(), "x").await.unwrap_err();
        assert!(matches!(err, StoreError::Rejected { status: 403, .. }));
        assert!(!err.is_transient());
        assert_eq!(store.put_count(), 0);
    }

    #[tokio::test]
    async fn test_list_filters_by_prefix() {
        let store = MemoryArtifactStore::new();
        for key in ["j/1/a", "j/1/b", "j/2/a"] {
            store.put(key, Bytes::new(), "x").await.unwrap();
        }
        assert_eq!(store.list("j/1/").await.unwrap(), vec!["j/1/a", "j/1/b"]);
    }
}
