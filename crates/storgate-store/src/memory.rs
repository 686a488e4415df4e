//! In-process store backend for tests and single-replica deployments.

use std::collections::{BTreeSet, HashMap};
use std::sync::Mutex;

use async_trait::async_trait;

use crate::{KeyGuard, KeyWrite, KvStore, StoreResult};

#[derive(Default)]
struct Inner {
    values: HashMap<String, String>,
    sets: HashMap<String, BTreeSet<String>>,
}

/// A `KvStore` backed by process memory.
///
/// All operations take one mutex, which makes `compare_and_swap` trivially
/// atomic. Suitable for tests and single-replica runs only; nothing here is
/// shared across processes.
#[derive(Default)]
pub struct MemoryKvStore {
    inner: Mutex<Inner>,
}

impl MemoryKvStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl KvStore for MemoryKvStore {
    async fn get(&self, key: &str) -> StoreResult<Option<String>> {
        let inner = self.inner.lock().unwrap();
        Ok(inner.values.get(key).cloned())
    }

    async fn put(&self, key: &str, value: &str) -> StoreResult<()> {
        let mut inner = self.inner.lock().unwrap();
        inner.values.insert(key.to_string(), value.to_string());
        Ok(())
    }

    async fn compare_and_swap(
        &self,
        guards: &[KeyGuard],
        writes: &[KeyWrite],
    ) -> StoreResult<bool> {
        let mut inner = self.inner.lock().unwrap();
        for guard in guards {
            if inner.values.get(&guard.key) != guard.expected.as_ref() {
                return Ok(false);
            }
        }
        for write in writes {
            match &write.value {
                Some(value) => {
                    inner.values.insert(write.key.clone(), value.clone());
                }
                None => {
                    inner.values.remove(&write.key);
                }
            }
        }
        Ok(true)
    }

    async fn keys_with_prefix(&self, prefix: &str) -> StoreResult<Vec<String>> {
        let inner = self.inner.lock().unwrap();
        Ok(inner
            .values
            .keys()
            .filter(|k| k.starts_with(prefix))
            .cloned()
            .collect())
    }

    async fn set_add(&self, key: &str, member: &str) -> StoreResult<bool> {
        let mut inner = self.inner.lock().unwrap();
        Ok(inner
            .sets
            .entry(key.to_string())
            .or_default()
            .insert(member.to_string()))
    }

    async fn set_remove(&self, key: &str, member: &str) -> StoreResult<bool> {
        let mut inner = self.inner.lock().unwrap();
        Ok(inner
            .sets
            .get_mut(key)
            .is_some_and(|set| set.remove(member)))
    }

    async fn set_contains(&self, key: &str, member: &str) -> StoreResult<bool> {
        let inner = self.inner.lock().unwrap();
        Ok(inner.sets.get(key).is_some_and(|set| set.contains(member)))
    }

    async fn set_members(&self, key: &str) -> StoreResult<Vec<String>> {
        let inner = self.inner.lock().unwrap();
        Ok(inner
            .sets
            .get(key)
            .map(|set| set.iter().cloned().collect())
            .unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_get_put_round_trip() {
        let store = MemoryKvStore::new();
        assert_eq!(store.get("a").await.unwrap(), None);
        store.put("a", "1").await.unwrap();
        assert_eq!(store.get("a").await.unwrap().as_deref(), Some("1"));
    }

    #[tokio::test]
    async fn test_cas_applies_when_guards_hold() {
        let store = MemoryKvStore::new();
        store.put("a", "1").await.unwrap();

        let applied = store
            .compare_and_swap(
                &[
                    KeyGuard::new("a", Some("1".to_string())),
                    KeyGuard::new("b", None),
                ],
                &[KeyWrite::set("a", "2"), KeyWrite::set("b", "10")],
            )
            .await
            .unwrap();

        assert!(applied);
        assert_eq!(store.get("a").await.unwrap().as_deref(), Some("2"));
        assert_eq!(store.get("b").await.unwrap().as_deref(), Some("10"));
    }

    #[tokio::test]
    async fn test_cas_rejects_stale_guard() {
        let store = MemoryKvStore::new();
        store.put("a", "1").await.unwrap();

        let applied = store
            .compare_and_swap(
                &[KeyGuard::new("a", Some("0".to_string()))],
                &[KeyWrite::set("a", "2")],
            )
            .await
            .unwrap();

        assert!(!applied);
        assert_eq!(store.get("a").await.unwrap().as_deref(), Some("1"));
    }

    #[tokio::test]
    async fn test_cas_guards_absence() {
        let store = MemoryKvStore::new();
        store.put("a", "1").await.unwrap();

        // Guarding absence of a present key must fail.
        let applied = store
            .compare_and_swap(&[KeyGuard::new("a", None)], &[KeyWrite::set("a", "2")])
            .await
            .unwrap();
        assert!(!applied);
    }

    #[tokio::test]
    async fn test_cas_delete_write() {
        let store = MemoryKvStore::new();
        store.put("a", "1").await.unwrap();
        let applied = store
            .compare_and_swap(
                &[KeyGuard::new("a", Some("1".to_string()))],
                &[KeyWrite::delete("a")],
            )
            .await
            .unwrap();
        assert!(applied);
        assert_eq!(store.get("a").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_prefix_scan() {
        let store = MemoryKvStore::new();
        store.put("quota:p1:g1:v1", "x").await.unwrap();
        store.put("quota:p1:g1:used", "0").await.unwrap();
        store.put("tenant:alice", "y").await.unwrap();

        let mut keys = store.keys_with_prefix("quota:").await.unwrap();
        keys.sort();
        assert_eq!(keys, vec!["quota:p1:g1:used", "quota:p1:g1:v1"]);
    }

    #[tokio::test]
    async fn test_set_operations() {
        let store = MemoryKvStore::new();
        assert!(store.set_add("deny", "alice").await.unwrap());
        assert!(!store.set_add("deny", "alice").await.unwrap());
        assert!(store.set_contains("deny", "alice").await.unwrap());
        assert!(!store.set_contains("deny", "bob").await.unwrap());
        assert_eq!(store.set_members("deny").await.unwrap(), vec!["alice"]);
        assert!(store.set_remove("deny", "alice").await.unwrap());
        assert!(!store.set_remove("deny", "alice").await.unwrap());
    }
}
