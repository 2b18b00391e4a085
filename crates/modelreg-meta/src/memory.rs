use std::{collections::BTreeMap, sync::Arc};

use anyhow::Result;
use tokio::sync::{broadcast, RwLock};
use tokio_stream::{wrappers::BroadcastStream, StreamExt};

use crate::types::{KeyValue, MetaStore, WatchEvent, WatchStream};

/// In-process store used for single-node deployments and tests.
#[derive(Debug, Clone)]
pub struct MemoryMetaStore {
    inner: Arc<RwLock<Inner>>,
    tx: broadcast::Sender<WatchEvent>,
}

#[derive(Debug, Default)]
struct Inner {
    revision: u64,
    kv: BTreeMap<String, (Vec<u8>, u64)>,
}

impl MemoryMetaStore {
    pub fn new() -> Self {
        let (tx, _rx) = broadcast::channel(1024);
        Self {
            inner: Arc::new(RwLock::new(Inner::default())),
            tx,
        }
    }

    fn next_revision(inner: &mut Inner) -> u64 {
        inner.revision = inner.revision.saturating_add(1);
        inner.revision
    }

    fn emit(&self, event: WatchEvent) {
        let _ = self.tx.send(event);
    }
}

impl Default for MemoryMetaStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl MetaStore for MemoryMetaStore {
    async fn get(&self, key: &str) -> Result<Option<(Vec<u8>, u64)>> {
        let inner = self.inner.read().await;
        Ok(inner.kv.get(key).map(|(v, rev)| (v.clone(), *rev)))
    }

    async fn list_prefix(&self, prefix: &str) -> Result<Vec<KeyValue>> {
        let inner = self.inner.read().await;
        let out = inner
            .kv
            .range(prefix.to_string()..)
            .take_while(|(k, _)| k.starts_with(prefix))
            .map(|(k, (v, rev))| KeyValue {
                key: k.clone(),
                value: v.clone(),
                revision: *rev,
            })
            .collect();
        Ok(out)
    }

    async fn compare_and_swap(
        &self,
        key: &str,
        expected_revision: u64,
        value: Vec<u8>,
    ) -> Result<(bool, u64)> {
        let (rev, event) = {
            let mut inner = self.inner.write().await;
            let current_rev = inner.kv.get(key).map(|(_, rev)| *rev).unwrap_or(0);
            if current_rev != expected_revision {
                return Ok((false, current_rev));
            }
            let rev = Self::next_revision(&mut inner);
            inner.kv.insert(key.to_string(), (value.clone(), rev));
            let event = WatchEvent {
                key: key.to_string(),
                value: Some(value),
                revision: rev,
            };
            (rev, event)
        };

        self.emit(event);
        Ok((true, rev))
    }

    async fn compare_and_delete(&self, key: &str, expected_revision: u64) -> Result<bool> {
        let event = {
            let mut inner = self.inner.write().await;
            match inner.kv.get(key) {
                Some((_, rev)) if *rev == expected_revision => {}
                _ => return Ok(false),
            }
            inner.kv.remove(key);
            let rev = Self::next_revision(&mut inner);
            WatchEvent {
                key: key.to_string(),
                value: None,
                revision: rev,
            }
        };

        self.emit(event);
        Ok(true)
    }

    async fn watch_prefix(
        &self,
        prefix: &str,
        start_revision_exclusive: Option<u64>,
    ) -> Result<WatchStream> {
        let prefix = prefix.to_string();
        let min_rev = start_revision_exclusive.unwrap_or(0);
        let rx = self.tx.subscribe();
        let stream = BroadcastStream::new(rx).filter_map(move |msg| match msg {
            Ok(ev) => {
                if ev.revision <= min_rev {
                    return None;
                }
                if ev.key.starts_with(&prefix) {
                    Some(ev)
                } else {
                    None
                }
            }
            Err(_) => None,
        });

        Ok(Box::pin(stream))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_cas_create_if_absent() {
        let store = MemoryMetaStore::new();

        let (ok, rev) = store.compare_and_swap("/a", 0, b"1".to_vec()).await.unwrap();
        assert!(ok);
        assert!(rev > 0);

        // A second create-if-absent loses.
        let (ok, current) = store.compare_and_swap("/a", 0, b"2".to_vec()).await.unwrap();
        assert!(!ok);
        assert_eq!(current, rev);

        let (ok, _) = store.compare_and_swap("/a", rev, b"3".to_vec()).await.unwrap();
        assert!(ok);
        let (value, _) = store.get("/a").await.unwrap().unwrap();
        assert_eq!(value, b"3".to_vec());
    }

    #[tokio::test]
    async fn test_compare_and_delete() {
        let store = MemoryMetaStore::new();
        let (_, rev) = store.compare_and_swap("/a", 0, b"1".to_vec()).await.unwrap();

        assert!(!store.compare_and_delete("/a", rev + 1).await.unwrap());
        assert!(store.get("/a").await.unwrap().is_some());

        assert!(store.compare_and_delete("/a", rev).await.unwrap());
        assert!(store.get("/a").await.unwrap().is_none());
        assert!(!store.compare_and_delete("/a", rev).await.unwrap());
    }

    #[tokio::test]
    async fn test_list_prefix_is_scoped() {
        let store = MemoryMetaStore::new();
        store.compare_and_swap("/models/t0/a", 0, b"a".to_vec()).await.unwrap();
        store.compare_and_swap("/models/t0/b", 0, b"b".to_vec()).await.unwrap();
        store.compare_and_swap("/models/t1/c", 0, b"c".to_vec()).await.unwrap();

        let kvs = store.list_prefix("/models/t0/").await.unwrap();
        let keys: Vec<_> = kvs.iter().map(|kv| kv.key.as_str()).collect();
        assert_eq!(keys, vec!["/models/t0/a", "/models/t0/b"]);
    }

    #[tokio::test]
    async fn test_watch_prefix_sees_later_writes() {
        let store = MemoryMetaStore::new();
        let mut stream = store.watch_prefix("/models/", None).await.unwrap();

        store.compare_and_swap("/other/x", 0, b"x".to_vec()).await.unwrap();
        store.compare_and_swap("/models/t0/a", 0, b"a".to_vec()).await.unwrap();

        let ev = stream.next().await.unwrap();
        assert_eq!(ev.key, "/models/t0/a");
        assert_eq!(ev.value, Some(b"a".to_vec()));
    }
}
