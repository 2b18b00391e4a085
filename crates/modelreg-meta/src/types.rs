use std::pin::Pin;

use anyhow::Result;
use async_trait::async_trait;
use futures_core::Stream;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct WatchEvent {
    pub key: String,
    pub value: Option<Vec<u8>>,
    pub revision: u64,
}

/// A key, its value and the revision at which it was last modified.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyValue {
    pub key: String,
    pub value: Vec<u8>,
    pub revision: u64,
}

pub type WatchStream = Pin<Box<dyn Stream<Item = WatchEvent> + Send>>;

/// Revisioned key/value store.
///
/// Every write bumps a store-wide revision. A key that does not exist has
/// revision `0`, so `compare_and_swap(key, 0, ..)` is a create-if-absent.
#[async_trait]
pub trait MetaStore: Send + Sync {
    /// Value and revision of `key`, if present.
    async fn get(&self, key: &str) -> Result<Option<(Vec<u8>, u64)>>;
    async fn list_prefix(&self, prefix: &str) -> Result<Vec<KeyValue>>;

    /// Writes `value` only if the key's current revision equals
    /// `expected_revision`. Returns whether the write happened and the
    /// resulting (or current, on conflict) revision.
    async fn compare_and_swap(
        &self,
        key: &str,
        expected_revision: u64,
        value: Vec<u8>,
    ) -> Result<(bool, u64)>;

    /// Deletes the key only if its current revision equals
    /// `expected_revision`. Returns `false` on conflict or when the key is gone.
    async fn compare_and_delete(&self, key: &str, expected_revision: u64) -> Result<bool>;

    async fn watch_prefix(
        &self,
        prefix: &str,
        start_revision_exclusive: Option<u64>,
    ) -> Result<WatchStream>;
}
