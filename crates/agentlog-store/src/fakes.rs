//! In-memory fake of the object store (testing only)
//!
//! `MemoryObjectStore` satisfies the [`ObjectStore`] contract without any
//! network, and adds fault-injection knobs so scheduler and retrieval tests
//! can script transient failures, auth outages, and eventual-consistency
//! windows.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Mutex;

use async_trait::async_trait;

use crate::error::{StoreError, StoreResult};
use crate::object_store::{payload_etag, BucketId, ObjectStore, PutResult};

#[derive(Debug, Default)]
struct FaultState {
    /// Next N puts fail with `Transient` before touching the store.
    fail_next_puts: u32,
    /// Every call fails with `Unavailable` while set.
    unavailable: bool,
    /// Keys that appear in listings but whose get returns `NotFound`
    /// (models an object indexed before its payload is readable).
    hidden_keys: HashSet<String>,
}

/// In-memory bucket store backed by `BTreeMap<key, bytes>` per bucket.
///
/// `BTreeMap` keeps listings lexically sorted for free, matching the trait
/// contract.
#[derive(Debug, Default)]
pub struct MemoryObjectStore {
    buckets: Mutex<HashMap<String, BTreeMap<String, Vec<u8>>>>,
    faults: Mutex<FaultState>,
    /// Every key ever successfully put, in order (duplicate-upload checks).
    put_log: Mutex<Vec<String>>,
}

impl MemoryObjectStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next `n` puts fail with a transient error.
    pub fn fail_next_puts(&self, n: u32) {
        self.faults.lock().unwrap().fail_next_puts = n;
    }

    /// Toggle full unavailability (auth/config outage).
    pub fn set_unavailable(&self, unavailable: bool) {
        self.faults.lock().unwrap().unavailable = unavailable;
    }

    /// Hide a key: it stays listed but its payload is not yet readable.
    pub fn hide_key(&self, key: &str) {
        self.faults.lock().unwrap().hidden_keys.insert(key.to_string());
    }

    /// Make a hidden key readable again.
    pub fn reveal_key(&self, key: &str) {
        self.faults.lock().unwrap().hidden_keys.remove(key);
    }

    /// Keys successfully put so far, in order.
    pub fn put_log(&self) -> Vec<String> {
        self.put_log.lock().unwrap().clone()
    }

    /// Number of objects stored in a bucket.
    pub fn object_count(&self, bucket: &BucketId) -> usize {
        self.buckets
            .lock()
            .unwrap()
            .get(&bucket.0)
            .map(|b| b.len())
            .unwrap_or(0)
    }

    fn check_unavailable(&self) -> StoreResult<()> {
        if self.faults.lock().unwrap().unavailable {
            return Err(StoreError::Unavailable("store offline (injected)".into()));
        }
        Ok(())
    }
}

#[async_trait]
impl ObjectStore for MemoryObjectStore {
    async fn create_bucket(&self, alias: &str) -> StoreResult<BucketId> {
        self.check_unavailable()?;
        let mut buckets = self.buckets.lock().unwrap();
        buckets.entry(alias.to_string()).or_default();
        Ok(BucketId(alias.to_string()))
    }

    async fn put_object(
        &self,
        bucket: &BucketId,
        key: &str,
        payload: &[u8],
    ) -> StoreResult<PutResult> {
        self.check_unavailable()?;
        {
            let mut faults = self.faults.lock().unwrap();
            if faults.fail_next_puts > 0 {
                faults.fail_next_puts -= 1;
                return Err(StoreError::Transient("put failed (injected)".into()));
            }
        }
        let mut buckets = self.buckets.lock().unwrap();
        let objects = buckets
            .get_mut(&bucket.0)
            .ok_or_else(|| StoreError::BucketNotFound(bucket.0.clone()))?;
        objects.insert(key.to_string(), payload.to_vec());
        self.put_log.lock().unwrap().push(key.to_string());
        Ok(PutResult {
            key: key.to_string(),
            etag: payload_etag(payload),
        })
    }

    async fn get_object(&self, bucket: &BucketId, key: &str) -> StoreResult<Vec<u8>> {
        self.check_unavailable()?;
        if self.faults.lock().unwrap().hidden_keys.contains(key) {
            return Err(StoreError::NotFound { key: key.to_string() });
        }
        let buckets = self.buckets.lock().unwrap();
        buckets
            .get(&bucket.0)
            .ok_or_else(|| StoreError::BucketNotFound(bucket.0.clone()))?
            .get(key)
            .cloned()
            .ok_or_else(|| StoreError::NotFound { key: key.to_string() })
    }

    async fn list_objects(&self, bucket: &BucketId, prefix: &str) -> StoreResult<Vec<String>> {
        self.check_unavailable()?;
        let buckets = self.buckets.lock().unwrap();
        let objects = buckets
            .get(&bucket.0)
            .ok_or_else(|| StoreError::BucketNotFound(bucket.0.clone()))?;
        let mut keys: Vec<String> = objects
            .keys()
            .filter(|k| k.starts_with(prefix))
            .cloned()
            .collect();
        // Hidden keys are listed too: the index can run ahead of the payload.
        let faults = self.faults.lock().unwrap();
        for hidden in &faults.hidden_keys {
            if hidden.starts_with(prefix) && !keys.contains(hidden) {
                keys.push(hidden.clone());
            }
        }
        keys.sort();
        Ok(keys)
    }
}
