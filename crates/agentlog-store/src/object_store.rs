//! Object store trait: the boundary the sync engine depends on.
//!
//! The engine treats all four operations as fallible network calls with no
//! atomicity beyond a single put/get. Implementations must be safe for
//! concurrent independent calls.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::StoreResult;

/// Server-side identifier of a bucket, resolved from its alias.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BucketId(pub String);

impl std::fmt::Display for BucketId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Outcome of a successful put.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PutResult {
    pub key: String,
    /// Content etag; SHA-256 hex of the payload when the server does not
    /// supply its own version tag.
    pub etag: String,
}

/// SHA-256 hex digest of a payload, used as the etag fallback.
pub fn payload_etag(payload: &[u8]) -> String {
    use sha2::{Digest, Sha256};
    let mut hasher = Sha256::new();
    hasher.update(payload);
    hex::encode(hasher.finalize())
}

/// Bucket-oriented remote object store.
///
/// Guarantees required by the engine:
/// - `put_object` is atomic per object: a reader sees the whole payload or
///   `NotFound`, never a torn write.
/// - `list_objects` returns keys in lexical order; with the engine's
///   timestamp-first key scheme that is chronological order.
/// - Listings may lag puts (eventual consistency); a listed key whose get
///   returns `NotFound` means "not yet visible", not data loss.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Resolve (creating if necessary) a bucket by alias.
    async fn create_bucket(&self, alias: &str) -> StoreResult<BucketId>;

    /// Upload one object. Overwrites an existing key.
    async fn put_object(&self, bucket: &BucketId, key: &str, payload: &[u8])
        -> StoreResult<PutResult>;

    /// Download one object's full payload.
    async fn get_object(&self, bucket: &BucketId, key: &str) -> StoreResult<Vec<u8>>;

    /// List keys under a prefix, lexically sorted.
    async fn list_objects(&self, bucket: &BucketId, prefix: &str) -> StoreResult<Vec<String>>;
}
