//! agentlog-store: remote persistence boundary for the log sync engine.
//!
//! ## Key components
//!
//! - [`ObjectStore`]: async put/get/list primitives against a bucket store
//! - [`MemoryObjectStore`]: in-memory fake with fault injection for tests
//! - [`HttpObjectStore`]: reqwest-backed bucket REST client
//! - [`SyncStateFile`]: durable sync cursor surviving process restarts

mod error;
pub mod fakes;
mod http;
pub mod object_store;
mod sync_state;

pub use error::{StoreError, StoreResult};
pub use fakes::MemoryObjectStore;
pub use http::{HttpObjectStore, HttpStoreConfig};
pub use object_store::{payload_etag, BucketId, ObjectStore, PutResult};
pub use sync_state::{SyncState, SyncStateFile};
