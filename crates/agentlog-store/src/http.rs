//! HTTP bucket store client.
//!
//! Talks to a bucket REST API:
//!
//! ```text
//! POST /v1/buckets                          {"alias": ...} -> {"bucket_id": ...}
//! PUT  /v1/buckets/{id}/objects/{key}       <bytes>        -> {"etag": ...}
//! GET  /v1/buckets/{id}/objects/{key}                      -> <bytes>
//! GET  /v1/buckets/{id}/objects?prefix=...                 -> {"keys": [...]}
//! ```
//!
//! Status mapping: network errors and 5xx/429 are transient (retried by the
//! scheduler), 401/403 mean the store is unavailable until reconfigured,
//! 404 is a per-object gap.

use async_trait::async_trait;
use reqwest::StatusCode;
use serde::Deserialize;
use tracing::debug;

use crate::error::{StoreError, StoreResult};
use crate::object_store::{payload_etag, BucketId, ObjectStore, PutResult};

/// Connection settings for the HTTP backend.
#[derive(Debug, Clone)]
pub struct HttpStoreConfig {
    /// Server base URL, no trailing slash.
    pub server_url: String,
    /// Bearer token (optional for open buckets).
    pub token: Option<String>,
}

impl HttpStoreConfig {
    pub fn new(server_url: &str) -> Self {
        Self {
            server_url: server_url.trim_end_matches('/').to_string(),
            token: None,
        }
    }

    pub fn with_token(mut self, token: &str) -> Self {
        self.token = Some(token.to_string());
        self
    }
}

/// Bucket store client over HTTP.
pub struct HttpObjectStore {
    config: HttpStoreConfig,
    client: reqwest::Client,
}

#[derive(Deserialize)]
struct CreateBucketResponse {
    bucket_id: String,
}

#[derive(Deserialize)]
struct PutObjectResponse {
    etag: Option<String>,
}

#[derive(Deserialize)]
struct ListObjectsResponse {
    keys: Vec<String>,
}

/// Map a non-success HTTP status to the engine's error taxonomy.
fn map_status(status: StatusCode, key: &str) -> StoreError {
    match status {
        StatusCode::NOT_FOUND => StoreError::NotFound { key: key.to_string() },
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
            StoreError::Unavailable(format!("auth rejected ({status})"))
        }
        s if s.is_server_error() || s == StatusCode::TOO_MANY_REQUESTS => {
            StoreError::Transient(format!("server returned {s}"))
        }
        s => StoreError::Unavailable(format!("unexpected status {s}")),
    }
}

impl HttpObjectStore {
    pub fn new(config: HttpStoreConfig) -> StoreResult<Self> {
        let client = reqwest::Client::builder()
            .user_agent(concat!("agentlog/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| StoreError::Unavailable(format!("client build failed: {e}")))?;
        Ok(Self { config, client })
    }

    fn authed(&self, req: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.config.token {
            Some(token) => req.bearer_auth(token),
            None => req,
        }
    }

    fn object_url(&self, bucket: &BucketId, key: &str) -> String {
        format!(
            "{}/v1/buckets/{}/objects/{}",
            self.config.server_url, bucket.0, key
        )
    }
}

#[async_trait]
impl ObjectStore for HttpObjectStore {
    async fn create_bucket(&self, alias: &str) -> StoreResult<BucketId> {
        let url = format!("{}/v1/buckets", self.config.server_url);
        let response = self
            .authed(self.client.post(&url))
            .json(&serde_json::json!({ "alias": alias }))
            .send()
            .await
            .map_err(|e| StoreError::Transient(format!("create_bucket: {e}")))?;

        if !response.status().is_success() {
            return Err(map_status(response.status(), alias));
        }
        let body: CreateBucketResponse = response
            .json()
            .await
            .map_err(|e| StoreError::Transient(format!("create_bucket decode: {e}")))?;
        debug!(bucket_id = %body.bucket_id, alias = %alias, "bucket resolved");
        Ok(BucketId(body.bucket_id))
    }

    async fn put_object(
        &self,
        bucket: &BucketId,
        key: &str,
        payload: &[u8],
    ) -> StoreResult<PutResult> {
        let response = self
            .authed(self.client.put(self.object_url(bucket, key)))
            .body(payload.to_vec())
            .send()
            .await
            .map_err(|e| StoreError::Transient(format!("put_object: {e}")))?;

        if !response.status().is_success() {
            return Err(map_status(response.status(), key));
        }
        // Some servers return an etag; otherwise fall back to a local digest.
        let etag = response
            .json::<PutObjectResponse>()
            .await
            .ok()
            .and_then(|r| r.etag)
            .unwrap_or_else(|| payload_etag(payload));
        Ok(PutResult {
            key: key.to_string(),
            etag,
        })
    }

    async fn get_object(&self, bucket: &BucketId, key: &str) -> StoreResult<Vec<u8>> {
        let response = self
            .authed(self.client.get(self.object_url(bucket, key)))
            .send()
            .await
            .map_err(|e| StoreError::Transient(format!("get_object: {e}")))?;

        if !response.status().is_success() {
            return Err(map_status(response.status(), key));
        }
        let bytes = response
            .bytes()
            .await
            .map_err(|e| StoreError::Transient(format!("get_object body: {e}")))?;
        Ok(bytes.to_vec())
    }

    async fn list_objects(&self, bucket: &BucketId, prefix: &str) -> StoreResult<Vec<String>> {
        let url = format!(
            "{}/v1/buckets/{}/objects",
            self.config.server_url, bucket.0
        );
        let response = self
            .authed(self.client.get(&url))
            .query(&[("prefix", prefix)])
            .send()
            .await
            .map_err(|e| StoreError::Transient(format!("list_objects: {e}")))?;

        if !response.status().is_success() {
            return Err(map_status(response.status(), prefix));
        }
        let body: ListObjectsResponse = response
            .json()
            .await
            .map_err(|e| StoreError::Transient(format!("list_objects decode: {e}")))?;
        let mut keys = body.keys;
        keys.sort();
        Ok(keys)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        assert!(matches!(
            map_status(StatusCode::NOT_FOUND, "k"),
            StoreError::NotFound { .. }
        ));
        assert!(matches!(
            map_status(StatusCode::UNAUTHORIZED, "k"),
            StoreError::Unavailable(_)
        ));
        assert!(matches!(
            map_status(StatusCode::FORBIDDEN, "k"),
            StoreError::Unavailable(_)
        ));
        assert!(map_status(StatusCode::SERVICE_UNAVAILABLE, "k").is_retriable());
        assert!(map_status(StatusCode::TOO_MANY_REQUESTS, "k").is_retriable());
        assert!(!map_status(StatusCode::BAD_REQUEST, "k").is_retriable());
    }

    #[test]
    fn test_config_trims_trailing_slash() {
        let cfg = HttpStoreConfig::new("https://store.example.com/");
        assert_eq!(cfg.server_url, "https://store.example.com");
    }

    #[test]
    fn test_config_with_token() {
        let cfg = HttpStoreConfig::new("http://localhost:8080").with_token("secret");
        assert_eq!(cfg.token.as_deref(), Some("secret"));
    }
}
