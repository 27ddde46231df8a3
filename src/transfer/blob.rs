//! # Blob Store Clients
//!
//! Provider seam between the transfer logic and the blob store.
//!
//! A [`BlobConnector`] is long-lived and holds only configuration. Each transfer
//! asks it for a fresh [`BlobClient`] scoped to one bucket and drops that client
//! when the transfer ends, so no connection state outlives the operation that
//! needed it.
//!
//! ## Backends
//!
//! - [`S3Connector`]: S3-compatible stores (AWS, RadosGW, MinIO) via `object_store`
//! - [`SharedStoreConnector`]: any existing `object_store` instance (in-memory,
//!   local filesystem), with the bucket name used as a path prefix

use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use futures::stream::BoxStream;
use futures::{StreamExt, TryStreamExt};
use object_store::aws::AmazonS3Builder;
use object_store::path::Path as ObjectPath;
use object_store::ObjectStore;
use tracing::debug;

use super::error::TransferError;
use crate::config::BlobStoreConfig;

/// Ordered object bytes as they arrive from the store
pub type ByteStream = BoxStream<'static, Result<Bytes, TransferError>>;

/// Short-lived handle bound to one bucket
#[async_trait]
pub trait BlobClient: Send + Sync {
    /// Open a streaming read of `key`
    ///
    /// Fails with [`TransferError::ObjectNotFound`] when the store reports the key absent.
    async fn open_stream(&self, key: &str) -> Result<ByteStream, TransferError>;
}

/// Factory for scoped [`BlobClient`] handles
pub trait BlobConnector: Send + Sync + 'static {
    fn connect(&self, bucket: &str) -> Result<Box<dyn BlobClient>, TransferError>;

    fn backend_name(&self) -> &'static str;
}

/// `BlobClient` backed by any `object_store` implementation
pub struct ObjectStoreClient {
    store: Arc<dyn ObjectStore>,
    bucket: String,
    prefix: Option<String>,
}

impl std::fmt::Debug for ObjectStoreClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ObjectStoreClient")
            .field("store", &self.store.to_string())
            .field("bucket", &self.bucket)
            .field("prefix", &self.prefix)
            .finish()
    }
}

impl ObjectStoreClient {
    pub fn new(store: Arc<dyn ObjectStore>, bucket: impl Into<String>) -> Self {
        Self {
            store,
            bucket: bucket.into(),
            prefix: None,
        }
    }

    /// Resolve keys under `prefix/` instead of the store root
    pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = Some(prefix.into());
        self
    }

    fn object_path(&self, key: &str) -> ObjectPath {
        match &self.prefix {
            Some(prefix) => ObjectPath::from(format!("{prefix}/{key}")),
            None => ObjectPath::from(key),
        }
    }
}

#[async_trait]
impl BlobClient for ObjectStoreClient {
    async fn open_stream(&self, key: &str) -> Result<ByteStream, TransferError> {
        let path = self.object_path(key);

        let result = self.store.get(&path).await.map_err(|e| match e {
            object_store::Error::NotFound { .. } => {
                TransferError::object_not_found(&self.bucket, key)
            }
            other => TransferError::io("open_stream", other),
        })?;

        debug!(
            bucket = %self.bucket,
            key = %key,
            reported_size = result.meta.size,
            "📥 Object stream opened"
        );

        Ok(result
            .into_stream()
            .map_err(|e| TransferError::io("read_stream", e))
            .boxed())
    }
}

/// Connector for S3-compatible endpoints
///
/// Builds a new `AmazonS3` client per call with path-style addressing, which
/// RadosGW and MinIO require for custom endpoints.
#[derive(Debug, Clone)]
pub struct S3Connector {
    config: BlobStoreConfig,
}

impl S3Connector {
    pub fn new(config: BlobStoreConfig) -> Self {
        Self { config }
    }
}

impl BlobConnector for S3Connector {
    fn connect(&self, bucket: &str) -> Result<Box<dyn BlobClient>, TransferError> {
        let mut builder = AmazonS3Builder::new()
            .with_region(&self.config.region)
            .with_bucket_name(bucket)
            .with_allow_http(self.config.allow_http)
            .with_virtual_hosted_style_request(false);

        if !self.config.endpoint.is_empty() {
            builder = builder.with_endpoint(&self.config.endpoint);
        }
        if !self.config.access_key.is_empty() {
            builder = builder
                .with_access_key_id(&self.config.access_key)
                .with_secret_access_key(&self.config.secret_key);
        }

        let store = builder
            .build()
            .map_err(|e| TransferError::io("connect", e))?;

        Ok(Box::new(ObjectStoreClient::new(Arc::new(store), bucket)))
    }

    fn backend_name(&self) -> &'static str {
        "s3"
    }
}

/// Connector over an already constructed store shared by all transfers
///
/// Objects are addressed as `<bucket>/<key>` inside the store.
#[derive(Clone)]
pub struct SharedStoreConnector {
    store: Arc<dyn ObjectStore>,
}

impl std::fmt::Debug for SharedStoreConnector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SharedStoreConnector")
            .field("store", &self.store.to_string())
            .finish()
    }
}

impl SharedStoreConnector {
    pub fn new(store: Arc<dyn ObjectStore>) -> Self {
        Self { store }
    }
}

impl BlobConnector for SharedStoreConnector {
    fn connect(&self, bucket: &str) -> Result<Box<dyn BlobClient>, TransferError> {
        Ok(Box::new(
            ObjectStoreClient::new(self.store.clone(), bucket).with_prefix(bucket),
        ))
    }

    fn backend_name(&self) -> &'static str {
        "shared"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use object_store::memory::InMemory;

    #[tokio::test]
    async fn test_shared_store_reads_prefixed_object() {
        let store = Arc::new(InMemory::new());
        store
            .put(
                &ObjectPath::from("alice/run1/data.bin"),
                Bytes::from_static(b"hello").into(),
            )
            .await
            .unwrap();

        let connector = SharedStoreConnector::new(store);
        let client = connector.connect("alice").unwrap();
        let chunks: Vec<Bytes> = client
            .open_stream("run1/data.bin")
            .await
            .unwrap()
            .try_collect()
            .await
            .unwrap();

        assert_eq!(chunks.concat(), b"hello");
    }

    #[tokio::test]
    async fn test_missing_object_maps_to_not_found() {
        let connector = SharedStoreConnector::new(Arc::new(InMemory::new()));
        let client = connector.connect("alice").unwrap();
        let err = client.open_stream("missing.bin").await.err().unwrap();

        assert!(err.is_not_found());
        assert_eq!(err.to_string(), "Object not found: alice/missing.bin");
    }

    #[test]
    fn test_s3_connector_builds_scoped_client() {
        let connector = S3Connector::new(BlobStoreConfig {
            endpoint: "http://localhost:8000".to_string(),
            access_key: "access".to_string(),
            secret_key: "secret".to_string(),
            region: "default".to_string(),
            allow_http: true,
        });

        assert!(connector.connect("alice").is_ok());
        assert_eq!(connector.backend_name(), "s3");
    }
}
