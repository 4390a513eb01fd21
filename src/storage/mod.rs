pub mod array;

pub use array::{ArraySchema, DenseArray};

use bytes::Bytes;
use object_store::aws::AmazonS3Builder;
use object_store::path::Path;
use object_store::{ClientOptions, ObjectStore, PutPayload};
use std::ops::Range;
use std::sync::Arc;
use tracing::{debug, instrument};

use crate::config::{StorageBackend, StorageConfig};
use crate::error::{CumulusError, Result};

/// Wrapper around the `object_store` crate providing a unified interface
/// for S3, local filesystem, and in-memory storage backends.
#[derive(Clone)]
pub struct ArrayStore {
    inner: Arc<dyn ObjectStore>,
}

impl std::fmt::Debug for ArrayStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ArrayStore").finish_non_exhaustive()
    }
}

impl ArrayStore {
    /// Create a new store from configuration.
    pub fn from_config(config: &StorageConfig) -> Result<Self> {
        let store: Arc<dyn ObjectStore> = match config.backend {
            StorageBackend::S3 => {
                let mut builder = AmazonS3Builder::new().with_bucket_name(&config.bucket);

                if let Some(ref region) = config.s3_region {
                    builder = builder.with_region(region);
                }
                if let Some(ref endpoint) = config.s3_endpoint {
                    if !endpoint.is_empty() {
                        builder = builder.with_endpoint(endpoint);
                    }
                }
                if let Some(ref key_id) = config.s3_access_key_id {
                    builder = builder.with_access_key_id(key_id);
                }
                if let Some(ref secret) = config.s3_secret_access_key {
                    builder = builder.with_secret_access_key(secret);
                }
                if config.s3_allow_http {
                    builder = builder.with_allow_http(true);
                }

                // Partition reads are few and large; keep generous timeouts.
                let client_options = ClientOptions::new()
                    .with_timeout(std::time::Duration::from_secs(60))
                    .with_connect_timeout(std::time::Duration::from_secs(10));
                builder = builder.with_client_options(client_options);

                Arc::new(builder.build().map_err(|e| {
                    CumulusError::Config(format!("failed to build S3 store: {e}"))
                })?)
            }
            StorageBackend::Local => {
                let path = std::path::Path::new(&config.bucket);
                if !path.exists() {
                    std::fs::create_dir_all(path)?;
                }
                Arc::new(
                    object_store::local::LocalFileSystem::new_with_prefix(path).map_err(|e| {
                        CumulusError::Config(format!("failed to build local store: {e}"))
                    })?,
                )
            }
        };

        Ok(Self { inner: store })
    }

    /// Create a store directly from an ObjectStore instance (for testing).
    pub fn new(store: Arc<dyn ObjectStore>) -> Self {
        Self { inner: store }
    }

    /// Put an object at the given key.
    #[instrument(skip(self, data), fields(key = key, size = data.len()))]
    pub async fn put(&self, key: &str, data: Bytes) -> Result<()> {
        let start = std::time::Instant::now();
        let path = Path::parse(key)?;
        self.inner
            .put(&path, PutPayload::from(data))
            .await
            .map_err(|e| {
                crate::metrics::STORAGE_ERRORS_TOTAL
                    .with_label_values(&["put"])
                    .inc();
                CumulusError::Storage(e)
            })?;
        let elapsed = start.elapsed();
        debug!(elapsed_ms = elapsed.as_millis(), "storage put");
        crate::metrics::STORAGE_OP_DURATION
            .with_label_values(&["put"])
            .observe(elapsed.as_secs_f64());
        Ok(())
    }

    /// Get an entire object by key. Returns NotFound if it doesn't exist.
    #[instrument(skip(self), fields(key = key))]
    pub async fn get(&self, key: &str) -> Result<Bytes> {
        let start = std::time::Instant::now();
        let path = Path::parse(key)?;
        let result = self.inner.get(&path).await.map_err(|e| {
            crate::metrics::STORAGE_ERRORS_TOTAL
                .with_label_values(&["get"])
                .inc();
            match e {
                object_store::Error::NotFound { path, .. } => CumulusError::NotFound {
                    key: path.to_string(),
                },
                other => CumulusError::Storage(other),
            }
        })?;
        let bytes = result.bytes().await?;
        let elapsed = start.elapsed();
        debug!(
            elapsed_ms = elapsed.as_millis(),
            size = bytes.len(),
            "storage get"
        );
        crate::metrics::STORAGE_OP_DURATION
            .with_label_values(&["get"])
            .observe(elapsed.as_secs_f64());
        Ok(bytes)
    }

    /// Read a union of byte ranges from one object in a single coalesced
    /// request. Ranges are returned in request order.
    ///
    /// This is the primitive behind partition-batch reads: the whole batch
    /// of column intervals becomes one storage round trip, never a read per
    /// partition.
    #[instrument(skip(self, ranges), fields(key = key, num_ranges = ranges.len()))]
    pub async fn get_ranges(&self, key: &str, ranges: &[Range<u64>]) -> Result<Vec<Bytes>> {
        let start = std::time::Instant::now();
        let path = Path::parse(key)?;
        let parts = self.inner.get_ranges(&path, ranges).await.map_err(|e| {
            crate::metrics::STORAGE_ERRORS_TOTAL
                .with_label_values(&["get_ranges"])
                .inc();
            match e {
                object_store::Error::NotFound { path, .. } => CumulusError::NotFound {
                    key: path.to_string(),
                },
                other => CumulusError::Storage(other),
            }
        })?;
        let elapsed = start.elapsed();
        debug!(
            elapsed_ms = elapsed.as_millis(),
            bytes = parts.iter().map(|b| b.len()).sum::<usize>(),
            "storage get_ranges"
        );
        crate::metrics::STORAGE_OP_DURATION
            .with_label_values(&["get_ranges"])
            .observe(elapsed.as_secs_f64());
        Ok(parts)
    }
}
