//! # Object Transfer
//!
//! Streams one object from the blob store into a local file.
//!
//! Reads and writes are interleaved: the next network chunk is not polled until
//! the previous bytes have been written, so a slow disk slows the download down
//! instead of growing an in-memory buffer. At most one write chunk plus one
//! network chunk is held in memory regardless of object size.

use std::path::Path;
use std::sync::Arc;

use bytes::BytesMut;
use futures::StreamExt;
use tokio::fs::File;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info, instrument, warn};

use super::blob::BlobConnector;
use super::error::TransferError;
use crate::constants::transfer::DEFAULT_CHUNK_SIZE_BYTES;
use crate::events::ObjectLocation;

pub struct ObjectTransfer {
    connector: Arc<dyn BlobConnector>,
    chunk_size: usize,
}

impl std::fmt::Debug for ObjectTransfer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ObjectTransfer")
            .field("backend", &self.connector.backend_name())
            .field("chunk_size", &self.chunk_size)
            .finish()
    }
}

impl ObjectTransfer {
    pub fn new(connector: Arc<dyn BlobConnector>) -> Self {
        Self {
            connector,
            chunk_size: DEFAULT_CHUNK_SIZE_BYTES,
        }
    }

    /// Override the write chunk size (clamped to at least one byte)
    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size.max(1);
        self
    }

    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    /// Copy the object at `location` into `destination`, returning the bytes written
    ///
    /// The destination is created (or truncated). On success its length equals
    /// the number of bytes read from the store; a mismatch with the declared size
    /// is logged as a warning only. If the stream fails midway the bytes received
    /// so far stay on disk and [`TransferError::TransferIo`] is returned.
    #[instrument(skip_all, fields(bucket = %location.bucket_name, key = %location.object_key))]
    pub async fn download(
        &self,
        location: &ObjectLocation,
        destination: &Path,
    ) -> Result<u64, TransferError> {
        let client = self.connector.connect(&location.bucket_name)?;
        let mut stream = client.open_stream(&location.object_key).await?;

        let mut file = File::create(destination)
            .await
            .map_err(|e| TransferError::io("create_destination", e))?;

        let mut pending = BytesMut::with_capacity(self.chunk_size);
        let mut written: u64 = 0;

        while let Some(next) = stream.next().await {
            let bytes = match next {
                Ok(bytes) => bytes,
                Err(e) => {
                    // Keep what arrived; the caller decides what to do with a partial file
                    if !pending.is_empty() && file.write_all(&pending).await.is_ok() {
                        written += pending.len() as u64;
                    }
                    let _ = file.flush().await;
                    warn!(
                        bytes_written = written,
                        declared_size = location.size,
                        error = %e,
                        "❌ Object stream interrupted"
                    );
                    return Err(e);
                }
            };

            pending.extend_from_slice(&bytes);
            while pending.len() >= self.chunk_size {
                let chunk = pending.split_to(self.chunk_size);
                file.write_all(&chunk)
                    .await
                    .map_err(|e| TransferError::io("write_chunk", e))?;
                written += chunk.len() as u64;
            }
        }

        if !pending.is_empty() {
            file.write_all(&pending)
                .await
                .map_err(|e| TransferError::io("write_chunk", e))?;
            written += pending.len() as u64;
        }

        file.flush()
            .await
            .map_err(|e| TransferError::io("flush", e))?;
        file.sync_all()
            .await
            .map_err(|e| TransferError::io("sync", e))?;

        drop(stream);
        drop(client);

        if written != location.size {
            warn!(
                bytes_written = written,
                declared_size = location.size,
                "⚠️ Downloaded size differs from declared size"
            );
        } else {
            debug!(bytes_written = written, "Downloaded size matches declared size");
        }

        info!(
            bytes_written = written,
            destination = %destination.display(),
            "✅ Object transferred"
        );

        Ok(written)
    }
}
