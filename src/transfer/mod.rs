//! # Object Transfer
//!
//! Streaming copy of a blob-store object into an exclusively owned working file.

pub mod blob;
pub mod error;
pub mod object_transfer;
pub mod working_file;

pub use blob::{
    BlobClient, BlobConnector, ByteStream, ObjectStoreClient, S3Connector, SharedStoreConnector,
};
pub use error::TransferError;
pub use object_transfer::ObjectTransfer;
pub use working_file::WorkingFile;
