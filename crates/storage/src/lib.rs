//! Storage abstractions for the band-merge pipeline.
//!
//! Sources are read through [`BlobStore`], a narrow async trait with one
//! operation. [`ObjectStorage`] implements it on top of the `object_store`
//! crate for S3 buckets, local directories and in-memory stores.

pub mod error;
pub mod object_store;

pub use self::error::{StorageError, StorageResult};
pub use self::object_store::{BlobStore, ObjectStorage, ObjectStorageConfig};
