//! Object-storage capability the preview store is written against.
//!
//! The production implementation is `S3Backend`. Every implementation reports
//! failures as `BackendError`, so no SDK-specific error shape reaches the store.

use crate::models::preview::ContentStream;
use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use std::{sync::Arc, time::Duration};
use thiserror::Error;

/// Classified backend failure.
#[derive(Debug, Error)]
pub enum BackendError {
    #[error("bucket `{0}` does not exist")]
    NoSuchBucket(String),
    #[error("no object at `{0}`")]
    NoSuchKey(String),
    /// A conditional write found the key already occupied.
    #[error("object at `{0}` already exists")]
    PreconditionFailed(String),
    #[error("bucket `{0}` is already owned by this account")]
    BucketAlreadyOwned(String),
    #[error("backend error: {0}")]
    Other(String),
}

pub type BackendResult<T> = Result<T, BackendError>;

/// Per-client transport settings.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ClientOptions {
    /// Retries after the first attempt.
    pub retries: u32,
    pub read_timeout: Duration,
    pub connect_timeout: Duration,
}

impl ClientOptions {
    pub const fn new(retries: u32, read_timeout: Duration, connect_timeout: Duration) -> Self {
        Self {
            retries,
            read_timeout,
            connect_timeout,
        }
    }
}

/// A single-shot object write.
#[derive(Debug)]
pub struct PutObject {
    pub key: String,
    pub body: Bytes,
    pub content_type: &'static str,
    /// Base64 MD5 the backend must verify the body against.
    pub content_md5: Option<String>,
    /// Write only if nothing exists at `key` (`If-None-Match: *`).
    pub if_absent: bool,
}

/// Object attributes returned by HEAD and GET.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ObjectHead {
    /// Base64 MD5 of the stored bytes.
    pub checksum: String,
    pub last_modified: DateTime<Utc>,
    pub size_bytes: i64,
}

pub struct ObjectBody {
    pub head: ObjectHead,
    pub body: ContentStream,
}

/// Operations the store needs from an object-storage service, scoped to one
/// bucket.
#[async_trait]
pub trait ObjectBackend: Send + Sync {
    /// Name of the bucket this client is bound to.
    fn bucket(&self) -> &str;

    /// A short-lived client for the same bucket with different timeouts and
    /// retry budget.
    fn with_options(&self, options: ClientOptions) -> Arc<dyn ObjectBackend>;

    async fn put_object(&self, request: PutObject) -> BackendResult<()>;

    async fn head_object(&self, key: &str) -> BackendResult<ObjectHead>;

    async fn get_object(&self, key: &str) -> BackendResult<ObjectBody>;

    async fn bucket_exists(&self) -> BackendResult<bool>;

    async fn create_bucket(&self) -> BackendResult<()>;
}
