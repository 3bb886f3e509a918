//! src/services/preview_store.rs
//!
//! PreviewStore: maps preview identities onto object keys in one bucket,
//! computes content checksums, and turns backend failures into `StoreError`.
//! Handlers only ever talk to this type; it never builds HTTP responses.

use crate::{
    models::{
        metadata::Metadata,
        preview::{Content, Preview},
    },
    services::{
        backend::{BackendError, ClientOptions, ObjectBackend, ObjectHead, PutObject},
        bootstrap::{Bootstrap, BootstrapPolicy},
    },
};
use base64::{Engine as _, engine::general_purpose};
use bytes::Bytes;
use chrono::Utc;
use std::{fmt, sync::Arc, time::Duration};
use thiserror::Error;
use tracing::{debug, error, info};

/// Content type of every stored preview.
pub const PREVIEW_CONTENT_TYPE: &str = "application/pdf";

const PROBE_KEY: &str = "stat";
const PROBE_BODY: &[u8] = b"test";
const PROBE_CONTENT_TYPE: &str = "text/plain";

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("bucket `{0}` does not exist")]
    NoSuchBucket(String),
    #[error("no preview at `{0}`")]
    DoesNotExist(String),
    #[error("preview already exists at `{0}`")]
    PreviewAlreadyExists(String),
    #[error("deposit failed: {reason}")]
    DepositFailed {
        reason: String,
        #[source]
        source: Option<BackendError>,
    },
    #[error("storage service could not be initialized: {0}")]
    InitializationFailed(String),
    #[error(transparent)]
    Backend(BackendError),
}

pub type StoreResult<T> = Result<T, StoreError>;

impl From<BackendError> for StoreError {
    fn from(err: BackendError) -> Self {
        match err {
            BackendError::NoSuchBucket(bucket) => StoreError::NoSuchBucket(bucket),
            BackendError::NoSuchKey(key) => StoreError::DoesNotExist(key),
            BackendError::PreconditionFailed(key) => StoreError::PreviewAlreadyExists(key),
            other => StoreError::Backend(other),
        }
    }
}

/// Outcome of a content fetch that may be short-circuited by an entity tag.
#[derive(Debug)]
pub enum ContentFetch {
    /// The caller's tag matches the stored checksum; no content was opened.
    NotModified { checksum: String },
    Modified(Preview),
}

/// Encoded MD5 of `body`: base64 of the raw digest.
pub fn hash_content(body: &[u8]) -> String {
    general_purpose::STANDARD.encode(md5::compute(body).0)
}

/// PreviewStore is the one place that knows how previews map onto objects.
///
/// Cheap to clone: every clone shares the same backend client. Built once at
/// startup and handed to the router as state.
#[derive(Clone)]
pub struct PreviewStore {
    backend: Arc<dyn ObjectBackend>,
}

impl fmt::Debug for PreviewStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PreviewStore")
            .field("bucket", &self.backend.bucket())
            .finish()
    }
}

impl PreviewStore {
    pub fn new(backend: Arc<dyn ObjectBackend>) -> Self {
        Self { backend }
    }

    /// Object key for a preview identity.
    pub fn key(source_id: &str, checksum: &str) -> String {
        format!("preview/{}/{}/{}.pdf", source_id, checksum, source_id)
    }

    /// Store the content of `preview`.
    ///
    /// With `overwrite` unset the write is create-once: an existing object
    /// fails the deposit with `PreviewAlreadyExists` before anything is sent,
    /// and the write itself is conditional on the key being free, so a racing
    /// deposit loses at the backend. `expected_checksum` (base64 MD5) is
    /// handed to the backend for verification in place of the computed one.
    ///
    /// Returns a fresh preview with `metadata` set.
    pub async fn deposit(
        &self,
        preview: Preview,
        overwrite: bool,
        expected_checksum: Option<String>,
    ) -> StoreResult<Preview> {
        let Preview {
            source_id,
            checksum,
            content,
            ..
        } = preview;
        let Some(content) = content else {
            return Err(StoreError::DepositFailed {
                reason: "content is missing".into(),
                source: None,
            });
        };

        let key = Self::key(&source_id, &checksum);
        let body = content
            .read_all()
            .await
            .map_err(|err| StoreError::DepositFailed {
                reason: format!("could not read content: {}", err),
                source: None,
            })?;
        let preview_checksum = hash_content(&body);
        let size_bytes = i64::try_from(body.len()).unwrap_or(i64::MAX);

        if !overwrite {
            match self.backend.head_object(&key).await {
                Ok(_) => return Err(StoreError::PreviewAlreadyExists(key)),
                Err(BackendError::NoSuchKey(_)) => {}
                Err(err) => return Err(deposit_failure(err)),
            }
        }

        debug!("depositing {} bytes at {}", size_bytes, key);
        self.backend
            .put_object(PutObject {
                key,
                body,
                content_type: PREVIEW_CONTENT_TYPE,
                content_md5: Some(expected_checksum.unwrap_or_else(|| preview_checksum.clone())),
                if_absent: !overwrite,
            })
            .await
            .map_err(deposit_failure)?;

        Ok(Preview {
            source_id,
            checksum,
            metadata: Some(Metadata {
                checksum: preview_checksum,
                added: Utc::now(),
                size_bytes,
            }),
            content: None,
        })
    }

    /// Content checksum of a stored preview, without transferring the body.
    pub async fn get_preview_checksum(&self, source_id: &str, checksum: &str) -> StoreResult<String> {
        Ok(self.head(source_id, checksum).await?.checksum)
    }

    pub async fn get_metadata(&self, source_id: &str, checksum: &str) -> StoreResult<Metadata> {
        Ok(metadata_from(self.head(source_id, checksum).await?))
    }

    /// Preview with metadata and an open content stream.
    pub async fn get_preview(&self, source_id: &str, checksum: &str) -> StoreResult<Preview> {
        let key = Self::key(source_id, checksum);
        debug!("fetching content at {}", key);
        let object = self.backend.get_object(&key).await?;

        Ok(Preview {
            source_id: source_id.to_string(),
            checksum: checksum.to_string(),
            metadata: Some(metadata_from(object.head)),
            content: Some(Content::new(object.body)),
        })
    }

    /// Fetch content unless it still matches the caller's entity tag.
    ///
    /// Only the checksum is resolved first; the body is opened only when the
    /// tag is absent or differs from the stored checksum.
    pub async fn get_preview_if_none_match(
        &self,
        source_id: &str,
        checksum: &str,
        none_match: Option<&str>,
    ) -> StoreResult<ContentFetch> {
        if let Some(tag) = none_match {
            let current = self.get_preview_checksum(source_id, checksum).await?;
            if current == tag {
                debug!("preview {}/{} not modified", source_id, checksum);
                return Ok(ContentFetch::NotModified { checksum: current });
            }
        }
        let preview = self.get_preview(source_id, checksum).await?;
        Ok(ContentFetch::Modified(preview))
    }

    /// Check whether we can write to the bucket.
    ///
    /// Uses a fresh client with the given timeouts and retry budget. Every
    /// failure reads as "unavailable".
    pub async fn is_available(
        &self,
        retries: u32,
        read_timeout: Duration,
        connect_timeout: Duration,
    ) -> bool {
        match self
            .probe(ClientOptions::new(retries, read_timeout, connect_timeout))
            .await
        {
            Ok(()) => {
                debug!("store is available");
                true
            }
            Err(err) => {
                debug!("store is not available: {}", err);
                false
            }
        }
    }

    /// Perform initial checks at application start-up, creating the bucket
    /// if it does not exist yet.
    pub async fn initialize(&self) -> StoreResult<()> {
        info!("initialize storage service");
        Bootstrap::new(self.clone(), BootstrapPolicy::default())
            .run()
            .await
    }

    /// Put a tiny object to test the connection.
    pub(crate) async fn probe(&self, options: ClientOptions) -> StoreResult<()> {
        let client = self.backend.with_options(options);
        info!("trying to put to bucket {}", client.bucket());
        client
            .put_object(PutObject {
                key: PROBE_KEY.to_string(),
                body: Bytes::from_static(PROBE_BODY),
                content_type: PROBE_CONTENT_TYPE,
                content_md5: None,
                if_absent: false,
            })
            .await
            .map_err(|err| {
                error!("Error when calling store: {}", err);
                StoreError::from(err)
            })
    }

    /// Create the bucket. Already owning it counts as success.
    pub(crate) async fn create_bucket(&self, options: ClientOptions) -> StoreResult<()> {
        match self.backend.with_options(options).create_bucket().await {
            Ok(()) | Err(BackendError::BucketAlreadyOwned(_)) => Ok(()),
            Err(err) => Err(err.into()),
        }
    }

    pub(crate) async fn bucket_exists(&self) -> StoreResult<bool> {
        Ok(self.backend.bucket_exists().await?)
    }

    async fn head(&self, source_id: &str, checksum: &str) -> StoreResult<ObjectHead> {
        let key = Self::key(source_id, checksum);
        debug!("fetching metadata at {}", key);
        Ok(self.backend.head_object(&key).await?)
    }
}

fn metadata_from(head: ObjectHead) -> Metadata {
    Metadata {
        checksum: head.checksum,
        added: head.last_modified,
        size_bytes: head.size_bytes,
    }
}

/// Failures on the write path. Conflicts and a missing bucket keep their
/// meaning; anything else fails the deposit.
fn deposit_failure(err: BackendError) -> StoreError {
    match err {
        BackendError::PreconditionFailed(key) => StoreError::PreviewAlreadyExists(key),
        BackendError::NoSuchBucket(bucket) => StoreError::NoSuchBucket(bucket),
        other => {
            error!("Could not deposit preview: {}", other);
            StoreError::DepositFailed {
                reason: "could not deposit preview".into(),
                source: Some(other),
            }
        }
    }
}
