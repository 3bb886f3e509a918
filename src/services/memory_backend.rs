//! In-memory `ObjectBackend` for tests.
//!
//! Objects live in a `HashMap` behind a `Mutex` shared by every clone and by
//! every client handed out by `with_options`. Knobs simulate a missing bucket,
//! failing writes, slow bucket creation and racing writers, and counters let
//! tests assert which backend calls were made.

use crate::services::{
    backend::{
        BackendError, BackendResult, ClientOptions, ObjectBackend, ObjectBody, ObjectHead,
        PutObject,
    },
    preview_store::hash_content,
};
use async_trait::async_trait;
use bytes::Bytes;
use chrono::Utc;
use std::{
    collections::HashMap,
    io::Cursor,
    sync::{Arc, Mutex, MutexGuard},
};

struct Stored {
    body: Bytes,
    content_type: String,
    head: ObjectHead,
}

#[derive(Default)]
struct State {
    bucket_exists: bool,
    bucket_created: bool,
    /// Existence polls that still answer "no" after creation.
    visible_after: u32,
    fail_writes: bool,
    fail_create: bool,
    /// Bucket is created by another client of the same account first.
    owned_on_create: bool,
    occupy_on_next_put: Option<String>,
    objects: HashMap<String, Stored>,
    put_calls: usize,
    get_calls: usize,
    create_calls: usize,
    options_seen: Vec<ClientOptions>,
}

#[derive(Clone)]
pub struct InMemoryBackend {
    bucket: String,
    state: Arc<Mutex<State>>,
}

impl InMemoryBackend {
    pub fn new(bucket: &str) -> Self {
        let backend = Self::without_bucket(bucket);
        backend.state().bucket_exists = true;
        backend
    }

    pub fn without_bucket(bucket: &str) -> Self {
        Self {
            bucket: bucket.to_string(),
            state: Arc::new(Mutex::new(State::default())),
        }
    }

    fn state(&self) -> MutexGuard<'_, State> {
        self.state.lock().expect("backend state lock")
    }

    pub fn fail_writes(&self) {
        self.state().fail_writes = true;
    }

    pub fn fail_bucket_creation(&self) {
        self.state().fail_create = true;
    }

    /// Creation answers "already owned by you", as when a concurrent
    /// start-up of the same account won the race.
    pub fn bucket_owned_on_create(&self) {
        self.state().owned_on_create = true;
    }

    pub fn delay_visibility(&self, polls: u32) {
        self.state().visible_after = polls;
    }

    /// Make another writer claim `key` just before the next write lands.
    pub fn occupy_on_next_put(&self, key: &str) {
        self.state().occupy_on_next_put = Some(key.to_string());
    }

    pub fn put_calls(&self) -> usize {
        self.state().put_calls
    }

    pub fn get_calls(&self) -> usize {
        self.state().get_calls
    }

    pub fn create_calls(&self) -> usize {
        self.state().create_calls
    }

    pub fn options_seen(&self) -> Vec<ClientOptions> {
        self.state().options_seen.clone()
    }

    pub fn bucket_created(&self) -> bool {
        self.state().bucket_created
    }

    pub fn contains(&self, key: &str) -> bool {
        self.state().objects.contains_key(key)
    }

    pub fn content_type(&self, key: &str) -> Option<String> {
        self.state()
            .objects
            .get(key)
            .map(|object| object.content_type.clone())
    }

    fn require_bucket(&self, state: &State) -> BackendResult<()> {
        if state.bucket_exists {
            Ok(())
        } else {
            Err(BackendError::NoSuchBucket(self.bucket.clone()))
        }
    }
}

fn stored(body: Bytes, content_type: &str) -> Stored {
    Stored {
        head: ObjectHead {
            checksum: hash_content(&body),
            last_modified: Utc::now(),
            size_bytes: body.len() as i64,
        },
        content_type: content_type.to_string(),
        body,
    }
}

#[async_trait]
impl ObjectBackend for InMemoryBackend {
    fn bucket(&self) -> &str {
        &self.bucket
    }

    fn with_options(&self, options: ClientOptions) -> Arc<dyn ObjectBackend> {
        self.state().options_seen.push(options);
        Arc::new(self.clone())
    }

    async fn put_object(&self, request: PutObject) -> BackendResult<()> {
        let mut state = self.state();
        state.put_calls += 1;
        self.require_bucket(&state)?;
        if state.fail_writes {
            return Err(BackendError::Other("simulated write failure".into()));
        }
        if let Some(md5) = &request.content_md5 {
            if *md5 != hash_content(&request.body) {
                return Err(BackendError::Other(
                    "BadDigest: the Content-MD5 you specified did not match what we received"
                        .into(),
                ));
            }
        }
        if let Some(key) = state.occupy_on_next_put.take() {
            state
                .objects
                .insert(key, stored(Bytes::from_static(b"racer"), "application/pdf"));
        }
        if request.if_absent && state.objects.contains_key(&request.key) {
            return Err(BackendError::PreconditionFailed(request.key));
        }

        let object = stored(request.body, request.content_type);
        state.objects.insert(request.key, object);
        Ok(())
    }

    async fn head_object(&self, key: &str) -> BackendResult<ObjectHead> {
        let state = self.state();
        self.require_bucket(&state)?;
        state
            .objects
            .get(key)
            .map(|object| object.head.clone())
            .ok_or_else(|| BackendError::NoSuchKey(key.to_string()))
    }

    async fn get_object(&self, key: &str) -> BackendResult<ObjectBody> {
        let mut state = self.state();
        state.get_calls += 1;
        self.require_bucket(&state)?;
        let object = state
            .objects
            .get(key)
            .ok_or_else(|| BackendError::NoSuchKey(key.to_string()))?;

        Ok(ObjectBody {
            head: object.head.clone(),
            body: Box::pin(Cursor::new(object.body.clone())),
        })
    }

    async fn bucket_exists(&self) -> BackendResult<bool> {
        let mut state = self.state();
        if !state.bucket_exists {
            return Ok(false);
        }
        if state.visible_after > 0 {
            state.visible_after -= 1;
            return Ok(false);
        }
        Ok(true)
    }

    async fn create_bucket(&self) -> BackendResult<()> {
        let mut state = self.state();
        state.create_calls += 1;
        if state.fail_create {
            return Err(BackendError::Other("simulated create failure".into()));
        }
        if state.owned_on_create {
            state.bucket_exists = true;
        }
        if state.bucket_exists {
            return Err(BackendError::BucketAlreadyOwned(self.bucket.clone()));
        }
        state.bucket_exists = true;
        state.bucket_created = true;
        Ok(())
    }
}
