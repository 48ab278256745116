//! In-memory object store for tests.
//!
//! Mirrors the S3 error surfaces the gateway has to cope with: `head`
//! reports a structured `NotFound`, `get` reports free text ("does not
//! exist"), and failures can be injected per operation.

use super::{ObjectHead, ObjectStore, ObjectStream, PutObject, StoreError, StoreResult};
use async_trait::async_trait;
use base64::{Engine as _, engine::general_purpose};
use bytes::Bytes;
use chrono::Utc;
use futures::{StreamExt, stream};
use std::{
    collections::HashMap,
    io,
    sync::{
        Mutex, RwLock,
        atomic::{AtomicBool, AtomicUsize, Ordering},
    },
    time::Duration,
};

const CHUNK_SIZE: usize = 1024;

struct StoredEntry {
    body: Bytes,
    head: ObjectHead,
}

#[derive(Default)]
pub struct MemoryObjectStore {
    bucket: String,
    bucket_exists: AtomicBool,
    create_calls: AtomicUsize,
    objects: RwLock<HashMap<String, StoredEntry>>,
    failure: Mutex<Option<String>>,
    stream_failure: Mutex<Option<String>>,
}

impl MemoryObjectStore {
    pub fn new(bucket: &str) -> Self {
        Self {
            bucket: bucket.to_string(),
            ..Default::default()
        }
    }

    /// Store whose bucket is already provisioned.
    pub fn with_bucket(bucket: &str) -> Self {
        let store = Self::new(bucket);
        store.bucket_exists.store(true, Ordering::SeqCst);
        store
    }

    /// Make every following operation fail with `message`.
    pub fn fail_with(&self, message: &str) {
        *self.failure.lock().unwrap() = Some(message.to_string());
    }

    /// Make body streams yield an error after their first chunk.
    pub fn fail_streams_with(&self, message: &str) {
        *self.stream_failure.lock().unwrap() = Some(message.to_string());
    }

    /// Drop the bucket out from under the gateway. Writes then fail the way
    /// S3 reports `NoSuchBucket`.
    pub fn delete_bucket(&self) {
        self.bucket_exists.store(false, Ordering::SeqCst);
        self.objects.write().unwrap().clear();
    }

    pub fn create_calls(&self) -> usize {
        self.create_calls.load(Ordering::SeqCst)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.objects.read().unwrap().contains_key(key)
    }

    /// Raw user metadata of a stored object.
    pub fn raw_metadata(&self, key: &str) -> Option<HashMap<String, String>> {
        self.objects
            .read()
            .unwrap()
            .get(key)
            .map(|entry| entry.head.metadata.clone())
    }

    /// Write an object directly, bypassing the gateway.
    pub fn insert_raw(&self, key: &str, body: &[u8], content_type: Option<&str>, metadata: HashMap<String, String>) {
        let body = Bytes::copy_from_slice(body);
        let head = ObjectHead {
            content_type: content_type.map(str::to_owned),
            content_length: body.len() as u64,
            etag: Some(format!("{:x}", md5::compute(&body))),
            last_modified: Some(Utc::now()),
            metadata,
        };
        self.objects
            .write()
            .unwrap()
            .insert(key.to_string(), StoredEntry { body, head });
    }

    fn check_failure(&self) -> StoreResult<()> {
        match self.failure.lock().unwrap().as_ref() {
            Some(message) => Err(StoreError::Backend(message.clone())),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl ObjectStore for MemoryObjectStore {
    fn bucket(&self) -> &str {
        &self.bucket
    }

    async fn bucket_exists(&self) -> StoreResult<bool> {
        self.check_failure()?;
        Ok(self.bucket_exists.load(Ordering::SeqCst))
    }

    async fn create_bucket(&self) -> StoreResult<()> {
        self.check_failure()?;
        self.create_calls.fetch_add(1, Ordering::SeqCst);
        self.bucket_exists.store(true, Ordering::SeqCst);
        Ok(())
    }

    async fn put_object(&self, object: PutObject) -> StoreResult<()> {
        self.check_failure()?;
        if !self.bucket_exists.load(Ordering::SeqCst) {
            return Err(StoreError::classify(
                Some("NoSuchBucket"),
                Some(404),
                "The specified bucket does not exist",
                format!("NoSuchBucket: bucket `{}` does not exist", self.bucket),
            ));
        }
        let digest = general_purpose::STANDARD.encode(md5::compute(&object.body).0);
        if digest != object.content_md5 {
            return Err(StoreError::Backend(
                "BadDigest: the Content-MD5 you specified did not match what we received".into(),
            ));
        }

        let head = ObjectHead {
            content_type: Some(object.content_type),
            content_length: object.body.len() as u64,
            etag: Some(format!("{:x}", md5::compute(&object.body))),
            last_modified: Some(Utc::now()),
            metadata: object.metadata,
        };
        self.objects.write().unwrap().insert(
            object.key,
            StoredEntry {
                body: object.body,
                head,
            },
        );
        Ok(())
    }

    async fn head_object(&self, key: &str) -> StoreResult<ObjectHead> {
        self.check_failure()?;
        self.objects
            .read()
            .unwrap()
            .get(key)
            .map(|entry| entry.head.clone())
            .ok_or_else(|| StoreError::classify(Some("NotFound"), Some(404), "", "NotFound".into()))
    }

    async fn get_object(&self, key: &str) -> StoreResult<ObjectStream> {
        self.check_failure()?;
        let body = self
            .objects
            .read()
            .unwrap()
            .get(key)
            .map(|entry| entry.body.clone())
            .ok_or_else(|| {
                let message = "The specified key does not exist.";
                StoreError::classify(None, None, message, message.into())
            })?;

        let mut chunks: Vec<io::Result<Bytes>> = body
            .chunks(CHUNK_SIZE)
            .map(|chunk| Ok(body.slice_ref(chunk)))
            .collect();
        if let Some(message) = self.stream_failure.lock().unwrap().clone() {
            chunks.truncate(1);
            chunks.push(Err(io::Error::other(message)));
        }
        Ok(stream::iter(chunks).boxed())
    }

    async fn presign_get(&self, key: &str, expires_in: Duration) -> StoreResult<String> {
        self.check_failure()?;
        Ok(format!(
            "http://memory.local/{}/{}?X-Amz-Expires={}",
            self.bucket,
            key,
            expires_in.as_secs()
        ))
    }
}
