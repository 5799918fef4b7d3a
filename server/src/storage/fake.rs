use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use futures::StreamExt;

use super::{
    ByteStream, ObjectStorage, SignedUrl, StorageDescriptor, StorageError, StorageSession,
    UploadedFile,
};

const FAKE_DOWNLOAD_URL: &str = "https://files.example.test";

#[derive(Default)]
struct FakeState {
    objects: HashMap<String, Bytes>,
    upload_failures: VecDeque<StorageError>,
    failing_deletes: HashSet<String>,
    upload_attempts: u32,
    deleted: Vec<String>,
    signed: Vec<(String, Duration)>,
}

/// Keeps objects in memory, keyed by file name.
#[derive(Default)]
pub struct FakeStorage {
    state: Mutex<FakeState>,
}

impl FakeStorage {
    pub fn put(&self, file_name: &str, data: &'static [u8]) {
        self.state
            .lock()
            .unwrap()
            .objects
            .insert(file_name.to_string(), Bytes::from_static(data));
    }

    pub fn contains(&self, file_name: &str) -> bool {
        self.state.lock().unwrap().objects.contains_key(file_name)
    }

    pub fn fail_next_uploads(&self, errors: Vec<StorageError>) {
        self.state.lock().unwrap().upload_failures.extend(errors);
    }

    pub fn fail_delete_of(&self, file_name: &str) {
        self.state
            .lock()
            .unwrap()
            .failing_deletes
            .insert(file_name.to_string());
    }

    pub fn upload_attempts(&self) -> u32 {
        self.state.lock().unwrap().upload_attempts
    }

    pub fn deleted(&self) -> Vec<String> {
        self.state.lock().unwrap().deleted.clone()
    }

    pub fn signed_ttls(&self) -> Vec<(String, Duration)> {
        self.state.lock().unwrap().signed.clone()
    }
}

#[async_trait]
impl ObjectStorage for FakeStorage {
    async fn authorize(&self) -> Result<StorageSession, StorageError> {
        Ok(StorageSession::new(
            "https://api.example.test",
            FAKE_DOWNLOAD_URL,
            "session-token",
        ))
    }

    async fn upload(
        &self,
        _session: &StorageSession,
        file_name: &str,
        _content_type: &str,
        data: Bytes,
    ) -> Result<UploadedFile, StorageError> {
        let mut state = self.state.lock().unwrap();
        state.upload_attempts += 1;
        if let Some(err) = state.upload_failures.pop_front() {
            return Err(err);
        }
        let content_length = data.len() as u64;
        state.objects.insert(file_name.to_string(), data);
        Ok(UploadedFile {
            file_id: format!("id-{file_name}"),
            file_name: file_name.to_string(),
            content_length,
        })
    }

    async fn delete(
        &self,
        _session: &StorageSession,
        descriptor: &StorageDescriptor,
    ) -> Result<(), StorageError> {
        let mut state = self.state.lock().unwrap();
        if descriptor.file_id.is_none() {
            return Err(StorageError::MissingFileId(descriptor.file_name.clone()));
        }
        if state.failing_deletes.contains(&descriptor.file_name) {
            return Err(StorageError::Status {
                status: 500,
                message: "internal_error".to_string(),
            });
        }
        state.objects.remove(&descriptor.file_name);
        state.deleted.push(descriptor.file_name.clone());
        Ok(())
    }

    async fn signed_url(
        &self,
        _session: &StorageSession,
        descriptor: &StorageDescriptor,
        valid_for: Duration,
    ) -> Result<SignedUrl, StorageError> {
        self.state
            .lock()
            .unwrap()
            .signed
            .push((descriptor.file_name.clone(), valid_for));
        Ok(SignedUrl {
            url: format!("{FAKE_DOWNLOAD_URL}/file/bucket/{}", descriptor.file_name),
            authorization: "download-token".to_string(),
        })
    }

    async fn open(&self, signed: &SignedUrl) -> Result<ByteStream, StorageError> {
        let file_name = signed
            .url
            .rsplit('/')
            .next()
            .unwrap_or_default()
            .to_string();
        let data = self
            .state
            .lock()
            .unwrap()
            .objects
            .get(&file_name)
            .cloned()
            .ok_or(StorageError::Status {
                status: 404,
                message: "not_found".to_string(),
            })?;
        Ok(futures::stream::once(async move { Ok(data) }).boxed())
    }
}
