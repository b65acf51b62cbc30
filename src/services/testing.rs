//! In-memory asset client that records every call.

use async_trait::async_trait;
use bytes::Bytes;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::Semaphore;

use crate::error::{AppError, Result};
use crate::storage::{read_limited, validate_key, AssetClient, ByteStream, FileInfo};

/// Pause point for one backend call: the call signals `reached` and then
/// waits until the test opens the gate.
pub struct Gate {
    reached: Semaphore,
    release: Semaphore,
}

impl Gate {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            reached: Semaphore::new(0),
            release: Semaphore::new(0),
        })
    }

    async fn pass(&self) {
        self.reached.add_permits(1);
        self.release.acquire().await.unwrap().forget();
    }

    /// Wait until a call is parked at the gate
    pub async fn reached(&self) {
        self.reached.acquire().await.unwrap().forget();
    }

    pub fn open(&self) {
        self.release.add_permits(1);
    }
}

#[derive(Default)]
pub struct RecordingClient {
    max_upload_size: u64,
    objects: Mutex<HashMap<String, Bytes>>,
    uploads: Mutex<Vec<String>>,
    deletes: Mutex<Vec<String>>,
    fail_uploads: AtomicBool,
    fail_deletes: AtomicBool,
    upload_gate: Mutex<Option<Arc<Gate>>>,
}

impl RecordingClient {
    pub fn new(max_upload_size: u64) -> Self {
        Self {
            max_upload_size,
            ..Default::default()
        }
    }

    pub fn fail_uploads(&self, fail: bool) {
        self.fail_uploads.store(fail, Ordering::SeqCst);
    }

    pub fn fail_deletes(&self, fail: bool) {
        self.fail_deletes.store(fail, Ordering::SeqCst);
    }

    /// Park the next upload after its bytes are stored, before it returns
    pub fn gate_next_upload(&self) -> Arc<Gate> {
        let gate = Gate::new();
        *self.upload_gate.lock().unwrap() = Some(gate.clone());
        gate
    }

    pub fn contains(&self, key: &str) -> bool {
        self.objects.lock().unwrap().contains_key(key)
    }

    pub fn upload_count(&self, key: &str) -> usize {
        self.uploads.lock().unwrap().iter().filter(|k| *k == key).count()
    }

    pub fn total_uploads(&self) -> usize {
        self.uploads.lock().unwrap().len()
    }

    pub fn delete_count(&self, key: &str) -> usize {
        self.deletes.lock().unwrap().iter().filter(|k| *k == key).count()
    }

    pub fn total_deletes(&self) -> usize {
        self.deletes.lock().unwrap().len()
    }
}

#[async_trait]
impl AssetClient for RecordingClient {
    async fn upload(&self, name: &str, content_type: &str, data: ByteStream) -> Result<FileInfo> {
        validate_key(name)?;
        let data = read_limited(data, self.max_upload_size).await?;
        self.uploads.lock().unwrap().push(name.to_string());
        if self.fail_uploads.load(Ordering::SeqCst) {
            return Err(AppError::Backend {
                status: 500,
                body: "upload refused".to_string(),
            });
        }

        let size = data.len() as u64;
        self.objects.lock().unwrap().insert(name.to_string(), data);

        let gate = self.upload_gate.lock().unwrap().take();
        if let Some(gate) = gate {
            gate.pass().await;
        }
        Ok(FileInfo {
            size,
            content_type: content_type.to_string(),
        })
    }

    async fn delete(&self, name: &str) -> Result<()> {
        validate_key(name)?;
        self.deletes.lock().unwrap().push(name.to_string());
        if self.fail_deletes.load(Ordering::SeqCst) {
            return Err(AppError::Backend {
                status: 503,
                body: "delete refused".to_string(),
            });
        }

        self.objects.lock().unwrap().remove(name);
        Ok(())
    }

    fn storage_type(&self) -> &'static str {
        "memory"
    }
}
