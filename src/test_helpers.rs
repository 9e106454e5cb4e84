//! In-memory backend for controller and route tests.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::Mutex;
use serde_json::Value;
use tokio::sync::Notify;

use crate::backend::{parse_generation, GenerationBackend};
use crate::error::ControllerError;
use crate::features::{FeatureSpec, UploadEndpoint};
use crate::models::{FileBlob, GenerationRequest, GenerationResult, UploadReceipt};
use crate::params::Parameters;

pub struct MockBackend {
    pub uploads: AtomicUsize,
    pub generates: AtomicUsize,
    pub fetches: AtomicUsize,
    pub upload_response: Mutex<Result<UploadReceipt, ControllerError>>,
    /// Body handed to the real response parser.
    pub generate_response: Mutex<Result<Value, ControllerError>>,
    pub fetch_response: Mutex<Result<Bytes, ControllerError>>,
    pub last_params: Mutex<Option<Parameters>>,
    pub last_upload: Mutex<Option<UploadReceipt>>,
    /// When set, uploads wait for a notification before answering.
    pub upload_gate: Option<Arc<Notify>>,
}

impl Default for MockBackend {
    fn default() -> Self {
        Self {
            uploads: AtomicUsize::new(0),
            generates: AtomicUsize::new(0),
            fetches: AtomicUsize::new(0),
            upload_response: Mutex::new(Ok(UploadReceipt {
                id: "abc".into(),
                url: Some("http://x/abc.mp4".into()),
            })),
            generate_response: Mutex::new(Ok(serde_json::json!({
                "shorts": ["http://x/1.mp4", "http://x/2.mp4", "http://x/3.mp4"]
            }))),
            fetch_response: Mutex::new(Ok(Bytes::from_static(b"artifact-bytes"))),
            last_params: Mutex::new(None),
            last_upload: Mutex::new(None),
            upload_gate: None,
        }
    }
}

impl MockBackend {
    pub fn with_gate(gate: Arc<Notify>) -> Self {
        Self {
            upload_gate: Some(gate),
            ..Default::default()
        }
    }

    pub fn respond_generate(&self, body: Result<Value, ControllerError>) {
        *self.generate_response.lock() = body;
    }

    pub fn respond_upload(&self, receipt: Result<UploadReceipt, ControllerError>) {
        *self.upload_response.lock() = receipt;
    }

    pub fn respond_fetch(&self, bytes: Result<Bytes, ControllerError>) {
        *self.fetch_response.lock() = bytes;
    }

    pub fn calls(&self) -> (usize, usize) {
        (self.uploads.load(Ordering::SeqCst), self.generates.load(Ordering::SeqCst))
    }
}

#[async_trait]
impl GenerationBackend for MockBackend {
    async fn upload(&self, _endpoint: &UploadEndpoint, _file: &FileBlob) -> Result<UploadReceipt, ControllerError> {
        self.uploads.fetch_add(1, Ordering::SeqCst);
        match &self.upload_gate {
            Some(gate) => gate.notified().await,
            None => tokio::task::yield_now().await,
        }
        self.upload_response.lock().clone()
    }

    async fn generate(
        &self,
        feature: &FeatureSpec,
        request: &GenerationRequest,
    ) -> Result<GenerationResult, ControllerError> {
        self.generates.fetch_add(1, Ordering::SeqCst);
        *self.last_params.lock() = Some(request.params.clone());
        *self.last_upload.lock() = request.upload.clone();
        tokio::task::yield_now().await;
        let body = self.generate_response.lock().clone()?;
        parse_generation(feature, &body)
    }

    async fn fetch(&self, _url: &str) -> Result<Bytes, ControllerError> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        self.fetch_response.lock().clone()
    }
}

pub fn mp4(size: usize) -> FileBlob {
    FileBlob::new("clip.mp4", "video/mp4", Bytes::from(vec![7u8; size]))
}
