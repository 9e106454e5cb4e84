use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::params::Parameters;

/// A file picked or dropped by the user, held in memory for the session.
#[derive(Debug, Clone)]
pub struct FileBlob {
    pub name: String,
    pub mime_type: String,
    pub bytes: Bytes,
}

impl FileBlob {
    pub fn new(name: impl Into<String>, mime_type: impl Into<String>, bytes: impl Into<Bytes>) -> Self {
        Self {
            name: name.into(),
            mime_type: mime_type.into(),
            bytes: bytes.into(),
        }
    }

    pub fn size(&self) -> u64 {
        self.bytes.len() as u64
    }

    /// Lower-cased extension of the file name, without the dot.
    pub fn extension(&self) -> Option<String> {
        let (stem, ext) = self.name.rsplit_once('.')?;
        if stem.is_empty() || ext.is_empty() {
            return None;
        }
        Some(ext.to_ascii_lowercase())
    }

    pub fn summary(&self) -> FileSummary {
        FileSummary {
            name: self.name.clone(),
            mime_type: self.mime_type.clone(),
            size: self.size(),
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct FileSummary {
    pub name: String,
    pub mime_type: String,
    pub size: u64,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq, Default)]
#[serde(tag = "state", content = "reason", rename_all = "camelCase")]
pub enum ValidationState {
    #[default]
    Unset,
    Valid,
    Invalid(String),
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq, Default)]
#[serde(tag = "state", content = "reason", rename_all = "camelCase")]
pub enum WorkflowState {
    #[default]
    Idle,
    Uploading,
    Generating,
    Succeeded,
    Failed(String),
}

impl WorkflowState {
    pub fn is_submitting(&self) -> bool {
        matches!(self, Self::Uploading | Self::Generating)
    }
}

/// What the upload endpoint hands back: the server-side id and, usually, a URL.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct UploadReceipt {
    pub id: String,
    pub url: Option<String>,
}

/// One generation call. Built once client validation has passed.
#[derive(Debug, Clone)]
pub struct GenerationRequest {
    pub file: FileBlob,
    pub upload: Option<UploadReceipt>,
    pub params: Parameters,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Default)]
#[serde(rename_all = "camelCase")]
pub struct Artifact {
    /// Hashtag lists have no backing resource.
    pub url: Option<String>,
    pub title: Option<String>,
    pub description: Option<String>,
    pub score: Option<f64>,
    #[serde(default)]
    pub hashtags: Vec<String>,
    pub timestamp: Option<String>,
}

impl Artifact {
    pub fn from_url(url: impl Into<String>) -> Self {
        Self {
            url: Some(url.into()),
            ..Default::default()
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct GenerationResult {
    pub artifacts: Vec<Artifact>,
    pub analysis: Option<String>,
    pub received_at: DateTime<Utc>,
}

/// What the view layer sees of a session.
#[derive(Debug, Serialize, Clone)]
#[serde(rename_all = "camelCase")]
pub struct SessionSnapshot {
    pub id: Uuid,
    pub feature: String,
    pub file: Option<FileSummary>,
    pub validation: ValidationState,
    pub workflow: WorkflowState,
    pub in_flight: bool,
    pub parameters: Parameters,
    pub upload: Option<UploadReceipt>,
    pub result: Option<GenerationResult>,
    /// The inline message: a rejected file, a failed precondition or the failure reason.
    pub error: Option<String>,
    /// Last download or clipboard failure.
    pub local_error: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct OpenSessionRequest {
    pub feature: String,
}

/// Either literal text, or the hashtags of one artifact.
#[derive(Debug, Serialize, Deserialize, Clone, Default)]
pub struct CopyRequest {
    pub text: Option<String>,
    pub artifact: Option<usize>,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(rename_all = "camelCase")]
pub struct DownloadResponse {
    pub path: String,
    pub bytes: u64,
}
