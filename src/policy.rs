use serde::Serialize;

use crate::error::ControllerError;
use crate::models::FileBlob;

const MIB: u64 = 1024 * 1024;

/// What the allow-list is matched against.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(tag = "by", content = "allowed", rename_all = "camelCase")]
pub enum AllowList {
    MimeTypes(Vec<&'static str>),
    Extensions(Vec<&'static str>),
}

/// File accept rules for one feature. Files are rejected, never coerced.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AcceptPolicy {
    pub allow: AllowList,
    /// Shown when the type check fails.
    pub type_message: &'static str,
    pub min_size: Option<u64>,
    pub max_size: Option<u64>,
}

impl AcceptPolicy {
    pub fn video() -> Self {
        Self {
            allow: AllowList::MimeTypes(vec!["video/mp4", "video/mpeg", "video/quicktime"]),
            type_message: "Invalid file type. Please upload a valid video file.",
            min_size: Some(1),
            max_size: Some(500 * MIB),
        }
    }

    pub fn image() -> Self {
        Self {
            allow: AllowList::MimeTypes(vec!["image/jpeg", "image/png"]),
            type_message: "Please upload only JPG or PNG images.",
            min_size: Some(1),
            max_size: Some(10 * MIB),
        }
    }

    pub fn subtitle() -> Self {
        Self {
            allow: AllowList::Extensions(vec!["srt", "vtt"]),
            type_message: "Please upload only SRT or VTT subtitle files.",
            min_size: Some(1),
            max_size: Some(2 * MIB),
        }
    }

    /// The HTML `accept` attribute equivalent, listed in the feature catalog.
    pub fn accept_attr(&self) -> String {
        match &self.allow {
            AllowList::MimeTypes(types) => types.join(","),
            AllowList::Extensions(exts) => exts.iter().map(|e| format!(".{e}")).collect::<Vec<_>>().join(","),
        }
    }

    pub fn check(&self, file: &FileBlob) -> Result<(), ControllerError> {
        if !self.type_allowed(file) {
            return Err(ControllerError::validation(self.type_message));
        }

        let size = file.size();
        if let Some(min) = self.min_size {
            if size < min {
                return Err(ControllerError::validation(if size == 0 {
                    "The selected file is empty.".to_string()
                } else {
                    format!("Please upload a file of at least {}.", human_size(min))
                }));
            }
        }
        if let Some(max) = self.max_size {
            if size > max {
                return Err(ControllerError::validation(format!(
                    "Please upload a file smaller than {}.",
                    human_size(max)
                )));
            }
        }
        Ok(())
    }

    fn type_allowed(&self, file: &FileBlob) -> bool {
        match &self.allow {
            AllowList::MimeTypes(types) => {
                let essence = file
                    .mime_type
                    .split(';')
                    .next()
                    .unwrap_or_default()
                    .trim()
                    .to_ascii_lowercase();
                types.iter().any(|t| *t == essence)
            }
            AllowList::Extensions(exts) => match file.extension() {
                Some(ext) => exts.iter().any(|e| *e == ext),
                None => false,
            },
        }
    }
}

fn human_size(bytes: u64) -> String {
    if bytes >= MIB && bytes % MIB == 0 {
        format!("{} MB", bytes / MIB)
    } else if bytes >= 1024 {
        format!("{} KB", bytes / 1024)
    } else {
        format!("{bytes} bytes")
    }
}
