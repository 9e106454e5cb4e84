use parking_lot::RwLock;
use std::sync::Arc;

use crate::error::ControllerError;

pub trait Clipboard: Send + Sync {
    fn write_text(&self, text: &str) -> Result<(), ControllerError>;
}

/// Process-wide clipboard the view reads back from.
#[derive(Debug, Default, Clone)]
pub struct SharedClipboard {
    content: Arc<RwLock<Option<String>>>,
}

impl SharedClipboard {
    pub fn read_text(&self) -> Option<String> {
        self.content.read().clone()
    }
}

impl Clipboard for SharedClipboard {
    fn write_text(&self, text: &str) -> Result<(), ControllerError> {
        if text.trim().is_empty() {
            return Err(ControllerError::local("Nothing to copy."));
        }
        *self.content.write() = Some(text.to_string());
        Ok(())
    }
}
