use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use tracing::{info, warn};
use uuid::Uuid;

use crate::artifacts::ArtifactStore;
use crate::backend::GenerationBackend;
use crate::clipboard::Clipboard;
use crate::error::ControllerError;
use crate::features::FeatureSpec;
use crate::models::{
    FileBlob, GenerationRequest, GenerationResult, SessionSnapshot, UploadReceipt, ValidationState, WorkflowState,
};
use crate::params::{ParameterInput, Parameters};

/// How a `submit` call ended when it did not fail.
#[derive(Debug, Clone, PartialEq)]
pub enum SubmitOutcome {
    Completed(GenerationResult),
    /// Another submission was already in flight. Nothing was sent.
    Ignored,
    /// A new file was selected (or the session reset) while this one ran; its result was dropped.
    Discarded,
}

#[derive(Debug, Default)]
struct Session {
    file: Option<FileBlob>,
    validation: ValidationState,
    workflow: WorkflowState,
    in_flight: bool,
    params: Parameters,
    upload: Option<UploadReceipt>,
    result: Option<GenerationResult>,
    /// Name of the file the current result was generated from.
    result_source: Option<String>,
    error: Option<String>,
    local_error: Option<String>,
    /// Bumped whenever in-flight work must no longer land in this session.
    epoch: u64,
}

/// Releases the in-flight slot when a submission is dropped before it finishes,
/// e.g. the client disconnected mid-request.
struct InFlight<'a> {
    controller: &'a Controller,
    epoch: u64,
    settled: bool,
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        if self.settled {
            return;
        }
        let mut s = self.controller.state.lock();
        s.in_flight = false;
        if s.epoch == self.epoch {
            warn!(session = %self.controller.id, "🛑 Submission abandoned before it finished");
            s.workflow = WorkflowState::Idle;
            s.upload = None;
            s.result_source = None;
        }
    }
}

/// Drives one file through validation, upload, generation and result handling
/// for a single feature. Shared between request handlers; the lock is never held
/// across a network call.
pub struct Controller {
    id: Uuid,
    feature: FeatureSpec,
    backend: Arc<dyn GenerationBackend>,
    state: Mutex<Session>,
    touched: Mutex<Instant>,
}

impl Controller {
    pub fn new(feature: FeatureSpec, backend: Arc<dyn GenerationBackend>) -> Self {
        let session = Session {
            params: feature.params.defaults(),
            ..Default::default()
        };
        Self {
            id: Uuid::new_v4(),
            feature,
            backend,
            state: Mutex::new(session),
            touched: Mutex::new(Instant::now()),
        }
    }

    /// Marks the session as used by the view.
    pub fn touch(&self) {
        *self.touched.lock() = Instant::now();
    }

    pub fn idle_for(&self) -> Duration {
        self.touched.lock().elapsed()
    }

    pub fn is_busy(&self) -> bool {
        self.state.lock().in_flight
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn feature(&self) -> &FeatureSpec {
        &self.feature
    }

    /// Validates and stores `file`. A rejected file clears the selection but
    /// leaves any earlier result alone; an accepted one starts over.
    pub fn select_file(&self, file: FileBlob) -> Result<(), ControllerError> {
        let mut s = self.state.lock();
        match self.feature.accept.check(&file) {
            Err(e) => {
                let reason = e.user_message();
                warn!(session = %self.id, file = %file.name, mime = %file.mime_type, "🚫 {}", reason);
                s.file = None;
                s.validation = ValidationState::Invalid(reason.clone());
                s.error = Some(reason);
                Err(e)
            }
            Ok(()) => {
                info!(session = %self.id, "📁 Selected '{}' ({} bytes)", file.name, file.size());
                s.epoch += 1;
                s.file = Some(file);
                s.validation = ValidationState::Valid;
                s.workflow = WorkflowState::Idle;
                s.upload = None;
                s.result = None;
                s.result_source = None;
                s.error = None;
                s.local_error = None;
                Ok(())
            }
        }
    }

    /// Clamps each option into its range. Never fails.
    pub fn set_parameters(&self, input: &ParameterInput) -> Parameters {
        let mut s = self.state.lock();
        self.feature.params.apply(&mut s.params, input);
        s.params.clone()
    }

    /// Runs the whole workflow once. Calls made while one is already running
    /// return `Ignored` without touching the network.
    pub async fn submit(&self) -> Result<SubmitOutcome, ControllerError> {
        let (file, params, epoch) = {
            let mut s = self.state.lock();
            if s.in_flight {
                info!(session = %self.id, "⏳ Submission already in flight, ignoring");
                return Ok(SubmitOutcome::Ignored);
            }
            let Some(file) = s.file.clone() else {
                let e = ControllerError::validation(self.feature.missing_file_message);
                s.error = Some(e.user_message());
                return Err(e);
            };
            if let Err(e) = self.feature.params.check_ready(&s.params) {
                s.error = Some(e.user_message());
                return Err(e);
            }

            s.in_flight = true;
            s.upload = None;
            s.result = None;
            s.result_source = Some(file.name.clone());
            s.error = None;
            s.local_error = None;
            s.workflow = if self.feature.upload.is_some() {
                WorkflowState::Uploading
            } else {
                WorkflowState::Generating
            };
            (file, s.params.clone(), s.epoch)
        };

        info!(session = %self.id, "🚀 Starting {} for '{}'", self.feature.slug, file.name);
        let mut guard = InFlight {
            controller: self,
            epoch,
            settled: false,
        };
        let outcome = self.run(file, params, epoch).await;
        guard.settled = true;
        self.finish(epoch, outcome)
    }

    async fn run(&self, file: FileBlob, params: Parameters, epoch: u64) -> Result<GenerationResult, ControllerError> {
        let upload = match &self.feature.upload {
            Some(endpoint) => {
                let receipt = self.backend.upload(endpoint, &file).await?;
                let mut s = self.state.lock();
                if s.epoch == epoch {
                    s.upload = Some(receipt.clone());
                    s.workflow = WorkflowState::Generating;
                }
                Some(receipt)
            }
            None => None,
        };

        let request = GenerationRequest { file, upload, params };
        self.backend.generate(&self.feature, &request).await
    }

    fn finish(
        &self,
        epoch: u64,
        outcome: Result<GenerationResult, ControllerError>,
    ) -> Result<SubmitOutcome, ControllerError> {
        let mut s = self.state.lock();
        s.in_flight = false;

        if s.epoch != epoch {
            info!(session = %self.id, "🗑️ Dropping result of a superseded submission");
            return Ok(SubmitOutcome::Discarded);
        }

        match outcome {
            Ok(result) => {
                info!(session = %self.id, "✅ {} finished with {} artifact(s)", self.feature.slug, result.artifacts.len());
                s.workflow = WorkflowState::Succeeded;
                s.result = Some(result.clone());
                Ok(SubmitOutcome::Completed(result))
            }
            Err(e) => {
                let reason = e.user_message();
                warn!(session = %self.id, error = ?e, "❌ {} failed: {}", self.feature.slug, reason);
                s.workflow = WorkflowState::Failed(reason.clone());
                s.result = None;
                s.result_source = None;
                s.error = Some(reason);
                Err(e)
            }
        }
    }

    /// Fetches artifact `index` and saves it locally. Failures are recorded as a
    /// local error and never change the workflow state.
    pub async fn download_artifact(&self, index: usize, store: &ArtifactStore) -> Result<PathBuf, ControllerError> {
        let target = {
            let s = self.state.lock();
            s.result
                .as_ref()
                .ok_or_else(|| ControllerError::local("Nothing to download yet."))
                .and_then(|r| {
                    r.artifacts
                        .get(index)
                        .cloned()
                        .ok_or_else(|| ControllerError::local("No such result."))
                })
                .and_then(|a| match a.url.clone() {
                    Some(url) => {
                        let source = s.result_source.as_deref().unwrap_or(self.feature.slug);
                        Ok((url, self.feature.download_name(&a, index, source)))
                    }
                    None => Err(ControllerError::local("This result has no downloadable file.")),
                })
        };

        let saved = match target {
            Ok((url, name)) => match self.backend.fetch(&url).await {
                Ok(bytes) => store.save(&name, &bytes).await,
                Err(e) => {
                    warn!(session = %self.id, url = %url, error = ?e, "❌ Artifact download failed");
                    Err(ControllerError::local("Failed to download file. Please try again."))
                }
            },
            Err(e) => Err(e),
        };

        let mut s = self.state.lock();
        match saved {
            Ok(path) => {
                s.local_error = None;
                Ok(path)
            }
            Err(e) => {
                s.local_error = Some(e.user_message());
                Err(e)
            }
        }
    }

    /// Hashtags of artifact `index`, formatted for pasting.
    pub fn hashtag_text(&self, index: usize) -> Option<String> {
        let s = self.state.lock();
        let artifact = s.result.as_ref()?.artifacts.get(index)?;
        if artifact.hashtags.is_empty() {
            return None;
        }
        Some(
            artifact
                .hashtags
                .iter()
                .map(|t| format!("#{t}"))
                .collect::<Vec<_>>()
                .join(" "),
        )
    }

    pub fn copy_text(&self, text: &str, clipboard: &dyn Clipboard) -> Result<(), ControllerError> {
        let outcome = clipboard.write_text(text);
        let mut s = self.state.lock();
        match &outcome {
            Ok(()) => s.local_error = None,
            Err(e) => s.local_error = Some(e.user_message()),
        }
        outcome
    }

    /// Leaving the page. Anything still in flight will be discarded when it lands.
    pub fn reset(&self) {
        let mut s = self.state.lock();
        let in_flight = s.in_flight;
        let epoch = s.epoch + 1;
        *s = Session {
            params: self.feature.params.defaults(),
            in_flight,
            epoch,
            ..Default::default()
        };
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        let s = self.state.lock();
        SessionSnapshot {
            id: self.id,
            feature: self.feature.slug.to_string(),
            file: s.file.as_ref().map(FileBlob::summary),
            validation: s.validation.clone(),
            workflow: s.workflow.clone(),
            in_flight: s.in_flight,
            parameters: s.params.clone(),
            upload: s.upload.clone(),
            result: s.result.clone(),
            error: s.error.clone(),
            local_error: s.local_error.clone(),
        }
    }
}
