use std::time::Duration;

use anyhow::Context;
use async_trait::async_trait;
use bytes::Bytes;
use chrono::Utc;
use reqwest::multipart::{Form, Part};
use reqwest::Client;
use serde::Deserialize;
use serde_json::{json, Map, Value};
use tracing::{error, info};

use crate::error::ControllerError;
use crate::features::{Encoding, FeatureSpec, ResultKind, UploadEndpoint};
use crate::models::{Artifact, FileBlob, GenerationRequest, GenerationResult, UploadReceipt};

/// The remote generation service. Opaque: the controller only sees these three calls.
#[async_trait]
pub trait GenerationBackend: Send + Sync {
    async fn upload(&self, endpoint: &UploadEndpoint, file: &FileBlob) -> Result<UploadReceipt, ControllerError>;

    async fn generate(
        &self,
        feature: &FeatureSpec,
        request: &GenerationRequest,
    ) -> Result<GenerationResult, ControllerError>;

    /// Raw bytes of a produced artifact.
    async fn fetch(&self, url: &str) -> Result<Bytes, ControllerError>;
}

pub struct HttpBackend {
    client: Client,
    base_url: String,
}

// Keeps response bodies in logs readable.
fn preview(body: &str) -> String {
    const MAX: usize = 500;
    if body.len() <= MAX {
        return body.to_string();
    }
    let mut cut = MAX;
    while !body.is_char_boundary(cut) {
        cut -= 1;
    }
    format!("{}...[{} chars]", &body[..cut], body.len())
}

impl HttpBackend {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> anyhow::Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .context("Failed to create HTTP client")?;
        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        if path.starts_with("http://") || path.starts_with("https://") {
            path.to_string()
        } else {
            format!("{}/{}", self.base_url, path.trim_start_matches('/'))
        }
    }

    async fn read_json(&self, response: reqwest::Response, fallback: &str) -> Result<Value, ControllerError> {
        let status = response.status();
        info!("📥 Response status: {}", status);
        let body = response.text().await?;

        if !status.is_success() {
            error!("❌ Backend error response: {}", preview(&body));
            return Err(ControllerError::from_response_body(status, &body, fallback));
        }

        info!("📥 Backend response: {}", preview(&body));
        serde_json::from_str(&body).map_err(|e| ControllerError::InvalidResponse(format!("parse error: {e}")))
    }

    fn file_part(file: &FileBlob) -> Result<Part, ControllerError> {
        let part = Part::bytes(file.bytes.to_vec()).file_name(file.name.clone());
        if file.mime_type.is_empty() {
            return Ok(part);
        }
        part.mime_str(&file.mime_type)
            .map_err(|e| ControllerError::validation(format!("Unsupported content type: {e}")))
    }
}

#[async_trait]
impl GenerationBackend for HttpBackend {
    async fn upload(&self, endpoint: &UploadEndpoint, file: &FileBlob) -> Result<UploadReceipt, ControllerError> {
        let url = self.url(endpoint.path);
        info!("🔗 Uploading '{}' ({} bytes) to {}", file.name, file.size(), url);

        let form = Form::new().part(endpoint.file_field, Self::file_part(file)?);
        let response = self.client.post(&url).multipart(form).send().await?;
        let body = self.read_json(response, endpoint.failure_message).await?;

        let receipt = parse_upload(endpoint, &body)?;
        info!("✅ Upload stored as {}", receipt.id);
        Ok(receipt)
    }

    async fn generate(
        &self,
        feature: &FeatureSpec,
        request: &GenerationRequest,
    ) -> Result<GenerationResult, ControllerError> {
        let url = self.url(feature.generate.path);
        info!("🎯 Requesting {} from {}", feature.slug, url);

        let builder = self.client.post(&url);
        let builder = match feature.generate.encoding {
            Encoding::Json => {
                let body = json_body(feature, request);
                info!("📤 Request body: {}", body);
                builder.json(&body)
            }
            Encoding::Multipart => builder.multipart(multipart_body(feature, request)?),
        };

        let response = builder.send().await?;
        let body = self.read_json(response, feature.generate.failure_message).await?;
        let result = parse_generation(feature, &body)?;
        info!("✅ {} produced {} artifact(s)", feature.slug, result.artifacts.len());
        Ok(result)
    }

    async fn fetch(&self, url: &str) -> Result<Bytes, ControllerError> {
        let url = self.url(url);
        info!("⬇️ Fetching artifact {}", url);
        let response = self.client.get(&url).send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            error!("❌ Artifact fetch failed with status {}", status);
            return Err(ControllerError::from_response_body(status, &body, "Failed to download file"));
        }
        Ok(response.bytes().await?)
    }
}

fn upload_fields(feature: &FeatureSpec, request: &GenerationRequest) -> Vec<(&'static str, String)> {
    let (Some(endpoint), Some(receipt)) = (&feature.upload, &request.upload) else {
        return Vec::new();
    };
    let mut fields = vec![(endpoint.id_field, receipt.id.clone())];
    if let Some(url) = &receipt.url {
        fields.push((endpoint.url_field, url.clone()));
    }
    fields
}

pub fn json_body(feature: &FeatureSpec, request: &GenerationRequest) -> Value {
    let mut body = Map::new();
    for (key, value) in upload_fields(feature, request) {
        body.insert(key.to_string(), Value::String(value));
    }
    for (key, value) in &request.params.counts {
        body.insert(key.clone(), json!(value));
    }
    if feature.params.platforms.is_some() {
        let platforms: Vec<&str> = request.params.platforms.iter().map(|p| p.as_str()).collect();
        body.insert("platforms".to_string(), json!(platforms));
    }
    Value::Object(body)
}

fn multipart_body(feature: &FeatureSpec, request: &GenerationRequest) -> Result<Form, ControllerError> {
    let mut form = Form::new();
    if let Some(field) = feature.generate.file_field {
        form = form.part(field, HttpBackend::file_part(&request.file)?);
    }
    for (key, value) in upload_fields(feature, request) {
        form = form.text(key, value);
    }
    for (key, value) in &request.params.counts {
        form = form.text(key.clone(), value.to_string());
    }
    if feature.params.platforms.is_some() {
        form = form.text("platforms", request.params.platforms_csv());
    }
    Ok(form)
}

// --- Response Parsing Helpers ---

fn scalar_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

pub fn parse_upload(endpoint: &UploadEndpoint, body: &Value) -> Result<UploadReceipt, ControllerError> {
    let id = body
        .get(endpoint.id_field)
        .and_then(scalar_string)
        .ok_or_else(|| ControllerError::InvalidResponse(format!("upload response has no '{}'", endpoint.id_field)))?;
    let url = body.get(endpoint.url_field).and_then(scalar_string);
    Ok(UploadReceipt { id, url })
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ArtifactWire {
    url: Option<String>,
    title: Option<String>,
    description: Option<String>,
    #[serde(alias = "viralScore")]
    score: Option<f64>,
    #[serde(default)]
    hashtags: Vec<String>,
    timestamp: Option<Value>,
}

impl From<ArtifactWire> for Artifact {
    fn from(w: ArtifactWire) -> Self {
        Artifact {
            url: w.url,
            title: w.title,
            description: w.description,
            score: w.score,
            hashtags: clean_hashtags(w.hashtags.iter().map(String::as_str)),
            timestamp: w.timestamp.as_ref().and_then(scalar_string),
        }
    }
}

fn clean_hashtags<'a>(tags: impl Iterator<Item = &'a str>) -> Vec<String> {
    tags.map(|t| t.trim().trim_start_matches('#').to_string())
        .filter(|t| !t.is_empty())
        .collect()
}

fn media_artifact(value: &Value) -> Result<Artifact, ControllerError> {
    match value {
        Value::String(url) => Ok(Artifact::from_url(url.clone())),
        Value::Object(_) => serde_json::from_value::<ArtifactWire>(value.clone())
            .map(Artifact::from)
            .map_err(|e| ControllerError::InvalidResponse(format!("bad artifact: {e}"))),
        other => Err(ControllerError::InvalidResponse(format!("unexpected artifact: {other}"))),
    }
}

fn hashtag_list(value: &Value) -> Result<Vec<String>, ControllerError> {
    match value {
        Value::Array(items) => Ok(clean_hashtags(items.iter().filter_map(Value::as_str))),
        Value::String(s) => Ok(clean_hashtags(s.split([' ', ',', '\n']))),
        other => Err(ControllerError::InvalidResponse(format!("unexpected hashtags: {other}"))),
    }
}

pub fn parse_generation(feature: &FeatureSpec, body: &Value) -> Result<GenerationResult, ControllerError> {
    let raw = body
        .get(feature.result_field)
        .ok_or_else(|| ControllerError::InvalidResponse(format!("response has no '{}'", feature.result_field)))?;

    let artifacts = match feature.result_kind {
        ResultKind::Media => match raw {
            Value::Array(items) => items.iter().map(media_artifact).collect::<Result<Vec<_>, _>>()?,
            single => vec![media_artifact(single)?],
        },
        ResultKind::Hashtags => match raw {
            Value::Object(per_platform) => per_platform
                .iter()
                .map(|(platform, tags)| {
                    Ok(Artifact {
                        title: Some(platform.clone()),
                        hashtags: hashtag_list(tags)?,
                        ..Default::default()
                    })
                })
                .collect::<Result<Vec<_>, ControllerError>>()?,
            flat => vec![Artifact {
                hashtags: hashtag_list(flat)?,
                ..Default::default()
            }],
        },
    };

    let analysis = feature
        .analysis_fields
        .iter()
        .find_map(|f| body.get(*f).and_then(Value::as_str))
        .filter(|s| !s.trim().is_empty())
        .map(str::to_string);

    Ok(GenerationResult {
        artifacts,
        analysis,
        received_at: Utc::now(),
    })
}
