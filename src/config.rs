use std::path::PathBuf;
use std::time::Duration;

use anyhow::Context;
use chrono::{DateTime, Utc};

#[derive(Debug, Clone)]
pub struct Settings {
    /// Where the generation service lives.
    pub backend_base_url: String,
    pub port: u16,
    pub download_dir: PathBuf,
    pub launch_state_file: PathBuf,
    pub launch_at: DateTime<Utc>,
    pub http_timeout: Duration,
    /// Sessions untouched for this long are dropped.
    pub session_idle: Duration,
    /// Upper bound on request bodies, file uploads included.
    pub max_request_bytes: usize,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            backend_base_url: "https://shortreelx.onrender.com".into(),
            port: 8080,
            download_dir: PathBuf::from("./downloads"),
            launch_state_file: PathBuf::from("./launch_state.json"),
            launch_at: DateTime::parse_from_rfc3339("2025-04-07T19:00:00Z")
                .map(|d| d.with_timezone(&Utc))
                .unwrap_or_else(|_| Utc::now()),
            http_timeout: Duration::from_secs(120),
            session_idle: Duration::from_secs(30 * 60),
            max_request_bytes: 512 * 1024 * 1024,
        }
    }
}

impl Settings {
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds settings from any key lookup; unset keys keep their defaults.
    pub fn from_lookup(get: impl Fn(&str) -> Option<String>) -> anyhow::Result<Self> {
        let mut settings = Settings::default();

        if let Some(v) = get("BACKEND_BASE_URL") {
            settings.backend_base_url = v.trim_end_matches('/').to_string();
        }
        if let Some(v) = get("PORT") {
            settings.port = v.parse().with_context(|| format!("PORT is not a port number: {v}"))?;
        }
        if let Some(v) = get("DOWNLOAD_DIR") {
            settings.download_dir = PathBuf::from(v);
        }
        if let Some(v) = get("LAUNCH_STATE_FILE") {
            settings.launch_state_file = PathBuf::from(v);
        }
        if let Some(v) = get("LAUNCH_AT") {
            settings.launch_at = DateTime::parse_from_rfc3339(&v)
                .with_context(|| format!("LAUNCH_AT must be RFC 3339: {v}"))?
                .with_timezone(&Utc);
        }
        if let Some(v) = get("HTTP_TIMEOUT_SECS") {
            let secs: u64 = v.parse().with_context(|| format!("HTTP_TIMEOUT_SECS is not a number: {v}"))?;
            settings.http_timeout = Duration::from_secs(secs);
        }
        if let Some(v) = get("SESSION_IDLE_SECS") {
            let secs: u64 = v.parse().with_context(|| format!("SESSION_IDLE_SECS is not a number: {v}"))?;
            settings.session_idle = Duration::from_secs(secs);
        }
        if let Some(v) = get("MAX_REQUEST_BYTES") {
            settings.max_request_bytes = v
                .parse()
                .with_context(|| format!("MAX_REQUEST_BYTES is not a number: {v}"))?;
        }

        Ok(settings)
    }
}
