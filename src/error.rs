use reqwest::StatusCode;
use thiserror::Error;

/// Fallback shown when a request fails without a usable server message.
pub const GENERIC_FAILURE: &str = "Something went wrong. Please try again.";

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ControllerError {
    /// Rejected locally before anything reaches the network.
    #[error("{0}")]
    Validation(String),
    /// The transport could not complete the request.
    #[error("Something went wrong. Please try again.")]
    Network(String),
    /// The backend answered with a non-success status.
    #[error("{message}")]
    Server { status: u16, message: String },
    /// The backend answered 2xx but the body did not have the expected shape.
    #[error("Something went wrong. Please try again.")]
    InvalidResponse(String),
    /// Download / clipboard failures. Never touch the workflow state.
    #[error("{0}")]
    Local(String),
}

impl ControllerError {
    pub fn validation(reason: impl Into<String>) -> Self {
        Self::Validation(reason.into())
    }

    pub fn local(reason: impl Into<String>) -> Self {
        Self::Local(reason.into())
    }

    /// Builds a server error from a failed response body, preferring the
    /// body's `error` field and falling back to `fallback` otherwise.
    pub fn from_response_body(status: StatusCode, body: &str, fallback: &str) -> Self {
        let message = serde_json::from_str::<serde_json::Value>(body)
            .ok()
            .and_then(|v| match v.get("error") {
                Some(serde_json::Value::String(s)) if !s.trim().is_empty() => Some(s.clone()),
                _ => None,
            })
            .unwrap_or_else(|| fallback.to_string());
        Self::Server {
            status: status.as_u16(),
            message,
        }
    }

    /// The single inline message the view shows for this error.
    pub fn user_message(&self) -> String {
        self.to_string()
    }

    pub fn is_validation(&self) -> bool {
        matches!(self, Self::Validation(_))
    }
}

impl From<reqwest::Error> for ControllerError {
    fn from(e: reqwest::Error) -> Self {
        Self::Network(e.to_string())
    }
}
