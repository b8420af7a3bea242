use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum MirakoError {
    #[error("{0}")]
    Authentication(String),
    #[error("Invalid input: {0}")]
    Validation(String),
    #[error("{0}")]
    Api(ApiError),
    #[error("Request failed: {0}")]
    Transport(String),
    #[error("{job} failed with status {state}{}", .detail.as_deref().map(|d| format!(": {}", d)).unwrap_or_default())]
    JobFailed {
        job: &'static str,
        state: String,
        detail: Option<String>,
    },
    #[error("Failed to decode {0}")]
    Decode(String),
    #[error("Download failed: {0}")]
    Download(String),
    #[error("{context}: {source}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },
    #[error("Operation cancelled: {0}")]
    Cancelled(String),
    #[error("Gave up waiting after {}s", .0.as_secs())]
    WaitTimeout(Duration),
    #[error("Configuration error: {0}")]
    Config(String),
    #[error("Unexpected response from server: {0}")]
    UnexpectedResponse(String),
}

impl MirakoError {
    pub fn io(context: impl Into<String>, source: std::io::Error) -> Self {
        MirakoError::Io {
            context: context.into(),
            source,
        }
    }
}

impl From<reqwest::Error> for MirakoError {
    fn from(e: reqwest::Error) -> Self {
        MirakoError::Transport(e.to_string())
    }
}

/// A non-2xx response from the service.
#[derive(Debug, Clone)]
pub struct ApiError {
    pub status: u16,
    pub detail: Option<String>,
    pub context: String,
}

impl ApiError {
    pub fn is_insufficient_credits(&self) -> bool {
        self.status == 402
    }

    pub fn is_authentication_error(&self) -> bool {
        self.status == 401 || self.status == 403
    }

    pub fn is_rate_limited(&self) -> bool {
        self.status == 429
    }

    pub fn is_not_found(&self) -> bool {
        self.status == 404
    }

    pub fn friendly_message(&self) -> String {
        if self.is_insufficient_credits() {
            "Insufficient credits. Please upgrade your plan or purchase more credits at https://mirako.ai/billing".to_string()
        } else if self.is_authentication_error() {
            "Authentication failed. Please run 'mirako auth login' to authenticate".to_string()
        } else if self.is_rate_limited() {
            "Rate limit exceeded. Please wait a moment and try again".to_string()
        } else if self.is_not_found() {
            "Resource not found. Please check the ID and try again".to_string()
        } else if let Some(detail) = &self.detail {
            detail.clone()
        } else {
            format!("API request failed with status {}", self.status)
        }
    }
}

impl std::fmt::Display for ApiError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.detail {
            Some(detail) => write!(f, "{} failed ({}): {}", self.context, self.status, detail),
            None => write!(f, "{} failed ({})", self.context, self.status),
        }
    }
}
