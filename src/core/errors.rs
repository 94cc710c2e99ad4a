use crate::core::types::{ErrorDetail, RateLimitStatus};
use std::fmt;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum TwitterError {
    #[error("Duplicate parameter: {0}")]
    DuplicateParameter(String),

    #[error("Missing required parameter: {0}")]
    MissingParameter(String),

    #[error("Invalid parameters: {0}")]
    InvalidParameter(String),

    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Request timed out after {0:?}")]
    Timeout(std::time::Duration),

    #[error("Request was cancelled")]
    Cancelled,

    #[error("{0}")]
    Api(Box<ApiError>),

    #[error("Failed to parse response: {0}")]
    Parse(String),

    #[error("Authentication error: {0}")]
    Auth(String),

    #[error("Configuration error: {0}")]
    Config(#[from] crate::core::config::ConfigError),
}

impl TwitterError {
    /// Errors raised before any I/O because the caller supplied bad input
    pub fn is_caller_error(&self) -> bool {
        matches!(
            self,
            Self::DuplicateParameter(_) | Self::MissingParameter(_) | Self::InvalidParameter(_)
        )
    }

    pub fn is_rate_limited(&self) -> bool {
        match self {
            Self::Api(api) => api.is_rate_limited(),
            _ => false,
        }
    }

    /// Whether a caller-side retry policy could reasonably try again.
    /// Nothing in this crate retries on its own.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Http(e) => e.is_connect() || e.is_timeout(),
            Self::Timeout(_) => true,
            Self::Api(api) => api.status >= 500 || api.is_rate_limited(),
            _ => false,
        }
    }

    pub fn api_error(&self) -> Option<&ApiError> {
        match self {
            Self::Api(api) => Some(api),
            _ => None,
        }
    }
}

impl From<ApiError> for TwitterError {
    fn from(err: ApiError) -> Self {
        Self::Api(Box::new(err))
    }
}

impl From<serde_json::Error> for TwitterError {
    fn from(err: serde_json::Error) -> Self {
        Self::Parse(err.to_string())
    }
}

pub type TwitterResult<T> = Result<T, TwitterError>;

/// A completed exchange that the server answered with a non-success status
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiError {
    pub status: u16,
    pub errors: Vec<ErrorDetail>,
    pub body: String,
    pub rate_limit: Option<RateLimitStatus>,
}

impl ApiError {
    pub fn is_rate_limited(&self) -> bool {
        self.status == 429 || self.errors.iter().any(|e| e.code == Some(88))
    }

    /// First reported error code, if the server sent one
    pub fn code(&self) -> Option<i32> {
        self.errors.iter().find_map(|e| e.code)
    }
}

impl fmt::Display for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "API error {}", self.status)?;
        for (i, detail) in self.errors.iter().enumerate() {
            f.write_str(if i == 0 { ": " } else { "; " })?;
            match detail.code {
                Some(code) => write!(f, "{} ({})", detail.message, code)?,
                None => f.write_str(&detail.message)?,
            }
        }
        Ok(())
    }
}

impl std::error::Error for ApiError {}
