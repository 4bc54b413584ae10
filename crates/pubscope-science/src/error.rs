use pubscope_core::PubscopeError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ScienceError {
    #[error("invalid DOI: {0}")]
    InvalidDoi(String),

    #[error("invalid arXiv ID: {0}")]
    InvalidArxivId(String),

    #[error("HTTP client error: {0}")]
    Http(#[from] reqwest::Error),

    /// Terminal: the registry has no record for this identifier.
    #[error("not found: {0}")]
    NotFound(String),

    /// Network, rate-limit, or server trouble that survived every retry.
    #[error("transient failure from {url} after {attempts} attempt(s): {message}")]
    Transient {
        url: String,
        attempts: u32,
        message: String,
    },

    /// The registry answered but the record lacks required fields.
    #[error("malformed record {identifier}: {reason}")]
    MalformedRecord { identifier: String, reason: String },

    #[error("API error from {0}: {1}")]
    ApiError(String, String),

    #[error("parse error: {0}")]
    Parse(String),

    #[error("configuration failure: {0}")]
    Configuration(String),

    #[error("store error: {0}")]
    Store(#[from] PubscopeError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// How a per-identifier failure is counted in the run summary.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    NotFound,
    Transient,
    Malformed,
    Other,
}

impl ScienceError {
    pub fn malformed(identifier: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::MalformedRecord {
            identifier: identifier.into(),
            reason: reason.into(),
        }
    }

    pub fn kind(&self) -> FailureKind {
        match self {
            Self::NotFound(_) => FailureKind::NotFound,
            Self::Transient { .. } => FailureKind::Transient,
            Self::MalformedRecord { .. } | Self::Parse(_) => FailureKind::Malformed,
            _ => FailureKind::Other,
        }
    }
}

pub type Result<T> = std::result::Result<T, ScienceError>;
