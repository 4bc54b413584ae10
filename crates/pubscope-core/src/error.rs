use thiserror::Error;

/// All errors that can occur in pubscope-core.
#[derive(Debug, Error)]
pub enum PubscopeError {
    #[error("Record not found: {0}")]
    RecordNotFound(String),

    #[error("Record already stored: {0}")]
    DuplicateRecord(String),

    #[error("Config error: {0}")]
    ConfigError(String),

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Migration error at version {version}: {message}")]
    Migration { version: u32, message: String },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("TOML parse error: {0}")]
    TomlParse(#[from] toml::de::Error),

    #[error("TOML serialize error: {0}")]
    TomlSerialize(#[from] toml::ser::Error),
}

/// Exit codes used by the CLI.
#[repr(i32)]
pub enum ExitCode {
    Success = 0,
    GeneralError = 1,
    ConfigurationFailure = 2,
    InvalidArgs = 3,
}

pub type Result<T> = std::result::Result<T, PubscopeError>;
