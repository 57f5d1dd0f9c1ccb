use thiserror::Error;

#[derive(Error, Debug)]
pub enum OrchestratorError {
    #[error("Cache unavailable: {0}")]
    CacheUnavailable(String),

    #[error("Upstream inference failure ({service}): {message}")]
    UpstreamInference { service: String, message: String },

    #[error("Parser returned no candidates for database '{0}'")]
    NoCandidates(String),

    #[error("Input too long: {words} words exceeds the budget of {limit}")]
    InputTooLong { words: usize, limit: usize },

    #[error("Unknown database: {0}")]
    UnknownDatabase(String),

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl OrchestratorError {
    pub fn upstream(service: &str, message: impl Into<String>) -> Self {
        OrchestratorError::UpstreamInference {
            service: service.to_string(),
            message: message.into(),
        }
    }

    /// HTTP status the API layer reports for this failure.
    pub fn status_code(&self) -> u16 {
        match self {
            OrchestratorError::InputTooLong { .. }
            | OrchestratorError::UnknownDatabase(_)
            | OrchestratorError::InvalidRequest(_)
            | OrchestratorError::Json(_) => 400,
            OrchestratorError::UpstreamInference { .. } | OrchestratorError::NoCandidates(_) => 502,
            OrchestratorError::CacheUnavailable(_) => 503,
            OrchestratorError::Configuration(_) | OrchestratorError::Io(_) => 500,
        }
    }
}

pub type Result<T> = std::result::Result<T, OrchestratorError>;
