use thiserror::Error;

#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("LLM request failed: {0}")]
    LlmRequest(String),

    #[error("Literature API request failed: {0}")]
    LiteratureApi(String),

    #[error("Failed to parse literature document: {0}")]
    Parse(String),

    #[error("Article store error: {0}")]
    Store(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),
}

impl From<sqlx::Error> for PipelineError {
    fn from(err: sqlx::Error) -> Self {
        PipelineError::Store(err.to_string())
    }
}

impl From<reqwest::Error> for PipelineError {
    fn from(err: reqwest::Error) -> Self {
        PipelineError::LiteratureApi(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, PipelineError>;
