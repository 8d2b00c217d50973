use thiserror::Error;

#[derive(Debug, Error)]
pub enum GenerationError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("API error ({status}): {message}")]
    Api { status: u16, message: String },

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("generation timed out after {secs}s")]
    Timeout { secs: u64 },

    #[error("job has no topic to write about")]
    EmptyTopic,

    #[error("Config error: {0}")]
    Config(String),
}

pub type Result<T> = std::result::Result<T, GenerationError>;
