use thiserror::Error;

#[derive(Error, Debug)]
pub enum DeckError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML parsing error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("No example sentence for candidate: {0}")]
    MissingExample(String),

    #[error("Cache id error: {0}")]
    CacheId(String),

    #[error("Translation provider rate limited: {0}")]
    RateLimited(String),

    #[error("Translation error: {0}")]
    Translation(String),

    #[error("Cache error: {0}")]
    Cache(String),

    #[error("Configuration error: {0}")]
    Config(String),
}

pub type Result<T> = std::result::Result<T, DeckError>;
