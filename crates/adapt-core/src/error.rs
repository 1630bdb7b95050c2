use thiserror::Error;

#[derive(Debug, Error)]
pub enum AdaptError {
    #[error("pipeline state file not found: {0}")]
    StateFileNotFound(String),

    #[error("home directory not found: set HOME or pass --memory-dir")]
    HomeNotFound,

    #[error("ci metrics fetch failed: {0}")]
    CiFetch(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Yaml(#[from] serde_yaml::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Http(#[from] reqwest::Error),
}

pub type Result<T> = std::result::Result<T, AdaptError>;
