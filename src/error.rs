#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(String),
    #[cfg(feature = "http")]
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("Storage error: {0}")]
    Storage(String),
    #[error("Cookie error: {0}")]
    Cookie(String),
}

/// Failure reported by a consumer-provided collaborator (cookie jar, store,
/// transport). The consumer chooses the concrete error type.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;
