use thiserror::Error;

/// Failure kinds surfaced by the pipeline. Nothing here retries; every
/// failure propagates to the caller together with its underlying cause.
#[derive(Debug, Error)]
pub enum Error {
    /// Required connection settings are absent or unreadable; the
    /// operation never starts.
    #[error("incorrect settings: {0}")]
    Configuration(String),

    /// The response payload does not have the expected answer-group shape.
    #[error("malformed response payload: {0}")]
    MalformedResponse(String),

    /// A response references a question code absent from the metadata.
    #[error("no statement found for question code '{0}'")]
    MissingStatement(String),

    /// The storage write or transaction failed; the enclosing transaction
    /// has been rolled back.
    #[error("storage error: {0}")]
    Persistence(#[from] rusqlite::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
