use thiserror::Error;

pub type Result<T> = std::result::Result<T, CHMError>;

#[derive(Error, Debug)]
pub enum CHMError {
    /// An event was recorded after the session was finalized
    #[error("Session is finalized; no further events can be recorded")]
    SessionFinalized,

    /// `finalize` was called a second time
    #[error("Session has already been finalized")]
    AlreadyFinalized,

    #[error("Event limit reached: {0}")]
    EventLimit(usize),

    /// The event carries a value that cannot be stored or hashed
    #[error("Invalid event: {0}")]
    InvalidEvent(String),

    #[error("No signing key configured")]
    SigningKeyMissing,

    /// The proof parsed, but its signature does not match its critical fields
    #[error("Proof signature verification failed")]
    VerificationFailure,

    /// The proof is structurally malformed
    #[error("Proof schema error: {0}")]
    SchemaError(String),

    #[error("No session for document: {0}")]
    UnknownDocument(String),

    #[error("A session already exists for document: {0}")]
    DocumentExists(String),

    #[error("Cryptography error: {0}")]
    CryptoError(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("Image processing error: {0}")]
    ImageError(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),
}

impl CHMError {
    pub fn schema(msg: impl Into<String>) -> Self {
        CHMError::SchemaError(msg.into())
    }

    pub fn crypto(msg: impl Into<String>) -> Self {
        CHMError::CryptoError(msg.into())
    }

    pub fn image(msg: impl Into<String>) -> Self {
        CHMError::ImageError(msg.into())
    }

    pub fn config(msg: impl Into<String>) -> Self {
        CHMError::ConfigError(msg.into())
    }

    pub fn invalid_event(msg: impl Into<String>) -> Self {
        CHMError::InvalidEvent(msg.into())
    }

    pub fn unknown_document(doc: impl std::fmt::Display) -> Self {
        CHMError::UnknownDocument(doc.to_string())
    }

    /// True for a parseable proof whose signature did not match
    pub fn is_tampered(&self) -> bool {
        matches!(self, CHMError::VerificationFailure)
    }

    /// True for a proof that could not be parsed or validated
    pub fn is_malformed(&self) -> bool {
        matches!(self, CHMError::SchemaError(_))
    }
}
