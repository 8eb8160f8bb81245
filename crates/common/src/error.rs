use thiserror::Error;

#[derive(Error, Debug)]
pub enum KxError {
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Store error: {0}")]
    Store(String),

    #[error("Lock unavailable: {0}")]
    LockUnavailable(String),

    #[error("Lock expired: {0}")]
    LockExpired(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl From<toml::de::Error> for KxError {
    fn from(err: toml::de::Error) -> Self {
        KxError::Config(err.to_string())
    }
}

impl KxError {
    /// Shorthand for building an `InvalidArgument` from anything displayable.
    pub fn invalid(msg: impl Into<String>) -> Self {
        KxError::InvalidArgument(msg.into())
    }

    /// True for store and transport failures, as opposed to validation or contention.
    pub fn is_store(&self) -> bool {
        matches!(self, KxError::Store(_))
    }
}

pub type Result<T> = std::result::Result<T, KxError>;
