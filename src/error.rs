//! Error taxonomy shared by the store adapters, resolver, and publisher.
//!
//! Every failure is surfaced as a distinguishable variant so callers can decide
//! whether to retry. Nothing in the crate recovers from these silently.

/// Result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// An input file could not be located, either directly or by basename.
    #[error("could not resolve '{requested}': tried '{direct}' and {search}")]
    NotFound {
        requested: String,
        direct: String,
        search: String,
    },

    /// The conditional write lost a race against another publisher.
    #[error("catalog {key} was modified concurrently (expected {expected})")]
    ConcurrentModification { key: String, expected: String },

    /// Stored catalog content does not match the catalog schema.
    #[error("catalog {key} is corrupt: {message}")]
    CorruptCatalog { key: String, message: String },

    /// Transport or filesystem failure talking to the store.
    #[error("storage unavailable: {message}")]
    StorageUnavailable {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// The run-context document is malformed or incomplete.
    #[error("invalid run context: {message}")]
    InvalidContext { message: String },

    #[error("internal error: {message}")]
    Internal { message: String },
}

impl Error {
    pub fn storage(message: impl Into<String>) -> Self {
        Self::StorageUnavailable {
            message: message.into(),
            source: None,
        }
    }

    pub fn storage_with_source(
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::StorageUnavailable {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    pub fn corrupt(key: impl Into<String>, message: impl Into<String>) -> Self {
        Self::CorruptCatalog {
            key: key.into(),
            message: message.into(),
        }
    }

    pub fn invalid_context(message: impl Into<String>) -> Self {
        Self::InvalidContext {
            message: message.into(),
        }
    }

    /// True for conditions a caller may clear by re-invoking the operation.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Error::ConcurrentModification { .. } | Error::StorageUnavailable { .. }
        )
    }
}
