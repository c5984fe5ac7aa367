//! Error handling types

use thiserror::Error;

/// Result type alias for operations that can fail
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for the code-context engine
#[derive(Error, Debug)]
pub enum Error {
    /// Codebase path does not exist
    #[error("path not found: {path}")]
    PathNotFound {
        /// The missing path
        path: String,
    },

    /// Codebase path exists but is not a directory
    #[error("not a directory: {path}")]
    NotADirectory {
        /// The offending path
        path: String,
    },

    /// An indexing run is already active for the codebase
    #[error("codebase is already being indexed: {path}")]
    AlreadyIndexing {
        /// The codebase path
        path: String,
    },

    /// The codebase is already indexed and `force` was not set
    #[error("codebase is already indexed: {path}")]
    AlreadyIndexed {
        /// The codebase path
        path: String,
    },

    /// The codebase has no usable index
    #[error("codebase is not indexed: {path}")]
    NotIndexed {
        /// The codebase path
        path: String,
    },

    /// A conflicting operation holds the per-codebase lock
    #[error("codebase is busy: {path}")]
    Busy {
        /// The codebase path
        path: String,
    },

    /// Unrecognized splitter name in an index request
    #[error("invalid splitter: {name}")]
    InvalidSplitter {
        /// The rejected splitter name
        name: String,
    },

    /// Extension filter entry does not match `^\.[a-zA-Z0-9]+$`
    #[error("invalid extension filter entry: {entry:?}")]
    InvalidExtensionFilter {
        /// The rejected entry
        entry: String,
    },

    /// Provider dimension differs from the existing collection schema
    #[error("embedding dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch {
        /// Dimension pinned in the collection schema
        expected: usize,
        /// Dimension offered by the caller
        actual: usize,
    },

    /// The store refuses to create another collection
    #[error("collection limit reached: {max}")]
    CollectionLimit {
        /// Backend-advertised cap
        max: usize,
    },

    /// Embedding provider operation error
    #[error("embedding provider error: {message}")]
    Embedding {
        /// Description of the failure
        message: String,
        /// Whether a retry may succeed (network, rate limit)
        retryable: bool,
    },

    /// Vector store operation error
    #[error("vector store error: {message}")]
    VectorStore {
        /// Description of the failure
        message: String,
        /// Whether the failure is transient
        transient: bool,
    },

    /// Configuration-related error
    #[error("configuration error: {message}")]
    Config {
        /// Description of the configuration error
        message: String,
    },

    /// The indexing run was cancelled cooperatively
    #[error("indexing cancelled")]
    Cancelled,

    /// I/O operation error
    #[error("I/O error: {source}")]
    Io {
        /// The underlying I/O error
        #[from]
        source: std::io::Error,
    },

    /// JSON parsing or serialization error
    #[error("JSON error: {source}")]
    Json {
        /// The underlying JSON error
        #[from]
        source: serde_json::Error,
    },

    /// Internal invariant violation
    #[error("internal error: {message}")]
    Internal {
        /// Description of the internal error
        message: String,
    },
}

impl Error {
    /// Create a path-not-found error
    pub fn path_not_found<S: Into<String>>(path: S) -> Self {
        Self::PathNotFound { path: path.into() }
    }

    /// Create a not-indexed error
    pub fn not_indexed<S: Into<String>>(path: S) -> Self {
        Self::NotIndexed { path: path.into() }
    }

    /// Create a retryable embedding error
    pub fn embedding_retryable<S: Into<String>>(message: S) -> Self {
        Self::Embedding {
            message: message.into(),
            retryable: true,
        }
    }

    /// Create a permanent embedding error
    pub fn embedding_permanent<S: Into<String>>(message: S) -> Self {
        Self::Embedding {
            message: message.into(),
            retryable: false,
        }
    }

    /// Create a non-transient vector store error
    pub fn vector_store<S: Into<String>>(message: S) -> Self {
        Self::VectorStore {
            message: message.into(),
            transient: false,
        }
    }

    /// Create a transient vector store error
    pub fn vector_store_transient<S: Into<String>>(message: S) -> Self {
        Self::VectorStore {
            message: message.into(),
            transient: true,
        }
    }

    /// Create a configuration error
    pub fn config<S: Into<String>>(message: S) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Create an internal error
    pub fn internal<S: Into<String>>(message: S) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Whether retrying the failed operation may succeed
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Error::Embedding {
                retryable: true,
                ..
            } | Error::VectorStore {
                transient: true,
                ..
            }
        )
    }
}

impl From<rusqlite::Error> for Error {
    fn from(err: rusqlite::Error) -> Self {
        Self::VectorStore {
            message: err.to_string(),
            transient: false,
        }
    }
}

impl From<reqwest::Error> for Error {
    fn from(err: reqwest::Error) -> Self {
        // Timeouts, connection failures, rate limits, and server errors are
        // worth retrying; everything else (bad request, auth) is permanent.
        let retryable = err.is_timeout()
            || err.is_connect()
            || err
                .status()
                .map(|s| s.as_u16() == 429 || s.is_server_error())
                .unwrap_or(false);
        Self::Embedding {
            message: err.to_string(),
            retryable,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retryable_classification() {
        assert!(Error::embedding_retryable("rate limited").is_retryable());
        assert!(!Error::embedding_permanent("empty batch").is_retryable());
        assert!(Error::vector_store_transient("locked").is_retryable());
        assert!(!Error::vector_store("schema drift").is_retryable());
        assert!(!Error::Cancelled.is_retryable());
    }

    #[test]
    fn not_indexed_message_names_the_state() {
        let err = Error::not_indexed("/p");
        assert!(err.to_string().contains("not indexed"));
    }
}
