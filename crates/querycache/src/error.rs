//! Error types for querycache

use thiserror::Error;

/// Result type alias for cache operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error types for cache operations
#[derive(Debug, Error)]
pub enum Error {
    /// A cached query's hash or equality changed after it was inserted
    ///
    /// The cache can no longer locate the entry; the request is aborted.
    #[error(
        "Query identity changed after caching: {query} \
         (its hash and equality must not depend on mutable state)"
    )]
    KeyIdentityChanged {
        /// Display form of the offending query
        query: String,
    },

    /// Recomputed totals disagree with the maintained counters
    #[error("Cache is inconsistent: {0}")]
    Inconsistent(String),

    /// Rejected configuration
    #[error("Invalid cache configuration: {0}")]
    InvalidConfig(String),

    /// Error from the evaluation path, propagated unchanged
    #[error(transparent)]
    Index(#[from] segindex::Error),
}

impl From<Error> for segindex::Error {
    fn from(err: Error) -> Self {
        match err {
            Error::Index(inner) => inner,
            other => segindex::Error::Cache(Box::new(other)),
        }
    }
}
