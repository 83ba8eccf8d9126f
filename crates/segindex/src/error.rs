//! Error types for segindex

use thiserror::Error;

use crate::segment::SegmentId;

/// Result type alias for segindex operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error types for index and evaluation operations
#[derive(Debug, Error)]
pub enum Error {
    /// The segment core has been closed and can no longer be searched
    #[error("Segment {0} is closed")]
    SegmentClosed(SegmentId),

    /// The reader view has been closed
    #[error("Index reader is closed")]
    ReaderClosed,

    /// Query evaluation failed
    #[error("Evaluation error: {0}")]
    Evaluation(String),

    /// A query cache wrapping the evaluation failed
    #[error("Query cache error: {0}")]
    Cache(#[source] Box<dyn std::error::Error + Send + Sync>),
}
