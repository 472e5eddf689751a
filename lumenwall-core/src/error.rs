use thiserror::Error;

/// Every error kind surfaced by the bus, vault, channel index, fetcher, and
/// scheduler. A single flat enum, following the teacher's `MediaError`
/// pattern of one leaf error type per crate rather than per module.
#[derive(Error, Debug)]
pub enum FrameError {
    /// Programming error at an API boundary (malformed path, empty key, ...).
    #[error("invalid argument: {0}")]
    InvalidArg(String),

    /// Component used before init, or in the wrong lifecycle state.
    #[error("invalid state: {0}")]
    InvalidState(String),

    /// Remote 404, or a file absent when the caller required it to exist.
    #[error("not found: {0}")]
    NotFound(String),

    /// The bus lock was not acquired within the requested bound.
    #[error("timed out: {0}")]
    Timeout(String),

    /// A storage write failed (permissions, disk full, a torn rename).
    #[error("io failure: {0}")]
    IoFailure(#[from] std::io::Error),

    /// An allocation failed; callers should degrade (e.g. halve stripe
    /// height) before propagating.
    #[error("out of memory: {0}")]
    OutOfMemory(String),

    /// A transfer was truncated or exceeded its advertised length.
    #[error("invalid size: {0}")]
    InvalidSize(String),

    /// A non-200/non-404 HTTP response, or a malformed catalog record.
    #[error("invalid response: {0}")]
    InvalidResponse(String),
}

pub type Result<T> = std::result::Result<T, FrameError>;
