use thiserror::Error;

/// Errors produced by model constructors and validation routines.
#[derive(Error, Debug)]
pub enum ModelError {
    #[error("malformed descriptor record: {0}")]
    MalformedRecord(String),

    #[error("invalid channel id: {0}")]
    InvalidChannelId(String),
}

pub type Result<T> = std::result::Result<T, ModelError>;
