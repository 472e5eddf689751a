use thiserror::Error;

/// Errors surfaced while locating, reading, or validating configuration.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read config file {0}: {1}")]
    Read(String, String),

    #[error("invalid TOML config: {0}")]
    Toml(String),

    #[error("invalid JSON config: {0}")]
    Json(String),

    #[error("invalid configuration: {0}")]
    Validation(String),
}
