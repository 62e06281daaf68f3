use thiserror::Error;

/// Errors originating from the core crate.
#[derive(Error, Debug)]
pub enum CoreError {
    /// Configuration value out of range.
    #[error("Invalid configuration: {0}")]
    Config(String),
}
