//! Runtime error types.

use thiserror::Error;

/// Errors raised while loading configuration.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// The merged configuration sources did not match the schema.
    #[error("failed to parse configuration: {0}")]
    Parse(String),
}

/// Result type for configuration operations.
pub type ConfigResult<T> = Result<T, ConfigError>;

/// Errors that can occur during runtime operations.
#[derive(Error, Debug)]
pub enum RuntimeError {
    /// Configuration loading failed.
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Brain persistence failed during shutdown.
    #[error("brain error: {0}")]
    Brain(#[from] courier_core::BrainError),

    /// The dispatch loop task failed.
    #[error("dispatch loop failed: {0}")]
    Dispatch(String),
}

/// Result type for runtime operations.
pub type RuntimeResult<T> = Result<T, RuntimeError>;
