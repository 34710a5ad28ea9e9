//! Engine-level error types.

use thiserror::Error;

/// Top-level error for the engine layers above the RHI.
#[derive(Error, Debug)]
pub enum Error {
    /// Rendering backend failures that bubbled up past recovery
    #[error("Renderer error: {0}")]
    Renderer(String),

    /// Window creation or surface bridging errors
    #[error("Platform error: {0}")]
    Platform(String),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Generic internal errors
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Result type alias using the engine's Error type.
pub type Result<T> = std::result::Result<T, Error>;
