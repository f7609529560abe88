use thiserror::Error;

use crate::bundle::sourcemap::SourceMapError;

/// Conditions that abort a build call.
///
/// Problems inside user sources are never reported through this type; they
/// are recorded as messages in the session's `CompilationResult`.
#[derive(Debug, Error)]
pub enum BuildError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error(transparent)]
    SourceMap(#[from] SourceMapError),

    #[error("Sprite atlas build failed: {0}")]
    Atlas(String),
}

pub type Result<T> = std::result::Result<T, BuildError>;
