//! Error types shared by every stage of the fill pipeline.

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

/// Top-level error type for all pdf-filler operations.
#[derive(Debug, Error)]
pub enum FillerError {
    // -- Binding errors --
    #[error("`{type_name}` cannot be rendered: {reason}")]
    Binding {
        type_name: &'static str,
        reason: &'static str,
    },

    #[error("bound instance of `{0}` does not serialize to a property map")]
    NotAPropertyMap(&'static str),

    // -- Template and asset errors --
    #[error("template `{path}` could not be read: {source}")]
    Template {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("asset `{path}` could not be read: {source}")]
    Asset {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid render options: {0}")]
    Options(String),

    // -- Engine errors --
    #[error("rendering engine failed to launch: {0}")]
    EngineLaunch(String),

    #[error("rendering engine is unavailable: {0}")]
    EngineUnavailable(String),

    #[error("rendering engine disconnected while rendering")]
    EngineDisconnected,

    #[error("rendering engine error: {0}")]
    Engine(String),

    #[error("render timed out after {0:?}")]
    Timeout(Duration),

    // -- Storage / serialization --
    #[error("file I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Alias used throughout the crate.
pub type Result<T> = std::result::Result<T, FillerError>;

impl FillerError {
    /// Whether the error came from the rendering engine rather than from the
    /// template or its bindings. Callers use this to decide on a retry.
    pub fn is_engine_failure(&self) -> bool {
        matches!(
            self,
            FillerError::EngineLaunch(_)
                | FillerError::EngineUnavailable(_)
                | FillerError::EngineDisconnected
                | FillerError::Engine(_)
                | FillerError::Timeout(_)
        )
    }
}
