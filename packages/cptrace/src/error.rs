//! Error types shared by the instrumentation pipeline.

use thiserror::Error;

/// Failure to produce or collect a trace.
///
/// Every variant is recoverable from the caller's point of view: the primary
/// run is never affected, only trace collection for that run is skipped.
#[derive(Debug, Error)]
pub enum TraceError {
    #[error("parse error in {path}: {message}")]
    Parse { path: String, message: String },

    #[error("unsupported construct at line {line}: {construct}")]
    Unsupported { construct: String, line: usize },

    #[error("sandbox failure: {0}")]
    Sandbox(String),

    #[error("invalid trace payload: {0}")]
    Payload(#[from] serde_json::Error),
}

impl TraceError {
    pub fn unsupported(construct: impl Into<String>, line: usize) -> Self {
        TraceError::Unsupported {
            construct: construct.into(),
            line,
        }
    }

    /// True when the source itself is at fault rather than the engine.
    pub fn is_source_error(&self) -> bool {
        matches!(self, TraceError::Parse { .. } | TraceError::Unsupported { .. })
    }
}

/// Failure raised while loading configuration files.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid configuration in {path}: {message}")]
    Invalid { path: String, message: String },
}
