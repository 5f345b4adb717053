//! Error types for the DRC engine.
//!
//! Only configuration and input-model problems surface as errors. Rule
//! evaluation problems fail closed inside the engine and cancellation is
//! reported through `DrcResult::completed`.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum DrcError {
    /// Layer name not known to the board model.
    #[error("unknown layer '{0}'")]
    UnknownLayer(String),

    /// Disallow flag name not recognised.
    #[error("unknown disallow flag '{0}'")]
    UnknownDisallowFlag(String),

    /// Rule condition could not be parsed.
    #[error("rule '{rule}': invalid condition at offset {offset}: {reason}")]
    InvalidCondition {
        rule: String,
        offset: usize,
        reason: String,
    },

    /// Config or job file could not be read.
    #[error("cannot read '{path}': {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// Config or job JSON is malformed.
    #[error("invalid JSON: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, DrcError>;
