//! Loader error types.

use thiserror::Error;

/// Errors that can occur while rebuilding or maintaining the cell model.
#[derive(Debug, Error)]
pub enum LoaderError {
    #[error("backend error: {0}")]
    Backend(#[from] treadmill_backend::BackendError),

    #[error("model error: {0}")]
    Model(#[from] treadmill_model::ModelError),

    #[error("placement error: {0}")]
    Placement(#[from] treadmill_placement::PlacementError),

    #[error("malformed record at {path}: {source}")]
    Malformed {
        path: String,
        #[source]
        source: serde_json::Error,
    },

    /// `check_placement_integrity` found a duplicate or missing
    /// placement record it could not resolve against the model's
    /// authoritative state. Fatal: the daemon's main loop treats this
    /// as a reason to give up leadership rather than run with a model
    /// it can no longer trust.
    #[error("placement integrity violation: {0}")]
    Integrity(String),
}

pub type LoaderResult<T> = Result<T, LoaderError>;
