//! Cell sync error types.

use thiserror::Error;

/// Errors a `CellSync` implementation can surface.
///
/// `Ldap` and `Sqlite` name the two external collaborators this crate
/// does not implement; a real implementation will produce them from
/// whatever client libraries it links against. `Backend` covers the
/// coordination-store half of the job, which this crate's callers do
/// own.
#[derive(Debug, Error)]
pub enum SyncError {
    #[error("ldap admin source error: {0}")]
    Ldap(String),

    #[error("appgroup lookup database error: {0}")]
    Sqlite(String),

    #[error("backend error: {0}")]
    Backend(#[from] treadmill_backend::BackendError),
}

pub type SyncResult<T> = Result<T, SyncError>;
