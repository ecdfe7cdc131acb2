//! App-Monitor error types.

use thiserror::Error;

use crate::instance_api::InstanceApiError;

/// Errors that can occur during a monitor reevaluation cycle.
///
/// `ConfigInvalid` is warn-and-continue: the offending monitor is
/// skipped for this tick but the cycle keeps going. Every other variant
/// is treated as a reason for the leader to give up and let a new
/// leader re-elect, per the error-handling policy's "admin-store
/// connection failure stops the reevaluation loop" rule.
#[derive(Debug, Error)]
pub enum MonitorError {
    #[error("backend error: {0}")]
    Backend(#[from] treadmill_backend::BackendError),

    #[error("instance api error: {0}")]
    InstanceApi(#[from] InstanceApiError),

    #[error("invalid monitor configuration: {0}")]
    ConfigInvalid(String),
}

pub type MonitorResult<T> = Result<T, MonitorError>;
