//! Error types for in-memory model mutation.
//!
//! The model never talks to the coordination store directly — it only
//! ever rejects a mutation that would violate one of its own
//! invariants. Store I/O errors live in `treadmill-backend`.

use thiserror::Error;

pub type ModelResult<T> = Result<T, ModelError>;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ModelError {
    #[error("capacity dimension would go negative: {0}")]
    InvalidCapacity(String),

    #[error("cycle detected while attaching bucket: {0}")]
    CycleDetected(String),

    #[error("cell has no default partition")]
    NoDefaultPartition,

    #[error("unknown allocation: {0}")]
    UnknownAllocation(String),

    #[error("unknown bucket: {0}")]
    UnknownBucket(String),

    #[error("unknown server: {0}")]
    UnknownServer(String),

    #[error("unknown application: {0}")]
    UnknownApplication(String),

    #[error("unknown identity group: {0}")]
    UnknownIdentityGroup(String),

    #[error("identity group {0} has no free slots")]
    IdentityGroupFull(String),
}
