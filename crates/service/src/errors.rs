use thiserror::Error;

/// Outcomes of a lock operation that did not succeed.
///
/// All of them are ordinary, caller-recoverable results; none is retried.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LockError {
    #[error("invalid request: {0}")]
    InvalidRequest(&'static str),
    #[error("resource is already locked")]
    AlreadyLocked,
    #[error("resource is not locked")]
    NotLocked,
    #[error("resource is locked by another owner")]
    WrongOwner,
}

impl LockError {
    pub fn invalid(reason: &'static str) -> Self {
        Self::InvalidRequest(reason)
    }
}
