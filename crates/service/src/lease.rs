use std::time::{Duration, SystemTime};

use crate::errors::LockError;

const MIN_LEASE: Duration = Duration::from_nanos(1);

/// Requested hold time for a lease. Always strictly positive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LeaseDuration(Duration);

impl LeaseDuration {
    /// Build from a number of seconds as sent by callers; fractions are kept.
    /// Positive values below one nanosecond round up to one nanosecond.
    pub fn from_secs_f64(secs: f64) -> Result<Self, LockError> {
        if !secs.is_finite() || secs <= 0.0 {
            return Err(LockError::invalid("duration must be a positive number of seconds"));
        }
        let d = Duration::try_from_secs_f64(secs)
            .map_err(|_| LockError::invalid("duration is out of range"))?;
        Self::new(d.max(MIN_LEASE))
    }

    pub fn new(d: Duration) -> Result<Self, LockError> {
        if d.is_zero() {
            return Err(LockError::invalid("duration must be a positive number of seconds"));
        }
        Ok(Self(d))
    }

    pub fn as_duration(&self) -> Duration {
        self.0
    }
}

/// Current ownership of one resource.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Lease {
    pub owner_id: String,
    pub expires_at: SystemTime,
}

impl Lease {
    pub fn new(
        owner_id: impl Into<String>,
        now: SystemTime,
        duration: LeaseDuration,
    ) -> Result<Self, LockError> {
        let expires_at = now
            .checked_add(duration.as_duration())
            .ok_or(LockError::invalid("duration is out of range"))?;
        Ok(Self { owner_id: owner_id.into(), expires_at })
    }

    /// A lease counts only while its expiry is strictly in the future.
    pub fn is_effective_at(&self, now: SystemTime) -> bool {
        self.expires_at > now
    }
}
