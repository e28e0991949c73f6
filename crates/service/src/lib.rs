//! Service layer for table reservation locks.
//! - Owns the in-memory lease registry and its expiry rules.
//! - Time comes from an injected `Clock` so expiry can be driven by tests.
//! - Exposes a small synchronous API that the HTTP layer calls into.

pub mod clock;
pub mod errors;
pub mod lease;
pub mod lock_store;

pub use clock::{Clock, ManualClock, SystemClock};
pub use errors::LockError;
pub use lease::{Lease, LeaseDuration};
pub use lock_store::{LockBackend, LockStore};
