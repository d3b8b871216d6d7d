//! Core primitives.
//!
//! Identifiers, hashing and the time source shared by the protocol core
//! and the settlement authority.

pub mod account;
pub mod clock;
pub mod hash;

// Re-export core types
pub use account::{AccountId, ClaimId, VaultId, NATIVE_STAKE_TOKEN};
pub use clock::{Clock, ManualClock, SystemClock, Timestamp};
pub use hash::{StateHash, StateHasher};
