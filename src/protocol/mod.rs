//! Claim/wager protocol core.
//!
//! Pure and synchronous: no I/O, no clock reads, no locks. Time comes in as
//! a parameter and every rejection leaves the claim untouched.

pub mod claim;
pub mod error;
pub mod events;
pub mod pool;
pub mod resolution;

// Re-export protocol types
pub use claim::{Claim, ClaimStatus, NewClaim, ResolutionOutcome, DEFAULT_MAX_CLAIM_TEXT_LEN};
pub use error::{ProtocolError, ProtocolResult};
pub use events::{ClaimEvent, ClaimEventData};
pub use pool::{Odds, PayoutReceipt, Pool, Settlement, Side, SidePool};
pub use resolution::{
    Decision, Resolution, ResolutionEngine, ResolutionMethod, VerdictProposal, AUTO_SETTLE_CONFIDENCE,
};
