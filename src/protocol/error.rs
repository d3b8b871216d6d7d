//! Protocol Errors
//!
//! Every variant is a rejection raised before any state mutation;
//! the claim stays in its prior valid state.

use thiserror::Error;

use crate::protocol::claim::ClaimStatus;

/// Reasons the protocol core refuses an operation.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProtocolError {
    /// Deadline is not strictly in the future at creation.
    #[error("deadline {deadline} is not after current time {now}")]
    InvalidDeadline { deadline: i64, now: i64 },

    /// Creation stake is zero.
    #[error("initial stake must be positive")]
    InvalidStake,

    /// Join amount is zero.
    #[error("wager amount must be positive")]
    InvalidAmount,

    /// Claim text is blank.
    #[error("claim text is empty")]
    EmptyClaimText,

    /// Claim text exceeds the configured limit.
    #[error("claim text is {len} bytes, limit is {max}")]
    ClaimTextTooLong { len: usize, max: usize },

    /// Pool no longer accepts wagers.
    #[error("claim is locked for wagers")]
    ClaimLocked,

    /// Lock attempted before the deadline.
    #[error("deadline {deadline} not reached (now {now})")]
    DeadlineNotReached { deadline: i64, now: i64 },

    /// Confidence outside 0..=100.
    #[error("confidence {0} is outside 0..=100")]
    InvalidConfidence(u8),

    /// Every paying entry of the account is already distributed.
    #[error("payout already claimed")]
    AlreadyPaid,

    /// The account has no stake on the paying side.
    #[error("account did not stake the paying side")]
    NotAWinner,

    /// The caller is not permitted to perform this operation.
    #[error("caller is not permitted to perform this operation")]
    AuthorityMismatch,

    /// Payout requested before the claim resolved.
    #[error("claim is not resolved")]
    NotResolved,

    /// Operation not legal from the current status.
    #[error("cannot {operation} while claim is {from:?}")]
    InvalidTransition { from: ClaimStatus, operation: &'static str },

    /// A disputed claim only accepts a human verdict.
    #[error("disputed claim requires a human verdict")]
    HumanVerdictRequired,

    /// Dispute re-entry already used.
    #[error("dispute re-entry limit reached")]
    DisputeLimitReached,

    /// No claim with the given id.
    #[error("claim not found")]
    ClaimNotFound,

    /// A claim with the derived id already exists.
    #[error("claim already exists")]
    ClaimExists,

    /// Operation needs a target claim id.
    #[error("operation requires a claim id")]
    MissingClaimId,

    /// Stake totals would overflow.
    #[error("arithmetic overflow in pool accounting")]
    ArithmeticOverflow,

    /// A payout would debit more than a vault holds.
    #[error("vault balance exhausted")]
    VaultExhausted,
}

/// Result alias for protocol operations.
pub type ProtocolResult<T> = Result<T, ProtocolError>;
