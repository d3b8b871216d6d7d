//! Claim Events
//!
//! Emitted for every committed operation. Carried in receipts, logged and
//! pushed to subscribers.

use serde::{Serialize, Deserialize};

use crate::core::account::{AccountId, ClaimId};
use crate::core::clock::Timestamp;
use crate::protocol::pool::Side;
use crate::protocol::resolution::ResolutionMethod;

/// Event payload.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ClaimEventData {
    /// Claim posted with its creator's seed stake
    ClaimCreated {
        creator: AccountId,
        deadline: Timestamp,
        stake: u64,
        side: Side,
    },

    /// Wager appended to a side
    PoolJoined {
        bettor: AccountId,
        side: Side,
        amount: u64,
        side_total: u64,
    },

    /// Pool closed to new wagers
    ClaimLocked {
        side_a_total: u64,
        side_b_total: u64,
    },

    /// Verdict requested (`reentry` after a dispute)
    ResolutionRequested {
        reentry: bool,
    },

    /// Verdict accepted
    ClaimResolved {
        winner: Side,
        confidence: u8,
        method: ResolutionMethod,
    },

    /// Low-confidence verdict held for a human
    ClaimDisputed {
        confidence: u8,
    },

    /// Funds released to an account
    PayoutClaimed {
        account: AccountId,
        amount: u64,
        refund: bool,
    },
}

/// An event with the claim and time it belongs to.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClaimEvent {
    /// Claim affected
    pub claim_id: ClaimId,

    /// Authority time when committed
    pub timestamp: Timestamp,

    /// Event data
    pub data: ClaimEventData,
}

impl ClaimEvent {
    /// Create a new event.
    pub fn new(claim_id: ClaimId, timestamp: Timestamp, data: ClaimEventData) -> Self {
        Self { claim_id, timestamp, data }
    }

    /// Account that caused the event, if any.
    pub fn account(&self) -> Option<AccountId> {
        match &self.data {
            ClaimEventData::ClaimCreated { creator, .. } => Some(*creator),
            ClaimEventData::PoolJoined { bettor, .. } => Some(*bettor),
            ClaimEventData::PayoutClaimed { account, .. } => Some(*account),
            _ => None,
        }
    }

    /// Short label for log lines.
    pub fn label(&self) -> &'static str {
        match &self.data {
            ClaimEventData::ClaimCreated { .. } => "claim_created",
            ClaimEventData::PoolJoined { .. } => "pool_joined",
            ClaimEventData::ClaimLocked { .. } => "claim_locked",
            ClaimEventData::ResolutionRequested { .. } => "resolution_requested",
            ClaimEventData::ClaimResolved { .. } => "claim_resolved",
            ClaimEventData::ClaimDisputed { .. } => "claim_disputed",
            ClaimEventData::PayoutClaimed { .. } => "payout_claimed",
        }
    }

    /// Create claim created event.
    pub fn claim_created(claim_id: ClaimId, timestamp: Timestamp, creator: AccountId, deadline: Timestamp, stake: u64, side: Side) -> Self {
        Self::new(
            claim_id,
            timestamp,
            ClaimEventData::ClaimCreated { creator, deadline, stake, side },
        )
    }

    /// Create pool joined event.
    pub fn pool_joined(claim_id: ClaimId, timestamp: Timestamp, bettor: AccountId, side: Side, amount: u64, side_total: u64) -> Self {
        Self::new(
            claim_id,
            timestamp,
            ClaimEventData::PoolJoined { bettor, side, amount, side_total },
        )
    }

    /// Create claim locked event.
    pub fn claim_locked(claim_id: ClaimId, timestamp: Timestamp, side_a_total: u64, side_b_total: u64) -> Self {
        Self::new(claim_id, timestamp, ClaimEventData::ClaimLocked { side_a_total, side_b_total })
    }

    /// Create resolution requested event.
    pub fn resolution_requested(claim_id: ClaimId, timestamp: Timestamp, reentry: bool) -> Self {
        Self::new(claim_id, timestamp, ClaimEventData::ResolutionRequested { reentry })
    }

    /// Create claim resolved event.
    pub fn claim_resolved(claim_id: ClaimId, timestamp: Timestamp, winner: Side, confidence: u8, method: ResolutionMethod) -> Self {
        Self::new(
            claim_id,
            timestamp,
            ClaimEventData::ClaimResolved { winner, confidence, method },
        )
    }

    /// Create claim disputed event.
    pub fn claim_disputed(claim_id: ClaimId, timestamp: Timestamp, confidence: u8) -> Self {
        Self::new(claim_id, timestamp, ClaimEventData::ClaimDisputed { confidence })
    }

    /// Create payout claimed event.
    pub fn payout_claimed(claim_id: ClaimId, timestamp: Timestamp, account: AccountId, amount: u64, refund: bool) -> Self {
        Self::new(
            claim_id,
            timestamp,
            ClaimEventData::PayoutClaimed { account, amount, refund },
        )
    }
}
