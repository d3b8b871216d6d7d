//! Claim views for presentation layers.

use serde::{Serialize, Deserialize};

use crate::core::account::{format_amount, AccountId, ClaimId, VaultId};
use crate::core::clock::Timestamp;
use crate::protocol::claim::{Claim, ClaimStatus};
use crate::protocol::pool::Side;
use crate::protocol::resolution::Resolution;

/// Per-side summary.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SideView {
    /// Escrow vault.
    pub vault: VaultId,
    /// Total staked, in base units.
    pub total: u64,
    /// Total staked, as whole units with two decimals.
    pub total_display: String,
    /// Number of stake entries.
    pub entries: usize,
    /// Display odds, e.g. `"4.00x"`. Absent when nobody staked.
    pub odds: Option<String>,
}

/// Read-only snapshot of a claim.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClaimView {
    /// Claim id.
    pub id: ClaimId,
    /// Posting account.
    pub creator: AccountId,
    /// The statement wagered on.
    pub claim_text: String,
    /// Wager deadline, unix seconds.
    pub deadline: Timestamp,
    /// Free-text category.
    pub category: String,
    /// Free-text subcategory.
    pub subcategory: String,
    /// When the claim was posted.
    pub created_at: Timestamp,
    /// Lifecycle status.
    pub status: ClaimStatus,
    /// Winning side, once resolved.
    pub winner: Option<Side>,
    /// Latest verdict record.
    pub resolution: Option<Resolution>,
    /// Verdict superseded by a dispute settlement.
    pub escalated_resolution: Option<Resolution>,
    /// Side A summary.
    pub side_a: SideView,
    /// Side B summary.
    pub side_b: SideView,
    /// Hex state digest, matching the one in receipts.
    pub state_hash: String,
}

impl ClaimView {
    /// Summarize a claim.
    pub fn from_claim(claim: &Claim) -> Self {
        let side = |s: Side| {
            let ledger = claim.side(s);
            SideView {
                vault: claim.vault(s),
                total: ledger.total(),
                total_display: format_amount(ledger.total()),
                entries: ledger.len(),
                odds: claim.odds(s).map(|o| o.to_string()),
            }
        };

        Self {
            id: claim.id(),
            creator: claim.creator(),
            claim_text: claim.claim_text().to_string(),
            deadline: claim.deadline(),
            category: claim.category().to_string(),
            subcategory: claim.subcategory().to_string(),
            created_at: claim.created_at(),
            status: claim.status(),
            winner: claim.winner(),
            resolution: claim.resolution().cloned(),
            escalated_resolution: claim.escalated_resolution().cloned(),
            side_a: side(Side::A),
            side_b: side(Side::B),
            state_hash: hex::encode(claim.compute_hash()),
        }
    }

    /// Whether a resolver should pick this claim up at `now`.
    pub fn is_due(&self, now: Timestamp) -> bool {
        match self.status {
            ClaimStatus::Open => now >= self.deadline,
            ClaimStatus::Locked => true,
            _ => false,
        }
    }
}
