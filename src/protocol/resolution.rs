//! Resolution Engine
//!
//! Decides whether a verdict settles a claim or escalates it to dispute.
//!
//! - AI verdicts at or above the auto-settle threshold settle immediately.
//! - AI verdicts below it are recorded and the claim becomes disputed.
//! - Human verdicts always settle.

use std::collections::BTreeSet;
use serde::{Serialize, Deserialize};

use crate::core::account::AccountId;
use crate::core::clock::Timestamp;
use crate::protocol::error::{ProtocolError, ProtocolResult};
use crate::protocol::pool::Side;

/// Minimum AI confidence for automatic settlement.
pub const AUTO_SETTLE_CONFIDENCE: u8 = 85;

/// Upper bound of the confidence scale.
pub const MAX_CONFIDENCE: u8 = 100;

/// How a verdict was produced.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[repr(u8)]
pub enum ResolutionMethod {
    /// Automated verdict sourcing.
    Ai = 0,
    /// Registered human arbiter.
    Human = 1,
}

impl ResolutionMethod {
    /// Get method from wire index (0-1).
    pub fn from_index(index: u8) -> Option<Self> {
        match index {
            0 => Some(ResolutionMethod::Ai),
            1 => Some(ResolutionMethod::Human),
            _ => None,
        }
    }
}

/// A verdict submitted for a claim.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct VerdictProposal {
    /// Claim judged true.
    pub verdict: bool,
    /// Confidence 0-100.
    pub confidence: u8,
    /// Source of the verdict.
    pub method: ResolutionMethod,
    /// Account submitting it.
    pub resolver: AccountId,
}

/// Recorded verdict. Immutable once created.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Resolution {
    /// Claim judged true.
    pub verdict: bool,
    /// Confidence 0-100.
    pub confidence: u8,
    /// Source of the verdict.
    pub method: ResolutionMethod,
    /// Account that submitted it.
    pub resolver: AccountId,
    /// When it was recorded.
    pub timestamp: Timestamp,
}

impl Resolution {
    /// Side this verdict favours.
    pub fn winner(&self) -> Side {
        Side::from_verdict(self.verdict)
    }
}

/// Engine outcome for an accepted proposal.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Decision {
    /// Settle the claim with this verdict.
    Settle,
    /// Record the verdict and hold the claim for a human.
    Escalate,
}

/// Verdict gating and resolver permissions.
#[derive(Clone, Debug)]
pub struct ResolutionEngine {
    auto_settle_threshold: u8,
    resolvers: BTreeSet<AccountId>,
    arbiters: BTreeSet<AccountId>,
}

impl Default for ResolutionEngine {
    fn default() -> Self {
        Self::new(AUTO_SETTLE_CONFIDENCE)
    }
}

impl ResolutionEngine {
    /// Create an engine with no registered accounts.
    pub fn new(auto_settle_threshold: u8) -> Self {
        Self {
            auto_settle_threshold: auto_settle_threshold.min(MAX_CONFIDENCE),
            resolvers: BTreeSet::new(),
            arbiters: BTreeSet::new(),
        }
    }

    /// Register an account allowed to submit AI verdicts.
    pub fn with_resolver(mut self, account: AccountId) -> Self {
        self.resolvers.insert(account);
        self
    }

    /// Register an account allowed to submit human verdicts.
    pub fn with_arbiter(mut self, account: AccountId) -> Self {
        self.arbiters.insert(account);
        self
    }

    /// Auto-settle threshold in use.
    pub fn threshold(&self) -> u8 {
        self.auto_settle_threshold
    }

    /// Whether `account` may submit AI verdicts.
    pub fn is_resolver(&self, account: &AccountId) -> bool {
        self.resolvers.contains(account)
    }

    /// Whether `account` may submit human verdicts.
    pub fn is_arbiter(&self, account: &AccountId) -> bool {
        self.arbiters.contains(account)
    }

    /// Check that the proposer holds the role its method requires.
    pub fn authorize(&self, proposal: &VerdictProposal) -> ProtocolResult<()> {
        let permitted = match proposal.method {
            ResolutionMethod::Ai => self.is_resolver(&proposal.resolver),
            ResolutionMethod::Human => self.is_arbiter(&proposal.resolver),
        };
        if permitted {
            Ok(())
        } else {
            Err(ProtocolError::AuthorityMismatch)
        }
    }

    /// Decide what a proposal does to the claim.
    ///
    /// `after_dispute` is set once a disputed claim has re-entered
    /// resolution; from then on only a human may decide it.
    pub fn evaluate(&self, proposal: &VerdictProposal, after_dispute: bool) -> ProtocolResult<Decision> {
        if proposal.confidence > MAX_CONFIDENCE {
            return Err(ProtocolError::InvalidConfidence(proposal.confidence));
        }
        self.authorize(proposal)?;

        match proposal.method {
            ResolutionMethod::Human => Ok(Decision::Settle),
            ResolutionMethod::Ai if after_dispute => Err(ProtocolError::HumanVerdictRequired),
            ResolutionMethod::Ai if proposal.confidence >= self.auto_settle_threshold => Ok(Decision::Settle),
            ResolutionMethod::Ai => Ok(Decision::Escalate),
        }
    }

    /// Stamp a proposal into an immutable record.
    pub fn record(&self, proposal: &VerdictProposal, now: Timestamp) -> Resolution {
        Resolution {
            verdict: proposal.verdict,
            confidence: proposal.confidence,
            method: proposal.method,
            resolver: proposal.resolver,
            timestamp: now,
        }
    }
}
