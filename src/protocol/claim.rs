//! Claim State Machine
//!
//! Owns a claim's lifecycle status and decides which operations are legal
//! in which state. Pool bookkeeping is delegated to [`Pool`] and verdict
//! gating to [`ResolutionEngine`].
//!
//! ```text
//! Open ──lock──▶ Locked ──request──▶ Resolving ──apply──▶ Resolved
//!                                       ▲   │
//!                                (once) │   └──low confidence──▶ Disputed
//!                                       └────────request─────────┘
//! ```
//!
//! Every operation either succeeds or leaves the claim untouched.

use serde::{Serialize, Deserialize};

use crate::core::account::{AccountId, ClaimId, VaultId};
use crate::core::clock::Timestamp;
use crate::core::hash::{claim_text_hash, derive_claim_id, derive_vault_id, StateHash, StateHasher};
use crate::protocol::error::{ProtocolError, ProtocolResult};
use crate::protocol::pool::{Odds, PayoutReceipt, Pool, Settlement, Side, SidePool};
use crate::protocol::resolution::{Decision, Resolution, ResolutionEngine, VerdictProposal};

/// Longest accepted claim text, in bytes.
pub const DEFAULT_MAX_CLAIM_TEXT_LEN: usize = 200;

/// How many times a disputed claim may go back to `Resolving`.
pub const MAX_DISPUTE_REENTRIES: u8 = 1;

// =============================================================================
// STATUS
// =============================================================================

/// Lifecycle status of a claim.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[repr(u8)]
pub enum ClaimStatus {
    /// Accepting wagers.
    Open = 0,
    /// Deadline passed, no more wagers.
    Locked = 1,
    /// Awaiting a verdict.
    Resolving = 2,
    /// Winner decided, payouts open.
    Resolved = 3,
    /// Low-confidence verdict, awaiting a human.
    Disputed = 4,
}

impl ClaimStatus {
    /// Lowercase name for views and logs.
    pub fn as_str(self) -> &'static str {
        match self {
            ClaimStatus::Open => "open",
            ClaimStatus::Locked => "locked",
            ClaimStatus::Resolving => "resolving",
            ClaimStatus::Resolved => "resolved",
            ClaimStatus::Disputed => "disputed",
        }
    }

    /// Whether a verdict record must be present in this status.
    ///
    /// `Resolving` carries one only on a dispute re-entry.
    pub fn has_resolution(self) -> bool {
        matches!(self, ClaimStatus::Resolved | ClaimStatus::Disputed)
    }
}

// =============================================================================
// CLAIM
// =============================================================================

/// Parameters for posting a new claim.
#[derive(Clone, Debug)]
pub struct NewClaim {
    /// Account posting the claim.
    pub creator: AccountId,
    /// The falsifiable statement.
    pub claim_text: String,
    /// Unix deadline for wagers.
    pub deadline: Timestamp,
    /// Creator's seed stake.
    pub stake: u64,
    /// Side the seed stake backs.
    pub side: Side,
    /// Free-text grouping.
    pub category: String,
    /// Free-text grouping.
    pub subcategory: String,
    /// Accepted stake unit.
    pub stake_token: AccountId,
}

/// Result of applying a verdict.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ResolutionOutcome {
    /// The claim settled.
    Resolved {
        /// Side that won.
        winner: Side,
    },
    /// The claim is held for a human verdict.
    Disputed,
}

/// A posted claim with its pooled wagers.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claim {
    id: ClaimId,
    creator: AccountId,
    claim_text: String,
    claim_text_hash: StateHash,
    deadline: Timestamp,
    stake_token: AccountId,
    side_a_vault: VaultId,
    side_b_vault: VaultId,
    category: String,
    subcategory: String,
    created_at: Timestamp,
    status: ClaimStatus,
    winner: Option<Side>,
    resolution: Option<Resolution>,
    escalated_resolution: Option<Resolution>,
    dispute_reentries: u8,
    pool: Pool,
}

impl Claim {
    /// Post a claim and seed the creator's stake.
    pub fn create(params: NewClaim, max_text_len: usize, now: Timestamp) -> ProtocolResult<Self> {
        if params.deadline <= now {
            return Err(ProtocolError::InvalidDeadline { deadline: params.deadline, now });
        }
        if params.stake == 0 {
            return Err(ProtocolError::InvalidStake);
        }
        if params.claim_text.trim().is_empty() {
            return Err(ProtocolError::EmptyClaimText);
        }
        if params.claim_text.len() > max_text_len {
            return Err(ProtocolError::ClaimTextTooLong {
                len: params.claim_text.len(),
                max: max_text_len,
            });
        }

        let text_hash = claim_text_hash(&params.claim_text);
        let id = derive_claim_id(&params.creator, &text_hash);

        let mut pool = Pool::new();
        pool.stake(params.side, params.creator, params.stake)?;

        Ok(Self {
            id,
            creator: params.creator,
            claim_text: params.claim_text,
            claim_text_hash: text_hash,
            deadline: params.deadline,
            stake_token: params.stake_token,
            side_a_vault: derive_vault_id(&id, Side::A.tag()),
            side_b_vault: derive_vault_id(&id, Side::B.tag()),
            category: params.category,
            subcategory: params.subcategory,
            created_at: now,
            status: ClaimStatus::Open,
            winner: None,
            resolution: None,
            escalated_resolution: None,
            dispute_reentries: 0,
            pool,
        })
    }

    /// Id `create` would assign, without building the claim.
    pub fn id_for(creator: &AccountId, claim_text: &str) -> ClaimId {
        derive_claim_id(creator, &claim_text_hash(claim_text))
    }

    // =========================================================================
    // Transitions
    // =========================================================================

    /// Append a wager. Returns the entry index on that side.
    pub fn join_pool(&mut self, bettor: AccountId, side: Side, amount: u64, now: Timestamp) -> ProtocolResult<usize> {
        if self.status != ClaimStatus::Open || now >= self.deadline {
            return Err(ProtocolError::ClaimLocked);
        }
        self.pool.stake(side, bettor, amount)
    }

    /// Close the pool once the deadline has passed.
    ///
    /// Returns `false` without changes when the claim is already past `Open`.
    pub fn lock(&mut self, now: Timestamp) -> ProtocolResult<bool> {
        if self.status != ClaimStatus::Open {
            return Ok(false);
        }
        if now < self.deadline {
            return Err(ProtocolError::DeadlineNotReached { deadline: self.deadline, now });
        }
        self.status = ClaimStatus::Locked;
        Ok(true)
    }

    /// Move to `Resolving`. Returns whether this was a dispute re-entry.
    pub fn request_resolution(&mut self) -> ProtocolResult<bool> {
        match self.status {
            ClaimStatus::Locked => {
                self.status = ClaimStatus::Resolving;
                Ok(false)
            }
            ClaimStatus::Disputed => {
                if self.dispute_reentries >= MAX_DISPUTE_REENTRIES {
                    return Err(ProtocolError::DisputeLimitReached);
                }
                self.dispute_reentries += 1;
                self.status = ClaimStatus::Resolving;
                Ok(true)
            }
            from => Err(ProtocolError::InvalidTransition { from, operation: "request resolution" }),
        }
    }

    /// Apply a verdict while `Resolving`.
    pub fn apply_resolution(
        &mut self,
        engine: &ResolutionEngine,
        proposal: &VerdictProposal,
        now: Timestamp,
    ) -> ProtocolResult<ResolutionOutcome> {
        if self.status != ClaimStatus::Resolving {
            return Err(ProtocolError::InvalidTransition { from: self.status, operation: "apply resolution" });
        }

        let decision = engine.evaluate(proposal, self.dispute_reentries > 0)?;
        let record = engine.record(proposal, now);

        match decision {
            Decision::Settle => {
                let winner = record.winner();
                if let Some(superseded) = self.resolution.take() {
                    self.escalated_resolution = Some(superseded);
                }
                self.resolution = Some(record);
                self.winner = Some(winner);
                self.status = ClaimStatus::Resolved;
                Ok(ResolutionOutcome::Resolved { winner })
            }
            Decision::Escalate => {
                self.resolution = Some(record);
                self.status = ClaimStatus::Disputed;
                Ok(ResolutionOutcome::Disputed)
            }
        }
    }

    /// Release everything `account` is owed.
    pub fn claim_payout(&mut self, account: &AccountId) -> ProtocolResult<PayoutReceipt> {
        let winner = match (self.status, self.winner) {
            (ClaimStatus::Resolved, Some(winner)) => winner,
            _ => return Err(ProtocolError::NotResolved),
        };
        self.pool.pay_out(winner, account)
    }

    // =========================================================================
    // Accessors
    // =========================================================================

    /// Stable claim id.
    pub fn id(&self) -> ClaimId {
        self.id
    }

    /// Account that posted the claim.
    pub fn creator(&self) -> AccountId {
        self.creator
    }

    /// The statement wagered on.
    pub fn claim_text(&self) -> &str {
        &self.claim_text
    }

    /// Digest of the claim text.
    pub fn claim_text_hash(&self) -> &StateHash {
        &self.claim_text_hash
    }

    /// Unix deadline for wagers.
    pub fn deadline(&self) -> Timestamp {
        self.deadline
    }

    /// Accepted stake unit.
    pub fn stake_token(&self) -> AccountId {
        self.stake_token
    }

    /// Escrow vault for `side`.
    pub fn vault(&self, side: Side) -> VaultId {
        match side {
            Side::A => self.side_a_vault,
            Side::B => self.side_b_vault,
        }
    }

    /// Free-text category.
    pub fn category(&self) -> &str {
        &self.category
    }

    /// Free-text subcategory.
    pub fn subcategory(&self) -> &str {
        &self.subcategory
    }

    /// When the claim was posted.
    pub fn created_at(&self) -> Timestamp {
        self.created_at
    }

    /// Lifecycle status.
    pub fn status(&self) -> ClaimStatus {
        self.status
    }

    /// Winning side, once resolved.
    pub fn winner(&self) -> Option<Side> {
        self.winner
    }

    /// Accepted verdict, or the disputed one while awaiting a human.
    pub fn resolution(&self) -> Option<&Resolution> {
        self.resolution.as_ref()
    }

    /// Low-confidence verdict superseded by a human.
    pub fn escalated_resolution(&self) -> Option<&Resolution> {
        self.escalated_resolution.as_ref()
    }

    /// Times the claim went back to `Resolving` from a dispute.
    pub fn dispute_reentries(&self) -> u8 {
        self.dispute_reentries
    }

    /// Both sides' wagers.
    pub fn pool(&self) -> &Pool {
        &self.pool
    }

    /// One side's ledger.
    pub fn side(&self, side: Side) -> &SidePool {
        self.pool.side(side)
    }

    /// Display odds for `side`.
    pub fn odds(&self, side: Side) -> Option<Odds> {
        self.pool.odds(side)
    }

    /// Estimated payout for a stake on `side`.
    pub fn quote(&self, side: Side, stake: u64) -> Option<u64> {
        self.pool.quote(side, stake)
    }

    /// Distribution of the pool, once resolved.
    pub fn settlement(&self) -> Option<Settlement> {
        self.winner.map(|winner| self.pool.settlement(winner))
    }

    /// Whether the claim's deadline has passed while still open.
    pub fn is_due(&self, now: Timestamp) -> bool {
        match self.status {
            ClaimStatus::Open => now >= self.deadline,
            ClaimStatus::Locked => true,
            _ => false,
        }
    }

    // =========================================================================
    // Integrity
    // =========================================================================

    /// Check every invariant that must hold for a committed claim.
    pub fn check_invariants(&self) -> bool {
        let resolution_matches = match self.status {
            ClaimStatus::Resolving => self.resolution.is_some() == (self.dispute_reentries > 0),
            status => self.resolution.is_some() == status.has_resolution(),
        };
        let paid_before_resolved = self.status != ClaimStatus::Resolved
            && Side::ALL.iter().any(|s| self.pool.side(*s).withdrawn() > 0);

        self.pool.is_consistent()
            && self.winner.is_some() == (self.status == ClaimStatus::Resolved)
            && resolution_matches
            && (self.escalated_resolution.is_none() || self.status == ClaimStatus::Resolved)
            && self.dispute_reentries <= MAX_DISPUTE_REENTRIES
            && !paid_before_resolved
    }

    /// Deterministic digest of the full claim state.
    pub fn compute_hash(&self) -> StateHash {
        let mut hasher = StateHasher::for_claim_state();

        hasher.update_id(self.id.as_bytes());
        hasher.update_id(self.creator.as_bytes());
        hasher.update_bytes(&self.claim_text_hash);
        hasher.update_i64(self.deadline);
        hasher.update_id(self.stake_token.as_bytes());
        hasher.update_str(&self.category);
        hasher.update_str(&self.subcategory);
        hasher.update_i64(self.created_at);
        hasher.update_u8(self.status as u8);

        match self.winner {
            Some(side) => {
                hasher.update_bool(true);
                hasher.update_u8(side as u8);
            }
            None => hasher.update_bool(false),
        }
        hash_resolution(&mut hasher, self.resolution.as_ref());
        hash_resolution(&mut hasher, self.escalated_resolution.as_ref());
        hasher.update_u8(self.dispute_reentries);

        for side in Side::ALL {
            let ledger = self.pool.side(side);
            hasher.update_u32(ledger.len() as u32);
            for (i, (bettor, stake)) in ledger.bettors().iter().zip(ledger.stakes()).enumerate() {
                hasher.update_id(bettor.as_bytes());
                hasher.update_u64(*stake);
                hasher.update_bool(ledger.is_distributed(i));
            }
            hasher.update_u64(ledger.total());
            hasher.update_u64(ledger.withdrawn());
        }

        hasher.finalize()
    }
}

fn hash_resolution(hasher: &mut StateHasher, resolution: Option<&Resolution>) {
    match resolution {
        Some(r) => {
            hasher.update_bool(true);
            hasher.update_bool(r.verdict);
            hasher.update_u8(r.confidence);
            hasher.update_u8(r.method as u8);
            hasher.update_id(r.resolver.as_bytes());
            hasher.update_i64(r.timestamp);
        }
        None => hasher.update_bool(false),
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::account::NATIVE_STAKE_TOKEN;
    use crate::protocol::resolution::ResolutionMethod;
    use proptest::prelude::*;

    const CREATOR: AccountId = AccountId::new([1; 32]);
    const X: AccountId = AccountId::new([10; 32]);
    const Y: AccountId = AccountId::new([11; 32]);
    const RESOLVER: AccountId = AccountId::new([20; 32]);
    const ARBITER: AccountId = AccountId::new([21; 32]);

    const NOW: Timestamp = 1_700_000_000;
    const DEADLINE: Timestamp = NOW + 3_600;

    fn engine() -> ResolutionEngine {
        ResolutionEngine::default()
            .with_resolver(RESOLVER)
            .with_arbiter(ARBITER)
    }

    fn params(creator: AccountId, stake: u64, side: Side) -> NewClaim {
        NewClaim {
            creator,
            claim_text: "BTC closes above 100k on Friday".to_string(),
            deadline: DEADLINE,
            stake,
            side,
            category: "crypto".to_string(),
            subcategory: "btc".to_string(),
            stake_token: NATIVE_STAKE_TOKEN,
        }
    }

    fn ai(verdict: bool, confidence: u8) -> VerdictProposal {
        VerdictProposal { verdict, confidence, method: ResolutionMethod::Ai, resolver: RESOLVER }
    }

    fn human(verdict: bool) -> VerdictProposal {
        VerdictProposal { verdict, confidence: 100, method: ResolutionMethod::Human, resolver: ARBITER }
    }

    /// X creates with 100 on A, Y joins B with 300, deadline passes.
    fn locked_xy() -> Claim {
        let mut claim = Claim::create(params(X, 100, Side::A), DEFAULT_MAX_CLAIM_TEXT_LEN, NOW).unwrap();
        claim.join_pool(Y, Side::B, 300, NOW + 10).unwrap();
        assert!(claim.lock(DEADLINE).unwrap());
        claim
    }

    #[test]
    fn test_create_validates_inputs() {
        let at_deadline = Claim::create(params(CREATOR, 1, Side::A), 200, DEADLINE);
        assert_eq!(at_deadline, Err(ProtocolError::InvalidDeadline { deadline: DEADLINE, now: DEADLINE }));

        assert_eq!(Claim::create(params(CREATOR, 0, Side::A), 200, NOW), Err(ProtocolError::InvalidStake));

        let mut blank = params(CREATOR, 1, Side::A);
        blank.claim_text = "   ".to_string();
        assert_eq!(Claim::create(blank, 200, NOW), Err(ProtocolError::EmptyClaimText));

        let mut long = params(CREATOR, 1, Side::A);
        long.claim_text = "x".repeat(201);
        assert_eq!(
            Claim::create(long, 200, NOW),
            Err(ProtocolError::ClaimTextTooLong { len: 201, max: 200 })
        );
    }

    #[test]
    fn test_create_seeds_stake_and_ids() {
        let claim = Claim::create(params(CREATOR, 50, Side::B), 200, NOW).unwrap();

        assert_eq!(claim.status(), ClaimStatus::Open);
        assert_eq!(claim.pool().total(Side::B), 50);
        assert_eq!(claim.side(Side::B).bettors(), &[CREATOR]);
        assert_eq!(claim.id(), Claim::id_for(&CREATOR, claim.claim_text()));
        assert_ne!(claim.vault(Side::A), claim.vault(Side::B));
        assert_eq!(claim.created_at(), NOW);
        assert!(claim.check_invariants());
    }

    #[test]
    fn test_join_after_deadline_while_open() {
        let mut claim = Claim::create(params(X, 100, Side::A), 200, NOW).unwrap();
        let before = claim.clone();

        assert_eq!(claim.join_pool(Y, Side::B, 300, DEADLINE), Err(ProtocolError::ClaimLocked));
        assert_eq!(claim.status(), ClaimStatus::Open);
        assert_eq!(claim, before);
    }

    #[test]
    fn test_join_zero_amount() {
        let mut claim = Claim::create(params(X, 100, Side::A), 200, NOW).unwrap();
        assert_eq!(claim.join_pool(Y, Side::B, 0, NOW), Err(ProtocolError::InvalidAmount));
    }

    #[test]
    fn test_lock_rules() {
        let mut claim = Claim::create(params(X, 100, Side::A), 200, NOW).unwrap();
        assert_eq!(
            claim.lock(DEADLINE - 1),
            Err(ProtocolError::DeadlineNotReached { deadline: DEADLINE, now: DEADLINE - 1 })
        );
        assert_eq!(claim.lock(DEADLINE), Ok(true));
        assert_eq!(claim.lock(DEADLINE + 5), Ok(false));
        assert_eq!(claim.join_pool(Y, Side::B, 1, NOW), Err(ProtocolError::ClaimLocked));
    }

    #[test]
    fn test_resolved_only_via_resolving() {
        let engine = engine();
        let mut claim = Claim::create(params(X, 100, Side::A), 200, NOW).unwrap();

        assert!(matches!(
            claim.apply_resolution(&engine, &ai(true, 99), NOW),
            Err(ProtocolError::InvalidTransition { from: ClaimStatus::Open, .. })
        ));
        assert!(matches!(
            claim.request_resolution(),
            Err(ProtocolError::InvalidTransition { from: ClaimStatus::Open, .. })
        ));

        claim.lock(DEADLINE).unwrap();
        assert!(matches!(
            claim.apply_resolution(&engine, &ai(true, 99), DEADLINE),
            Err(ProtocolError::InvalidTransition { from: ClaimStatus::Locked, .. })
        ));
    }

    #[test]
    fn test_scenario_confident_ai_pays_winner() {
        let engine = engine();
        let mut claim = locked_xy();

        claim.request_resolution().unwrap();
        let outcome = claim.apply_resolution(&engine, &ai(true, 90), DEADLINE + 1).unwrap();
        assert_eq!(outcome, ResolutionOutcome::Resolved { winner: Side::A });
        assert!(claim.check_invariants());

        let receipt = claim.claim_payout(&X).unwrap();
        assert_eq!(receipt.amount, 400);
        assert_eq!(claim.claim_payout(&Y), Err(ProtocolError::NotAWinner));
        assert_eq!(claim.claim_payout(&X), Err(ProtocolError::AlreadyPaid));
        assert!(claim.check_invariants());
    }

    #[test]
    fn test_scenario_dispute_then_human() {
        let engine = engine();
        let mut claim = locked_xy();

        claim.request_resolution().unwrap();
        let outcome = claim.apply_resolution(&engine, &ai(true, 60), DEADLINE + 1).unwrap();
        assert_eq!(outcome, ResolutionOutcome::Disputed);
        assert_eq!(claim.status(), ClaimStatus::Disputed);
        assert_eq!(claim.winner(), None);
        assert_eq!(claim.claim_payout(&X), Err(ProtocolError::NotResolved));
        assert!(claim.check_invariants());

        assert_eq!(claim.request_resolution(), Ok(true));
        assert_eq!(
            claim.apply_resolution(&engine, &ai(true, 99), DEADLINE + 2),
            Err(ProtocolError::HumanVerdictRequired)
        );

        let outcome = claim.apply_resolution(&engine, &human(false), DEADLINE + 3).unwrap();
        assert_eq!(outcome, ResolutionOutcome::Resolved { winner: Side::B });
        assert_eq!(claim.escalated_resolution().map(|r| r.confidence), Some(60));
        assert_eq!(claim.resolution().map(|r| r.method), Some(ResolutionMethod::Human));
        assert!(claim.check_invariants());

        assert_eq!(claim.claim_payout(&Y).unwrap().amount, 400);
        assert_eq!(claim.claim_payout(&X), Err(ProtocolError::NotAWinner));
    }

    #[test]
    fn test_dispute_reentry_limit() {
        let engine = engine();
        let mut claim = locked_xy();
        claim.request_resolution().unwrap();
        claim.apply_resolution(&engine, &ai(true, 10), DEADLINE).unwrap();
        claim.request_resolution().unwrap();

        // Only reachable by forcing the status back; re-entry count is what matters.
        claim.status = ClaimStatus::Disputed;
        assert_eq!(claim.request_resolution(), Err(ProtocolError::DisputeLimitReached));
    }

    #[test]
    fn test_resolved_rejects_further_transitions() {
        let engine = engine();
        let mut claim = locked_xy();
        claim.request_resolution().unwrap();
        claim.apply_resolution(&engine, &ai(false, 85), DEADLINE).unwrap();

        assert!(matches!(
            claim.request_resolution(),
            Err(ProtocolError::InvalidTransition { from: ClaimStatus::Resolved, .. })
        ));
        assert_eq!(claim.lock(DEADLINE + 1), Ok(false));
        assert_eq!(claim.status(), ClaimStatus::Resolved);
    }

    #[test]
    fn test_payout_from_stranger() {
        let engine = engine();
        let mut claim = locked_xy();
        claim.request_resolution().unwrap();
        claim.apply_resolution(&engine, &ai(true, 90), DEADLINE).unwrap();

        assert_eq!(claim.claim_payout(&CREATOR), Err(ProtocolError::AuthorityMismatch));
    }

    #[test]
    fn test_refund_when_winner_unbacked() {
        let engine = engine();
        let mut claim = Claim::create(params(X, 100, Side::B), 200, NOW).unwrap();
        claim.join_pool(Y, Side::B, 50, NOW).unwrap();
        claim.lock(DEADLINE).unwrap();
        claim.request_resolution().unwrap();
        claim.apply_resolution(&engine, &ai(true, 95), DEADLINE).unwrap();

        let settlement = claim.settlement().unwrap();
        assert!(settlement.refund);
        assert_eq!(claim.claim_payout(&X).unwrap().amount, 100);
        assert_eq!(claim.claim_payout(&Y).unwrap().amount, 50);
    }

    #[test]
    fn test_state_hash_tracks_changes() {
        let mut claim = Claim::create(params(X, 100, Side::A), 200, NOW).unwrap();
        let h1 = claim.compute_hash();
        assert_eq!(h1, claim.clone().compute_hash());

        claim.join_pool(Y, Side::B, 1, NOW).unwrap();
        assert_ne!(claim.compute_hash(), h1);
    }

    #[test]
    fn test_is_due() {
        let mut claim = Claim::create(params(X, 100, Side::A), 200, NOW).unwrap();
        assert!(!claim.is_due(NOW));
        assert!(claim.is_due(DEADLINE));
        claim.lock(DEADLINE).unwrap();
        assert!(claim.is_due(NOW));
    }

    #[derive(Clone, Debug)]
    enum Step {
        Join { bettor: u8, on_a: bool, amount: u64 },
        Lock,
        Request,
        Apply { verdict: bool, confidence: u8, human: bool, registered: bool },
        Payout { bettor: u8 },
    }

    fn bettor(n: u8) -> AccountId {
        [X, Y, CREATOR, AccountId::new([30; 32])][n as usize % 4]
    }

    fn step() -> impl Strategy<Value = Step> {
        prop_oneof![
            (0u8..4, any::<bool>(), 0u64..1_000)
                .prop_map(|(bettor, on_a, amount)| Step::Join { bettor, on_a, amount }),
            Just(Step::Lock),
            Just(Step::Request),
            (any::<bool>(), 0u8..=110, any::<bool>(), prop::bool::weighted(0.9)).prop_map(
                |(verdict, confidence, human, registered)| Step::Apply { verdict, confidence, human, registered }
            ),
            (0u8..4).prop_map(|bettor| Step::Payout { bettor }),
        ]
    }

    fn run(claim: &mut Claim, engine: &ResolutionEngine, step: &Step, now: Timestamp) -> ProtocolResult<()> {
        match *step {
            Step::Join { bettor: who, on_a, amount } => {
                let side = if on_a { Side::A } else { Side::B };
                claim.join_pool(bettor(who), side, amount, now).map(|_| ())
            }
            Step::Lock => claim.lock(now).map(|_| ()),
            Step::Request => claim.request_resolution().map(|_| ()),
            Step::Apply { verdict, confidence, human, registered } => {
                let (method, resolver) = match (human, registered) {
                    (true, true) => (ResolutionMethod::Human, ARBITER),
                    (false, true) => (ResolutionMethod::Ai, RESOLVER),
                    (true, false) => (ResolutionMethod::Human, RESOLVER),
                    (false, false) => (ResolutionMethod::Ai, Y),
                };
                let proposal = VerdictProposal { verdict, confidence, method, resolver };
                claim.apply_resolution(engine, &proposal, now).map(|_| ())
            }
            Step::Payout { bettor: who } => claim.claim_payout(&bettor(who)).map(|_| ()),
        }
    }

    proptest! {
        #[test]
        fn prop_status_moves_forward_only(
            steps in prop::collection::vec((step(), 0i64..7_200), 1..48)
        ) {
            let engine = engine();
            let mut claim = Claim::create(params(X, 100, Side::A), 200, NOW).unwrap();
            let mut left_open = false;

            for (step, offset) in &steps {
                let before = claim.clone();
                let result = run(&mut claim, &engine, step, NOW + offset);

                if result.is_err() {
                    prop_assert_eq!(&claim, &before);
                }
                prop_assert!(claim.check_invariants(), "invariants broken after {:?}", step);

                let (from, to) = (before.status(), claim.status());
                left_open |= to != ClaimStatus::Open;
                if left_open {
                    prop_assert_ne!(to, ClaimStatus::Open);
                }
                if to == ClaimStatus::Resolved && from != ClaimStatus::Resolved {
                    prop_assert_eq!(from, ClaimStatus::Resolving);
                }
                if from == ClaimStatus::Resolved {
                    prop_assert_eq!(to, ClaimStatus::Resolved);
                    prop_assert_eq!(claim.winner(), before.winner());
                }
            }
        }
    }

    #[test]
    fn test_resolving_invariant_tracks_reentry() {
        let engine = engine();
        let mut claim = locked_xy();

        claim.request_resolution().unwrap();
        assert!(claim.resolution().is_none());
        assert!(claim.check_invariants());

        claim.apply_resolution(&engine, &ai(true, 40), DEADLINE).unwrap();
        claim.request_resolution().unwrap();
        assert!(claim.resolution().is_some());
        assert!(claim.check_invariants());
    }

    #[test]
    fn test_bincode_roundtrip() {
        let claim = locked_xy();
        let bytes = bincode::serialize(&claim).unwrap();
        let back: Claim = bincode::deserialize(&bytes).unwrap();
        assert_eq!(back, claim);
        assert_eq!(back.compute_hash(), claim.compute_hash());
    }
}
