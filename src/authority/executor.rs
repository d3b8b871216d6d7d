//! Settlement Authority
//!
//! The only component that mutates claims. Each submission is decoded,
//! routed to the claim state machine against a working copy, and committed
//! by replacement only when every step succeeded.
//!
//! `SubmitResolution` is composite: the claim is locked if still open,
//! moved to `Resolving`, and the verdict applied, all under one claim lock.
//! A committed claim is therefore never left in `Resolving`.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use serde::{Serialize, Deserialize};
use thiserror::Error;
use tokio::sync::broadcast;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::core::account::{AccountId, ClaimId, NATIVE_STAKE_TOKEN};
use crate::core::clock::{Clock, Timestamp};
use crate::authority::ledger::{ClaimLedger, LedgerError};
use crate::network::instruction::{DecodeError, Instruction};
use crate::protocol::claim::{Claim, ClaimStatus, NewClaim, ResolutionOutcome, DEFAULT_MAX_CLAIM_TEXT_LEN};
use crate::protocol::error::{ProtocolError, ProtocolResult};
use crate::protocol::events::ClaimEvent;
use crate::protocol::pool::{PayoutReceipt, Side};
use crate::protocol::resolution::{ResolutionEngine, VerdictProposal, AUTO_SETTLE_CONFIDENCE};

/// Capacity of the committed-event broadcast channel.
const EVENT_CHANNEL_CAPACITY: usize = 1024;

// =============================================================================
// CONFIG
// =============================================================================

/// Protocol limits and resolver permissions.
#[derive(Clone, Debug)]
pub struct ProtocolConfig {
    /// Minimum AI confidence that settles without a human.
    pub auto_settle_threshold: u8,
    /// Longest accepted claim text, in bytes.
    pub max_claim_text_len: usize,
    /// Accounts allowed to submit AI verdicts.
    pub resolvers: Vec<AccountId>,
    /// Accounts allowed to submit human verdicts.
    pub arbiters: Vec<AccountId>,
}

impl Default for ProtocolConfig {
    fn default() -> Self {
        Self {
            auto_settle_threshold: AUTO_SETTLE_CONFIDENCE,
            max_claim_text_len: DEFAULT_MAX_CLAIM_TEXT_LEN,
            resolvers: Vec::new(),
            arbiters: Vec::new(),
        }
    }
}

impl ProtocolConfig {
    /// Create config from environment variables.
    ///
    /// `PROTOCOL_RESOLVERS` and `PROTOCOL_ARBITERS` are comma-separated hex
    /// account ids.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            auto_settle_threshold: std::env::var("PROTOCOL_AUTO_SETTLE_THRESHOLD")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.auto_settle_threshold),
            max_claim_text_len: std::env::var("PROTOCOL_MAX_CLAIM_TEXT_LEN")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.max_claim_text_len),
            resolvers: parse_accounts(std::env::var("PROTOCOL_RESOLVERS").ok().as_deref()),
            arbiters: parse_accounts(std::env::var("PROTOCOL_ARBITERS").ok().as_deref()),
        }
    }

    /// Build the resolution engine these settings describe.
    pub fn engine(&self) -> ResolutionEngine {
        let engine = ResolutionEngine::new(self.auto_settle_threshold);
        let engine = self.resolvers.iter().fold(engine, |e, a| e.with_resolver(*a));
        self.arbiters.iter().fold(engine, |e, a| e.with_arbiter(*a))
    }
}

/// Parse a comma-separated list of hex account ids, skipping bad entries.
pub fn parse_accounts(list: Option<&str>) -> Vec<AccountId> {
    let Some(list) = list else {
        return Vec::new();
    };
    list.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .filter_map(|s| {
            let parsed = AccountId::from_hex(s);
            if parsed.is_none() {
                warn!("Ignoring malformed account id {:?}", s);
            }
            parsed
        })
        .collect()
}

// =============================================================================
// RESULTS
// =============================================================================

/// Why a submission was refused. The ledger is unchanged.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ExecutionError {
    /// Instruction bytes did not decode.
    #[error("malformed instruction: {0}")]
    Decode(#[from] DecodeError),

    /// The state machine refused the operation.
    #[error(transparent)]
    Protocol(#[from] ProtocolError),
}

/// Confirmation of a committed submission.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Receipt {
    /// Unique id of this submission.
    pub submission_id: Uuid,
    /// Claim affected.
    pub claim_id: ClaimId,
    /// Operation name.
    pub operation: String,
    /// Status after commit.
    pub status: ClaimStatus,
    /// Hex digest of the committed claim.
    pub state_hash: String,
    /// Events emitted, in order.
    pub events: Vec<ClaimEvent>,
    /// Funds released, for `ClaimPayout`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payout: Option<PayoutReceipt>,
}

/// Working result of one operation before commit.
struct Applied {
    events: Vec<ClaimEvent>,
    payout: Option<PayoutReceipt>,
}

// =============================================================================
// AUTHORITY
// =============================================================================

/// Owner of the claim ledger.
pub struct SettlementAuthority {
    ledger: ClaimLedger,
    engine: ResolutionEngine,
    clock: Arc<dyn Clock>,
    max_claim_text_len: usize,
    events: broadcast::Sender<ClaimEvent>,
    /// Commits since start.
    commits: AtomicU64,
    /// Value of `commits` covered by the last snapshot.
    saved_commits: AtomicU64,
}

impl SettlementAuthority {
    /// Create an authority with an empty ledger.
    pub fn new(config: &ProtocolConfig, clock: Arc<dyn Clock>) -> Self {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            ledger: ClaimLedger::new(),
            engine: config.engine(),
            clock,
            max_claim_text_len: config.max_claim_text_len,
            events,
            commits: AtomicU64::new(0),
            saved_commits: AtomicU64::new(0),
        }
    }

    /// Replace the ledger, e.g. with one restored from a snapshot.
    pub fn with_ledger(mut self, ledger: ClaimLedger) -> Self {
        self.ledger = ledger;
        self
    }

    /// The claim ledger.
    pub fn ledger(&self) -> &ClaimLedger {
        &self.ledger
    }

    /// Resolution rules in force.
    pub fn engine(&self) -> &ResolutionEngine {
        &self.engine
    }

    /// Current authority time.
    pub fn now(&self) -> Timestamp {
        self.clock.now()
    }

    /// Submissions committed since start.
    pub fn commit_count(&self) -> u64 {
        self.commits.load(Ordering::Acquire)
    }

    /// Receive every committed event.
    pub fn subscribe(&self) -> broadcast::Receiver<ClaimEvent> {
        self.events.subscribe()
    }

    /// Decode and execute a submission from `caller`.
    pub async fn execute(
        &self,
        caller: AccountId,
        claim_id: Option<ClaimId>,
        bytes: &[u8],
    ) -> Result<Receipt, ExecutionError> {
        let instruction = Instruction::decode(bytes).map_err(|e| {
            warn!("Rejected malformed instruction from {}: {}", caller.short(), e);
            e
        })?;
        self.execute_instruction(caller, claim_id, instruction).await
    }

    /// Execute an already decoded instruction.
    pub async fn execute_instruction(
        &self,
        caller: AccountId,
        claim_id: Option<ClaimId>,
        instruction: Instruction,
    ) -> Result<Receipt, ExecutionError> {
        let operation = instruction.name();
        let result = match instruction {
            Instruction::CreateClaim { claim_text, deadline, stake, category, subcategory } => {
                let params = NewClaim {
                    creator: caller,
                    claim_text,
                    // Deadlines past i64::MAX are simply never reached.
                    deadline: i64::try_from(deadline).unwrap_or(i64::MAX),
                    stake,
                    side: Side::A,
                    category,
                    subcategory,
                    stake_token: NATIVE_STAKE_TOKEN,
                };
                self.create(params).await
            }
            other => match claim_id {
                Some(id) => self.apply(caller, id, operation, other).await,
                None => Err(ProtocolError::MissingClaimId),
            },
        };

        match result {
            Ok(receipt) => {
                self.commits.fetch_add(1, Ordering::AcqRel);
                info!(
                    "{} committed on claim {} by {} -> {}",
                    operation,
                    receipt.claim_id.short(),
                    caller.short(),
                    receipt.status.as_str()
                );
                for event in &receipt.events {
                    debug!("Event {} on claim {}", event.label(), event.claim_id.short());
                    // No subscribers is fine.
                    let _ = self.events.send(event.clone());
                }
                Ok(receipt)
            }
            Err(e) => {
                warn!(
                    "{} rejected for {} on claim {}: {}",
                    operation,
                    caller.short(),
                    claim_id.map(|id| id.short()).unwrap_or_else(|| "-".into()),
                    e
                );
                Err(e.into())
            }
        }
    }

    // =========================================================================
    // Snapshots
    // =========================================================================

    /// Write a snapshot if anything committed since the last one.
    /// Returns whether a file was written.
    pub async fn save_snapshot(&self, path: &Path) -> Result<bool, LedgerError> {
        let seen = self.commits.load(Ordering::Acquire);
        if seen == self.saved_commits.load(Ordering::Acquire) {
            return Ok(false);
        }
        self.ledger.save(path, self.clock.now()).await?;
        self.saved_commits.store(seen, Ordering::Release);
        Ok(true)
    }

    /// Snapshot to `path` every `period` until shutdown, then once more.
    pub async fn run_snapshots(&self, path: PathBuf, period: Duration, mut shutdown: broadcast::Receiver<()>) {
        let mut ticker = interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        info!("Snapshotting to {} every {:?}", path.display(), period);
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    if let Err(e) = self.save_snapshot(&path).await {
                        error!("Snapshot to {} failed: {}", path.display(), e);
                    }
                }
                _ = shutdown.recv() => break,
            }
        }

        match self.save_snapshot(&path).await {
            Ok(_) => info!("Final snapshot written to {}", path.display()),
            Err(e) => error!("Final snapshot to {} failed: {}", path.display(), e),
        }
    }

    async fn create(&self, params: NewClaim) -> ProtocolResult<Receipt> {
        let now = self.clock.now();
        let (creator, deadline, stake, side) = (params.creator, params.deadline, params.stake, params.side);

        let claim = Claim::create(params, self.max_claim_text_len, now)?;
        let id = claim.id();
        let state_hash = hex::encode(claim.compute_hash());
        let status = claim.status();

        self.ledger.insert(claim).await?;

        Ok(Receipt {
            submission_id: Uuid::new_v4(),
            claim_id: id,
            operation: "create_claim".to_string(),
            status,
            state_hash,
            events: vec![ClaimEvent::claim_created(id, now, creator, deadline, stake, side)],
            payout: None,
        })
    }

    async fn apply(
        &self,
        caller: AccountId,
        id: ClaimId,
        operation: &'static str,
        instruction: Instruction,
    ) -> ProtocolResult<Receipt> {
        let slot = self.ledger.get(&id).await.ok_or(ProtocolError::ClaimNotFound)?;
        let mut stored = slot.lock().await;

        // Sampled under the claim lock so commit order and time order agree.
        let now = self.clock.now();
        let mut working = stored.clone();
        let applied = self.apply_to(&mut working, caller, instruction, now)?;

        debug_assert!(working.check_invariants());
        let state_hash = hex::encode(working.compute_hash());
        let status = working.status();

        #[cfg(feature = "debug-tracing")]
        debug!("Committed claim state: {:?}", working);

        *stored = working;

        Ok(Receipt {
            submission_id: Uuid::new_v4(),
            claim_id: id,
            operation: operation.to_string(),
            status,
            state_hash,
            events: applied.events,
            payout: applied.payout,
        })
    }

    fn apply_to(
        &self,
        claim: &mut Claim,
        caller: AccountId,
        instruction: Instruction,
        now: Timestamp,
    ) -> ProtocolResult<Applied> {
        let id = claim.id();
        let mut events = Vec::new();
        let mut payout = None;

        match instruction {
            Instruction::CreateClaim { .. } => return Err(ProtocolError::ClaimExists),

            Instruction::JoinPool { side, amount } => {
                claim.join_pool(caller, side, amount, now)?;
                let side_total = claim.pool().total(side);
                events.push(ClaimEvent::pool_joined(id, now, caller, side, amount, side_total));
            }

            Instruction::SubmitResolution { verdict, confidence, method } => {
                if claim.lock(now)? {
                    events.push(ClaimEvent::claim_locked(
                        id,
                        now,
                        claim.pool().total(Side::A),
                        claim.pool().total(Side::B),
                    ));
                }

                let reentry = claim.request_resolution()?;
                events.push(ClaimEvent::resolution_requested(id, now, reentry));

                let proposal = VerdictProposal { verdict, confidence, method, resolver: caller };
                match claim.apply_resolution(&self.engine, &proposal, now)? {
                    ResolutionOutcome::Resolved { winner } => {
                        events.push(ClaimEvent::claim_resolved(id, now, winner, confidence, method));
                    }
                    ResolutionOutcome::Disputed => {
                        events.push(ClaimEvent::claim_disputed(id, now, confidence));
                    }
                }
            }

            Instruction::ClaimPayout => {
                let receipt = claim.claim_payout(&caller)?;
                events.push(ClaimEvent::payout_claimed(id, now, caller, receipt.amount, receipt.refund));
                payout = Some(receipt);
            }
        }

        Ok(Applied { events, payout })
    }

    // =========================================================================
    // Reads
    // =========================================================================

    /// Copy of one claim.
    pub async fn claim(&self, id: &ClaimId) -> Option<Claim> {
        let slot = self.ledger.get(id).await?;
        let claim = slot.lock().await.clone();
        Some(claim)
    }

    /// Copy of every claim, in id order.
    pub async fn claims(&self) -> Vec<Claim> {
        self.ledger.snapshot().await
    }

    /// Claims awaiting a verdict at `now`.
    pub async fn due_claims(&self, now: Timestamp) -> Vec<ClaimId> {
        self.ledger
            .snapshot()
            .await
            .into_iter()
            .filter(|c| c.is_due(now))
            .map(|c| c.id())
            .collect()
    }
}

// =============================================================================
// TESTS
// =============================================================================
