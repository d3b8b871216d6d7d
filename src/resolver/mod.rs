//! Resolver Task
//!
//! Periodically finds claims whose deadline has passed, asks a
//! [`ResolutionSource`] for a verdict and submits it as an AI resolution
//! through an ordinary [`Settlement`] handle. Low-confidence verdicts end up
//! disputed and wait for a human arbiter; the task never retries them.
//!
//! A claim is worked on by at most one pass at a time.

use std::collections::BTreeSet;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use futures_util::future::join_all;
use tokio::sync::broadcast;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, error, info, warn};

use crate::authority::settlement::{Settlement, SubmitError};
use crate::authority::view::ClaimView;
use crate::core::account::{AccountId, ClaimId};
use crate::core::clock::Clock;
use crate::network::instruction::Instruction;
use crate::protocol::claim::ClaimStatus;
use crate::protocol::resolution::ResolutionMethod;
use crate::services::verdict::ResolutionSource;

/// Attempts for read operations that fail transiently.
const READ_ATTEMPTS: usize = 3;

// =============================================================================
// CONFIG
// =============================================================================

/// Resolver settings.
#[derive(Clone, Debug)]
pub struct ResolverConfig {
    /// Time between passes.
    pub poll_interval: Duration,
    /// Timeout for each webhook call.
    pub request_timeout: Duration,
    /// Verdict webhook URL. The resolver stays idle without one.
    pub verdict_webhook: Option<String>,
    /// Clarity webhook URL.
    pub clarity_webhook: Option<String>,
    /// Account the resolver submits as.
    pub account: Option<AccountId>,
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(30),
            request_timeout: Duration::from_secs(30),
            verdict_webhook: None,
            clarity_webhook: None,
            account: None,
        }
    }
}

impl ResolverConfig {
    /// Create config from environment variables.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            poll_interval: std::env::var("RESOLVER_POLL_SECS")
                .ok()
                .and_then(|v| v.parse().ok())
                .map(Duration::from_secs)
                .unwrap_or(defaults.poll_interval),
            request_timeout: std::env::var("RESOLVER_TIMEOUT_SECS")
                .ok()
                .and_then(|v| v.parse().ok())
                .map(Duration::from_secs)
                .unwrap_or(defaults.request_timeout),
            verdict_webhook: std::env::var("RESOLVER_VERDICT_WEBHOOK").ok(),
            clarity_webhook: std::env::var("CLARITY_WEBHOOK").ok(),
            account: std::env::var("RESOLVER_ACCOUNT")
                .ok()
                .and_then(|v| AccountId::from_hex(v.trim())),
        }
    }

    /// Whether the resolver has what it needs to run.
    pub fn is_configured(&self) -> bool {
        self.verdict_webhook.is_some() && self.account.is_some()
    }
}

// =============================================================================
// REPORT
// =============================================================================

/// Outcome counts of one pass.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ResolverReport {
    /// Claims found due.
    pub due: usize,
    /// Verdicts submitted.
    pub submitted: usize,
    /// Submissions that settled the claim.
    pub resolved: usize,
    /// Submissions that escalated the claim.
    pub disputed: usize,
    /// Verdict fetch or submission failures.
    pub failed: usize,
    /// Claims already being worked on.
    pub skipped: usize,
}

impl ResolverReport {
    fn merge(&mut self, outcome: ClaimOutcome) {
        match outcome {
            ClaimOutcome::Resolved => {
                self.submitted += 1;
                self.resolved += 1;
            }
            ClaimOutcome::Disputed => {
                self.submitted += 1;
                self.disputed += 1;
            }
            ClaimOutcome::Rejected => {
                self.submitted += 1;
                self.failed += 1;
            }
            ClaimOutcome::FetchFailed => self.failed += 1,
            ClaimOutcome::Skipped => self.skipped += 1,
        }
    }
}

enum ClaimOutcome {
    Resolved,
    Disputed,
    Rejected,
    FetchFailed,
    Skipped,
}

// =============================================================================
// IN-FLIGHT GUARD
// =============================================================================

/// Removes a claim from the in-flight set when dropped.
struct InFlight {
    set: Arc<Mutex<BTreeSet<ClaimId>>>,
    id: ClaimId,
}

impl InFlight {
    fn acquire(set: &Arc<Mutex<BTreeSet<ClaimId>>>, id: ClaimId) -> Option<Self> {
        let mut guard = set.lock().ok()?;
        if !guard.insert(id) {
            return None;
        }
        Some(Self { set: set.clone(), id })
    }
}

impl Drop for InFlight {
    fn drop(&mut self) {
        if let Ok(mut set) = self.set.lock() {
            set.remove(&self.id);
        }
    }
}

// =============================================================================
// TASK
// =============================================================================

/// Scheduled verdict submitter.
pub struct ResolverTask {
    settlement: Arc<dyn Settlement>,
    source: Arc<dyn ResolutionSource>,
    clock: Arc<dyn Clock>,
    in_flight: Arc<Mutex<BTreeSet<ClaimId>>>,
}

impl ResolverTask {
    /// Create a task submitting through `settlement`.
    pub fn new(settlement: Arc<dyn Settlement>, source: Arc<dyn ResolutionSource>, clock: Arc<dyn Clock>) -> Self {
        Self {
            settlement,
            source,
            clock,
            in_flight: Arc::new(Mutex::new(BTreeSet::new())),
        }
    }

    /// Run one pass over every due claim.
    pub async fn run_once(&self) -> ResolverReport {
        let mut report = ResolverReport::default();

        let views = match self.list_claims().await {
            Ok(views) => views,
            Err(e) => {
                error!("Resolver could not list claims: {}", e);
                report.failed += 1;
                return report;
            }
        };

        let now = self.clock.now();
        let due: Vec<ClaimView> = views.into_iter().filter(|v| v.is_due(now)).collect();
        report.due = due.len();
        if due.is_empty() {
            debug!("No claims due");
            return report;
        }

        let outcomes = join_all(due.iter().map(|view| self.resolve_claim(view))).await;
        for outcome in outcomes {
            report.merge(outcome);
        }

        info!(
            "Resolver pass: {} due, {} resolved, {} disputed, {} failed, {} skipped",
            report.due, report.resolved, report.disputed, report.failed, report.skipped
        );
        report
    }

    /// Repeat `run_once` every `period` until shutdown.
    pub async fn run(&self, period: Duration, mut shutdown: broadcast::Receiver<()>) {
        let mut ticker = interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        info!("Resolver running as {} every {:?}", self.settlement.account().short(), period);
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    self.run_once().await;
                }
                _ = shutdown.recv() => {
                    info!("Resolver stopping");
                    break;
                }
            }
        }
    }

    async fn list_claims(&self) -> Result<Vec<ClaimView>, SubmitError> {
        let mut attempt = 1;
        loop {
            match self.settlement.claims().await {
                Err(SubmitError::Transport(e)) if e.is_transient() && attempt < READ_ATTEMPTS => {
                    warn!("Listing claims failed (attempt {}): {}", attempt, e);
                    attempt += 1;
                    tokio::time::sleep(Duration::from_millis(200 * attempt as u64)).await;
                }
                result => return result,
            }
        }
    }

    async fn resolve_claim(&self, view: &ClaimView) -> ClaimOutcome {
        let Some(_guard) = InFlight::acquire(&self.in_flight, view.id) else {
            debug!("Claim {} already in flight", view.id.short());
            return ClaimOutcome::Skipped;
        };

        let verdict = match self.source.fetch(&view.claim_text, view.deadline).await {
            Ok(v) => v,
            Err(e) => {
                warn!("Verdict fetch failed for claim {}: {}", view.id.short(), e);
                return ClaimOutcome::FetchFailed;
            }
        };

        let instruction = Instruction::SubmitResolution {
            verdict: verdict.verdict,
            confidence: verdict.confidence,
            method: ResolutionMethod::Ai,
        };

        // Submissions are not retried; the next pass sees the claim again if
        // nothing committed.
        match self.settlement.submit(Some(view.id), &instruction).await {
            Ok(receipt) => match receipt.status {
                ClaimStatus::Resolved => {
                    info!("Claim {} resolved at {}% confidence", view.id.short(), verdict.confidence);
                    ClaimOutcome::Resolved
                }
                ClaimStatus::Disputed => {
                    info!("Claim {} disputed at {}% confidence", view.id.short(), verdict.confidence);
                    ClaimOutcome::Disputed
                }
                other => {
                    warn!("Claim {} committed in unexpected status {:?}", view.id.short(), other);
                    ClaimOutcome::Rejected
                }
            },
            Err(e) => {
                warn!("Verdict for claim {} not committed: {}", view.id.short(), e);
                ClaimOutcome::Rejected
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::authority::executor::{ProtocolConfig, SettlementAuthority};
    use crate::authority::settlement::AccountHandle;
    use crate::core::clock::ManualClock;
    use crate::protocol::pool::Side;
    use crate::services::transport::TransportError;
    use crate::services::verdict::{FixedResolutionSource, SourcedVerdict};
    use async_trait::async_trait;

    const RESOLVER: AccountId = AccountId::new([20; 32]);
    const START: i64 = 10_000;
    const DEADLINE: i64 = START + 60;

    struct FailingSource;

    #[async_trait]
    impl ResolutionSource for FailingSource {
        async fn fetch(&self, _: &str, _: i64) -> Result<SourcedVerdict, TransportError> {
            Err(TransportError::Timeout)
        }
    }

    async fn setup(source: Arc<dyn ResolutionSource>) -> (ResolverTask, Arc<SettlementAuthority>, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::new(START));
        let config = ProtocolConfig { resolvers: vec![RESOLVER], ..Default::default() };
        let authority = Arc::new(SettlementAuthority::new(&config, clock.clone()));

        let creator = AccountHandle::new(authority.clone(), AccountId::new([1; 32]));
        for text in ["first claim", "second claim"] {
            let create = Instruction::CreateClaim {
                claim_text: text.to_string(),
                deadline: DEADLINE as u64,
                stake: 10,
                category: String::new(),
                subcategory: String::new(),
            };
            let receipt = creator.submit(None, &create).await.unwrap();
            let bettor = AccountHandle::new(authority.clone(), AccountId::new([2; 32]));
            bettor
                .submit(Some(receipt.claim_id), &Instruction::JoinPool { side: Side::B, amount: 30 })
                .await
                .unwrap();
        }

        let handle: Arc<dyn Settlement> = Arc::new(AccountHandle::new(authority.clone(), RESOLVER));
        let task = ResolverTask::new(handle, source, clock.clone());
        (task, authority, clock)
    }

    #[tokio::test]
    async fn test_nothing_due_before_deadline() {
        let (task, _, _) = setup(Arc::new(FixedResolutionSource::new(true, 95))).await;
        assert_eq!(task.run_once().await, ResolverReport::default());
    }

    #[tokio::test]
    async fn test_confident_verdicts_resolve() {
        let (task, authority, clock) = setup(Arc::new(FixedResolutionSource::new(true, 95))).await;
        clock.set(DEADLINE);

        let report = task.run_once().await;
        assert_eq!(report.due, 2);
        assert_eq!(report.submitted, 2);
        assert_eq!(report.resolved, 2);

        for claim in authority.claims().await {
            assert_eq!(claim.status(), ClaimStatus::Resolved);
        }

        // Second pass finds nothing left.
        assert_eq!(task.run_once().await.due, 0);
    }

    #[tokio::test]
    async fn test_low_confidence_disputes_once() {
        let (task, _, clock) = setup(Arc::new(FixedResolutionSource::new(false, 40))).await;
        clock.set(DEADLINE + 5);

        let report = task.run_once().await;
        assert_eq!(report.disputed, 2);
        assert_eq!(report.resolved, 0);

        // Disputed claims wait for a human and are not picked up again.
        assert_eq!(task.run_once().await.due, 0);
    }

    #[tokio::test]
    async fn test_fetch_failure_counted() {
        let (task, authority, clock) = setup(Arc::new(FailingSource)).await;
        clock.set(DEADLINE);

        let report = task.run_once().await;
        assert_eq!(report.failed, 2);
        assert_eq!(report.submitted, 0);
        for claim in authority.claims().await {
            assert_eq!(claim.status(), ClaimStatus::Open);
        }
    }

    #[tokio::test]
    async fn test_unregistered_resolver_rejected() {
        let clock = Arc::new(ManualClock::new(START));
        let authority = Arc::new(SettlementAuthority::new(&ProtocolConfig::default(), clock.clone()));
        let creator = AccountHandle::new(authority.clone(), AccountId::new([1; 32]));
        let create = Instruction::CreateClaim {
            claim_text: "unregistered".to_string(),
            deadline: DEADLINE as u64,
            stake: 10,
            category: String::new(),
            subcategory: String::new(),
        };
        creator.submit(None, &create).await.unwrap();

        let handle: Arc<dyn Settlement> = Arc::new(AccountHandle::new(authority, RESOLVER));
        let task = ResolverTask::new(handle, Arc::new(FixedResolutionSource::new(true, 99)), clock.clone());
        clock.set(DEADLINE);

        let report = task.run_once().await;
        assert_eq!(report.submitted, 1);
        assert_eq!(report.failed, 1);
    }

    #[test]
    fn test_in_flight_guard() {
        let set = Arc::new(Mutex::new(BTreeSet::new()));
        let id = ClaimId::new([5; 32]);

        let first = InFlight::acquire(&set, id).unwrap();
        assert!(InFlight::acquire(&set, id).is_none());
        drop(first);
        assert!(InFlight::acquire(&set, id).is_some());
    }

    #[tokio::test]
    async fn test_run_stops_on_shutdown() {
        let (task, _, _) = setup(Arc::new(FixedResolutionSource::new(true, 95))).await;
        let (tx, rx) = broadcast::channel(1);

        let handle = tokio::spawn(async move { task.run(Duration::from_millis(10), rx).await });
        tokio::time::sleep(Duration::from_millis(30)).await;
        tx.send(()).unwrap();
        tokio::time::timeout(Duration::from_secs(2), handle).await.unwrap().unwrap();
    }
}
