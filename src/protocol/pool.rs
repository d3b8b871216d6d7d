//! Pool Accounting
//!
//! Two index-aligned stake ledgers, one per side. Totals are reconciled on
//! every append and every payout is recomputed from the recorded stake
//! sequence, so a bettor's contribution is never forgotten.
//!
//! ## Payout arithmetic
//!
//! Winners get their own stake back plus a pro-rata share of the losing
//! pool. Shares are cut from the cumulative prefix of winning stakes:
//!
//! ```text
//! share_i = floor(L * C_i / W) - floor(L * C_{i-1} / W)
//! ```
//!
//! which telescopes to exactly `L`, so the payouts of a settled pool sum to
//! `W + L` with no rounding dust left in either vault.

use std::fmt;
use serde::{Serialize, Deserialize};

use crate::core::account::AccountId;
use crate::protocol::error::{ProtocolError, ProtocolResult};

// =============================================================================
// SIDE
// =============================================================================

/// One of the two opposing positions on a claim.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum Side {
    /// The claim will turn out true.
    A = 0,
    /// The claim will turn out false.
    B = 1,
}

impl Side {
    /// Both sides in ledger order.
    pub const ALL: [Side; 2] = [Side::A, Side::B];

    /// The opposing side.
    pub fn other(self) -> Side {
        match self {
            Side::A => Side::B,
            Side::B => Side::A,
        }
    }

    /// Side backed by a verdict (`true` means A won).
    pub fn from_verdict(verdict: bool) -> Side {
        if verdict { Side::A } else { Side::B }
    }

    /// Get side from wire index (0-1).
    pub fn from_index(index: u8) -> Option<Side> {
        match index {
            0 => Some(Side::A),
            1 => Some(Side::B),
            _ => None,
        }
    }

    /// Seed tag used for vault derivation.
    pub fn tag(self) -> &'static [u8] {
        match self {
            Side::A => b"A",
            Side::B => b"B",
        }
    }
}

// =============================================================================
// SIDE POOL
// =============================================================================

/// Stakes on one side of a claim.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SidePool {
    bettors: Vec<AccountId>,
    stakes: Vec<u64>,
    distributed: Vec<bool>,
    total: u64,
    withdrawn: u64,
}

impl SidePool {
    /// Bettors in stake order (repeat bettors appear once per entry).
    pub fn bettors(&self) -> &[AccountId] {
        &self.bettors
    }

    /// Stakes, index-aligned with `bettors`.
    pub fn stakes(&self) -> &[u64] {
        &self.stakes
    }

    /// Recorded total of this side's vault.
    pub fn total(&self) -> u64 {
        self.total
    }

    /// Amount debited from this side's vault by payouts so far.
    pub fn withdrawn(&self) -> u64 {
        self.withdrawn
    }

    /// Number of stake entries.
    pub fn len(&self) -> usize {
        self.stakes.len()
    }

    /// True when nobody staked this side.
    pub fn is_empty(&self) -> bool {
        self.stakes.is_empty()
    }

    /// Whether entry `index` has been paid out.
    pub fn is_distributed(&self, index: usize) -> bool {
        self.distributed.get(index).copied().unwrap_or(false)
    }

    /// Whether `account` holds any entry on this side.
    pub fn has_bettor(&self, account: &AccountId) -> bool {
        self.bettors.contains(account)
    }

    /// Indices of every entry owned by `account`.
    pub fn entries_of<'a>(&'a self, account: &'a AccountId) -> impl Iterator<Item = usize> + 'a {
        self.bettors
            .iter()
            .enumerate()
            .filter(move |(_, b)| *b == account)
            .map(|(i, _)| i)
    }

    /// Sum of the stake sequence, `None` on overflow.
    pub fn reconciled_total(&self) -> Option<u64> {
        self.stakes.iter().try_fold(0u64, |acc, s| acc.checked_add(*s))
    }

    /// Check the side's own invariants.
    pub fn is_consistent(&self) -> bool {
        self.bettors.len() == self.stakes.len()
            && self.stakes.len() == self.distributed.len()
            && self.reconciled_total() == Some(self.total)
            && self.withdrawn <= self.total
    }

    /// Append a stake entry and return its index.
    fn append(&mut self, bettor: AccountId, amount: u64) -> ProtocolResult<usize> {
        let total = self.total
            .checked_add(amount)
            .ok_or(ProtocolError::ArithmeticOverflow)?;

        self.bettors.push(bettor);
        self.stakes.push(amount);
        self.distributed.push(false);
        self.total = total;
        Ok(self.stakes.len() - 1)
    }

    /// Room left in the vault.
    fn available(&self) -> u64 {
        self.total - self.withdrawn
    }
}

// =============================================================================
// ODDS
// =============================================================================

/// Display ratio `(A + B) / side total`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Odds {
    /// Combined pool.
    pub pool_total: u128,
    /// This side's total (never zero).
    pub side_total: u64,
}

impl Odds {
    /// Ratio as a float, for presentation only.
    pub fn as_f64(&self) -> f64 {
        self.pool_total as f64 / self.side_total as f64
    }
}

impl fmt::Display for Odds {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.2}x", self.as_f64())
    }
}

// =============================================================================
// SETTLEMENT
// =============================================================================

/// Computed distribution of a resolved pool.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Settlement {
    /// Side whose entries receive funds.
    pub paying_side: Side,
    /// Nobody backed the winner, so the other side is refunded.
    pub refund: bool,
    /// Amount owed per entry of `paying_side`, index-aligned.
    pub amounts: Vec<u64>,
}

impl Settlement {
    /// Sum of every amount owed.
    pub fn total(&self) -> u128 {
        self.amounts.iter().map(|a| *a as u128).sum()
    }
}

/// Result of one successful payout.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PayoutReceipt {
    /// Account paid.
    pub account: AccountId,
    /// Side whose entries were paid.
    pub side: Side,
    /// Entry indices marked distributed by this payout.
    pub entries: Vec<usize>,
    /// Total amount paid.
    pub amount: u64,
    /// Debited from the A vault.
    pub from_side_a: u64,
    /// Debited from the B vault.
    pub from_side_b: u64,
    /// Whether this was a refund of an unbacked winner.
    pub refund: bool,
}

// =============================================================================
// POOL
// =============================================================================

/// Both stake ledgers of a claim.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pool {
    side_a: SidePool,
    side_b: SidePool,
}

impl Pool {
    /// Create an empty pool.
    pub fn new() -> Self {
        Self::default()
    }

    /// Get one side's ledger.
    pub fn side(&self, side: Side) -> &SidePool {
        match side {
            Side::A => &self.side_a,
            Side::B => &self.side_b,
        }
    }

    fn side_mut(&mut self, side: Side) -> &mut SidePool {
        match side {
            Side::A => &mut self.side_a,
            Side::B => &mut self.side_b,
        }
    }

    /// Total staked on `side`.
    #[inline]
    pub fn total(&self, side: Side) -> u64 {
        self.side(side).total
    }

    /// Combined total of both vaults.
    pub fn grand_total(&self) -> u128 {
        self.side_a.total as u128 + self.side_b.total as u128
    }

    /// Append a wager to `side`.
    ///
    /// The combined pool must stay representable as a `u64`, which bounds
    /// every payout computed later.
    pub fn stake(&mut self, side: Side, bettor: AccountId, amount: u64) -> ProtocolResult<usize> {
        if amount == 0 {
            return Err(ProtocolError::InvalidAmount);
        }
        self.total(Side::A)
            .checked_add(self.total(Side::B))
            .and_then(|t| t.checked_add(amount))
            .ok_or(ProtocolError::ArithmeticOverflow)?;

        self.side_mut(side).append(bettor, amount)
    }

    /// Display odds for `side`, `None` when nobody staked it.
    pub fn odds(&self, side: Side) -> Option<Odds> {
        let side_total = self.total(side);
        if side_total == 0 {
            return None;
        }
        Some(Odds {
            pool_total: self.grand_total(),
            side_total,
        })
    }

    /// Estimated payout for `stake` on `side` if that side wins.
    ///
    /// `stake + stake * losing / winning`, floored. `None` when the side is
    /// empty.
    pub fn quote(&self, side: Side, stake: u64) -> Option<u64> {
        let winning = self.total(side) as u128;
        if winning == 0 {
            return None;
        }
        let losing = self.total(side.other()) as u128;
        let amount = stake as u128 + stake as u128 * losing / winning;
        Some(u64::try_from(amount).unwrap_or(u64::MAX))
    }

    /// Side that gets paid when `winner` wins.
    pub fn paying_side(&self, winner: Side) -> Side {
        if self.total(winner) == 0 {
            winner.other()
        } else {
            winner
        }
    }

    /// Full distribution when `winner` wins.
    pub fn settlement(&self, winner: Side) -> Settlement {
        let paying_side = self.paying_side(winner);
        let ledger = self.side(paying_side);

        if paying_side != winner {
            return Settlement {
                paying_side,
                refund: true,
                amounts: ledger.stakes.clone(),
            };
        }

        let winning = ledger.total as u128;
        let losing = self.total(winner.other()) as u128;

        let mut amounts = Vec::with_capacity(ledger.len());
        let mut prefix: u128 = 0;
        let mut cut_so_far: u128 = 0;
        for stake in &ledger.stakes {
            prefix += *stake as u128;
            let cut = losing * prefix / winning;
            let share = cut - cut_so_far;
            cut_so_far = cut;
            // Bounded by the grand total, which `stake()` keeps within u64.
            amounts.push((*stake as u128 + share) as u64);
        }

        Settlement {
            paying_side,
            refund: false,
            amounts,
        }
    }

    /// Pay every undistributed entry `account` holds on the paying side.
    ///
    /// Caller must have checked that the claim is resolved.
    pub(crate) fn pay_out(&mut self, winner: Side, account: &AccountId) -> ProtocolResult<PayoutReceipt> {
        if !self.side_a.has_bettor(account) && !self.side_b.has_bettor(account) {
            return Err(ProtocolError::AuthorityMismatch);
        }

        let settlement = self.settlement(winner);
        let paying = settlement.paying_side;
        let ledger = self.side(paying);

        let owned: Vec<usize> = ledger.entries_of(account).collect();
        if owned.is_empty() {
            return Err(ProtocolError::NotAWinner);
        }

        let pending: Vec<usize> = owned
            .into_iter()
            .filter(|i| !ledger.is_distributed(*i))
            .collect();
        if pending.is_empty() {
            return Err(ProtocolError::AlreadyPaid);
        }

        let mut own_vault: u64 = 0;
        let mut other_vault: u64 = 0;
        for &i in &pending {
            let stake = ledger.stakes[i];
            let amount = settlement.amounts[i];
            own_vault = own_vault.checked_add(stake).ok_or(ProtocolError::ArithmeticOverflow)?;
            other_vault = other_vault
                .checked_add(amount - stake)
                .ok_or(ProtocolError::ArithmeticOverflow)?;
        }

        if own_vault > self.side(paying).available() || other_vault > self.side(paying.other()).available() {
            return Err(ProtocolError::VaultExhausted);
        }

        let amount = own_vault
            .checked_add(other_vault)
            .ok_or(ProtocolError::ArithmeticOverflow)?;

        // All checks passed; mutate.
        {
            let ledger = self.side_mut(paying);
            ledger.withdrawn += own_vault;
            for &i in &pending {
                ledger.distributed[i] = true;
            }
        }
        self.side_mut(paying.other()).withdrawn += other_vault;

        let (from_side_a, from_side_b) = match paying {
            Side::A => (own_vault, other_vault),
            Side::B => (other_vault, own_vault),
        };

        Ok(PayoutReceipt {
            account: *account,
            side: paying,
            entries: pending,
            amount,
            from_side_a,
            from_side_b,
            refund: settlement.refund,
        })
    }

    /// Check both ledgers' invariants.
    pub fn is_consistent(&self) -> bool {
        self.side_a.is_consistent() && self.side_b.is_consistent()
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn acct(n: u8) -> AccountId {
        AccountId::new([n; 32])
    }

    #[test]
    fn test_side_helpers() {
        assert_eq!(Side::A.other(), Side::B);
        assert_eq!(Side::from_verdict(true), Side::A);
        assert_eq!(Side::from_verdict(false), Side::B);
        assert_eq!(Side::from_index(1), Some(Side::B));
        assert_eq!(Side::from_index(2), None);
    }

    #[test]
    fn test_stake_appends_and_totals() {
        let mut pool = Pool::new();
        assert_eq!(pool.stake(Side::A, acct(1), 100).unwrap(), 0);
        assert_eq!(pool.stake(Side::A, acct(1), 50).unwrap(), 1);
        assert_eq!(pool.stake(Side::B, acct(2), 300).unwrap(), 0);

        assert_eq!(pool.total(Side::A), 150);
        assert_eq!(pool.total(Side::B), 300);
        assert_eq!(pool.side(Side::A).bettors(), &[acct(1), acct(1)]);
        assert!(pool.is_consistent());
    }

    #[test]
    fn test_zero_amount_rejected() {
        let mut pool = Pool::new();
        assert_eq!(pool.stake(Side::A, acct(1), 0), Err(ProtocolError::InvalidAmount));
        assert!(pool.side(Side::A).is_empty());
    }

    #[test]
    fn test_overflow_rejected_without_mutation() {
        let mut pool = Pool::new();
        pool.stake(Side::A, acct(1), u64::MAX - 10).unwrap();
        let before = pool.clone();
        assert_eq!(pool.stake(Side::B, acct(2), 11), Err(ProtocolError::ArithmeticOverflow));
        assert_eq!(pool, before);
    }

    #[test]
    fn test_odds() {
        let mut pool = Pool::new();
        assert!(pool.odds(Side::A).is_none());

        pool.stake(Side::A, acct(1), 100).unwrap();
        pool.stake(Side::B, acct(2), 300).unwrap();

        assert_eq!(pool.odds(Side::A).unwrap().to_string(), "4.00x");
        assert_eq!(pool.odds(Side::B).unwrap().to_string(), "1.33x");
    }

    #[test]
    fn test_quote_matches_formula() {
        let mut pool = Pool::new();
        pool.stake(Side::A, acct(1), 100).unwrap();
        pool.stake(Side::B, acct(2), 300).unwrap();

        assert_eq!(pool.quote(Side::A, 100), Some(400));
        assert_eq!(pool.quote(Side::B, 300), Some(400));

        let empty = Pool::new();
        assert_eq!(empty.quote(Side::A, 10), None);
    }

    #[test]
    fn test_settlement_rounding_has_no_dust() {
        let mut pool = Pool::new();
        pool.stake(Side::A, acct(1), 1).unwrap();
        pool.stake(Side::A, acct(2), 1).unwrap();
        pool.stake(Side::A, acct(3), 1).unwrap();
        pool.stake(Side::B, acct(4), 100).unwrap();

        let settlement = pool.settlement(Side::A);
        assert!(!settlement.refund);
        assert_eq!(settlement.amounts, vec![34, 34, 35]);
        assert_eq!(settlement.total(), 103);
    }

    #[test]
    fn test_settlement_refunds_when_winner_unbacked() {
        let mut pool = Pool::new();
        pool.stake(Side::B, acct(1), 70).unwrap();
        pool.stake(Side::B, acct(2), 30).unwrap();

        let settlement = pool.settlement(Side::A);
        assert!(settlement.refund);
        assert_eq!(settlement.paying_side, Side::B);
        assert_eq!(settlement.amounts, vec![70, 30]);
    }

    #[test]
    fn test_pay_out_marks_entries_and_debits_vaults() {
        let mut pool = Pool::new();
        pool.stake(Side::A, acct(1), 100).unwrap();
        pool.stake(Side::B, acct(2), 300).unwrap();

        let receipt = pool.pay_out(Side::A, &acct(1)).unwrap();
        assert_eq!(receipt.amount, 400);
        assert_eq!(receipt.from_side_a, 100);
        assert_eq!(receipt.from_side_b, 300);
        assert_eq!(receipt.entries, vec![0]);
        assert!(pool.side(Side::A).is_distributed(0));
        assert_eq!(pool.side(Side::B).withdrawn(), 300);
        assert!(pool.is_consistent());

        assert_eq!(pool.pay_out(Side::A, &acct(1)), Err(ProtocolError::AlreadyPaid));
        assert_eq!(pool.pay_out(Side::A, &acct(2)), Err(ProtocolError::NotAWinner));
        assert_eq!(pool.pay_out(Side::A, &acct(9)), Err(ProtocolError::AuthorityMismatch));
    }

    #[test]
    fn test_repeat_bettor_paid_all_entries_once() {
        let mut pool = Pool::new();
        pool.stake(Side::A, acct(1), 100).unwrap();
        pool.stake(Side::A, acct(3), 100).unwrap();
        pool.stake(Side::A, acct(1), 200).unwrap();
        pool.stake(Side::B, acct(2), 400).unwrap();

        let receipt = pool.pay_out(Side::A, &acct(1)).unwrap();
        assert_eq!(receipt.entries, vec![0, 2]);
        assert_eq!(receipt.amount, 600);

        let other = pool.pay_out(Side::A, &acct(3)).unwrap();
        assert_eq!(other.amount, 200);
        assert_eq!(pool.side(Side::A).withdrawn(), pool.total(Side::A));
        assert_eq!(pool.side(Side::B).withdrawn(), pool.total(Side::B));
    }

    #[test]
    fn test_refund_pays_from_own_vault() {
        let mut pool = Pool::new();
        pool.stake(Side::B, acct(2), 300).unwrap();

        let receipt = pool.pay_out(Side::A, &acct(2)).unwrap();
        assert!(receipt.refund);
        assert_eq!(receipt.amount, 300);
        assert_eq!(receipt.from_side_b, 300);
        assert_eq!(receipt.from_side_a, 0);
    }

    proptest! {
        #[test]
        fn prop_pool_totals_match_stakes(
            wagers in prop::collection::vec((any::<bool>(), 0u8..8, 0u64..1_000_000), 0..64)
        ) {
            let mut pool = Pool::new();
            for (on_a, who, amount) in wagers {
                let side = if on_a { Side::A } else { Side::B };
                let _ = pool.stake(side, acct(who), amount);
                prop_assert!(pool.is_consistent());
            }
            for side in Side::ALL {
                let ledger = pool.side(side);
                prop_assert_eq!(ledger.bettors().len(), ledger.stakes().len());
                prop_assert_eq!(Some(ledger.total()), ledger.reconciled_total());
            }
        }

        #[test]
        fn prop_settlement_conserves_value(
            winning in prop::collection::vec(1u64..1_000_000_000, 1..32),
            losing in prop::collection::vec(1u64..1_000_000_000, 0..32),
        ) {
            let mut pool = Pool::new();
            for (i, s) in winning.iter().enumerate() {
                pool.stake(Side::A, acct(i as u8), *s).unwrap();
            }
            for (i, s) in losing.iter().enumerate() {
                pool.stake(Side::B, acct(100 + i as u8), *s).unwrap();
            }

            let settlement = pool.settlement(Side::A);
            prop_assert_eq!(settlement.total(), pool.grand_total());
            for (amount, stake) in settlement.amounts.iter().zip(pool.side(Side::A).stakes()) {
                prop_assert!(amount >= stake);
            }
        }
    }
}
