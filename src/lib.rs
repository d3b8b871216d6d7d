//! # Claim Wager
//!
//! Pooled yes/no wagers on natural-language claims, settled by a single
//! authority that accepts automated verdicts and escalates doubtful ones
//! to human arbiters.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                        CLAIM WAGER                           │
//! ├─────────────────────────────────────────────────────────────┤
//! │  core/           - Ids, hashing, time                        │
//! │  ├── account.rs  - Account, claim and vault ids              │
//! │  ├── hash.rs     - Domain-separated SHA-256                  │
//! │  └── clock.rs    - Clock trait (system and manual)           │
//! │                                                              │
//! │  protocol/       - Claim state machine (pure)                │
//! │  ├── claim.rs    - Create, join, lock, resolve, payout       │
//! │  ├── pool.rs     - Side totals, odds, proportional payout    │
//! │  ├── resolution.rs - Verdict authorization and escalation    │
//! │  └── events.rs   - Committed claim events                    │
//! │                                                              │
//! │  authority/      - Single writer over the claim ledger       │
//! │  ├── executor.rs - Decode, apply, commit, broadcast          │
//! │  ├── ledger.rs   - Per-claim locks and snapshots             │
//! │  └── settlement.rs - Settlement capability trait             │
//! │                                                              │
//! │  network/        - Wire codec, WebSocket server and client   │
//! │  services/       - Clarity and verdict webhooks              │
//! │  resolver/       - Periodic automated resolution             │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Conservation
//!
//! A claim's vaults only ever gain stakes until it resolves; after that
//! they only pay out, and the winners' payouts sum to exactly the pool.
//! Every rejected operation leaves the claim byte-for-byte unchanged.

#![warn(missing_docs)]
#![warn(clippy::all)]
#![deny(unsafe_code)]

pub mod core;
pub mod protocol;
pub mod authority;
pub mod network;
pub mod services;
pub mod resolver;

// Re-export commonly used types
pub use core::account::{AccountId, ClaimId, VaultId};
pub use core::clock::{Clock, ManualClock, SystemClock, Timestamp};
pub use protocol::{Claim, ClaimStatus, ProtocolError, ResolutionMethod, Side};
pub use authority::{AccountHandle, ClaimView, ProtocolConfig, Receipt, Settlement, SettlementAuthority};
pub use network::Instruction;

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
