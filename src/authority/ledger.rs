//! Claim Ledger
//!
//! One authoritative record per claim, each behind its own mutex so
//! distinct claims are mutated concurrently. The map itself only takes a
//! write lock to insert.
//!
//! The ledger can be written to and restored from a bincode snapshot.
//! Restored claims are checked against the claim invariants before they
//! are accepted.

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;
use serde::{Serialize, Deserialize};
use thiserror::Error;
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info};

use crate::core::account::ClaimId;
use crate::core::clock::Timestamp;
use crate::protocol::claim::Claim;
use crate::protocol::error::{ProtocolError, ProtocolResult};

/// Snapshot format version.
pub const SNAPSHOT_VERSION: u32 = 1;

/// Errors from snapshot persistence.
#[derive(Debug, Error)]
pub enum LedgerError {
    /// Reading or writing the snapshot file failed.
    #[error("snapshot I/O failed: {0}")]
    Io(#[from] std::io::Error),

    /// Snapshot bytes could not be encoded or decoded.
    #[error("snapshot encoding failed: {0}")]
    Encoding(#[from] bincode::Error),

    /// Snapshot written by an incompatible version.
    #[error("unsupported snapshot version {0}")]
    UnsupportedVersion(u32),

    /// A restored claim violates its invariants.
    #[error("claim {0} failed integrity check")]
    Corrupt(ClaimId),

    /// The same claim appears twice in a snapshot.
    #[error("claim {0} appears more than once")]
    Duplicate(ClaimId),
}

#[derive(Serialize, Deserialize)]
struct Snapshot {
    version: u32,
    saved_at: Timestamp,
    claims: Vec<Claim>,
}

/// Shared handle to one claim's authoritative record.
pub type ClaimSlot = Arc<Mutex<Claim>>;

/// In-memory store of every claim.
#[derive(Default)]
pub struct ClaimLedger {
    claims: RwLock<BTreeMap<ClaimId, ClaimSlot>>,
}

impl ClaimLedger {
    /// Create an empty ledger.
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from restored claims, rejecting duplicates and broken records.
    pub fn from_claims(claims: Vec<Claim>) -> Result<Self, LedgerError> {
        let mut map = BTreeMap::new();
        for claim in claims {
            if !claim.check_invariants() {
                return Err(LedgerError::Corrupt(claim.id()));
            }
            let id = claim.id();
            if map.insert(id, Arc::new(Mutex::new(claim))).is_some() {
                return Err(LedgerError::Duplicate(id));
            }
        }
        Ok(Self { claims: RwLock::new(map) })
    }

    /// Get a claim's slot.
    pub async fn get(&self, id: &ClaimId) -> Option<ClaimSlot> {
        self.claims.read().await.get(id).cloned()
    }

    /// Insert a newly created claim.
    pub async fn insert(&self, claim: Claim) -> ProtocolResult<ClaimSlot> {
        let mut claims = self.claims.write().await;
        let id = claim.id();
        if claims.contains_key(&id) {
            return Err(ProtocolError::ClaimExists);
        }
        let slot = Arc::new(Mutex::new(claim));
        claims.insert(id, slot.clone());
        Ok(slot)
    }

    /// Whether a claim exists.
    pub async fn contains(&self, id: &ClaimId) -> bool {
        self.claims.read().await.contains_key(id)
    }

    /// Number of claims.
    pub async fn len(&self) -> usize {
        self.claims.read().await.len()
    }

    /// True when no claims exist.
    pub async fn is_empty(&self) -> bool {
        self.claims.read().await.is_empty()
    }

    /// Copy of every claim, in id order.
    pub async fn snapshot(&self) -> Vec<Claim> {
        let slots: Vec<ClaimSlot> = self.claims.read().await.values().cloned().collect();
        let mut out = Vec::with_capacity(slots.len());
        for slot in slots {
            out.push(slot.lock().await.clone());
        }
        out
    }

    /// Encode every claim as snapshot bytes.
    pub async fn to_bytes(&self, saved_at: Timestamp) -> Result<Vec<u8>, LedgerError> {
        let snapshot = Snapshot {
            version: SNAPSHOT_VERSION,
            saved_at,
            claims: self.snapshot().await,
        };
        Ok(bincode::serialize(&snapshot)?)
    }

    /// Restore from snapshot bytes.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, LedgerError> {
        let snapshot: Snapshot = bincode::deserialize(bytes)?;
        if snapshot.version != SNAPSHOT_VERSION {
            return Err(LedgerError::UnsupportedVersion(snapshot.version));
        }
        debug!("Snapshot saved at {} holds {} claims", snapshot.saved_at, snapshot.claims.len());
        Self::from_claims(snapshot.claims)
    }

    /// Write a snapshot file, replacing any previous one.
    pub async fn save(&self, path: &Path, saved_at: Timestamp) -> Result<usize, LedgerError> {
        let bytes = self.to_bytes(saved_at).await?;
        let tmp = path.with_extension("tmp");
        tokio::fs::write(&tmp, &bytes).await?;
        tokio::fs::rename(&tmp, path).await?;

        let count = self.len().await;
        info!("Saved {} claims ({} bytes) to {}", count, bytes.len(), path.display());
        Ok(count)
    }

    /// Load a snapshot file. A missing file yields an empty ledger.
    pub async fn load(path: &Path) -> Result<Self, LedgerError> {
        let bytes = match tokio::fs::read(path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                info!("No snapshot at {}, starting empty", path.display());
                return Ok(Self::new());
            }
            Err(e) => return Err(e.into()),
        };

        let ledger = Self::from_bytes(&bytes)?;
        info!("Restored {} claims from {}", ledger.len().await, path.display());
        Ok(ledger)
    }
}
