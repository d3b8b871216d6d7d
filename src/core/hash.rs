//! Hashing for Identity and Verification
//!
//! Provides deterministic hashing for:
//! - Claim text digests stored on the ledger
//! - Claim and vault id derivation
//! - Claim state digests returned in receipts

use sha2::{Sha256, Digest};
use super::account::{AccountId, ClaimId, VaultId, ID_LEN};

/// Hash output type (256 bits / 32 bytes)
pub type StateHash = [u8; 32];

/// Domain separator for claim state digests.
const CLAIM_STATE_DOMAIN: &[u8] = b"CLAIM_WAGER_STATE_V1";

/// Seed prefix for claim id derivation.
const CLAIM_SEED: &[u8] = b"claim";

/// Seed prefix for vault id derivation.
const VAULT_SEED: &[u8] = b"vault";

/// Deterministic hasher for claim state.
///
/// Wraps SHA-256 with little-endian helpers.
/// Order of updates is critical for determinism.
pub struct StateHasher {
    hasher: Sha256,
}

impl StateHasher {
    /// Create a new hasher with domain separator.
    pub fn new(domain: &[u8]) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(domain);
        Self { hasher }
    }

    /// Create hasher for claim state.
    pub fn for_claim_state() -> Self {
        Self::new(CLAIM_STATE_DOMAIN)
    }

    /// Update with raw bytes.
    #[inline]
    pub fn update_bytes(&mut self, bytes: &[u8]) {
        self.hasher.update(bytes);
    }

    /// Update with length-prefixed bytes, so adjacent fields cannot alias.
    #[inline]
    pub fn update_str(&mut self, value: &str) {
        self.update_u32(value.len() as u32);
        self.hasher.update(value.as_bytes());
    }

    /// Update with a u8 value.
    #[inline]
    pub fn update_u8(&mut self, value: u8) {
        self.hasher.update([value]);
    }

    /// Update with a u32 value (little-endian).
    #[inline]
    pub fn update_u32(&mut self, value: u32) {
        self.hasher.update(value.to_le_bytes());
    }

    /// Update with a u64 value (little-endian).
    #[inline]
    pub fn update_u64(&mut self, value: u64) {
        self.hasher.update(value.to_le_bytes());
    }

    /// Update with an i64 value (little-endian).
    #[inline]
    pub fn update_i64(&mut self, value: i64) {
        self.hasher.update(value.to_le_bytes());
    }

    /// Update with a boolean.
    #[inline]
    pub fn update_bool(&mut self, value: bool) {
        self.update_u8(value as u8);
    }

    /// Update with a 32-byte identifier.
    #[inline]
    pub fn update_id(&mut self, id: &[u8; ID_LEN]) {
        self.hasher.update(id);
    }

    /// Finalize and return the hash.
    pub fn finalize(self) -> StateHash {
        self.hasher.finalize().into()
    }
}

/// Compute a simple hash of arbitrary data.
pub fn hash_bytes(data: &[u8]) -> StateHash {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hasher.finalize().into()
}

/// Digest of a claim's text as stored on the ledger.
pub fn claim_text_hash(text: &str) -> StateHash {
    hash_bytes(text.as_bytes())
}

/// Derive the claim id from `("claim", creator, text hash)`.
///
/// The same creator posting the same text always maps to the same claim.
pub fn derive_claim_id(creator: &AccountId, text_hash: &StateHash) -> ClaimId {
    let mut hasher = Sha256::new();
    hasher.update(CLAIM_SEED);
    hasher.update(creator.as_bytes());
    hasher.update(text_hash);
    ClaimId::new(hasher.finalize().into())
}

/// Derive a vault id from `("vault", claim id, side tag)`.
pub fn derive_vault_id(claim_id: &ClaimId, side_tag: &[u8]) -> VaultId {
    let mut hasher = Sha256::new();
    hasher.update(VAULT_SEED);
    hasher.update(claim_id.as_bytes());
    hasher.update(side_tag);
    VaultId::new(hasher.finalize().into())
}

// =============================================================================
// TESTS
// =============================================================================
