//! Account and Entity Identifiers
//!
//! Fixed-size identifiers for accounts, claims and escrow vaults.
//! All implement Ord so ledgers can use BTreeMap for deterministic iteration.

use std::fmt;
use serde::{Serialize, Serializer, Deserialize, Deserializer};
use serde::de::Error as _;

/// Size of every identifier in bytes.
pub const ID_LEN: usize = 32;

macro_rules! define_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
        pub struct $name(pub [u8; ID_LEN]);

        impl $name {
            /// Create from raw bytes.
            pub const fn new(bytes: [u8; ID_LEN]) -> Self {
                Self(bytes)
            }

            /// Get raw bytes.
            pub fn as_bytes(&self) -> &[u8; ID_LEN] {
                &self.0
            }

            /// Parse from a 64-character hex string.
            pub fn from_hex(s: &str) -> Option<Self> {
                let bytes = hex::decode(s).ok()?;
                if bytes.len() != ID_LEN {
                    return None;
                }
                let mut arr = [0u8; ID_LEN];
                arr.copy_from_slice(&bytes);
                Some(Self(arr))
            }

            /// Full hex encoding.
            pub fn to_hex(&self) -> String {
                hex::encode(self.0)
            }

            /// Short hex prefix for log lines.
            pub fn short(&self) -> String {
                hex::encode(&self.0[..4])
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.to_hex())
            }
        }

        // Hex in JSON, raw bytes in bincode snapshots.
        impl Serialize for $name {
            fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
                if serializer.is_human_readable() {
                    serializer.serialize_str(&self.to_hex())
                } else {
                    self.0.serialize(serializer)
                }
            }
        }

        impl<'de> Deserialize<'de> for $name {
            fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
                if deserializer.is_human_readable() {
                    let s = String::deserialize(deserializer)?;
                    Self::from_hex(&s).ok_or_else(|| D::Error::custom(concat!("invalid ", stringify!($name))))
                } else {
                    <[u8; ID_LEN]>::deserialize(deserializer).map(Self)
                }
            }
        }

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}({})", stringify!($name), self.short())
            }
        }
    };
}

define_id!(
    /// An account able to create claims, stake, resolve or receive payouts.
    AccountId
);

define_id!(
    /// Identifier of a claim, derived from its creator and text hash.
    ClaimId
);

define_id!(
    /// Identifier of one side's escrow vault, derived from the claim id.
    VaultId
);

/// Stake unit accepted by claims created through the wire protocol.
pub const NATIVE_STAKE_TOKEN: AccountId = AccountId([0u8; ID_LEN]);

/// Smallest indivisible denominations per whole stake unit.
pub const BASE_UNITS_PER_TOKEN: u64 = 1_000_000_000;

/// Render a base-unit amount as whole units with two decimals.
pub fn format_amount(amount: u64) -> String {
    let whole = amount / BASE_UNITS_PER_TOKEN;
    let cents = (amount % BASE_UNITS_PER_TOKEN) / (BASE_UNITS_PER_TOKEN / 100);
    format!("{}.{:02}", whole, cents)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_id_ordering() {
        let a = AccountId::new([0; ID_LEN]);
        let b = AccountId::new([1; ID_LEN]);
        let mut c_bytes = [0u8; ID_LEN];
        c_bytes[1] = 1;
        let c = AccountId::new(c_bytes);

        assert!(a < b);
        assert!(a < c);
        assert!(c < b);
    }

    #[test]
    fn test_hex_roundtrip() {
        let id = ClaimId::new([0xab; ID_LEN]);
        let parsed = ClaimId::from_hex(&id.to_hex()).unwrap();
        assert_eq!(parsed, id);
        assert_eq!(id.short(), "abababab");
    }

    #[test]
    fn test_from_hex_rejects_wrong_length() {
        assert!(AccountId::from_hex("abcd").is_none());
        assert!(AccountId::from_hex("not hex").is_none());
    }

    #[test]
    fn test_serde_formats() {
        let id = AccountId::new([0x01; ID_LEN]);

        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, format!("\"{}\"", "01".repeat(ID_LEN)));
        assert_eq!(serde_json::from_str::<AccountId>(&json).unwrap(), id);
        assert!(serde_json::from_str::<AccountId>("\"zz\"").is_err());

        let bytes = bincode::serialize(&id).unwrap();
        assert_eq!(bytes.len(), ID_LEN);
        assert_eq!(bincode::deserialize::<AccountId>(&bytes).unwrap(), id);
    }

    #[test]
    fn test_format_amount() {
        assert_eq!(format_amount(0), "0.00");
        assert_eq!(format_amount(1_500_000_000), "1.50");
        assert_eq!(format_amount(100_000_000), "0.10");
        assert_eq!(format_amount(9_999_999), "0.00");
    }
}
