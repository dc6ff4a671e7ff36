//! Domain models shared by every handler bundle.
//!
//! These models are storage-agnostic. Bundle-specific aggregates (stakers,
//! periods, policies) live next to their handlers in `stakeledger-handlers`.

mod amount;

pub use amount::{ETHER_DECIMALS, checked_add, convert_to_decimal, wei_to_decimal};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::entity::Entity;

// =============================================================================
// Fixed-size byte newtypes
// =============================================================================

/// Macro to generate fixed-size byte newtypes with hex conversions.
///
/// Generates:
/// - `from_hex()` - Parse from hex string (with or without 0x prefix)
/// - `to_hex()` - Convert to 0x-prefixed lowercase hex
/// - `Display`, `From<[u8; N]>`, `AsRef<[u8]>`
/// - serde as a hex string; `$prefixed` selects whether the serialized form
///   carries the `0x` prefix
macro_rules! fixed_bytes_newtype {
    ($(#[$meta:meta])* $name:ident, $len:expr, prefixed = $prefixed:expr) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
        pub struct $name(pub [u8; $len]);

        impl $name {
            /// Parse from hex string (with or without 0x prefix, any case).
            pub fn from_hex(s: &str) -> Result<Self, hex::FromHexError> {
                let s = s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")).unwrap_or(s);
                let bytes = hex::decode(s)?;
                let arr: [u8; $len] = bytes
                    .try_into()
                    .map_err(|_| hex::FromHexError::InvalidStringLength)?;
                Ok(Self(arr))
            }

            /// Convert to 0x-prefixed lowercase hex.
            pub fn to_hex(&self) -> String {
                format!("0x{}", hex::encode(self.0))
            }

            /// Get the inner bytes.
            pub fn as_bytes(&self) -> &[u8; $len] {
                &self.0
            }

            fn to_serialized(&self) -> String {
                if $prefixed {
                    self.to_hex()
                } else {
                    hex::encode(self.0)
                }
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}", self.to_hex())
            }
        }

        impl From<[u8; $len]> for $name {
            fn from(bytes: [u8; $len]) -> Self {
                Self(bytes)
            }
        }

        impl AsRef<[u8]> for $name {
            fn as_ref(&self) -> &[u8] {
                &self.0
            }
        }

        impl Serialize for $name {
            fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
                serializer.serialize_str(&self.to_serialized())
            }
        }

        impl<'de> Deserialize<'de> for $name {
            fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
                let s = String::deserialize(deserializer)?;
                Self::from_hex(&s).map_err(serde::de::Error::custom)
            }
        }
    };
}

fixed_bytes_newtype!(
    /// 20-byte Ethereum account or contract address.
    ///
    /// Serialized (and used as an entity key) as lowercase hex without prefix.
    Address, 20, prefixed = false
);

fixed_bytes_newtype!(
    /// 32-byte block hash.
    BlockHash, 32, prefixed = true
);

fixed_bytes_newtype!(
    /// 32-byte transaction hash.
    TxHash, 32, prefixed = true
);

/// The null address, used as the "no worker bonded" sentinel.
pub const NULL_ADDRESS: Address = Address([0u8; 20]);

impl Address {
    /// Entity key form: lowercase hex without `0x`.
    pub fn to_key(&self) -> String {
        hex::encode(self.0)
    }

    /// Whether this is the null address sentinel.
    pub fn is_null(&self) -> bool {
        *self == NULL_ADDRESS
    }
}

// =============================================================================
// Ledger position
// =============================================================================

/// Position of a log in the ledger, ordered by block then log index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct LogPosition {
    pub block_number: u64,
    pub log_index: u32,
}

impl std::fmt::Display for LogPosition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.block_number, self.log_index)
    }
}

/// Build the audit record id for a log: `<0x tx hash>-<log index>`.
pub fn make_event_id(tx_hash: &TxHash, log_index: u32) -> String {
    format!("{}-{}", tx_hash.to_hex(), log_index)
}

// =============================================================================
// Transaction cache
// =============================================================================

/// Per-hash transaction metadata.
///
/// Created on first reference and never updated afterwards.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Transaction {
    /// 0x-prefixed transaction hash.
    pub id: String,
    pub block_number: u64,
    /// Block timestamp (unix seconds).
    pub timestamp: i64,
    pub gas_used: u64,
    pub gas_price: u64,
    pub from: Address,
    /// Receiver (None for contract creation).
    pub to: Option<Address>,
}

impl Entity for Transaction {
    const KIND: &'static str = "Transaction";

    fn id(&self) -> String {
        self.id.clone()
    }
}

// =============================================================================
// Audit records
// =============================================================================

/// Audit record written for every handled event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventRecord {
    /// Unique identifier: `<0x tx hash>-<log index>`.
    pub id: String,
    /// Data source name (e.g. "StakingEscrow").
    pub contract: String,
    /// Event name (e.g. "CommitmentMade").
    pub name: String,
    pub block_number: u64,
    pub block_hash: BlockHash,
    /// Block timestamp.
    pub timestamp: DateTime<Utc>,
    pub tx_hash: TxHash,
    pub log_index: u32,
    /// Address of the emitting contract.
    pub address: Address,
    /// Decoded event parameters.
    pub params: serde_json::Value,
}

// =============================================================================
// Indexer State
// =============================================================================

/// Indexer cursor tracking progress.
///
/// The cursor records the last log whose effects were committed, enabling
/// the indexer to resume without re-applying deltas.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexerCursor {
    /// Chain identifier (network name).
    pub chain_id: String,
    /// Last fully indexed log.
    pub position: LogPosition,
    /// Last update timestamp.
    pub updated_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn address_key_is_bare_lowercase_hex() {
        let addr = Address::from_hex("0xABCDEF0000000000000000000000000000000001").unwrap();
        assert_eq!(addr.to_key(), "abcdef0000000000000000000000000000000001");
        assert_eq!(addr.to_hex(), "0xabcdef0000000000000000000000000000000001");
    }

    #[test]
    fn address_serde_uses_key_form() {
        let addr = Address([0x11; 20]);
        let json = serde_json::to_value(addr).unwrap();
        assert_eq!(json, serde_json::json!("11".repeat(20)));

        // Prefixed input is accepted on the way back in
        let parsed: Address = serde_json::from_value(serde_json::json!(addr.to_hex())).unwrap();
        assert_eq!(parsed, addr);
    }

    #[test]
    fn tx_hash_serde_is_prefixed() {
        let hash = TxHash([0xab; 32]);
        let json = serde_json::to_value(hash).unwrap();
        assert_eq!(json, serde_json::json!(format!("0x{}", "ab".repeat(32))));
    }

    #[test]
    fn null_address_sentinel() {
        assert!(NULL_ADDRESS.is_null());
        assert!(!Address([1; 20]).is_null());
        assert_eq!(NULL_ADDRESS.to_key(), "0".repeat(40));
    }

    #[test]
    fn rejects_wrong_length() {
        assert!(Address::from_hex("0x1234").is_err());
        assert!(TxHash::from_hex(&"ab".repeat(20)).is_err());
    }

    #[test]
    fn log_positions_order_by_block_then_index() {
        let a = LogPosition { block_number: 10, log_index: 5 };
        let b = LogPosition { block_number: 10, log_index: 6 };
        let c = LogPosition { block_number: 11, log_index: 0 };
        assert!(a < b && b < c);
    }

    #[test]
    fn event_id_format() {
        let hash = TxHash([0x01; 32]);
        assert_eq!(make_event_id(&hash, 7), format!("0x{}-7", "01".repeat(32)));
    }
}
