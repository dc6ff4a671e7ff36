//! Shared helper functions for PostgreSQL row conversion.

use stakeledger_core::error::{StorageError, StorageResult};
use stakeledger_core::models::Address;

/// Convert a `Vec<u8>` to a fixed-size 32-byte array.
///
/// Returns an error if the length doesn't match.
pub fn bytes_to_hash32(bytes: Vec<u8>, field_name: &str) -> StorageResult<[u8; 32]> {
    bytes.try_into().map_err(|v: Vec<u8>| {
        StorageError::SerializationError(format!(
            "{} has invalid length: expected 32, got {}",
            field_name,
            v.len()
        ))
    })
}

/// Convert a `Vec<u8>` to a 20-byte address.
pub fn bytes_to_address(bytes: Vec<u8>, field_name: &str) -> StorageResult<Address> {
    let arr: [u8; 20] = bytes.try_into().map_err(|v: Vec<u8>| {
        StorageError::SerializationError(format!(
            "{} has invalid length: expected 20, got {}",
            field_name,
            v.len()
        ))
    })?;
    Ok(Address(arr))
}

/// Convert a BIGINT column to an unsigned value, rejecting negatives as corrupt.
pub fn i64_to_u64(value: i64, field_name: &str) -> StorageResult<u64> {
    u64::try_from(value).map_err(|_| {
        StorageError::SerializationError(format!("{} is negative: {}", field_name, value))
    })
}
