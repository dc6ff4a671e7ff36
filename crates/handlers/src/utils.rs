//! Shared utilities for contract handlers.
//!
//! This module provides the parameter parsing and extraction functions used
//! by every handler bundle. Event payloads arrive as decoded JSON, keyed by
//! ABI parameter name (or positional when the host emits arrays).

use serde_json::Value;

use stakeledger_core::error::{DomainError, DomainResult};
use stakeledger_core::models::Address;
use stakeledger_core::ports::RawLog;

// =============================================================================
// Event field extraction
// =============================================================================

/// Find a raw field, trying multiple key names and falling back to index.
pub fn find_field<'a>(data: &'a Value, keys: &[&str], index: usize) -> Option<&'a Value> {
    keys.iter()
        .find_map(|key| data.get(*key))
        .or_else(|| data.get(index))
}

/// Extract a field from event data, trying multiple key names and falling back to index.
///
/// # Example
///
/// ```ignore
/// let value = extract_field(&log.params, &["value"], 1, parse_amount);
/// ```
pub fn extract_field<T>(
    data: &Value,
    keys: &[&str],
    index: usize,
    parser: fn(&Value) -> Option<T>,
) -> Option<T> {
    find_field(data, keys, index).and_then(parser)
}

/// Extract a field that the event must carry.
///
/// A missing or malformed value means the feed is broken, so this fails
/// with [`DomainError::DecodingError`] naming the event and field.
pub fn require_field<T>(
    log: &RawLog,
    keys: &[&str],
    index: usize,
    parser: fn(&Value) -> Option<T>,
) -> DomainResult<T> {
    extract_field(&log.params, keys, index, parser).ok_or_else(|| {
        DomainError::DecodingError(format!(
            "{}.{} at {}: missing or malformed '{}'",
            log.contract,
            log.name,
            log.position(),
            keys.first().copied().unwrap_or("?")
        ))
    })
}

/// Extract an optional field: absent is `None`, present but malformed fails.
///
/// Lookup is the same as [`find_field`], so positional payloads resolve by
/// `index`.
pub fn optional_field<T>(
    log: &RawLog,
    keys: &[&str],
    index: usize,
    parser: fn(&Value) -> Option<T>,
) -> DomainResult<Option<T>> {
    match find_field(&log.params, keys, index) {
        None | Some(Value::Null) => Ok(None),
        Some(value) => parser(value).map(Some).ok_or_else(|| {
            DomainError::DecodingError(format!(
                "{}.{} at {}: malformed '{}'",
                log.contract,
                log.name,
                log.position(),
                keys.first().copied().unwrap_or("?")
            ))
        }),
    }
}

// =============================================================================
// Address parsing
// =============================================================================

/// Parse a 20-byte address.
///
/// Handles:
/// - Hex string with or without prefix, any case: `"0xAbC..."`
/// - Byte array: `[b0, b1, ..., b19]`
pub fn parse_address(value: &Value) -> Option<Address> {
    match value {
        Value::String(s) => Address::from_hex(s).ok(),
        Value::Array(arr) => {
            if arr.len() != 20 {
                return None;
            }
            let mut bytes = [0u8; 20];
            for (i, v) in arr.iter().enumerate() {
                bytes[i] = u8::try_from(v.as_u64()?).ok()?;
            }
            Some(Address(bytes))
        }
        _ => None,
    }
}

// =============================================================================
// Numeric parsing
// =============================================================================

/// Parse a uint256 amount that must fit in u128.
///
/// Handles numeric, decimal-string and `0x` hex-string representations.
/// Amounts beyond u64 only survive JSON as strings.
pub fn parse_amount(value: &Value) -> Option<u128> {
    match value {
        Value::Number(n) => n.as_u64().map(u128::from),
        Value::String(s) => match s.strip_prefix("0x") {
            Some(hex_str) => u128::from_str_radix(hex_str, 16).ok(),
            None => s.parse().ok(),
        },
        _ => None,
    }
}

/// Parse a u64 from JSON.
pub fn parse_u64(value: &Value) -> Option<u64> {
    parse_amount(value).and_then(|v| v.try_into().ok())
}

/// Parse a boolean flag.
///
/// Accepts `true`/`false`, their string forms and `0`/`1`.
pub fn parse_bool(value: &Value) -> Option<bool> {
    match value {
        Value::Bool(b) => Some(*b),
        Value::String(s) => match s.as_str() {
            "true" | "1" => Some(true),
            "false" | "0" => Some(false),
            _ => None,
        },
        Value::Number(n) => match n.as_u64()? {
            0 => Some(false),
            1 => Some(true),
            _ => None,
        },
        _ => None,
    }
}

// =============================================================================
// Bytes parsing
// =============================================================================

/// Parse a 16-byte identifier (e.g. a policy id) from a hex string.
pub fn parse_bytes16(value: &Value) -> Option<[u8; 16]> {
    let s = value.as_str()?;
    let bytes = hex::decode(s.strip_prefix("0x").unwrap_or(s)).ok()?;
    bytes.try_into().ok()
}

// =============================================================================
// Tests
// =============================================================================
