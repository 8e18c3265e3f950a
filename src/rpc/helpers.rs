//! Utility helpers for the hex-quantity encoding used by Ethereum JSON-RPC
//! (`0x`-prefixed, no leading zeros) plus filter normalization.

use anyhow::{Context, Result};

/// Encodes a block height as a JSON-RPC hex quantity (`0x0`, `0x10d4f`, ...).
pub fn u64_to_hex_qty(value: u64) -> String {
    format!("0x{value:x}")
}

/// Decodes a JSON-RPC hex quantity into a `u64`.
///
/// Accepts the canonical `0x`-prefixed form as well as bare decimal strings,
/// which some providers emit for index fields.
pub fn hex_qty_to_u64(value: &str) -> Result<u64> {
    let trimmed = value.trim();
    if let Some(digits) = trimmed
        .strip_prefix("0x")
        .or_else(|| trimmed.strip_prefix("0X"))
    {
        u64::from_str_radix(digits, 16)
            .with_context(|| format!("invalid hex quantity {trimmed:?}"))
    } else {
        trimmed
            .parse::<u64>()
            .with_context(|| format!("invalid decimal quantity {trimmed:?}"))
    }
}

/// Normalizes a user-supplied topic or address list: trims whitespace,
/// lowercases, and drops empty entries.
pub fn normalize_hex_filter(values: &[String]) -> Vec<String> {
    values
        .iter()
        .map(|value| value.trim().to_ascii_lowercase())
        .filter(|value| !value.is_empty())
        .collect()
}
