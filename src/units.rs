//! Size-string helpers for the CLI surface
//!
//! Sizes are written `<integer><unit>` with unit one of B, K, M, G
//! (powers of 1024), case-insensitive.

use crate::error::{Result, VaultError};

const UNITS: [char; 4] = ['B', 'K', 'M', 'G'];

/// Parse a size string like `10B`, `64K` or `1M` into a byte count.
///
/// Rejects zero, missing units, non-digit characters and unknown units.
pub fn parse_size(s: &str) -> Result<u64> {
    let bad = || VaultError::BadSize(s.to_string());

    if s.len() < 2 {
        return Err(bad());
    }
    let (digits, unit) = s.split_at(s.len() - 1);
    if !digits.bytes().all(|b| b.is_ascii_digit()) {
        return Err(bad());
    }
    let n: u64 = digits.parse().map_err(|_| bad())?;
    if n == 0 {
        return Err(bad());
    }

    let shift = match unit.chars().next() {
        Some('B') | Some('b') => 0,
        Some('K') | Some('k') => 10,
        Some('M') | Some('m') => 20,
        Some('G') | Some('g') => 30,
        _ => return Err(bad()),
    };
    n.checked_shl(shift)
        .filter(|v| v >> shift == n)
        .ok_or_else(bad)
}

/// Format a byte count with the largest unit that keeps the value at or
/// above one, rounding up: `10 -> "10B"`, `1536 -> "2K"`.
pub fn format_size(bytes: u64) -> String {
    let mut unit = 0;
    let mut value = bytes as f64;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    format!("{}{}", value.ceil() as u64, UNITS[unit])
}
