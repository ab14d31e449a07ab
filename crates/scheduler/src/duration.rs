// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Duration grammar (spec §4.2, §6): `^\d+(\.\d+)?[smhd]$`, case-insensitive,
//! clamped to a minimum of 10000 ms.

use halo_core::DomainError;

const MIN_MS: u64 = 10_000;

/// Parse a duration string like `"30m"`, `"1.5h"`, `"1s"` into milliseconds.
///
/// The result is clamped to [`MIN_MS`]. Anything not matching the grammar
/// is rejected.
pub fn parse_duration(s: &str) -> Result<u64, DomainError> {
    let s = s.trim();
    if s.is_empty() {
        return Err(DomainError::InvalidDuration(s.to_string()));
    }

    let unit_char = s.chars().last().ok_or_else(|| DomainError::InvalidDuration(s.to_string()))?;
    let multiplier_ms: f64 = match unit_char.to_ascii_lowercase() {
        's' => 1_000.0,
        'm' => 60_000.0,
        'h' => 3_600_000.0,
        'd' => 86_400_000.0,
        _ => return Err(DomainError::InvalidDuration(s.to_string())),
    };

    let number_part = &s[..s.len() - unit_char.len_utf8()];
    if number_part.is_empty() || !is_valid_number(number_part) {
        return Err(DomainError::InvalidDuration(s.to_string()));
    }

    let value: f64 = number_part.parse().map_err(|_| DomainError::InvalidDuration(s.to_string()))?;
    let ms = (value * multiplier_ms).round() as u64;
    Ok(ms.max(MIN_MS))
}

/// Accepts `\d+` or `\d+\.\d+`, rejecting `.5`, `5.`, `-5`, `5e3`, etc.
fn is_valid_number(s: &str) -> bool {
    let mut parts = s.splitn(2, '.');
    let whole = parts.next().unwrap_or("");
    if whole.is_empty() || !whole.bytes().all(|b| b.is_ascii_digit()) {
        return false;
    }
    match parts.next() {
        None => true,
        Some(frac) => !frac.is_empty() && frac.bytes().all(|b| b.is_ascii_digit()),
    }
}
