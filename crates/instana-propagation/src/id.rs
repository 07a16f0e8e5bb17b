// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Conversion between numeric trace/span identifiers and their hexadecimal wire form.
//!
//! Identifiers are 64-bit values. A 128-bit trace ID is carried as a pair of
//! 64-bit halves `(hi, lo)`; a trace ID with `hi == 0` is written in the short
//! legacy form so that older tracers keep understanding it.
//!
//! ```text
//! format_id(26)                    -> "1a"
//! format_long_id(0, 26)            -> "1a"
//! format_long_id(1, 26)            -> "0000000000000001000000000000001a"
//! ```

use rand::Rng;

use crate::propagation::error::Error;

/// Number of hex digits needed to encode a 64-bit value.
const HEX_DIGITS_64: usize = 16;

/// Formats an identifier as lowercase hex without leading zeros.
#[must_use]
pub fn format_id(id: u64) -> String {
    format!("{id:x}")
}

/// Formats a 128-bit trace identifier given as two 64-bit halves.
///
/// When `hi` is zero the output is identical to [`format_id`], otherwise both
/// halves are zero-padded to 16 digits each.
#[must_use]
pub fn format_long_id(hi: u64, lo: u64) -> String {
    if hi == 0 {
        return format_id(lo);
    }

    format!("{hi:016x}{lo:016x}")
}

/// Parses a hexadecimal 64-bit identifier.
///
/// # Errors
///
/// Returns [`Error::MalformedId`] if the string is empty, contains non-hex
/// characters or does not fit into 64 bits.
pub fn parse_id(s: &str) -> Result<u64, Error> {
    if !is_hex(s) {
        return Err(Error::malformed_id(s));
    }

    u64::from_str_radix(s, 16).map_err(|_| Error::malformed_id(s))
}

/// Parses a hexadecimal 64-bit or 128-bit trace identifier into `(hi, lo)`.
///
/// Up to 16 digits are treated as a legacy 64-bit ID with `hi == 0`. Longer
/// strings are split so that the last 16 digits form `lo` and the remainder `hi`.
///
/// # Errors
///
/// Returns [`Error::MalformedId`] if the string is empty, contains non-hex
/// characters or does not fit into 128 bits.
pub fn parse_long_id(s: &str) -> Result<(u64, u64), Error> {
    if !is_hex(s) {
        return Err(Error::malformed_id(s));
    }

    if s.len() <= HEX_DIGITS_64 {
        return Ok((0, parse_id(s)?));
    }

    // all bytes are ASCII hex digits, so any byte offset is a char boundary
    let (hi, lo) = s.split_at(s.len() - HEX_DIGITS_64);
    let hi = parse_id(hi).map_err(|_| Error::malformed_id(s))?;
    let lo = parse_id(lo).map_err(|_| Error::malformed_id(s))?;

    Ok((hi, lo))
}

/// Generates a new random identifier. Never returns zero.
///
/// Uses the thread-local generator, so concurrent callers do not contend on a lock.
#[must_use]
pub fn random_id() -> u64 {
    let mut rng = rand::thread_rng();
    loop {
        let id: u64 = rng.gen();
        if id != 0 {
            return id;
        }
    }
}

fn is_hex(s: &str) -> bool {
    !s.is_empty() && s.bytes().all(|b| b.is_ascii_hexdigit())
}
