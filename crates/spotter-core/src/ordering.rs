//! Sortable ordering markers.
//!
//! Plan exercises and logged sets are ordered by a string marker instead of
//! an integer position, so a row can be placed between two neighbours without
//! renumbering anything. Markers are base-36 fractions (`0-9a-z`) compared
//! lexicographically; the empty string stands for the lower bound and a
//! missing upper neighbour for the upper bound. Generated markers never end
//! in `'0'`, which keeps every pair of distinct markers separable.

use crate::error::{Result, SpotterError};

const DIGITS: &[u8; 36] = b"0123456789abcdefghijklmnopqrstuvwxyz";
const BASE: usize = DIGITS.len();

fn digit_value(byte: u8) -> Option<usize> {
    DIGITS.iter().position(|d| *d == byte)
}

fn validate(marker: &str, field: &str) -> Result<()> {
    if marker.is_empty() {
        return Err(SpotterError::invalid_input(field).with_reason("Marker must not be empty"));
    }
    if marker.bytes().any(|b| digit_value(b).is_none()) {
        return Err(SpotterError::invalid_input(field)
            .with_reason(format!("Marker '{marker}' contains characters outside 0-9a-z")));
    }
    if marker.ends_with('0') {
        return Err(SpotterError::invalid_input(field)
            .with_reason(format!("Marker '{marker}' must not end with '0'")));
    }
    Ok(())
}

/// Digits strictly between `lo` and `hi` (both already validated, `lo < hi`).
fn midpoint(lo: &[u8], hi: Option<&[u8]>) -> Vec<u8> {
    if let Some(hi) = hi {
        let shared = hi
            .iter()
            .enumerate()
            .take_while(|(i, b)| lo.get(*i).copied().unwrap_or(b'0') == **b)
            .count();
        if shared > 0 {
            let rest_lo = lo.get(shared..).unwrap_or(&[]);
            let mut out = hi[..shared].to_vec();
            out.extend(midpoint(rest_lo, Some(&hi[shared..])));
            return out;
        }
    }

    let lo_digit = lo.first().and_then(|b| digit_value(*b)).unwrap_or(0);
    let hi_digit = hi
        .and_then(|h| h.first())
        .and_then(|b| digit_value(*b))
        .unwrap_or(BASE);

    if hi_digit - lo_digit > 1 {
        return vec![DIGITS[(lo_digit + hi_digit) / 2]];
    }

    // Adjacent leading digits. A longer upper bound still leaves room right
    // at its first digit; otherwise extend the lower bound.
    if let Some(hi) = hi {
        if hi.len() > 1 {
            return vec![hi[0]];
        }
    }
    let mut out = vec![DIGITS[lo_digit]];
    out.extend(midpoint(lo.get(1..).unwrap_or(&[]), None));
    out
}

/// Returns a marker sorting strictly between `before` and `after`.
///
/// `None` on either side means "open end". Fails when a bound is malformed or
/// the bounds are not in ascending order.
pub fn marker_between(before: Option<&str>, after: Option<&str>) -> Result<String> {
    if let Some(before) = before {
        validate(before, "before")?;
    }
    if let Some(after) = after {
        validate(after, "after")?;
    }
    if let (Some(before), Some(after)) = (before, after) {
        if before >= after {
            return Err(SpotterError::invalid_input("after").with_reason(format!(
                "Marker '{after}' must sort after '{before}'"
            )));
        }
    }

    let digits = midpoint(before.unwrap_or("").as_bytes(), after.map(str::as_bytes));
    String::from_utf8(digits).map_err(|e| SpotterError::Configuration {
        message: format!("Generated marker is not ASCII: {e}"),
    })
}

/// Returns a marker sorting after `last` (or the first marker when `None`).
pub fn marker_after(last: Option<&str>) -> Result<String> {
    marker_between(last, None)
}

/// Checks a caller-supplied marker.
pub fn validate_marker(marker: &str) -> Result<()> {
    validate(marker, "order_marker")
}
