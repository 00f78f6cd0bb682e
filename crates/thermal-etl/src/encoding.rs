//! Packing of (UTCI, WBGT, hour offset) triples into single integers.
//!
//! ```text
//! t    = round((utci + 100) * 10)          0..=1999
//! w    = t * 2000 + round((wbgt + 100) * 10)
//! code = w * 200 + hour_offset             hour_offset in 0..=199
//! ```
//!
//! Halves round to even, matching data already published.

use crate::error::{EtlError, EtlResult};

/// Number of distinct values per index (tenths of a degree over [-100, 99.9]).
pub const INDEX_STEPS: i32 = 2000;
/// Number of distinct hour offsets.
pub const OFFSET_STEPS: i32 = 200;

fn quantize(value: f32) -> i64 {
    ((value as f64 + 100.0) * 10.0).round_ties_even() as i64
}

/// Encode without range checks. Callers must stay inside the domain.
pub fn encode(utci: f32, wbgt: f32, hour_offset: i64) -> i32 {
    let t = quantize(utci);
    let w = t * INDEX_STEPS as i64 + quantize(wbgt);
    (w * OFFSET_STEPS as i64 + hour_offset) as i32
}

/// Encode, rejecting NaN and anything outside the packable range.
pub fn encode_checked(utci: f32, wbgt: f32, hour_offset: i64) -> EtlResult<i32> {
    let in_range = |q: i64| (0..INDEX_STEPS as i64).contains(&q);

    if utci.is_nan() || wbgt.is_nan() {
        return Err(EtlError::Encoding(format!(
            "missing value (utci={}, wbgt={}) at offset {}",
            utci, wbgt, hour_offset
        )));
    }
    if !in_range(quantize(utci)) || !in_range(quantize(wbgt)) {
        return Err(EtlError::Encoding(format!(
            "index out of range: utci={}, wbgt={}",
            utci, wbgt
        )));
    }
    if !(0..OFFSET_STEPS as i64).contains(&hour_offset) {
        return Err(EtlError::Encoding(format!(
            "hour offset {} out of range",
            hour_offset
        )));
    }
    Ok(encode(utci, wbgt, hour_offset))
}

/// Inverse of [`encode`]: `(utci, wbgt, hour_offset)`.
pub fn decode(code: i32) -> (f32, f32, u32) {
    let hour_offset = code % OFFSET_STEPS;
    let w = code / OFFSET_STEPS;
    let wbgt = (w % INDEX_STEPS) as f32 / 10.0 - 100.0;
    let utci = (w / INDEX_STEPS) as f32 / 10.0 - 100.0;
    (utci, wbgt, hour_offset as u32)
}

/// Encode one cell's series against precomputed hour offsets.
///
/// Steps where either index is missing are left out; every code carries its
/// own hour offset, so the remaining steps still decode to the right time.
pub fn encode_series(utci: &[f32], wbgt: &[f32], offsets: &[i64]) -> EtlResult<Vec<i32>> {
    utci.iter()
        .zip(wbgt)
        .zip(offsets)
        .filter(|((u, w), _)| !u.is_nan() && !w.is_nan())
        .map(|((&u, &w), &offset)| encode_checked(u, w, offset))
        .collect()
}
