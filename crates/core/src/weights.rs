//! Digitized weights.
//!
//! Digram cells are stored as `u16` holding `round(-w * 256)`, which covers
//! log-probabilities down to about -256 at a resolution of 1/256. Reference
//! weights are rounded through `f32` and lambdas are stored as `f32`. Scoring
//! applies the same rounding to freshly computed weights so that stored and
//! recomputed values agree.

/// Natural-log weight.
pub type Weight = f64;

/// Packed digram cell.
pub type DigitizedWeight = u16;

/// Scale applied before rounding.
pub const DIG_FACTOR: f64 = 256.0;

/// Smallest representable weight, also used for impossible transitions.
pub const DIGITIZED_WEIGHT_MIN: DigitizedWeight = u16::MAX;

/// Largest representable weight (log-probability 0).
pub const DIGITIZED_WEIGHT_MAX: DigitizedWeight = 0;

/// Pack a log-probability into a digram cell, saturating at both ends.
#[inline]
pub fn pack_digram(w: Weight) -> DigitizedWeight {
    if w.is_nan() {
        return DIGITIZED_WEIGHT_MIN;
    }
    let scaled = (-w * DIG_FACTOR).round();
    if scaled <= 0.0 {
        DIGITIZED_WEIGHT_MAX
    } else if scaled >= DIGITIZED_WEIGHT_MIN as f64 {
        DIGITIZED_WEIGHT_MIN
    } else {
        scaled as DigitizedWeight
    }
}

/// Unpack a digram cell. Always finite.
#[inline]
pub fn unpack_digram(cell: DigitizedWeight) -> Weight {
    -(cell as f64) / DIG_FACTOR
}

/// Round a reference weight the way it is stored.
#[inline]
pub fn round_reference(w: Weight) -> Weight {
    w as f32 as f64
}

#[inline]
pub fn pack_lambda(w: Weight) -> f32 {
    w as f32
}

#[inline]
pub fn unpack_lambda(lam: f32) -> Weight {
    lam as f64
}
