//! # Vector Sanitization
//!
//! Repairs non-finite and absurd-magnitude values before a vector reaches
//! normalization or the index. Extracted vectors and caller-supplied vectors
//! both pass through here so they share one numeric domain.

/// Magnitude above which a value is treated as garbage
pub const MAX_ABS_VALUE: f64 = 1e100;

/// Sanitize a single value: NaN, ±inf and |x| > 1e100 become 0.0
#[inline]
pub fn sanitize_value(x: f64) -> f64 {
    if !x.is_finite() || x.abs() > MAX_ABS_VALUE {
        0.0
    } else {
        x
    }
}

/// Sanitize a vector, returning a new one
pub fn sanitize(vector: &[f64]) -> Vec<f64> {
    vector.iter().copied().map(sanitize_value).collect()
}

/// Sanitize a vector in place
pub fn sanitize_in_place(vector: &mut [f64]) {
    for x in vector.iter_mut() {
        *x = sanitize_value(*x);
    }
}

/// Matrix-wide pass applied when a dataset is loaded.
///
/// Unlike [`sanitize_value`] this maps `+inf` to 1.0 and keeps large finite
/// values; the per-vector sanitizer runs afterwards on query vectors only.
#[inline]
pub fn repair_matrix_value(x: f64) -> f64 {
    if x.is_nan() {
        0.0
    } else if x == f64::INFINITY {
        1.0
    } else if x == f64::NEG_INFINITY {
        0.0
    } else {
        x
    }
}

/// Apply [`repair_matrix_value`] to every element; returns how many changed
pub fn repair_matrix(values: &mut [f64]) -> usize {
    let mut repaired = 0;
    for x in values.iter_mut() {
        if !x.is_finite() {
            *x = repair_matrix_value(*x);
            repaired += 1;
        }
    }
    repaired
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_sanitize_replaces_bad_values() {
        let v = vec![1.5, f64::NAN, f64::INFINITY, f64::NEG_INFINITY, 1e101, -1e101, 1e100];
        assert_eq!(sanitize(&v), vec![1.5, 0.0, 0.0, 0.0, 0.0, 0.0, 1e100]);
    }

    #[test]
    fn test_sanitize_in_place() {
        let mut v = vec![f64::NAN, -2.0];
        sanitize_in_place(&mut v);
        assert_eq!(v, vec![0.0, -2.0]);
    }

    #[test]
    fn test_repair_matrix() {
        let mut m = vec![f64::NAN, f64::INFINITY, f64::NEG_INFINITY, 3.0, 1e150];
        assert_eq!(repair_matrix(&mut m), 3);
        assert_eq!(m, vec![0.0, 1.0, 0.0, 3.0, 1e150]);
    }

    proptest! {
        #[test]
        fn prop_sanitized_is_finite_and_bounded(v in proptest::collection::vec(proptest::num::f64::ANY, 0..64)) {
            let out = sanitize(&v);
            prop_assert_eq!(out.len(), v.len());
            for x in out {
                prop_assert!(x.is_finite());
                prop_assert!(x.abs() <= MAX_ABS_VALUE);
            }
        }

        #[test]
        fn prop_sanitize_keeps_ordinary_values(v in proptest::collection::vec(-1e6f64..1e6, 0..64)) {
            prop_assert_eq!(sanitize(&v), v);
        }
    }
}
