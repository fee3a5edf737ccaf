//! # Distance Kernels
//!
//! Squared L2 distance over `f32` rows of the normalized index. The kernel
//! is picked once per process from what the CPU supports (AVX2+FMA, AVX,
//! NEON, else scalar) and reused for every call after that.
//!
//! The `f64` helpers work on raw feature rows and back exact-row
//! resolution, where precision matters more than throughput.
//!
//! One kernel always gives the same result for the same pair; different
//! kernels may differ in the last ulp because they sum in a different order.

use std::sync::OnceLock;

#[cfg(target_arch = "x86_64")]
use std::arch::x86_64::*;

#[cfg(target_arch = "aarch64")]
use std::arch::aarch64::*;

type Kernel = fn(&[f32], &[f32]) -> f32;

struct Selected {
    name: &'static str,
    kernel: Kernel,
}

static SELECTED: OnceLock<Selected> = OnceLock::new();

fn selected() -> &'static Selected {
    SELECTED.get_or_init(|| {
        #[cfg(target_arch = "x86_64")]
        {
            if is_x86_feature_detected!("avx2") && is_x86_feature_detected!("fma") {
                return Selected { name: "avx2+fma", kernel: x86::squared_avx2_fma };
            }
            if is_x86_feature_detected!("avx") {
                return Selected { name: "avx", kernel: x86::squared_avx };
            }
        }
        #[cfg(target_arch = "aarch64")]
        {
            return Selected { name: "neon", kernel: arm::squared_neon };
        }
        #[allow(unreachable_code)]
        Selected { name: "scalar", kernel: squared_scalar }
    })
}

/// Name of the kernel [`l2_distance_squared`] runs on this machine
pub fn kernel_name() -> &'static str {
    selected().name
}

/// Squared Euclidean distance between two rows of equal length
#[inline]
pub fn l2_distance_squared(a: &[f32], b: &[f32]) -> f32 {
    debug_assert_eq!(a.len(), b.len());
    (selected().kernel)(a, b)
}

#[inline]
pub fn l2_distance(a: &[f32], b: &[f32]) -> f32 {
    l2_distance_squared(a, b).sqrt()
}

/// L2 distance over raw `f64` feature rows.
///
/// Differences are divided by the largest one before squaring, so rows
/// holding values near 1e160 still compare instead of all reading `inf`.
pub fn l2_distance_f64(a: &[f64], b: &[f64]) -> f64 {
    debug_assert_eq!(a.len(), b.len());
    let scale = a.iter().zip(b).fold(0.0f64, |m, (x, y)| m.max((x - y).abs()));
    if scale == 0.0 || !scale.is_finite() {
        return scale;
    }
    let sum = a.iter().zip(b).fold(0.0, |acc, (x, y)| {
        let d = (x - y) / scale;
        acc + d * d
    });
    scale * sum.sqrt()
}

/// True when every dimension of `a` is within `tolerance` of `b`
#[inline]
pub fn all_close(a: &[f64], b: &[f64], tolerance: f64) -> bool {
    a.len() == b.len() && a.iter().zip(b).all(|(x, y)| (x - y).abs() <= tolerance)
}

fn squared_scalar(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b).fold(0.0, |acc, (x, y)| acc + (x - y) * (x - y))
}

/// Scalar sum over the elements the vector loop did not cover
#[inline]
fn tail(a: &[f32], b: &[f32], lanes: usize) -> f32 {
    let start = a.len() - a.len() % lanes;
    squared_scalar(&a[start..], &b[start..])
}

#[cfg(target_arch = "x86_64")]
mod x86 {
    use super::*;

    const LANES: usize = 8;

    pub(super) fn squared_avx2_fma(a: &[f32], b: &[f32]) -> f32 {
        // Only selected after runtime detection of avx2 and fma
        unsafe { avx2_fma(a, b) }
    }

    pub(super) fn squared_avx(a: &[f32], b: &[f32]) -> f32 {
        // Only selected after runtime detection of avx
        unsafe { avx(a, b) }
    }

    #[target_feature(enable = "avx2", enable = "fma")]
    unsafe fn avx2_fma(a: &[f32], b: &[f32]) -> f32 {
        let mut acc = _mm256_setzero_ps();
        for (ca, cb) in a.chunks_exact(LANES).zip(b.chunks_exact(LANES)) {
            let d = _mm256_sub_ps(_mm256_loadu_ps(ca.as_ptr()), _mm256_loadu_ps(cb.as_ptr()));
            acc = _mm256_fmadd_ps(d, d, acc);
        }
        reduce(acc) + tail(a, b, LANES)
    }

    #[target_feature(enable = "avx")]
    unsafe fn avx(a: &[f32], b: &[f32]) -> f32 {
        let mut acc = _mm256_setzero_ps();
        for (ca, cb) in a.chunks_exact(LANES).zip(b.chunks_exact(LANES)) {
            let d = _mm256_sub_ps(_mm256_loadu_ps(ca.as_ptr()), _mm256_loadu_ps(cb.as_ptr()));
            acc = _mm256_add_ps(acc, _mm256_mul_ps(d, d));
        }
        reduce(acc) + tail(a, b, LANES)
    }

    /// Horizontal sum of the eight lanes
    #[target_feature(enable = "avx")]
    #[inline]
    unsafe fn reduce(v: __m256) -> f32 {
        let mut lanes = [0f32; LANES];
        _mm256_storeu_ps(lanes.as_mut_ptr(), v);
        // Pairwise so the order is fixed
        let quads = [
            lanes[0] + lanes[4],
            lanes[1] + lanes[5],
            lanes[2] + lanes[6],
            lanes[3] + lanes[7],
        ];
        (quads[0] + quads[2]) + (quads[1] + quads[3])
    }
}

#[cfg(target_arch = "aarch64")]
mod arm {
    use super::*;

    const LANES: usize = 4;

    pub(super) fn squared_neon(a: &[f32], b: &[f32]) -> f32 {
        // NEON is part of the aarch64 baseline
        unsafe {
            let mut acc = vdupq_n_f32(0.0);
            for (ca, cb) in a.chunks_exact(LANES).zip(b.chunks_exact(LANES)) {
                let d = vsubq_f32(vld1q_f32(ca.as_ptr()), vld1q_f32(cb.as_ptr()));
                acc = vfmaq_f32(acc, d, d);
            }
            vaddvq_f32(acc) + tail(a, b, LANES)
        }
    }
}
