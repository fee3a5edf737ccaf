//! # Ridgeline Vector Index
//!
//! Normalization and exact nearest neighbor search over feature vectors.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                    Vector Index Layer                       │
//! ├─────────────────────────────────────────────────────────────┤
//! │                                                             │
//! │  ┌─────────────┐    ┌─────────────┐    ┌─────────────┐      │
//! │  │    SIMD     │    │   Scaler    │    │    Flat     │      │
//! │  │   Math      │    │  (min-max)  │    │   Index     │      │
//! │  │  (AVX2)     │    │             │    │  (Exact L2) │      │
//! │  └─────────────┘    └─────────────┘    └─────────────┘      │
//! │                                                             │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Modules
//!
//! - `simd`: SIMD-accelerated squared L2 distance (AVX2/FMA, NEON)
//! - `scaler`: Per-dimension min-max normalization into [0, 1]
//! - `flat`: Brute-force exact search
//! - `neighbors`: Top-k heap entries and fixed-width results

pub mod flat;
pub mod neighbors;
pub mod scaler;
pub mod simd;

pub use flat::FlatIndex;
pub use neighbors::{Neighbor, Neighbors, NO_NEIGHBOR};
pub use scaler::{Normalizer, ScalerParams};
pub use simd::{all_close, kernel_name, l2_distance, l2_distance_f64, l2_distance_squared};
