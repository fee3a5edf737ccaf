//! # Ridgeline Core
//!
//! Fundamental building blocks shared by every Ridgeline crate:
//! - Core data structures
//! - Error types
//! - Configuration
//! - Vector sanitization
//! - Metrics
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────┐
//! │                 ridgeline-core                  │
//! ├─────────────────────────────────────────────────┤
//! │  • types     - Search results, stats, ids      │
//! │  • error     - Typed error taxonomy            │
//! │  • matrix    - Row-major feature matrix        │
//! │  • config    - YAML + env configuration        │
//! │  • sanitize  - Non-finite value repair         │
//! │  • metrics   - Search/rebuild counters         │
//! │  • utils     - Common utilities                │
//! └─────────────────────────────────────────────────┘
//! ```

pub mod config;
pub mod error;
pub mod matrix;
pub mod metrics;
pub mod sanitize;
pub mod types;
pub mod utils;

// Re-export commonly used types
pub use config::Config;
pub use error::{BuildStage, Error, Result};
pub use matrix::Matrix;
pub use sanitize::{sanitize, sanitize_in_place};
pub use types::{
    BuildStats, FeatureVector, GenerationId, Identity, IndexStats, SearchResult, Timestamp,
};

/// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
