//! # Ridgeline Storage
//!
//! Everything that touches disk: the rebuild inputs and the persisted index
//! generations.
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                      Rebuild Inputs                         │
//! │                                                             │
//! │  vectors.npy ──> npy reader ──┐                             │
//! │                               ├──> DatasetLoader ──> Dataset│
//! │  metadata.json ───────────────┘    (repair, count check)    │
//! └─────────────────────────────────────────────────────────────┘
//!
//! ┌─────────────────────────────────────────────────────────────┐
//! │                   Persisted Generations                     │
//! │                                                             │
//! │  IndexStore ──> gen-<id>/{index.bin, mapping.json,          │
//! │                           scaler.json}                      │
//! │             ──> fingerprint of the raw matrix in CURRENT    │
//! │             ──> CURRENT (temp file + rename)                │
//! └─────────────────────────────────────────────────────────────┘
//! ```

pub mod dataset;
pub mod manifest;
pub mod npy;
pub mod store;

pub use dataset::{matrix_fingerprint, write_metadata, Dataset, DatasetLoader, ItemMetadata};
pub use manifest::Manifest;
pub use store::{GenerationArtifacts, IndexStore, StoredGeneration};
