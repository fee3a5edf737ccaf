//! # Core Types
//!
//! Data structures shared by the index, storage and api crates.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;

/// Timestamp type used throughout the system
pub type Timestamp = DateTime<Utc>;

/// Raw feature vector as produced by the extraction pipeline
pub type FeatureVector = Vec<f64>;

/// Identity of an indexed item (source filename)
pub type Identity = String;

/// Identifier of one index generation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct GenerationId(pub u64);

impl GenerationId {
    /// Directory name for this generation inside the index directory
    pub fn dir_name(&self) -> String {
        format!("gen-{:020}", self.0)
    }

    /// Parse a directory name produced by [`GenerationId::dir_name`]
    pub fn from_dir_name(name: &str) -> Option<Self> {
        name.strip_prefix("gen-")?.parse().ok().map(GenerationId)
    }
}

impl fmt::Display for GenerationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// One ranked hit returned by a similarity search
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchResult {
    /// 1-based rank
    pub rank: usize,
    pub identity: Identity,
    /// In (0, 1]; exactly 1.0 for the query's own row
    pub similarity: f64,
    /// Squared L2 distance in normalized space
    pub distance: f64,
    /// Row of the hit in the indexed matrix
    pub row: usize,
    /// Whether this hit is the query itself
    pub is_query: bool,
}

impl SearchResult {
    /// Result ordering: the query's own row first, then similarity desc,
    /// distance asc, row asc.
    ///
    /// Distinct raw rows can collapse to the same `f32` normalized row, so
    /// similarity alone cannot keep the query's row on top.
    pub fn ranking_cmp(&self, other: &Self) -> Ordering {
        other
            .is_query
            .cmp(&self.is_query)
            .then_with(|| other.similarity.total_cmp(&self.similarity))
            .then_with(|| self.distance.total_cmp(&other.distance))
            .then_with(|| self.row.cmp(&other.row))
    }
}

/// Snapshot of what the engine currently serves
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexStats {
    pub total_vectors: usize,
    pub dimension: usize,
    pub indexed: bool,
    pub generation: Option<GenerationId>,
}

impl IndexStats {
    pub fn empty() -> Self {
        Self {
            total_vectors: 0,
            dimension: 0,
            indexed: false,
            generation: None,
        }
    }
}

/// Outcome of a successful rebuild
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BuildStats {
    pub generation: GenerationId,
    pub total_vectors: usize,
    pub dimension: usize,
    /// Dimensions whose range was forced to 1.0
    pub constant_dimensions: usize,
    /// Non-finite matrix entries repaired at load time
    pub repaired_values: usize,
    pub elapsed_ms: u64,
    pub created_at: Timestamp,
}
