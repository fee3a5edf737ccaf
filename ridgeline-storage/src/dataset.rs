//! # Dataset Loader
//!
//! Loads the rebuild inputs: the raw N×D feature matrix (`.npy`) and the
//! N-item metadata list (JSON). Non-finite matrix entries are repaired in a
//! single pass before anything else sees the matrix.

use std::collections::BTreeMap;
use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use ridgeline_core::config::DatasetConfig;
use ridgeline_core::error::{Error, Result};
use ridgeline_core::sanitize::repair_matrix;
use ridgeline_core::{Identity, Matrix};

use crate::npy;

/// Metadata of one extracted image
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ItemMetadata {
    /// Source file name; becomes the row's identity
    pub filename: Identity,
    /// Per-descriptor breakdown of the feature vector
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub descriptors: BTreeMap<String, Vec<f64>>,
}

impl ItemMetadata {
    pub fn new(filename: impl Into<Identity>) -> Self {
        Self {
            filename: filename.into(),
            descriptors: BTreeMap::new(),
        }
    }
}

/// Validated rebuild input: row `i` of the matrix belongs to item `i`
#[derive(Debug, Clone)]
pub struct Dataset {
    matrix: Matrix<f64>,
    items: Vec<ItemMetadata>,
    repaired_values: usize,
}

impl Dataset {
    pub fn new(matrix: Matrix<f64>, items: Vec<ItemMetadata>) -> Result<Self> {
        if matrix.is_empty() {
            return Err(Error::MissingData {
                what: "feature matrix has no rows".to_string(),
            });
        }
        if matrix.rows() != items.len() {
            return Err(Error::DataInconsistency {
                vectors: matrix.rows(),
                identities: items.len(),
            });
        }
        Ok(Self {
            matrix,
            items,
            repaired_values: 0,
        })
    }

    pub fn rows(&self) -> usize {
        self.matrix.rows()
    }

    pub fn dimension(&self) -> usize {
        self.matrix.dim()
    }

    pub fn matrix(&self) -> &Matrix<f64> {
        &self.matrix
    }

    pub fn items(&self) -> &[ItemMetadata] {
        &self.items
    }

    /// Identities in row order
    pub fn identities(&self) -> Vec<Identity> {
        self.items.iter().map(|item| item.filename.clone()).collect()
    }

    /// Number of non-finite matrix entries repaired at load time
    pub fn repaired_values(&self) -> usize {
        self.repaired_values
    }

    pub fn into_parts(self) -> (Matrix<f64>, Vec<ItemMetadata>) {
        (self.matrix, self.items)
    }
}

/// Reads the matrix and metadata sources named in the dataset config
#[derive(Debug, Clone)]
pub struct DatasetLoader {
    vectors_path: PathBuf,
    metadata_path: PathBuf,
}

impl DatasetLoader {
    pub fn new(vectors_path: impl Into<PathBuf>, metadata_path: impl Into<PathBuf>) -> Self {
        Self {
            vectors_path: vectors_path.into(),
            metadata_path: metadata_path.into(),
        }
    }

    pub fn from_config(config: &DatasetConfig) -> Self {
        Self::new(&config.vectors_path, &config.metadata_path)
    }

    pub fn vectors_path(&self) -> &Path {
        &self.vectors_path
    }

    /// Load both sources and check they describe the same rows
    pub fn load(&self) -> Result<Dataset> {
        let (matrix, repaired) = self.load_matrix()?;
        let items = self.load_metadata()?;

        let mut dataset = Dataset::new(matrix, items)?;
        dataset.repaired_values = repaired;

        info!(
            rows = dataset.rows(),
            dimension = dataset.dimension(),
            repaired,
            "Dataset loaded"
        );
        Ok(dataset)
    }

    /// Load the raw matrix alone, repaired; returns the repair count too
    pub fn load_matrix(&self) -> Result<(Matrix<f64>, usize)> {
        if !self.vectors_path.exists() {
            return Err(Error::MissingData {
                what: format!("feature matrix not found at {}", self.vectors_path.display()),
            });
        }

        let mut matrix = npy::read_npy_file(&self.vectors_path)?;
        let repaired = repair_matrix(matrix.as_mut_slice());
        if repaired > 0 {
            warn!(
                repaired,
                path = %self.vectors_path.display(),
                "Repaired non-finite values in feature matrix"
            );
        }
        Ok((matrix, repaired))
    }

    pub fn load_metadata(&self) -> Result<Vec<ItemMetadata>> {
        if !self.metadata_path.exists() {
            return Err(Error::MissingData {
                what: format!("metadata not found at {}", self.metadata_path.display()),
            });
        }
        let file = File::open(&self.metadata_path)?;
        let items: Vec<ItemMetadata> =
            serde_json::from_reader(BufReader::new(file)).map_err(|e| Error::MalformedDataset {
                message: format!("invalid metadata {}: {}", self.metadata_path.display(), e),
            })?;
        Ok(items)
    }
}

/// BLAKE3 over the shape and the little-endian bytes of every value, as hex.
///
/// Taken after repair, so a reload of unchanged sources reproduces it.
pub fn matrix_fingerprint(matrix: &Matrix<f64>) -> String {
    let mut hasher = blake3::Hasher::new();
    hasher.update(&(matrix.rows() as u64).to_le_bytes());
    hasher.update(&(matrix.dim() as u64).to_le_bytes());
    let mut buf = Vec::with_capacity(matrix.dim() * 8);
    for row in matrix.iter_rows() {
        buf.clear();
        for value in row {
            buf.extend_from_slice(&value.to_le_bytes());
        }
        hasher.update(&buf);
    }
    hasher.finalize().to_hex().to_string()
}

/// Write a metadata list in the format [`DatasetLoader`] reads
pub fn write_metadata(path: &Path, items: &[ItemMetadata]) -> Result<()> {
    let file = File::create(path)?;
    let mut writer = BufWriter::new(file);
    serde_json::to_writer_pretty(&mut writer, items)?;
    writer.flush()?;
    Ok(())
}
