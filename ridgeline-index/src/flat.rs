//! # Flat Index (Brute-Force Exact Search)
//!
//! Exact squared-L2 nearest neighbor search over the normalized feature
//! matrix. No approximation, no quantization: every query scans every row.
//!
//! ## Architecture
//! - Vectors stored in contiguous memory in original row order
//! - Search: O(n) distance calculations, keep top-K in a heap
//! - Immutable after [`FlatIndex::build`]; a rebuild makes a new index
//!
//! ## File format
//!
//! ```text
//! magic: [u8; 8] = "RDGFLAT\0"
//! version: u32 | dimension: u32 | metric: u8 | count: u64
//! vectors: [f32; count * dimension], little endian, row-major
//! ```

use std::collections::BinaryHeap;
use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::Path;

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use tracing::debug;

use ridgeline_core::error::{Error, Result};
use ridgeline_core::Matrix;

use crate::neighbors::{Neighbor, Neighbors};
use crate::simd::{kernel_name, l2_distance_squared};

const FLAT_INDEX_MAGIC: &[u8; 8] = b"RDGFLAT\0";
const FLAT_INDEX_VERSION: u32 = 1;
const METRIC_L2: u8 = 1;

/// Flat index for exact nearest neighbor search
#[derive(Debug, Clone, PartialEq)]
pub struct FlatIndex {
    dimension: usize,
    /// Contiguous vector storage: [v0_d0, v0_d1, ..., v0_dn, v1_d0, ...]
    vectors: Vec<f32>,
    count: usize,
}

impl FlatIndex {
    /// Build over every row of `matrix`, keeping row order
    pub fn build(matrix: &Matrix<f32>) -> Result<Self> {
        if matrix.is_empty() || matrix.dim() == 0 {
            return Err(Error::MissingData {
                what: "cannot build an index over an empty matrix".to_string(),
            });
        }
        if let Some(pos) = matrix.as_slice().iter().position(|x| !x.is_finite()) {
            return Err(Error::MalformedDataset {
                message: format!(
                    "non-finite value at row {}, dimension {}",
                    pos / matrix.dim(),
                    pos % matrix.dim()
                ),
            });
        }

        debug!(
            rows = matrix.rows(),
            dimension = matrix.dim(),
            kernel = kernel_name(),
            "Building flat index"
        );
        Ok(Self {
            dimension: matrix.dim(),
            vectors: matrix.as_slice().to_vec(),
            count: matrix.rows(),
        })
    }

    /// Search for the `k` nearest rows by ascending squared L2 distance.
    ///
    /// Ties are broken by ascending row, so identical inputs always give
    /// identical output.
    pub fn search(&self, query: &[f32], k: usize) -> Result<Neighbors> {
        if query.len() != self.dimension {
            return Err(Error::dimension_mismatch(self.dimension, query.len()));
        }
        if k == 0 {
            return Ok(Neighbors::from_sorted(Vec::new(), 0));
        }

        // Use max-heap to keep top-K smallest distances
        let keep = k.min(self.count);
        let mut heap: BinaryHeap<Neighbor> = BinaryHeap::with_capacity(keep + 1);

        for (row, vec) in self.vectors.chunks_exact(self.dimension).enumerate() {
            let distance = l2_distance_squared(query, vec);
            heap.push(Neighbor { row, distance });
            if heap.len() > keep {
                heap.pop();
            }
        }

        // into_sorted_vec is ascending: smallest distance first
        Ok(Neighbors::from_sorted(heap.into_sorted_vec(), k))
    }

    /// Stored (normalized) vector of `row`
    pub fn get(&self, row: usize) -> Option<&[f32]> {
        (row < self.count).then(|| {
            let start = row * self.dimension;
            &self.vectors[start..start + self.dimension]
        })
    }

    pub fn len(&self) -> usize {
        self.count
    }

    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    pub fn dimension(&self) -> usize {
        self.dimension
    }

    pub fn write_to<W: Write>(&self, mut out: W) -> Result<()> {
        out.write_all(FLAT_INDEX_MAGIC)?;
        out.write_u32::<LittleEndian>(FLAT_INDEX_VERSION)?;
        out.write_u32::<LittleEndian>(self.dimension as u32)?;
        out.write_u8(METRIC_L2)?;
        out.write_u64::<LittleEndian>(self.count as u64)?;

        for &v in &self.vectors {
            out.write_f32::<LittleEndian>(v)?;
        }

        out.flush()?;
        Ok(())
    }

    pub fn read_from<R: Read>(mut input: R) -> Result<Self> {
        let truncated = |e: std::io::Error| Error::corrupt(format!("truncated flat index: {}", e));

        let mut magic = [0u8; 8];
        input.read_exact(&mut magic).map_err(truncated)?;
        if &magic != FLAT_INDEX_MAGIC {
            return Err(Error::corrupt("invalid flat index magic"));
        }

        let version = input.read_u32::<LittleEndian>().map_err(truncated)?;
        if version != FLAT_INDEX_VERSION {
            return Err(Error::corrupt(format!("unsupported flat index version: {}", version)));
        }

        let dimension = input.read_u32::<LittleEndian>().map_err(truncated)? as usize;
        let metric = input.read_u8().map_err(truncated)?;
        if metric != METRIC_L2 {
            return Err(Error::corrupt(format!("unsupported metric tag: {}", metric)));
        }
        let count = input.read_u64::<LittleEndian>().map_err(truncated)? as usize;
        if dimension == 0 || count == 0 {
            return Err(Error::corrupt("flat index has no vectors"));
        }

        let total = count
            .checked_mul(dimension)
            .ok_or_else(|| Error::corrupt("flat index size overflows"))?;
        let mut vectors = vec![0f32; total];
        input
            .read_f32_into::<LittleEndian>(&mut vectors)
            .map_err(truncated)?;

        let mut trailing = [0u8; 1];
        if input.read(&mut trailing)? != 0 {
            return Err(Error::corrupt("trailing bytes after flat index"));
        }

        Ok(Self { dimension, vectors, count })
    }

    /// Save index to disk
    pub fn save(&self, path: &Path) -> Result<()> {
        let file = File::create(path)?;
        let mut writer = BufWriter::new(file);
        self.write_to(&mut writer)?;
        writer.get_ref().sync_all()?;
        Ok(())
    }

    /// Load index from disk
    pub fn load(path: &Path) -> Result<Self> {
        let file = File::open(path)?;
        let index = Self::read_from(BufReader::new(file))?;
        debug!(path = %path.display(), rows = index.count, "Loaded flat index");
        Ok(index)
    }
}
