//! # Index Store
//!
//! Persists and reloads index generations. Each generation is a directory
//! holding three artifacts that are only meaningful together:
//!
//! ```text
//! <index_dir>/
//! ├── CURRENT                   # manifest naming the served generation
//! ├── gen-00000000000000000042/
//! │   ├── index.bin             # flat index over the normalized matrix
//! │   ├── mapping.json          # {"0": "a.png", "1": "b.png", ...}
//! │   └── scaler.json           # {"min": [...], "max": [...], "range": [...]}
//! └── gen-00000000000000000041/ # kept for `keep_generations`, then pruned
//! ```
//!
//! `CURRENT` also records a fingerprint of the raw matrix the generation was
//! built from. The raw matrix is reloaded from the dataset on restart and
//! must hash to the same value before the generation is served.
//!
//! A generation becomes visible only when `CURRENT` is renamed into place,
//! after its directory is fully written and synced. A crash before that
//! leaves the previous generation served and an orphan directory that the
//! next successful persist prunes.

use std::collections::HashMap;
use std::fs::{self, File};
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

use serde::Serialize;
use tracing::{debug, info, warn};

use ridgeline_core::config::IndexConfig;
use ridgeline_core::error::{Error, Result};
use ridgeline_core::utils::generate_timestamp_id;
use ridgeline_core::{GenerationId, Identity, Matrix};
use ridgeline_index::{FlatIndex, ScalerParams};

use crate::dataset::matrix_fingerprint;
use crate::manifest::{sync_dir, Manifest};

pub const INDEX_FILE: &str = "index.bin";
pub const MAPPING_FILE: &str = "mapping.json";
pub const SCALER_FILE: &str = "scaler.json";

/// The three artifacts of one generation, as read back from disk
#[derive(Debug, Clone)]
pub struct StoredGeneration {
    pub manifest: Manifest,
    pub index: FlatIndex,
    pub scaler: ScalerParams,
    /// Identity of each row, in row order
    pub identities: Vec<Identity>,
}

impl StoredGeneration {
    /// Check that `raw` is the matrix this generation was built from
    pub fn check_raw_matrix(&self, raw: &Matrix<f64>) -> Result<()> {
        if raw.rows() != self.manifest.total_vectors || raw.dim() != self.manifest.dimension {
            return Err(Error::corrupt(format!(
                "feature matrix is {}x{} but generation {} was built from {}x{}; rebuild the index",
                raw.rows(),
                raw.dim(),
                self.manifest.generation,
                self.manifest.total_vectors,
                self.manifest.dimension
            )));
        }
        if matrix_fingerprint(raw) != self.manifest.raw_fingerprint {
            return Err(Error::corrupt(format!(
                "feature matrix changed since generation {} was built; rebuild the index",
                self.manifest.generation
            )));
        }
        Ok(())
    }
}

/// Borrowed view of a freshly built generation, ready to persist
#[derive(Debug, Clone, Copy)]
pub struct GenerationArtifacts<'a> {
    pub generation: GenerationId,
    pub index: &'a FlatIndex,
    pub scaler: &'a ScalerParams,
    pub identities: &'a [Identity],
    /// Repaired raw matrix the index was built from
    pub raw: &'a Matrix<f64>,
}

pub struct IndexStore {
    dir: PathBuf,
    keep_generations: usize,
}

impl IndexStore {
    pub fn open(dir: impl Into<PathBuf>, keep_generations: usize) -> Result<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir).map_err(|e| Error::Io {
            message: format!("failed to create index directory {}", dir.display()),
            source: e,
        })?;
        Ok(Self { dir, keep_generations })
    }

    pub fn from_config(config: &IndexConfig) -> Result<Self> {
        Self::open(&config.dir, config.keep_generations)
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn generation_dir(&self, generation: GenerationId) -> PathBuf {
        self.dir.join(generation.dir_name())
    }

    /// Manifest of the served generation, if any
    pub fn current(&self) -> Result<Option<Manifest>> {
        Manifest::read(&self.dir)
    }

    /// A generation id greater than every id already on disk
    pub fn next_generation_id(&self) -> Result<GenerationId> {
        let newest = self.list_generations()?.into_iter().max().map(|g| g.0).unwrap_or(0);
        Ok(GenerationId(generate_timestamp_id().max(newest + 1)))
    }

    /// Write the artifacts, then switch `CURRENT` to them and prune.
    ///
    /// On error the previously published generation stays current.
    pub fn persist(&self, artifacts: GenerationArtifacts<'_>) -> Result<Manifest> {
        let GenerationArtifacts { generation, index, scaler, identities, raw } = artifacts;
        if identities.len() != index.len() {
            return Err(Error::DataInconsistency {
                vectors: index.len(),
                identities: identities.len(),
            });
        }
        if scaler.dimension() != index.dimension() {
            return Err(Error::dimension_mismatch(index.dimension(), scaler.dimension()));
        }
        if raw.rows() != index.len() || raw.dim() != index.dimension() {
            return Err(Error::MalformedDataset {
                message: format!(
                    "feature matrix is {}x{} but the index is {}x{}",
                    raw.rows(),
                    raw.dim(),
                    index.len(),
                    index.dimension()
                ),
            });
        }

        let gen_dir = self.generation_dir(generation);
        if gen_dir.exists() {
            fs::remove_dir_all(&gen_dir)?;
        }
        fs::create_dir_all(&gen_dir)?;

        index.save(&gen_dir.join(INDEX_FILE))?;
        let mapping: HashMap<String, &Identity> = identities
            .iter()
            .enumerate()
            .map(|(row, identity)| (row.to_string(), identity))
            .collect();
        write_json(&gen_dir.join(MAPPING_FILE), &mapping)?;
        write_json(&gen_dir.join(SCALER_FILE), scaler)?;
        sync_dir(&gen_dir)?;

        let manifest =
            Manifest::new(generation, index.len(), index.dimension(), matrix_fingerprint(raw));
        manifest.write_atomic(&self.dir)?;

        info!(
            generation = %generation,
            vectors = manifest.total_vectors,
            dimension = manifest.dimension,
            "Published index generation"
        );

        if let Err(e) = self.prune(generation) {
            warn!("Failed to prune old generations: {}", e);
        }

        Ok(manifest)
    }

    /// Load the generation `CURRENT` points at; `NotIndexed` if none
    pub fn load_current(&self) -> Result<StoredGeneration> {
        let manifest = self.current()?.ok_or(Error::NotIndexed)?;
        self.load_generation(manifest)
    }

    fn load_generation(&self, manifest: Manifest) -> Result<StoredGeneration> {
        let gen_dir = self.generation_dir(manifest.generation);
        for name in [INDEX_FILE, MAPPING_FILE, SCALER_FILE] {
            if !gen_dir.join(name).is_file() {
                return Err(Error::corrupt(format!(
                    "generation {} is missing {}",
                    manifest.generation, name
                )));
            }
        }

        let index = FlatIndex::load(&gen_dir.join(INDEX_FILE))?;
        let scaler: ScalerParams = read_json(&gen_dir.join(SCALER_FILE))?;
        let mapping: HashMap<String, Identity> = read_json(&gen_dir.join(MAPPING_FILE))?;

        scaler.validate()?;
        if scaler.dimension() != index.dimension() {
            return Err(Error::corrupt(format!(
                "scaler dimension {} does not match index dimension {}",
                scaler.dimension(),
                index.dimension()
            )));
        }
        if index.len() != manifest.total_vectors || index.dimension() != manifest.dimension {
            return Err(Error::corrupt(format!(
                "index holds {}x{}, manifest records {}x{}",
                index.len(),
                index.dimension(),
                manifest.total_vectors,
                manifest.dimension
            )));
        }
        let identities = mapping_to_rows(mapping, index.len())?;

        debug!(generation = %manifest.generation, "Loaded index generation from disk");
        Ok(StoredGeneration { manifest, index, scaler, identities })
    }

    /// Every generation directory present, in no particular order
    pub fn list_generations(&self) -> Result<Vec<GenerationId>> {
        let mut generations = Vec::new();
        for entry in fs::read_dir(&self.dir)? {
            let entry = entry?;
            if !entry.file_type()?.is_dir() {
                continue;
            }
            if let Some(id) = entry.file_name().to_str().and_then(GenerationId::from_dir_name) {
                generations.push(id);
            }
        }
        Ok(generations)
    }

    /// Remove generation directories beyond `current` and the
    /// `keep_generations` newest older ones. Returns how many were removed.
    pub fn prune(&self, current: GenerationId) -> Result<usize> {
        let mut older: Vec<GenerationId> = self
            .list_generations()?
            .into_iter()
            .filter(|g| *g != current)
            .collect();
        older.sort_unstable_by(|a, b| b.cmp(a));

        let mut removed = 0;
        for generation in older.into_iter().skip(self.keep_generations) {
            let path = self.generation_dir(generation);
            match fs::remove_dir_all(&path) {
                Ok(()) => {
                    removed += 1;
                    info!(generation = %generation, "Pruned old index generation");
                }
                Err(e) => warn!("Failed to remove {:?}: {}", path, e),
            }
        }
        Ok(removed)
    }
}

fn mapping_to_rows(mut mapping: HashMap<String, Identity>, rows: usize) -> Result<Vec<Identity>> {
    if mapping.len() != rows {
        return Err(Error::corrupt(format!(
            "mapping has {} entries but index has {} rows",
            mapping.len(),
            rows
        )));
    }
    (0..rows)
        .map(|row| {
            mapping
                .remove(&row.to_string())
                .ok_or_else(|| Error::corrupt(format!("mapping has no entry for row {}", row)))
        })
        .collect()
}

fn write_json<T: Serialize + ?Sized>(path: &Path, value: &T) -> Result<()> {
    let file = File::create(path)?;
    let mut writer = BufWriter::new(file);
    serde_json::to_writer_pretty(&mut writer, value)?;
    writer.flush()?;
    writer.get_ref().sync_all()?;
    Ok(())
}

fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T> {
    let file = File::open(path)?;
    serde_json::from_reader(BufReader::new(file))
        .map_err(|e| Error::corrupt(format!("unreadable {}: {}", path.display(), e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn artifacts() -> (Matrix<f64>, FlatIndex, ScalerParams, Vec<Identity>) {
        let raw = Matrix::from_rows(&[vec![0.0, 0.0], vec![1.0, 1.0], vec![10.0, 10.0]]).unwrap();
        let scaler = ScalerParams::fit(&raw).unwrap();
        let index = FlatIndex::build(&scaler.transform_matrix(&raw).unwrap()).unwrap();
        (raw, index, scaler, vec!["A".into(), "B".into(), "C".into()])
    }

    fn persist(store: &IndexStore, generation: u64) -> Manifest {
        let (raw, index, scaler, identities) = artifacts();
        store
            .persist(GenerationArtifacts {
                generation: GenerationId(generation),
                index: &index,
                scaler: &scaler,
                identities: &identities,
                raw: &raw,
            })
            .unwrap()
    }

    #[test]
    fn test_empty_store_is_not_indexed() {
        let dir = TempDir::new().unwrap();
        let store = IndexStore::open(dir.path(), 1).unwrap();
        assert!(matches!(store.load_current(), Err(Error::NotIndexed)));
    }

    #[test]
    fn test_mapping_keys_are_row_strings() {
        let dir = TempDir::new().unwrap();
        let store = IndexStore::open(dir.path(), 1).unwrap();
        persist(&store, 1);

        let raw = fs::read_to_string(store.generation_dir(GenerationId(1)).join(MAPPING_FILE)).unwrap();
        let mapping: HashMap<String, String> = serde_json::from_str(&raw).unwrap();
        assert_eq!(mapping["0"], "A");
        assert_eq!(mapping["2"], "C");
    }

    #[test]
    fn test_raw_matrix_check() {
        let dir = TempDir::new().unwrap();
        let store = IndexStore::open(dir.path(), 1).unwrap();
        persist(&store, 1);
        let stored = store.load_current().unwrap();

        let (raw, ..) = artifacts();
        stored.check_raw_matrix(&raw).unwrap();

        let edited = Matrix::from_rows(&[vec![0.0, 0.0], vec![9.0, 9.0], vec![10.0, 10.0]]).unwrap();
        assert!(matches!(stored.check_raw_matrix(&edited), Err(Error::CorruptIndex { .. })));

        let short = Matrix::from_rows(&[vec![0.0, 0.0], vec![10.0, 10.0]]).unwrap();
        assert!(matches!(stored.check_raw_matrix(&short), Err(Error::CorruptIndex { .. })));
    }

    #[test]
    fn test_mapping_with_gap_is_corrupt() {
        let mapping: HashMap<String, Identity> =
            [("0".to_string(), "A".to_string()), ("2".to_string(), "C".to_string())].into();
        assert!(matches!(mapping_to_rows(mapping, 2), Err(Error::CorruptIndex { .. })));
    }

    #[test]
    fn test_prune_keeps_requested_generations() {
        let dir = TempDir::new().unwrap();
        let store = IndexStore::open(dir.path(), 1).unwrap();
        for generation in 1..=4 {
            persist(&store, generation);
        }
        let mut left = store.list_generations().unwrap();
        left.sort();
        assert_eq!(left, vec![GenerationId(3), GenerationId(4)]);
    }

    #[test]
    fn test_next_generation_id_is_monotonic() {
        let dir = TempDir::new().unwrap();
        let store = IndexStore::open(dir.path(), 0).unwrap();
        persist(&store, u64::MAX / 2);
        assert!(store.next_generation_id().unwrap() > GenerationId(u64::MAX / 2));
    }
}
