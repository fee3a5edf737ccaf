//! # Rebuild Pipeline
//!
//! ```text
//! Load ──> Normalize ──> Build Index ──> Build Mapping ──> Persist
//! ```
//!
//! Each stage runs to completion before the next starts. A failing stage
//! aborts the rebuild with `Error::Build { stage, .. }`; nothing is published
//! until Persist finishes, so the served generation is untouched.

use std::collections::HashSet;

use tracing::{info, instrument};

use ridgeline_core::error::{Error, Result};
use ridgeline_core::metrics::Timer;
use ridgeline_core::{BuildStage, BuildStats};
use ridgeline_index::{FlatIndex, Normalizer};
use ridgeline_storage::{DatasetLoader, GenerationArtifacts, IndexStore};

use crate::generation::Generation;

trait StageExt<T> {
    fn stage(self, stage: BuildStage) -> Result<T>;
}

impl<T> StageExt<T> for Result<T> {
    fn stage(self, stage: BuildStage) -> Result<T> {
        self.map_err(|e| e.at_stage(stage))
    }
}

pub struct RebuildPipeline<'a> {
    loader: DatasetLoader,
    store: &'a IndexStore,
}

impl<'a> RebuildPipeline<'a> {
    pub fn new(loader: DatasetLoader, store: &'a IndexStore) -> Self {
        Self { loader, store }
    }

    /// Run every stage; returns the published generation and its stats
    #[instrument(skip(self), fields(vectors = %self.loader.vectors_path().display()))]
    pub fn run(&self) -> Result<(Generation, BuildStats)> {
        let timer = Timer::new("rebuild");

        info!(stage = %BuildStage::Load, "Rebuild stage started");
        let dataset = self.loader.load().stage(BuildStage::Load)?;
        let repaired_values = dataset.repaired_values();

        info!(stage = %BuildStage::Normalize, rows = dataset.rows(), "Rebuild stage started");
        let mut normalizer = Normalizer::new();
        let normalized = normalizer
            .fit_transform(dataset.matrix())
            .stage(BuildStage::Normalize)?;
        let scaler = normalizer.into_params().stage(BuildStage::Normalize)?;
        let constant_dimensions = scaler.constant_dimensions();
        if constant_dimensions > 0 {
            info!(constant_dimensions, "Constant dimensions normalized to 0.0");
        }

        info!(stage = %BuildStage::BuildIndex, "Rebuild stage started");
        let index = FlatIndex::build(&normalized).stage(BuildStage::BuildIndex)?;
        drop(normalized);

        info!(stage = %BuildStage::BuildMapping, "Rebuild stage started");
        let identities = dataset.identities();
        check_unique(&identities).stage(BuildStage::BuildMapping)?;
        if identities.len() != index.len() {
            return Err(Error::DataInconsistency {
                vectors: index.len(),
                identities: identities.len(),
            }
            .at_stage(BuildStage::BuildMapping));
        }

        info!(stage = %BuildStage::Persist, "Rebuild stage started");
        let generation_id = self.store.next_generation_id().stage(BuildStage::Persist)?;
        let manifest = self
            .store
            .persist(GenerationArtifacts {
                generation: generation_id,
                index: &index,
                scaler: &scaler,
                identities: &identities,
                raw: dataset.matrix(),
            })
            .stage(BuildStage::Persist)?;

        let (raw, _) = dataset.into_parts();
        let generation = Generation::new(
            manifest.generation,
            manifest.created_at,
            index,
            scaler,
            identities,
            raw,
        )
        .stage(BuildStage::Persist)?;

        let elapsed = timer.stop();
        let stats = BuildStats {
            generation: manifest.generation,
            total_vectors: manifest.total_vectors,
            dimension: manifest.dimension,
            constant_dimensions,
            repaired_values,
            elapsed_ms: elapsed.as_millis() as u64,
            created_at: manifest.created_at,
        };
        info!(
            generation = %stats.generation,
            vectors = stats.total_vectors,
            dimension = stats.dimension,
            elapsed_ms = stats.elapsed_ms,
            "Rebuild completed"
        );
        Ok((generation, stats))
    }
}

/// Row to identity must be one-to-one
fn check_unique(identities: &[String]) -> Result<()> {
    let mut seen = HashSet::with_capacity(identities.len());
    for (row, identity) in identities.iter().enumerate() {
        if !seen.insert(identity.as_str()) {
            return Err(Error::MalformedDataset {
                message: format!("identity {:?} appears again at row {}", identity, row),
            });
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use ridgeline_core::Matrix;
    use ridgeline_storage::npy::write_npy_file;
    use ridgeline_storage::{write_metadata, ItemMetadata};
    use tempfile::TempDir;

    fn inputs(dir: &TempDir, rows: &[Vec<f64>], names: &[&str]) -> DatasetLoader {
        let vectors = dir.path().join("vectors.npy");
        let metadata = dir.path().join("metadata.json");
        write_npy_file(&vectors, &Matrix::from_rows(rows).unwrap()).unwrap();
        let items: Vec<_> = names.iter().map(|n| ItemMetadata::new(*n)).collect();
        write_metadata(&metadata, &items).unwrap();
        DatasetLoader::new(vectors, metadata)
    }

    #[test]
    fn test_failure_names_stage() {
        let dir = TempDir::new().unwrap();
        let store = IndexStore::open(dir.path().join("index"), 1).unwrap();
        let loader = DatasetLoader::new(dir.path().join("missing.npy"), dir.path().join("m.json"));

        match RebuildPipeline::new(loader, &store).run() {
            Err(Error::Build { stage, source }) => {
                assert_eq!(stage, BuildStage::Load);
                assert!(matches!(*source, Error::MissingData { .. }));
            }
            other => panic!("unexpected: {other:?}"),
        }
        assert!(store.current().unwrap().is_none());
    }

    #[test]
    fn test_duplicate_identity_fails_mapping() {
        let dir = TempDir::new().unwrap();
        let store = IndexStore::open(dir.path().join("index"), 1).unwrap();
        let loader = inputs(&dir, &[vec![0.0], vec![1.0]], &["same.png", "same.png"]);

        match RebuildPipeline::new(loader, &store).run() {
            Err(Error::Build { stage, .. }) => assert_eq!(stage, BuildStage::BuildMapping),
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn test_stats_reflect_dataset() {
        let dir = TempDir::new().unwrap();
        let store = IndexStore::open(dir.path().join("index"), 1).unwrap();
        let loader = inputs(
            &dir,
            &[vec![1.0, 5.0, f64::INFINITY], vec![2.0, 5.0, 0.5], vec![3.0, 5.0, 0.0]],
            &["a", "b", "c"],
        );

        let (generation, stats) = RebuildPipeline::new(loader, &store).run().unwrap();
        assert_eq!(stats.total_vectors, 3);
        assert_eq!(stats.dimension, 3);
        assert_eq!(stats.constant_dimensions, 1);
        assert_eq!(stats.repaired_values, 1);
        assert_eq!(generation.id(), stats.generation);
        assert_eq!(store.current().unwrap().unwrap().generation, stats.generation);
    }
}
