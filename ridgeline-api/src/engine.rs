//! # Similarity Search Engine
//!
//! Serves queries against the active [`Generation`] and swaps in new ones
//! after a rebuild.
//!
//! ## Concurrency
//!
//! ```text
//! query ──> read lock ──> clone Arc<Generation> ──> unlock ──> search
//! rebuild ──> rebuild mutex ──> pipeline ──> write lock ──> swap Arc
//! ```
//!
//! Readers hold the lock only long enough to clone the handle, so a query
//! that started before a swap finishes against the generation it cloned.
//! Rebuilds are serialized; readers never wait for one.

use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, warn};

use ridgeline_core::error::{Error, Result};
use ridgeline_core::metrics::{Metrics, Timer};
use ridgeline_core::{BuildStats, Config, FeatureVector, Identity, IndexStats, SearchResult};
use ridgeline_storage::{DatasetLoader, IndexStore};

use crate::extractor::{
    FeatureExtractor, GrayImage, Preprocessor, RawPixelPreprocessor, UnconfiguredExtractor,
};
use crate::generation::{Generation, SearchOutcome};
use crate::pipeline::RebuildPipeline;
use crate::search_log::{QueryInfo, SearchLog};

pub struct SearchEngine {
    config: Config,
    store: IndexStore,
    active: RwLock<Option<Arc<Generation>>>,
    rebuild_lock: Mutex<()>,
    preprocessor: Arc<dyn Preprocessor>,
    extractor: Arc<dyn FeatureExtractor>,
    search_log: Option<SearchLog>,
    metrics: Metrics,
}

/// Outcome of checking that every row finds itself
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VerifyReport {
    pub checked: usize,
    pub failures: Vec<VerifyFailure>,
}

impl VerifyReport {
    pub fn passed(&self) -> bool {
        self.failures.is_empty()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VerifyFailure {
    pub row: usize,
    pub identity: Identity,
    /// Row that ranked first instead, if any result came back
    pub top_row: Option<usize>,
    pub top_similarity: Option<f64>,
}

impl SearchEngine {
    /// Engine with nothing loaded. Creates the index directory.
    pub fn new(config: Config) -> Result<Self> {
        let store = IndexStore::from_config(&config.index)?;
        let search_log = if config.search_log.enabled {
            Some(SearchLog::open(&config.search_log.dir)?)
        } else {
            None
        };

        Ok(Self {
            config,
            store,
            active: RwLock::new(None),
            rebuild_lock: Mutex::new(()),
            preprocessor: Arc::new(RawPixelPreprocessor),
            extractor: Arc::new(UnconfiguredExtractor),
            search_log,
            metrics: Metrics::new(),
        })
    }

    /// Engine serving the persisted generation, if there is one
    pub fn open(config: Config) -> Result<Self> {
        let engine = Self::new(config)?;
        engine.load()?;
        Ok(engine)
    }

    pub fn with_extractor(
        mut self,
        preprocessor: Arc<dyn Preprocessor>,
        extractor: Arc<dyn FeatureExtractor>,
    ) -> Self {
        self.preprocessor = preprocessor;
        self.extractor = extractor;
        self
    }

    /// (Re)load the generation `CURRENT` names. `Ok(false)` when the store
    /// has never been built.
    pub fn load(&self) -> Result<bool> {
        let stored = match self.store.load_current() {
            Ok(stored) => stored,
            Err(Error::NotIndexed) => {
                info!(dir = %self.store.dir().display(), "No index generation published yet");
                return Ok(false);
            }
            Err(e) => {
                error!("Failed to load index generation: {}", e);
                return Err(e);
            }
        };

        let (raw, _) = DatasetLoader::from_config(&self.config.dataset).load_matrix()?;
        let generation = Generation::from_stored(stored, raw)?;
        info!(
            generation = %generation.id(),
            vectors = generation.len(),
            dimension = generation.dimension(),
            "Index generation loaded"
        );
        self.swap(generation);
        Ok(true)
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn metrics(&self) -> &Metrics {
        &self.metrics
    }

    pub fn search_log(&self) -> Option<&SearchLog> {
        self.search_log.as_ref()
    }

    /// The generation queries currently run against
    pub fn current(&self) -> Option<Arc<Generation>> {
        self.active.read().clone()
    }

    pub fn is_indexed(&self) -> bool {
        self.active.read().is_some()
    }

    pub fn stats(&self) -> IndexStats {
        self.current().map(|g| g.stats()).unwrap_or_else(IndexStats::empty)
    }

    /// Top-`k` most similar rows to a raw feature vector
    pub fn search_by_vector(&self, vector: &[f64], k: usize) -> Result<Vec<SearchResult>> {
        self.search_vector(vector, k, None)
    }

    /// Search with a vector that came out of [`SearchEngine::extract_features`]
    pub fn search_extracted(
        &self,
        vector: &[f64],
        k: usize,
        image_bytes: usize,
    ) -> Result<Vec<SearchResult>> {
        self.search_vector(vector, k, Some(image_bytes))
    }

    /// Image bytes as the configured extractor would receive them
    pub async fn preprocess_image(&self, image: &[u8]) -> Result<GrayImage> {
        self.preprocessor.preprocess(image).await
    }

    /// Preprocess and extract; the vector then goes through the vector path
    pub async fn extract_features(&self, image: &[u8]) -> Result<FeatureVector> {
        self.metrics.record_image_search();
        let preprocessed = self.preprocess_image(image).await?;
        let vector = self.extractor.extract(&preprocessed).await?;
        debug!(
            width = preprocessed.width,
            height = preprocessed.height,
            dimension = vector.len(),
            "Extracted features from image"
        );
        Ok(vector)
    }

    pub async fn search_by_image(&self, image: &[u8], k: usize) -> Result<Vec<SearchResult>> {
        let vector = self.extract_features(image).await?;
        self.search_extracted(&vector, k, image.len())
    }

    fn search_vector(
        &self,
        vector: &[f64],
        k: usize,
        image_bytes: Option<usize>,
    ) -> Result<Vec<SearchResult>> {
        let timer = Timer::new("search");
        let result = self.run_search(vector, k);
        let elapsed = timer.stop();

        let (outcome, k) = match result {
            Ok(found) => found,
            Err(e) => {
                self.metrics.record_search_error();
                return Err(e);
            }
        };

        self.metrics.record_vector_search(elapsed);
        self.metrics.record_resolution(outcome.exact_match);
        debug!(
            self_row = outcome.self_row,
            exact = outcome.exact_match,
            results = outcome.results.len(),
            "Search completed"
        );

        if let Some(log) = &self.search_log {
            let query = match image_bytes {
                Some(bytes) => QueryInfo::Image { bytes, top_k: k },
                None => QueryInfo::Vector {
                    dimension: vector.len(),
                    top_k: k,
                    self_row: outcome.self_row,
                    exact_match: outcome.exact_match,
                },
            };
            if let Err(e) = log.record(query, &outcome.results) {
                warn!("Failed to record search result: {}", e);
            }
        }

        Ok(outcome.results)
    }

    fn run_search(&self, vector: &[f64], k: usize) -> Result<(SearchOutcome, usize)> {
        if k == 0 {
            return Err(Error::MalformedQuery {
                message: "top_k must be at least 1".to_string(),
            });
        }
        let k = k.min(self.config.search.max_top_k);
        let generation = self.current().ok_or(Error::NotIndexed)?;

        generation
            .search(vector, k, &self.config.search)
            .map(|outcome| (outcome, k))
            .map_err(|e| match e {
                e @ (Error::NotIndexed | Error::MalformedQuery { .. }) => e,
                other => Error::Search {
                    message: other.to_string(),
                },
            })
    }

    /// Rebuild from the dataset and swap the new generation in.
    ///
    /// On failure the served generation and the persisted one are unchanged.
    pub fn rebuild(&self) -> Result<BuildStats> {
        let _guard = self.rebuild_lock.lock();

        let loader = DatasetLoader::from_config(&self.config.dataset);
        match RebuildPipeline::new(loader, &self.store).run() {
            Ok((generation, stats)) => {
                self.metrics.record_rebuild(true);
                self.swap(generation);
                Ok(stats)
            }
            Err(e) => {
                self.metrics.record_rebuild(false);
                error!("Rebuild failed: {}", e);
                Err(e)
            }
        }
    }

    fn swap(&self, generation: Generation) {
        let id = generation.id();
        let previous = self.active.write().replace(Arc::new(generation));
        self.metrics.record_swap();
        info!(
            generation = %id,
            previous = ?previous.map(|g| g.id()),
            "Active index generation swapped"
        );
    }

    /// Query every indexed row with its own vector; each must come back
    /// first, marked as the query, with similarity exactly 1.0.
    pub fn verify(&self) -> Result<VerifyReport> {
        let generation = self.current().ok_or(Error::NotIndexed)?;
        let mut failures = Vec::new();

        for (row, values) in generation.raw().iter_rows().enumerate() {
            let outcome = generation.search(values, 1, &self.config.search)?;
            let top = outcome.results.first();
            let ok = top.map_or(false, |hit| hit.row == row && hit.is_query && hit.similarity == 1.0);
            if !ok {
                failures.push(VerifyFailure {
                    row,
                    identity: generation.identity(row).cloned().unwrap_or_default(),
                    top_row: top.map(|hit| hit.row),
                    top_similarity: top.map(|hit| hit.similarity),
                });
            }
        }

        if failures.is_empty() {
            info!(checked = generation.len(), "Self-query verification passed");
        } else {
            warn!(
                checked = generation.len(),
                failed = failures.len(),
                "Self-query verification found failures"
            );
        }
        Ok(VerifyReport {
            checked: generation.len(),
            failures,
        })
    }
}
