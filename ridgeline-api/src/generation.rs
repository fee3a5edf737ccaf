//! # Index Generation
//!
//! Everything one query needs, bundled so it can never be seen half-updated:
//! the flat index, the scaler it was built with, the row identities and the
//! raw matrix used to resolve a query to its own row.

use ridgeline_core::config::SearchConfig;
use ridgeline_core::error::{Error, Result};
use ridgeline_core::{sanitize, GenerationId, Identity, IndexStats, Matrix, SearchResult, Timestamp};
use ridgeline_index::{all_close, l2_distance_f64, FlatIndex, ScalerParams};
use ridgeline_storage::StoredGeneration;

#[derive(Debug)]
pub struct Generation {
    id: GenerationId,
    created_at: Timestamp,
    index: FlatIndex,
    scaler: ScalerParams,
    identities: Vec<Identity>,
    raw: Matrix<f64>,
}

/// Result of one search plus how the query was resolved
#[derive(Debug, Clone)]
pub struct SearchOutcome {
    pub results: Vec<SearchResult>,
    pub self_row: usize,
    pub exact_match: bool,
}

impl Generation {
    pub fn new(
        id: GenerationId,
        created_at: Timestamp,
        index: FlatIndex,
        scaler: ScalerParams,
        identities: Vec<Identity>,
        raw: Matrix<f64>,
    ) -> Result<Self> {
        if identities.len() != index.len() {
            return Err(Error::corrupt(format!(
                "{} identities for {} indexed rows",
                identities.len(),
                index.len()
            )));
        }
        if raw.rows() != index.len() || raw.dim() != index.dimension() {
            return Err(Error::corrupt(format!(
                "feature matrix is {}x{} but the index is {}x{}",
                raw.rows(),
                raw.dim(),
                index.len(),
                index.dimension()
            )));
        }
        if scaler.dimension() != index.dimension() {
            return Err(Error::corrupt(format!(
                "scaler dimension {} does not match index dimension {}",
                scaler.dimension(),
                index.dimension()
            )));
        }
        Ok(Self { id, created_at, index, scaler, identities, raw })
    }

    /// Pair a persisted generation with the raw matrix reloaded from the
    /// dataset. The matrix must hash to the fingerprint recorded at build time.
    pub fn from_stored(stored: StoredGeneration, raw: Matrix<f64>) -> Result<Self> {
        stored.check_raw_matrix(&raw)?;

        let StoredGeneration { manifest, index, scaler, identities } = stored;
        Self::new(manifest.generation, manifest.created_at, index, scaler, identities, raw)
    }

    pub fn id(&self) -> GenerationId {
        self.id
    }

    pub fn created_at(&self) -> Timestamp {
        self.created_at
    }

    pub fn len(&self) -> usize {
        self.index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    pub fn dimension(&self) -> usize {
        self.index.dimension()
    }

    pub fn scaler(&self) -> &ScalerParams {
        &self.scaler
    }

    pub fn index(&self) -> &FlatIndex {
        &self.index
    }

    pub fn raw(&self) -> &Matrix<f64> {
        &self.raw
    }

    pub fn identity(&self, row: usize) -> Option<&Identity> {
        self.identities.get(row)
    }

    pub fn stats(&self) -> IndexStats {
        IndexStats {
            total_vectors: self.len(),
            dimension: self.dimension(),
            indexed: true,
            generation: Some(self.id),
        }
    }

    /// Row the query stands for: the first row equal to it within
    /// `tolerance` on every dimension, else the nearest raw row (lowest row
    /// on ties).
    pub fn resolve_self_row(&self, query: &[f64], tolerance: f64) -> (usize, bool) {
        let mut best: Option<(usize, f64)> = None;
        for (row, values) in self.raw.iter_rows().enumerate() {
            if all_close(values, query, tolerance) {
                return (row, true);
            }
            let d = l2_distance_f64(values, query);
            if best.map_or(true, |(_, best_d)| d.total_cmp(&best_d).is_lt()) {
                best = Some((row, d));
            }
        }
        (best.map_or(0, |(row, _)| row), false)
    }

    /// Top-`k` rows for a raw query vector. `k` must be at least 1.
    pub fn search(&self, query: &[f64], k: usize, params: &SearchConfig) -> Result<SearchOutcome> {
        let query = sanitize(query);
        if query.len() != self.dimension() {
            return Err(Error::dimension_mismatch(self.dimension(), query.len()));
        }

        let (self_row, exact_match) = self.resolve_self_row(&query, params.match_tolerance);

        // Search with the stored row itself so the self hit is at distance zero
        let normalized = self.scaler.transform_query(self.raw.row(self_row))?;
        let neighbors = self.index.search(&normalized, k)?;

        let mut results = Vec::with_capacity(k);
        let mut saw_self = false;
        for (row, distance) in neighbors.iter_filled() {
            if row == self_row {
                saw_self = true;
                results.push(self.self_hit(row)?);
            } else {
                let distance = distance as f64;
                results.push(SearchResult {
                    rank: 0,
                    identity: self.identity_of(row)?,
                    similarity: (-distance / params.similarity_scale).exp(),
                    distance,
                    row,
                    is_query: false,
                });
            }
        }
        if !saw_self {
            results.push(self.self_hit(self_row)?);
        }

        results.sort_by(SearchResult::ranking_cmp);
        results.truncate(k);
        for (i, result) in results.iter_mut().enumerate() {
            result.rank = i + 1;
        }

        Ok(SearchOutcome { results, self_row, exact_match })
    }

    fn self_hit(&self, row: usize) -> Result<SearchResult> {
        Ok(SearchResult {
            rank: 0,
            identity: self.identity_of(row)?,
            similarity: 1.0,
            distance: 0.0,
            row,
            is_query: true,
        })
    }

    fn identity_of(&self, row: usize) -> Result<Identity> {
        self.identity(row)
            .cloned()
            .ok_or_else(|| Error::corrupt(format!("index returned row {} with no identity", row)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn generation(rows: &[Vec<f64>], names: &[&str]) -> Generation {
        let raw = Matrix::from_rows(rows).unwrap();
        let scaler = ScalerParams::fit(&raw).unwrap();
        let index = FlatIndex::build(&scaler.transform_matrix(&raw).unwrap()).unwrap();
        let identities = names.iter().map(|s| s.to_string()).collect();
        Generation::new(GenerationId(1), Utc::now(), index, scaler, identities, raw).unwrap()
    }

    #[test]
    fn test_three_row_example() {
        let g = generation(&[vec![0.0, 0.0], vec![1.0, 1.0], vec![10.0, 10.0]], &["A", "B", "C"]);
        let out = g.search(&[0.0, 0.0], 3, &SearchConfig::default()).unwrap();

        let names: Vec<_> = out.results.iter().map(|r| r.identity.as_str()).collect();
        assert_eq!(names, vec!["A", "B", "C"]);
        assert_eq!(out.results[0].similarity, 1.0);
        assert_eq!(out.results[0].distance, 0.0);
        assert!(out.results[0].is_query);
        assert!(out.results[1].distance < out.results[2].distance);
        assert_eq!(out.results.iter().map(|r| r.rank).collect::<Vec<_>>(), vec![1, 2, 3]);
        assert!(out.exact_match);
    }

    #[test]
    fn test_nearest_row_fallback() {
        let g = generation(&[vec![0.0, 0.0], vec![1.0, 1.0], vec![10.0, 10.0]], &["A", "B", "C"]);
        let out = g.search(&[9.0, 9.5], 2, &SearchConfig::default()).unwrap();
        assert!(!out.exact_match);
        assert_eq!(out.self_row, 2);
        assert_eq!(out.results[0].identity, "C");
        assert!(out.results[0].is_query);
    }

    #[test]
    fn test_nearest_row_with_huge_magnitudes() {
        // Squared distances to every row exceed f64::MAX
        let g = generation(&[vec![1e160], vec![-1e155], vec![-3e160]], &["A", "B", "C"]);
        assert_eq!(g.resolve_self_row(&[1e100], 1e-10), (1, false));
        assert_eq!(g.resolve_self_row(&[-2.9e160], 1e-10), (2, false));
    }

    #[test]
    fn test_own_row_ranks_first_when_f32_rows_collide() {
        // B and C differ in f64 but normalize to the same f32 value
        let g = generation(&[vec![0.0], vec![1e6 - 1e-4], vec![1e6]], &["A", "B", "C"]);
        assert_eq!(g.index().get(1), g.index().get(2));

        let out = g.search(&[1e6], 1, &SearchConfig::default()).unwrap();
        assert_eq!(out.results.len(), 1);
        assert_eq!(out.results[0].identity, "C");
        assert!(out.results[0].is_query);
        assert_eq!(out.results[0].similarity, 1.0);

        let out = g.search(&[1e6], 3, &SearchConfig::default()).unwrap();
        let names: Vec<_> = out.results.iter().map(|r| r.identity.as_str()).collect();
        assert_eq!(names, vec!["C", "B", "A"]);
        assert_eq!(out.results[1].distance, 0.0);
        assert!(!out.results[1].is_query);
    }

    #[test]
    fn test_own_row_kept_when_k_is_below_zero_distance_ties() {
        let g = generation(
            &[vec![0.0], vec![1e6 - 2e-4], vec![1e6 - 1e-4], vec![1e6]],
            &["A", "B", "C", "D"],
        );
        // The index alone returns B and C; D has to be added back
        let normalized = g.scaler().transform_query(g.raw().row(3)).unwrap();
        let neighbors = g.index().search(&normalized, 2).unwrap();
        let rows: Vec<_> = neighbors.iter_filled().map(|(row, _)| row).collect();
        assert_eq!(rows, vec![1, 2]);

        let out = g.search(&[1e6], 2, &SearchConfig::default()).unwrap();
        let names: Vec<_> = out.results.iter().map(|r| r.identity.as_str()).collect();
        assert_eq!(names, vec!["D", "B"]);
        assert_eq!(out.results.iter().map(|r| r.rank).collect::<Vec<_>>(), vec![1, 2]);
        assert_eq!(out.results.iter().filter(|r| r.is_query).count(), 1);
    }

    #[test]
    fn test_tolerance_match() {
        let g = generation(&[vec![0.5, 0.25], vec![0.75, 1.0]], &["A", "B"]);
        let (row, exact) = g.resolve_self_row(&[0.75 + 1e-12, 1.0 - 1e-12], 1e-10);
        assert_eq!((row, exact), (1, true));
    }

    #[test]
    fn test_non_finite_query_is_sanitized() {
        let g = generation(&[vec![0.0, 0.0], vec![1.0, 1.0]], &["A", "B"]);
        let out = g.search(&[f64::NAN, f64::INFINITY], 2, &SearchConfig::default()).unwrap();
        assert_eq!(out.self_row, 0);
        assert!(out.exact_match);
    }

    #[test]
    fn test_dimension_mismatch() {
        let g = generation(&[vec![0.0, 0.0]], &["A"]);
        assert!(matches!(
            g.search(&[0.0], 1, &SearchConfig::default()),
            Err(Error::MalformedQuery { .. })
        ));
    }

    #[test]
    fn test_mismatched_parts_rejected() {
        let raw = Matrix::from_rows(&[vec![0.0], vec![1.0]]).unwrap();
        let scaler = ScalerParams::fit(&raw).unwrap();
        let index = FlatIndex::build(&scaler.transform_matrix(&raw).unwrap()).unwrap();
        let result = Generation::new(GenerationId(1), Utc::now(), index, scaler, vec!["A".into()], raw);
        assert!(matches!(result, Err(Error::CorruptIndex { .. })));
    }
}
