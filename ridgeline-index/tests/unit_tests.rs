//! Index tests: distances, normalization and exact search end to end

use proptest::prelude::*;
use rand::Rng;
use ridgeline_core::{Error, Matrix};
use ridgeline_index::{
    all_close, l2_distance, l2_distance_squared, FlatIndex, Normalizer, ScalerParams, NO_NEIGHBOR,
};

fn random_vec(dim: usize) -> Vec<f32> {
    let mut rng = rand::thread_rng();
    (0..dim).map(|_| rng.gen_range(-1.0..1.0)).collect()
}

fn random_matrix(rows: usize, dim: usize) -> Matrix<f64> {
    let mut rng = rand::thread_rng();
    let data = (0..rows * dim).map(|_| rng.gen_range(-100.0..100.0)).collect();
    Matrix::from_flat(data, rows, dim).unwrap()
}

fn build(raw: &Matrix<f64>) -> (ScalerParams, FlatIndex) {
    let mut normalizer = Normalizer::new();
    let normalized = normalizer.fit_transform(raw).unwrap();
    let index = FlatIndex::build(&normalized).unwrap();
    (normalizer.into_params().unwrap(), index)
}

// ============================================================================
// SIMD tests
// ============================================================================

#[test]
fn test_l2_distance_correctness() {
    let a = vec![1.0, 2.0, 3.0];
    let b = vec![4.0, 5.0, 6.0];
    let expected = ((3.0f32).powi(2) * 3.0).sqrt();
    let result = l2_distance(&a, &b);
    assert!((result - expected).abs() < 1e-5);
}

#[test]
fn test_l2_squared_matches_scalar_odd_dims() {
    for dim in [1, 7, 8, 9, 31, 33, 513] {
        let a = random_vec(dim);
        let b = random_vec(dim);
        let expected: f32 = a.iter().zip(b.iter()).map(|(x, y)| (x - y) * (x - y)).sum();
        let result = l2_distance_squared(&a, &b);
        assert!((result - expected).abs() < 1e-3, "dim {}: {} vs {}", dim, result, expected);
    }
}

#[test]
fn test_self_distance_is_zero() {
    let a = random_vec(777);
    assert_eq!(l2_distance_squared(&a, &a), 0.0);
}

#[test]
fn test_all_close_tolerance() {
    assert!(all_close(&[1.0, 2.0], &[1.0 + 1e-12, 2.0], 1e-10));
    assert!(!all_close(&[1.0, 2.0], &[1.0 + 1e-8, 2.0], 1e-10));
    assert!(!all_close(&[1.0], &[1.0, 2.0], 1e-10));
}

// ============================================================================
// Flat index tests
// ============================================================================

#[test]
fn test_every_row_finds_itself_first() {
    let raw = random_matrix(200, 16);
    let (params, index) = build(&raw);

    for i in 0..raw.rows() {
        let q = params.transform_query(raw.row(i)).unwrap();
        let res = index.search(&q, 1).unwrap();
        assert_eq!(res.rows[0], i as i64);
        assert_eq!(res.distances[0], 0.0);
    }
}

#[test]
fn test_flat_search_matches_brute_force() {
    let raw = random_matrix(300, 8);
    let (params, index) = build(&raw);
    let normalized = params.transform_matrix(&raw).unwrap();
    let q = params.transform_query(raw.row(17)).unwrap();

    let mut expected: Vec<(f32, usize)> = normalized
        .iter_rows()
        .enumerate()
        .map(|(i, row)| (l2_distance_squared(&q, row), i))
        .collect();
    expected.sort_by(|a, b| a.0.total_cmp(&b.0).then(a.1.cmp(&b.1)));

    let res = index.search(&q, 20).unwrap();
    let got: Vec<i64> = res.rows.clone();
    let want: Vec<i64> = expected.iter().take(20).map(|(_, i)| *i as i64).collect();
    assert_eq!(got, want);
}

#[test]
fn test_k_larger_than_index() {
    let raw = random_matrix(3, 4);
    let (params, index) = build(&raw);
    let q = params.transform_query(raw.row(0)).unwrap();
    let res = index.search(&q, 10).unwrap();
    assert_eq!(res.k(), 10);
    assert_eq!(res.iter_filled().count(), 3);
    assert!(res.rows[3..].iter().all(|r| *r == NO_NEIGHBOR));
}

#[test]
fn test_search_is_deterministic() {
    let raw = random_matrix(100, 12);
    let (params, index) = build(&raw);
    let q = params.transform_query(raw.row(5)).unwrap();
    let first = index.search(&q, 15).unwrap();
    for _ in 0..10 {
        assert_eq!(index.search(&q, 15).unwrap(), first);
    }
}

#[test]
fn test_zero_distance_ties_return_lowest_rows() {
    // The last three rows collapse to the same f32 vector after scaling
    let raw = Matrix::from_rows(&[vec![0.0], vec![1e6 - 2e-4], vec![1e6 - 1e-4], vec![1e6]]).unwrap();
    let (params, index) = build(&raw);
    let q = params.transform_query(raw.row(3)).unwrap();

    let top1 = index.search(&q, 1).unwrap();
    assert_eq!(top1.rows, vec![1]);
    assert_eq!(top1.distances, vec![0.0]);

    let top2 = index.search(&q, 2).unwrap();
    assert_eq!(top2.rows, vec![1, 2]);
    assert_eq!(index.search(&q, 4).unwrap().rows, vec![1, 2, 3, 0]);
}

#[test]
fn test_save_load_preserves_results() {
    let dir = tempfile::TempDir::new().unwrap();
    let path = dir.path().join("index.bin");

    let raw = random_matrix(50, 6);
    let (params, index) = build(&raw);
    index.save(&path).unwrap();
    let loaded = FlatIndex::load(&path).unwrap();

    let q = params.transform_query(raw.row(9)).unwrap();
    assert_eq!(loaded.search(&q, 5).unwrap(), index.search(&q, 5).unwrap());
}

#[test]
fn test_load_truncated_file_is_corrupt() {
    let dir = tempfile::TempDir::new().unwrap();
    let path = dir.path().join("index.bin");

    let (_, index) = build(&random_matrix(10, 4));
    index.save(&path).unwrap();
    let bytes = std::fs::read(&path).unwrap();
    std::fs::write(&path, &bytes[..bytes.len() / 2]).unwrap();

    assert!(matches!(FlatIndex::load(&path), Err(Error::CorruptIndex { .. })));
}

#[test]
fn test_constant_dimension_does_not_break_search() {
    let raw = Matrix::from_rows(&[
        vec![1.0, 5.0, 0.0],
        vec![2.0, 5.0, 1.0],
        vec![3.0, 5.0, 0.5],
    ])
    .unwrap();
    let (params, index) = build(&raw);
    assert_eq!(params.constant_dimensions(), 1);
    let q = params.transform_query(raw.row(2)).unwrap();
    assert_eq!(index.search(&q, 1).unwrap().rows[0], 2);
}

proptest! {
    #[test]
    fn prop_normalized_values_in_unit_range(
        rows in prop::collection::vec(prop::collection::vec(-1e6f64..1e6, 4), 1..20),
        query in prop::collection::vec(-1e7f64..1e7, 4),
    ) {
        let raw = Matrix::from_rows(&rows).unwrap();
        let params = ScalerParams::fit(&raw).unwrap();
        let normalized = params.transform_matrix(&raw).unwrap();
        for v in normalized.as_slice() {
            prop_assert!((0.0..=1.0).contains(v));
        }
        for v in params.transform_query(&query).unwrap() {
            prop_assert!((0.0..=1.0).contains(&v));
        }
    }
}
