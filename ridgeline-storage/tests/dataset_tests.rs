//! Dataset loading against files written the way the extraction step writes them

use tempfile::TempDir;

use ridgeline_core::config::DatasetConfig;
use ridgeline_core::{Error, Matrix};
use ridgeline_storage::npy::{read_npy_file, write_npy_file};
use ridgeline_storage::{write_metadata, DatasetLoader, ItemMetadata};

fn config(dir: &TempDir) -> DatasetConfig {
    DatasetConfig {
        vectors_path: dir.path().join("vectors.npy"),
        metadata_path: dir.path().join("metadata.json"),
        images_dir: None,
    }
}

#[test]
fn test_npy_file_roundtrip_keeps_bits() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("m.npy");
    let m = Matrix::from_rows(&[vec![0.1, -1e-300, 7.25], vec![1e300, 0.0, -3.5]]).unwrap();
    write_npy_file(&path, &m).unwrap();
    assert_eq!(read_npy_file(&path).unwrap(), m);
}

#[test]
fn test_loader_from_config() {
    let dir = TempDir::new().unwrap();
    let cfg = config(&dir);
    write_npy_file(
        &cfg.vectors_path,
        &Matrix::from_rows(&[vec![0.0, 0.0], vec![1.0, 1.0], vec![10.0, 10.0]]).unwrap(),
    )
    .unwrap();
    let items: Vec<_> = ["A", "B", "C"].iter().map(|n| ItemMetadata::new(*n)).collect();
    write_metadata(&cfg.metadata_path, &items).unwrap();

    let dataset = DatasetLoader::from_config(&cfg).load().unwrap();
    assert_eq!(dataset.rows(), 3);
    assert_eq!(dataset.dimension(), 2);
    assert_eq!(dataset.items()[2].filename, "C");
}

#[test]
fn test_empty_matrix_is_missing_data() {
    let dir = TempDir::new().unwrap();
    let cfg = config(&dir);
    write_npy_file(&cfg.vectors_path, &Matrix::from_rows(&[]).unwrap()).unwrap();
    write_metadata(&cfg.metadata_path, &[]).unwrap();

    assert!(matches!(
        DatasetLoader::from_config(&cfg).load(),
        Err(Error::MissingData { .. })
    ));
}

#[test]
fn test_malformed_metadata() {
    let dir = TempDir::new().unwrap();
    let cfg = config(&dir);
    write_npy_file(&cfg.vectors_path, &Matrix::from_rows(&[vec![1.0]]).unwrap()).unwrap();
    std::fs::write(&cfg.metadata_path, br#"{"filename": "not-a-list.png"}"#).unwrap();

    assert!(matches!(
        DatasetLoader::from_config(&cfg).load(),
        Err(Error::MalformedDataset { .. })
    ));
}
