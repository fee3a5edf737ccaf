//! # Manifest - Active Generation Pointer
//!
//! `CURRENT` names the generation a process should serve. It is replaced with
//! a write-to-temp + rename, so readers see either the old or the new
//! manifest, never a partial one.

use std::fs::{self, File};
use std::io::Write;
use std::path::Path;

use chrono::Utc;
use serde::{Deserialize, Serialize};

use ridgeline_core::error::{Error, Result};
use ridgeline_core::{GenerationId, Timestamp};

pub const CURRENT_FILE: &str = "CURRENT";
const CURRENT_TMP_FILE: &str = "CURRENT.tmp";
pub const MANIFEST_FORMAT_VERSION: u32 = 2;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Manifest {
    pub version: u32,
    pub generation: GenerationId,
    pub total_vectors: usize,
    pub dimension: usize,
    /// [`crate::matrix_fingerprint`] of the raw matrix the generation was built from
    pub raw_fingerprint: String,
    pub created_at: Timestamp,
}

impl Manifest {
    pub fn new(
        generation: GenerationId,
        total_vectors: usize,
        dimension: usize,
        raw_fingerprint: impl Into<String>,
    ) -> Self {
        Self {
            version: MANIFEST_FORMAT_VERSION,
            generation,
            total_vectors,
            dimension,
            raw_fingerprint: raw_fingerprint.into(),
            created_at: Utc::now(),
        }
    }

    /// Read `<dir>/CURRENT`; `Ok(None)` when nothing was ever published
    pub fn read(dir: &Path) -> Result<Option<Self>> {
        let path = dir.join(CURRENT_FILE);
        let bytes = match fs::read(&path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        let manifest: Manifest = serde_json::from_slice(&bytes)
            .map_err(|e| Error::corrupt(format!("unreadable {}: {}", CURRENT_FILE, e)))?;
        if manifest.version != MANIFEST_FORMAT_VERSION {
            return Err(Error::corrupt(format!(
                "unsupported manifest version {}",
                manifest.version
            )));
        }
        Ok(Some(manifest))
    }

    /// Publish this manifest as `<dir>/CURRENT`
    pub fn write_atomic(&self, dir: &Path) -> Result<()> {
        let tmp = dir.join(CURRENT_TMP_FILE);
        {
            let mut file = File::create(&tmp)?;
            serde_json::to_writer_pretty(&mut file, self)?;
            file.write_all(b"\n")?;
            file.sync_all()?;
        }
        fs::rename(&tmp, dir.join(CURRENT_FILE))?;
        sync_dir(dir)
    }
}

/// Make a rename inside `dir` durable
#[cfg(unix)]
pub(crate) fn sync_dir(dir: &Path) -> Result<()> {
    File::open(dir)?.sync_all()?;
    Ok(())
}

#[cfg(not(unix))]
pub(crate) fn sync_dir(_dir: &Path) -> Result<()> {
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_missing_current_is_none() {
        let dir = TempDir::new().unwrap();
        assert!(Manifest::read(dir.path()).unwrap().is_none());
    }

    #[test]
    fn test_write_then_read() {
        let dir = TempDir::new().unwrap();
        let manifest = Manifest::new(GenerationId(7), 120, 64, "ab12");
        manifest.write_atomic(dir.path()).unwrap();

        assert_eq!(Manifest::read(dir.path()).unwrap(), Some(manifest));
        assert!(!dir.path().join(CURRENT_TMP_FILE).exists());
    }

    #[test]
    fn test_garbage_current_is_corrupt() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join(CURRENT_FILE), b"{ not json").unwrap();
        assert!(matches!(Manifest::read(dir.path()), Err(Error::CorruptIndex { .. })));
    }

    #[test]
    fn test_manifest_without_fingerprint_is_rejected() {
        let dir = TempDir::new().unwrap();
        let old = r#"{"version": 1, "generation": 3, "total_vectors": 2, "dimension": 2,
                      "created_at": "2026-01-01T00:00:00Z"}"#;
        fs::write(dir.path().join(CURRENT_FILE), old).unwrap();
        assert!(matches!(Manifest::read(dir.path()), Err(Error::CorruptIndex { .. })));
    }
}
