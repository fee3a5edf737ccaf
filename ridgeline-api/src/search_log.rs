//! # Search Result Log
//!
//! Optional on-disk record of served searches, one JSON file per search:
//! `<dir>/search_<YYYYMMDD_HHMMSS_micros>.json`. File names sort in time
//! order, so the newest record is the lexicographically largest name.

use std::fs::{self, File, OpenOptions};
use std::io::{BufReader, BufWriter, ErrorKind, Write};
use std::path::{Path, PathBuf};

use chrono::Utc;
use serde::{Deserialize, Serialize};

use ridgeline_core::error::Result;
use ridgeline_core::{SearchResult, Timestamp};

const FILE_PREFIX: &str = "search_";
const FILE_SUFFIX: &str = ".json";

/// What was asked
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum QueryInfo {
    Vector {
        dimension: usize,
        top_k: usize,
        self_row: usize,
        exact_match: bool,
    },
    Image {
        bytes: usize,
        top_k: usize,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchRecord {
    pub timestamp: Timestamp,
    pub query: QueryInfo,
    pub results: Vec<SearchResult>,
    pub total_results: usize,
}

pub struct SearchLog {
    dir: PathBuf,
}

impl SearchLog {
    pub fn open(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir)?;
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Write one record; returns the file it went to
    pub fn record(&self, query: QueryInfo, results: &[SearchResult]) -> Result<PathBuf> {
        let timestamp = Utc::now();
        let record = SearchRecord {
            timestamp,
            query,
            results: results.to_vec(),
            total_results: results.len(),
        };

        let stem = format!("{}{}", FILE_PREFIX, timestamp.format("%Y%m%d_%H%M%S_%6f"));
        let (path, file) = self.create_unique(&stem)?;

        let mut writer = BufWriter::new(file);
        serde_json::to_writer_pretty(&mut writer, &record)?;
        writer.flush()?;
        Ok(path)
    }

    /// Claim `<stem>.json`, else `<stem>_1.json`, `<stem>_2.json`, ...
    /// Searches landing in the same microsecond each get their own file.
    fn create_unique(&self, stem: &str) -> Result<(PathBuf, File)> {
        let mut n = 0u32;
        loop {
            let name = match n {
                0 => format!("{}{}", stem, FILE_SUFFIX),
                n => format!("{}_{}{}", stem, n, FILE_SUFFIX),
            };
            let path = self.dir.join(name);
            match OpenOptions::new().write(true).create_new(true).open(&path) {
                Ok(file) => return Ok((path, file)),
                Err(e) if e.kind() == ErrorKind::AlreadyExists => n += 1,
                Err(e) => return Err(e.into()),
            }
        }
    }

    /// Most recent record, if any was written
    pub fn latest(&self) -> Result<Option<SearchRecord>> {
        let mut newest: Option<String> = None;
        for entry in fs::read_dir(&self.dir)? {
            let name = entry?.file_name().to_string_lossy().into_owned();
            if !(name.starts_with(FILE_PREFIX) && name.ends_with(FILE_SUFFIX)) {
                continue;
            }
            if newest.as_ref().map_or(true, |n| record_order(&name) > record_order(n)) {
                newest = Some(name);
            }
        }

        match newest {
            Some(name) => {
                let file = File::open(self.dir.join(name))?;
                Ok(Some(serde_json::from_reader(BufReader::new(file))?))
            }
            None => Ok(None),
        }
    }
}

/// Sort key: timestamp stem, then collision counter
fn record_order(name: &str) -> (&str, u32) {
    let stem = &name[FILE_PREFIX.len()..name.len() - FILE_SUFFIX.len()];
    // stem is "YYYYMMDD_HHMMSS_ffffff" optionally followed by "_n"
    match stem.get(22..).and_then(|rest| rest.strip_prefix('_')) {
        Some(n) => (&stem[..22], n.parse().unwrap_or(0)),
        None => (stem, 0),
    }
}
