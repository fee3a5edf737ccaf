//! # Error Handling
//!
//! Error types for Ridgeline operations.
//!
//! Expected conditions (nothing indexed yet, a malformed query, inconsistent
//! input data) each get their own variant so callers can branch on the kind.
//! Anything unexpected during a query is folded into [`Error::Search`].

use std::fmt;

use thiserror::Error;

/// Result type alias for Ridgeline operations
pub type Result<T> = std::result::Result<T, Error>;

/// Stage of the index rebuild pipeline
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum BuildStage {
    Load,
    Normalize,
    BuildIndex,
    BuildMapping,
    Persist,
}

impl BuildStage {
    pub fn as_str(&self) -> &'static str {
        match self {
            BuildStage::Load => "load",
            BuildStage::Normalize => "normalize",
            BuildStage::BuildIndex => "build-index",
            BuildStage::BuildMapping => "build-mapping",
            BuildStage::Persist => "persist",
        }
    }
}

impl fmt::Display for BuildStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Primary error type for Ridgeline
#[derive(Error, Debug)]
pub enum Error {
    // Build-time input errors
    #[error("Missing data: {what}")]
    MissingData { what: String },

    #[error("Data inconsistency: {vectors} vectors vs {identities} identities")]
    DataInconsistency { vectors: usize, identities: usize },

    #[error("Malformed dataset: {message}")]
    MalformedDataset { message: String },

    // Lifecycle errors
    #[error("Normalizer has no parameters loaded")]
    NotBuilt,

    #[error("No index generation is loaded")]
    NotIndexed,

    #[error("Index corruption detected: {details}")]
    CorruptIndex { details: String },

    // Query errors
    #[error("Malformed query: {message}")]
    MalformedQuery { message: String },

    #[error("Search failed: {message}")]
    Search { message: String },

    #[error("Feature extraction failed: {message}")]
    Extraction { message: String },

    #[error("Remote server error: {message}")]
    Remote { message: String },

    // Pipeline
    #[error("Rebuild aborted at stage {stage}: {source}")]
    Build {
        stage: BuildStage,
        #[source]
        source: Box<Error>,
    },

    // System errors
    #[error("IO error: {message}")]
    Io { message: String, source: std::io::Error },

    #[error("Serialization error: {message}")]
    Serialization { message: String },

    #[error("Configuration error: {message}")]
    Configuration { message: String },
}

impl Error {
    /// Dimension mismatch between a query and the active collection
    pub fn dimension_mismatch(expected: usize, actual: usize) -> Self {
        Error::MalformedQuery {
            message: format!("expected vector of dimension {}, got {}", expected, actual),
        }
    }

    pub fn corrupt(details: impl Into<String>) -> Self {
        Error::CorruptIndex { details: details.into() }
    }

    /// Wrap this error as the failure of a rebuild stage
    pub fn at_stage(self, stage: BuildStage) -> Self {
        match self {
            // Keep the innermost stage when a stage helper already tagged it
            e @ Error::Build { .. } => e,
            other => Error::Build { stage, source: Box::new(other) },
        }
    }

    /// True when the caller sent something the engine cannot serve
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            Error::MalformedQuery { .. } | Error::NotIndexed | Error::Extraction { .. }
        )
    }

    /// Get error code for monitoring
    pub fn error_code(&self) -> &'static str {
        match self {
            Error::MissingData { .. } => "MISSING_DATA",
            Error::DataInconsistency { .. } => "DATA_INCONSISTENCY",
            Error::MalformedDataset { .. } => "MALFORMED_DATASET",
            Error::NotBuilt => "NOT_BUILT",
            Error::NotIndexed => "NOT_INDEXED",
            Error::CorruptIndex { .. } => "CORRUPT_INDEX",
            Error::MalformedQuery { .. } => "MALFORMED_QUERY",
            Error::Search { .. } => "SEARCH_ERROR",
            Error::Extraction { .. } => "EXTRACTION_ERROR",
            Error::Remote { .. } => "REMOTE_ERROR",
            Error::Build { .. } => "BUILD_ERROR",
            Error::Io { .. } => "IO_ERROR",
            Error::Serialization { .. } => "SERIALIZATION_ERROR",
            Error::Configuration { .. } => "CONFIG_ERROR",
        }
    }
}

// Conversion from std::io::Error
impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Error::Io {
            message: err.to_string(),
            source: err,
        }
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::Serialization { message: err.to_string() }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_at_stage_keeps_innermost() {
        let err = Error::NotBuilt.at_stage(BuildStage::Normalize).at_stage(BuildStage::Persist);
        match err {
            Error::Build { stage, source } => {
                assert_eq!(stage, BuildStage::Normalize);
                assert!(matches!(*source, Error::NotBuilt));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_client_errors() {
        assert!(Error::dimension_mismatch(3, 2).is_client_error());
        assert!(Error::NotIndexed.is_client_error());
        assert!(!Error::corrupt("x").is_client_error());
        assert_eq!(Error::corrupt("x").error_code(), "CORRUPT_INDEX");
    }
}
