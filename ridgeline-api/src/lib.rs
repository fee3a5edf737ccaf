//! # Ridgeline API
//!
//! The search engine and its thin outer surfaces.
//!
//! ```ignore
//! let engine = SearchEngine::open(Config::load_from_file("ridgeline.yaml")?)?;
//! let hits = engine.search_by_vector(&features, 10)?;
//! ```

pub mod engine;
pub mod extractor;
pub mod generation;
pub mod logging;
pub mod pipeline;
pub mod remote;
pub mod search_log;
pub mod server;

pub use engine::{SearchEngine, VerifyFailure, VerifyReport};
pub use extractor::{FeatureExtractor, GrayImage, HistogramExtractor, Preprocessor};
pub use generation::Generation;
pub use remote::RemoteClient;
pub use server::{create_router, AppState};
