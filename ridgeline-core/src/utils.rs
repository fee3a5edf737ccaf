//! # Common Utilities

use std::time::{SystemTime, UNIX_EPOCH};

/// Nanoseconds since the epoch; 0 if the clock reads before it
pub fn generate_timestamp_id() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos() as u64)
        .unwrap_or(0)
}
