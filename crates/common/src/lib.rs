//! apirun Common Library
//!
//! Shared types, storage, batch planning and report analysis used by the
//! apirun server and CLI.

pub mod api;
pub mod batch;
pub mod error;
pub mod report;
pub mod store;
pub mod types;

// Re-export commonly used types
pub use batch::{drain_batches, AggregatedResult, BatchExecutor, BatchPlan, DEFAULT_BATCH_SIZE};
pub use error::{Error, Result};
pub use report::summarize_report;
pub use store::RunStore;
pub use types::*;

/// apirun version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Default storage root, relative to the working directory
pub fn default_storage_dir() -> std::path::PathBuf {
    std::path::PathBuf::from("storage")
}
