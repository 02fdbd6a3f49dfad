//! Run-level failure conditions surfaced to the operator

use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum BenchError {
    #[error("no samples found in any category under {}; add images and ground truth first", .datasets_dir.display())]
    NoSamples { datasets_dir: PathBuf },

    #[error("no results collected from {attempted} engine(s); check the errors above")]
    NoResults { attempted: usize },

    #[error("{var} is not set; export it (or add it to your environment) before running the remote engine")]
    MissingApiKey { var: String },
}
