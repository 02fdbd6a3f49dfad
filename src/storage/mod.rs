//! Storage Layer
//!
//! Handles persistence of the result table and locates per-user directories.

pub mod results;

pub use results::{load_results, merge, save_results};

use anyhow::Result;
use std::path::PathBuf;

/// Get the configuration directory
pub fn get_config_dir() -> Result<PathBuf> {
    let proj_dirs = directories::ProjectDirs::from("com", "ocrbench", "OcrBench")
        .ok_or_else(|| anyhow::anyhow!("Could not determine config directory"))?;

    Ok(proj_dirs.config_dir().to_path_buf())
}
