//! Benchmark Configuration
//!
//! Dataset paths, categories, runner limits and the engine roster, stored
//! in TOML format. The loaded value is immutable and passed by reference.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::engines::{EngineConfig, RemoteConfig, TesseractConfig};

/// Benchmark settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BenchConfig {
    /// Dataset and result locations
    pub paths: PathsConfig,
    /// Runner process limits
    pub runner: RunnerSettings,
    /// Remote engine, run separately from the local roster
    pub remote: RemoteConfig,
    /// Dataset categories, in evaluation order
    pub categories: Vec<CategoryConfig>,
    /// Local engines, in evaluation order
    pub roster: Vec<EngineConfig>,
}

impl Default for BenchConfig {
    fn default() -> Self {
        Self {
            paths: PathsConfig::default(),
            runner: RunnerSettings::default(),
            remote: RemoteConfig::default(),
            categories: default_categories(),
            roster: default_roster(),
        }
    }
}

/// Filesystem locations
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PathsConfig {
    /// Root of the categorized dataset
    pub datasets_dir: PathBuf,
    /// Flat CSV result store
    pub results_file: PathBuf,
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            datasets_dir: PathBuf::from("datasets"),
            results_file: PathBuf::from("results/scores/all_results.csv"),
        }
    }
}

/// A dataset category
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CategoryConfig {
    /// Folder name and identifier stored in result rows
    pub key: String,
    /// Human-readable label
    pub label: String,
    /// Number of samples the category is expected to hold
    pub expected_samples: usize,
}

impl CategoryConfig {
    pub fn new(key: &str, label: &str, expected_samples: usize) -> Self {
        Self {
            key: key.to_string(),
            label: label.to_string(),
            expected_samples,
        }
    }
}

/// Runner process settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RunnerSettings {
    /// Wall-clock ceiling per engine, in seconds
    pub timeout_secs: u64,
    /// How often the orchestrator checks on a running engine
    pub poll_interval_ms: u64,
}

impl RunnerSettings {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms.max(1))
    }
}

impl Default for RunnerSettings {
    fn default() -> Self {
        Self {
            timeout_secs: 900,
            poll_interval_ms: 100,
        }
    }
}

fn default_categories() -> Vec<CategoryConfig> {
    vec![
        CategoryConfig::new("printed", "Printed Forms (FUNSD)", 6),
        CategoryConfig::new("handwritten", "Handwritten Lines (IAM)", 6),
        CategoryConfig::new("receipts", "Receipts (SROIE)", 6),
        CategoryConfig::new("scene_text", "Scene / Street Text", 6),
        CategoryConfig::new("dense_text", "Dense Book Pages", 6),
        CategoryConfig::new("degraded", "Degraded / Noisy Scans", 6),
    ]
}

fn default_roster() -> Vec<EngineConfig> {
    vec![
        EngineConfig::Tesseract(TesseractConfig::default()),
        EngineConfig::Tesseract(TesseractConfig {
            label: Some("Tesseract (block)".to_string()),
            psm: 6,
            ..TesseractConfig::default()
        }),
    ]
}

/// Load configuration from file
pub fn load_config(path: &Path) -> Result<BenchConfig> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config {}", path.display()))?;
    let config: BenchConfig = toml::from_str(&content)
        .with_context(|| format!("Failed to parse config {}", path.display()))?;
    Ok(config)
}

/// Save configuration to file
pub fn save_config(config: &BenchConfig, path: &Path) -> Result<()> {
    let content = toml::to_string_pretty(config)?;
    std::fs::write(path, content)?;
    Ok(())
}
