//! Dataset Locator
//!
//! Resolves categorized image / ground-truth pairs from the dataset layout:
//!
//! ```text
//! <datasets_dir>/<category>/images/<stem>.<ext>
//! <datasets_dir>/<category>/ground_truth/<stem>.txt
//! ```

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

use crate::config::CategoryConfig;

/// Image extensions picked up by the locator (compared case-insensitively)
pub const IMAGE_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg", "bmp", "tif", "tiff", "webp"];

/// One image and its reference text
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SamplePair {
    /// Path to the image file
    pub image: PathBuf,
    /// Trimmed ground-truth text
    pub ground_truth: String,
}

impl SamplePair {
    /// Image file name used as the row identifier
    pub fn image_name(&self) -> String {
        self.image
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default()
    }
}

/// A category with its resolved samples
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CategoryPlan {
    pub key: String,
    pub label: String,
    pub pairs: Vec<SamplePair>,
}

/// Every category to evaluate, in configured order
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DatasetPlan {
    pub categories: Vec<CategoryPlan>,
}

impl DatasetPlan {
    /// Scan the dataset, creating missing category folders along the way
    pub fn prepare(datasets_dir: &Path, categories: &[CategoryConfig]) -> Result<Self> {
        let mut plans = Vec::with_capacity(categories.len());

        for category in categories {
            let (images_dir, gt_dir) = category_dirs(datasets_dir, &category.key);
            std::fs::create_dir_all(&images_dir)
                .with_context(|| format!("Failed to create {}", images_dir.display()))?;
            std::fs::create_dir_all(&gt_dir)
                .with_context(|| format!("Failed to create {}", gt_dir.display()))?;

            let pairs = list_pairs(&images_dir, &gt_dir)?;
            if !pairs.is_empty() && pairs.len() != category.expected_samples {
                warn!(
                    "{}: found {} samples, expected {}",
                    category.label,
                    pairs.len(),
                    category.expected_samples
                );
            }

            plans.push(CategoryPlan {
                key: category.key.clone(),
                label: category.label.clone(),
                pairs,
            });
        }

        Ok(Self { categories: plans })
    }

    /// Total number of samples across all categories
    pub fn total_samples(&self) -> usize {
        self.categories.iter().map(|c| c.pairs.len()).sum()
    }

    /// Categories that hold at least one sample
    pub fn populated(&self) -> impl Iterator<Item = &CategoryPlan> {
        self.categories.iter().filter(|c| !c.pairs.is_empty())
    }

    /// Log the per-category sample counts
    pub fn log_summary(&self) {
        info!("Dataset categories:");
        for category in &self.categories {
            info!("  {}: {} images", category.label, category.pairs.len());
        }
        info!(
            "Total: {} images across {} categories",
            self.total_samples(),
            self.populated().count()
        );
    }
}

/// Return `(images_dir, ground_truth_dir)` for a category
pub fn category_dirs(datasets_dir: &Path, key: &str) -> (PathBuf, PathBuf) {
    let root = datasets_dir.join(key);
    (root.join("images"), root.join("ground_truth"))
}

/// Pair every image with its `<stem>.txt` ground truth, sorted by file name.
///
/// Images without a ground-truth file are skipped. A missing images
/// directory yields no pairs.
pub fn list_pairs(images_dir: &Path, gt_dir: &Path) -> Result<Vec<SamplePair>> {
    if !images_dir.is_dir() {
        return Ok(Vec::new());
    }

    let mut images = Vec::new();
    for entry in std::fs::read_dir(images_dir)
        .with_context(|| format!("Failed to read {}", images_dir.display()))?
    {
        let path = entry?.path();
        if path.is_file() && is_image(&path) {
            images.push(path);
        }
    }
    images.sort_by(|a, b| a.file_name().cmp(&b.file_name()));

    let mut pairs = Vec::with_capacity(images.len());
    for image in images {
        let Some(stem) = image.file_stem() else {
            continue;
        };
        let gt_path = gt_dir.join(format!("{}.txt", stem.to_string_lossy()));
        if !gt_path.is_file() {
            continue;
        }

        let ground_truth = std::fs::read_to_string(&gt_path)
            .with_context(|| format!("Failed to read ground truth {}", gt_path.display()))?;
        pairs.push(SamplePair {
            image,
            ground_truth: ground_truth.trim().to_string(),
        });
    }

    Ok(pairs)
}

fn is_image(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| IMAGE_EXTENSIONS.contains(&e.to_ascii_lowercase().as_str()))
        .unwrap_or(false)
}
