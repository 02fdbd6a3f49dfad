//! Result store
//!
//! A flat CSV table with one row per (engine, category, image). Rows from a
//! later run replace rows with the same identity; every other row is kept.

use anyhow::{Context, Result};
use std::collections::HashMap;
use std::path::Path;
use tracing::debug;

use crate::shared::{ResultRow, RowKey};

/// Merge `new_rows` into `existing`, keeping the most recent row per identity.
///
/// Surviving existing rows keep their relative order and are followed by the
/// new rows in their original order.
pub fn merge(existing: &[ResultRow], new_rows: &[ResultRow]) -> Vec<ResultRow> {
    let combined: Vec<&ResultRow> = existing.iter().chain(new_rows.iter()).collect();

    let mut last_index: HashMap<RowKey, usize> = HashMap::with_capacity(combined.len());
    for (idx, row) in combined.iter().enumerate() {
        last_index.insert(row.key(), idx);
    }

    combined
        .into_iter()
        .enumerate()
        .filter(|(idx, row)| last_index.get(&row.key()) == Some(idx))
        .map(|(_, row)| row.clone())
        .collect()
}

/// Load the result table. A missing file is an empty table.
pub fn load_results(path: &Path) -> Result<Vec<ResultRow>> {
    if !path.exists() {
        debug!("No result store at {:?}, starting fresh", path);
        return Ok(Vec::new());
    }

    let mut reader = csv::Reader::from_path(path)
        .with_context(|| format!("Failed to open result store {}", path.display()))?;

    let mut rows = Vec::new();
    for record in reader.deserialize() {
        let row: ResultRow = record
            .with_context(|| format!("Malformed row in result store {}", path.display()))?;
        rows.push(row);
    }

    Ok(rows)
}

/// Write the full result table, replacing the file atomically
pub fn save_results(path: &Path, rows: &[ResultRow]) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create {}", parent.display()))?;
    }

    let temp_path = path.with_extension("csv.tmp");
    {
        let mut writer = csv::Writer::from_path(&temp_path)
            .with_context(|| format!("Failed to create {}", temp_path.display()))?;
        for row in rows {
            writer.serialize(row)?;
        }
        writer.flush().context("Failed to flush result store")?;
    }

    std::fs::rename(&temp_path, path)
        .context("Failed to move result store to final location")?;

    debug!("Saved {} rows to {:?}", rows.len(), path);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn row(engine: &str, category: &str, image: &str, cer: f64) -> ResultRow {
        ResultRow {
            engine: engine.to_string(),
            category: category.to_string(),
            image: image.to_string(),
            cer,
            wer: cer,
            accuracy: (1.0 - cer) * 100.0,
            elapsed_secs: 0.5,
            prediction: "pred".to_string(),
            ground_truth: "truth".to_string(),
        }
    }

    #[test]
    fn test_merge_is_idempotent() {
        let rows = vec![
            row("A", "cat1", "img1.png", 0.1),
            row("B", "cat1", "img1.png", 0.2),
            row("A", "cat2", "img2.png", 0.3),
        ];

        assert_eq!(merge(&rows, &rows), rows);
    }

    #[test]
    fn test_merge_preserves_non_colliding_rows() {
        let existing = vec![row("A", "cat1", "img1.png", 0.1), row("B", "cat1", "img1.png", 0.2)];
        let new_rows = vec![row("C", "cat2", "img1.png", 0.3)];

        let merged = merge(&existing, &new_rows);
        let engines: Vec<&str> = merged.iter().map(|r| r.engine.as_str()).collect();
        assert_eq!(engines, ["A", "B", "C"]);
    }

    #[test]
    fn test_merge_newer_row_wins() {
        let existing = vec![row("engineX", "cat1", "img1", 0.5)];
        let new_rows = vec![row("engineX", "cat1", "img1", 0.1)];

        let merged = merge(&existing, &new_rows);
        assert_eq!(merged.len(), 1);
        assert_eq!(merged[0].cer, 0.1);
    }

    #[test]
    fn test_merge_order_follows_last_occurrence() {
        let existing = vec![
            row("A", "c", "1", 0.1),
            row("B", "c", "1", 0.2),
            row("C", "c", "1", 0.3),
        ];
        let new_rows = vec![row("B", "c", "1", 0.9), row("D", "c", "1", 0.4)];

        let merged = merge(&existing, &new_rows);
        let summary: Vec<(&str, f64)> = merged.iter().map(|r| (r.engine.as_str(), r.cer)).collect();
        assert_eq!(summary, [("A", 0.1), ("C", 0.3), ("B", 0.9), ("D", 0.4)]);
    }

    #[test]
    fn test_merge_deduplicates_within_new_rows() {
        let new_rows = vec![row("A", "c", "1", 0.7), row("A", "c", "1", 0.2)];
        let merged = merge(&[], &new_rows);
        assert_eq!(merged.len(), 1);
        assert_eq!(merged[0].cer, 0.2);
    }

    #[test]
    fn test_save_and_load_results() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("scores/all_results.csv");
        let mut rows = vec![row("Tesseract", "printed", "img1.png", 0.25)];
        rows[0].prediction = "multi\nline, \"quoted\"".to_string();

        save_results(&path, &rows).unwrap();
        let loaded = load_results(&path).unwrap();

        assert_eq!(loaded, rows);
        assert!(!path.with_extension("csv.tmp").exists());
    }

    #[test]
    fn test_saved_header_uses_report_columns() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("all_results.csv");
        save_results(&path, &[row("EasyOCR", "receipts", "r1.png", 0.0)]).unwrap();

        let content = std::fs::read_to_string(&path).unwrap();
        let header = content.lines().next().unwrap();
        assert_eq!(
            header,
            "model,category,image,cer,wer,accuracy,time_sec,prediction,ground_truth"
        );
    }

    #[test]
    fn test_load_missing_store_is_empty() {
        let dir = TempDir::new().unwrap();
        let rows = load_results(&dir.path().join("missing.csv")).unwrap();
        assert!(rows.is_empty());
    }

    #[test]
    fn test_load_malformed_store() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("bad.csv");
        std::fs::write(&path, "model,category\nA,b\n").unwrap();

        assert!(load_results(&path).is_err());
    }
}
