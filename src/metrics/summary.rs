//! Per-engine, per-category averages over result rows

use std::collections::BTreeMap;
use std::fmt::Write;

use crate::shared::row::round_to;
use crate::shared::ResultRow;

/// Mean scores for one (engine, category) group
#[derive(Debug, Clone, PartialEq)]
pub struct SummaryRow {
    pub engine: String,
    pub category: String,
    pub samples: usize,
    pub avg_cer: f64,
    pub avg_wer: f64,
    pub avg_accuracy: f64,
    pub avg_time: f64,
}

#[derive(Default)]
struct Totals {
    samples: usize,
    cer: f64,
    wer: f64,
    accuracy: f64,
    time: f64,
}

/// Group rows by (engine, category) and average them, sorted by engine then category
pub fn summarize(rows: &[ResultRow]) -> Vec<SummaryRow> {
    let mut groups: BTreeMap<(&str, &str), Totals> = BTreeMap::new();

    for row in rows {
        let totals = groups
            .entry((row.engine.as_str(), row.category.as_str()))
            .or_default();
        totals.samples += 1;
        totals.cer += row.cer;
        totals.wer += row.wer;
        totals.accuracy += row.accuracy;
        totals.time += row.elapsed_secs;
    }

    groups
        .into_iter()
        .map(|((engine, category), t)| {
            let n = t.samples as f64;
            SummaryRow {
                engine: engine.to_string(),
                category: category.to_string(),
                samples: t.samples,
                avg_cer: round_to(t.cer / n, 3),
                avg_wer: round_to(t.wer / n, 3),
                avg_accuracy: round_to(t.accuracy / n, 3),
                avg_time: round_to(t.time / n, 3),
            }
        })
        .collect()
}

/// Render the summary as an aligned text table
pub fn render_table(summary: &[SummaryRow]) -> String {
    let engine_width = summary
        .iter()
        .map(|s| s.engine.chars().count())
        .chain(std::iter::once("engine".len()))
        .max()
        .unwrap_or(0);
    let category_width = summary
        .iter()
        .map(|s| s.category.chars().count())
        .chain(std::iter::once("category".len()))
        .max()
        .unwrap_or(0);

    let mut out = String::new();
    let _ = writeln!(
        out,
        "{:<ew$}  {:<cw$}  {:>3}  {:>7}  {:>7}  {:>7}  {:>8}",
        "engine",
        "category",
        "n",
        "avg_cer",
        "avg_wer",
        "avg_acc",
        "avg_time",
        ew = engine_width,
        cw = category_width,
    );
    for s in summary {
        let _ = writeln!(
            out,
            "{:<ew$}  {:<cw$}  {:>3}  {:>7.3}  {:>7.3}  {:>7.3}  {:>8.3}",
            s.engine,
            s.category,
            s.samples,
            s.avg_cer,
            s.avg_wer,
            s.avg_accuracy,
            s.avg_time,
            ew = engine_width,
            cw = category_width,
        );
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(engine: &str, category: &str, image: &str, cer: f64, secs: f64) -> ResultRow {
        ResultRow {
            engine: engine.to_string(),
            category: category.to_string(),
            image: image.to_string(),
            cer,
            wer: cer * 2.0,
            accuracy: (1.0 - cer) * 100.0,
            elapsed_secs: secs,
            prediction: String::new(),
            ground_truth: String::new(),
        }
    }

    #[test]
    fn test_summarize_groups_and_sorts() {
        let rows = vec![
            row("Tesseract", "receipts", "a.png", 0.2, 1.0),
            row("EasyOCR", "printed", "a.png", 0.1, 2.0),
            row("Tesseract", "printed", "a.png", 0.3, 0.5),
            row("Tesseract", "printed", "b.png", 0.1, 1.5),
        ];

        let summary = summarize(&rows);
        let keys: Vec<(&str, &str)> = summary
            .iter()
            .map(|s| (s.engine.as_str(), s.category.as_str()))
            .collect();
        assert_eq!(
            keys,
            [("EasyOCR", "printed"), ("Tesseract", "printed"), ("Tesseract", "receipts")]
        );

        let printed = &summary[1];
        assert_eq!(printed.samples, 2);
        assert_eq!(printed.avg_cer, 0.2);
        assert_eq!(printed.avg_wer, 0.4);
        assert_eq!(printed.avg_accuracy, 80.0);
        assert_eq!(printed.avg_time, 1.0);
    }

    #[test]
    fn test_summarize_empty() {
        assert!(summarize(&[]).is_empty());
    }

    #[test]
    fn test_render_table() {
        let summary = summarize(&[row("Tesseract", "printed", "a.png", 0.25, 1.0)]);
        let table = render_table(&summary);
        let lines: Vec<&str> = table.lines().collect();

        assert_eq!(lines.len(), 2);
        assert!(lines[0].starts_with("engine"));
        assert!(lines[1].contains("Tesseract"));
        assert!(lines[1].contains("0.250"));
        assert!(lines[1].contains("75.000"));
    }
}
