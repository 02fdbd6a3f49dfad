//! Orchestrator
//!
//! Walks the engine roster in order, hands each engine to a [`Launcher`],
//! and folds whatever rows come back into the result store. Engines run
//! strictly one after another; a failing engine never costs the rows of an
//! engine that already finished.

use anyhow::Result;
use std::fmt;
use std::path::Path;
use tracing::{error, info, warn};

use crate::dataset::DatasetPlan;
use crate::engines::EngineConfig;
use crate::error::BenchError;
use crate::shared::ResultRow;
use crate::storage::{load_results, merge, save_results};

/// Runs one engine against the dataset and reports how it went
pub trait Launcher {
    fn launch(&self, engine: &EngineConfig, plan: &DatasetPlan) -> Result<EngineOutcome>;
}

/// Terminal result of one roster entry
#[derive(Debug, Clone, PartialEq)]
pub enum EngineOutcome {
    /// Runner exited cleanly with its result set
    Succeeded(Vec<ResultRow>),
    /// Runner failed; rows it reported before failing are kept
    Failed {
        code: Option<i32>,
        salvaged: Vec<ResultRow>,
    },
    /// Engine could not be initialized
    InitFailed(String),
    /// Runner exceeded the wall-clock ceiling and was killed
    TimedOut,
}

impl EngineOutcome {
    pub fn state(&self) -> EngineState {
        match self {
            EngineOutcome::Succeeded(_) => EngineState::Succeeded,
            EngineOutcome::Failed { .. } | EngineOutcome::InitFailed(_) => EngineState::Failed,
            EngineOutcome::TimedOut => EngineState::TimedOut,
        }
    }

    /// Rows that count toward the result table
    pub fn into_rows(self) -> Vec<ResultRow> {
        match self {
            EngineOutcome::Succeeded(rows) => rows,
            EngineOutcome::Failed { salvaged, .. } => salvaged,
            EngineOutcome::InitFailed(_) | EngineOutcome::TimedOut => Vec::new(),
        }
    }
}

/// Per-engine state machine: pending, launching, collecting, then a terminal state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineState {
    Pending,
    Launching,
    Collecting,
    Succeeded,
    Failed,
    TimedOut,
}

impl fmt::Display for EngineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            EngineState::Pending => "pending",
            EngineState::Launching => "launching",
            EngineState::Collecting => "collecting",
            EngineState::Succeeded => "succeeded",
            EngineState::Failed => "failed",
            EngineState::TimedOut => "timed_out",
        };
        f.write_str(name)
    }
}

/// How one roster entry ended
#[derive(Debug, Clone, PartialEq)]
pub struct EngineReport {
    pub engine: String,
    pub state: EngineState,
    pub rows: usize,
}

/// Everything one orchestrator run produced
#[derive(Debug, Clone, Default)]
pub struct RunReport {
    pub engines: Vec<EngineReport>,
    /// Rows collected in this run, in roster order
    pub rows: Vec<ResultRow>,
    /// Size of the persisted table after the run
    pub stored_rows: usize,
}

/// Sequential roster driver
pub struct Orchestrator<'a, L: Launcher> {
    launcher: L,
    roster: &'a [EngineConfig],
    results_file: &'a Path,
}

impl<'a, L: Launcher> Orchestrator<'a, L> {
    pub fn new(launcher: L, roster: &'a [EngineConfig], results_file: &'a Path) -> Self {
        Self {
            launcher,
            roster,
            results_file,
        }
    }

    /// Run every roster entry once.
    ///
    /// The store is rewritten after each engine that contributed rows.
    /// Fails only when no engine produced a single row.
    pub fn run(&self, plan: &DatasetPlan) -> Result<RunReport> {
        let mut store = load_results(self.results_file)?;
        if !store.is_empty() {
            info!("Loaded {} existing results from {:?}", store.len(), self.results_file);
        }

        let mut report = RunReport::default();
        let total = self.roster.len();

        for (idx, engine) in self.roster.iter().enumerate() {
            let label = engine.label();
            let mut state = EngineState::Pending;
            info!("[{}/{}] {}: {}", idx + 1, total, label, state);

            state = EngineState::Launching;
            info!("[{}/{}] {}: {}", idx + 1, total, label, state);

            let outcome = match self.launcher.launch(engine, plan) {
                Ok(outcome) => outcome,
                Err(e) => {
                    error!("[FAIL] {}: {:#}", label, e);
                    EngineOutcome::Failed {
                        code: None,
                        salvaged: Vec::new(),
                    }
                }
            };

            state = EngineState::Collecting;
            info!("[{}/{}] {}: {}", idx + 1, total, label, state);
            log_outcome(&label, &outcome);

            state = outcome.state();
            let rows = outcome.into_rows();
            info!("[{}/{}] {}: {} ({} rows)", idx + 1, total, label, state, rows.len());

            if !rows.is_empty() {
                store = merge(&store, &rows);
                save_results(self.results_file, &store)?;
            }

            report.engines.push(EngineReport {
                engine: label,
                state,
                rows: rows.len(),
            });
            report.rows.extend(rows);
        }

        if report.rows.is_empty() {
            return Err(BenchError::NoResults { attempted: total }.into());
        }

        report.stored_rows = store.len();
        info!(
            "Results saved to {:?} ({} rows)",
            self.results_file, report.stored_rows
        );
        Ok(report)
    }
}

fn log_outcome(label: &str, outcome: &EngineOutcome) {
    match outcome {
        EngineOutcome::Succeeded(rows) => info!("[OK] {}: got {} results", label, rows.len()),
        EngineOutcome::Failed { code, salvaged } => {
            let code = code.map_or_else(|| "signal".to_string(), |c| c.to_string());
            if salvaged.is_empty() {
                error!("[FAIL] {}: runner exited with code {}", label, code);
            } else {
                warn!(
                    "[FAIL] {}: runner exited with code {}, salvaged {} results",
                    label,
                    code,
                    salvaged.len()
                );
            }
        }
        EngineOutcome::InitFailed(reason) => error!("[FAIL] {}: failed to load: {}", label, reason),
        EngineOutcome::TimedOut => error!("[FAIL] {}: timed out, results discarded", label),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engines::OcrEngine;
    use crate::runner::test_support::{command_config, plan_with, FakeEngine};
    use crate::runner::InProcessLauncher;
    use std::cell::RefCell;
    use tempfile::TempDir;

    fn fake_launcher() -> InProcessLauncher<impl Fn(&EngineConfig) -> Box<dyn OcrEngine>> {
        InProcessLauncher::with_factory(|config: &EngineConfig| {
            let label = config.label();
            let engine = FakeEngine::new(&label).answering("hello");
            let engine = if label.starts_with("Broken") {
                engine.failing_init()
            } else {
                engine
            };
            Box::new(engine) as Box<dyn OcrEngine>
        })
    }

    /// Launcher replaying canned outcomes in order
    struct Scripted {
        outcomes: RefCell<Vec<Result<EngineOutcome>>>,
    }

    impl Scripted {
        fn new(mut outcomes: Vec<Result<EngineOutcome>>) -> Self {
            outcomes.reverse();
            Self {
                outcomes: RefCell::new(outcomes),
            }
        }
    }

    impl Launcher for Scripted {
        fn launch(&self, _engine: &EngineConfig, _plan: &DatasetPlan) -> Result<EngineOutcome> {
            self.outcomes
                .borrow_mut()
                .pop()
                .unwrap_or(Ok(EngineOutcome::TimedOut))
        }
    }

    fn row(engine: &str, image: &str) -> ResultRow {
        ResultRow::score(engine, "printed", image, "hello", "HELLO", 0.1)
    }

    #[test]
    fn test_init_failure_skips_engine() {
        let dir = TempDir::new().unwrap();
        let store = dir.path().join("all_results.csv");
        let roster = vec![
            command_config("EngineA"),
            command_config("Broken"),
            command_config("EngineC"),
        ];
        let plan = plan_with("printed", &[("img1.png", "HELLO"), ("img2.png", "hello")]);

        let report = Orchestrator::new(fake_launcher(), &roster, &store).run(&plan).unwrap();

        let states: Vec<EngineState> = report.engines.iter().map(|e| e.state).collect();
        assert_eq!(
            states,
            [EngineState::Succeeded, EngineState::Failed, EngineState::Succeeded]
        );
        assert_eq!(report.rows.len(), 4);

        let mut engines: Vec<String> = report.rows.iter().map(|r| r.engine.clone()).collect();
        engines.dedup();
        assert_eq!(engines, ["EngineA", "EngineC"]);

        let persisted = load_results(&store).unwrap();
        assert_eq!(persisted, report.rows);
    }

    #[test]
    fn test_merges_into_existing_store() {
        let dir = TempDir::new().unwrap();
        let store = dir.path().join("all_results.csv");
        let mut earlier = row("EngineA", "img1.png");
        earlier.cer = 0.5;
        save_results(&store, &[earlier, row("Remote", "img1.png")]).unwrap();

        let roster = vec![command_config("EngineA")];
        let plan = plan_with("printed", &[("img1.png", "HELLO")]);
        let report = Orchestrator::new(fake_launcher(), &roster, &store).run(&plan).unwrap();

        let persisted = load_results(&store).unwrap();
        assert_eq!(report.stored_rows, 2);
        assert_eq!(persisted.len(), 2);
        assert_eq!(persisted[0].engine, "Remote");
        assert_eq!(persisted[1].engine, "EngineA");
        assert_eq!(persisted[1].cer, 0.0);
    }

    #[test]
    fn test_failure_salvage_and_timeout() {
        let dir = TempDir::new().unwrap();
        let store = dir.path().join("all_results.csv");
        let roster = vec![
            command_config("Crashy"),
            command_config("Slow"),
            command_config("Missing"),
        ];
        let launcher = Scripted::new(vec![
            Ok(EngineOutcome::Failed {
                code: Some(139),
                salvaged: vec![row("Crashy", "img1.png")],
            }),
            Ok(EngineOutcome::TimedOut),
            Err(anyhow::anyhow!("spawn failed")),
        ]);

        let report = Orchestrator::new(launcher, &roster, &store)
            .run(&plan_with("printed", &[("img1.png", "HELLO")]))
            .unwrap();

        let summary: Vec<(EngineState, usize)> = report.engines.iter().map(|e| (e.state, e.rows)).collect();
        assert_eq!(
            summary,
            [
                (EngineState::Failed, 1),
                (EngineState::TimedOut, 0),
                (EngineState::Failed, 0)
            ]
        );
        assert_eq!(load_results(&store).unwrap(), vec![row("Crashy", "img1.png")]);
    }

    #[test]
    fn test_no_results_is_fatal() {
        let dir = TempDir::new().unwrap();
        let store = dir.path().join("all_results.csv");
        let roster = vec![command_config("Broken1"), command_config("Broken2")];

        let err = Orchestrator::new(fake_launcher(), &roster, &store)
            .run(&plan_with("printed", &[("img1.png", "HELLO")]))
            .unwrap_err();

        assert!(matches!(
            err.downcast_ref::<BenchError>(),
            Some(BenchError::NoResults { attempted: 2 })
        ));
        assert!(!store.exists());
    }

    #[test]
    fn test_state_names() {
        assert_eq!(EngineState::TimedOut.to_string(), "timed_out");
        assert_eq!(EngineState::Collecting.to_string(), "collecting");
    }
}
