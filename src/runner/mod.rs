//! Isolated Runner
//!
//! Evaluates one engine against every category of a [`DatasetPlan`]. The
//! same evaluation loop runs inside a dedicated worker process (see
//! [`run_worker`] and [`process::ProcessLauncher`]) or directly in the
//! calling process ([`InProcessLauncher`]).

pub mod process;

#[cfg(test)]
pub(crate) mod test_support;

use anyhow::{Context, Result};
use std::io::{BufWriter, Write};
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::time::Instant;
use tracing::{debug, info, warn};

use crate::dataset::DatasetPlan;
use crate::engines::{EngineConfig, OcrEngine};
use crate::orchestrator::{EngineOutcome, Launcher};
use crate::shared::{read_frame, write_frame, ResultRow, WorkerMessage};

pub use process::ProcessLauncher;

/// Worker exit code after the results were sent
pub const EXIT_OK: i32 = 0;
/// Worker exit code after the engine failed to initialize
pub const EXIT_INIT_FAILED: i32 = 2;

/// Run every sample of every populated category through the engine.
///
/// A sample whose extraction fails (or panics) is scored with an empty
/// prediction; evaluation always continues with the next sample. Rows come
/// out in category order, then file name order within a category.
pub fn evaluate_engine<F>(engine: &mut dyn OcrEngine, plan: &DatasetPlan, mut on_progress: F) -> Vec<ResultRow>
where
    F: FnMut(String),
{
    let name = engine.display_name();
    let mut rows = Vec::with_capacity(plan.total_samples());

    for category in plan.populated() {
        on_progress(format!(
            "Running on {} ({} images) ...",
            category.key,
            category.pairs.len()
        ));

        for pair in &category.pairs {
            let image_name = pair.image_name();
            engine.before_sample();
            let start = Instant::now();
            let outcome = catch_unwind(AssertUnwindSafe(|| engine.extract_text(&pair.image)));
            let elapsed = start.elapsed().as_secs_f64();

            let prediction = match outcome {
                Ok(Ok(text)) => text,
                Ok(Err(e)) => {
                    warn!("[FAIL] {}: {:#}", image_name, e);
                    String::new()
                }
                Err(_) => {
                    warn!("[FAIL] {}: engine panicked", image_name);
                    String::new()
                }
            };

            let row = ResultRow::score(
                &name,
                &category.key,
                &image_name,
                &prediction,
                &pair.ground_truth,
                elapsed,
            );
            on_progress(format!(
                "{} | {} | {} | CER={:.3} | {:.1}s",
                name, category.key, image_name, row.cer, elapsed
            ));
            rows.push(row);
        }
    }

    rows
}

/// Worker process entry point.
///
/// Reads the dataset plan frame from stdin, evaluates the engine and writes
/// framed messages to stdout. Returns the process exit code.
pub fn run_worker(config: &EngineConfig) -> Result<i32> {
    let plan: DatasetPlan = read_frame(&mut std::io::stdin().lock())
        .context("Failed to read dataset plan")?
        .context("Dataset plan missing from runner input")?;

    let mut out = take_frame_channel()?;
    serve(config.build(), &plan, &mut out)
}

/// Claim the original stdout for frames and point fd 1 at stderr, so
/// anything an engine prints ends up in the log instead of the channel.
#[cfg(unix)]
fn take_frame_channel() -> Result<BufWriter<std::fs::File>> {
    use std::os::unix::io::FromRawFd;

    std::io::stdout().flush()?;
    let fd = unsafe { libc::dup(libc::STDOUT_FILENO) };
    if fd < 0 {
        return Err(std::io::Error::last_os_error()).context("Failed to duplicate stdout");
    }
    let frames = unsafe { std::fs::File::from_raw_fd(fd) };

    if unsafe { libc::dup2(libc::STDERR_FILENO, libc::STDOUT_FILENO) } < 0 {
        return Err(std::io::Error::last_os_error()).context("Failed to redirect stdout");
    }
    Ok(BufWriter::new(frames))
}

#[cfg(not(unix))]
fn take_frame_channel() -> Result<BufWriter<std::io::Stdout>> {
    Ok(BufWriter::new(std::io::stdout()))
}

/// Initialize and evaluate one engine, reporting over a frame channel
pub fn serve<W: Write>(mut engine: Box<dyn OcrEngine>, plan: &DatasetPlan, out: &mut W) -> Result<i32> {
    let name = engine.display_name();
    debug!("Loading {} ...", name);

    if let Err(e) = engine.initialize() {
        write_frame(out, &WorkerMessage::InitFailed(format!("{:#}", e)))?;
        return Ok(EXIT_INIT_FAILED);
    }
    write_frame(out, &WorkerMessage::Loaded(name))?;

    let rows = evaluate_engine(engine.as_mut(), plan, |line| {
        if let Err(e) = write_frame(out, &WorkerMessage::Progress(line)) {
            debug!("Dropped progress message: {}", e);
        }
    });

    write_frame(out, &WorkerMessage::Results(rows))?;
    Ok(EXIT_OK)
}

/// Runs engines inside the calling process, without isolation or timeout
pub struct InProcessLauncher<F = fn(&EngineConfig) -> Box<dyn OcrEngine>> {
    factory: F,
}

impl InProcessLauncher {
    pub fn new() -> Self {
        Self {
            factory: EngineConfig::build,
        }
    }
}

impl Default for InProcessLauncher {
    fn default() -> Self {
        Self::new()
    }
}

impl<F> InProcessLauncher<F>
where
    F: Fn(&EngineConfig) -> Box<dyn OcrEngine>,
{
    /// Use a custom engine constructor
    pub fn with_factory(factory: F) -> Self {
        Self { factory }
    }
}

impl<F> Launcher for InProcessLauncher<F>
where
    F: Fn(&EngineConfig) -> Box<dyn OcrEngine>,
{
    fn launch(&self, config: &EngineConfig, plan: &DatasetPlan) -> Result<EngineOutcome> {
        let mut engine = (self.factory)(config);
        if let Err(e) = engine.initialize() {
            return Ok(EngineOutcome::InitFailed(format!("{:#}", e)));
        }
        info!("{} loaded", engine.display_name());

        let rows = evaluate_engine(engine.as_mut(), plan, |line| info!("  {}", line));
        Ok(EngineOutcome::Succeeded(rows))
    }
}
