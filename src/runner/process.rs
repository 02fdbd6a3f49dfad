//! Process isolation for engine runs
//!
//! Each engine runs in a fresh child process so the memory its models
//! allocate goes back to the operating system when the child exits. The
//! child receives the engine configuration as its last argument and the
//! dataset plan as one frame on stdin; it answers with frames on stdout and
//! logs on stderr.

use anyhow::{Context, Result};
use crossbeam_channel::{unbounded, Receiver, RecvTimeoutError, Sender};
use std::io::{BufRead, BufReader, Read};
use std::path::PathBuf;
use std::process::{Child, Command, ExitStatus, Stdio};
use std::thread;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

use crate::config::RunnerSettings;
use crate::dataset::DatasetPlan;
use crate::engines::EngineConfig;
use crate::orchestrator::{EngineOutcome, Launcher};
use crate::shared::{read_frame, write_frame, ProtocolError, ResultRow, WorkerMessage};

/// How long to keep reading frames after the child has exited
const DRAIN_GRACE: Duration = Duration::from_secs(5);

/// How a runner process ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessExit {
    /// Exited on its own
    Exited { success: bool, code: Option<i32> },
    /// Killed after exceeding the wall-clock ceiling
    TimedOut,
}

impl From<ExitStatus> for ProcessExit {
    fn from(status: ExitStatus) -> Self {
        ProcessExit::Exited {
            success: status.success(),
            code: status.code(),
        }
    }
}

/// What the child reported before it ended
#[derive(Debug, Default)]
pub struct Collected {
    /// Reason given in an `InitFailed` message
    pub init_failure: Option<String>,
    /// Payload of the `Results` message
    pub results: Option<Vec<ResultRow>>,
}

impl Collected {
    fn absorb(&mut self, label: &str, message: Result<WorkerMessage, ProtocolError>) {
        match message {
            Ok(WorkerMessage::Progress(line)) => info!("  {}", line),
            Ok(WorkerMessage::Loaded(name)) => info!("  {} loaded", name),
            Ok(WorkerMessage::InitFailed(reason)) => self.init_failure = Some(reason),
            Ok(WorkerMessage::Results(rows)) => {
                info!("  Got {} results from {}", rows.len(), label);
                if self.results.replace(rows).is_some() {
                    warn!("{} sent more than one result set; keeping the last", label);
                }
            }
            Err(e) => warn!("{}: runner channel error: {}", label, e),
        }
    }
}

/// Decide the outcome of one runner process
pub fn classify(exit: ProcessExit, collected: Collected) -> EngineOutcome {
    let ProcessExit::Exited { success, code } = exit else {
        return EngineOutcome::TimedOut;
    };

    if let Some(reason) = collected.init_failure {
        return EngineOutcome::InitFailed(reason);
    }

    match (success, collected.results) {
        (true, Some(rows)) => EngineOutcome::Succeeded(rows),
        (true, None) => EngineOutcome::Failed {
            code,
            salvaged: Vec::new(),
        },
        (false, rows) => EngineOutcome::Failed {
            code,
            salvaged: rows.unwrap_or_default(),
        },
    }
}

/// Launches each engine in its own child process with a wall-clock ceiling
#[derive(Debug, Clone)]
pub struct ProcessLauncher {
    program: PathBuf,
    prefix_args: Vec<String>,
    timeout: Duration,
    poll_interval: Duration,
}

impl ProcessLauncher {
    /// Launch `program prefix_args... <engine json>` for every engine
    pub fn new(
        program: impl Into<PathBuf>,
        prefix_args: Vec<String>,
        timeout: Duration,
        poll_interval: Duration,
    ) -> Self {
        Self {
            program: program.into(),
            prefix_args,
            timeout,
            poll_interval,
        }
    }

    /// Re-run the current executable in worker mode
    pub fn current_exe(settings: &RunnerSettings) -> Result<Self> {
        let exe = std::env::current_exe().context("Failed to locate the current executable")?;
        Ok(Self::new(
            exe,
            vec!["worker".to_string(), "--engine".to_string()],
            settings.timeout(),
            settings.poll_interval(),
        ))
    }

    fn spawn(&self, engine_arg: &str) -> Result<Child> {
        let mut command = Command::new(&self.program);
        command
            .args(&self.prefix_args)
            .arg(engine_arg)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());

        // Own process group, so a timeout also takes down helper processes
        #[cfg(unix)]
        {
            use std::os::unix::process::CommandExt;
            command.process_group(0);
        }

        command
            .spawn()
            .with_context(|| format!("Failed to spawn runner {}", self.program.display()))
    }

    /// Poll the child until it exits or the deadline passes
    fn supervise(
        &self,
        child: &mut Child,
        messages: &Receiver<Result<WorkerMessage, ProtocolError>>,
        label: &str,
        collected: &mut Collected,
    ) -> Result<ProcessExit> {
        let deadline = Instant::now() + self.timeout;

        loop {
            match messages.recv_timeout(self.poll_interval) {
                Ok(message) => collected.absorb(label, message),
                Err(RecvTimeoutError::Timeout) => {}
                Err(RecvTimeoutError::Disconnected) => thread::sleep(self.poll_interval),
            }

            if let Some(status) = child.try_wait().context("Failed to poll runner process")? {
                return Ok(status.into());
            }

            if Instant::now() >= deadline {
                warn!("{} timed out after {:?} - killing", label, self.timeout);
                kill_tree(child);
                let _ = child.wait();
                return Ok(ProcessExit::TimedOut);
            }
        }
    }
}

impl Launcher for ProcessLauncher {
    fn launch(&self, engine: &EngineConfig, plan: &DatasetPlan) -> Result<EngineOutcome> {
        let label = engine.label();
        let engine_arg = serde_json::to_string(engine).context("Failed to serialize engine config")?;
        let mut child = self.spawn(&engine_arg)?;

        let stdin = child.stdin.take().context("Runner stdin unavailable")?;
        let stdout = child.stdout.take().context("Runner stdout unavailable")?;
        let stderr = child.stderr.take().context("Runner stderr unavailable")?;

        let plan = plan.clone();
        thread::spawn(move || {
            let mut stdin = stdin;
            if let Err(e) = write_frame(&mut stdin, &plan) {
                debug!("Runner did not take the dataset plan: {}", e);
            }
        });

        let (tx, rx) = unbounded();
        thread::spawn(move || forward_frames(stdout, tx));

        let stderr_label = label.clone();
        thread::spawn(move || relay_stderr(stderr, &stderr_label));

        let mut collected = Collected::default();
        let exit = self.supervise(&mut child, &rx, &label, &mut collected)?;

        if exit != ProcessExit::TimedOut {
            drain(&rx, &label, &mut collected);
        }

        Ok(classify(exit, collected))
    }
}

/// Kill the runner and everything it started
fn kill_tree(child: &mut Child) {
    #[cfg(unix)]
    {
        // The runner leads its own process group (see `spawn`)
        if let Ok(pgid) = i32::try_from(child.id()) {
            if unsafe { libc::kill(-pgid, libc::SIGKILL) } == 0 {
                return;
            }
        }
    }
    let _ = child.kill();
}

/// Read frames until end of stream. A corrupt frame is reported and
/// skipped; a broken stream ends the loop.
fn forward_frames<R: Read>(stdout: R, tx: Sender<Result<WorkerMessage, ProtocolError>>) {
    let mut reader = BufReader::new(stdout);
    loop {
        match read_frame(&mut reader) {
            Ok(Some(message)) => {
                if tx.send(Ok(message)).is_err() {
                    break;
                }
            }
            Ok(None) => break,
            Err(e) => {
                let recoverable = e.is_recoverable();
                if tx.send(Err(e)).is_err() || !recoverable {
                    break;
                }
            }
        }
    }
}

/// Relay runner log lines to the operator
fn relay_stderr<R: Read>(stderr: R, label: &str) {
    for line in BufReader::new(stderr).lines() {
        let Ok(line) = line else {
            break;
        };
        if line.trim().is_empty() {
            continue;
        }
        if looks_like_problem(&line) {
            warn!("[{}] {}", label, line);
        } else {
            debug!("[{}] {}", label, line);
        }
    }
}

fn looks_like_problem(line: &str) -> bool {
    let lower = line.to_lowercase();
    ["error", "fail", "panic"].iter().any(|word| lower.contains(word))
}

/// Collect frames still in flight once the child has exited
fn drain(rx: &Receiver<Result<WorkerMessage, ProtocolError>>, label: &str, collected: &mut Collected) {
    let deadline = Instant::now() + DRAIN_GRACE;
    while let Ok(message) = rx.recv_deadline(deadline) {
        collected.absorb(label, message);
    }
}
