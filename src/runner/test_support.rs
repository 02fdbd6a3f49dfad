//! Scriptable engine and plan builders for runner and orchestrator tests

use anyhow::{bail, Result};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::dataset::{CategoryPlan, DatasetPlan, SamplePair};
use crate::engines::{CommandConfig, EngineConfig, OcrEngine};

/// Engine returning a fixed answer, with optional failures
pub struct FakeEngine {
    name: String,
    answer: String,
    fail_init: bool,
    fail_on: Option<String>,
    panic_on: Option<String>,
    pause: Duration,
}

impl FakeEngine {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            answer: String::new(),
            fail_init: false,
            fail_on: None,
            panic_on: None,
            pause: Duration::ZERO,
        }
    }

    pub fn answering(mut self, answer: &str) -> Self {
        self.answer = answer.to_string();
        self
    }

    pub fn failing_init(mut self) -> Self {
        self.fail_init = true;
        self
    }

    pub fn failing_on(mut self, image: &str) -> Self {
        self.fail_on = Some(image.to_string());
        self
    }

    /// Sleep this long before every sample, like a rate-limited client
    pub fn pausing(mut self, pause: Duration) -> Self {
        self.pause = pause;
        self
    }

    pub fn panicking_on(mut self, image: &str) -> Self {
        self.panic_on = Some(image.to_string());
        self
    }
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default()
}

impl OcrEngine for FakeEngine {
    fn initialize(&mut self) -> Result<()> {
        if self.fail_init {
            bail!("{} could not load its model", self.name);
        }
        Ok(())
    }

    fn before_sample(&mut self) {
        std::thread::sleep(self.pause);
    }

    fn extract_text(&mut self, image: &Path) -> Result<String> {
        let name = file_name(image);
        if self.panic_on.as_deref() == Some(name.as_str()) {
            panic!("simulated engine crash on {}", name);
        }
        if self.fail_on.as_deref() == Some(name.as_str()) {
            bail!("simulated extraction failure on {}", name);
        }
        Ok(self.answer.clone())
    }

    fn display_name(&self) -> String {
        self.name.clone()
    }
}

/// Single-category plan; images need not exist on disk
pub fn plan_with(category: &str, samples: &[(&str, &str)]) -> DatasetPlan {
    DatasetPlan {
        categories: vec![CategoryPlan {
            key: category.to_string(),
            label: category.to_string(),
            pairs: samples
                .iter()
                .map(|(image, truth)| SamplePair {
                    image: PathBuf::from("datasets").join(category).join("images").join(image),
                    ground_truth: truth.to_string(),
                })
                .collect(),
        }],
    }
}

/// Roster entry whose label is `name`
pub fn command_config(name: &str) -> EngineConfig {
    EngineConfig::Command(CommandConfig {
        name: name.to_string(),
        program: "true".to_string(),
        args: Vec::new(),
        check_args: None,
    })
}
