//! OCR Engine Adapters
//!
//! Every engine under evaluation implements [`OcrEngine`]. Concrete engines
//! are selected by an [`EngineConfig`] value, which is also the serialized
//! argument handed to an isolated runner process.
//! Supported engines:
//! - Tesseract command-line program
//! - Any external program that prints recognized text to stdout
//! - A remote vision model behind an HTTP chat-completion API

pub mod command;
pub mod remote;
pub mod tesseract;

use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::path::Path;

pub use command::{CommandConfig, CommandEngine};
pub use remote::{RemoteConfig, RemoteEngine};
pub use tesseract::{TesseractConfig, TesseractEngine};

/// Capability set every OCR engine provides
pub trait OcrEngine {
    /// Load models, verify binaries or credentials. Called once before any extraction.
    fn initialize(&mut self) -> Result<()>;

    /// Called before each sample, outside the timed extraction. Engines
    /// that must pace their requests wait here.
    fn before_sample(&mut self) {}

    /// Run OCR on a single image and return the extracted text
    fn extract_text(&mut self, image: &Path) -> Result<String>;

    /// Human-readable engine name used in result rows and reports
    fn display_name(&self) -> String;
}

/// Which engine to construct, and with what parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "engine", rename_all = "snake_case")]
pub enum EngineConfig {
    /// Tesseract command-line OCR
    Tesseract(TesseractConfig),
    /// External program printing recognized text
    Command(CommandConfig),
    /// Remote vision model API
    Remote(RemoteConfig),
}

impl EngineConfig {
    /// Construct the engine. No models are loaded until `initialize`.
    pub fn build(&self) -> Box<dyn OcrEngine> {
        match self {
            EngineConfig::Tesseract(config) => Box::new(TesseractEngine::new(config.clone())),
            EngineConfig::Command(config) => Box::new(CommandEngine::new(config.clone())),
            EngineConfig::Remote(config) => Box::new(RemoteEngine::new(config.clone())),
        }
    }

    /// Name used in logs before the engine exists
    pub fn label(&self) -> String {
        match self {
            EngineConfig::Tesseract(config) => config.display_name(),
            EngineConfig::Command(config) => config.name.clone(),
            EngineConfig::Remote(config) => config.name.clone(),
        }
    }
}
