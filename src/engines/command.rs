//! External program backend
//!
//! Runs any program that takes an image path and prints the recognized text
//! on stdout. Used to plug in engines with their own runtimes (EasyOCR,
//! PaddleOCR, TrOCR, DocTR wrappers) without linking them into this binary.

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::process::Command;
use tracing::{debug, info};

use super::OcrEngine;

/// Placeholder replaced by the image path in `args`
pub const IMAGE_PLACEHOLDER: &str = "{image}";

/// External program settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommandConfig {
    /// Display name
    pub name: String,
    /// Program to execute
    pub program: String,
    /// Arguments; `{image}` is replaced by the image path (appended when absent)
    #[serde(default)]
    pub args: Vec<String>,
    /// Arguments for a one-off availability check during initialization
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub check_args: Option<Vec<String>>,
}

/// Engine backed by an external program
pub struct CommandEngine {
    config: CommandConfig,
}

impl CommandEngine {
    pub fn new(config: CommandConfig) -> Self {
        Self { config }
    }

    /// Expand the configured arguments for one image
    fn expand_args(&self, image: &Path) -> Vec<String> {
        let image = image.to_string_lossy();
        let mut substituted = false;

        let mut args: Vec<String> = self
            .config
            .args
            .iter()
            .map(|arg| {
                if arg.contains(IMAGE_PLACEHOLDER) {
                    substituted = true;
                    arg.replace(IMAGE_PLACEHOLDER, &image)
                } else {
                    arg.clone()
                }
            })
            .collect();

        if !substituted {
            args.push(image.into_owned());
        }
        args
    }
}

impl OcrEngine for CommandEngine {
    fn initialize(&mut self) -> Result<()> {
        let Some(check_args) = &self.config.check_args else {
            return Ok(());
        };

        let status = Command::new(&self.config.program)
            .args(check_args)
            .output()
            .with_context(|| format!("Failed to run '{}'", self.config.program))?
            .status;

        if !status.success() {
            bail!("{} startup check exited with {}", self.config.name, status);
        }

        info!("{} is available", self.config.name);
        Ok(())
    }

    fn extract_text(&mut self, image: &Path) -> Result<String> {
        let args = self.expand_args(image);
        debug!("Running {} {:?}", self.config.program, args);

        let output = Command::new(&self.config.program)
            .args(&args)
            .output()
            .with_context(|| format!("Failed to run '{}'", self.config.program))?;

        if !output.status.success() {
            bail!(
                "{} exited with {}: {}",
                self.config.program,
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            );
        }

        Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
    }

    fn display_name(&self) -> String {
        self.config.name.clone()
    }
}
