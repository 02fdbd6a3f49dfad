//! Tesseract OCR backend
//!
//! Wraps the `tesseract` command-line program.

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::process::Command;
use tracing::{debug, info};

use super::OcrEngine;

/// Tesseract settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TesseractConfig {
    /// Display name override
    #[serde(skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    /// Path or name of the tesseract executable
    pub binary: String,
    /// Page segmentation mode (3 = fully automatic, 6 = single uniform block)
    pub psm: u8,
    /// Tesseract language code
    pub language: String,
}

impl TesseractConfig {
    pub fn display_name(&self) -> String {
        self.label.clone().unwrap_or_else(|| "Tesseract".to_string())
    }
}

impl Default for TesseractConfig {
    fn default() -> Self {
        Self {
            label: None,
            binary: "tesseract".to_string(),
            psm: 3,
            language: "eng".to_string(),
        }
    }
}

/// Tesseract engine wrapper
pub struct TesseractEngine {
    config: TesseractConfig,
}

impl TesseractEngine {
    pub fn new(config: TesseractConfig) -> Self {
        Self { config }
    }

    fn command_args(&self, image: &Path) -> Vec<String> {
        vec![
            image.to_string_lossy().into_owned(),
            "stdout".to_string(),
            "--psm".to_string(),
            self.config.psm.to_string(),
            "-l".to_string(),
            self.config.language.clone(),
        ]
    }
}

impl OcrEngine for TesseractEngine {
    fn initialize(&mut self) -> Result<()> {
        let output = Command::new(&self.config.binary)
            .arg("--version")
            .output()
            .with_context(|| format!("Failed to run '{}'. Is Tesseract installed?", self.config.binary))?;

        if !output.status.success() {
            bail!(
                "'{} --version' exited with {}",
                self.config.binary,
                output.status
            );
        }

        // Older releases print the version banner on stderr
        let banner = if output.stdout.is_empty() {
            String::from_utf8_lossy(&output.stderr).into_owned()
        } else {
            String::from_utf8_lossy(&output.stdout).into_owned()
        };
        let version = banner.lines().next().unwrap_or_default().trim();

        info!("{} initialized ({})", self.display_name(), version);
        Ok(())
    }

    fn extract_text(&mut self, image: &Path) -> Result<String> {
        let args = self.command_args(image);
        debug!("Running {} {:?}", self.config.binary, args);

        let output = Command::new(&self.config.binary)
            .args(&args)
            .output()
            .with_context(|| format!("Failed to run '{}'", self.config.binary))?;

        if !output.status.success() {
            bail!(
                "tesseract exited with {}: {}",
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            );
        }

        Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
    }

    fn display_name(&self) -> String {
        self.config.display_name()
    }
}
