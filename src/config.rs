//! Application configuration
//!
//! Settings stored in TOML format. Every field has a default, so a partial
//! file or no file at all is valid.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::{
    consts::{
        DEFAULT_BACKEND_TIMEOUT_SECS, DEFAULT_MODEL_PATH, DEFAULT_RESULTS_PATH,
        DEFAULT_TESSERACT_BIN, PRIMARY_SCRIPTS, SECONDARY_SCRIPTS,
    },
    ocr::{BackendKind, script::Script},
};

/// Application settings
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub ocr: OcrConfig,
    pub classifier: ClassifierConfig,
    pub store: StoreConfig,
}

/// OCR engine settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OcrConfig {
    /// Backend implementation used for both readers
    pub backend: BackendKind,
    /// Per-call limit in seconds, 0 disables it
    pub timeout_secs: u64,
    /// Override for the tesseract language data directory
    pub tessdata_dir: Option<String>,
    /// Tesseract executable, looked up on `PATH` unless it contains a slash
    pub tesseract_bin: PathBuf,
    pub primary: BackendConfig,
    pub secondary: BackendConfig,
}

impl Default for OcrConfig {
    fn default() -> Self {
        Self {
            backend: BackendKind::default(),
            timeout_secs: DEFAULT_BACKEND_TIMEOUT_SECS,
            tessdata_dir: None,
            tesseract_bin: PathBuf::from(DEFAULT_TESSERACT_BIN),
            primary: BackendConfig::new(&PRIMARY_SCRIPTS),
            secondary: BackendConfig::new(&SECONDARY_SCRIPTS),
        }
    }
}

impl OcrConfig {
    /// Scripts of the first reader, the built-in pair when not configured
    pub fn primary_scripts(&self) -> &[Script] {
        self.primary.scripts_or(&PRIMARY_SCRIPTS)
    }

    /// Scripts of the fallback reader, the built-in pair when not configured
    pub fn secondary_scripts(&self) -> &[Script] {
        self.secondary.scripts_or(&SECONDARY_SCRIPTS)
    }
}

/// Settings of one OCR reader
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BackendConfig {
    /// Scripts this reader is tuned to, first one is the regional script.
    /// Unset means the reader's built-in pair.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scripts: Option<Vec<Script>>,
    /// Tesseract page segmentation mode
    pub psm: u32,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            scripts: None,
            psm: 3,
        }
    }
}

impl BackendConfig {
    pub fn new(scripts: &[Script]) -> Self {
        Self {
            scripts: Some(scripts.to_vec()),
            ..Default::default()
        }
    }

    fn scripts_or<'a>(&'a self, default: &'a [Script]) -> &'a [Script] {
        self.scripts.as_deref().unwrap_or(default)
    }
}

/// Classifier settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ClassifierConfig {
    /// Trained artifact; the keyword heuristic is used when it is missing
    pub model_path: PathBuf,
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            model_path: PathBuf::from(DEFAULT_MODEL_PATH),
        }
    }
}

/// Result store settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    pub results_path: PathBuf,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            results_path: PathBuf::from(DEFAULT_RESULTS_PATH),
        }
    }
}

/// Load configuration from file
pub fn load_config(path: &Path) -> Result<AppConfig> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read config {}", path.display()))?;
    let config: AppConfig = toml::from_str(&content)
        .with_context(|| format!("failed to parse config {}", path.display()))?;
    Ok(config)
}

/// Save configuration to file, replacing any existing one
pub fn save_config(config: &AppConfig, path: &Path) -> Result<()> {
    let content = toml::to_string_pretty(config)?;
    std::fs::write(path, content)?;
    Ok(())
}
