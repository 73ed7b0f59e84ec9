// OCR backend trait and engine construction

use anyhow::Result;
use image::DynamicImage;
use serde::{Deserialize, Serialize};
use std::{sync::Arc, time::Duration};

use crate::config::OcrConfig;
use script::Script;

pub mod fallback_ocr;
pub mod script;
#[cfg(feature = "tesseract")]
pub mod tesseract_api;
pub mod tesseract_cli;
pub mod tsv;

pub use fallback_ocr::FallbackOcrEngine;

/// A piece of recognized text, in the order the backend detected it
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OcrFragment {
    pub text: String,
    /// Recognition confidence (0.0 - 1.0)
    pub confidence: f32,
    /// Script tag, see [`script::Script::tag`]
    pub script: String,
}

impl OcrFragment {
    pub fn new(text: impl Into<String>, confidence: f32, script: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            confidence,
            script: script.into(),
        }
    }
}

/// Trait for OCR backends that map pixel data to text fragments
///
/// Implementations are constructed once per process and shared across
/// threads; `recognize` must not require exclusive access.
pub trait OcrBackend: Send + Sync {
    /// Short name used in logs
    fn name(&self) -> &str;

    /// Recognize all text in the image
    ///
    /// # Arguments
    ///
    /// * `img` - The decoded input image
    ///
    /// # Returns
    ///
    /// Fragments in detection order; an empty vector when nothing was found
    fn recognize(&self, img: &DynamicImage) -> Result<Vec<OcrFragment>>;

    /// Abort a `recognize` call that is still running on another thread.
    /// Called when the caller stopped waiting for it.
    fn cancel(&self) {}
}

/// OCR backend implementation selection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackendKind {
    /// `tesseract` executable, one process per call
    #[default]
    TesseractCli,
    /// libtesseract bindings (requires the `tesseract` feature)
    TesseractApi,
}

/// Construct one backend. This is where model data gets loaded, so it
/// should happen once at startup.
pub fn build_backend(
    name: &str,
    config: &OcrConfig,
    scripts: &[Script],
    psm: u32,
) -> Result<Arc<dyn OcrBackend>> {
    let tessdata_dir = config.tessdata_dir.as_deref();
    match config.backend {
        BackendKind::TesseractCli => Ok(Arc::new(tesseract_cli::TesseractCliBackend::new(
            name,
            &config.tesseract_bin,
            scripts,
            psm,
            tessdata_dir,
        )?)),
        #[cfg(feature = "tesseract")]
        BackendKind::TesseractApi => Ok(Arc::new(tesseract_api::TesseractApiBackend::new(
            name,
            scripts,
            tessdata_dir,
        )?)),
        #[cfg(not(feature = "tesseract"))]
        BackendKind::TesseractApi => {
            anyhow::bail!("backend 'tesseract_api' requires building with the `tesseract` feature")
        }
    }
}

/// Build both backends and wrap them in the fallback engine
pub fn build_engine(config: &OcrConfig) -> Result<FallbackOcrEngine> {
    let primary = build_backend("primary", config, config.primary_scripts(), config.primary.psm)?;
    let secondary = build_backend(
        "secondary",
        config,
        config.secondary_scripts(),
        config.secondary.psm,
    )?;

    let timeout = (config.timeout_secs > 0).then(|| Duration::from_secs(config.timeout_secs));

    Ok(FallbackOcrEngine::new(primary, secondary).with_timeout(timeout))
}
