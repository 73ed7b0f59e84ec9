// libtesseract backend

use super::{OcrBackend, OcrFragment, script::{self, Script}, tsv};
use anyhow::{Context, Result, anyhow};
use image::{DynamicImage, ImageFormat};
use log::{info, warn};
use std::{io::Cursor, sync::Mutex};
use tesseract::Tesseract;

/// The API handle is only ever touched behind the mutex
struct ApiHandle(Tesseract);

unsafe impl Send for ApiHandle {}

/// Keeps one initialized tesseract API handle for the life of the process
pub struct TesseractApiBackend {
    name: String,
    scripts: Vec<Script>,
    languages: String,
    tessdata_dir: Option<String>,
    api: Mutex<Option<ApiHandle>>,
}

impl TesseractApiBackend {
    pub fn new(name: &str, scripts: &[Script], tessdata_dir: Option<&str>) -> Result<Self> {
        if scripts.is_empty() {
            anyhow::bail!("OCR backend '{}' has no scripts configured", name);
        }

        let languages = script::tesseract_languages(scripts);
        let api = init_api(tessdata_dir, &languages)?;
        info!("OCR backend '{}' ready (libtesseract {})", name, languages);

        Ok(Self {
            name: name.to_string(),
            scripts: scripts.to_vec(),
            languages,
            tessdata_dir: tessdata_dir.map(str::to_string),
            api: Mutex::new(Some(ApiHandle(api))),
        })
    }
}

fn init_api(tessdata_dir: Option<&str>, languages: &str) -> Result<Tesseract> {
    Tesseract::new(tessdata_dir, Some(languages))
        .map_err(|e| anyhow!("failed to initialize tesseract for '{}': {:?}", languages, e))
}

impl OcrBackend for TesseractApiBackend {
    fn name(&self) -> &str {
        &self.name
    }

    fn recognize(&self, img: &DynamicImage) -> Result<Vec<OcrFragment>> {
        let mut png = Vec::new();
        img.write_to(&mut Cursor::new(&mut png), ImageFormat::Png)
            .context("failed to encode image for tesseract")?;

        let mut guard = self
            .api
            .lock()
            .map_err(|_| anyhow!("tesseract handle poisoned"))?;

        // A failed call consumes the handle, so it is rebuilt here
        let api = match guard.take() {
            Some(handle) => handle.0,
            None => {
                warn!("Re-initializing tesseract for backend '{}'", self.name);
                init_api(self.tessdata_dir.as_deref(), &self.languages)?
            }
        };

        let mut api = api
            .set_image_from_mem(&png)
            .map_err(|e| anyhow!("tesseract rejected image: {:?}", e))?
            .recognize()
            .map_err(|e| anyhow!("tesseract recognition failed: {:?}", e))?;
        let tsv = api
            .get_tsv_text(0)
            .map_err(|e| anyhow!("tesseract TSV output failed: {:?}", e))?;

        *guard = Some(ApiHandle(api));
        Ok(tsv::parse_fragments(&tsv, &self.scripts))
    }
}
