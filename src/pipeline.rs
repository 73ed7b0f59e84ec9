use image::{DynamicImage, ImageReader};
use log::{debug, info};
use std::{
    io::{BufRead, Cursor, Seek},
    path::{Path, PathBuf},
    time::Instant,
};
use thiserror::Error;

use crate::{
    classifier::Classifier,
    consts::SUPPORTED_FORMATS,
    ocr::FallbackOcrEngine,
    store::{ClassificationRecord, ResultStore, StoreError},
    text::{self, ExtractionResult},
};

/// An already-resolved input image
#[derive(Debug, Clone)]
pub enum ImageSource {
    Path(PathBuf),
    /// In-memory encoded image; `label` is recorded as its path
    Bytes { label: String, data: Vec<u8> },
}

impl ImageSource {
    /// Value written to the `image_path` column
    pub fn label(&self) -> String {
        match self {
            ImageSource::Path(path) => path.display().to_string(),
            ImageSource::Bytes { label, .. } => label.clone(),
        }
    }

    /// Decode into pixels. Only PNG, JPEG and BMP are accepted, detected
    /// from the content rather than the file extension.
    pub fn decode(&self) -> Result<DynamicImage, PipelineError> {
        match self {
            ImageSource::Path(path) => {
                let reader = ImageReader::open(path)
                    .and_then(|r| r.with_guessed_format())
                    .map_err(|e| self.unreadable(e.to_string()))?;
                self.decode_with(reader)
            }
            ImageSource::Bytes { data, .. } => {
                let reader = ImageReader::new(Cursor::new(data.as_slice()))
                    .with_guessed_format()
                    .map_err(|e| self.unreadable(e.to_string()))?;
                self.decode_with(reader)
            }
        }
    }

    fn decode_with<R: BufRead + Seek>(
        &self,
        reader: ImageReader<R>,
    ) -> Result<DynamicImage, PipelineError> {
        match reader.format() {
            Some(format) if SUPPORTED_FORMATS.contains(&format) => {}
            Some(format) => {
                return Err(PipelineError::UnsupportedFormat {
                    image: self.label(),
                    format: format!("{:?}", format),
                });
            }
            None => return Err(self.unreadable("unrecognized image format".to_string())),
        }
        reader.decode().map_err(|e| self.unreadable(e.to_string()))
    }

    fn unreadable(&self, reason: String) -> PipelineError {
        PipelineError::UnreadableImage {
            image: self.label(),
            reason,
        }
    }
}

impl From<PathBuf> for ImageSource {
    fn from(path: PathBuf) -> Self {
        ImageSource::Path(path)
    }
}

impl From<&Path> for ImageSource {
    fn from(path: &Path) -> Self {
        ImageSource::Path(path.to_path_buf())
    }
}

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("could not read image {image}: {reason}")]
    UnreadableImage { image: String, reason: String },

    #[error("unsupported image format {format} for {image} (expected PNG, JPEG or BMP)")]
    UnsupportedFormat { image: String, format: String },

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Outcome of one processed image
#[derive(Debug, Clone)]
pub struct ProcessedImage {
    pub record: ClassificationRecord,
    pub fragment_count: usize,
}

/// OCR → assemble → classify → persist for one image at a time.
///
/// The engine, classifier and store are created once by the caller and
/// borrowed here; the pipeline holds no state of its own. Callers are
/// expected to process one image at a time.
pub struct Pipeline<'a> {
    ocr: &'a FallbackOcrEngine,
    classifier: &'a dyn Classifier,
    store: &'a ResultStore,
}

impl<'a> Pipeline<'a> {
    pub fn new(
        ocr: &'a FallbackOcrEngine,
        classifier: &'a dyn Classifier,
        store: &'a ResultStore,
    ) -> Self {
        Self {
            ocr,
            classifier,
            store,
        }
    }

    /// Process one image and append its record.
    ///
    /// Fails only when the image cannot be decoded (nothing is written) or
    /// when the store cannot be written.
    pub fn process(&self, source: &ImageSource) -> Result<ProcessedImage, PipelineError> {
        let now = Instant::now();
        let img = source.decode()?;
        debug!(
            "Decoded {} ({}x{})",
            source.label(),
            img.width(),
            img.height()
        );

        let fragments = self.ocr.extract(img);
        let fragment_count = fragments.len();
        let ExtractionResult {
            assembled_text,
            language_descriptor,
        } = text::assemble(&fragments);

        let prediction = self.classifier.predict(&assembled_text);

        let record = ClassificationRecord {
            image_path: source.label(),
            language_detected: language_descriptor,
            extracted_text: assembled_text,
            prediction,
        };
        self.store.append(&record)?;

        info!(
            "Processed {} in {:?}: {} fragments, prediction {}",
            record.image_path,
            now.elapsed(),
            fragment_count,
            record.prediction
        );
        Ok(ProcessedImage {
            record,
            fragment_count,
        })
    }
}
