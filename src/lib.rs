pub mod consts {
    use crate::ocr::script::Script;

    pub const DEFAULT_CONFIG_PATH: &str = "fakenews_ocr.toml";
    pub const DEFAULT_MODEL_PATH: &str = "models/fake_news_model.json";
    pub const DEFAULT_RESULTS_PATH: &str = "results/predictions.csv";
    pub const DEFAULT_BACKEND_TIMEOUT_SECS: u64 = 120;
    pub const DEFAULT_TESSERACT_BIN: &str = "tesseract";

    /// Telugu reader is tried first, Hindi second.
    pub const PRIMARY_SCRIPTS: [Script; 2] = [Script::Telugu, Script::Latin];
    pub const SECONDARY_SCRIPTS: [Script; 2] = [Script::Devanagari, Script::Latin];

    pub const UNKNOWN_LANGUAGE: &str = "unknown";

    pub const LABEL_REAL: &str = "Real";
    pub const LABEL_FAKE: &str = "Fake";
    pub const HEURISTIC_KEYWORD: &str = "news";

    pub const RESULT_COLUMNS: [&str; 4] = [
        "image_path",
        "language_detected",
        "extracted_text",
        "prediction",
    ];

    /// Raster formats accepted as input images
    pub const SUPPORTED_FORMATS: [image::ImageFormat; 3] = [
        image::ImageFormat::Png,
        image::ImageFormat::Jpeg,
        image::ImageFormat::Bmp,
    ];
}

pub mod classifier;
pub mod config;
pub mod ocr;
pub mod pipeline;
pub mod store;
pub mod text;

pub use classifier::{Classifier, ClassifierWrapper};
pub use ocr::{FallbackOcrEngine, OcrBackend, OcrFragment};
pub use pipeline::{ImageSource, Pipeline, PipelineError};
pub use store::{ClassificationRecord, ResultStore, StoreError};
pub use text::{ExtractionResult, assemble};
