//! Text assembly from OCR fragments

use serde::{Deserialize, Serialize};

use crate::{consts::UNKNOWN_LANGUAGE, ocr::OcrFragment};

/// Normalized OCR output for one image
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtractionResult {
    pub assembled_text: String,
    /// Distinct script tags joined with ", ", or `"unknown"`
    pub language_descriptor: String,
}

/// Join fragment texts with single spaces, in input order.
///
/// Fragments are neither trimmed nor filtered, so whitespace-only fragments
/// still contribute a separator.
pub fn assemble(fragments: &[OcrFragment]) -> ExtractionResult {
    let assembled_text = fragments
        .iter()
        .map(|f| f.text.as_str())
        .collect::<Vec<_>>()
        .join(" ");

    let language_descriptor = if fragments.is_empty() {
        UNKNOWN_LANGUAGE.to_string()
    } else {
        let mut tags: Vec<&str> = Vec::new();
        for fragment in fragments {
            if !tags.contains(&fragment.script.as_str()) {
                tags.push(&fragment.script);
            }
        }
        tags.join(", ")
    };

    ExtractionResult {
        assembled_text,
        language_descriptor,
    }
}
