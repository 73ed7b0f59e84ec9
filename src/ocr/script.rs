// Script tagging for recognized fragments

use serde::{Deserialize, Serialize};

/// Writing systems the OCR backends can be tuned to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Script {
    #[serde(rename = "en")]
    Latin,
    #[serde(rename = "hi")]
    Devanagari,
    #[serde(rename = "te")]
    Telugu,
}

impl Script {
    /// Tag written into fragments and the language descriptor
    pub fn tag(self) -> &'static str {
        match self {
            Script::Latin => "en",
            Script::Devanagari => "hi",
            Script::Telugu => "te",
        }
    }

    /// Name of the tesseract traineddata file for this script
    pub fn tesseract_lang(self) -> &'static str {
        match self {
            Script::Latin => "eng",
            Script::Devanagari => "hin",
            Script::Telugu => "tel",
        }
    }

    pub fn contains(self, c: char) -> bool {
        match self {
            Script::Latin => c.is_ascii_alphabetic() || ('\u{00C0}'..='\u{024F}').contains(&c),
            Script::Devanagari => ('\u{0900}'..='\u{097F}').contains(&c),
            Script::Telugu => ('\u{0C00}'..='\u{0C7F}').contains(&c),
        }
    }
}

/// Joins scripts into a tesseract language argument, e.g. `tel+eng`
pub fn tesseract_languages(scripts: &[Script]) -> String {
    scripts
        .iter()
        .map(|s| s.tesseract_lang())
        .collect::<Vec<_>>()
        .join("+")
}

/// Pick the candidate script with the most characters in `text`.
///
/// Ties and text without any candidate characters resolve to the earliest
/// candidate. Returns `None` only when `candidates` is empty.
pub fn dominant_script(text: &str, candidates: &[Script]) -> Option<Script> {
    let mut best: Option<(Script, usize)> = None;

    for &script in candidates {
        let count = text.chars().filter(|&c| script.contains(c)).count();
        match best {
            Some((_, best_count)) if count <= best_count => {}
            _ => best = Some((script, count)),
        }
    }

    best.map(|(script, _)| script)
}
