// Fake/real text classifiers

use log::{info, warn};
use std::path::Path;

use crate::consts::{HEURISTIC_KEYWORD, LABEL_FAKE, LABEL_REAL};

pub mod artifact;

pub use artifact::{ArtifactClassifier, ArtifactError};

/// Trait for anything that labels extracted text
pub trait Classifier {
    fn predict(&self, text: &str) -> String;
}

/// Keyword rule used when no trained model is available.
/// Not meant for production use.
#[derive(Debug, Clone, Copy, Default)]
pub struct HeuristicClassifier;

impl Classifier for HeuristicClassifier {
    fn predict(&self, text: &str) -> String {
        if text.to_lowercase().contains(HEURISTIC_KEYWORD) {
            LABEL_REAL.to_string()
        } else {
            LABEL_FAKE.to_string()
        }
    }
}

/// The classifier variant picked at startup
#[derive(Debug)]
pub enum ClassifierWrapper {
    Artifact(ArtifactClassifier),
    Heuristic(HeuristicClassifier),
}

impl Classifier for ClassifierWrapper {
    fn predict(&self, text: &str) -> String {
        match self {
            ClassifierWrapper::Artifact(classifier) => classifier.predict(text),
            ClassifierWrapper::Heuristic(classifier) => classifier.predict(text),
        }
    }
}

/// Outcome of [`select_classifier`]
#[derive(Debug)]
pub struct ClassifierSelection {
    pub classifier: ClassifierWrapper,
    /// Set when the heuristic had to stand in for a missing artifact
    pub warning: Option<String>,
}

/// Load the artifact at `model_path`, or fall back to the heuristic when
/// nothing exists there. An artifact that exists but cannot be loaded is an
/// error.
pub fn select_classifier(model_path: &Path) -> Result<ClassifierSelection, ArtifactError> {
    if !model_path.exists() {
        let message = format!(
            "Model not found at {}. Using keyword heuristic for testing.",
            model_path.display()
        );
        warn!("{}", message);
        return Ok(ClassifierSelection {
            classifier: ClassifierWrapper::Heuristic(HeuristicClassifier),
            warning: Some(message),
        });
    }

    let classifier = ArtifactClassifier::load(model_path)?;
    info!(
        "Loaded classifier from {} (labels: {})",
        model_path.display(),
        classifier.labels().join(", ")
    );
    Ok(ClassifierSelection {
        classifier: ClassifierWrapper::Artifact(classifier),
        warning: None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn heuristic_matches_news_case_insensitively() {
        let classifier = HeuristicClassifier;
        assert_eq!(classifier.predict("Breaking NEWS today"), "Real");
        assert_eq!(classifier.predict("newsletter"), "Real");
        assert_eq!(classifier.predict("random text"), "Fake");
        assert_eq!(classifier.predict(""), "Fake");
    }

    #[test]
    fn missing_artifact_selects_heuristic_with_warning() {
        let dir = tempfile::tempdir().unwrap();
        let selection = select_classifier(&dir.path().join("absent.json")).unwrap();

        assert!(matches!(selection.classifier, ClassifierWrapper::Heuristic(_)));
        let warning = selection.warning.expect("a warning should be reported");
        assert!(warning.contains("absent.json"));
        assert_eq!(selection.classifier.predict("daily news"), "Real");
    }

    #[test]
    fn present_artifact_is_loaded() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("model.json");
        std::fs::write(
            &path,
            r#"{"labels": ["Real", "Fake"], "intercepts": [0.0, 0.5], "weights": {"official": [2.0, 0.0]}}"#,
        )
        .unwrap();

        let selection = select_classifier(&path).unwrap();

        assert!(matches!(selection.classifier, ClassifierWrapper::Artifact(_)));
        assert!(selection.warning.is_none());
        assert_eq!(selection.classifier.predict("official statement"), "Real");
        assert_eq!(selection.classifier.predict("news"), "Fake");
    }

    #[test]
    fn corrupt_artifact_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("model.json");
        std::fs::write(&path, "not json").unwrap();

        assert!(matches!(
            select_classifier(&path),
            Err(ArtifactError::Parse { .. })
        ));
    }
}
