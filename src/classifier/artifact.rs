// Artifact-backed classifier

use serde::Deserialize;
use std::{collections::HashMap, fs, path::{Path, PathBuf}};
use thiserror::Error;

use super::Classifier;

#[derive(Debug, Error)]
pub enum ArtifactError {
    #[error("failed to read classifier artifact {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse classifier artifact {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("invalid classifier artifact: {0}")]
    Invalid(String),
}

/// Serialized bag-of-words linear model, as written by the training job
#[derive(Debug, Clone, Deserialize)]
pub struct ModelArtifact {
    pub labels: Vec<String>,
    pub intercepts: Vec<f64>,
    /// Per-token weight vector, one entry per label
    #[serde(default)]
    pub weights: HashMap<String, Vec<f64>>,
    #[serde(default = "default_lowercase")]
    pub lowercase: bool,
}

fn default_lowercase() -> bool {
    true
}

impl ModelArtifact {
    fn validate(&self) -> Result<(), ArtifactError> {
        if self.labels.is_empty() {
            return Err(ArtifactError::Invalid("no labels".to_string()));
        }
        if self.intercepts.len() != self.labels.len() {
            return Err(ArtifactError::Invalid(format!(
                "{} intercepts for {} labels",
                self.intercepts.len(),
                self.labels.len()
            )));
        }
        if let Some((token, w)) = self
            .weights
            .iter()
            .find(|(_, w)| w.len() != self.labels.len())
        {
            return Err(ArtifactError::Invalid(format!(
                "token '{}' has {} weights for {} labels",
                token,
                w.len(),
                self.labels.len()
            )));
        }
        Ok(())
    }
}

/// Classifier backed by a trained artifact, loaded read-only
#[derive(Debug, Clone)]
pub struct ArtifactClassifier {
    model: ModelArtifact,
}

impl ArtifactClassifier {
    pub fn load(path: &Path) -> Result<Self, ArtifactError> {
        let content = fs::read_to_string(path).map_err(|source| ArtifactError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let model: ModelArtifact =
            serde_json::from_str(&content).map_err(|source| ArtifactError::Parse {
                path: path.to_path_buf(),
                source,
            })?;
        Self::from_model(model)
    }

    pub fn from_model(model: ModelArtifact) -> Result<Self, ArtifactError> {
        model.validate()?;
        Ok(Self { model })
    }

    pub fn labels(&self) -> &[String] {
        &self.model.labels
    }

    /// Per-label scores for `text`
    pub fn scores(&self, text: &str) -> Vec<f64> {
        let text = if self.model.lowercase {
            text.to_lowercase()
        } else {
            text.to_string()
        };

        let mut scores = self.model.intercepts.clone();
        for token in tokenize(&text) {
            if let Some(weights) = self.model.weights.get(token) {
                for (score, w) in scores.iter_mut().zip(weights) {
                    *score += w;
                }
            }
        }
        scores
    }
}

impl Classifier for ArtifactClassifier {
    fn predict(&self, text: &str) -> String {
        let scores = self.scores(text);
        // Earliest label wins ties
        let best = scores
            .iter()
            .enumerate()
            .fold(0, |best, (i, s)| if *s > scores[best] { i } else { best });
        self.model.labels[best].clone()
    }
}

/// Whitespace and ASCII punctuation split; keeps combining marks of Indic
/// scripts inside their words.
fn tokenize(text: &str) -> impl Iterator<Item = &str> {
    text.split(|c: char| c.is_whitespace() || c.is_ascii_punctuation())
        .filter(|t| !t.is_empty())
}
