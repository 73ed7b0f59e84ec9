// Fallback OCR engine wrapper

use super::{OcrBackend, OcrFragment};
use anyhow::{Context, Result, anyhow};
use image::DynamicImage;
use log::{debug, warn};
use std::{
    sync::{
        Arc,
        mpsc::{self, RecvTimeoutError},
    },
    thread,
    time::{Duration, Instant},
};

/// Wrapper that combines a primary OCR backend with a fallback
///
/// The fallback is exclusive: its fragments replace the primary's, they are
/// never merged. `extract` does not fail; errors end up in the log.
pub struct FallbackOcrEngine {
    primary: Arc<dyn OcrBackend>,
    fallback: Arc<dyn OcrBackend>,
    timeout: Option<Duration>,
}

impl FallbackOcrEngine {
    pub fn new(primary: Arc<dyn OcrBackend>, fallback: Arc<dyn OcrBackend>) -> Self {
        Self {
            primary,
            fallback,
            timeout: None,
        }
    }

    /// Bound every backend call. `None` waits indefinitely.
    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    /// Extract text fragments from a decoded image
    pub fn extract(&self, img: DynamicImage) -> Vec<OcrFragment> {
        let img = Arc::new(img);

        // Try primary backend first
        match self.run_backend(&self.primary, &img) {
            Ok(fragments) if !fragments.is_empty() => return fragments,
            Ok(_) => debug!(
                "OCR backend '{}' found no text, trying '{}'",
                self.primary.name(),
                self.fallback.name()
            ),
            Err(e) => warn!(
                "OCR backend '{}' failed: {:#}. Trying '{}'",
                self.primary.name(),
                e,
                self.fallback.name()
            ),
        }

        match self.run_backend(&self.fallback, &img) {
            Ok(fragments) => fragments,
            Err(e) => {
                warn!("OCR backend '{}' failed: {:#}", self.fallback.name(), e);
                Vec::new()
            }
        }
    }

    /// Run one backend on a worker thread so that a hung or panicking
    /// backend turns into an error instead of blocking the caller.
    fn run_backend(
        &self,
        backend: &Arc<dyn OcrBackend>,
        img: &Arc<DynamicImage>,
    ) -> Result<Vec<OcrFragment>> {
        let (tx, rx) = mpsc::channel();
        let worker_backend = Arc::clone(backend);
        let worker_img = Arc::clone(img);

        let now = Instant::now();
        thread::Builder::new()
            .name(format!("ocr-{}", backend.name()))
            .spawn(move || {
                // Receiver may be gone after a timeout
                let _ = tx.send(worker_backend.recognize(&worker_img));
            })
            .context("failed to spawn OCR worker thread")?;

        let result = match self.timeout {
            Some(limit) => rx.recv_timeout(limit).map_err(|e| match e {
                RecvTimeoutError::Timeout => {
                    // The worker is abandoned, its backend work must not
                    // overlap with the next backend
                    backend.cancel();
                    anyhow!("timed out after {:?}", limit)
                }
                RecvTimeoutError::Disconnected => anyhow!("worker stopped without a result"),
            })?,
            None => rx
                .recv()
                .map_err(|_| anyhow!("worker stopped without a result"))?,
        };

        debug!(
            "OCR backend '{}' finished in {:?}",
            backend.name(),
            now.elapsed()
        );
        result
    }
}
