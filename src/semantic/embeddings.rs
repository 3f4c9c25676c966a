//! Embedding provider for style images and text queries.
//!
//! Provides a high-level interface over fastembed's joint image/text models:
//! - Image and text models loaded together so both land in one vector space
//! - Model download with a configurable cache directory
//! - Per-call timeout wrapper so a hung model call fails one image, not the run

use std::path::{Path, PathBuf};
use std::sync::mpsc;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use fastembed::{ImageEmbedding, ImageInitOptions, InitOptions, TextEmbedding};

use crate::semantic::caption::Captioner;
use crate::semantic::index::normalized;

/// Error type for embedding and caption operations.
///
/// Every variant is recoverable for a single image during aggregation.
#[derive(Debug, Clone, thiserror::Error)]
pub enum ProviderError {
    #[error("Model initialization failed: {0}")]
    InitFailed(String),

    #[error("Embedding generation failed: {0}")]
    EmbeddingFailed(String),

    #[error("Caption generation failed: {0}")]
    CaptionFailed(String),

    #[error("Captioning is disabled")]
    CaptionDisabled,

    #[error("Provider call timed out after {0} seconds")]
    Timeout(u64),

    #[error("Invalid model name: {0}")]
    InvalidModel(String),
}

/// Capability that turns images and text into vectors of one fixed dimension.
pub trait EmbeddingProvider: Send + Sync {
    /// Embed an image file. The returned vector is L2-normalized.
    fn embed_image(&self, path: &Path) -> Result<Vec<f32>, ProviderError>;

    /// Embed a text string into the same space as images. L2-normalized.
    fn embed_text(&self, text: &str) -> Result<Vec<f32>, ProviderError>;

    /// Describe an image in natural language.
    fn caption(&self, path: &Path) -> Result<String, ProviderError>;

    /// Vector dimension D.
    fn dimensions(&self) -> usize;
}

/// fastembed CLIP-style provider: vision tower for images, text tower for queries.
/// Uses Mutexes because fastembed's embed() requires &mut self.
pub struct ClipProvider {
    image_model: Mutex<ImageEmbedding>,
    text_model: Mutex<TextEmbedding>,
    captioner: Box<dyn Captioner>,
    model_name: String,
    dimensions: usize,
}

impl ClipProvider {
    /// Load the image and text models for `model_name`.
    ///
    /// Models are cached in the `models/` subdirectory of `cache_dir`.
    pub fn new(
        model_name: &str,
        cache_dir: PathBuf,
        captioner: Box<dyn Captioner>,
    ) -> Result<Self, ProviderError> {
        let (image_enum, text_enum) = Self::parse_model_name(model_name)?;

        let models_dir = cache_dir.join("models");
        std::fs::create_dir_all(&models_dir).map_err(|e| {
            ProviderError::InitFailed(format!("Failed to create models directory: {}", e))
        })?;

        log::info!("Loading image and text models for '{}'", model_name);

        let image_model = ImageEmbedding::try_new(
            ImageInitOptions::new(image_enum)
                .with_cache_dir(models_dir.clone())
                .with_show_download_progress(true),
        )
        .map_err(|e| ProviderError::InitFailed(e.to_string()))?;

        let mut text_model = TextEmbedding::try_new(
            InitOptions::new(text_enum)
                .with_cache_dir(models_dir)
                .with_show_download_progress(true),
        )
        .map_err(|e| ProviderError::InitFailed(e.to_string()))?;

        let dimensions = Self::probe_dimensions(&mut text_model)?;

        Ok(Self {
            image_model: Mutex::new(image_model),
            text_model: Mutex::new(text_model),
            captioner,
            model_name: model_name.to_string(),
            dimensions,
        })
    }

    /// Get the model name
    pub fn name(&self) -> &str {
        &self.model_name
    }

    /// Map a model family name to its paired fastembed image and text models.
    fn parse_model_name(
        name: &str,
    ) -> Result<(fastembed::ImageEmbeddingModel, fastembed::EmbeddingModel), ProviderError> {
        match name.to_lowercase().as_str() {
            "clip-vit-b-32" | "clipvitb32" => Ok((
                fastembed::ImageEmbeddingModel::ClipVitB32,
                fastembed::EmbeddingModel::ClipVitB32,
            )),
            "nomic-embed-v1.5" | "nomicembedv15" => Ok((
                fastembed::ImageEmbeddingModel::NomicEmbedVisionV15,
                fastembed::EmbeddingModel::NomicEmbedTextV15,
            )),
            _ => Err(ProviderError::InvalidModel(format!(
                "Unknown model: {}. Supported models: clip-vit-b-32, nomic-embed-v1.5",
                name
            ))),
        }
    }

    fn probe_dimensions(model: &mut TextEmbedding) -> Result<usize, ProviderError> {
        let test_embeddings = model
            .embed(vec!["test"], None)
            .map_err(|e| ProviderError::InitFailed(format!("Failed to probe dimensions: {}", e)))?;

        test_embeddings
            .first()
            .map(|v| v.len())
            .ok_or_else(|| ProviderError::InitFailed("Model returned no embedding".to_string()))
    }
}

impl EmbeddingProvider for ClipProvider {
    fn embed_image(&self, path: &Path) -> Result<Vec<f32>, ProviderError> {
        if !path.is_file() {
            return Err(ProviderError::EmbeddingFailed(format!(
                "image not readable: {}",
                path.display()
            )));
        }

        let mut model = self.image_model.lock().map_err(|e| {
            ProviderError::EmbeddingFailed(format!("Failed to acquire model lock: {}", e))
        })?;

        let embeddings = model
            .embed(vec![path], None)
            .map_err(|e| ProviderError::EmbeddingFailed(e.to_string()))?;

        embeddings
            .into_iter()
            .next()
            .map(|v| normalized(&v))
            .ok_or_else(|| ProviderError::EmbeddingFailed("No embedding returned".to_string()))
    }

    fn embed_text(&self, text: &str) -> Result<Vec<f32>, ProviderError> {
        let mut model = self.text_model.lock().map_err(|e| {
            ProviderError::EmbeddingFailed(format!("Failed to acquire model lock: {}", e))
        })?;

        let embeddings = model
            .embed(vec![text], None)
            .map_err(|e| ProviderError::EmbeddingFailed(e.to_string()))?;

        embeddings
            .into_iter()
            .next()
            .map(|v| normalized(&v))
            .ok_or_else(|| ProviderError::EmbeddingFailed("No embedding returned".to_string()))
    }

    fn caption(&self, path: &Path) -> Result<String, ProviderError> {
        self.captioner.caption(path)
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }
}

/// Wraps a provider and bounds every call by `timeout`.
///
/// Each call runs on its own worker thread; on timeout the worker is detached
/// and the call reports `ProviderError::Timeout`. Model calls pass one at a
/// time through `model_gate`, and the clock starts only once a worker holds
/// it, so waiting behind other callers (or behind a detached worker) never
/// counts against a call's timeout. Captions skip the gate.
pub struct TimedProvider {
    inner: Arc<dyn EmbeddingProvider>,
    timeout: Duration,
    model_gate: Arc<Mutex<()>>,
}

impl TimedProvider {
    pub fn new(inner: Arc<dyn EmbeddingProvider>, timeout: Duration) -> Self {
        Self {
            inner,
            timeout,
            model_gate: Arc::new(Mutex::new(())),
        }
    }

    fn call<T, F>(&self, gate: Option<Arc<Mutex<()>>>, f: F) -> Result<T, ProviderError>
    where
        T: Send + 'static,
        F: FnOnce(&dyn EmbeddingProvider) -> Result<T, ProviderError> + Send + 'static,
    {
        let inner = self.inner.clone();
        let (started_tx, started_rx) = mpsc::channel();
        let (tx, rx) = mpsc::channel();

        std::thread::spawn(move || {
            let _guard = gate
                .as_ref()
                .map(|gate| gate.lock().unwrap_or_else(PoisonError::into_inner));
            let _ = started_tx.send(());
            // receiver may be gone after a timeout
            let _ = tx.send(f(inner.as_ref()));
        });

        if started_rx.recv().is_err() {
            return Err(ProviderError::EmbeddingFailed(
                "provider worker exited before starting".to_string(),
            ));
        }

        match rx.recv_timeout(self.timeout) {
            Ok(result) => result,
            Err(mpsc::RecvTimeoutError::Timeout) => {
                Err(ProviderError::Timeout(self.timeout.as_secs()))
            }
            Err(mpsc::RecvTimeoutError::Disconnected) => Err(ProviderError::EmbeddingFailed(
                "provider worker exited without a result".to_string(),
            )),
        }
    }
}

impl EmbeddingProvider for TimedProvider {
    fn embed_image(&self, path: &Path) -> Result<Vec<f32>, ProviderError> {
        let path = path.to_path_buf();
        self.call(Some(self.model_gate.clone()), move |p| p.embed_image(&path))
    }

    fn embed_text(&self, text: &str) -> Result<Vec<f32>, ProviderError> {
        let text = text.to_string();
        self.call(Some(self.model_gate.clone()), move |p| p.embed_text(&text))
    }

    fn caption(&self, path: &Path) -> Result<String, ProviderError> {
        let path = path.to_path_buf();
        self.call(None, move |p| p.caption(&path))
    }

    fn dimensions(&self) -> usize {
        self.inner.dimensions()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::semantic::caption::NoCaptioner;

    struct SlowProvider;

    impl EmbeddingProvider for SlowProvider {
        fn embed_image(&self, _path: &Path) -> Result<Vec<f32>, ProviderError> {
            std::thread::sleep(Duration::from_millis(500));
            Ok(vec![1.0, 0.0])
        }

        fn embed_text(&self, _text: &str) -> Result<Vec<f32>, ProviderError> {
            Ok(vec![0.0, 1.0])
        }

        fn caption(&self, _path: &Path) -> Result<String, ProviderError> {
            Err(ProviderError::CaptionFailed("broken".to_string()))
        }

        fn dimensions(&self) -> usize {
            2
        }
    }

    #[test]
    fn test_timed_provider_times_out() {
        let timed = TimedProvider::new(Arc::new(SlowProvider), Duration::from_millis(20));
        let result = timed.embed_image(Path::new("slow.png"));
        assert!(matches!(result, Err(ProviderError::Timeout(_))));
    }

    #[test]
    fn test_timed_provider_passes_results_through() {
        let timed = TimedProvider::new(Arc::new(SlowProvider), Duration::from_secs(5));
        assert_eq!(timed.embed_text("hello").unwrap(), vec![0.0, 1.0]);
        assert_eq!(timed.dimensions(), 2);
        assert!(matches!(
            timed.caption(Path::new("x.png")),
            Err(ProviderError::CaptionFailed(_))
        ));
    }

    /// Every call holds one shared lock, like `ClipProvider`'s model mutex.
    struct SerializedProvider {
        model: Mutex<()>,
        work: Duration,
    }

    impl EmbeddingProvider for SerializedProvider {
        fn embed_image(&self, _path: &Path) -> Result<Vec<f32>, ProviderError> {
            let _model = self.model.lock().unwrap();
            std::thread::sleep(self.work);
            Ok(vec![1.0, 0.0])
        }

        fn embed_text(&self, _text: &str) -> Result<Vec<f32>, ProviderError> {
            self.embed_image(Path::new("text"))
        }

        fn caption(&self, _path: &Path) -> Result<String, ProviderError> {
            Err(ProviderError::CaptionDisabled)
        }

        fn dimensions(&self) -> usize {
            2
        }
    }

    #[test]
    fn test_queued_calls_do_not_time_out() {
        let timed = TimedProvider::new(
            Arc::new(SerializedProvider {
                model: Mutex::new(()),
                work: Duration::from_millis(40),
            }),
            Duration::from_millis(100),
        );

        // six calls need 240ms in total, each well under its own timeout
        let results: Vec<bool> = std::thread::scope(|scope| {
            let handles: Vec<_> = (0..6)
                .map(|i| {
                    let timed = &timed;
                    scope.spawn(move || timed.embed_image(Path::new(&format!("{i}.png"))).is_ok())
                })
                .collect();
            handles.into_iter().map(|h| h.join().unwrap()).collect()
        });

        assert_eq!(results, vec![true; 6]);
    }

    #[test]
    fn test_timed_out_worker_delays_but_does_not_fail_next_call() {
        let timed = TimedProvider::new(
            Arc::new(SerializedProvider {
                model: Mutex::new(()),
                work: Duration::from_millis(80),
            }),
            Duration::from_millis(50),
        );

        assert!(matches!(
            timed.embed_image(Path::new("slow.png")),
            Err(ProviderError::Timeout(_))
        ));

        let relaxed = TimedProvider {
            timeout: Duration::from_millis(120),
            ..timed
        };
        assert!(relaxed.embed_image(Path::new("next.png")).is_ok());
    }

    #[test]
    fn test_invalid_model_name() {
        let temp_dir = tempfile::tempdir().unwrap();
        let result = ClipProvider::new(
            "nonexistent-model",
            temp_dir.path().to_path_buf(),
            Box::new(NoCaptioner),
        );
        assert!(matches!(result, Err(ProviderError::InvalidModel(_))));
    }

    // Integration tests require model download - run with --ignored
    #[test]
    #[ignore = "requires model download"]
    fn test_text_embedding_is_normalized() {
        let temp_dir = tempfile::tempdir().unwrap();
        let provider = ClipProvider::new(
            "clip-vit-b-32",
            temp_dir.path().to_path_buf(),
            Box::new(NoCaptioner),
        )
        .unwrap();

        assert_eq!(provider.name(), "clip-vit-b-32");
        assert_eq!(provider.dimensions(), 512);

        let embedding = provider.embed_text("abstract art").unwrap();
        let norm: f32 = embedding.iter().map(|x| x * x).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 0.01);
    }
}
