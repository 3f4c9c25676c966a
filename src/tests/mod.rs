mod cli;

use std::collections::HashMap;
use std::path::Path;

use crate::semantic::{EmbeddingProvider, ProviderError};

/// Deterministic provider keyed by image file name. Text queries embed to
/// `text_vector`; unknown images fail like unreadable files.
pub struct FakeProvider {
    pub vectors: HashMap<String, Vec<f32>>,
    pub captions: HashMap<String, String>,
    pub text_vector: Vec<f32>,
}

impl FakeProvider {
    pub fn new(text_vector: Vec<f32>) -> Self {
        Self {
            vectors: HashMap::new(),
            captions: HashMap::new(),
            text_vector,
        }
    }

    pub fn image(mut self, file: &str, vector: Vec<f32>, caption: &str) -> Self {
        self.vectors.insert(file.to_string(), vector);
        if !caption.is_empty() {
            self.captions.insert(file.to_string(), caption.to_string());
        }
        self
    }
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy().to_string())
        .unwrap_or_default()
}

impl EmbeddingProvider for FakeProvider {
    fn embed_image(&self, path: &Path) -> Result<Vec<f32>, ProviderError> {
        let name = file_name(path);
        self.vectors
            .get(&name)
            .cloned()
            .ok_or_else(|| ProviderError::EmbeddingFailed(format!("cannot read {name}")))
    }

    fn embed_text(&self, _text: &str) -> Result<Vec<f32>, ProviderError> {
        Ok(self.text_vector.clone())
    }

    fn caption(&self, path: &Path) -> Result<String, ProviderError> {
        let name = file_name(path);
        self.captions
            .get(&name)
            .cloned()
            .ok_or_else(|| ProviderError::CaptionFailed(format!("no caption for {name}")))
    }

    fn dimensions(&self) -> usize {
        self.text_vector.len()
    }
}
