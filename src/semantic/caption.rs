//! Image captioning backends.
//!
//! Captions feed the keyword summary and the keyword-overlap scorer. They are
//! best-effort: a failing captioner never blocks embedding.

use std::path::Path;
use std::time::Duration;

use base64::{engine::general_purpose::STANDARD, Engine as _};
use serde::{Deserialize, Serialize};

use crate::semantic::embeddings::ProviderError;

/// Produces a natural-language caption for one image file.
pub trait Captioner: Send + Sync {
    fn caption(&self, path: &Path) -> Result<String, ProviderError>;
}

/// Captioner used when no caption service is configured.
pub struct NoCaptioner;

impl Captioner for NoCaptioner {
    fn caption(&self, _path: &Path) -> Result<String, ProviderError> {
        Err(ProviderError::CaptionDisabled)
    }
}

#[derive(Serialize)]
struct CaptionRequest<'a> {
    image: String,
    mime_type: &'a str,
}

#[derive(Deserialize)]
struct CaptionResponse {
    caption: String,
}

/// Captioner backed by an HTTP caption service.
///
/// Sends `{"image": <base64>, "mime_type": ...}` and expects `{"caption": ...}`.
pub struct HttpCaptioner {
    client: reqwest::blocking::Client,
    endpoint: url::Url,
    timeout: Duration,
}

impl HttpCaptioner {
    pub fn new(endpoint: url::Url, timeout: Duration) -> Result<Self, ProviderError> {
        let client = reqwest::blocking::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ProviderError::InitFailed(format!("caption client: {}", e)))?;

        Ok(Self {
            client,
            endpoint,
            timeout,
        })
    }
}

impl Captioner for HttpCaptioner {
    fn caption(&self, path: &Path) -> Result<String, ProviderError> {
        let data = std::fs::read(path).map_err(|e| {
            ProviderError::CaptionFailed(format!("{}: {}", path.display(), e))
        })?;

        let mime_type = infer::get(&data)
            .filter(|kind| kind.matcher_type() == infer::MatcherType::Image)
            .map(|kind| kind.mime_type())
            .ok_or_else(|| {
                ProviderError::CaptionFailed(format!("{} is not an image", path.display()))
            })?;

        let request = CaptionRequest {
            image: STANDARD.encode(&data),
            mime_type,
        };

        let response = self
            .client
            .post(self.endpoint.clone())
            .json(&request)
            .send()
            .and_then(|res| res.error_for_status())
            .map_err(|e| {
                if e.is_timeout() {
                    ProviderError::Timeout(self.timeout.as_secs())
                } else {
                    ProviderError::CaptionFailed(e.to_string())
                }
            })?;

        let body: CaptionResponse = response
            .json()
            .map_err(|e| ProviderError::CaptionFailed(format!("bad caption response: {}", e)))?;

        let caption = body.caption.trim().to_string();
        if caption.is_empty() {
            return Err(ProviderError::CaptionFailed("empty caption".to_string()));
        }

        Ok(caption)
    }
}
