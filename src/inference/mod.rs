//! Remote inference: the boundary with the hosted image model.
//!
//! - [`Transformer`]: blocking image-to-image contract the processor depends on
//! - [`replicate::ReplicateClient`]: implementation against the Replicate HTTP API
//! - [`prediction`]: wire types for Replicate predictions
//! - [`RetryPolicy`]: bounded retry for transport failures

pub mod prediction;
pub mod replicate;

use std::time::Duration;

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use image::ImageFormat;
use tracing::warn;

use crate::error::{Error, Result};
use crate::registry::ModelConfig;

pub use replicate::{ApiToken, ClientConfig, ReplicateClient};

/// Image-to-image transformation through a hosted model.
///
/// Implementations block until the remote work reaches a terminal state.
pub trait Transformer {
    /// Transform `image` with `model`, returning the output image bytes.
    fn transform(&self, image: &[u8], model: &ModelConfig, prompt: &str) -> Result<Vec<u8>>;
}

impl<T: Transformer + ?Sized> Transformer for &T {
    fn transform(&self, image: &[u8], model: &ModelConfig, prompt: &str) -> Result<Vec<u8>> {
        (**self).transform(image, model, prompt)
    }
}

/// Check request inputs and detect the image format.
pub fn validate_request(image: &[u8], prompt: &str) -> Result<ImageFormat> {
    if image.is_empty() {
        return Err(Error::InvalidInput("image is empty".to_string()));
    }
    if prompt.trim().is_empty() {
        return Err(Error::InvalidInput("prompt is empty".to_string()));
    }
    image::guess_format(image)
        .map_err(|e| Error::InvalidInput(format!("unrecognized image data: {e}")))
}

/// Encode image bytes as a `data:` URI.
#[must_use]
pub fn data_uri(image: &[u8], format: ImageFormat) -> String {
    let encoded = STANDARD.encode(image);
    format!("data:{};base64,{encoded}", format.to_mime_type())
}

/// Retry schedule for transport failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts including the first one.
    pub max_attempts: u32,

    /// Delay before the first retry; doubles on each further retry.
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_secs(1),
        }
    }
}

impl RetryPolicy {
    /// No retries.
    #[must_use]
    pub fn none() -> Self {
        Self {
            max_attempts: 1,
            base_delay: Duration::ZERO,
        }
    }

    /// Delay after the given failed attempt (1-based).
    #[must_use]
    pub fn delay_after(&self, attempt: u32) -> Duration {
        let exp = attempt.saturating_sub(1).min(16);
        self.base_delay.saturating_mul(1 << exp)
    }

    /// Run `op`, retrying only errors that are retryable.
    pub fn run<T>(&self, what: &str, mut op: impl FnMut() -> Result<T>) -> Result<T> {
        let max_attempts = self.max_attempts.max(1);
        let mut attempt = 1;
        loop {
            match op() {
                Err(e) if e.is_retryable() && attempt < max_attempts => {
                    let delay = self.delay_after(attempt);
                    warn!(%e, attempt, ?delay, "{what} failed, retrying");
                    std::thread::sleep(delay);
                    attempt += 1;
                }
                other => return other,
            }
        }
    }
}
