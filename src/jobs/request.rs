//! Generation requests and their validated form.

use serde::{Deserialize, Serialize};

use crate::error::ValidationError;
use crate::jobs::pricing::{MAX_DURATION_SECS, MIN_DURATION_SECS, ModelTier, SUPPORTED_RATIOS};

/// A generation request as submitted by a client.
#[derive(Debug, Clone, Deserialize)]
pub struct GenerationRequest {
    pub prompt_text: String,
    /// URL of a reference image for image-to-video.
    #[serde(default)]
    pub prompt_image: Option<String>,
    #[serde(default = "default_duration")]
    pub duration: u32,
    #[serde(default = "default_ratio")]
    pub ratio: String,
    #[serde(default)]
    pub seed: Option<u32>,
    #[serde(default = "default_model")]
    pub model: String,
}

fn default_duration() -> u32 {
    MIN_DURATION_SECS
}
fn default_ratio() -> String {
    "16:9".into()
}
fn default_model() -> String {
    ModelTier::DEFAULT.id().into()
}

impl GenerationRequest {
    /// Text-only request with defaults for everything else.
    pub fn text(prompt_text: impl Into<String>) -> Self {
        Self {
            prompt_text: prompt_text.into(),
            prompt_image: None,
            duration: default_duration(),
            ratio: default_ratio(),
            seed: None,
            model: default_model(),
        }
    }

    /// Check the request and resolve it into a [`GenerationSpec`].
    ///
    /// The model is resolved leniently (unknown ids become the default tier).
    pub fn validate(self) -> Result<GenerationSpec, ValidationError> {
        let prompt_text = self.prompt_text.trim();
        if prompt_text.is_empty() {
            return Err(ValidationError::EmptyPrompt);
        }
        validate_duration(self.duration)?;
        if !SUPPORTED_RATIOS.contains(&self.ratio.as_str()) {
            return Err(ValidationError::AspectRatio(self.ratio));
        }

        Ok(GenerationSpec {
            prompt_text: prompt_text.to_string(),
            prompt_image: self.prompt_image.filter(|url| !url.trim().is_empty()),
            duration: self.duration,
            ratio: self.ratio,
            seed: self.seed,
            model: ModelTier::resolve(&self.model),
        })
    }
}

/// Reject durations outside what the backend supports.
pub fn validate_duration(duration: u32) -> Result<(), ValidationError> {
    if (MIN_DURATION_SECS..=MAX_DURATION_SECS).contains(&duration) {
        Ok(())
    } else {
        Err(ValidationError::Duration {
            got: duration,
            min: MIN_DURATION_SECS,
            max: MAX_DURATION_SECS,
        })
    }
}

/// A validated request, ready to hand to the remote backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GenerationSpec {
    pub prompt_text: String,
    pub prompt_image: Option<String>,
    pub duration: u32,
    pub ratio: String,
    pub seed: Option<u32>,
    pub model: ModelTier,
}
