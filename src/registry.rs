//! Model registry: short identifiers mapped to hosted endpoint configuration.
//!
//! The registry is built once at startup and passed by reference to the
//! components that need it. Lookups go through [`ModelRegistry::get_model`],
//! which fails with [`Error::UnknownModel`] for identifiers it does not hold.

use std::collections::HashSet;
use std::path::Path;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};

use crate::error::{Error, Result};

/// Identifier of the model used when none is requested.
pub const DEFAULT_MODEL: &str = "nano-banana";

/// How a model expects the source image in its input payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageInput {
    /// Input field name (e.g. `image`, `input_image`, `image_input`).
    pub field: String,

    /// Whether the field takes a list of images rather than a single value.
    #[serde(default)]
    pub list: bool,
}

impl ImageInput {
    /// A field taking one image.
    #[must_use]
    pub fn single(field: &str) -> Self {
        Self {
            field: field.to_string(),
            list: false,
        }
    }

    /// A field taking a list of images.
    #[must_use]
    pub fn list(field: &str) -> Self {
        Self {
            field: field.to_string(),
            list: true,
        }
    }
}

/// Configuration for one hosted image-editing model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelConfig {
    /// Short identifier, unique within a registry.
    pub id: String,

    /// Remote endpoint as `owner/name`.
    pub endpoint: String,

    /// Human-readable description.
    #[serde(default)]
    pub description: String,

    /// Where the source image goes in the input payload.
    pub image_input: ImageInput,

    /// Default generation parameters merged into every request.
    #[serde(default)]
    pub params: Map<String, Value>,

    /// Expected output file extension.
    #[serde(default = "default_output_format")]
    pub output_format: String,
}

fn default_output_format() -> String {
    "png".to_string()
}

impl ModelConfig {
    /// Create a model with no default parameters.
    pub fn new(
        id: impl Into<String>,
        endpoint: impl Into<String>,
        image_input: ImageInput,
    ) -> Self {
        Self {
            id: id.into(),
            endpoint: endpoint.into(),
            description: String::new(),
            image_input,
            params: Map::new(),
            output_format: default_output_format(),
        }
    }

    /// Set the description.
    #[must_use]
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    /// Add a default generation parameter.
    #[must_use]
    pub fn with_param(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.params.insert(key.to_string(), value.into());
        self
    }

    /// Build the request input object for this model.
    ///
    /// `prompt` and the image field come first; default parameters never
    /// override them.
    #[must_use]
    pub fn build_input(&self, prompt: &str, image_uri: &str) -> Value {
        let mut input = Map::new();
        input.insert("prompt".to_string(), Value::String(prompt.to_string()));

        let image = if self.image_input.list {
            json!([image_uri])
        } else {
            Value::String(image_uri.to_string())
        };
        input.insert(self.image_input.field.clone(), image);

        for (key, value) in &self.params {
            input.entry(key.clone()).or_insert_with(|| value.clone());
        }

        Value::Object(input)
    }
}

/// Immutable registry of models in registration order.
#[derive(Debug, Clone)]
pub struct ModelRegistry {
    models: Vec<ModelConfig>,
    default_model: String,
}

impl ModelRegistry {
    /// Create a registry from a list of models.
    ///
    /// The first model becomes the default unless [`DEFAULT_MODEL`] is present.
    pub fn new(models: Vec<ModelConfig>) -> Result<Self> {
        let first = models
            .first()
            .ok_or_else(|| Error::Registry("registry has no models".to_string()))?;

        let mut seen = HashSet::new();
        for model in &models {
            if model.id.trim().is_empty() {
                return Err(Error::Registry(format!(
                    "model with endpoint {} has an empty id",
                    model.endpoint
                )));
            }
            if !seen.insert(model.id.as_str()) {
                return Err(Error::Registry(format!("duplicate model id: {}", model.id)));
            }
        }

        let default_model = if seen.contains(DEFAULT_MODEL) {
            DEFAULT_MODEL.to_string()
        } else {
            first.id.clone()
        };

        Ok(Self {
            models,
            default_model,
        })
    }

    /// Registry with the built-in Replicate models.
    #[must_use]
    pub fn builtin() -> Self {
        Self {
            models: builtin_models(),
            default_model: DEFAULT_MODEL.to_string(),
        }
    }

    /// Load a registry from a JSON file holding an array of models.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)?;
        let models: Vec<ModelConfig> = serde_json::from_str(&content)
            .map_err(|e| Error::Registry(format!("{}: {e}", path.display())))?;
        Self::new(models)
    }

    /// All models in registration order.
    #[must_use]
    pub fn list_models(&self) -> &[ModelConfig] {
        &self.models
    }

    /// Model identifiers in registration order.
    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.models.iter().map(|m| m.id.as_str())
    }

    /// Look up a model by identifier.
    pub fn get_model(&self, id: &str) -> Result<&ModelConfig> {
        self.models
            .iter()
            .find(|m| m.id == id)
            .ok_or_else(|| Error::UnknownModel(id.to_string()))
    }

    /// The default model.
    #[must_use]
    pub fn default_model(&self) -> &ModelConfig {
        // Constructors guarantee the default id is registered.
        self.models
            .iter()
            .find(|m| m.id == self.default_model)
            .unwrap_or(&self.models[0])
    }

    /// Resolve a list of identifiers, keeping caller order.
    ///
    /// Fails on the first unknown identifier.
    pub fn resolve_all<S: AsRef<str>>(&self, ids: &[S]) -> Result<Vec<&ModelConfig>> {
        ids.iter().map(|id| self.get_model(id.as_ref())).collect()
    }

    /// Number of registered models.
    #[must_use]
    pub fn len(&self) -> usize {
        self.models.len()
    }

    /// Always false for a constructed registry.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.models.is_empty()
    }
}

impl Default for ModelRegistry {
    fn default() -> Self {
        Self::builtin()
    }
}

fn builtin_models() -> Vec<ModelConfig> {
    vec![
        ModelConfig::new(
            "nano-banana",
            "google/nano-banana",
            ImageInput::list("image_input"),
        )
        .with_description("Google Gemini 2.5 Flash - fast, good quality (default)")
        .with_param("output_format", "png"),
        ModelConfig::new(
            "nano-banana-pro",
            "google/nano-banana-pro",
            ImageInput::list("image_input"),
        )
        .with_description("Google Gemini 3 Pro - highest quality, text rendering")
        .with_param("output_format", "png"),
        ModelConfig::new(
            "flux-kontext-pro",
            "black-forest-labs/flux-kontext-pro",
            ImageInput::single("input_image"),
        )
        .with_description("FLUX Kontext Pro - strong image editing")
        .with_param("aspect_ratio", "match_input_image")
        .with_param("output_format", "png"),
        // image_prompt is composition guidance, not direct editing
        ModelConfig::new(
            "flux-1.1-pro",
            "black-forest-labs/flux-1.1-pro",
            ImageInput::single("image_prompt"),
        )
        .with_description("FLUX 1.1 Pro - composition guidance")
        .with_param("aspect_ratio", "1:1")
        .with_param("output_format", "png"),
        ModelConfig::new(
            "qwen-image-edit",
            "qwen/qwen-image-edit",
            ImageInput::single("image"),
        )
        .with_description("Qwen Image Edit - precise text editing")
        .with_param("output_format", "png"),
        ModelConfig::new(
            "qwen-image-edit-plus",
            "qwen/qwen-image-edit-plus",
            ImageInput::list("image"),
        )
        .with_description("Qwen Image Edit Plus - enhanced editing")
        .with_param("output_format", "png"),
    ]
}
