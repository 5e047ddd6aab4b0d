//! Models registry for dream.
//!
//! The file named by `--conf` maps model names to their inference config and
//! weights, e.g.
//!
//! ```yaml
//! stable-diffusion-1.4:
//!   config: configs/stable-diffusion/v1-inference.yaml
//!   weights: models/ldm/stable-diffusion-v1/model.ckpt
//!   description: Stable Diffusion inference model version 1.4
//!   width: 512
//!   height: 512
//! ```

use anyhow::{Context, Result, anyhow};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

/// One model entry of the registry.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct ModelEntry {
    /// Path to the model's inference configuration.
    pub config: String,
    /// Path to the checkpoint.
    pub weights: String,
    #[serde(default)]
    pub description: Option<String>,
    /// Native width; must be a multiple of 64.
    #[serde(default)]
    pub width: Option<u32>,
    /// Native height; must be a multiple of 64.
    #[serde(default)]
    pub height: Option<u32>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(transparent)]
pub struct ModelsConfig {
    pub models: BTreeMap<String, ModelEntry>,
}

impl ModelsConfig {
    /// Load the registry at `path`.
    ///
    /// Returns `Ok(None)` when the file does not exist.
    pub fn load(path: &Path) -> Result<Option<Self>> {
        if !path.exists() {
            return Ok(None);
        }
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        let config = Self::from_yaml(&content)
            .with_context(|| format!("Invalid models file {}", path.display()))?;
        Ok(Some(config))
    }

    pub fn from_yaml(content: &str) -> Result<Self> {
        let config: Self = serde_yml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the registry for correctness.
    ///
    /// Every entry needs a config and weights path; dimensions, when given,
    /// must be non-zero multiples of 64.
    pub fn validate(&self) -> Result<()> {
        for (name, entry) in &self.models {
            if entry.config.trim().is_empty() {
                return Err(anyhow!("Model '{}' has no config path", name));
            }
            if entry.weights.trim().is_empty() {
                return Err(anyhow!("Model '{}' has no weights path", name));
            }
            for (label, dim) in [("width", entry.width), ("height", entry.height)] {
                if let Some(px) = dim
                    && (px == 0 || px % 64 != 0)
                {
                    return Err(anyhow!(
                        "Model '{}' has invalid {}: {} (must be a multiple of 64)",
                        name,
                        label,
                        px
                    ));
                }
            }
        }
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<&ModelEntry> {
        self.models.get(name)
    }

    /// Look up `name`, listing the known models on failure.
    pub fn resolve(&self, name: &str) -> Result<&ModelEntry> {
        self.get(name).ok_or_else(|| {
            let known: Vec<&str> = self.models.keys().map(|k| k.as_str()).collect();
            anyhow!("Unknown model '{}'. Known models: {}", name, known.join(", "))
        })
    }
}
