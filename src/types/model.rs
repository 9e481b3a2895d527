//! Model types
//!
//! Defines metadata about the loaded model, shown in the startup banner.

use std::path::Path;

/// Rough model weight size used when the file size cannot be read
const FALLBACK_MODEL_GB: f64 = 4.5;

/// f16 K+V bytes per token per layer for 8 KV heads of 128 dims (Llama 3 8B)
const KV_BYTES_PER_TOKEN_LAYER: f64 = 4096.0;

/// Information about a loaded model
#[derive(Debug, Clone)]
pub struct ModelInfo {
    /// Display name of the model
    pub name: String,
    /// Path to the GGUF file
    pub path: String,
    /// Model size in bytes
    pub size_bytes: u64,
    /// Context window the model was loaded with
    pub context_size: u32,
    /// Number of layers (if reported by the runtime)
    pub layers: Option<u32>,
}

impl ModelInfo {
    /// Describe the model file at `path`
    pub fn from_path(path: &Path, context_size: u32, layers: Option<u32>) -> Self {
        let name = path
            .file_stem()
            .map(|s| s.to_string_lossy().to_string())
            .unwrap_or_else(|| "model".to_string());
        let size_bytes = std::fs::metadata(path).map(|m| m.len()).unwrap_or(0);

        Self {
            name,
            path: path.display().to_string(),
            size_bytes,
            context_size,
            layers,
        }
    }

    pub fn size_gb(&self) -> f64 {
        if self.size_bytes == 0 {
            return FALLBACK_MODEL_GB;
        }
        self.size_bytes as f64 / (1024.0 * 1024.0 * 1024.0)
    }

    /// Estimated f16 KV cache footprint in GB
    pub fn kv_cache_gb(&self) -> f64 {
        let layers = self.layers.unwrap_or(32) as f64;
        self.context_size as f64 * layers * KV_BYTES_PER_TOKEN_LAYER / (1024.0 * 1024.0 * 1024.0)
    }
}
