//! Configuration types
//!
//! Runtime configuration handed to the inference engine. These are
//! projections of the persisted settings and are fixed for a session.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// How the model is loaded and how its context is sized
#[derive(Debug, Clone)]
pub struct ModelConfig {
    /// Path to the GGUF file
    pub model_path: PathBuf,
    /// Context window in tokens (prompt + response)
    pub context_size: u32,
    /// Threads used for generation
    pub threads: i32,
    /// Threads used for prompt/batch processing
    pub threads_batch: i32,
    /// Logical batch size for prompt decoding
    pub batch_size: u32,
    /// Number of GPU layers to offload (0 = CPU only)
    pub gpu_layers: u32,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            model_path: PathBuf::from("models/Llama-3.1-8B-Instruct-Q4_K_M.gguf"),
            context_size: 8192,
            threads: 4,
            threads_batch: 4,
            batch_size: 512,
            gpu_layers: 0,
        }
    }
}

/// Sampling and stopping options for a single generation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerationConfig {
    /// Caps the response length in tokens
    pub max_new_tokens: u32,
    pub temperature: f32,
    pub top_p: f32,
    pub top_k: u32,
    pub repeat_penalty: f32,
    /// Strings that end generation early; never echoed
    pub stop_sequences: Vec<String>,
    pub seed: u32,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            max_new_tokens: 2048,
            temperature: 0.8,
            top_p: 0.92,
            top_k: 40,
            repeat_penalty: 1.15,
            stop_sequences: vec!["<|eot_id|>".to_string()],
            seed: 1234,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = ModelConfig::default();
        assert_eq!(config.context_size, 8192);
        assert_eq!(config.gpu_layers, 0);
        assert_eq!(config.batch_size, 512);
    }

    #[test]
    fn test_generation_defaults_stop_on_eot() {
        let config = GenerationConfig::default();
        assert_eq!(config.max_new_tokens, 2048);
        assert_eq!(config.stop_sequences, vec!["<|eot_id|>".to_string()]);
    }

    #[test]
    fn test_config_serialization() {
        let config = GenerationConfig::default();
        let json = serde_json::to_string(&config).expect("Failed to serialize");
        let deserialized: GenerationConfig =
            serde_json::from_str(&json).expect("Failed to deserialize");
        assert_eq!(config, deserialized);
    }
}
