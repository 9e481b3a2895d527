//! Settings storage
//!
//! Manages persistence of user preferences and inference settings.

use crate::storage::{get_data_dir, StorageError};
use crate::types::config::{GenerationConfig, ModelConfig};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

const MIN_CONTEXT_SIZE: u32 = 512;
const MAX_CONTEXT_SIZE: u32 = 131072;
const MAX_TOP_K: u32 = 1000;

/// Application settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Path to the GGUF model file
    pub model_path: PathBuf,
    /// Context window size
    pub context_size: u32,
    /// Generation threads (0 = all available cores)
    pub threads: u32,
    /// Prompt processing threads (0 = same as `threads`)
    pub threads_batch: u32,
    /// Logical batch size for prompt decoding
    pub batch_size: u32,
    /// Number of GPU layers to offload (0 = CPU only)
    pub gpu_layers: u32,
    /// Maximum number of tokens to generate
    pub max_tokens: u32,
    /// Temperature parameter for text generation (0.0 - 2.0)
    pub temperature: f32,
    /// Top-p (nucleus sampling) parameter (0.0 - 1.0)
    pub top_p: f32,
    /// Top-k sampling parameter
    pub top_k: u32,
    /// Repetition penalty (1.0 = off)
    pub repeat_penalty: f32,
    pub seed: u32,
    /// Strings that stop generation
    pub stop_sequences: Vec<String>,
    /// System prompt prepended to every prompt
    pub system_prompt: String,
    /// Where saved chats are written
    pub history_dir: PathBuf,
}

/// Default system prompt
pub fn default_system_prompt() -> String {
    "You are a warm, friendly, and highly intelligent AI assistant. You communicate naturally \
and conversationally, like a knowledgeable friend who genuinely wants to help.

Be clear and direct in your responses, but keep your tone approachable and engaging. Provide \
detailed explanations when needed, but do it in a way that feels natural, not overly formal. \
Use structure (like bullet points or numbered lists) only when it genuinely makes things \
clearer - otherwise, just talk normally.

If something's unclear, ask follow-up questions in a friendly way. Share your knowledge with \
enthusiasm, adapt to the user's level of expertise, and make complex topics feel accessible. \
When giving instructions, guide them step-by-step like you're helping a friend.

Be helpful, accurate, and thoughtful - but most importantly, be genuinely friendly and easy \
to talk to."
        .to_string()
}

impl Default for Settings {
    fn default() -> Self {
        let model = ModelConfig::default();
        let generation = GenerationConfig::default();
        Self {
            model_path: model.model_path,
            context_size: model.context_size,
            threads: 0,
            threads_batch: 0,
            batch_size: model.batch_size,
            gpu_layers: model.gpu_layers,
            max_tokens: generation.max_new_tokens,
            temperature: generation.temperature,
            top_p: generation.top_p,
            top_k: generation.top_k,
            repeat_penalty: generation.repeat_penalty,
            seed: generation.seed,
            stop_sequences: generation.stop_sequences,
            system_prompt: default_system_prompt(),
            history_dir: PathBuf::from("chat_history"),
        }
    }
}

impl Settings {
    /// Validate settings values
    ///
    /// Ensures all parameters are within acceptable ranges.
    pub fn validate(&mut self) {
        self.temperature = self.temperature.clamp(0.0, 2.0);
        self.top_p = self.top_p.clamp(0.0, 1.0);
        self.repeat_penalty = self.repeat_penalty.clamp(1.0, 2.0);

        if self.top_k == 0 {
            self.top_k = 40;
        }
        self.top_k = self.top_k.min(MAX_TOP_K);
        if self.batch_size == 0 {
            self.batch_size = 512;
        }

        self.context_size = self.context_size.clamp(MIN_CONTEXT_SIZE, MAX_CONTEXT_SIZE);
        self.max_tokens = self.max_tokens.clamp(1, 65536);

        // The response has to fit next to at least some prompt
        if self.max_tokens >= self.context_size {
            tracing::warn!(
                "max_tokens {} does not fit context {}, capping to {}",
                self.max_tokens,
                self.context_size,
                self.context_size / 2
            );
            self.max_tokens = self.context_size / 2;
        }

        self.stop_sequences.retain(|s| !s.is_empty());

        if self.system_prompt.trim().is_empty() {
            self.system_prompt = default_system_prompt();
        }
    }

    /// Generation threads, resolving 0 to the number of available cores
    pub fn effective_threads(&self) -> i32 {
        let threads = if self.threads == 0 {
            std::thread::available_parallelism()
                .map(|n| n.get() as u32)
                .unwrap_or(4)
        } else {
            self.threads
        };
        threads.min(i32::MAX as u32) as i32
    }

    pub fn model_config(&self) -> ModelConfig {
        let threads = self.effective_threads();
        let threads_batch = if self.threads_batch == 0 {
            threads
        } else {
            self.threads_batch.min(i32::MAX as u32) as i32
        };

        ModelConfig {
            model_path: self.model_path.clone(),
            context_size: self.context_size,
            threads,
            threads_batch,
            batch_size: self.batch_size,
            gpu_layers: self.gpu_layers,
        }
    }

    pub fn generation_config(&self) -> GenerationConfig {
        GenerationConfig {
            max_new_tokens: self.max_tokens,
            temperature: self.temperature,
            top_p: self.top_p,
            top_k: self.top_k,
            repeat_penalty: self.repeat_penalty,
            stop_sequences: self.stop_sequences.clone(),
            seed: self.seed,
        }
    }
}

/// Get the default settings file path
pub fn get_settings_path() -> Result<PathBuf, StorageError> {
    Ok(get_data_dir()?.join("settings.json"))
}

/// Load settings from `path`, or from the default location
///
/// Returns default settings if the file doesn't exist or is corrupted
pub fn load_settings(path: Option<&Path>) -> Settings {
    let resolved = match path {
        Some(p) => Ok(p.to_path_buf()),
        None => get_settings_path(),
    };

    match resolved.and_then(|p| load_settings_internal(&p)) {
        Ok(settings) => settings,
        Err(e) => {
            tracing::warn!("Failed to load settings, using defaults: {}", e);
            let mut settings = Settings::default();
            settings.validate();
            settings
        }
    }
}

/// Internal settings loading with error propagation
fn load_settings_internal(path: &Path) -> Result<Settings, StorageError> {
    if !path.exists() {
        tracing::info!("Settings file not found at {}, using defaults", path.display());
        let mut settings = Settings::default();
        settings.validate();
        return Ok(settings);
    }

    let json = fs::read_to_string(path)?;
    let mut settings: Settings = serde_json::from_str(&json)?;

    // Validate loaded settings
    settings.validate();

    tracing::debug!("Loaded settings from {}", path.display());
    Ok(settings)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_default_settings() {
        let settings = Settings::default();
        assert_eq!(settings.temperature, 0.8);
        assert_eq!(settings.top_p, 0.92);
        assert_eq!(settings.top_k, 40);
        assert_eq!(settings.max_tokens, 2048);
        assert_eq!(settings.history_dir, PathBuf::from("chat_history"));
    }

    #[test]
    fn test_settings_validation() {
        let mut settings = Settings::default();

        // Test temperature clamping
        settings.temperature = 5.0;
        settings.validate();
        assert_eq!(settings.temperature, 2.0);

        settings.temperature = -1.0;
        settings.validate();
        assert_eq!(settings.temperature, 0.0);

        // Test top_p clamping
        settings.top_p = 2.0;
        settings.validate();
        assert_eq!(settings.top_p, 1.0);

        // Test context bounds
        settings.context_size = 16;
        settings.validate();
        assert_eq!(settings.context_size, MIN_CONTEXT_SIZE);

        // Test top_k bounds
        settings.top_k = u32::MAX;
        settings.validate();
        assert_eq!(settings.top_k, MAX_TOP_K);

        // Test empty system prompt
        settings.system_prompt = "   ".to_string();
        settings.validate();
        assert_eq!(settings.system_prompt, default_system_prompt());
    }

    #[test]
    fn test_max_tokens_capped_to_context() {
        let mut settings = Settings::default();
        settings.context_size = 2048;
        settings.max_tokens = 4096;
        settings.validate();
        assert_eq!(settings.max_tokens, 1024);
    }

    #[test]
    fn test_projections() {
        let mut settings = Settings::default();
        settings.threads = 6;
        settings.gpu_layers = 33;
        settings.stop_sequences = vec!["<|eot_id|>".to_string(), String::new()];
        settings.validate();

        let model = settings.model_config();
        assert_eq!(model.threads, 6);
        assert_eq!(model.threads_batch, 6);
        assert_eq!(model.gpu_layers, 33);

        let generation = settings.generation_config();
        assert_eq!(generation.max_new_tokens, settings.max_tokens);
        assert_eq!(generation.stop_sequences, vec!["<|eot_id|>".to_string()]);
    }

    #[test]
    fn test_auto_threads_is_positive() {
        let settings = Settings::default();
        assert!(settings.effective_threads() > 0);
    }

    #[test]
    fn test_settings_persistence() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("settings.json");

        let mut settings = Settings::default();
        settings.context_size = 4096;
        settings.temperature = 0.3;
        fs::write(&path, serde_json::to_string_pretty(&settings).unwrap()).unwrap();

        let loaded = load_settings(Some(&path));
        assert_eq!(loaded.context_size, 4096);
        assert_eq!(loaded.temperature, 0.3);
    }

    #[test]
    fn test_partial_file_uses_defaults_for_missing_fields() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("settings.json");
        fs::write(&path, r#"{"gpu_layers": 33}"#).unwrap();

        let loaded = load_settings(Some(&path));
        assert_eq!(loaded.gpu_layers, 33);
        assert_eq!(loaded.top_k, 40);
    }

    #[test]
    fn test_corrupt_file_falls_back_to_defaults() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("settings.json");
        fs::write(&path, "not json at all").unwrap();

        let loaded = load_settings(Some(&path));
        assert_eq!(loaded.context_size, Settings::default().context_size);
    }
}
