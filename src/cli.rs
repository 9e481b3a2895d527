//! Command-line flags
//!
//! Startup options only; every flag overrides the matching settings value.

use clap::Parser;
use std::path::PathBuf;

use crate::storage::settings::Settings;

#[derive(Parser, Debug, Clone, Default)]
#[command(name = "lochat", version, about = "Chat with a local GGUF model in your terminal")]
pub struct Args {
    /// Path to the GGUF model file
    #[arg(short, long)]
    pub model: Option<PathBuf>,

    /// Size of the prompt context in tokens
    #[arg(short = 'c', long)]
    pub ctx_size: Option<u32>,

    /// Threads used during generation (default: all available cores)
    #[arg(short, long)]
    pub threads: Option<u32>,

    /// How many layers to offload to the GPU (0 = CPU only)
    #[arg(short, long)]
    pub gpu_layers: Option<u32>,

    /// Maximum tokens per reply
    #[arg(long)]
    pub max_tokens: Option<u32>,

    /// Sampling temperature
    #[arg(long)]
    pub temperature: Option<f32>,

    /// Directory where saved chats are stored
    #[arg(long)]
    pub history_dir: Option<PathBuf>,

    /// Settings file to use instead of the default location
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Log progress and llama.cpp output to stderr
    #[arg(short, long)]
    pub verbose: bool,
}

impl Args {
    /// Apply flag overrides on top of loaded settings, then re-validate
    pub fn apply(&self, settings: &mut Settings) {
        if let Some(model) = &self.model {
            settings.model_path = model.clone();
        }
        if let Some(ctx) = self.ctx_size {
            settings.context_size = ctx;
        }
        if let Some(threads) = self.threads {
            settings.threads = threads;
        }
        if let Some(layers) = self.gpu_layers {
            settings.gpu_layers = layers;
        }
        if let Some(max_tokens) = self.max_tokens {
            settings.max_tokens = max_tokens;
        }
        if let Some(temperature) = self.temperature {
            settings.temperature = temperature;
        }
        if let Some(dir) = &self.history_dir {
            settings.history_dir = dir.clone();
        }
        settings.validate();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_valid() {
        Args::command().debug_assert();
    }

    #[test]
    fn test_flags_override_settings() {
        let args = Args::parse_from([
            "lochat",
            "--model",
            "other.gguf",
            "-c",
            "4096",
            "--gpu-layers",
            "33",
            "--temperature",
            "9",
            "--history-dir",
            "/tmp/chats",
        ]);
        let mut settings = Settings::default();
        args.apply(&mut settings);

        assert_eq!(settings.model_path, PathBuf::from("other.gguf"));
        assert_eq!(settings.context_size, 4096);
        assert_eq!(settings.gpu_layers, 33);
        assert_eq!(settings.temperature, 2.0);
        assert_eq!(settings.history_dir, PathBuf::from("/tmp/chats"));
    }

    #[test]
    fn test_no_flags_keeps_settings() {
        let args = Args::parse_from(["lochat"]);
        let mut settings = Settings::default();
        settings.gpu_layers = 12;
        args.apply(&mut settings);
        assert_eq!(settings.gpu_layers, 12);
        assert!(!args.verbose);
    }
}
