//! LLM inference engine
//!
//! This module handles all interaction with llama-cpp for model loading and
//! inference. The session only sees the [`InferenceBackend`] trait.

pub mod engine;
pub mod streaming;
pub mod template;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use thiserror::Error;

use crate::types::config::GenerationConfig;

// Re-export main types for convenience
pub use engine::{EngineError, LlamaEngine};
pub use streaming::{FragmentStream, StopMatcher, StreamToken};
pub use template::PromptMessage;

/// Failure while generating a response
#[derive(Debug, Clone, PartialEq, Error)]
pub enum InferenceError {
    #[error("Failed to tokenize prompt: {0}")]
    Tokenize(String),
    #[error("Prompt of {prompt_tokens} tokens plus {max_new_tokens} new tokens exceeds the {context_size}-token context window")]
    ContextOverflow {
        prompt_tokens: usize,
        max_new_tokens: u32,
        context_size: u32,
    },
    #[error("Failed to create inference context: {0}")]
    ContextCreate(String),
    #[error("Decoding failed: {0}")]
    Decode(String),
    #[error("{0}")]
    Runtime(String),
    #[error("Inference worker stopped unexpectedly")]
    WorkerDisconnected,
}

/// Shared flag that asks a running generation to stop
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    pub fn reset(&self) {
        self.0.store(false, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

/// Something that turns a prompt into a stream of text fragments
pub trait InferenceBackend {
    /// Start a one-shot generation for `prompt`.
    ///
    /// Errors returned here mean nothing was generated. Errors during
    /// generation arrive through the stream instead.
    fn stream_generate(
        &self,
        prompt: &[PromptMessage],
        config: &GenerationConfig,
        cancel: CancelFlag,
    ) -> Result<FragmentStream, InferenceError>;

    /// Context window size in tokens
    fn context_length(&self) -> u32;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cancel_flag_is_shared() {
        let flag = CancelFlag::new();
        let clone = flag.clone();
        assert!(!flag.is_cancelled());

        clone.cancel();
        assert!(flag.is_cancelled());

        flag.reset();
        assert!(!clone.is_cancelled());
    }
}
