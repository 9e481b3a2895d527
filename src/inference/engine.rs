//! llama.cpp backed inference engine
//!
//! The model is loaded once at startup. Each generation runs on its own
//! worker thread with a fresh context and streams tokens back over a channel.

use encoding_rs::Decoder;
use llama_cpp_2::context::params::LlamaContextParams;
use llama_cpp_2::context::LlamaContext;
use llama_cpp_2::llama_backend::LlamaBackend;
use llama_cpp_2::llama_batch::LlamaBatch;
use llama_cpp_2::model::params::LlamaModelParams;
use llama_cpp_2::model::{AddBos, LlamaModel, Special};
use llama_cpp_2::sampling::LlamaSampler;
use llama_cpp_2::token::LlamaToken;
use std::num::NonZeroU32;
use std::path::PathBuf;
use std::sync::mpsc::{self, Sender};
use std::sync::Arc;
use thiserror::Error;

use crate::inference::streaming::{FragmentStream, StopMatcher, StreamToken};
use crate::inference::template::{fit_to_budget, PromptMessage};
use crate::inference::{CancelFlag, InferenceBackend, InferenceError};
use crate::types::config::{GenerationConfig, ModelConfig};
use crate::types::model::ModelInfo;

/// Tokens considered by the repetition penalty
const PENALTY_LAST_N: i32 = 64;

/// Fatal startup failures: the chat cannot run without a model
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("Failed to initialize llama.cpp backend: {0}")]
    BackendInit(String),
    #[error("Model file not found: {}", .0.display())]
    ModelNotFound(PathBuf),
    #[error("Failed to load model {}: {reason}", .path.display())]
    ModelLoad { path: PathBuf, reason: String },
}

/// Route llama.cpp's own logging through `tracing`
pub fn route_llama_logs(enabled: bool) {
    llama_cpp_2::send_logs_to_tracing(llama_cpp_2::LogOptions::default().with_logs_enabled(enabled));
}

/// A loaded GGUF model ready to generate
pub struct LlamaEngine {
    backend: Arc<LlamaBackend>,
    model: Arc<LlamaModel>,
    config: ModelConfig,
    info: ModelInfo,
}

impl LlamaEngine {
    /// Initialize the backend and load the model described by `config`
    pub fn load(config: &ModelConfig) -> Result<Self, EngineError> {
        if !config.model_path.is_file() {
            return Err(EngineError::ModelNotFound(config.model_path.clone()));
        }

        let backend = LlamaBackend::init().map_err(|e| EngineError::BackendInit(e.to_string()))?;

        let model_params = LlamaModelParams::default().with_n_gpu_layers(config.gpu_layers);

        tracing::info!(
            "Loading model {} (gpu layers: {})",
            config.model_path.display(),
            config.gpu_layers
        );
        let model = LlamaModel::load_from_file(&backend, &config.model_path, &model_params)
            .map_err(|e| EngineError::ModelLoad {
                path: config.model_path.clone(),
                reason: e.to_string(),
            })?;

        let info = ModelInfo::from_path(&config.model_path, config.context_size, Some(model.n_layer()));
        tracing::info!("Model loaded: {} ({:.1} GB)", info.name, info.size_gb());

        Ok(Self {
            backend: Arc::new(backend),
            model: Arc::new(model),
            config: config.clone(),
            info,
        })
    }

    pub fn info(&self) -> &ModelInfo {
        &self.info
    }
}

impl InferenceBackend for LlamaEngine {
    fn stream_generate(
        &self,
        prompt: &[PromptMessage],
        config: &GenerationConfig,
        cancel: CancelFlag,
    ) -> Result<FragmentStream, InferenceError> {
        let (tx, rx) = mpsc::channel();

        let job = GenerationJob {
            backend: Arc::clone(&self.backend),
            model: Arc::clone(&self.model),
            model_config: self.config.clone(),
            generation: config.clone(),
            messages: prompt.to_vec(),
            cancel,
        };

        std::thread::Builder::new()
            .name("lochat-inference".to_string())
            .spawn(move || {
                let final_token = match job.run(&tx) {
                    Ok(()) => StreamToken::Done,
                    Err(e) => {
                        tracing::warn!("Generation failed: {}", e);
                        StreamToken::Error(e)
                    }
                };
                // The session may have stopped listening
                let _ = tx.send(final_token);
            })
            .map_err(|e| InferenceError::Runtime(format!("Failed to start inference worker: {e}")))?;

        Ok(FragmentStream::new(rx))
    }

    fn context_length(&self) -> u32 {
        self.config.context_size
    }
}

/// Everything the worker thread needs for one generation
struct GenerationJob {
    backend: Arc<LlamaBackend>,
    model: Arc<LlamaModel>,
    model_config: ModelConfig,
    generation: GenerationConfig,
    messages: Vec<PromptMessage>,
    cancel: CancelFlag,
}

impl GenerationJob {
    fn run(&self, tx: &Sender<StreamToken>) -> Result<(), InferenceError> {
        let ctx_params = LlamaContextParams::default()
            .with_n_ctx(NonZeroU32::new(self.model_config.context_size))
            .with_n_batch(self.model_config.batch_size)
            .with_n_threads(self.model_config.threads)
            .with_n_threads_batch(self.model_config.threads_batch);

        let mut ctx = self
            .model
            .new_context(&self.backend, ctx_params)
            .map_err(|e| InferenceError::ContextCreate(e.to_string()))?;

        let n_ctx = ctx.n_ctx();
        let budget = (n_ctx as usize).saturating_sub(self.generation.max_new_tokens as usize);
        let fitted = fit_to_budget(self.messages.clone(), budget, |text| {
            self.model.str_to_token(text, AddBos::Never)
        })
        .map_err(|e| InferenceError::Tokenize(e.to_string()))?;
        if fitted.dropped > 0 {
            tracing::info!(
                "Dropped {} more old messages to fit {} prompt tokens",
                fitted.dropped,
                budget
            );
        }

        let tokens = fitted.tokens;
        if tokens.is_empty() {
            return Err(InferenceError::Tokenize("prompt produced no tokens".to_string()));
        }
        if tokens.len() + self.generation.max_new_tokens as usize > n_ctx as usize {
            return Err(InferenceError::ContextOverflow {
                prompt_tokens: tokens.len(),
                max_new_tokens: self.generation.max_new_tokens,
                context_size: n_ctx,
            });
        }

        let batch_size = self.model_config.batch_size.max(1) as usize;
        let mut batch = LlamaBatch::new(batch_size, 1);
        self.decode_prompt(&mut ctx, &mut batch, &tokens, batch_size)?;

        let mut sampler = self.sampler();
        let mut decoder = encoding_rs::UTF_8.new_decoder();
        let mut stops = StopMatcher::new(&self.generation.stop_sequences);
        let mut position = tokens.len() as i32;
        let mut generated = 0u32;

        while generated < self.generation.max_new_tokens {
            if self.cancel.is_cancelled() {
                tracing::info!("Generation cancelled after {} tokens", generated);
                break;
            }

            let token = sampler.sample(&ctx, batch.n_tokens() - 1);
            if self.model.is_eog_token(token) {
                break;
            }

            let bytes = self
                .model
                .token_to_bytes(token, Special::Tokenize)
                .map_err(|e| InferenceError::Decode(e.to_string()))?;
            let visible = stops.push(&decode_piece(&mut decoder, &bytes, false));
            if !visible.is_empty() && tx.send(StreamToken::Token(visible)).is_err() {
                tracing::debug!("Fragment receiver dropped, stopping generation");
                return Ok(());
            }
            if stops.is_stopped() {
                break;
            }

            self.feed(&mut ctx, &mut batch, token, position)?;
            position += 1;
            generated += 1;
        }

        let tail = stops.push(&decode_piece(&mut decoder, &[], true));
        let tail = tail + &stops.finish();
        if !tail.is_empty() {
            let _ = tx.send(StreamToken::Token(tail));
        }

        tracing::debug!("Generated {} tokens", generated);
        Ok(())
    }

    fn decode_prompt(
        &self,
        ctx: &mut LlamaContext<'_>,
        batch: &mut LlamaBatch,
        tokens: &[LlamaToken],
        batch_size: usize,
    ) -> Result<(), InferenceError> {
        let last_index = tokens.len() - 1;
        for (chunk_index, chunk) in tokens.chunks(batch_size).enumerate() {
            batch.clear();
            for (offset, token) in chunk.iter().enumerate() {
                let pos = chunk_index * batch_size + offset;
                // Logits are only needed for the final prompt token
                batch
                    .add(*token, pos as i32, &[0], pos == last_index)
                    .map_err(|e| InferenceError::Decode(e.to_string()))?;
            }
            ctx.decode(batch)
                .map_err(|e| InferenceError::Decode(e.to_string()))?;
        }
        Ok(())
    }

    fn feed(
        &self,
        ctx: &mut LlamaContext<'_>,
        batch: &mut LlamaBatch,
        token: LlamaToken,
        position: i32,
    ) -> Result<(), InferenceError> {
        batch.clear();
        batch
            .add(token, position, &[0], true)
            .map_err(|e| InferenceError::Decode(e.to_string()))?;
        ctx.decode(batch)
            .map_err(|e| InferenceError::Decode(e.to_string()))
    }

    fn sampler(&self) -> LlamaSampler {
        let g = &self.generation;
        if g.temperature <= 0.0 {
            return LlamaSampler::chain_simple([
                LlamaSampler::penalties(PENALTY_LAST_N, g.repeat_penalty, 0.0, 0.0),
                LlamaSampler::greedy(),
            ]);
        }
        LlamaSampler::chain_simple([
            LlamaSampler::penalties(PENALTY_LAST_N, g.repeat_penalty, 0.0, 0.0),
            LlamaSampler::top_k(i32::try_from(g.top_k).unwrap_or(i32::MAX)),
            LlamaSampler::top_p(g.top_p, 1),
            LlamaSampler::temp(g.temperature),
            LlamaSampler::dist(g.seed),
        ])
    }
}

/// Decode token bytes as UTF-8, carrying incomplete sequences to the next call
fn decode_piece(decoder: &mut Decoder, bytes: &[u8], last: bool) -> String {
    let capacity = decoder
        .max_utf8_buffer_length(bytes.len())
        .unwrap_or(bytes.len() * 3 + 4);
    let mut out = String::with_capacity(capacity);
    let _ = decoder.decode_to_string(bytes, &mut out, last);
    out
}
