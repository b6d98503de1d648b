use llama_cpp_2::{
    context::{params::LlamaContextParams, LlamaContext},
    llama_backend::LlamaBackend,
    llama_batch::LlamaBatch,
    model::{params::LlamaModelParams, AddBos, LlamaModel, Special},
    sampling::LlamaSampler,
    send_logs_to_tracing,
    token::LlamaToken,
    LogOptions,
};
use std::num::NonZeroU32;
use std::sync::Mutex;
use std::time::Instant;

use super::sampler::create_sampler;
use super::{Exclusive, InferenceBackend, SamplingParams, TokenId, TokenStream};
use crate::error::ChatError;
use crate::settings::ChatSettings;

/// llama.cpp model loaded once at startup.
///
/// Field order matters: the model is dropped before the backend frees
/// llama.cpp's global state.
pub struct LlamaInference {
    model: LlamaModel,
    backend: LlamaBackend,
    context_size: NonZeroU32,
    n_batch: u32,
    /// Held by every live token stream; one generation at a time.
    exclusive: Mutex<()>,
    description: String,
}

impl LlamaInference {
    /// Initialize llama.cpp and load the GGUF model named by `settings`.
    pub fn load(settings: &ChatSettings) -> Result<Self, ChatError> {
        // llama.cpp chatter goes to tracing, which nothing subscribes to.
        send_logs_to_tracing(LogOptions::default());

        let backend = LlamaBackend::init()
            .map_err(|e| ChatError::InferenceUnavailable(format!("Failed to init backend: {e}")))?;

        let model_path = &settings.model_path;
        log::info!(
            "Loading model from {} ({} GPU layers)",
            model_path.display(),
            settings.gpu_layers
        );
        let load_start = Instant::now();
        let model_params = LlamaModelParams::default().with_n_gpu_layers(settings.gpu_layers);
        let model = LlamaModel::load_from_file(&backend, model_path, &model_params).map_err(|e| {
            ChatError::InferenceUnavailable(format!(
                "Failed to load model from {}: {e}",
                model_path.display()
            ))
        })?;
        log::info!(
            "Model loaded in {:.2}s (trained context: {})",
            load_start.elapsed().as_secs_f32(),
            model.n_ctx_train()
        );

        let context_size = NonZeroU32::new(settings.effective_context_size())
            .ok_or_else(|| ChatError::InferenceUnavailable("context size is zero".to_string()))?;
        let description = format!(
            "llama.cpp {} (n_ctx={})",
            model_path.display(),
            context_size
        );

        Ok(Self {
            model,
            backend,
            context_size,
            n_batch: settings.batch_size(),
            exclusive: Mutex::new(()),
            description,
        })
    }

    fn new_context(&self) -> Result<LlamaContext<'_>, ChatError> {
        let ctx_params = LlamaContextParams::default()
            .with_n_ctx(Some(self.context_size))
            .with_n_batch(self.n_batch);
        self.model
            .new_context(&self.backend, ctx_params)
            .map_err(|e| ChatError::Inference(format!("Context creation failed: {e}")))
    }
}

impl InferenceBackend for LlamaInference {
    fn tokenize(&self, text: &str) -> Result<Vec<TokenId>, ChatError> {
        self.model
            .str_to_token(text, AddBos::Always)
            .map(|tokens| tokens.into_iter().map(|t| t.0).collect())
            .map_err(|e| ChatError::Tokenization(e.to_string()))
    }

    fn sample_stream<'a>(
        &'a self,
        prompt: &[TokenId],
        params: &SamplingParams,
    ) -> Result<TokenStream<'a>, ChatError> {
        if prompt.is_empty() {
            return Err(ChatError::Inference("empty prompt".to_string()));
        }
        let n_ctx = self.context_size.get() as usize;
        if prompt.len() >= n_ctx {
            return Err(ChatError::Inference(format!(
                "prompt of {} tokens does not fit context of {n_ctx}",
                prompt.len()
            )));
        }

        let guard = self
            .exclusive
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        let mut context = self.new_context()?;

        // Evaluate the prompt in n_batch chunks; logits only for the last token.
        let batch_cap = self.n_batch.max(1) as usize;
        let mut batch = LlamaBatch::new(batch_cap, 1);
        let eval_start = Instant::now();
        for (chunk_idx, chunk) in prompt.chunks(batch_cap).enumerate() {
            batch.clear();
            for (offset, &token) in chunk.iter().enumerate() {
                let pos = chunk_idx * batch_cap + offset;
                let is_last = pos == prompt.len() - 1;
                batch
                    .add(LlamaToken::new(token), pos as i32, &[0], is_last)
                    .map_err(|e| {
                        ChatError::Inference(format!("Batch add failed at prompt token {pos}: {e}"))
                    })?;
            }
            context
                .decode(&mut batch)
                .map_err(|e| ChatError::Inference(format!("Prompt decode failed: {e}")))?;
        }
        log::debug!(
            "Prompt of {} tokens evaluated in {:.0}ms",
            prompt.len(),
            eval_start.elapsed().as_secs_f64() * 1000.0
        );

        let stream = LlamaTokenStream {
            model: &self.model,
            context,
            sampler: create_sampler(params),
            batch,
            position: prompt.len() as i32,
            n_ctx: n_ctx as i32,
            pending: None,
            finished: false,
        };
        Ok(Box::new(Exclusive::new(guard, stream)))
    }

    fn detokenize(&self, tokens: &[TokenId]) -> Result<Vec<u8>, ChatError> {
        let mut bytes = Vec::new();
        for &token in tokens {
            let piece = self
                .model
                .token_to_bytes(LlamaToken::new(token), Special::Plaintext)
                .map_err(|e| ChatError::Tokenization(format!("Token conversion failed: {e}")))?;
            bytes.extend_from_slice(&piece);
        }
        Ok(bytes)
    }

    fn eos_token(&self) -> TokenId {
        self.model.token_eos().0
    }

    fn is_end_of_sequence(&self, token: TokenId) -> bool {
        self.model.is_eog_token(LlamaToken::new(token))
    }

    fn describe(&self) -> String {
        self.description.clone()
    }
}

/// Token-by-token sampler over a per-call context.
///
/// The previously sampled token is decoded lazily on the next pull, so nothing
/// runs after the consumer stops pulling.
struct LlamaTokenStream<'a> {
    model: &'a LlamaModel,
    context: LlamaContext<'a>,
    sampler: LlamaSampler,
    batch: LlamaBatch,
    position: i32,
    n_ctx: i32,
    pending: Option<LlamaToken>,
    finished: bool,
}

impl LlamaTokenStream<'_> {
    fn feed_pending(&mut self) -> Result<(), ChatError> {
        if let Some(token) = self.pending.take() {
            self.batch.clear();
            self.batch
                .add(token, self.position, &[0], true)
                .map_err(|e| ChatError::Inference(format!("Batch add failed: {e}")))?;
            self.context
                .decode(&mut self.batch)
                .map_err(|e| ChatError::Inference(format!("Decode failed: {e}")))?;
            self.position += 1;
        }
        Ok(())
    }
}

impl Iterator for LlamaTokenStream<'_> {
    type Item = Result<TokenId, ChatError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.finished {
            return None;
        }
        if let Err(e) = self.feed_pending() {
            self.finished = true;
            return Some(Err(e));
        }
        if self.position >= self.n_ctx {
            log::warn!("Context window of {} tokens is full, ending stream", self.n_ctx);
            self.finished = true;
            return None;
        }

        let token = self.sampler.sample(&self.context, -1);
        if self.model.is_eog_token(token) {
            self.finished = true;
        } else {
            self.pending = Some(token);
        }
        Some(Ok(token.0))
    }
}
