//! Inference capability consumed by the chat engine.
//!
//! The controller only talks to [`InferenceBackend`]; the llama.cpp
//! implementation lives behind the `llama` feature and a deterministic
//! scripted backend is always available for tests and mock serving.

use std::sync::MutexGuard;

use crate::error::ChatError;

#[cfg(feature = "llama")]
mod llama;
pub mod mock;
#[cfg(feature = "llama")]
mod sampler;

#[cfg(feature = "llama")]
pub use llama::LlamaInference;
pub use mock::ScriptedInference;

/// Vocabulary index as the backend reports it.
pub type TokenId = i32;

/// Lazy sequence of sampled token ids for one generation call.
///
/// Pulling advances the sampler; dropping the stream releases the backend.
pub type TokenStream<'a> = Box<dyn Iterator<Item = Result<TokenId, ChatError>> + 'a>;

/// Token stream that owns the backend's exclusivity lock.
///
/// Field order matters: `inner` (and whatever per-call state it owns) is
/// dropped before the lock is released.
pub(crate) struct Exclusive<'a, T> {
    inner: T,
    _guard: MutexGuard<'a, ()>,
}

impl<'a, T> Exclusive<'a, T> {
    pub(crate) fn new(guard: MutexGuard<'a, ()>, inner: T) -> Self {
        Self {
            inner,
            _guard: guard,
        }
    }
}

impl<T: Iterator> Iterator for Exclusive<'_, T> {
    type Item = T::Item;

    fn next(&mut self) -> Option<Self::Item> {
        self.inner.next()
    }
}

/// Seed llama.cpp interprets as "pick one at random".
pub const RANDOM_SEED: u32 = u32::MAX;

/// Sampling parameters passed to the backend for a single stream.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SamplingParams {
    pub temperature: f32,
    pub top_p: f32,
    pub top_k: u32,
    pub seed: u32,
}

impl Default for SamplingParams {
    fn default() -> Self {
        Self {
            temperature: 1.0,
            top_p: 0.95,
            top_k: 50,
            seed: RANDOM_SEED,
        }
    }
}

/// Tokenizer plus token-by-token sampler.
///
/// Implementations must allow at most one live [`TokenStream`] at a time.
pub trait InferenceBackend: Send + Sync {
    /// Encode `text` the way generation will see it.
    fn tokenize(&self, text: &str) -> Result<Vec<TokenId>, ChatError>;

    fn count_tokens(&self, text: &str) -> Result<usize, ChatError> {
        Ok(self.tokenize(text)?.len())
    }

    /// Evaluate `prompt` and return the sampler stream. The end-of-sequence
    /// token is yielded like any other; the stream ends after it.
    fn sample_stream<'a>(
        &'a self,
        prompt: &[TokenId],
        params: &SamplingParams,
    ) -> Result<TokenStream<'a>, ChatError>;

    /// Raw bytes for `tokens`. A single token may carry part of a UTF-8 character.
    fn detokenize(&self, tokens: &[TokenId]) -> Result<Vec<u8>, ChatError>;

    fn eos_token(&self) -> TokenId;

    fn is_end_of_sequence(&self, token: TokenId) -> bool {
        token == self.eos_token()
    }

    /// Short human-readable description for health checks and logs.
    fn describe(&self) -> String;
}
