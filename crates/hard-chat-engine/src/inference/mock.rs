// Deterministic byte-level backend standing in for a real model.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use super::{Exclusive, InferenceBackend, SamplingParams, TokenId, TokenStream};
use crate::error::ChatError;

const BOS: TokenId = 1;
const EOS: TokenId = 2;
const BYTE_OFFSET: TokenId = 3;

/// Backend that tokenizes one byte per token and always "samples" a fixed reply.
///
/// Multi-byte characters in the reply are split across tokens, so callers see
/// the same partial-UTF-8 pieces a real vocabulary produces.
#[derive(Debug, Default)]
pub struct ScriptedInference {
    reply: Vec<u8>,
    fail_after: Option<usize>,
    busy: Mutex<()>,
    tokenize_calls: AtomicUsize,
    stream_calls: AtomicUsize,
}

impl ScriptedInference {
    pub fn new(reply: impl Into<String>) -> Self {
        Self {
            reply: reply.into().into_bytes(),
            ..Self::default()
        }
    }

    /// Reply given as raw bytes, which need not be valid UTF-8.
    pub fn from_bytes(reply: Vec<u8>) -> Self {
        Self {
            reply,
            ..Self::default()
        }
    }

    /// Backend whose first sampled token is end-of-sequence.
    pub fn silent() -> Self {
        Self::default()
    }

    /// Yield `tokens` reply tokens, then fail the stream.
    #[must_use]
    pub fn failing_after(mut self, tokens: usize) -> Self {
        self.fail_after = Some(tokens);
        self
    }

    pub fn tokenize_calls(&self) -> usize {
        self.tokenize_calls.load(Ordering::SeqCst)
    }

    pub fn stream_calls(&self) -> usize {
        self.stream_calls.load(Ordering::SeqCst)
    }

    /// True while a sampler stream holds the backend.
    pub fn is_streaming(&self) -> bool {
        self.busy.try_lock().is_err()
    }
}

impl InferenceBackend for ScriptedInference {
    fn tokenize(&self, text: &str) -> Result<Vec<TokenId>, ChatError> {
        self.tokenize_calls.fetch_add(1, Ordering::SeqCst);
        let mut tokens = Vec::with_capacity(text.len() + 1);
        tokens.push(BOS);
        tokens.extend(text.bytes().map(|b| TokenId::from(b) + BYTE_OFFSET));
        Ok(tokens)
    }

    fn sample_stream<'a>(
        &'a self,
        prompt: &[TokenId],
        _params: &SamplingParams,
    ) -> Result<TokenStream<'a>, ChatError> {
        self.stream_calls.fetch_add(1, Ordering::SeqCst);
        if prompt.is_empty() {
            return Err(ChatError::Inference("empty prompt".to_string()));
        }
        let guard = self.busy.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        let tokens: Vec<TokenId> = self
            .reply
            .iter()
            .map(|&b| TokenId::from(b) + BYTE_OFFSET)
            .collect();
        let stream = ScriptedStream {
            tokens: tokens.into_iter(),
            fail_after: self.fail_after,
            produced: 0,
            done: false,
        };
        Ok(Box::new(Exclusive::new(guard, stream)))
    }

    fn detokenize(&self, tokens: &[TokenId]) -> Result<Vec<u8>, ChatError> {
        tokens
            .iter()
            .filter(|&&t| t != BOS && t != EOS)
            .map(|&t| {
                u8::try_from(t - BYTE_OFFSET)
                    .map_err(|_| ChatError::Tokenization(format!("unknown token id {t}")))
            })
            .collect()
    }

    fn eos_token(&self) -> TokenId {
        EOS
    }

    fn describe(&self) -> String {
        format!("scripted ({} byte reply)", self.reply.len())
    }
}

struct ScriptedStream {
    tokens: std::vec::IntoIter<TokenId>,
    fail_after: Option<usize>,
    produced: usize,
    done: bool,
}

impl Iterator for ScriptedStream {
    type Item = Result<TokenId, ChatError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        if self.fail_after == Some(self.produced) {
            self.done = true;
            return Some(Err(ChatError::Inference(
                "scripted failure after sampling".to_string(),
            )));
        }
        match self.tokens.next() {
            Some(token) => {
                self.produced += 1;
                Some(Ok(token))
            }
            None => {
                self.done = true;
                Some(Ok(EOS))
            }
        }
    }
}
