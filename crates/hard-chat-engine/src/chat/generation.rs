use std::sync::Arc;

use crate::error::ChatError;
use crate::inference::{InferenceBackend, SamplingParams, TokenStream, RANDOM_SEED};
use crate::types::GenerationConfig;

/// Turns a prompt into a lazy sequence of cumulative decoded text.
#[derive(Clone)]
pub struct GenerationEngine {
    inference: Arc<dyn InferenceBackend>,
}

impl GenerationEngine {
    pub fn new(inference: Arc<dyn InferenceBackend>) -> Self {
        Self { inference }
    }

    pub fn describe(&self) -> String {
        self.inference.describe()
    }

    /// Encode `prompt` and open the sampler.
    ///
    /// Does not enforce `max_new_tokens`; the consumer stops pulling when its
    /// budget is spent.
    pub fn generate(&self, prompt: &str, config: &GenerationConfig) -> Result<Fragments<'_>, ChatError> {
        let tokens = self.inference.tokenize(prompt)?;
        let params = SamplingParams {
            temperature: config.temperature,
            top_p: config.top_p,
            top_k: config.top_k,
            seed: config.seed.unwrap_or(RANDOM_SEED),
        };
        let stream = self.inference.sample_stream(&tokens, &params)?;
        log::debug!("Generation started from {} prompt tokens", tokens.len());
        Ok(Fragments {
            inference: self.inference.as_ref(),
            stream: Some(stream),
            text: String::new(),
            pending: Vec::new(),
        })
    }
}

/// Cumulative text after every sampled token that completes a character.
///
/// Each item extends the previous one. A token carrying only part of a
/// UTF-8 character yields nothing; its bytes are held back until the
/// character completes.
pub struct Fragments<'a> {
    inference: &'a dyn InferenceBackend,
    stream: Option<TokenStream<'a>>,
    text: String,
    pending: Vec<u8>,
}

impl Fragments<'_> {
    fn finish(&mut self) -> Option<Result<String, ChatError>> {
        self.stream = None;
        if self.pending.is_empty() {
            return None;
        }
        self.text.push_str(&String::from_utf8_lossy(&self.pending));
        self.pending.clear();
        Some(Ok(self.text.clone()))
    }

    fn fail(&mut self, e: ChatError) -> Option<Result<String, ChatError>> {
        self.stream = None;
        Some(Err(e))
    }
}

impl Iterator for Fragments<'_> {
    type Item = Result<String, ChatError>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let stream = self.stream.as_mut()?;
            let token = match stream.next() {
                None => return self.finish(),
                Some(Err(e)) => return self.fail(e),
                Some(Ok(token)) => token,
            };
            if self.inference.is_end_of_sequence(token) {
                return self.finish();
            }
            match self.inference.detokenize(&[token]) {
                Ok(bytes) => {
                    self.pending.extend_from_slice(&bytes);
                    drain_utf8(&mut self.pending, &mut self.text);
                    if !self.pending.is_empty() {
                        // Mid-character.
                        continue;
                    }
                    return Some(Ok(self.text.clone()));
                }
                Err(e) => return self.fail(e),
            }
        }
    }
}

/// Move every complete character from `pending` into `out`.
///
/// Invalid sequences become U+FFFD; a truncated sequence at the end stays in
/// `pending`.
fn drain_utf8(pending: &mut Vec<u8>, out: &mut String) {
    let mut consumed = 0;
    loop {
        match std::str::from_utf8(&pending[consumed..]) {
            Ok(s) => {
                out.push_str(s);
                consumed = pending.len();
                break;
            }
            Err(e) => {
                let valid = e.valid_up_to();
                out.push_str(&String::from_utf8_lossy(&pending[consumed..consumed + valid]));
                consumed += valid;
                match e.error_len() {
                    Some(len) => {
                        out.push(char::REPLACEMENT_CHARACTER);
                        consumed += len;
                    }
                    None => break,
                }
            }
        }
    }
    pending.drain(..consumed);
}
