//! Incremental-decode generation loop.
//!
//! [`Generation`] yields the whole decoded reply after every new token rather than the
//! token's own text: a character spread over several tokens only shows up once all of
//! them have arrived.

use crate::error::{ChatError, Result};
use crate::model::{LlmBackend, LogitsSession, TokenId};
use rand::rngs::StdRng;
use rand::SeedableRng;

pub mod sampling;

use sampling::LogitsProcessor;

#[derive(Clone, Debug)]
pub struct GenerationParams {
    /// Cap on prompt + generated tokens.
    pub max_length: usize,
    pub top_p: f32,
    pub temperature: f32,
    pub repetition_penalty: f32,
    pub do_sample: bool,
    /// Stops generation in addition to the backend's own end token.
    pub eos_token_id: Option<TokenId>,
    pub seed: Option<u64>,
}

impl Default for GenerationParams {
    fn default() -> Self {
        Self {
            max_length: 2048,
            top_p: 0.9,
            temperature: 0.4,
            repetition_penalty: 1.1,
            do_sample: true,
            eos_token_id: None,
            seed: None,
        }
    }
}

impl GenerationParams {
    /// Token cap for one turn: `max_length`, further bounded by the backend's context.
    pub fn length_limit(&self, context_len: Option<usize>) -> usize {
        match context_len {
            Some(ctx) => self.max_length.min(ctx),
            None => self.max_length,
        }
    }

    /// Whether tokens are drawn at random. A non-positive temperature means greedy.
    pub fn samples(&self) -> bool {
        self.do_sample && self.temperature > 0.0
    }
}

pub struct Generation<'a, B: LlmBackend + ?Sized> {
    backend: &'a B,
    session: Box<dyn LogitsSession + 'a>,
    processors: Vec<Box<dyn LogitsProcessor>>,
    do_sample: bool,
    rng: StdRng,
    extra_end: Option<TokenId>,
    tokens: Vec<TokenId>,
    prompt_len: usize,
    max_length: usize,
    done: bool,
}

impl<'a, B: LlmBackend + ?Sized> Generation<'a, B> {
    pub fn start(backend: &'a B, prompt: &str, params: &GenerationParams) -> Result<Self> {
        let tokens = backend.tokenize(prompt)?;
        let max_length = params.length_limit(backend.context_len());
        if tokens.len() >= max_length {
            return Err(ChatError::PromptTooLong { prompt: tokens.len(), limit: max_length });
        }

        let session = backend.start(&tokens)?;
        let rng = match params.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        tracing::debug!(prompt_tokens = tokens.len(), max_length, "generation started");

        Ok(Self {
            backend,
            session,
            processors: sampling::processors(
                params.repetition_penalty,
                params.temperature,
                params.top_p,
                params.samples(),
            ),
            do_sample: params.samples(),
            rng,
            extra_end: params.eos_token_id,
            prompt_len: tokens.len(),
            tokens,
            max_length,
            done: false,
        })
    }

    /// Tokens generated so far, end token included if one was produced.
    pub fn generated(&self) -> &[TokenId] {
        &self.tokens[self.prompt_len..]
    }

    fn step(&mut self) -> Result<String> {
        let mut logits = self.session.logits()?;
        for p in &self.processors {
            p.process(&self.tokens, &mut logits);
        }
        let next = if self.do_sample {
            sampling::sample(&logits, &mut self.rng)?
        } else {
            sampling::argmax(&logits)
        };
        self.tokens.push(next);

        let ended = self.backend.is_end_token(next) || self.extra_end == Some(next);
        if ended || self.tokens.len() >= self.max_length {
            self.done = true;
        } else {
            self.session.feed(next)?;
        }

        let mut generated = &self.tokens[self.prompt_len..];
        if ended {
            generated = &generated[..generated.len() - 1];
        }
        Ok(self.backend.decode(generated)?)
    }
}

impl<B: LlmBackend + ?Sized> Iterator for Generation<'_, B> {
    type Item = Result<String>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        let item = self.step();
        if item.is_err() {
            self.done = true;
        }
        Some(item)
    }
}
