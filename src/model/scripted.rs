use super::{decode_utf8_prefix, LlmBackend, LogitsSession, TokenId};
use anyhow::{bail, Result};

const BYTE_VOCAB: usize = 256;
const EOS: TokenId = BYTE_VOCAB as TokenId;
// Large enough to survive repetition penalty and low temperatures.
const SCRIPT_LOGIT: f32 = 30.0;

/// Deterministic stand-in model. Tokens are raw bytes plus one end token, and every
/// session "predicts" the same scripted reply byte by byte, so multi-byte characters
/// take several tokens to become decodable, exactly like a real BPE vocabulary.
#[derive(Clone, Debug)]
pub struct ScriptedBackend {
    reply: String,
    fail_after: Option<usize>,
    context_len: Option<usize>,
}

pub const DEFAULT_REPLY: &str =
    "This is the scripted backend. Start the server with MODEL_PATH set to chat with a real model.";

impl ScriptedBackend {
    pub fn new(reply: impl Into<String>) -> Self {
        Self { reply: reply.into(), fail_after: None, context_len: None }
    }

    /// Sessions error out after `steps` logits calls.
    pub fn failing_after(mut self, steps: usize) -> Self {
        self.fail_after = Some(steps);
        self
    }

    /// Reports a bounded context, like a llama context of `n_ctx` tokens.
    pub fn with_context_len(mut self, tokens: usize) -> Self {
        self.context_len = Some(tokens);
        self
    }
}

impl Default for ScriptedBackend {
    fn default() -> Self {
        Self::new(DEFAULT_REPLY)
    }
}

impl LlmBackend for ScriptedBackend {
    fn tokenize(&self, text: &str) -> Result<Vec<TokenId>> {
        Ok(text.bytes().map(TokenId::from).collect())
    }

    fn decode(&self, tokens: &[TokenId]) -> Result<String> {
        let bytes: Vec<u8> = tokens
            .iter()
            .filter_map(|&t| u8::try_from(t).ok())
            .collect();
        Ok(decode_utf8_prefix(&bytes))
    }

    fn eos_token(&self) -> TokenId {
        EOS
    }

    fn context_len(&self) -> Option<usize> {
        self.context_len
    }

    fn start<'a>(&'a self, _prompt: &[TokenId]) -> Result<Box<dyn LogitsSession + 'a>> {
        Ok(Box::new(ScriptedSession {
            script: self.reply.as_bytes(),
            pos: 0,
            steps: 0,
            fail_after: self.fail_after,
        }))
    }
}

struct ScriptedSession<'a> {
    script: &'a [u8],
    pos: usize,
    steps: usize,
    fail_after: Option<usize>,
}

impl LogitsSession for ScriptedSession<'_> {
    fn logits(&mut self) -> Result<Vec<f32>> {
        if self.fail_after.is_some_and(|n| self.steps >= n) {
            bail!("scripted failure after {} steps", self.steps);
        }
        self.steps += 1;
        let target = self
            .script
            .get(self.pos)
            .map_or(EOS, |&b| TokenId::from(b));
        let mut logits = vec![0.0; BYTE_VOCAB + 1];
        logits[target as usize] = SCRIPT_LOGIT;
        Ok(logits)
    }

    fn feed(&mut self, _token: TokenId) -> Result<()> {
        self.pos += 1;
        Ok(())
    }
}
