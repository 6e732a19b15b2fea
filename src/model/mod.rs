use anyhow::Result;

pub type TokenId = u32;

/// The language model the server wraps.
///
/// Tokenization and decoding are cheap and stateless; [`LlmBackend::start`] evaluates a
/// prompt and hands back a session that produces next-token logits one step at a time.
pub trait LlmBackend: Send + Sync + 'static {
    fn tokenize(&self, text: &str) -> Result<Vec<TokenId>>;

    /// Text for `tokens`. An incomplete UTF-8 sequence at the end is withheld.
    fn decode(&self, tokens: &[TokenId]) -> Result<String>;

    fn eos_token(&self) -> TokenId;

    /// True for any token that ends a reply. Backends with several end-of-generation
    /// tokens (EOT, chat-markup closers) override this.
    fn is_end_token(&self, token: TokenId) -> bool {
        token == self.eos_token()
    }

    /// Total tokens (prompt + generated) one session can hold, if the backend is bounded.
    fn context_len(&self) -> Option<usize> {
        None
    }

    fn start<'a>(&'a self, prompt: &[TokenId]) -> Result<Box<dyn LogitsSession + 'a>>;
}

pub trait LogitsSession {
    /// Logits for the position after everything evaluated so far.
    fn logits(&mut self) -> Result<Vec<f32>>;

    /// Evaluate one more token.
    fn feed(&mut self, token: TokenId) -> Result<()>;
}

/// Decode UTF-8 bytes, keeping back a trailing partial character.
pub(crate) fn decode_utf8_prefix(bytes: &[u8]) -> String {
    let mut decoder = encoding_rs::UTF_8.new_decoder_without_bom_handling();
    let cap = decoder
        .max_utf8_buffer_length(bytes.len())
        .unwrap_or(bytes.len() * 3 + 4);
    let mut out = String::with_capacity(cap);
    let _ = decoder.decode_to_string(bytes, &mut out, false);
    out
}

#[cfg(feature = "llama")]
pub mod llama;
pub mod scripted;
