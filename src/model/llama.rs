// llama.cpp backend using `llama-cpp-2` (enabled with feature `llama`).
use super::{decode_utf8_prefix, LlmBackend, LogitsSession, TokenId};
use anyhow::{bail, Context, Result};
use llama_cpp_2::context::params::LlamaContextParams;
use llama_cpp_2::context::LlamaContext;
use llama_cpp_2::llama_backend::LlamaBackend as LLBackend;
use llama_cpp_2::llama_batch::LlamaBatch;
use llama_cpp_2::model::params::LlamaModelParams;
use llama_cpp_2::model::{AddBos, LlamaModel, Special};
use llama_cpp_2::token::LlamaToken;
use llama_cpp_2::{send_logs_to_tracing, LogOptions};
use std::num::NonZeroU32;
use std::path::PathBuf;
use std::sync::Arc;

pub struct Inner {
    backend: LLBackend,
    model: LlamaModel,
    n_ctx: u32,
}

#[derive(Clone)]
pub struct LlamaBackend {
    inner: Arc<Inner>,
}

impl LlamaBackend {
    pub fn new(model_path: PathBuf, n_ctx: u32, n_gpu_layers: u32) -> Result<Self> {
        // route llama.cpp logs to tracing so they appear in server logs when RUST_LOG is set
        send_logs_to_tracing(LogOptions::default());

        let backend = LLBackend::init().context("init llama backend")?;

        let mut model_params = LlamaModelParams::default();
        if n_gpu_layers > 0 {
            model_params = model_params.with_n_gpu_layers(n_gpu_layers);
        }

        let model = LlamaModel::load_from_file(&backend, &model_path, &model_params)
            .with_context(|| format!("load GGUF model {}", model_path.display()))?;
        tracing::info!(path = %model_path.display(), n_ctx, n_gpu_layers, "model loaded");

        Ok(Self {
            inner: Arc::new(Inner { backend, model, n_ctx }),
        })
    }
}

impl LlmBackend for LlamaBackend {
    fn tokenize(&self, text: &str) -> Result<Vec<TokenId>> {
        let tokens = self
            .inner
            .model
            .str_to_token(text, AddBos::Always)
            .context("tokenize prompt")?;
        Ok(tokens.into_iter().map(|t| t.0 as TokenId).collect())
    }

    fn decode(&self, tokens: &[TokenId]) -> Result<String> {
        let mut bytes = Vec::with_capacity(tokens.len() * 4);
        for &t in tokens {
            let piece = self
                .inner
                .model
                .token_to_bytes(LlamaToken::new(t as i32), Special::Tokenize)
                .with_context(|| format!("detokenize {t}"))?;
            bytes.extend_from_slice(&piece);
        }
        Ok(decode_utf8_prefix(&bytes))
    }

    fn eos_token(&self) -> TokenId {
        self.inner.model.token_eos().0 as TokenId
    }

    fn is_end_token(&self, token: TokenId) -> bool {
        self.inner.model.is_eog_token(LlamaToken::new(token as i32))
    }

    fn context_len(&self) -> Option<usize> {
        Some(self.inner.n_ctx as usize)
    }

    fn start<'a>(&'a self, prompt: &[TokenId]) -> Result<Box<dyn LogitsSession + 'a>> {
        if prompt.is_empty() {
            bail!("empty prompt");
        }
        // Fresh context per turn: the prompt is rebuilt every turn anyway.
        let threads = num_cpus::get() as i32;
        let ctx_params = LlamaContextParams::default()
            .with_n_ctx(NonZeroU32::new(self.inner.n_ctx))
            .with_n_threads(threads)
            .with_n_threads_batch(threads);

        let mut ctx = self
            .inner
            .model
            .new_context(&self.inner.backend, ctx_params)
            .context("create llama context")?;

        let mut batch = LlamaBatch::new(prompt.len().max(512), 1);
        let last_index = (prompt.len() - 1) as i32;
        for (i, &token) in (0_i32..).zip(prompt.iter()) {
            batch.add(LlamaToken::new(token as i32), i, &[0], i == last_index)?;
        }
        ctx.decode(&mut batch).context("decode prompt")?;

        Ok(Box::new(LlamaSession {
            ctx,
            batch,
            n_cur: prompt.len() as i32,
        }))
    }
}

struct LlamaSession<'a> {
    ctx: LlamaContext<'a>,
    batch: LlamaBatch,
    n_cur: i32,
}

impl LogitsSession for LlamaSession<'_> {
    fn logits(&mut self) -> Result<Vec<f32>> {
        Ok(self.ctx.get_logits_ith(self.batch.n_tokens() - 1).to_vec())
    }

    fn feed(&mut self, token: TokenId) -> Result<()> {
        self.batch.clear();
        self.batch.add(LlamaToken::new(token as i32), self.n_cur, &[0], true)?;
        self.n_cur += 1;
        self.ctx.decode(&mut self.batch).context("decode step")?;
        Ok(())
    }
}
