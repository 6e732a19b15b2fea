use anyhow::Context;
use chrono::Local;
use dotenvy::dotenv;
use metrics_exporter_prometheus::PrometheusBuilder;
use sentinel_chat::agent::Agent;
use sentinel_chat::config::ServerConfig;
use sentinel_chat::model::scripted::ScriptedBackend;
use sentinel_chat::model::LlmBackend;
use sentinel_chat::server::ChatServer;
use sentinel_chat::transcript::TranscriptLog;
use std::sync::Arc;
use tracing_subscriber::{fmt, EnvFilter};


#[tokio::main(flavor = "multi_thread")]
async fn main() -> anyhow::Result<()> {
dotenv().ok();
let cfg = <ServerConfig as clap::Parser>::parse();


// logs
let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
fmt().with_env_filter(filter).init();


if let Some(addr) = cfg.metrics_addr {
    PrometheusBuilder::new().with_http_listener(addr).install().context("install metrics exporter")?;
    tracing::info!(%addr, "metrics exporter listening");
}


match cfg.model_path.clone() {
    #[cfg(feature = "llama")]
    Some(path) => {
        let backend = sentinel_chat::model::llama::LlamaBackend::new(path, cfg.n_ctx, cfg.n_gpu_layers)?;
        run(cfg, Arc::new(backend)).await
    }
    #[cfg(not(feature = "llama"))]
    Some(path) => anyhow::bail!("{} needs the `llama` feature; rebuild with --features llama", path.display()),
    None => {
        tracing::warn!("MODEL_PATH not set, answering with the scripted backend");
        run(cfg, Arc::new(ScriptedBackend::default())).await
    }
}
}


async fn run<B: LlmBackend>(cfg: ServerConfig, backend: Arc<B>) -> anyhow::Result<()> {
let port = cfg.resolve_port();
let agent = Agent::new(cfg.initial_prompt.clone(), cfg.generation_params(), cfg.reply_reserve);
let transcript = TranscriptLog::for_run(&cfg.log_dir, port, Local::now());
tracing::info!(path = %transcript.path().display(), "transcript log");

let server = ChatServer::bind((cfg.host.as_str(), port), backend, agent)
    .await
    .with_context(|| format!("bind {}:{port}", cfg.host))?
    .with_transcript(transcript);

server
    .serve_until(async {
        let _ = tokio::signal::ctrl_c().await;
    })
    .await?;
tracing::info!("server stopped");
Ok(())
}
