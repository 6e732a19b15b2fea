use crate::agent::Agent;
use crate::error::{ChatError, Result};
use crate::generate::Generation;
use crate::model::LlmBackend;
use crate::protocol::{Command, CHUNK_SIZE, SENTINEL};
use crate::stream::DeltaEmitter;
use crate::transcript::{SaveReason, TranscriptLog};
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream, ToSocketAddrs};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

// Cumulative strings buffered between the generation worker and the socket.
const STREAM_DEPTH: usize = 32;

enum Flow {
    Continue,
    Stop,
}

/// Sequential chat server: one connection at a time, one conversation per process.
pub struct ChatServer<B: LlmBackend> {
    listener: TcpListener,
    backend: Arc<B>,
    agent: Agent,
    transcript: Option<TranscriptLog>,
}

impl<B: LlmBackend> ChatServer<B> {
    pub async fn bind(addr: impl ToSocketAddrs, backend: Arc<B>, agent: Agent) -> Result<Self> {
        let listener = TcpListener::bind(addr).await?;
        Ok(Self { listener, backend, agent, transcript: None })
    }

    pub fn with_transcript(mut self, log: TranscriptLog) -> Self {
        self.transcript = Some(log);
        self
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    /// Runs until a client sends `STOP SERVER!`.
    pub async fn serve(self) -> Result<Agent> {
        self.serve_until(std::future::pending()).await
    }

    /// Runs until `STOP SERVER!` or `shutdown` resolves, whichever comes first. The
    /// transcript is saved before returning and the agent handed back.
    pub async fn serve_until(mut self, shutdown: impl Future<Output = ()>) -> Result<Agent> {
        tokio::pin!(shutdown);
        let addr = self.local_addr()?;
        info!(%addr, "listening");

        let outcome = loop {
            let (stream, peer) = tokio::select! {
                accepted = self.listener.accept() => match accepted {
                    Ok(conn) => conn,
                    Err(e) => break Err(e.into()),
                },
                _ = &mut shutdown => {
                    info!("shutdown requested");
                    break Ok(());
                }
            };
            metrics::counter!("chat_connections_total").increment(1);
            info!(%peer, "client connected");

            let handled = tokio::select! {
                handled = self.handle_connection(stream) => handled,
                _ = &mut shutdown => {
                    info!(%peer, "shutdown requested with a client connected");
                    break Ok(());
                }
            };
            match handled {
                Ok(Flow::Continue) => debug!(%peer, "client disconnected"),
                Ok(Flow::Stop) => {
                    info!(%peer, "stop requested");
                    break Ok(());
                }
                Err(ChatError::Io(e)) => warn!(%peer, error = %e, "connection dropped"),
                Err(e) => break Err(e),
            }
        };

        self.save_transcript(SaveReason::Shutdown)?;
        outcome.map(|()| self.agent)
    }

    async fn handle_connection(&mut self, mut stream: TcpStream) -> Result<Flow> {
        stream.set_nodelay(true)?;
        let mut buf = vec![0u8; CHUNK_SIZE];
        loop {
            let n = stream.read(&mut buf).await?;
            if n == 0 {
                return Ok(Flow::Continue);
            }
            let text = String::from_utf8_lossy(&buf[..n]);
            match Command::parse(&text) {
                Command::Stop => {
                    stream.write_all(SENTINEL.as_bytes()).await?;
                    return Ok(Flow::Stop);
                }
                Command::ClearHistory => {
                    self.save_transcript(SaveReason::Clear)?;
                    self.agent.clear();
                    metrics::counter!("chat_history_clears_total").increment(1);
                    info!("history cleared");
                    stream.write_all(SENTINEL.as_bytes()).await?;
                }
                Command::Chat(message) => self.chat_turn(&mut stream, &message).await?,
            }
        }
    }

    async fn chat_turn(&mut self, stream: &mut TcpStream, message: &str) -> Result<()> {
        let started = Instant::now();
        let prompt = self.agent.open_turn(self.backend.as_ref(), message)?;

        let (tx, mut rx) = mpsc::channel::<String>(STREAM_DEPTH);
        let backend = Arc::clone(&self.backend);
        let params = self.agent.params().clone();
        let worker = tokio::task::spawn_blocking(move || -> Result<()> {
            for text in Generation::start(backend.as_ref(), &prompt, &params)? {
                if tx.blocking_send(text?).is_err() {
                    // connection task went away
                    break;
                }
            }
            Ok(())
        });

        let mut emitter = DeltaEmitter::new();
        let mut write_error = None;
        while let Some(text) = rx.recv().await {
            let delta = emitter.advance(&text);
            if delta.is_empty() {
                continue;
            }
            if let Err(e) = stream.write_all(delta.as_bytes()).await {
                write_error = Some(e);
                break;
            }
        }
        drop(rx);
        worker.await??;

        let reply = emitter.into_text();
        metrics::counter!("chat_turns_total").increment(1);
        metrics::counter!("chat_generated_chars_total").increment(reply.chars().count() as u64);
        metrics::histogram!("chat_turn_seconds").record(started.elapsed().as_secs_f64());
        info!(chars = reply.len(), elapsed = ?started.elapsed(), "turn complete");
        self.agent.close_turn(reply);

        if let Some(e) = write_error {
            return Err(e.into());
        }
        stream.write_all(SENTINEL.as_bytes()).await?;
        Ok(())
    }

    fn save_transcript(&self, reason: SaveReason) -> Result<()> {
        match &self.transcript {
            Some(log) => log.save(self.agent.history(), reason),
            None => Ok(()),
        }
    }
}
