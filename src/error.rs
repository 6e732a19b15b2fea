use thiserror::Error;

#[derive(Debug, Error)]
pub enum ChatError {
    #[error("socket io: {0}")]
    Io(#[from] std::io::Error),

    #[error("backend: {0:#}")]
    Backend(#[from] anyhow::Error),

    #[error("prompt has {prompt} tokens but the context only holds {limit}")]
    PromptTooLong { prompt: usize, limit: usize },

    #[error("sampling: {0}")]
    Sampling(#[from] rand::distributions::WeightedError),

    #[error("transcript: {0}")]
    Transcript(#[from] serde_json::Error),

    #[error("generation worker: {0}")]
    Worker(#[from] tokio::task::JoinError),

    #[error("connection closed before the end of the reply")]
    ConnectionClosed,
}

pub type Result<T, E = ChatError> = std::result::Result<T, E>;
