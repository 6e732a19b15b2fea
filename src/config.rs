use crate::generate::GenerationParams;
use clap::{ArgAction, Parser};
use rand::Rng;
use std::net::SocketAddr;
use std::path::PathBuf;

pub const DEFAULT_PREAMBLE: &str = "You are a helpful assistant.";

#[derive(Parser, Debug, Clone)]
#[command(name = "chat-server", about = "Streams model replies to socket clients")]
pub struct ServerConfig {
    /// Random 4-digit port when unset.
    #[arg(short, long, env = "CHAT_PORT")]
    pub port: Option<u16>,
    #[arg(short = 'i', long = "initial_prompt", env = "INITIAL_PROMPT", default_value = DEFAULT_PREAMBLE)]
    pub initial_prompt: String,
    #[arg(long, env = "CHAT_HOST", default_value = "localhost")]
    pub host: String,
    /// GGUF model; the scripted backend answers when unset.
    #[arg(long, env = "MODEL_PATH")]
    pub model_path: Option<PathBuf>,
    #[arg(long, env, default_value_t = 4096)]
    pub n_ctx: u32,
    #[arg(long, env, default_value_t = 28)]
    pub n_gpu_layers: u32,
    #[arg(long, env, default_value_t = 2048)]
    pub max_length: usize,
    #[arg(long, env, default_value_t = 256)]
    pub reply_reserve: usize,
    #[arg(long, env, default_value_t = 0.9)]
    pub top_p: f32,
    #[arg(long, env, default_value_t = 0.4)]
    pub temperature: f32,
    #[arg(long, env, default_value_t = 1.1)]
    pub repetition_penalty: f32,
    #[arg(long, env, default_value_t = true, action = ArgAction::Set)]
    pub do_sample: bool,
    /// Extra end-of-sequence token id.
    #[arg(long, env)]
    pub eos_token_id: Option<u32>,
    #[arg(long, env)]
    pub seed: Option<u64>,
    #[arg(long, env, default_value = "logs")]
    pub log_dir: PathBuf,
    /// Prometheus scrape endpoint, disabled when unset.
    #[arg(long, env)]
    pub metrics_addr: Option<SocketAddr>,
}

impl ServerConfig {
    pub fn resolve_port(&self) -> u16 {
        self.port.unwrap_or_else(random_port)
    }

    pub fn generation_params(&self) -> GenerationParams {
        GenerationParams {
            max_length: self.max_length,
            top_p: self.top_p,
            temperature: self.temperature,
            repetition_penalty: self.repetition_penalty,
            do_sample: self.do_sample,
            eos_token_id: self.eos_token_id,
            seed: self.seed,
        }
    }
}

#[derive(Parser, Debug, Clone)]
#[command(name = "chat-client", about = "Sends one message and prints the streamed reply")]
pub struct ClientConfig {
    #[arg(short, long, env = "CHAT_PORT")]
    pub port: u16,
    #[arg(short, long)]
    pub message: String,
    #[arg(long, env = "CHAT_HOST", default_value = "localhost")]
    pub host: String,
}

pub fn random_port() -> u16 {
    rand::thread_rng().gen_range(1000..=9999)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn server_flags_match_the_legacy_names() {
        let cfg = ServerConfig::try_parse_from(["chat-server", "-p", "6006", "-i", "Be brief.", "--do-sample", "false"])
            .unwrap();
        assert_eq!(cfg.resolve_port(), 6006);
        assert_eq!(cfg.initial_prompt, "Be brief.");
        assert!(!cfg.generation_params().do_sample);

        let cfg = ServerConfig::try_parse_from(["chat-server", "--initial_prompt", "Y"]).unwrap();
        assert_eq!(cfg.initial_prompt, "Y");
    }

    #[test]
    fn unset_port_is_four_digits() {
        for _ in 0..100 {
            let port = random_port();
            assert!((1000..=9999).contains(&port));
        }
    }

    #[test]
    fn client_needs_port_and_message() {
        assert!(ClientConfig::try_parse_from(["chat-client", "-p", "6006"]).is_err());
        let cfg = ClientConfig::try_parse_from(["chat-client", "-p", "6006", "-m", "hello"]).unwrap();
        assert_eq!(cfg.message, "hello");
        assert_eq!(cfg.host, "localhost");
    }
}
