//! Streaming chat over raw TCP.
//!
//! A [`server::ChatServer`] wraps an [`model::LlmBackend`], keeps one conversation for the
//! process and streams each reply as text deltas closed by [`protocol::SENTINEL`].

pub mod agent;
pub mod client;
pub mod config;
pub mod error;
pub mod generate;
pub mod history;
pub mod model;
pub mod protocol;
pub mod server;
pub mod stream;
pub mod transcript;

pub use error::{ChatError, Result};
