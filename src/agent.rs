use crate::error::Result;
use crate::generate::GenerationParams;
use crate::history::{assistant_cue, History, Role};
use crate::model::LlmBackend;

/// Owns the conversation and turns chat messages into prompts.
#[derive(Debug, Clone)]
pub struct Agent {
    history: History,
    params: GenerationParams,
    /// Tokens left free for the reply when fitting history into the turn's length limit.
    reply_reserve: usize,
}

impl Agent {
    pub fn new(preamble: impl Into<String>, params: GenerationParams, reply_reserve: usize) -> Self {
        Self { history: History::new(preamble), params, reply_reserve }
    }

    pub fn history(&self) -> &History {
        &self.history
    }

    pub fn params(&self) -> &GenerationParams {
        &self.params
    }

    /// Prompt the model would see for the next turn.
    pub fn prompt(&self) -> String {
        let mut prompt = self.history.render();
        prompt.push_str(&assistant_cue());
        prompt
    }

    /// Records the user turn and returns the prompt to generate from, evicting the oldest
    /// exchanges until prompt and reply reserve fit in the turn's length limit.
    pub fn open_turn<B: LlmBackend + ?Sized>(&mut self, backend: &B, message: &str) -> Result<String> {
        self.history.push(Role::User, message);
        let limit = self.params.length_limit(backend.context_len());
        loop {
            let prompt = self.prompt();
            let n = backend.tokenize(&prompt)?.len();
            if n + self.reply_reserve <= limit {
                return Ok(prompt);
            }
            if !self.history.evict_oldest_exchange() {
                tracing::warn!(prompt_tokens = n, "prompt does not fit even without older turns");
                return Ok(prompt);
            }
            tracing::debug!(prompt_tokens = n, "evicted oldest exchange from the window");
        }
    }

    pub fn close_turn(&mut self, reply: impl Into<String>) {
        self.history.push(Role::Assistant, reply);
    }

    pub fn clear(&mut self) {
        self.history.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::scripted::ScriptedBackend;

    #[test]
    fn turn_appends_user_then_assistant() {
        let backend = ScriptedBackend::default();
        let mut agent = Agent::new("X", GenerationParams::default(), 16);
        let prompt = agent.open_turn(&backend, "hello").unwrap();
        assert!(prompt.ends_with("<|im_start|>user\nhello<|im_end|>\n<|im_start|>assistant\n"));
        agent.close_turn("hi");
        let roles: Vec<Role> = agent.history().turns().iter().map(|t| t.role).collect();
        assert_eq!(roles, vec![Role::User, Role::Assistant]);
    }

    #[test]
    fn long_history_is_windowed() {
        let backend = ScriptedBackend::default();
        let params = GenerationParams { max_length: 200, ..GenerationParams::default() };
        let mut agent = Agent::new("X", params, 20);
        for i in 0..5 {
            agent.open_turn(&backend, &format!("question number {i}")).unwrap();
            agent.close_turn(format!("answer number {i}"));
        }
        let prompt = agent.open_turn(&backend, "last").unwrap();
        assert!(prompt.len() + 20 <= 200);
        assert!(prompt.starts_with("<|im_start|>system\nX<|im_end|>\n"));
        assert!(prompt.contains("last"));
        assert!(!prompt.contains("question number 0"));
        assert_eq!(agent.history().turns().len(), 11);
    }

    #[test]
    fn window_follows_the_backend_context() {
        let backend = ScriptedBackend::new("ok").with_context_len(120);
        let mut agent = Agent::new("X", GenerationParams::default(), 16);
        for i in 0..4 {
            let prompt = agent.open_turn(&backend, &format!("message {i}")).unwrap();
            assert!(prompt.len() + 16 <= 120, "turn {i}: {} tokens", prompt.len());
            let reply = crate::generate::Generation::start(&backend, &prompt, agent.params())
                .unwrap()
                .last()
                .unwrap()
                .unwrap();
            agent.close_turn(reply);
        }
        assert_eq!(agent.history().turns().len(), 8);
    }
}
