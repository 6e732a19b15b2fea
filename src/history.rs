use serde::Serialize;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

impl Role {
    pub fn as_str(self) -> &'static str {
        match self {
            Role::System => "system",
            Role::User => "user",
            Role::Assistant => "assistant",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Turn {
    pub role: Role,
    pub text: String,
}

const TURN_OPEN: &str = "<|im_start|>";
const TURN_CLOSE: &str = "<|im_end|>";

/// One turn in role-tag markup.
pub fn render_turn(role: Role, text: &str) -> String {
    format!("{TURN_OPEN}{role}\n{text}{TURN_CLOSE}\n")
}

/// Opens the assistant turn the model is asked to complete.
pub fn assistant_cue() -> String {
    format!("{TURN_OPEN}{}\n", Role::Assistant)
}

/// Conversation transcript: one system preamble followed by user/assistant turns.
///
/// Turns are only ever appended (or all dropped by [`History::clear`]). The rendered
/// prompt covers the turns from `window_start` on; earlier turns stay in `turns` for the
/// transcript log but no longer reach the model.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct History {
    preamble: String,
    turns: Vec<Turn>,
    window_start: usize,
}

impl History {
    pub fn new(preamble: impl Into<String>) -> Self {
        Self { preamble: preamble.into(), turns: Vec::new(), window_start: 0 }
    }

    pub fn preamble(&self) -> &str {
        &self.preamble
    }

    pub fn turns(&self) -> &[Turn] {
        &self.turns
    }

    pub fn window(&self) -> &[Turn] {
        &self.turns[self.window_start..]
    }

    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }

    pub fn push(&mut self, role: Role, text: impl Into<String>) {
        self.turns.push(Turn { role, text: text.into() });
    }

    /// Back to the preamble alone.
    pub fn clear(&mut self) {
        self.turns.clear();
        self.window_start = 0;
    }

    /// Drops the oldest user/assistant exchange from the window. The newest turn always
    /// stays. Returns false when there is nothing left to drop.
    pub fn evict_oldest_exchange(&mut self) -> bool {
        let remaining = self.turns.len() - self.window_start;
        if remaining <= 1 {
            return false;
        }
        self.window_start += 2.min(remaining - 1);
        true
    }

    /// Preamble plus windowed turns, rebuilt from scratch on every call.
    pub fn render(&self) -> String {
        let mut out = render_turn(Role::System, &self.preamble);
        for turn in self.window() {
            out.push_str(&render_turn(turn.role, &turn.text));
        }
        out
    }
}
